//! GRIB2 parser implementation (WMO FM 92 GRIB Edition 2).
//!
//! Decodes a single field of a GRIB2 message into a [`GribField`], following
//! the contract of NCEP g2clib's `g2_getfld`: the caller chooses a 1-based
//! field number and whether to unpack and expand the data, and gets either a
//! populated field or a native status code.

pub mod decoder;
pub mod error;
pub mod reader;
pub mod sections;
pub mod tables;
pub mod templates;
pub mod unpacking;

pub use decoder::{FieldDecoder, FieldSlot, Grib2Decoder, GribField, UnpackFlags};
pub use error::DecodeStatus;
pub use reader::{message_reference_time, scan_messages, Grib2Reader, MessageSpan};
pub use tables::{Grib2Tables, ParameterInfo, TablesError};
pub use templates::GRID_LATLON;
