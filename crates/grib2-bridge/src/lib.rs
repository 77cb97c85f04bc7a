//! Single-field GRIB2 extraction with an explicit ownership handoff.
//!
//! [`extract`] runs a [`FieldDecoder`] and normalizes its clean-up,
//! [`build`] packages the metadata text and the decoded payload into a
//! [`ResultBundle`], and [`release`] frees it. The [`boundary`] module
//! exposes the same pipeline to foreign hosts as `process_field` /
//! `release_result`.
//!
//! ```ignore
//! use grib2_bridge::{process, release, FieldIndex};
//! use grib2_parser::Grib2Decoder;
//!
//! let bundle = process(&Grib2Decoder, &message, FieldIndex::FIRST)?;
//! println!("{}", bundle.metadata_text());
//! let first = bundle.payload()[0];
//! release(bundle);
//! ```

pub mod adapter;
pub mod boundary;
pub mod bundle;
pub mod error;
pub mod metadata;

pub use adapter::{extract, DecodeRecord, FieldIndex, Payload};
pub use bundle::{build, release, FieldView, ResultBundle};
pub use error::{BuildError, DecodeError, ProcessError};
pub use metadata::{FieldMetadata, METADATA_CAPACITY};

use grib2_parser::FieldDecoder;

/// Extract field `index` of `buffer` and package it for handoff.
pub fn process<D>(decoder: &D, buffer: &[u8], index: FieldIndex) -> Result<ResultBundle, ProcessError>
where
    D: FieldDecoder + ?Sized,
{
    let record = extract(decoder, buffer, index)?;
    Ok(build(record)?)
}
