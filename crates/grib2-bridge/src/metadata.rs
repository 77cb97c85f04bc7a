//! Field metadata and its fixed textual form.
//!
//! The text is a flat JSON object with nine integer members in a fixed order,
//! separated by `", "`:
//!
//! ```text
//! {"discipline":0, "pdt_template":0, "parameterCategory":0, "parameterNumber":0, "grid_template":0, "grid_num_points":4, "grid_nx":2, "grid_ny":2, "packing_type":0}
//! ```
//!
//! Grid dimensions are only known for regular lat/lon grids; everywhere else
//! they are written as `-1`.

use std::io;

use grib2_parser::GRID_LATLON;
use serde::{Deserialize, Serialize};

use crate::adapter::DecodeRecord;
use crate::error::BuildError;

/// Bytes reserved for the metadata text. Nine keys and nine `i64` values
/// need well under half of this.
pub const METADATA_CAPACITY: usize = 512;

/// Positions of Ni and Nj in grid definition template 3.0.
const LATLON_NI: usize = 7;
const LATLON_NJ: usize = 8;

/// The nine scalars handed to the host, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMetadata {
    pub discipline: i64,
    #[serde(rename = "pdt_template")]
    pub product_template: i64,
    #[serde(rename = "parameterCategory")]
    pub parameter_category: i64,
    #[serde(rename = "parameterNumber")]
    pub parameter_number: i64,
    pub grid_template: i64,
    #[serde(rename = "grid_num_points")]
    pub num_points: i64,
    #[serde(rename = "grid_nx", with = "not_applicable")]
    pub nx: Option<i64>,
    #[serde(rename = "grid_ny", with = "not_applicable")]
    pub ny: Option<i64>,
    pub packing_type: i64,
}

impl FieldMetadata {
    pub fn from_record(record: &DecodeRecord) -> Self {
        let latlon = record.grid_template_number == i64::from(GRID_LATLON);
        let dimension = |index: usize| {
            latlon
                .then(|| record.grid_template.get(index).copied())
                .flatten()
        };

        Self {
            discipline: record.discipline,
            product_template: record.product_template_number,
            parameter_category: record.parameter_category,
            parameter_number: record.parameter_number,
            grid_template: record.grid_template_number,
            num_points: record.num_points,
            nx: dimension(LATLON_NI),
            ny: dimension(LATLON_NJ),
            packing_type: record.packing_type,
        }
    }

    /// Serialize into a freshly reserved buffer.
    ///
    /// Performs exactly one allocation, made with `try_reserve_exact`, and
    /// never grows it. The text is followed by a NUL byte that is not part of
    /// the returned length, so C hosts can read it as a string.
    pub fn to_text(&self) -> Result<(Vec<u8>, usize), BuildError> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(METADATA_CAPACITY)
            .map_err(|_| BuildError::AllocationFailed)?;

        let mut serializer =
            serde_json::Serializer::with_formatter(BoundedWriter(&mut buf), SpacedFormatter);
        self.serialize(&mut serializer)?;

        let len = buf.len();
        BoundedWriter(&mut buf)
            .push(0)
            .map_err(|e| BuildError::Serialize(serde_json::Error::io(e)))?;
        Ok((buf, len))
    }

    /// Parse metadata text produced by [`to_text`](Self::to_text).
    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// `None` on the wire is `-1`.
mod not_applicable {
    use serde::{Deserialize, Deserializer, Serializer};

    const SENTINEL: i64 = -1;

    pub fn serialize<S: Serializer>(value: &Option<i64>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(value.unwrap_or(SENTINEL))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
        let value = i64::deserialize(deserializer)?;
        Ok((value != SENTINEL).then_some(value))
    }
}

/// Compact JSON with `", "` between object members.
struct SpacedFormatter;

impl serde_json::ser::Formatter for SpacedFormatter {
    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }
}

/// Writes into the spare capacity of a `Vec` and fails instead of growing.
struct BoundedWriter<'a>(&'a mut Vec<u8>);

impl BoundedWriter<'_> {
    fn push(&mut self, byte: u8) -> io::Result<()> {
        io::Write::write_all(self, &[byte])
    }
}

impl io::Write for BoundedWriter<'_> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let room = self.0.capacity() - self.0.len();
        if data.len() > room {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "metadata text exceeds reserved capacity",
            ));
        }
        self.0.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
