//! Decoder status codes.
//!
//! The numeric values are the native `g2_getfld` status codes so that hosts
//! which already switch on them keep working.

use thiserror::Error;

/// Why the decoder refused a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum DecodeStatus {
    #[error("beginning characters \"GRIB\" not found")]
    MagicNotFound,

    #[error("GRIB message is not edition 2 (found edition {0})")]
    UnsupportedEdition(u8),

    #[error("requested field number was not positive")]
    FieldNumberNotPositive,

    #[error("end string \"7777\" found, but not where expected")]
    EndMarkerMisplaced,

    #[error("GRIB message does not contain the requested number of fields")]
    FieldNotFound,

    #[error("end string \"7777\" not found at end of message")]
    EndMarkerMissing,

    #[error("unrecognized section {0} encountered")]
    UnrecognizedSection(u8),

    #[error("data representation template 5.{0} not implemented")]
    DataTemplateNotImplemented(u16),

    #[error("error unpacking section {0}")]
    SectionUnpack(u8),

    #[error("previous bitmap specified, yet none exists")]
    PreviousBitmapMissing,
}

impl DecodeStatus {
    /// Native status code as returned by `g2_getfld`.
    pub fn code(&self) -> i32 {
        match self {
            DecodeStatus::MagicNotFound => 1,
            DecodeStatus::UnsupportedEdition(_) => 2,
            DecodeStatus::FieldNumberNotPositive => 3,
            DecodeStatus::EndMarkerMisplaced => 4,
            DecodeStatus::FieldNotFound => 6,
            DecodeStatus::EndMarkerMissing => 7,
            DecodeStatus::UnrecognizedSection(_) => 8,
            DecodeStatus::DataTemplateNotImplemented(_) => 9,
            DecodeStatus::SectionUnpack(1) => 15,
            DecodeStatus::SectionUnpack(2) => 16,
            DecodeStatus::SectionUnpack(3) => 10,
            DecodeStatus::SectionUnpack(4) => 11,
            DecodeStatus::SectionUnpack(5) => 12,
            DecodeStatus::SectionUnpack(6) => 13,
            DecodeStatus::SectionUnpack(_) => 14,
            DecodeStatus::PreviousBitmapMissing => 17,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_codes() {
        assert_eq!(DecodeStatus::SectionUnpack(1).code(), 15);
        assert_eq!(DecodeStatus::SectionUnpack(2).code(), 16);
        assert_eq!(DecodeStatus::SectionUnpack(3).code(), 10);
        assert_eq!(DecodeStatus::SectionUnpack(5).code(), 12);
        assert_eq!(DecodeStatus::SectionUnpack(7).code(), 14);
    }

    #[test]
    fn test_codes_are_non_zero() {
        let all = [
            DecodeStatus::MagicNotFound,
            DecodeStatus::UnsupportedEdition(1),
            DecodeStatus::FieldNumberNotPositive,
            DecodeStatus::EndMarkerMisplaced,
            DecodeStatus::FieldNotFound,
            DecodeStatus::EndMarkerMissing,
            DecodeStatus::UnrecognizedSection(9),
            DecodeStatus::DataTemplateNotImplemented(40),
            DecodeStatus::PreviousBitmapMissing,
        ];
        for status in all {
            assert_ne!(status.code(), 0, "{status} must map to a failure code");
        }
    }
}
