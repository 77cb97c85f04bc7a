//! Error types for field extraction and bundle construction.

use grib2_parser::DecodeStatus;
use thiserror::Error;

/// Why [`extract`](crate::extract) produced no record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Input buffer is empty")]
    EmptyBuffer,

    #[error("Invalid field index {0}: indices start at 1")]
    InvalidFieldIndex(i64),

    #[error("Decoder rejected the field with status {}: {0}", .0.code())]
    DecoderRejected(DecodeStatus),

    #[error("Decoder reported success without producing a payload")]
    MissingPayload,
}

impl DecodeError {
    /// Caller mistakes caught before the decoder ran.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, DecodeError::EmptyBuffer | DecodeError::InvalidFieldIndex(_))
    }

    /// The decoder's native status code, if the decoder was the one to fail.
    pub fn code(&self) -> Option<i32> {
        match self {
            DecodeError::DecoderRejected(status) => Some(status.code()),
            _ => None,
        }
    }
}

/// Why [`build`](crate::build) produced no bundle.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Out of memory while building the result bundle")]
    AllocationFailed,

    #[error("Payload holds {actual} values but the record declares {declared}")]
    PayloadMismatch { declared: i64, actual: usize },

    #[error("Failed to serialize field metadata: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failure of the whole extract-then-build pipeline.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Build(#[from] BuildError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_violations() {
        assert!(DecodeError::EmptyBuffer.is_contract_violation());
        assert!(DecodeError::InvalidFieldIndex(0).is_contract_violation());
        assert!(!DecodeError::MissingPayload.is_contract_violation());
        assert!(!DecodeError::DecoderRejected(DecodeStatus::FieldNotFound).is_contract_violation());
    }

    #[test]
    fn test_rejection_carries_native_code() {
        let err = DecodeError::DecoderRejected(DecodeStatus::EndMarkerMissing);
        assert_eq!(err.code(), Some(7));
        assert_eq!(DecodeError::EmptyBuffer.code(), None);
        assert!(err.to_string().contains("status 7"));
    }

    #[test]
    fn test_process_error_is_transparent() {
        let err = ProcessError::from(DecodeError::InvalidFieldIndex(-3));
        assert_eq!(err.to_string(), "Invalid field index -3: indices start at 1");
    }
}
