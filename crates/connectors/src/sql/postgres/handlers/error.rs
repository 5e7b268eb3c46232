use std::fmt::Display;
use thiserror::Error;

/// A value that cannot be represented in the binary format of its column.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("value {value} is out of range for {target}")]
    OutOfRange { value: String, target: &'static str },

    #[error("text value contains a NUL byte at offset {offset}")]
    NulInText { offset: usize },

    #[error("encoded value of {len} bytes exceeds the maximum field size")]
    TooLarge { len: usize },

    #[error("{kind} with {count} elements exceeds the maximum element count")]
    TooManyElements { kind: &'static str, count: usize },

    #[error("{pg_type} handler reported {expected} bytes but wrote {written}")]
    LengthMismatch {
        pg_type: String,
        expected: usize,
        written: usize,
    },

    #[error("cannot encode {value} as {target}")]
    Unsupported { value: String, target: String },

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl EncodeError {
    pub fn out_of_range(value: impl Display, target: &'static str) -> Self {
        EncodeError::OutOfRange {
            value: value.to_string(),
            target,
        }
    }

    pub fn unsupported(value: impl Display, target: impl Display) -> Self {
        EncodeError::Unsupported {
            value: value.to_string(),
            target: target.to_string(),
        }
    }
}

/// Converts an element count into the `i32` the wire format carries.
pub(crate) fn element_count(kind: &'static str, count: usize) -> Result<i32, EncodeError> {
    i32::try_from(count).map_err(|_| EncodeError::TooManyElements { kind, count })
}
