//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while converting values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Input was not valid JSON.
    #[error("invalid JSON: {message}")]
    InvalidJson {
        /// Description of the parse error.
        message: String,
    },

    /// A keyed record was expected but another kind of value was found.
    #[error("expected a record (JSON object), found {found}")]
    ExpectedRecord {
        /// Type name of the value that was found.
        found: String,
    },

    /// A float that cannot be represented in JSON (NaN or infinite).
    #[error("non-finite float cannot be encoded")]
    NonFiniteFloat,
}

impl CodecError {
    /// Create an invalid JSON error.
    pub fn invalid_json(message: impl Into<String>) -> Self {
        Self::InvalidJson {
            message: message.into(),
        }
    }

    /// Create an expected record error.
    pub fn expected_record(found: impl Into<String>) -> Self {
        Self::ExpectedRecord {
            found: found.into(),
        }
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        Self::invalid_json(err.to_string())
    }
}
