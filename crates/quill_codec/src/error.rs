//! Error types for the value model and line codec.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while validating, encoding, or decoding values.
#[derive(Debug, Error)]
pub enum CodecError {
    /// A document key is reserved or malformed.
    ///
    /// Keys may not begin with `$` (reserved for operators) and may not
    /// contain `.` (reserved for dotted paths).
    #[error("invalid document key: {key:?}")]
    InvalidKey {
        /// The offending key.
        key: String,
    },

    /// A number leaf is NaN or infinite and cannot be represented in the log.
    #[error("non-finite number cannot be serialized")]
    NonFiniteNumber,

    /// A `$$date` payload is out of the representable timestamp range.
    #[error("timestamp out of range: {millis} ms")]
    DateOutOfRange {
        /// Milliseconds since the Unix epoch.
        millis: i64,
    },

    /// The line is not valid JSON.
    #[error("malformed record line: {0}")]
    Json(#[from] serde_json::Error),
}

impl CodecError {
    /// Creates an invalid key error.
    pub fn invalid_key(key: impl Into<String>) -> Self {
        Self::InvalidKey { key: key.into() }
    }
}
