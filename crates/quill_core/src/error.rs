//! Error types for the database engine.

use thiserror::Error;

/// Result type for engine operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in engine operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Value model or line codec error.
    #[error("codec error: {0}")]
    Codec(#[from] quill_codec::CodecError),

    /// Log storage error.
    #[error("storage error: {0}")]
    Storage(#[from] quill_storage::StorageError),

    /// Too many unparsable lines in the datafile.
    ///
    /// Raised at load when the fraction of corrupt lines exceeds the
    /// configured threshold. This usually means the file belongs to
    /// another application or the serialization hooks are misconfigured.
    #[error("datafile corrupt: {ratio:.2} of records unreadable")]
    CorruptLog {
        /// Fraction of unparsable records, in `0.0..=1.0`.
        ratio: f64,
    },

    /// The serialization hook pair failed the inversion self-test.
    #[error("serialization hooks are not inverse of each other")]
    HookNotInvertible,

    /// A unique constraint was violated on an index.
    #[error("unique constraint violated on field {field:?} for key {key}")]
    UniqueViolated {
        /// The indexed field.
        field: String,
        /// The violating key, rendered as a log line.
        key: String,
    },

    /// Attempt to index a field whose value is an object.
    #[error("field {field:?} cannot be indexed: object keys are unsupported")]
    InvalidIndexField {
        /// The indexed field.
        field: String,
    },

    /// `ensure_index` was called without a field name.
    #[error("index declarations require a field name")]
    MissingFieldName,

    /// An update query mixes raw fields and modifiers, or applies a
    /// modifier to an incompatible value.
    #[error("invalid modifier: {message}")]
    InvalidModifier {
        /// Description of the problem.
        message: String,
    },

    /// A query or update carries an operator the engine does not know.
    #[error("unknown operator {name}")]
    UnknownOperator {
        /// The operator, including its `$` prefix.
        name: String,
    },

    /// A query, document, or option value has the wrong shape.
    #[error("invalid query: {message}")]
    InvalidQuery {
        /// Description of the problem.
        message: String,
    },

    /// A projection mixes inclusion and exclusion (other than `_id`).
    #[error("projections cannot both include and omit fields, except for _id")]
    MixedProjection,

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a corrupt log error.
    pub fn corrupt_log(ratio: f64) -> Self {
        Self::CorruptLog { ratio }
    }

    /// Creates a unique violation error.
    pub fn unique_violated(field: impl Into<String>, key: impl Into<String>) -> Self {
        Self::UniqueViolated {
            field: field.into(),
            key: key.into(),
        }
    }

    /// Creates an invalid modifier error.
    pub fn invalid_modifier(message: impl Into<String>) -> Self {
        Self::InvalidModifier {
            message: message.into(),
        }
    }

    /// Creates an unknown operator error.
    pub fn unknown_operator(name: impl Into<String>) -> Self {
        Self::UnknownOperator { name: name.into() }
    }

    /// Creates an invalid query error.
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }
}
