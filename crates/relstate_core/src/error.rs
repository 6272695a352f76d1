//! Error types for relstate core.

use relstate_codec::CodecError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in relstate core operations.
///
/// The core performs no I/O, so every error is a deterministic consequence
/// of caller input or schema. Nothing is retried internally.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Value conversion error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The schema is malformed (missing or duplicate model name, relation
    /// naming collision, ambiguous join model columns).
    #[error("schema error: {message}")]
    Schema {
        /// Description of the problem.
        message: String,
    },

    /// A model name was not registered.
    #[error("model not found: {name}")]
    ModelNotFound {
        /// Name of the model.
        name: String,
    },

    /// A field is not declared on the model, or is used with the wrong accessor.
    #[error("field {field} not usable on model {model}: {message}")]
    FieldNotFound {
        /// Model name.
        model: String,
        /// Field name.
        field: String,
        /// Why the lookup failed.
        message: String,
    },

    /// A single-row accessor matched more than one row.
    #[error("expected at most one {model} row, query matched {count}")]
    MultipleRowsReturned {
        /// Model name.
        model: String,
        /// Number of matching rows.
        count: usize,
    },

    /// A relation value was malformed (not an array, duplicate ids, wrong model).
    #[error("invalid value for {model}.{field}: {message}")]
    RelationValue {
        /// Model name.
        model: String,
        /// Relation field name.
        field: String,
        /// Description of the problem.
        message: String,
    },

    /// An insert supplied an id already present in the table.
    #[error("duplicate id {id} in {model}")]
    DuplicateId {
        /// Model name.
        model: String,
        /// Offending id.
        id: String,
    },

    /// The store reported a non-success status for an update.
    #[error("update failed with status {status}: {payload}")]
    UpdateFailed {
        /// Reported status.
        status: String,
        /// Reported payload.
        payload: String,
    },

    /// An update action name was not one of CREATE, UPDATE, DELETE.
    #[error("unknown update action: {action}")]
    UnknownUpdateAction {
        /// The action that was requested.
        action: String,
    },

    /// A deserialized snapshot violates the table-state invariant.
    #[error("invalid snapshot: {message}")]
    InvalidSnapshot {
        /// Description of the violation.
        message: String,
    },

    /// Operation not permitted in the current context.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a schema error.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// Creates a model-not-found error.
    pub fn model_not_found(name: impl Into<String>) -> Self {
        Self::ModelNotFound { name: name.into() }
    }

    /// Creates a field-not-found error.
    pub fn field_not_found(
        model: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::FieldNotFound {
            model: model.into(),
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a relation value error.
    pub fn relation_value(
        model: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::RelationValue {
            model: model.into(),
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a duplicate id error.
    pub fn duplicate_id(model: impl Into<String>, id: impl Into<String>) -> Self {
        Self::DuplicateId {
            model: model.into(),
            id: id.into(),
        }
    }

    /// Creates an invalid snapshot error.
    pub fn invalid_snapshot(message: impl Into<String>) -> Self {
        Self::InvalidSnapshot {
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
