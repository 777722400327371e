//! Error types for the traceability core.

use thiserror::Error;

/// A payload value that cannot be put into canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    #[error("non-finite number at {path}")]
    NonFiniteNumber { path: String },

    /// Outside both the i64 and the u64 range; JSON readers would load it
    /// back as a float.
    #[error("integer out of range at {path}")]
    IntegerOutOfRange { path: String },

    #[error("duplicate key {key:?} at {path}")]
    DuplicateKey { path: String, key: String },

    #[error("nesting deeper than {max} levels at {path}")]
    TooDeep { path: String, max: usize },
}

/// Rejected caller input: a missing field, a malformed reference, an
/// out-of-range coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid field {field}: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("invalid delivery reference {value:?}: {reason}")]
    InvalidDeliveryRef { value: String, reason: String },

    #[error("invalid qr token {0:?}")]
    InvalidQrToken(String),

    #[error("invalid hash: {0}")]
    InvalidHash(String),
}

impl ValidationError {
    /// The field this error points at, when it names one.
    pub fn field(&self) -> Option<&str> {
        match self {
            ValidationError::MissingField(field) => Some(field),
            ValidationError::InvalidField { field, .. } => Some(field),
            ValidationError::InvalidDeliveryRef { .. } => Some("delivery_ref"),
            ValidationError::InvalidQrToken(_) => Some("qr_token"),
            ValidationError::InvalidHash(_) => None,
        }
    }

    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ValidationError::InvalidField {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type for canonical encoding.
pub type EncodingResult<T> = std::result::Result<T, EncodingError>;
