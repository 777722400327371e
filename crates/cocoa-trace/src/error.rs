//! Error types for the Ledger.

use cocoa_trace_core::{DeliveryRef, EncodingError, ValidationError};
use cocoa_trace_store::StoreError;
use thiserror::Error;

/// Errors that can occur during Ledger operations.
///
/// Verification outcomes are not errors; see
/// [`BlockVerification`](cocoa_trace_core::BlockVerification) and
/// [`ChainVerification`](cocoa_trace_core::ChainVerification).
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Caller input rejected.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Payload cannot be canonicalized.
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// The delivery already has a block.
    #[error("delivery {delivery_ref} already recorded in block #{block_number}")]
    DuplicateBlock {
        delivery_ref: DeliveryRef,
        block_number: u64,
    },

    /// No block matches the given key.
    #[error("not found: {0}")]
    NotFound(String),

    /// Every candidate QR token was taken.
    #[error("no free qr token for delivery {delivery_ref} after {attempts} attempts")]
    IdentityExhausted {
        delivery_ref: DeliveryRef,
        attempts: usize,
    },

    /// Storage disagrees with the ledger's view of the chain, for example
    /// another writer appended at the same position.
    #[error("invalid ledger state: {0}")]
    InvalidState(String),
}

impl LedgerError {
    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::Validation(_) => "validation_error",
            LedgerError::Encoding(_) => "encoding_error",
            LedgerError::Store(_) => "store_error",
            LedgerError::DuplicateBlock { .. } => "duplicate_block",
            LedgerError::NotFound(_) => "not_found",
            LedgerError::IdentityExhausted { .. } => "identity_exhausted",
            LedgerError::InvalidState(_) => "invalid_state",
        }
    }
}

/// Result type for Ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
