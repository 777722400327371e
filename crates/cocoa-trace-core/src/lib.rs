//! # Cocoa Trace Core
//!
//! Pure primitives for the cocoa delivery traceability ledger: blocks, the
//! hash chain, QR identities, scan events and canonicalization.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`Block`] - One hash-linked record per delivery
//! - [`BlockHash`] - SHA-256 digest linking blocks together
//! - [`QrToken`] - Public identity printed on the delivery
//! - [`ScanEvent`] - Custody check recorded against a block
//! - [`Payload`] - Delivery snapshot covered by the hash
//!
//! ## Canonicalization
//!
//! Payloads are hashed over a deterministic text encoding. See [`canonical`].

pub mod block;
pub mod canonical;
pub mod error;
pub mod hash;
pub mod qr;
pub mod scan;
pub mod timeline;
pub mod types;
pub mod validation;
pub mod verify;

pub use block::{Block, GENESIS_BLOCK_NUMBER};
pub use canonical::{canonical_bytes, canonical_string, Value};
pub use error::{EncodingError, ValidationError};
pub use hash::{compute_block_hash, BlockHash, BLOCK_HASH_DOMAIN};
pub use qr::{candidate_tokens, QrPayload, QrToken};
pub use scan::{ScanEvent, ScanRequest};
pub use timeline::{Timeline, TimelineEntry};
pub use types::{DeliveryRef, GeoPoint, Page, Payload, ScanId};
pub use validation::{bind_delivery_id, validate_payload, DEFAULT_REQUIRED_FIELDS};
pub use verify::{
    unreadable_block, verify_block, verify_chain, BlockStatus, BlockVerification, ChainBreak,
    ChainVerification, ChainVerifier,
};
