//! # Cocoa Trace
//!
//! The traceability ledger for cocoa deliveries: an append-only, hash-linked
//! chain with one block per delivery, a public QR token per block, and an
//! append-only stream of scan events recording custody checks.
//!
//! ## Key Concepts
//!
//! - **Block**: Immutable snapshot of a delivery, linked to the previous block
//!   by hash. Only `verified_at` ever changes.
//! - **QR token**: `COCOA-{delivery}-{hash prefix}`, unique across blocks.
//! - **Scan event**: Someone checked the physical goods against a block.
//! - **Verification**: Recompute hashes with the stored `created_at`; a broken
//!   block or chain is reported as data, never repaired.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cocoa_trace::{Ledger, LedgerConfig};
//! use cocoa_trace::core::{DeliveryRef, Payload, ScanRequest};
//! use cocoa_trace::store::SqliteStore;
//!
//! async fn example() {
//!     let store = SqliteStore::open("trace.db").unwrap();
//!     let ledger = Ledger::new(store, LedgerConfig::default());
//!
//!     let payload = Payload::new()
//!         .with("planter_id", "P-17")
//!         .with("date", "2024-03-01")
//!         .with("quantity_kg", 1250.5)
//!         .with("quality", "A")
//!         .with("load_location", "Soubré")
//!         .with("unload_location", "San Pedro");
//!     let block = ledger
//!         .append_block(DeliveryRef::new("D-1042").unwrap(), payload)
//!         .await
//!         .unwrap();
//!
//!     ledger
//!         .record_scan(&block.qr_token, ScanRequest::new("agentA").location("Abidjan"))
//!         .await
//!         .unwrap();
//!     assert!(ledger.verify_chain().await.unwrap().valid);
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `cocoa_trace::core` - Core primitives (Block, QrToken, canonical encoding)
//! - `cocoa_trace::store` - Storage abstraction and SQLite

pub mod clock;
pub mod error;
pub mod ledger;

// Re-export component crates
pub use cocoa_trace_core as core;
pub use cocoa_trace_store as store;

// Re-export main types for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{LedgerError, Result};
pub use ledger::{Ledger, LedgerConfig, LedgerStats};

// Re-export commonly used core types
pub use cocoa_trace_core::{
    Block, BlockHash, BlockVerification, ChainVerification, DeliveryRef, Payload, QrPayload,
    QrToken, ScanEvent, ScanRequest, Timeline,
};
