//! # Cocoa Trace Store
//!
//! Storage abstraction for the traceability ledger. Provides a trait-based
//! interface for block and scan persistence with SQLite and in-memory
//! implementations.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`InsertResult`] - Result of inserting a block
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cocoa_trace_store::{SqliteStore, Store};
//!
//! async fn example() {
//!     // Open a SQLite database
//!     let store = SqliteStore::open("trace.db").unwrap();
//!
//!     // Or use an in-memory database for testing
//!     let store = SqliteStore::open_memory().unwrap();
//!
//!     let blocks = store.block_count().await.unwrap();
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Uniqueness in storage**: block number, delivery and QR token are unique
//!   at the storage level, so two writers sharing a database cannot fork the
//!   chain silently
//! - **Payload as canonical text**: stored payloads re-canonicalize to the
//!   exact bytes that were hashed

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{InsertResult, Store};
