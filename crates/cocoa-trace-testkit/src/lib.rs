//! # Cocoa Trace Testkit
//!
//! Testing utilities for the cocoa traceability ledger.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Pinned canonical payloads, block hashes and QR tokens
//! - **Generators**: Proptest strategies for payloads, deliveries and chains
//! - **Fixtures**: A ledger over a memory store with a manual clock
//!
//! ## Golden Vectors
//!
//! ```rust
//! use cocoa_trace_testkit::vectors::{all_vectors, block_from_vector};
//!
//! for vector in all_vectors() {
//!     let block = block_from_vector(&vector);
//!     assert_eq!(block.hash.to_hex(), vector.expected_hash);
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use cocoa_trace_testkit::generators::{block_from_params, DeliveryParams};
//! use cocoa_trace_core::BlockHash;
//!
//! proptest! {
//!     #[test]
//!     fn block_hash_is_deterministic(params: DeliveryParams) {
//!         let b1 = block_from_params(&params, 1, BlockHash::ZERO);
//!         let b2 = block_from_params(&params, 1, BlockHash::ZERO);
//!         prop_assert_eq!(b1.hash, b2.hash);
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use cocoa_trace_testkit::fixtures::{delivery_ref, sample_payload, TestFixture};
//!
//! # async fn example() {
//! let fixture = TestFixture::new();
//! let block = fixture
//!     .ledger
//!     .append_block(delivery_ref("D-1042"), sample_payload("P-17", 812.5))
//!     .await
//!     .unwrap();
//! assert!(block.is_genesis());
//! # }
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{delivery_ref, sample_payload, TestFixture, FIXTURE_EPOCH};
pub use generators::{block_from_params, ChainParams, DeliveryParams};
pub use vectors::{all_vectors, block_from_vector, verify_all_vectors, GoldenVector};
