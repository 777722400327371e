//! Store trait: the abstract interface for block and scan persistence.
//!
//! This trait keeps the ledger storage-agnostic. Implementations include
//! SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;
use cocoa_trace_core::{Block, BlockHash, DeliveryRef, QrToken, ScanEvent};

use crate::error::Result;

/// Result of inserting a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertResult {
    /// Block was inserted.
    Inserted,
    /// The delivery already has a block.
    DuplicateDelivery {
        /// Block number of the existing block.
        existing: u64,
    },
    /// Another block already holds this block number.
    PositionTaken {
        /// Hash of the block at that position.
        existing: BlockHash,
    },
    /// The QR token is already used by another block.
    TokenTaken,
}

/// The Store trait: async interface for ledger persistence.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, `spawn_blocking` keeps queries off the runtime threads.
///
/// # Design Notes
///
/// - **Append-only**: blocks and scans are never deleted. The only update is
///   [`Store::mark_verified`].
/// - **Uniqueness**: block number, delivery reference and QR token are each
///   unique. A violating insert is reported through [`InsertResult`], not as
///   an error.
/// - **Canonical payload**: the payload is persisted as its canonical text so
///   that reading it back reproduces the hashed bytes.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Block Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a new block.
    ///
    /// # Arguments
    /// - `block`: The block to insert.
    /// - `canonical_payload`: Canonical text of `block.payload`.
    async fn insert_block(&self, block: &Block, canonical_payload: &str) -> Result<InsertResult>;

    /// Get a block by its number.
    async fn get_block(&self, block_number: u64) -> Result<Option<Block>>;

    /// Get a block by its QR token.
    async fn get_block_by_token(&self, token: &QrToken) -> Result<Option<Block>>;

    /// Get the block of a delivery.
    async fn get_block_by_delivery(&self, delivery_ref: &DeliveryRef) -> Result<Option<Block>>;

    /// Check whether a QR token is taken.
    async fn has_token(&self, token: &QrToken) -> Result<bool>;

    /// The block with the highest number, if any.
    async fn tail(&self) -> Result<Option<Block>>;

    /// Up to `limit` blocks ordered by block number, skipping `offset`.
    async fn blocks_range(&self, offset: u64, limit: u64) -> Result<Vec<Block>>;

    /// Number of blocks.
    async fn block_count(&self) -> Result<u64>;

    /// Record a successful verification time. Not covered by the hash.
    async fn mark_verified(&self, block_number: u64, at: i64) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Scan Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Append a scan event. The referenced block must exist.
    async fn insert_scan(&self, scan: &ScanEvent) -> Result<()>;

    /// Scans of one block, ordered by `scanned_at` then insertion order.
    async fn scans_for_block(&self, block_number: u64) -> Result<Vec<ScanEvent>>;

    /// Number of scans of one block.
    async fn count_scans(&self, block_number: u64) -> Result<u64>;

    /// Number of scans across all blocks.
    async fn total_scans(&self) -> Result<u64>;
}
