//! The ledger block: one per delivery.

use serde::{Deserialize, Serialize};

use crate::error::EncodingResult;
use crate::hash::{compute_block_hash, BlockHash};
use crate::qr::QrToken;
use crate::types::{DeliveryRef, Payload};

/// Block number of the first block in the chain.
pub const GENESIS_BLOCK_NUMBER: u64 = 1;

/// An immutable, hash-linked record of one delivery.
///
/// Everything except `verified_at` is fixed at append time. `verified_at` is
/// display metadata and is not covered by the hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub block_number: u64,
    pub delivery_ref: DeliveryRef,
    pub payload: Payload,
    /// Unix milliseconds, captured once at append time.
    pub created_at: i64,
    pub previous_hash: BlockHash,
    pub hash: BlockHash,
    pub qr_token: QrToken,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<i64>,
}

impl Block {
    pub fn is_genesis(&self) -> bool {
        self.block_number == GENESIS_BLOCK_NUMBER
    }

    /// Recompute the hash from the stored fields.
    pub fn recompute_hash(&self) -> EncodingResult<BlockHash> {
        compute_block_hash(
            self.block_number,
            &self.previous_hash,
            self.created_at,
            &self.payload,
        )
    }

    /// Whether the stored hash matches the stored fields.
    ///
    /// A payload that no longer canonicalizes counts as a mismatch.
    pub fn hash_matches(&self) -> bool {
        matches!(self.recompute_hash(), Ok(h) if h == self.hash)
    }

    /// Whether this block correctly follows `prev` in the chain.
    pub fn links_to(&self, prev: &Block) -> bool {
        self.block_number == prev.block_number + 1 && self.previous_hash == prev.hash
    }
}
