//! Pure verification of single blocks and of the chain.
//!
//! Verification never fails with an error: a broken block or chain is a
//! result, reported as data.

use serde::{Deserialize, Serialize};

use crate::block::{Block, GENESIS_BLOCK_NUMBER};
use crate::hash::BlockHash;
use crate::qr::QrToken;
use crate::types::DeliveryRef;

/// Outcome of checking one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockStatus {
    Authentic,
    TamperedPayload,
}

/// Result of verifying one block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockVerification {
    pub valid: bool,
    pub reason: BlockStatus,
    pub block_number: u64,
    pub delivery_ref: DeliveryRef,
    pub qr_token: QrToken,
    /// `None` when the stored row no longer decodes.
    pub stored_hash: Option<BlockHash>,
    /// `None` when the stored payload no longer canonicalizes.
    pub computed_hash: Option<BlockHash>,
    pub previous_hash: Option<BlockHash>,
    pub created_at: i64,
    pub scans_count: u64,
    pub message: String,
}

/// Recompute a block's hash with its stored `created_at` and compare.
pub fn verify_block(block: &Block, scans_count: u64) -> BlockVerification {
    let computed_hash = block.recompute_hash().ok();
    let valid = computed_hash == Some(block.hash);
    let (reason, message) = if valid {
        (BlockStatus::Authentic, "Delivery authentic and verified")
    } else {
        (BlockStatus::TamperedPayload, "Data altered, not authentic")
    };
    BlockVerification {
        valid,
        reason,
        block_number: block.block_number,
        delivery_ref: block.delivery_ref.clone(),
        qr_token: block.qr_token.clone(),
        stored_hash: Some(block.hash),
        computed_hash,
        previous_hash: Some(block.previous_hash),
        created_at: block.created_at,
        scans_count,
        message: message.to_string(),
    }
}

/// Result for a stored block whose row no longer decodes.
///
/// Nothing can be recomputed, so the block counts as tampered.
pub fn unreadable_block(
    block_number: u64,
    delivery_ref: DeliveryRef,
    qr_token: QrToken,
    created_at: i64,
    scans_count: u64,
) -> BlockVerification {
    BlockVerification {
        valid: false,
        reason: BlockStatus::TamperedPayload,
        block_number,
        delivery_ref,
        qr_token,
        stored_hash: None,
        computed_hash: None,
        previous_hash: None,
        created_at,
        scans_count,
        message: "Data altered, not authentic".to_string(),
    }
}

/// Why a chain check stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainBreak {
    /// Stored hash does not match the stored fields.
    TamperedPayload,
    /// `previous_hash` does not match the prior block (or the genesis sentinel).
    BrokenLink,
    /// Block numbers are not 1, 2, 3, ...
    NumberingGap,
}

/// Result of verifying the whole chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerification {
    pub valid: bool,
    pub total_blocks: u64,
    pub first_break: Option<u64>,
    pub break_reason: Option<ChainBreak>,
    pub message: String,
}

/// Incremental chain checker, fed blocks in ascending order.
///
/// Stops recording at the first break; later blocks are ignored.
#[derive(Debug, Clone)]
pub struct ChainVerifier {
    expected_number: u64,
    prev_hash: BlockHash,
    checked: u64,
    broken: Option<(u64, ChainBreak)>,
}

impl Default for ChainVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainVerifier {
    pub fn new() -> Self {
        Self {
            expected_number: GENESIS_BLOCK_NUMBER,
            prev_hash: BlockHash::ZERO,
            checked: 0,
            broken: None,
        }
    }

    /// Check the next block. Returns the break found at this block, if any.
    pub fn feed(&mut self, block: &Block) -> Option<(u64, ChainBreak)> {
        if self.broken.is_some() {
            return None;
        }
        self.checked += 1;

        let found = if block.block_number != self.expected_number {
            Some(ChainBreak::NumberingGap)
        } else if !block.hash_matches() {
            Some(ChainBreak::TamperedPayload)
        } else if block.previous_hash != self.prev_hash {
            Some(ChainBreak::BrokenLink)
        } else {
            None
        };

        match found {
            Some(reason) => self.record_break(block.block_number, reason),
            None => {
                self.expected_number += 1;
                self.prev_hash = block.hash;
                None
            }
        }
    }

    /// Account for a stored block that could not be decoded at all.
    ///
    /// Its hash cannot be recomputed, so it breaks the chain as a tampered
    /// payload unless its number is already out of sequence.
    pub fn feed_unreadable(&mut self, block_number: u64) -> Option<(u64, ChainBreak)> {
        if self.broken.is_some() {
            return None;
        }
        self.checked += 1;
        let reason = if block_number != self.expected_number {
            ChainBreak::NumberingGap
        } else {
            ChainBreak::TamperedPayload
        };
        self.record_break(block_number, reason)
    }

    fn record_break(&mut self, at: u64, reason: ChainBreak) -> Option<(u64, ChainBreak)> {
        self.broken = Some((at, reason));
        Some((at, reason))
    }

    pub fn is_broken(&self) -> bool {
        self.broken.is_some()
    }

    /// Blocks inspected so far.
    pub fn checked(&self) -> u64 {
        self.checked
    }

    /// Produce the report. `total_blocks` is the size of the chain.
    pub fn finish(self, total_blocks: u64) -> ChainVerification {
        match self.broken {
            None => ChainVerification {
                valid: true,
                total_blocks,
                first_break: None,
                break_reason: None,
                message: format!("Chain intact ({} blocks)", total_blocks),
            },
            Some((at, reason)) => ChainVerification {
                valid: false,
                total_blocks,
                first_break: Some(at),
                break_reason: Some(reason),
                message: format!("Chain broken at block #{}: {:?}", at, reason),
            },
        }
    }
}

/// Verify an in-memory sequence of blocks.
pub fn verify_chain<'a>(blocks: impl IntoIterator<Item = &'a Block>) -> ChainVerification {
    let mut verifier = ChainVerifier::new();
    let mut total = 0;
    for block in blocks {
        total += 1;
        verifier.feed(block);
    }
    verifier.finish(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::compute_block_hash;
    use crate::qr::INITIAL_SUFFIX_LEN;
    use crate::types::Payload;

    fn chain(n: u64) -> Vec<Block> {
        let mut blocks: Vec<Block> = Vec::new();
        let mut prev = BlockHash::ZERO;
        for i in 1..=n {
            let delivery_ref = DeliveryRef::new(format!("D{}", i)).unwrap();
            let payload = Payload::new().with("quantity_kg", i as f64);
            let created_at = 1_000 * i as i64;
            let hash = compute_block_hash(i, &prev, created_at, &payload).unwrap();
            blocks.push(Block {
                block_number: i,
                qr_token: QrToken::derive(&delivery_ref, &hash, INITIAL_SUFFIX_LEN),
                delivery_ref,
                payload,
                created_at,
                previous_hash: prev,
                hash,
                verified_at: None,
            });
            prev = hash;
        }
        blocks
    }

    #[test]
    fn test_single_block_authentic() {
        let blocks = chain(1);
        let result = verify_block(&blocks[0], 3);
        assert!(result.valid);
        assert_eq!(result.reason, BlockStatus::Authentic);
        assert_eq!(result.computed_hash, Some(blocks[0].hash));
        assert_eq!(result.scans_count, 3);
    }

    #[test]
    fn test_single_block_tampered() {
        let mut blocks = chain(1);
        blocks[0].payload.insert("quantity_kg", 5000.0);
        let result = verify_block(&blocks[0], 0);
        assert!(!result.valid);
        assert_eq!(result.reason, BlockStatus::TamperedPayload);
        assert_eq!(result.stored_hash, Some(blocks[0].hash));
        assert_ne!(result.computed_hash, result.stored_hash);
    }

    #[test]
    fn test_empty_chain_valid() {
        let result = verify_chain(&[]);
        assert!(result.valid);
        assert_eq!(result.total_blocks, 0);
    }

    #[test]
    fn test_intact_chain() {
        let blocks = chain(5);
        let result = verify_chain(&blocks);
        assert!(result.valid);
        assert_eq!(result.total_blocks, 5);
        assert_eq!(result.first_break, None);
    }

    #[test]
    fn test_earliest_tampered_block_reported() {
        let mut blocks = chain(5);
        blocks[3].payload.insert("quality", "Z");
        blocks[1].payload.insert("quality", "Z");
        let result = verify_chain(&blocks);
        assert!(!result.valid);
        assert_eq!(result.first_break, Some(2));
        assert_eq!(result.break_reason, Some(ChainBreak::TamperedPayload));
    }

    #[test]
    fn test_rehashed_block_breaks_next_link() {
        let mut blocks = chain(3);
        let b = &mut blocks[1];
        b.payload.insert("quality", "Z");
        b.hash = b.recompute_hash().unwrap();
        let result = verify_chain(&blocks);
        assert_eq!(result.first_break, Some(3));
        assert_eq!(result.break_reason, Some(ChainBreak::BrokenLink));
    }

    #[test]
    fn test_genesis_must_carry_sentinel() {
        let mut blocks = chain(1);
        let b = &mut blocks[0];
        b.previous_hash = BlockHash::from_bytes([1; 32]);
        b.hash = b.recompute_hash().unwrap();
        let result = verify_chain(&blocks);
        assert_eq!(result.first_break, Some(1));
        assert_eq!(result.break_reason, Some(ChainBreak::BrokenLink));
    }

    #[test]
    fn test_numbering_gap() {
        let mut blocks = chain(4);
        blocks.remove(2);
        let result = verify_chain(&blocks);
        assert_eq!(result.first_break, Some(4));
        assert_eq!(result.break_reason, Some(ChainBreak::NumberingGap));
    }

    #[test]
    fn test_unreadable_block_is_tampered() {
        let blocks = chain(1);
        let result = unreadable_block(
            1,
            blocks[0].delivery_ref.clone(),
            blocks[0].qr_token.clone(),
            blocks[0].created_at,
            2,
        );
        assert!(!result.valid);
        assert_eq!(result.reason, BlockStatus::TamperedPayload);
        assert_eq!(result.stored_hash, None);
        assert_eq!(result.scans_count, 2);
    }

    #[test]
    fn test_unreadable_row_breaks_chain_at_its_number() {
        let blocks = chain(3);
        let mut verifier = ChainVerifier::new();
        assert!(verifier.feed(&blocks[0]).is_none());
        assert_eq!(
            verifier.feed_unreadable(2),
            Some((2, ChainBreak::TamperedPayload))
        );
        assert!(verifier.feed(&blocks[2]).is_none());
        let result = verifier.finish(3);
        assert_eq!(result.first_break, Some(2));
        assert_eq!(result.break_reason, Some(ChainBreak::TamperedPayload));

        let mut verifier = ChainVerifier::new();
        assert_eq!(
            verifier.feed_unreadable(4),
            Some((4, ChainBreak::NumberingGap))
        );
    }

    #[test]
    fn test_verifier_ignores_blocks_after_break() {
        let mut blocks = chain(3);
        blocks[0].payload.insert("quality", "Z");
        let mut verifier = ChainVerifier::new();
        assert!(verifier.feed(&blocks[0]).is_some());
        assert!(verifier.feed(&blocks[1]).is_none());
        assert!(verifier.is_broken());
        assert_eq!(verifier.checked(), 1);
        let result = verifier.finish(3);
        assert_eq!(result.total_blocks, 3);
        assert_eq!(result.first_break, Some(1));
    }
}
