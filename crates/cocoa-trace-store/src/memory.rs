//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use cocoa_trace_core::{Block, DeliveryRef, QrToken, ScanEvent};

use crate::error::{Result, StoreError};
use crate::traits::{InsertResult, Store};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Blocks indexed by number.
    blocks: BTreeMap<u64, Block>,

    /// Delivery index: delivery_ref -> block_number.
    deliveries: HashMap<DeliveryRef, u64>,

    /// Token index: qr_token -> block_number.
    tokens: HashMap<QrToken, u64>,

    /// Scans per block, in insertion order.
    scans: HashMap<u64, Vec<ScanEvent>>,

    total_scans: u64,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    /// Overwrite a stored block in place, bypassing every check.
    ///
    /// Simulates out-of-band edits to the backing data so tamper detection
    /// can be exercised without SQLite. Only built for tests and the
    /// `test-util` feature.
    #[cfg(any(test, feature = "test-util"))]
    pub fn overwrite_block(&self, block: Block) -> Result<()> {
        let mut inner = self.write()?;
        let stored = inner
            .blocks
            .get_mut(&block.block_number)
            .ok_or_else(|| StoreError::NotFound(format!("block #{}", block.block_number)))?;
        *stored = block;
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_block(&self, block: &Block, _canonical_payload: &str) -> Result<InsertResult> {
        let mut inner = self.write()?;

        if let Some(&existing) = inner.deliveries.get(&block.delivery_ref) {
            return Ok(InsertResult::DuplicateDelivery { existing });
        }

        if let Some(stored) = inner.blocks.get(&block.block_number) {
            return Ok(InsertResult::PositionTaken {
                existing: stored.hash,
            });
        }

        if inner.tokens.contains_key(&block.qr_token) {
            return Ok(InsertResult::TokenTaken);
        }

        inner
            .deliveries
            .insert(block.delivery_ref.clone(), block.block_number);
        inner
            .tokens
            .insert(block.qr_token.clone(), block.block_number);
        inner.blocks.insert(block.block_number, block.clone());

        Ok(InsertResult::Inserted)
    }

    async fn get_block(&self, block_number: u64) -> Result<Option<Block>> {
        let inner = self.read()?;
        Ok(inner.blocks.get(&block_number).cloned())
    }

    async fn get_block_by_token(&self, token: &QrToken) -> Result<Option<Block>> {
        let inner = self.read()?;
        Ok(inner
            .tokens
            .get(token)
            .and_then(|n| inner.blocks.get(n))
            .cloned())
    }

    async fn get_block_by_delivery(&self, delivery_ref: &DeliveryRef) -> Result<Option<Block>> {
        let inner = self.read()?;
        Ok(inner
            .deliveries
            .get(delivery_ref)
            .and_then(|n| inner.blocks.get(n))
            .cloned())
    }

    async fn has_token(&self, token: &QrToken) -> Result<bool> {
        let inner = self.read()?;
        Ok(inner.tokens.contains_key(token))
    }

    async fn tail(&self) -> Result<Option<Block>> {
        let inner = self.read()?;
        Ok(inner
            .blocks
            .values()
            .next_back()
            .cloned())
    }

    async fn blocks_range(&self, offset: u64, limit: u64) -> Result<Vec<Block>> {
        let skip = usize::try_from(offset)
            .map_err(|e| StoreError::InvalidData(format!("offset {}: {}", offset, e)))?;
        let take = usize::try_from(limit).unwrap_or(usize::MAX);
        let inner = self.read()?;
        Ok(inner
            .blocks
            .values()
            .skip(skip)
            .take(take)
            .cloned()
            .collect())
    }

    async fn block_count(&self) -> Result<u64> {
        let inner = self.read()?;
        Ok(inner.blocks.len() as u64)
    }

    async fn mark_verified(&self, block_number: u64, at: i64) -> Result<()> {
        let mut inner = self.write()?;
        match inner.blocks.get_mut(&block_number) {
            Some(stored) => {
                stored.verified_at = Some(at);
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("block #{}", block_number))),
        }
    }

    async fn insert_scan(&self, scan: &ScanEvent) -> Result<()> {
        let mut inner = self.write()?;
        if !inner.blocks.contains_key(&scan.block_number) {
            return Err(StoreError::NotFound(format!("block #{}", scan.block_number)));
        }
        inner
            .scans
            .entry(scan.block_number)
            .or_default()
            .push(scan.clone());
        inner.total_scans += 1;
        Ok(())
    }

    async fn scans_for_block(&self, block_number: u64) -> Result<Vec<ScanEvent>> {
        let inner = self.read()?;
        let mut scans = inner.scans.get(&block_number).cloned().unwrap_or_default();
        // Stable sort keeps insertion order among equal timestamps.
        scans.sort_by_key(|s| s.scanned_at);
        Ok(scans)
    }

    async fn count_scans(&self, block_number: u64) -> Result<u64> {
        let inner = self.read()?;
        Ok(inner
            .scans
            .get(&block_number)
            .map(|s| s.len() as u64)
            .unwrap_or(0))
    }

    async fn total_scans(&self) -> Result<u64> {
        let inner = self.read()?;
        Ok(inner.total_scans)
    }
}
