//! The Ledger: append, lookup, scan and verification over a [`Store`].
//!
//! The ledger owns the single-writer lock for the chain. Reads and scans never
//! take it; appends hold it from reading the tail until the new block is
//! persisted.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use cocoa_trace_core::qr::DEFAULT_VERIFY_URL_BASE;
use cocoa_trace_core::{
    bind_delivery_id, candidate_tokens, compute_block_hash, unreadable_block, validate_payload,
    verify_block, Block, BlockHash, BlockVerification, ChainVerification, ChainVerifier,
    DeliveryRef, Page, Payload, QrPayload, QrToken, ScanEvent, ScanId, ScanRequest, Timeline,
    DEFAULT_REQUIRED_FIELDS, GENESIS_BLOCK_NUMBER,
};
use cocoa_trace_store::{InsertResult, Store, StoreError};

use crate::clock::{Clock, SystemClock};
use crate::error::{LedgerError, Result};

/// Configuration for the Ledger.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Payload fields every appended delivery must carry.
    pub required_fields: Vec<String>,
    /// Record `verified_at` after a successful single-block verification.
    pub stamp_verified_at: bool,
    /// QR token candidates tried before giving up.
    pub max_identity_attempts: usize,
    /// Blocks fetched per round trip during chain verification.
    pub verify_batch_size: u64,
    /// Upper bound on the page size of block listings.
    pub max_page_size: u64,
    /// Prefix of the verify URL printed into QR payloads.
    pub verify_url_base: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            required_fields: DEFAULT_REQUIRED_FIELDS.iter().map(|f| f.to_string()).collect(),
            stamp_verified_at: true,
            max_identity_attempts: 8,
            verify_batch_size: 256,
            max_page_size: 100,
            verify_url_base: DEFAULT_VERIFY_URL_BASE.to_string(),
        }
    }
}

/// Aggregate figures about the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub total_blocks: u64,
    pub total_scans: u64,
    pub chain_valid: bool,
    /// Rounded to two decimals; zero on an empty ledger.
    pub average_scans_per_delivery: f64,
}

/// The main Ledger struct.
///
/// Provides a unified API for:
/// - Appending one block per delivery
/// - Looking blocks up by QR token, delivery or number
/// - Recording scan events and building timelines
/// - Verifying single blocks and the whole chain
pub struct Ledger<S: Store> {
    /// The storage backend.
    store: Arc<S>,
    /// Configuration.
    config: LedgerConfig,
    /// Time source for `created_at`, `scanned_at` and `verified_at`.
    clock: Arc<dyn Clock>,
    /// Serializes appends.
    append_lock: Mutex<()>,
}

impl<S: Store> Ledger<S> {
    /// Create a ledger on the system clock.
    pub fn new(store: S, config: LedgerConfig) -> Self {
        Self::with_clock(Arc::new(store), config, Arc::new(SystemClock))
    }

    /// Create a ledger with an explicit clock over a shared store.
    pub fn with_clock(store: Arc<S>, config: LedgerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            config,
            clock,
            append_lock: Mutex::new(()),
        }
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Append
    // ─────────────────────────────────────────────────────────────────────────

    /// Append the block for a delivery.
    ///
    /// The only operation that extends the chain. Validation and the
    /// duplicate check run before the append lock is taken; numbering,
    /// hashing, QR derivation and the insert run under it.
    pub async fn append_block(&self, delivery_ref: DeliveryRef, mut payload: Payload) -> Result<Block> {
        bind_delivery_id(&mut payload, &delivery_ref)?;
        validate_payload(&payload, &self.config.required_fields)?;
        let canonical = payload.canonical_string()?;

        if let Some(existing) = self.store.get_block_by_delivery(&delivery_ref).await? {
            return Err(LedgerError::DuplicateBlock {
                delivery_ref,
                block_number: existing.block_number,
            });
        }

        let _guard = self.append_lock.lock().await;

        let tail = self.store.tail().await?;
        let (block_number, previous_hash) = match &tail {
            Some(t) => (t.block_number + 1, t.hash),
            None => (GENESIS_BLOCK_NUMBER, BlockHash::ZERO),
        };
        let created_at = self.clock.now_millis();
        let hash = compute_block_hash(block_number, &previous_hash, created_at, &payload)?;
        let qr_token = self.derive_identity(&delivery_ref, &hash).await?;

        let block = Block {
            block_number,
            delivery_ref,
            payload,
            created_at,
            previous_hash,
            hash,
            qr_token,
            verified_at: None,
        };

        match self.store.insert_block(&block, &canonical).await? {
            InsertResult::Inserted => {
                tracing::info!(
                    block_number = block.block_number,
                    delivery_ref = %block.delivery_ref,
                    qr_token = %block.qr_token,
                    "appended block"
                );
                Ok(block)
            }
            InsertResult::DuplicateDelivery { existing } => Err(LedgerError::DuplicateBlock {
                delivery_ref: block.delivery_ref,
                block_number: existing,
            }),
            InsertResult::PositionTaken { existing } => Err(LedgerError::InvalidState(format!(
                "block #{} already written with hash {}",
                block.block_number, existing
            ))),
            InsertResult::TokenTaken => Err(LedgerError::InvalidState(format!(
                "qr token {} taken concurrently",
                block.qr_token
            ))),
        }
    }

    /// Pick the shortest free QR token for a block.
    async fn derive_identity(&self, delivery_ref: &DeliveryRef, hash: &BlockHash) -> Result<QrToken> {
        let attempts = self.config.max_identity_attempts;
        for (i, candidate) in candidate_tokens(delivery_ref, hash, attempts).enumerate() {
            if !self.store.has_token(&candidate).await? {
                return Ok(candidate);
            }
            tracing::debug!(
                delivery_ref = %delivery_ref,
                attempt = i + 1,
                taken = %candidate,
                "qr token taken, extending suffix"
            );
        }
        Err(LedgerError::IdentityExhausted {
            delivery_ref: delivery_ref.clone(),
            attempts,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Query Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Get a block by its QR token.
    pub async fn get_block(&self, token: &QrToken) -> Result<Block> {
        tracing::debug!(qr_token = %token, "lookup by token");
        self.store
            .get_block_by_token(token)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("qr token {}", token)))
    }

    /// Get the block of a delivery.
    pub async fn get_block_by_delivery(&self, delivery_ref: &DeliveryRef) -> Result<Block> {
        tracing::debug!(delivery_ref = %delivery_ref, "lookup by delivery");
        self.store
            .get_block_by_delivery(delivery_ref)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("delivery {}", delivery_ref)))
    }

    /// Get a block by its number.
    pub async fn get_block_by_number(&self, block_number: u64) -> Result<Block> {
        self.store
            .get_block(block_number)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("block #{}", block_number)))
    }

    /// Resolve a QR token or a delivery reference to its block.
    ///
    /// A string shaped like a token is tried as a token first, then as a
    /// delivery reference.
    pub async fn resolve(&self, key: &str) -> Result<Block> {
        if let Ok(token) = QrToken::parse(key) {
            if let Some(block) = self.store.get_block_by_token(&token).await? {
                return Ok(block);
            }
        }
        match DeliveryRef::new(key) {
            Ok(delivery_ref) => self
                .store
                .get_block_by_delivery(&delivery_ref)
                .await?
                .ok_or_else(|| LedgerError::NotFound(format!("qr token or delivery {}", key))),
            Err(_) => Err(LedgerError::NotFound(format!("qr token or delivery {}", key))),
        }
    }

    /// The most recent block, if any.
    pub async fn tail(&self) -> Result<Option<Block>> {
        Ok(self.store.tail().await?)
    }

    /// List blocks in chain order.
    ///
    /// `limit` is clamped to `1..=max_page_size`.
    pub async fn blocks(&self, offset: u64, limit: u64) -> Result<Page<Block>> {
        let limit = limit.clamp(1, self.config.max_page_size.max(1));
        let total = self.store.block_count().await?;
        let items = self.store.blocks_range(offset, limit).await?;
        Ok(Page {
            items,
            offset,
            limit,
            total,
        })
    }

    /// The QR document for a block.
    pub async fn qr_payload(&self, token: &QrToken) -> Result<QrPayload> {
        let block = self.get_block(token).await?;
        Ok(QrPayload::for_block(&block, &self.config.verify_url_base))
    }

    /// Totals, chain validity and the mean number of scans per delivery.
    pub async fn stats(&self) -> Result<LedgerStats> {
        let total_blocks = self.store.block_count().await?;
        let total_scans = self.store.total_scans().await?;
        let chain = self.verify_chain().await?;
        let average = if total_blocks == 0 {
            0.0
        } else {
            ((total_scans as f64 / total_blocks as f64) * 100.0).round() / 100.0
        };
        Ok(LedgerStats {
            total_blocks,
            total_scans,
            chain_valid: chain.valid,
            average_scans_per_delivery: average,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Verification
    // ─────────────────────────────────────────────────────────────────────────

    /// Verify one block by recomputing its hash with the stored `created_at`.
    ///
    /// A stored row that no longer decodes is reported as tampered.
    pub async fn verify_block(&self, token: &QrToken) -> Result<BlockVerification> {
        let block = match self.store.get_block_by_token(token).await {
            Ok(Some(block)) => block,
            Ok(None) => return Err(LedgerError::NotFound(format!("qr token {}", token))),
            Err(StoreError::CorruptBlock {
                block_number,
                created_at,
                reason,
            }) => {
                tracing::warn!(
                    block_number,
                    qr_token = %token,
                    %reason,
                    "stored block unreadable"
                );
                let delivery_ref = DeliveryRef::new(token.delivery_part())?;
                let scans = self.store.count_scans(block_number).await?;
                return Ok(unreadable_block(
                    block_number,
                    delivery_ref,
                    token.clone(),
                    created_at,
                    scans,
                ));
            }
            Err(e) => return Err(e.into()),
        };
        let scans = self.store.count_scans(block.block_number).await?;
        let result = verify_block(&block, scans);

        if result.valid {
            if self.config.stamp_verified_at {
                self.store
                    .mark_verified(block.block_number, self.clock.now_millis())
                    .await?;
            }
        } else {
            tracing::warn!(
                block_number = block.block_number,
                qr_token = %block.qr_token,
                stored = ?result.stored_hash,
                "block failed verification"
            );
        }
        Ok(result)
    }

    /// Verify the whole chain in block order. Read-only.
    ///
    /// A stored row that no longer decodes breaks the chain at its number.
    pub async fn verify_chain(&self) -> Result<ChainVerification> {
        let total = self.store.block_count().await?;
        let batch = self.config.verify_batch_size.max(1);
        let mut verifier = ChainVerifier::new();
        let mut offset = 0;

        while !verifier.is_broken() {
            let blocks = match self.store.blocks_range(offset, batch).await {
                Ok(blocks) => blocks,
                Err(StoreError::CorruptBlock { .. }) => {
                    let consumed = self.feed_one_by_one(&mut verifier, offset, batch).await?;
                    if consumed == 0 {
                        break;
                    }
                    offset += consumed;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if blocks.is_empty() {
                break;
            }
            offset += blocks.len() as u64;
            for block in &blocks {
                if verifier.feed(block).is_some() {
                    break;
                }
            }
        }

        let result = verifier.finish(total);
        if !result.valid {
            tracing::warn!(
                first_break = ?result.first_break,
                reason = ?result.break_reason,
                total_blocks = total,
                "chain verification failed"
            );
        }
        Ok(result)
    }

    /// Re-read a batch that failed to decode one row at a time, so the
    /// blocks before the unreadable row are still checked. Returns the rows
    /// consumed.
    async fn feed_one_by_one(
        &self,
        verifier: &mut ChainVerifier,
        offset: u64,
        batch: u64,
    ) -> Result<u64> {
        let mut consumed = 0;
        while consumed < batch && !verifier.is_broken() {
            match self.store.blocks_range(offset + consumed, 1).await {
                Ok(blocks) => match blocks.first() {
                    Some(block) => {
                        verifier.feed(block);
                    }
                    None => break,
                },
                Err(StoreError::CorruptBlock {
                    block_number,
                    reason,
                    ..
                }) => {
                    tracing::warn!(block_number, %reason, "stored block unreadable");
                    verifier.feed_unreadable(block_number);
                }
                Err(e) => return Err(e.into()),
            }
            consumed += 1;
        }
        Ok(consumed)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Scans
    // ─────────────────────────────────────────────────────────────────────────

    /// Record a scan of the block behind `token`.
    pub async fn record_scan(&self, token: &QrToken, request: ScanRequest) -> Result<ScanEvent> {
        let block = self.get_block(token).await?;
        let event = request.into_event(ScanId::random(), block.block_number, self.clock.now_millis())?;
        self.store.insert_scan(&event).await?;
        tracing::info!(
            block_number = block.block_number,
            qr_token = %block.qr_token,
            scanner = %event.scanner_identity,
            scan_type = %event.scan_type,
            "recorded scan"
        );
        Ok(event)
    }

    /// Scans of the block behind `token`, oldest first.
    pub async fn scans(&self, token: &QrToken) -> Result<Vec<ScanEvent>> {
        let block = self.get_block(token).await?;
        Ok(self.store.scans_for_block(block.block_number).await?)
    }

    /// Creation and scans of a delivery; `key` is a QR token or delivery ref.
    pub async fn timeline(&self, key: &str) -> Result<Timeline> {
        let block = self.resolve(key).await?;
        let scans = self.store.scans_for_block(block.block_number).await?;
        Ok(Timeline::build(&block, scans))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use cocoa_trace_core::{BlockStatus, ChainBreak, TimelineEntry, Value, ValidationError};
    use cocoa_trace_store::{MemoryStore, Result as StoreResult};

    const T0: i64 = 1_709_251_200_000;

    fn delivery(planter: &str, kg: f64) -> Payload {
        Payload::new()
            .with("planter_id", planter)
            .with("date", "2024-03-01")
            .with("quantity_kg", kg)
            .with("quality", "A")
            .with("load_location", "Soubré")
            .with("unload_location", "San Pedro")
    }

    fn ledger() -> (Ledger<MemoryStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(T0));
        let ledger = Ledger::with_clock(
            Arc::new(MemoryStore::new()),
            LedgerConfig::default(),
            clock.clone(),
        );
        (ledger, clock)
    }

    fn dref(s: &str) -> DeliveryRef {
        DeliveryRef::new(s).unwrap()
    }

    #[tokio::test]
    async fn test_genesis_and_link() {
        let (ledger, clock) = ledger();
        let b1 = ledger.append_block(dref("D1"), delivery("P1", 500.0)).await.unwrap();
        clock.advance(1_000);
        let b2 = ledger.append_block(dref("D2"), delivery("P2", 750.0)).await.unwrap();

        assert_eq!(b1.block_number, 1);
        assert_eq!(b1.previous_hash, BlockHash::ZERO);
        assert_eq!(b1.created_at, T0);
        assert_eq!(b2.block_number, 2);
        assert_eq!(b2.previous_hash, b1.hash);
        assert!(b1.qr_token.as_str().starts_with("COCOA-D1-"));
        assert_eq!(b1.qr_token.suffix(), &b1.hash.to_hex()[..8]);
        assert_eq!(b1.payload.get("delivery_id"), Some(&Value::from("D1")));
        assert!(ledger.verify_chain().await.unwrap().valid);
    }

    #[tokio::test]
    async fn test_duplicate_delivery() {
        let (ledger, _) = ledger();
        ledger.append_block(dref("D1"), delivery("P1", 500.0)).await.unwrap();
        let err = ledger
            .append_block(dref("D1"), delivery("P1", 500.0))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateBlock { block_number: 1, .. }));
        assert_eq!(ledger.store().block_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_validation_names_field() {
        let (ledger, _) = ledger();
        let mut payload = delivery("P1", 500.0);
        payload.insert("quality", Value::Null);
        match ledger.append_block(dref("D1"), payload).await {
            Err(LedgerError::Validation(e)) => assert_eq!(e.field(), Some("quality")),
            other => panic!("expected validation error, got {:?}", other),
        }

        let mismatched = delivery("P1", 500.0).with("delivery_id", "D9");
        assert!(matches!(
            ledger.append_block(dref("D1"), mismatched).await,
            Err(LedgerError::Validation(ValidationError::InvalidField { .. }))
        ));
        assert!(ledger.tail().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_nan_payload_is_encoding_error() {
        let (ledger, _) = ledger();
        let payload = delivery("P1", 500.0).with("moisture", f64::NAN);
        assert!(matches!(
            ledger.append_block(dref("D1"), payload).await,
            Err(LedgerError::Encoding(_))
        ));
    }

    #[tokio::test]
    async fn test_custom_required_fields() {
        let config = LedgerConfig {
            required_fields: vec!["lot".to_string()],
            ..Default::default()
        };
        let ledger = Ledger::new(MemoryStore::new(), config);
        let block = ledger
            .append_block(dref("L-1"), Payload::new().with("lot", "L-1"))
            .await
            .unwrap();
        assert_eq!(block.block_number, 1);
    }

    #[tokio::test]
    async fn test_lookups() {
        let (ledger, _) = ledger();
        let block = ledger.append_block(dref("D1"), delivery("P1", 500.0)).await.unwrap();

        assert_eq!(ledger.get_block(&block.qr_token).await.unwrap(), block);
        assert_eq!(ledger.get_block_by_delivery(&dref("D1")).await.unwrap(), block);
        assert_eq!(ledger.get_block_by_number(1).await.unwrap(), block);
        assert_eq!(ledger.resolve("D1").await.unwrap(), block);
        assert_eq!(ledger.resolve(block.qr_token.as_str()).await.unwrap(), block);

        let unknown = QrToken::parse("COCOA-D1-00000000").unwrap();
        assert!(matches!(ledger.get_block(&unknown).await, Err(LedgerError::NotFound(_))));
        assert!(matches!(ledger.get_block_by_number(2).await, Err(LedgerError::NotFound(_))));
        assert!(matches!(ledger.resolve("no such/key").await, Err(LedgerError::NotFound(_))));
    }

    /// Memory store that reports some extra QR tokens as taken.
    struct SquattedStore {
        inner: MemoryStore,
        squatted: Vec<QrToken>,
    }

    #[async_trait::async_trait]
    impl Store for SquattedStore {
        async fn insert_block(&self, block: &Block, canonical: &str) -> StoreResult<InsertResult> {
            self.inner.insert_block(block, canonical).await
        }
        async fn get_block(&self, n: u64) -> StoreResult<Option<Block>> {
            self.inner.get_block(n).await
        }
        async fn get_block_by_token(&self, t: &QrToken) -> StoreResult<Option<Block>> {
            self.inner.get_block_by_token(t).await
        }
        async fn get_block_by_delivery(&self, d: &DeliveryRef) -> StoreResult<Option<Block>> {
            self.inner.get_block_by_delivery(d).await
        }
        async fn has_token(&self, t: &QrToken) -> StoreResult<bool> {
            Ok(self.squatted.contains(t) || self.inner.has_token(t).await?)
        }
        async fn tail(&self) -> StoreResult<Option<Block>> {
            self.inner.tail().await
        }
        async fn blocks_range(&self, offset: u64, limit: u64) -> StoreResult<Vec<Block>> {
            self.inner.blocks_range(offset, limit).await
        }
        async fn block_count(&self) -> StoreResult<u64> {
            self.inner.block_count().await
        }
        async fn mark_verified(&self, n: u64, at: i64) -> StoreResult<()> {
            self.inner.mark_verified(n, at).await
        }
        async fn insert_scan(&self, scan: &ScanEvent) -> StoreResult<()> {
            self.inner.insert_scan(scan).await
        }
        async fn scans_for_block(&self, n: u64) -> StoreResult<Vec<ScanEvent>> {
            self.inner.scans_for_block(n).await
        }
        async fn count_scans(&self, n: u64) -> StoreResult<u64> {
            self.inner.count_scans(n).await
        }
        async fn total_scans(&self) -> StoreResult<u64> {
            self.inner.total_scans().await
        }
    }

    #[tokio::test]
    async fn test_identity_extends_on_collision() {
        let mut payload = delivery("P1", 500.0);
        bind_delivery_id(&mut payload, &dref("D1")).unwrap();
        let hash = compute_block_hash(1, &BlockHash::ZERO, T0, &payload).unwrap();
        let squatted: Vec<QrToken> = candidate_tokens(&dref("D1"), &hash, 2).collect();

        let store = SquattedStore {
            inner: MemoryStore::new(),
            squatted: squatted.clone(),
        };
        let ledger = Ledger::with_clock(
            Arc::new(store),
            LedgerConfig::default(),
            Arc::new(ManualClock::new(T0)),
        );

        let block = ledger.append_block(dref("D1"), delivery("P1", 500.0)).await.unwrap();
        assert_eq!(block.hash, hash);
        assert_eq!(block.qr_token.suffix().len(), 16);
        assert!(!squatted.contains(&block.qr_token));
    }

    #[tokio::test]
    async fn test_identity_exhausted() {
        let config = LedgerConfig {
            max_identity_attempts: 0,
            ..Default::default()
        };
        let ledger = Ledger::new(MemoryStore::new(), config);
        assert!(matches!(
            ledger.append_block(dref("D1"), delivery("P1", 1.0)).await,
            Err(LedgerError::IdentityExhausted { attempts: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_verify_block_stamps_verified_at() {
        let (ledger, clock) = ledger();
        let block = ledger.append_block(dref("D1"), delivery("P1", 500.0)).await.unwrap();
        clock.set(T0 + 60_000);

        let result = ledger.verify_block(&block.qr_token).await.unwrap();
        assert!(result.valid);
        assert_eq!(result.reason, BlockStatus::Authentic);
        assert_eq!(result.computed_hash, Some(block.hash));

        let stored = ledger.get_block(&block.qr_token).await.unwrap();
        assert_eq!(stored.verified_at, Some(T0 + 60_000));
        assert_eq!(stored.hash, block.hash);
    }

    #[tokio::test]
    async fn test_verify_ignores_wall_clock() {
        let (ledger, clock) = ledger();
        let block = ledger.append_block(dref("D1"), delivery("P1", 500.0)).await.unwrap();
        clock.advance(365 * 24 * 3_600_000);
        assert!(ledger.verify_block(&block.qr_token).await.unwrap().valid);
    }

    #[tokio::test]
    async fn test_tampered_block_detected() {
        let (ledger, _) = ledger();
        ledger.append_block(dref("D1"), delivery("P1", 500.0)).await.unwrap();
        let b2 = ledger.append_block(dref("D2"), delivery("P2", 600.0)).await.unwrap();
        ledger.append_block(dref("D3"), delivery("P3", 700.0)).await.unwrap();

        let mut edited = b2.clone();
        edited.payload.insert("quantity_kg", 6000.0);
        ledger.store().overwrite_block(edited).unwrap();

        let single = ledger.verify_block(&b2.qr_token).await.unwrap();
        assert!(!single.valid);
        assert_eq!(single.reason, BlockStatus::TamperedPayload);
        assert_eq!(
            ledger.get_block(&b2.qr_token).await.unwrap().verified_at,
            None
        );

        let chain = ledger.verify_chain().await.unwrap();
        assert!(!chain.valid);
        assert_eq!(chain.first_break, Some(2));
        assert_eq!(chain.break_reason, Some(ChainBreak::TamperedPayload));
        assert_eq!(chain.total_blocks, 3);
    }

    #[tokio::test]
    async fn test_verify_chain_batches() {
        let clock = Arc::new(ManualClock::new(T0));
        let config = LedgerConfig {
            verify_batch_size: 2,
            ..Default::default()
        };
        let ledger = Ledger::with_clock(Arc::new(MemoryStore::new()), config, clock.clone());
        for i in 1..=5 {
            clock.advance(10);
            ledger
                .append_block(dref(&format!("D{}", i)), delivery("P", i as f64))
                .await
                .unwrap();
        }
        let chain = ledger.verify_chain().await.unwrap();
        assert!(chain.valid);
        assert_eq!(chain.total_blocks, 5);
    }

    #[tokio::test]
    async fn test_scan_and_timeline() {
        let (ledger, clock) = ledger();
        let block = ledger.append_block(dref("D1"), delivery("P1", 500.0)).await.unwrap();

        clock.advance(5_000);
        let scan = ledger
            .record_scan(&block.qr_token, ScanRequest::new("agentA").location("Abidjan"))
            .await
            .unwrap();
        assert_eq!(scan.block_number, 1);
        assert_eq!(scan.scanned_at, T0 + 5_000);
        assert_eq!(scan.scan_type, "verification");

        let timeline = ledger.timeline("D1").await.unwrap();
        assert_eq!(timeline.total_scans, 1);
        assert_eq!(timeline.entries.len(), 2);
        assert!(matches!(timeline.entries[0], TimelineEntry::Creation { .. }));
        match &timeline.entries[1] {
            TimelineEntry::Scan { scanned_by, location, .. } => {
                assert_eq!(scanned_by, "agentA");
                assert_eq!(location.as_deref(), Some("Abidjan"));
            }
            other => panic!("expected scan, got {:?}", other),
        }

        assert_eq!(ledger.scans(&block.qr_token).await.unwrap(), vec![scan]);
        assert!(ledger.verify_block(&block.qr_token).await.unwrap().valid);
    }

    #[tokio::test]
    async fn test_scan_unknown_token() {
        let (ledger, _) = ledger();
        let token = QrToken::parse("COCOA-NOPE-abcdef12").unwrap();
        assert!(matches!(
            ledger.record_scan(&token, ScanRequest::new("agentA")).await,
            Err(LedgerError::NotFound(_))
        ));
        assert_eq!(ledger.store().total_scans().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalid_scan_request() {
        let (ledger, _) = ledger();
        let block = ledger.append_block(dref("D1"), delivery("P1", 500.0)).await.unwrap();
        assert!(matches!(
            ledger.record_scan(&block.qr_token, ScanRequest::new("")).await,
            Err(LedgerError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_blocks_paging() {
        let (ledger, _) = ledger();
        for i in 1..=3 {
            ledger
                .append_block(dref(&format!("D{}", i)), delivery("P", 10.0))
                .await
                .unwrap();
        }
        let page = ledger.blocks(1, 1).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].block_number, 2);
        assert!(page.has_more());

        let clamped = ledger.blocks(0, 10_000).await.unwrap();
        assert_eq!(clamped.limit, 100);
        assert_eq!(clamped.items.len(), 3);
    }

    #[tokio::test]
    async fn test_stats() {
        let (ledger, _) = ledger();
        assert_eq!(
            ledger.stats().await.unwrap(),
            LedgerStats {
                total_blocks: 0,
                total_scans: 0,
                chain_valid: true,
                average_scans_per_delivery: 0.0,
            }
        );

        let mut tokens = Vec::new();
        for i in 1..=3 {
            let b = ledger
                .append_block(dref(&format!("D{}", i)), delivery("P", 10.0))
                .await
                .unwrap();
            tokens.push(b.qr_token);
        }
        ledger.record_scan(&tokens[0], ScanRequest::new("a")).await.unwrap();
        ledger.record_scan(&tokens[0], ScanRequest::new("b")).await.unwrap();

        let stats = ledger.stats().await.unwrap();
        assert_eq!(stats.total_blocks, 3);
        assert_eq!(stats.total_scans, 2);
        assert!(stats.chain_valid);
        assert_eq!(stats.average_scans_per_delivery, 0.67);
    }

    #[tokio::test]
    async fn test_qr_payload() {
        let (ledger, _) = ledger();
        let block = ledger.append_block(dref("D1"), delivery("P1", 500.0)).await.unwrap();
        let qr = ledger.qr_payload(&block.qr_token).await.unwrap();
        assert_eq!(
            qr.verify_url,
            format!("/api/v1/traceability/verify/{}", block.qr_token)
        );
        assert_eq!(qr.blockchain_hash, block.hash);
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_numbered_densely() {
        let ledger = Arc::new(Ledger::new(MemoryStore::new(), LedgerConfig::default()));
        let mut handles = Vec::new();
        for i in 0..32 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger
                    .append_block(DeliveryRef::new(format!("C{}", i)).unwrap(), delivery("P", 1.0 + i as f64))
                    .await
            }));
        }
        let mut numbers = Vec::new();
        for h in handles {
            numbers.push(h.await.unwrap().unwrap().block_number);
        }
        numbers.sort_unstable();
        assert_eq!(numbers, (1..=32).collect::<Vec<u64>>());
        assert!(ledger.verify_chain().await.unwrap().valid);
    }
}
