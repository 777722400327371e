//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;

use cocoa_trace::{Ledger, LedgerConfig, ManualClock};
use cocoa_trace_core::{Block, DeliveryRef, Payload, ScanRequest, Value};
use cocoa_trace_store::MemoryStore;

/// Start of fixture time: 2024-03-01T00:00:00Z.
pub const FIXTURE_EPOCH: i64 = 1_709_251_200_000;

/// Parse a delivery reference, panicking on malformed input.
pub fn delivery_ref(s: &str) -> DeliveryRef {
    DeliveryRef::new(s).expect("fixture delivery ref must be valid")
}

/// A delivery payload carrying every default required field.
pub fn sample_payload(planter: &str, quantity_kg: f64) -> Payload {
    Payload::new()
        .with("planter_id", planter)
        .with("date", "2024-03-01")
        .with("quantity_kg", quantity_kg)
        .with("quality", "A")
        .with("load_location", "Soubré")
        .with("unload_location", "San Pedro")
}

/// A scan by `who` at `location` with the default scan type.
pub fn scan_at(who: &str, location: &str) -> ScanRequest {
    ScanRequest::new(who).location(location)
}

/// A ledger over a memory store, driven by a manual clock.
pub struct TestFixture {
    pub ledger: Ledger<MemoryStore>,
    pub clock: Arc<ManualClock>,
}

impl TestFixture {
    /// Create a fixture with the default configuration, clock at
    /// [`FIXTURE_EPOCH`].
    pub fn new() -> Self {
        Self::with_config(LedgerConfig::default())
    }

    pub fn with_config(config: LedgerConfig) -> Self {
        let clock = Arc::new(ManualClock::new(FIXTURE_EPOCH));
        let ledger = Ledger::with_clock(Arc::new(MemoryStore::new()), config, clock.clone());
        Self { ledger, clock }
    }

    /// The underlying store.
    pub fn store(&self) -> &MemoryStore {
        self.ledger.store()
    }

    /// Append `count` deliveries `D1..=Dcount`, one minute apart.
    pub async fn populate(&self, count: usize) -> Vec<Block> {
        let mut blocks = Vec::with_capacity(count);
        for i in 1..=count {
            let block = self
                .ledger
                .append_block(
                    delivery_ref(&format!("D{}", i)),
                    sample_payload(&format!("P-{}", i % 3), 100.0 + i as f64),
                )
                .await
                .expect("fixture append must succeed");
            blocks.push(block);
            self.clock.advance(60_000);
        }
        blocks
    }

    /// Rewrite one payload field of a stored block without touching its
    /// hash, the way an out-of-band edit would.
    pub async fn tamper(&self, block_number: u64, key: &str, value: impl Into<Value>) {
        let mut block = self
            .ledger
            .get_block_by_number(block_number)
            .await
            .expect("block to tamper must exist");
        block.payload.insert(key, value);
        self.store()
            .overwrite_block(block)
            .expect("memory store overwrite must succeed");
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}
