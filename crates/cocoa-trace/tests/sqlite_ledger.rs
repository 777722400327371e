//! Ledger over a file-backed SQLite store, including edits made behind the
//! ledger's back through a second connection.

use std::sync::Arc;

use cocoa_trace::core::{BlockStatus, ChainBreak, EncodingError, Value};
use cocoa_trace::store::SqliteStore;
use cocoa_trace::{
    DeliveryRef, Ledger, LedgerConfig, LedgerError, ManualClock, Payload, ScanRequest,
};
use tempfile::TempDir;

const T0: i64 = 1_712_000_000_000;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("cocoa_trace=debug")
        .with_test_writer()
        .try_init();
}

fn delivery(planter: &str, kg: f64) -> Payload {
    Payload::new()
        .with("planter_id", planter)
        .with("date", "2024-04-01")
        .with("quantity_kg", kg)
        .with("quality", "grade_1")
        .with("load_location", "Daloa")
        .with("unload_location", "Abidjan port")
        .with("vehicle", "AB-4521-CI")
}

fn open(dir: &TempDir, clock: Arc<ManualClock>) -> Ledger<SqliteStore> {
    let store = SqliteStore::open(dir.path().join("trace.db")).unwrap();
    Ledger::with_clock(Arc::new(store), LedgerConfig::default(), clock)
}

fn dref(s: &str) -> DeliveryRef {
    DeliveryRef::new(s).unwrap()
}

#[tokio::test]
async fn test_chain_survives_restart() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(T0));

    let (b1, b2) = {
        let ledger = open(&dir, clock.clone());
        let b1 = ledger.append_block(dref("D1"), delivery("P1", 812.5)).await.unwrap();
        clock.advance(90_000);
        let b2 = ledger.append_block(dref("D2"), delivery("P2", 430.0)).await.unwrap();
        (b1, b2)
    };

    clock.advance(30 * 24 * 3_600_000);
    let ledger = open(&dir, clock.clone());
    assert_eq!(ledger.get_block(&b1.qr_token).await.unwrap().hash, b1.hash);
    assert_eq!(ledger.tail().await.unwrap().unwrap().hash, b2.hash);

    let b3 = ledger.append_block(dref("D3"), delivery("P1", 95.0)).await.unwrap();
    assert_eq!(b3.block_number, 3);
    assert_eq!(b3.previous_hash, b2.hash);

    let chain = ledger.verify_chain().await.unwrap();
    assert!(chain.valid);
    assert_eq!(chain.total_blocks, 3);
}

#[tokio::test]
async fn test_payload_edit_through_sql_is_detected() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(T0));
    let ledger = open(&dir, clock.clone());

    let mut blocks = Vec::new();
    for i in 1..=4 {
        clock.advance(1_000);
        blocks.push(
            ledger
                .append_block(dref(&format!("D{}", i)), delivery("P1", 100.0 * i as f64))
                .await
                .unwrap(),
        );
    }

    let raw = rusqlite::Connection::open(dir.path().join("trace.db")).unwrap();
    let stored: String = raw
        .query_row("SELECT payload FROM blocks WHERE block_number = 3", [], |row| row.get(0))
        .unwrap();
    let edited = stored.replace("300.0", "3000.0");
    assert_ne!(edited, stored);
    raw.execute(
        "UPDATE blocks SET payload = ?1 WHERE block_number = 3",
        [edited.as_str()],
    )
    .unwrap();

    let single = ledger.verify_block(&blocks[2].qr_token).await.unwrap();
    assert!(!single.valid);
    assert_eq!(single.reason, BlockStatus::TamperedPayload);

    assert!(ledger.verify_block(&blocks[1].qr_token).await.unwrap().valid);

    let chain = ledger.verify_chain().await.unwrap();
    assert!(!chain.valid);
    assert_eq!(chain.first_break, Some(3));
    assert_eq!(chain.break_reason, Some(ChainBreak::TamperedPayload));

    assert!(!ledger.stats().await.unwrap().chain_valid);
}

#[tokio::test]
async fn test_numbers_reload_to_the_hashed_text() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(T0));
    let ledger = open(&dir, clock.clone());

    let too_wide = delivery("P1", 10.0).with("bags", Value::Integer(100_000_000_000_000_000_000));
    let err = ledger.append_block(dref("D0"), too_wide).await.unwrap_err();
    assert!(matches!(
        err,
        LedgerError::Encoding(EncodingError::IntegerOutOfRange { .. })
    ));

    let payload = delivery("P1", 10.0)
        .with("bags", u64::MAX)
        .with("debt", i64::MIN)
        .with("grams", 1e20)
        .with("ratio", 0.1);
    let block = ledger.append_block(dref("D1"), payload).await.unwrap();

    let reopened = open(&dir, clock.clone());
    let stored = reopened.get_block(&block.qr_token).await.unwrap();
    assert_eq!(stored.payload, block.payload);
    assert!(reopened.verify_block(&block.qr_token).await.unwrap().valid);
    assert!(reopened.verify_chain().await.unwrap().valid);
}

#[tokio::test]
async fn test_unreadable_rows_are_reported_as_breaks() {
    init_tracing();
    let edits = [
        ("payload", "not json", 2),
        ("payload", r#"{"quantity_kg":1e400}"#, 1),
        ("hash", "zz", 3),
        ("previous_hash", "", 2),
    ];

    for (column, value, at) in edits {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(T0));
        let ledger = open(&dir, clock.clone());
        let mut blocks = Vec::new();
        for i in 1..=4 {
            clock.advance(1_000);
            blocks.push(
                ledger
                    .append_block(dref(&format!("D{}", i)), delivery("P1", 10.0 * i as f64))
                    .await
                    .unwrap(),
            );
        }

        let raw = rusqlite::Connection::open(dir.path().join("trace.db")).unwrap();
        raw.execute(
            &format!("UPDATE blocks SET {} = ?1 WHERE block_number = ?2", column),
            rusqlite::params![value, at],
        )
        .unwrap();

        let chain = ledger.verify_chain().await.unwrap();
        assert!(!chain.valid, "{} = {:?}", column, value);
        assert_eq!(chain.first_break, Some(at as u64), "{} = {:?}", column, value);
        assert_eq!(chain.break_reason, Some(ChainBreak::TamperedPayload));
        assert_eq!(chain.total_blocks, 4);

        let token = &blocks[at as usize - 1].qr_token;
        let single = ledger.verify_block(token).await.unwrap();
        assert!(!single.valid);
        assert_eq!(single.reason, BlockStatus::TamperedPayload);
        assert_eq!(single.block_number, at as u64);
        assert_eq!(single.stored_hash, None);
        assert_eq!(single.delivery_ref, blocks[at as usize - 1].delivery_ref);

        let stats = ledger.stats().await.unwrap();
        assert!(!stats.chain_valid);
        assert_eq!(stats.total_blocks, 4);
    }
}

#[tokio::test]
async fn test_unreadable_row_after_first_batch() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(T0));
    let store = SqliteStore::open(dir.path().join("trace.db")).unwrap();
    let config = LedgerConfig {
        verify_batch_size: 2,
        ..LedgerConfig::default()
    };
    let ledger = Ledger::with_clock(Arc::new(store), config, clock.clone());
    for i in 1..=5 {
        clock.advance(1_000);
        ledger
            .append_block(dref(&format!("D{}", i)), delivery("P1", 10.0 * i as f64))
            .await
            .unwrap();
    }

    let raw = rusqlite::Connection::open(dir.path().join("trace.db")).unwrap();
    raw.execute("UPDATE blocks SET payload = '[' WHERE block_number = 4", [])
        .unwrap();

    let chain = ledger.verify_chain().await.unwrap();
    assert_eq!(chain.first_break, Some(4));
    assert_eq!(chain.break_reason, Some(ChainBreak::TamperedPayload));
}

#[tokio::test]
async fn test_relinked_block_breaks_at_successor() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(T0));
    let ledger = open(&dir, clock.clone());

    for i in 1..=3 {
        clock.advance(1_000);
        ledger
            .append_block(dref(&format!("D{}", i)), delivery("P1", 10.0 * i as f64))
            .await
            .unwrap();
    }

    // Rewrite block 2 consistently (payload and hash), leaving block 3's link stale.
    let mut b2 = ledger.get_block_by_number(2).await.unwrap();
    b2.payload.insert("quality", "grade_2");
    let new_hash = b2.recompute_hash().unwrap();
    let raw = rusqlite::Connection::open(dir.path().join("trace.db")).unwrap();
    raw.execute(
        "UPDATE blocks SET payload = ?1, hash = ?2 WHERE block_number = 2",
        [b2.payload.canonical_string().unwrap(), new_hash.to_hex()],
    )
    .unwrap();

    let chain = ledger.verify_chain().await.unwrap();
    assert_eq!(chain.first_break, Some(3));
    assert_eq!(chain.break_reason, Some(ChainBreak::BrokenLink));
}

#[tokio::test]
async fn test_scans_persist_in_order() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(T0));
    let ledger = open(&dir, clock.clone());

    let block = ledger.append_block(dref("D1"), delivery("P1", 500.0)).await.unwrap();
    clock.advance(60_000);
    ledger
        .record_scan(
            &block.qr_token,
            ScanRequest::new("agentA")
                .location("Abidjan")
                .scan_type("reception")
                .coordinates(5.3167, -4.0333),
        )
        .await
        .unwrap();
    ledger
        .record_scan(&block.qr_token, ScanRequest::new("agentB").notes("seal intact"))
        .await
        .unwrap();

    let timeline = ledger.timeline(block.qr_token.as_str()).await.unwrap();
    assert_eq!(timeline.total_scans, 2);
    let json = serde_json::to_value(&timeline).unwrap();
    assert_eq!(json["entries"][1]["scanned_by"], "agentA");
    assert_eq!(json["entries"][1]["coordinates"]["latitude"], 5.3167);
    assert_eq!(json["entries"][2]["description"], "seal intact");
}
