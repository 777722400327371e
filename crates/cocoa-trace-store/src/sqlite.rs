//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend for the ledger. It uses rusqlite with
//! bundled SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use cocoa_trace_core::{
    Block, BlockHash, DeliveryRef, GeoPoint, Payload, QrToken, ScanEvent, ScanId,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{InsertResult, Store};

const BLOCK_COLUMNS: &str = "block_number, delivery_ref, payload, created_at, previous_hash, \
                             hash, qr_token, verified_at";

const SCAN_COLUMNS: &str = "scan_id, block_number, scanner_identity, location, scan_type, \
                            notes, latitude, longitude, scanned_at";

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` on the connection from a blocking task.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = lock(&conn)?;
            f(&mut conn)
        })
        .await?
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|e| StoreError::Poisoned(format!("connection mutex: {}", e)))
}

/// A `blocks` row before its text columns are parsed.
struct BlockRow {
    block_number: i64,
    delivery_ref: String,
    payload: String,
    created_at: i64,
    previous_hash: String,
    hash: String,
    qr_token: String,
    verified_at: Option<i64>,
}

impl BlockRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            block_number: row.get("block_number")?,
            delivery_ref: row.get("delivery_ref")?,
            payload: row.get("payload")?,
            created_at: row.get("created_at")?,
            previous_hash: row.get("previous_hash")?,
            hash: row.get("hash")?,
            qr_token: row.get("qr_token")?,
            verified_at: row.get("verified_at")?,
        })
    }
}

impl TryFrom<BlockRow> for Block {
    type Error = StoreError;

    fn try_from(row: BlockRow) -> Result<Self> {
        let block_number = u64::try_from(row.block_number).map_err(|e| {
            StoreError::InvalidData(format!("block number {}: {}", row.block_number, e))
        })?;
        let created_at = row.created_at;
        let invalid = |what: &str, e: &dyn std::fmt::Display| StoreError::CorruptBlock {
            block_number,
            created_at,
            reason: format!("{}: {}", what, e),
        };
        Ok(Block {
            block_number,
            delivery_ref: DeliveryRef::new(row.delivery_ref.as_str())
                .map_err(|e| invalid("delivery_ref", &e))?,
            payload: Payload::from_json_str(&row.payload).map_err(|e| invalid("payload", &e))?,
            created_at: row.created_at,
            previous_hash: BlockHash::from_hex(&row.previous_hash)
                .map_err(|e| invalid("previous_hash", &e))?,
            hash: BlockHash::from_hex(&row.hash).map_err(|e| invalid("hash", &e))?,
            qr_token: QrToken::parse(&row.qr_token).map_err(|e| invalid("qr_token", &e))?,
            verified_at: row.verified_at,
        })
    }
}

/// A `scans` row before its text columns are parsed.
struct ScanRow {
    scan_id: String,
    block_number: i64,
    scanner_identity: String,
    location: Option<String>,
    scan_type: String,
    notes: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    scanned_at: i64,
}

impl ScanRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            scan_id: row.get("scan_id")?,
            block_number: row.get("block_number")?,
            scanner_identity: row.get("scanner_identity")?,
            location: row.get("location")?,
            scan_type: row.get("scan_type")?,
            notes: row.get("notes")?,
            latitude: row.get("latitude")?,
            longitude: row.get("longitude")?,
            scanned_at: row.get("scanned_at")?,
        })
    }
}

impl TryFrom<ScanRow> for ScanEvent {
    type Error = StoreError;

    fn try_from(row: ScanRow) -> Result<Self> {
        let scan_id = ScanId::from_hex(&row.scan_id)
            .map_err(|e| StoreError::InvalidData(format!("scan {}: {}", row.scan_id, e)))?;
        let geo = match (row.latitude, row.longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoPoint {
                latitude,
                longitude,
            }),
            _ => None,
        };
        let block_number = u64::try_from(row.block_number).map_err(|e| {
            StoreError::InvalidData(format!("scan {} block number: {}", row.scan_id, e))
        })?;
        Ok(ScanEvent {
            scan_id,
            block_number,
            scanner_identity: row.scanner_identity,
            location: row.location,
            scan_type: row.scan_type,
            notes: row.notes,
            geo,
            scanned_at: row.scanned_at,
        })
    }
}

/// Convert a non-negative SQLite integer, rejecting anything else as bad data.
fn to_u64(value: i64, what: &str) -> Result<u64> {
    u64::try_from(value).map_err(|e| StoreError::InvalidData(format!("{} {}: {}", what, value, e)))
}

/// Bind a `u64` as a SQLite integer.
fn to_i64(value: u64, what: &str) -> Result<i64> {
    i64::try_from(value).map_err(|e| StoreError::InvalidData(format!("{} {}: {}", what, value, e)))
}

fn query_block(conn: &Connection, filter: &str, param: &dyn rusqlite::ToSql) -> Result<Option<Block>> {
    let sql = format!("SELECT {} FROM blocks WHERE {} = ?1", BLOCK_COLUMNS, filter);
    conn.query_row(&sql, params![param], BlockRow::from_row)
        .optional()?
        .map(Block::try_from)
        .transpose()
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_block(&self, block: &Block, canonical_payload: &str) -> Result<InsertResult> {
        let block = block.clone();
        let canonical_payload = canonical_payload.to_string();

        self.run(move |conn| {
            // IMMEDIATE takes the write lock up front, so the checks below
            // stay valid until commit even with other processes on the file.
            let block_number = to_i64(block.block_number, "block number")?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let existing_delivery: Option<i64> = tx
                .query_row(
                    "SELECT block_number FROM blocks WHERE delivery_ref = ?1",
                    params![block.delivery_ref.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(existing) = existing_delivery {
                return Ok(InsertResult::DuplicateDelivery {
                    existing: to_u64(existing, "block number")?,
                });
            }

            let existing_position: Option<String> = tx
                .query_row(
                    "SELECT hash FROM blocks WHERE block_number = ?1",
                    params![block_number],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(hash) = existing_position {
                let existing = BlockHash::from_hex(&hash)
                    .map_err(|e| StoreError::InvalidData(e.to_string()))?;
                return Ok(InsertResult::PositionTaken { existing });
            }

            let token_taken: bool = tx
                .query_row(
                    "SELECT 1 FROM blocks WHERE qr_token = ?1",
                    params![block.qr_token.as_str()],
                    |_| Ok(true),
                )
                .optional()?
                .unwrap_or(false);
            if token_taken {
                return Ok(InsertResult::TokenTaken);
            }

            tx.execute(
                "INSERT INTO blocks (
                    block_number, delivery_ref, payload, created_at,
                    previous_hash, hash, qr_token, verified_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    block_number,
                    block.delivery_ref.as_str(),
                    canonical_payload,
                    block.created_at,
                    block.previous_hash.to_hex(),
                    block.hash.to_hex(),
                    block.qr_token.as_str(),
                    block.verified_at,
                ],
            )?;
            tx.commit()?;

            Ok(InsertResult::Inserted)
        })
        .await
    }

    async fn get_block(&self, block_number: u64) -> Result<Option<Block>> {
        self.run(move |conn| {
            let block_number = to_i64(block_number, "block number")?;
            query_block(conn, "block_number", &block_number)
        })
        .await
    }

    async fn get_block_by_token(&self, token: &QrToken) -> Result<Option<Block>> {
        let token = token.as_str().to_string();
        self.run(move |conn| query_block(conn, "qr_token", &token)).await
    }

    async fn get_block_by_delivery(&self, delivery_ref: &DeliveryRef) -> Result<Option<Block>> {
        let delivery_ref = delivery_ref.as_str().to_string();
        self.run(move |conn| query_block(conn, "delivery_ref", &delivery_ref))
            .await
    }

    async fn has_token(&self, token: &QrToken) -> Result<bool> {
        let token = token.as_str().to_string();
        self.run(move |conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM blocks WHERE qr_token = ?1",
                    params![token],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    async fn tail(&self) -> Result<Option<Block>> {
        self.run(|conn| {
            let sql = format!(
                "SELECT {} FROM blocks ORDER BY block_number DESC LIMIT 1",
                BLOCK_COLUMNS
            );
            conn.query_row(&sql, [], BlockRow::from_row)
                .optional()?
                .map(Block::try_from)
                .transpose()
        })
        .await
    }

    async fn blocks_range(&self, offset: u64, limit: u64) -> Result<Vec<Block>> {
        self.run(move |conn| {
            let sql = format!(
                "SELECT {} FROM blocks ORDER BY block_number LIMIT ?1 OFFSET ?2",
                BLOCK_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    params![
                        i64::try_from(limit).unwrap_or(i64::MAX),
                        i64::try_from(offset).unwrap_or(i64::MAX)
                    ],
                    BlockRow::from_row,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(Block::try_from).collect()
        })
        .await
    }

    async fn block_count(&self) -> Result<u64> {
        self.run(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM blocks", [], |row| row.get(0))?;
            to_u64(count, "block count")
        })
        .await
    }

    async fn mark_verified(&self, block_number: u64, at: i64) -> Result<()> {
        self.run(move |conn| {
            let updated = conn.execute(
                "UPDATE blocks SET verified_at = ?1 WHERE block_number = ?2",
                params![at, to_i64(block_number, "block number")?],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound(format!("block #{}", block_number)));
            }
            Ok(())
        })
        .await
    }

    async fn insert_scan(&self, scan: &ScanEvent) -> Result<()> {
        let scan = scan.clone();
        self.run(move |conn| {
            let block_number = to_i64(scan.block_number, "block number")?;
            let exists = conn
                .query_row(
                    "SELECT 1 FROM blocks WHERE block_number = ?1",
                    params![block_number],
                    |_| Ok(()),
                )
                .optional()?;
            if exists.is_none() {
                return Err(StoreError::NotFound(format!("block #{}", scan.block_number)));
            }

            conn.execute(
                "INSERT INTO scans (
                    scan_id, block_number, scanner_identity, location, scan_type,
                    notes, latitude, longitude, scanned_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    scan.scan_id.to_hex(),
                    block_number,
                    scan.scanner_identity,
                    scan.location,
                    scan.scan_type,
                    scan.notes,
                    scan.geo.map(|g| g.latitude),
                    scan.geo.map(|g| g.longitude),
                    scan.scanned_at,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn scans_for_block(&self, block_number: u64) -> Result<Vec<ScanEvent>> {
        self.run(move |conn| {
            let sql = format!(
                "SELECT {} FROM scans WHERE block_number = ?1 ORDER BY scanned_at, seq",
                SCAN_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![to_i64(block_number, "block number")?], ScanRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(ScanEvent::try_from).collect()
        })
        .await
    }

    async fn count_scans(&self, block_number: u64) -> Result<u64> {
        self.run(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM scans WHERE block_number = ?1",
                params![to_i64(block_number, "block number")?],
                |row| row.get(0),
            )?;
            to_u64(count, "scan count")
        })
        .await
    }

    async fn total_scans(&self) -> Result<u64> {
        self.run(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM scans", [], |row| row.get(0))?;
            to_u64(count, "scan count")
        })
        .await
    }
}
