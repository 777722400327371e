//! Timeline of a delivery: its creation followed by every scan.

use serde::{Deserialize, Serialize};

use crate::block::Block;
use crate::hash::BlockHash;
use crate::qr::QrToken;
use crate::scan::{sort_scans, ScanEvent};
use crate::types::{DeliveryRef, GeoPoint, Payload};

/// One entry of a timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimelineEntry {
    Creation {
        title: String,
        description: String,
        block_number: u64,
        timestamp: i64,
        data: Payload,
    },
    Scan {
        title: String,
        description: String,
        scan_type: String,
        scanned_by: String,
        location: Option<String>,
        coordinates: Option<GeoPoint>,
        timestamp: i64,
    },
}

impl TimelineEntry {
    pub fn timestamp(&self) -> i64 {
        match self {
            TimelineEntry::Creation { timestamp, .. } | TimelineEntry::Scan { timestamp, .. } => {
                *timestamp
            }
        }
    }

    fn creation(block: &Block) -> Self {
        TimelineEntry::Creation {
            title: "Delivery created".to_string(),
            description: format!("Delivery recorded in the ledger (block #{})", block.block_number),
            block_number: block.block_number,
            timestamp: block.created_at,
            data: block.payload.clone(),
        }
    }

    fn scan(scan: ScanEvent) -> Self {
        let description = match &scan.notes {
            Some(notes) if !notes.is_empty() => notes.clone(),
            _ => format!("Scanned by {}", scan.scanner_identity),
        };
        TimelineEntry::Scan {
            title: format!("Scan: {}", scan.scan_type),
            description,
            scan_type: scan.scan_type,
            scanned_by: scan.scanner_identity,
            location: scan.location,
            coordinates: scan.geo,
            timestamp: scan.scanned_at,
        }
    }
}

/// Creation plus scans of one block, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub qr_token: QrToken,
    pub delivery_ref: DeliveryRef,
    pub block_hash: BlockHash,
    pub block_number: u64,
    pub entries: Vec<TimelineEntry>,
    pub total_scans: u64,
}

impl Timeline {
    /// Merge a block with its scans.
    ///
    /// The creation entry always comes first; scans follow by `scanned_at`
    /// with ties kept in the order given.
    pub fn build(block: &Block, mut scans: Vec<ScanEvent>) -> Self {
        sort_scans(&mut scans);
        let total_scans = scans.len() as u64;
        let mut entries = Vec::with_capacity(scans.len() + 1);
        entries.push(TimelineEntry::creation(block));
        entries.extend(scans.into_iter().map(TimelineEntry::scan));
        Self {
            qr_token: block.qr_token.clone(),
            delivery_ref: block.delivery_ref.clone(),
            block_hash: block.hash,
            block_number: block.block_number,
            entries,
            total_scans,
        }
    }
}
