//! Scan events: physical custody checks recorded against a block.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::types::{GeoPoint, ScanId};

/// Scan type used when the request names none.
pub const DEFAULT_SCAN_TYPE: &str = "verification";

/// Scan types the back office knows about. Others are accepted as-is.
pub const KNOWN_SCAN_TYPES: &[&str] = &["verification", "transfer", "quality_check", "reception"];

pub const MAX_SCANNER_IDENTITY_LEN: usize = 255;
pub const MAX_LOCATION_LEN: usize = 255;
pub const MAX_SCAN_TYPE_LEN: usize = 50;

/// An append-only record that someone scanned a block's QR code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanEvent {
    pub scan_id: ScanId,
    pub block_number: u64,
    pub scanner_identity: String,
    pub location: Option<String>,
    pub scan_type: String,
    pub notes: Option<String>,
    pub geo: Option<GeoPoint>,
    /// Unix milliseconds.
    pub scanned_at: i64,
}

/// Caller input for recording a scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanRequest {
    pub scanner_identity: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub scan_type: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl ScanRequest {
    pub fn new(scanner_identity: impl Into<String>) -> Self {
        Self {
            scanner_identity: scanner_identity.into(),
            ..Default::default()
        }
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn scan_type(mut self, scan_type: impl Into<String>) -> Self {
        self.scan_type = Some(scan_type.into());
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn coordinates(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    /// Validate the request and turn it into an event for `block_number`.
    ///
    /// Coordinates are kept only when both are present.
    pub fn into_event(
        self,
        scan_id: ScanId,
        block_number: u64,
        scanned_at: i64,
    ) -> Result<ScanEvent, ValidationError> {
        let scanner_identity = self.scanner_identity.trim().to_string();
        if scanner_identity.is_empty() {
            return Err(ValidationError::MissingField("scanner_identity".into()));
        }
        check_len("scanner_identity", &scanner_identity, MAX_SCANNER_IDENTITY_LEN)?;

        let location = self.location.filter(|l| !l.trim().is_empty());
        if let Some(l) = &location {
            check_len("location", l, MAX_LOCATION_LEN)?;
        }

        let scan_type = match self.scan_type {
            Some(t) if !t.trim().is_empty() => t.trim().to_string(),
            _ => DEFAULT_SCAN_TYPE.to_string(),
        };
        check_len("scan_type", &scan_type, MAX_SCAN_TYPE_LEN)?;

        let geo = match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some(GeoPoint::new(lat, lng)?),
            (None, None) => None,
            (Some(_), None) => return Err(ValidationError::MissingField("longitude".into())),
            (None, Some(_)) => return Err(ValidationError::MissingField("latitude".into())),
        };

        Ok(ScanEvent {
            scan_id,
            block_number,
            scanner_identity,
            location,
            scan_type,
            notes: self.notes,
            geo,
            scanned_at,
        })
    }
}

fn check_len(field: &str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.chars().count() > max {
        return Err(ValidationError::invalid(
            field,
            format!("longer than {} characters", max),
        ));
    }
    Ok(())
}

/// Order scans by `scanned_at`, keeping insertion order for ties.
pub fn sort_scans(scans: &mut [ScanEvent]) {
    scans.sort_by_key(|s| s.scanned_at);
}
