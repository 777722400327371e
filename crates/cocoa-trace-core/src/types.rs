//! Strong type definitions for the traceability ledger.
//!
//! Identifiers are newtypes so a delivery reference cannot be passed where a
//! QR token is expected, and so their format is checked once at the edge.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde::ser::SerializeMap;
use std::fmt;

use crate::canonical::{self, Value};
use crate::error::{EncodingResult, ValidationError};

/// Maximum length of a delivery reference.
pub const MAX_DELIVERY_REF_LEN: usize = 128;

/// Opaque identifier of a delivery in the wider back office.
///
/// Accepted characters are ASCII alphanumerics plus `-`, `_` and `.`, since
/// the reference is printed inside a QR token.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeliveryRef(String);

impl DeliveryRef {
    /// Validate and wrap a delivery reference.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        if value.is_empty() {
            return Err(ValidationError::InvalidDeliveryRef {
                value,
                reason: "must not be empty".into(),
            });
        }
        if value.len() > MAX_DELIVERY_REF_LEN {
            return Err(ValidationError::InvalidDeliveryRef {
                reason: format!("longer than {} characters", MAX_DELIVERY_REF_LEN),
                value,
            });
        }
        if let Some(c) = value
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(ValidationError::InvalidDeliveryRef {
                reason: format!("character {:?} not allowed", c),
                value,
            });
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DeliveryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeliveryRef({})", self.0)
    }
}

impl fmt::Display for DeliveryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DeliveryRef {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for DeliveryRef {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl Serialize for DeliveryRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for DeliveryRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        DeliveryRef::new(s).map_err(serde::de::Error::custom)
    }
}

/// Snapshot of delivery attributes stored in a block.
///
/// Top-level keys are unique: [`Payload::insert`] replaces an existing entry.
/// Entry order is kept for display but never affects the hash or equality.
#[derive(Debug, Clone, Default)]
pub struct Payload(Vec<(String, Value)>);

impl PartialEq for Payload {
    fn eq(&self, other: &Self) -> bool {
        canonical::entries_eq(&self.0, &other.0)
    }
}

impl Payload {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Insert or replace a field, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.0.push((key, value));
                None
            }
        }
    }

    /// Builder-style [`Payload::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The payload as a map value.
    pub fn to_value(&self) -> Value {
        Value::Map(self.0.clone())
    }

    /// Canonical bytes of the payload alone.
    pub fn canonical_bytes(&self) -> EncodingResult<Vec<u8>> {
        canonical::canonical_bytes(&self.to_value())
    }

    /// Canonical text of the payload, as persisted by stores.
    pub fn canonical_string(&self) -> EncodingResult<String> {
        canonical::canonical_string(&self.to_value())
    }

    /// Parse a payload from JSON text (for example a stored canonical string).
    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Payload {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut payload = Payload::new();
        for (k, v) in iter {
            payload.insert(k, v);
        }
        payload
    }
}

impl TryFrom<Value> for Payload {
    type Error = ValidationError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Map(entries) => Ok(entries.into_iter().collect()),
            _ => Err(ValidationError::invalid("payload", "must be a map")),
        }
    }
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Payload::try_from(value).map_err(serde::de::Error::custom)
    }
}

/// Random 128-bit identifier of a scan event.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScanId(pub [u8; 16]);

impl ScanId {
    /// Draw a fresh identifier from the thread RNG.
    pub fn random() -> Self {
        Self(rand::random())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, ValidationError> {
        let bytes = hex::decode(s).map_err(|e| ValidationError::invalid("scan_id", e.to_string()))?;
        let arr: [u8; 16] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| ValidationError::invalid("scan_id", "expected 16 bytes"))?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScanId({})", &self.to_hex()[..8])
    }
}

impl fmt::Display for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for ScanId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ScanId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ScanId::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// WGS84 coordinates attached to a scan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Build a point, rejecting non-finite or out-of-range coordinates.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, ValidationError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(ValidationError::invalid("latitude", "must be within [-90, 90]"));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(ValidationError::invalid("longitude", "must be within [-180, 180]"));
        }
        Ok(Self { latitude, longitude })
    }
}

/// One page of an ordered listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub offset: u64,
    pub limit: u64,
    pub total: u64,
}

impl<T> Page<T> {
    /// Whether another page follows this one.
    pub fn has_more(&self) -> bool {
        self.offset + (self.items.len() as u64) < self.total
    }
}
