//! Block hashing.
//!
//! Blocks are hashed with SHA-256 over a domain tag followed by the canonical
//! encoding of `{block_number, created_at, data, previous_hash}`. The domain
//! tag keeps block hashes from colliding with any other SHA-256 use of the
//! same bytes.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::canonical::{canonical_bytes, Value};
use crate::error::{EncodingResult, ValidationError};
use crate::types::Payload;

/// Domain separator prepended to every block hash preimage.
pub const BLOCK_HASH_DOMAIN: &[u8] = b"cocoa-trace/block/v1";

/// A 32-byte SHA-256 block hash.
///
/// Rendered everywhere (JSON, storage, QR tokens) as 64 lowercase hex
/// characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockHash(pub [u8; 32]);

impl BlockHash {
    /// The genesis sentinel: the `previous_hash` of block 1.
    pub const ZERO: Self = Self([0u8; 32]);

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to a 64-character lowercase hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, ValidationError> {
        let bytes = hex::decode(s).map_err(|e| ValidationError::InvalidHash(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| ValidationError::InvalidHash(format!("expected 32 bytes, got {}", bytes.len())))?;
        Ok(Self(arr))
    }

    /// Whether this is the genesis sentinel.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl AsRef<[u8]> for BlockHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for BlockHash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl Serialize for BlockHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for BlockHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        BlockHash::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// SHA-256 of arbitrary bytes.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Build the canonical preimage of a block hash, without the domain tag.
pub fn block_hash_preimage(
    block_number: u64,
    previous_hash: &BlockHash,
    created_at: i64,
    payload: &Payload,
) -> EncodingResult<Vec<u8>> {
    let envelope = Value::map([
        ("block_number", Value::from(block_number)),
        ("created_at", Value::from(created_at)),
        ("data", payload.to_value()),
        ("previous_hash", Value::from(previous_hash.to_hex())),
    ]);
    canonical_bytes(&envelope)
}

/// Compute the hash of a block from its hashed fields.
///
/// Pure: the same inputs always give the same hash. `created_at` must be the
/// value stored with the block, never a fresh clock reading.
pub fn compute_block_hash(
    block_number: u64,
    previous_hash: &BlockHash,
    created_at: i64,
    payload: &Payload,
) -> EncodingResult<BlockHash> {
    let preimage = block_hash_preimage(block_number, previous_hash, created_at, payload)?;
    let mut hasher = Sha256::new();
    hasher.update(BLOCK_HASH_DOMAIN);
    hasher.update(&preimage);
    Ok(BlockHash(hasher.finalize().into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> Payload {
        let mut p = Payload::new();
        p.insert("quantity_kg", 500.0);
        p.insert("quality", "A");
        p
    }

    #[test]
    fn test_hex_roundtrip_and_zero() {
        let hash = BlockHash::from_bytes([0xab; 32]);
        assert_eq!(BlockHash::from_hex(&hash.to_hex()).unwrap(), hash);
        assert_eq!(BlockHash::ZERO.to_hex(), "0".repeat(64));
        assert!(BlockHash::ZERO.is_zero());
        assert!(!hash.is_zero());
    }

    #[test]
    fn test_from_hex_rejects_bad_input() {
        assert!(BlockHash::from_hex("abcd").is_err());
        assert!(BlockHash::from_hex(&"zz".repeat(32)).is_err());
    }

    #[test]
    fn test_serde_as_hex() {
        let hash = BlockHash::from_bytes([0x01; 32]);
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", "01".repeat(32)));
        let back: BlockHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }

    #[test]
    fn test_preimage_shape() {
        let preimage = block_hash_preimage(3, &BlockHash::ZERO, 1_700_000_000_000, &payload()).unwrap();
        let expected = format!(
            r#"{{"block_number":3,"created_at":1700000000000,"data":{{"quality":"A","quantity_kg":500.0}},"previous_hash":"{}"}}"#,
            "0".repeat(64)
        );
        assert_eq!(String::from_utf8(preimage).unwrap(), expected);
    }

    #[test]
    fn test_hash_deterministic() {
        let a = compute_block_hash(1, &BlockHash::ZERO, 42, &payload()).unwrap();
        let b = compute_block_hash(1, &BlockHash::ZERO, 42, &payload()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_every_input_changes_hash() {
        let base = compute_block_hash(1, &BlockHash::ZERO, 42, &payload()).unwrap();
        assert_ne!(base, compute_block_hash(2, &BlockHash::ZERO, 42, &payload()).unwrap());
        assert_ne!(base, compute_block_hash(1, &BlockHash::from_bytes([1; 32]), 42, &payload()).unwrap());
        assert_ne!(base, compute_block_hash(1, &BlockHash::ZERO, 43, &payload()).unwrap());

        let mut altered = payload();
        altered.insert("quantity_kg", 501.0);
        assert_ne!(base, compute_block_hash(1, &BlockHash::ZERO, 42, &altered).unwrap());
    }

    #[test]
    fn test_domain_tag_applied() {
        let preimage = block_hash_preimage(1, &BlockHash::ZERO, 42, &payload()).unwrap();
        let hash = compute_block_hash(1, &BlockHash::ZERO, 42, &payload()).unwrap();
        assert_ne!(hash.0, sha256(&preimage));
    }
}
