//! QR identity: the public token printed on a delivery.
//!
//! Token shape is `COCOA-{delivery_ref}-{hash_hex[..k]}`. The suffix starts at
//! 8 hex characters and grows by 4 (up to the full 64) only when a shorter
//! candidate is already taken, so almost every token is short enough to read
//! over the phone.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::block::Block;
use crate::error::ValidationError;
use crate::hash::BlockHash;
use crate::types::DeliveryRef;

/// Namespace prefix of every token.
pub const QR_NAMESPACE: &str = "COCOA";

/// Suffix length of the first candidate.
pub const INITIAL_SUFFIX_LEN: usize = 8;

/// Growth of the suffix between candidates.
pub const SUFFIX_STEP: usize = 4;

/// Longest possible suffix: the whole hash.
pub const MAX_SUFFIX_LEN: usize = 64;

/// Default path prefix for the verify URL embedded in a QR payload.
pub const DEFAULT_VERIFY_URL_BASE: &str = "/api/v1/traceability/verify";

/// A public QR token, unique across all blocks.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QrToken(String);

impl QrToken {
    /// Derive the token for a block with a suffix of `suffix_len` hex chars.
    ///
    /// `suffix_len` is clamped to [`MAX_SUFFIX_LEN`].
    pub fn derive(delivery_ref: &DeliveryRef, hash: &BlockHash, suffix_len: usize) -> Self {
        let hex = hash.to_hex();
        let k = suffix_len.min(MAX_SUFFIX_LEN);
        Self(format!("{}-{}-{}", QR_NAMESPACE, delivery_ref, &hex[..k]))
    }

    /// Parse a token received from the outside.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidQrToken(s.to_string());

        let rest = s
            .strip_prefix(QR_NAMESPACE)
            .and_then(|r| r.strip_prefix('-'))
            .ok_or_else(invalid)?;
        let (delivery, suffix) = rest.rsplit_once('-').ok_or_else(invalid)?;

        DeliveryRef::new(delivery).map_err(|_| invalid())?;
        if suffix.len() < INITIAL_SUFFIX_LEN || suffix.len() > MAX_SUFFIX_LEN {
            return Err(invalid());
        }
        if !suffix.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(invalid());
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The delivery reference embedded in the token.
    pub fn delivery_part(&self) -> &str {
        let rest = &self.0[QR_NAMESPACE.len() + 1..];
        rest.rsplit_once('-').map(|(d, _)| d).unwrap_or(rest)
    }

    /// The hash prefix embedded in the token.
    pub fn suffix(&self) -> &str {
        self.0.rsplit_once('-').map(|(_, s)| s).unwrap_or("")
    }
}

impl fmt::Debug for QrToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QrToken({})", self.0)
    }
}

impl fmt::Display for QrToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for QrToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for QrToken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        QrToken::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Candidate tokens in the order they are tried, at most `max_attempts`.
pub fn candidate_tokens<'a>(
    delivery_ref: &'a DeliveryRef,
    hash: &'a BlockHash,
    max_attempts: usize,
) -> impl Iterator<Item = QrToken> + 'a {
    (INITIAL_SUFFIX_LEN..=MAX_SUFFIX_LEN)
        .step_by(SUFFIX_STEP)
        .take(max_attempts)
        .map(move |k| QrToken::derive(delivery_ref, hash, k))
}

/// The document encoded into a printed QR code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrPayload {
    pub qr_code: QrToken,
    pub delivery_id: DeliveryRef,
    pub blockchain_hash: BlockHash,
    pub verify_url: String,
}

impl QrPayload {
    /// Build the QR document for a block.
    pub fn for_block(block: &Block, verify_url_base: &str) -> Self {
        Self {
            qr_code: block.qr_token.clone(),
            delivery_id: block.delivery_ref.clone(),
            blockchain_hash: block.hash,
            verify_url: format!("{}/{}", verify_url_base.trim_end_matches('/'), block.qr_token),
        }
    }
}
