//! Canonical text encoding for deterministic hashing.
//!
//! Delivery snapshots arrive as dynamic field/value mappings. Before they can
//! be hashed they are rendered into one exact byte sequence:
//! - Map keys sorted by byte-wise comparison, recursively
//! - No insignificant whitespace
//! - Integers in plain base-10
//! - Floats in shortest round-trip form, always with a `.` or exponent
//! - Strings quoted with a fixed escape table, non-ASCII left as UTF-8
//!
//! The output is valid JSON, so stored snapshots can be read back with any
//! JSON parser and re-canonicalized to the same bytes.
//!
//! **CRITICAL**: This encoding is FROZEN. Changing it invalidates every
//! stored block hash.

use std::fmt;

use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::error::{EncodingError, EncodingResult};

/// Maximum nesting of arrays/maps inside a payload.
pub const MAX_DEPTH: usize = 32;

/// A dynamic payload value.
///
/// Maps keep insertion order; only the canonical encoding sorts them. This
/// lets tests (and callers) build the same mapping in different orders and
/// observe identical bytes. Equality ignores map order for the same reason.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i128),
    Float(f64),
    Text(String),
    Array(Vec<Value>),
    Map(Vec<(String, Value)>),
}

impl Value {
    /// Build a map value from entries, keeping their order.
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Look up a key in a map value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view of the value, if it is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Convert into a `serde_json::Value`.
    ///
    /// Non-finite floats have no JSON form and become `null`; run
    /// [`canonical_bytes`] first when that matters.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Integer(i) => {
                if let Ok(n) = i64::try_from(*i) {
                    serde_json::Value::from(n)
                } else if let Ok(n) = u64::try_from(*i) {
                    serde_json::Value::from(n)
                } else {
                    serde_json::Number::from_f64(*i as f64)
                        .map(serde_json::Value::Number)
                        .unwrap_or(serde_json::Value::Null)
                }
            }
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => entries_eq(a, b),
            _ => false,
        }
    }
}

/// Compare two entry lists as mappings, ignoring their order.
pub(crate) fn entries_eq(a: &[(String, Value)], b: &[(String, Value)]) -> bool {
    a.len() == b.len()
        && a.iter()
            .all(|(k, v)| b.iter().any(|(bk, bv)| bk == k && bv == v))
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Integer(i.into())
                } else if let Some(u) = n.as_u64() {
                    Value::Integer(u.into())
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i.into())
    }
}

impl From<u64> for Value {
    fn from(i: u64) -> Self {
        Value::Integer(i.into())
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Integer(i) => {
                if let Ok(n) = i64::try_from(*i) {
                    serializer.serialize_i64(n)
                } else if let Ok(n) = u64::try_from(*i) {
                    serializer.serialize_u64(n)
                } else {
                    serializer.serialize_f64(*i as f64)
                }
            }
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

/// Encode a value to canonical bytes.
pub fn canonical_bytes(value: &Value) -> EncodingResult<Vec<u8>> {
    canonical_string(value).map(String::into_bytes)
}

/// Encode a value to a canonical string.
pub fn canonical_string(value: &Value) -> EncodingResult<String> {
    let mut buf = String::new();
    encode_value_to(&mut buf, value, &mut Path::root())?;
    Ok(buf)
}

/// Location inside the value tree, for error messages.
struct Path {
    segments: Vec<String>,
}

impl Path {
    fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    fn depth(&self) -> usize {
        self.segments.len()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$")?;
        for seg in &self.segments {
            write!(f, "{}", seg)?;
        }
        Ok(())
    }
}

/// Recursively encode a value.
fn encode_value_to(buf: &mut String, value: &Value, path: &mut Path) -> EncodingResult<()> {
    match value {
        Value::Null => buf.push_str("null"),
        Value::Bool(true) => buf.push_str("true"),
        Value::Bool(false) => buf.push_str("false"),
        Value::Integer(i) => encode_integer(buf, *i, path)?,
        Value::Float(f) => encode_float(buf, *f, path)?,
        Value::Text(s) => encode_text(buf, s),
        Value::Array(items) => encode_array(buf, items, path)?,
        Value::Map(entries) => encode_map_canonical(buf, entries, path)?,
    }
    Ok(())
}

/// Encode an integer in base 10.
///
/// Only the i64 and u64 ranges are accepted: anything wider comes back from
/// a JSON reader as a float and would re-encode differently.
fn encode_integer(buf: &mut String, i: i128, path: &Path) -> EncodingResult<()> {
    if i64::try_from(i).is_err() && u64::try_from(i).is_err() {
        return Err(EncodingError::IntegerOutOfRange {
            path: path.to_string(),
        });
    }
    buf.push_str(&i.to_string());
    Ok(())
}

/// Encode a float in shortest round-trip form.
///
/// `{:?}` on `f64` always keeps a `.` or an exponent, which keeps floats
/// distinguishable from integers in the canonical text.
fn encode_float(buf: &mut String, f: f64, path: &Path) -> EncodingResult<()> {
    if !f.is_finite() {
        return Err(EncodingError::NonFiniteNumber {
            path: path.to_string(),
        });
    }
    let f = if f == 0.0 { 0.0 } else { f };
    buf.push_str(&format!("{:?}", f));
    Ok(())
}

/// Encode a quoted string with the fixed escape table.
fn encode_text(buf: &mut String, s: &str) {
    buf.push('"');
    for ch in s.chars() {
        match ch {
            '"' => buf.push_str("\\\""),
            '\\' => buf.push_str("\\\\"),
            '\u{08}' => buf.push_str("\\b"),
            '\u{0c}' => buf.push_str("\\f"),
            '\n' => buf.push_str("\\n"),
            '\r' => buf.push_str("\\r"),
            '\t' => buf.push_str("\\t"),
            c if (c as u32) < 0x20 => buf.push_str(&format!("\\u{:04x}", c as u32)),
            c => buf.push(c),
        }
    }
    buf.push('"');
}

fn encode_array(buf: &mut String, items: &[Value], path: &mut Path) -> EncodingResult<()> {
    if path.depth() >= MAX_DEPTH {
        return Err(EncodingError::TooDeep {
            path: path.to_string(),
            max: MAX_DEPTH,
        });
    }
    buf.push('[');
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            buf.push(',');
        }
        path.segments.push(format!("[{}]", i));
        encode_value_to(buf, item, path)?;
        path.segments.pop();
    }
    buf.push(']');
    Ok(())
}

/// Encode a map canonically.
///
/// Keys are sorted by their UTF-8 bytes, which for `str` is also code point
/// order.
fn encode_map_canonical(
    buf: &mut String,
    entries: &[(String, Value)],
    path: &mut Path,
) -> EncodingResult<()> {
    if path.depth() >= MAX_DEPTH {
        return Err(EncodingError::TooDeep {
            path: path.to_string(),
            max: MAX_DEPTH,
        });
    }

    let mut sorted: Vec<&(String, Value)> = entries.iter().collect();
    sorted.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

    for pair in sorted.windows(2) {
        if pair[0].0 == pair[1].0 {
            return Err(EncodingError::DuplicateKey {
                path: path.to_string(),
                key: pair[0].0.clone(),
            });
        }
    }

    buf.push('{');
    for (i, (key, value)) in sorted.into_iter().enumerate() {
        if i > 0 {
            buf.push(',');
        }
        encode_text(buf, key);
        buf.push(':');
        path.segments.push(format!(".{}", key));
        encode_value_to(buf, value, path)?;
        path.segments.pop();
    }
    buf.push('}');
    Ok(())
}
