//! Core type definitions for remdb identifiers, timestamps, and values.
//!
//! This module defines the fundamental types used throughout remdb.
//! Entity ids use UUID v7 for time-ordered unique identification, and
//! property payloads are held as the tagged-union [`Value`] type.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Entity identifier (UUID v7 for time-ordering).
///
/// Every stored object, schemas included, is an
/// entity addressed by `(tenant, type, EntityId)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub Uuid);

impl EntityId {
    /// Creates a new EntityId with a UUID v7 (time-ordered).
    #[inline]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a nil (all zeros) EntityId.
    /// Useful for testing or sentinel values.
    #[inline]
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Returns the raw UUID bytes for storage.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Creates an EntityId from raw bytes.
    #[inline]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Parses an EntityId from its hyphenated string form.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for EntityId {
    /// Returns a nil (all zeros) EntityId.
    ///
    /// For a new unique id, use [`EntityId::new()`].
    fn default() -> Self {
        Self::nil()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unix timestamp in milliseconds.
///
/// Using i64 allows representing dates far into the future and past.
/// Millisecond precision is sufficient for write ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Creates a timestamp for the current moment.
    ///
    /// If the system clock is before the Unix epoch (should never happen
    /// in practice), returns a timestamp of 0 (epoch) rather than panicking.
    #[inline]
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_millis() as i64)
    }

    /// Creates a timestamp from Unix milliseconds.
    #[inline]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as Unix milliseconds.
    #[inline]
    pub const fn as_millis(&self) -> i64 {
        self.0
    }

    /// Returns big-endian bytes for storage (enables lexicographic ordering).
    #[inline]
    pub fn to_be_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Embedding vector type alias.
///
/// Embeddings are f32 vectors of fixed per-schema dimension.
pub type Embedding = Vec<f32>;

/// Tagged-union property value.
///
/// Entity properties are schemaless nested maps of these values. The
/// JSON-Schema validator narrows each value at write time; callers receive
/// values back as this union and project them after reading.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Absent/null value.
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// UTF-8 string.
    Str(String),
    /// Raw bytes (never produced from JSON input; used by internal records).
    Bytes(Vec<u8>),
    /// Ordered list.
    List(Vec<Value>),
    /// String-keyed map. BTreeMap keeps serialization deterministic.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Converts a `serde_json::Value` into the storage union.
    ///
    /// Integral JSON numbers become `Int`; everything else numeric becomes
    /// `Float`.
    pub fn from_json(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Converts back into a `serde_json::Value` for the public API.
    ///
    /// `Bytes` values surface as arrays of integers.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => {
                serde_json::Number::from_f64(*f).map_or(serde_json::Value::Null, serde_json::Value::Number)
            }
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(b) => serde_json::Value::Array(
                b.iter().map(|byte| serde_json::Value::from(*byte)).collect(),
            ),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Resolves a dotted path (`"author.name"`) into nested maps.
    ///
    /// A single segment resolves directly; missing segments yield `None`.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut current = self;
        for segment in path.split('.') {
            match current {
                Value::Map(map) => current = map.get(segment)?,
                _ => return None,
            }
        }
        Some(current)
    }

    /// Returns the string content if this is a `Str`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer content if this is an `Int`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns a float view of `Int` or `Float` values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns the boolean content if this is a `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns true if this value is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Canonical string form used for secondary-index keys.
    ///
    /// Only scalars are indexable; lists and maps return `None`.
    pub fn index_repr(&self) -> Option<String> {
        match self {
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Str(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entity_id_new_is_unique() {
        let id1 = EntityId::new();
        let id2 = EntityId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_entity_id_bytes_roundtrip() {
        let id = EntityId::new();
        let bytes = *id.as_bytes();
        let restored = EntityId::from_bytes(bytes);
        assert_eq!(id, restored);
    }

    #[test]
    fn test_entity_id_parse_display_roundtrip() {
        let id = EntityId::new();
        let parsed = EntityId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_entity_id_v7_is_time_ordered() {
        let id1 = EntityId::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = EntityId::new();
        assert!(id1 < id2, "v7 ids should sort by creation time");
    }

    #[test]
    fn test_entity_id_serialization() {
        let id = EntityId::new();
        let bytes = bincode::serialize(&id).unwrap();
        let restored: EntityId = bincode::deserialize(&bytes).unwrap();
        assert_eq!(id, restored);
    }

    #[test]
    fn test_timestamp_ordering() {
        let t1 = Timestamp::from_millis(1000);
        let t2 = Timestamp::from_millis(2000);
        assert!(t1 < t2);
    }

    #[test]
    fn test_timestamp_be_bytes() {
        // Big-endian ensures lexicographic ordering matches numeric ordering
        let t1 = Timestamp::from_millis(100);
        let t2 = Timestamp::from_millis(200);
        assert!(t1.to_be_bytes() < t2.to_be_bytes());
    }

    #[test]
    fn test_value_json_roundtrip() {
        let json = json!({
            "name": "Python Guide",
            "depth": 3,
            "score": 0.5,
            "tags": ["tutorial", "python"],
            "meta": { "draft": false, "author": null }
        });
        let value = Value::from_json(json.clone());
        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn test_value_integral_numbers_become_int() {
        let value = Value::from_json(json!(42));
        assert_eq!(value, Value::Int(42));
        let value = Value::from_json(json!(42.5));
        assert_eq!(value, Value::Float(42.5));
    }

    #[test]
    fn test_value_get_path_nested() {
        let value = Value::from_json(json!({ "author": { "name": "alice" } }));
        assert_eq!(
            value.get_path("author.name").and_then(Value::as_str),
            Some("alice")
        );
        assert!(value.get_path("author.email").is_none());
        assert!(value.get_path("missing.name").is_none());
    }

    #[test]
    fn test_value_index_repr_scalars_only() {
        assert_eq!(Value::Str("x".into()).index_repr().as_deref(), Some("x"));
        assert_eq!(Value::Int(7).index_repr().as_deref(), Some("7"));
        assert_eq!(Value::Bool(true).index_repr().as_deref(), Some("true"));
        assert!(Value::List(vec![]).index_repr().is_none());
        assert!(Value::Map(Default::default()).index_repr().is_none());
    }

    #[test]
    fn test_value_bincode_roundtrip() {
        let value = Value::from_json(json!({ "k": [1, 2, {"deep": true}] }));
        let bytes = bincode::serialize(&value).unwrap();
        let restored: Value = bincode::deserialize(&bytes).unwrap();
        assert_eq!(value, restored);
    }
}
