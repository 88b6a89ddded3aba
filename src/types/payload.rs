use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

/// Decoded message payload
///
/// A self-describing value tree rather than raw bytes, so that payloads can
/// be stored structurally by in-process backends and so that big integers
/// and timestamps survive a JSON round trip. Wire conversion lives in the
/// serializer layer; see the JSON serializer's tagged encodings.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Null,
    Bool(bool),
    Int(i64),
    /// Integers outside the i64 range, e.g. 64-bit broker sequence numbers
    BigInt(i128),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Array(Vec<Payload>),
    Object(BTreeMap<String, Payload>),
}

impl Payload {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Shorthand for building an object payload from key/value pairs
    pub fn object<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Payload>,
    {
        Self::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Object field lookup; None for non-objects and missing keys
    pub fn get(&self, key: &str) -> Option<&Payload> {
        match self {
            Self::Object(map) => map.get(key),
            _ => None,
        }
    }
}

impl From<bool> for Payload {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Payload {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<i64> for Payload {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i128> for Payload {
    fn from(v: i128) -> Self {
        Self::BigInt(v)
    }
}

impl From<f64> for Payload {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Payload {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Payload {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<DateTime<Utc>> for Payload {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

impl<T: Into<Payload>> From<Vec<T>> for Payload {
    fn from(v: Vec<T>) -> Self {
        Self::Array(v.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_builder_and_lookup() {
        let payload = Payload::object([("order_id", Payload::from("123")), ("qty", 2.into())]);

        assert_eq!(payload.get("order_id").unwrap().as_str(), Some("123"));
        assert_eq!(payload.get("qty").unwrap().as_i64(), Some(2));
        assert!(payload.get("missing").is_none());
    }

    #[test]
    fn test_big_int_is_distinct_from_int() {
        let seq = Payload::from(9_223_372_036_854_775_808_i128);
        assert!(matches!(seq, Payload::BigInt(_)));
        assert_eq!(seq.as_i64(), None);
    }
}
