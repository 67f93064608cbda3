use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::TypeError;

/// Structured, opaque event data frozen to canonical JSON.
///
/// Canonical JSON has object keys sorted by byte order at every depth and no
/// insignificant whitespace. The canonical text is what gets stored and
/// what the hash-chain codec digests, so the in-memory `Value` shape of a
/// payload never leaks into a chain hash.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Document(String);

impl Document {
    /// Canonicalize a JSON value.
    pub fn from_value(value: &Value) -> Self {
        let mut out = String::new();
        write_canonical(value, &mut out);
        Self(out)
    }

    /// Serialize any value to JSON and canonicalize it.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self, TypeError> {
        serde_json::to_value(value)
            .map(|v| Self::from_value(&v))
            .map_err(|e| TypeError::InvalidDocument(e.to_string()))
    }

    /// Parse JSON text and canonicalize it.
    pub fn parse(text: &str) -> Result<Self, TypeError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| TypeError::InvalidDocument(e.to_string()))?;
        Ok(Self::from_value(&value))
    }

    /// The JSON `null` document.
    pub fn null() -> Self {
        Self("null".into())
    }

    /// Canonical JSON text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode back into a generic JSON value.
    pub fn to_value(&self) -> Result<Value, TypeError> {
        serde_json::from_str(&self.0).map_err(|e| TypeError::InvalidDocument(e.to_string()))
    }

    /// Decode into a typed value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, TypeError> {
        serde_json::from_str(&self.0).map_err(|e| TypeError::InvalidDocument(e.to_string()))
    }
}

impl From<Value> for Document {
    fn from(value: Value) -> Self {
        Self::from_value(&value)
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Document({})", self.0)
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn keys_are_sorted_at_every_depth() {
        let doc = Document::from_value(&json!({
            "b": 1,
            "a": {"z": true, "m": [ {"y": 1, "x": 2} ]}
        }));
        assert_eq!(doc.as_str(), r#"{"a":{"m":[{"x":2,"y":1}],"z":true},"b":1}"#);
    }

    #[test]
    fn equivalent_text_yields_same_document() {
        let a = Document::parse(r#"{ "amount": 12.50, "currency": "EUR" }"#).unwrap();
        let b = Document::parse(r#"{"currency":"EUR","amount":12.5}"#).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), r#"{"amount":12.5,"currency":"EUR"}"#);
    }

    #[test]
    fn strings_are_escaped() {
        let doc = Document::from_value(&json!({"note": "line\n\"quoted\""}));
        assert_eq!(doc.as_str(), r#"{"note":"line\n\"quoted\""}"#);
    }

    #[test]
    fn serde_keeps_canonical_text() {
        let doc = Document::from_value(&json!({"k": [1, 2, 3]}));
        let json = serde_json::to_string(&doc).unwrap();
        let parsed: Document = serde_json::from_str(&json).unwrap();
        assert_eq!(doc, parsed);
    }

    #[test]
    fn invalid_json_is_rejected() {
        assert!(Document::parse("{not json").is_err());
    }

    proptest! {
        #[test]
        fn canonicalization_is_idempotent(keys in proptest::collection::vec("[a-z]{1,6}", 0..8), n in any::<i64>()) {
            let mut map = serde_json::Map::new();
            for (i, k) in keys.iter().enumerate() {
                map.insert(k.clone(), json!([n, i, k]));
            }
            let first = Document::from_value(&Value::Object(map));
            let second = Document::parse(first.as_str()).unwrap();
            prop_assert_eq!(first, second);
        }
    }
}
