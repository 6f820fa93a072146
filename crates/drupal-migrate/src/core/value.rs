//! Typed values flowing through rows, process pipelines and destinations.
//!
//! Legacy rows arrive as loosely typed SQL columns and PHP-serialized blobs.
//! Everything is decoded once at the source boundary into [`Value`], so later
//! stages never see opaque strings that still need reinterpreting.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A typed value tree.
///
/// Maps use `BTreeMap` so serialization (and therefore row hashing) is
/// independent of insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    /// Absent / SQL NULL.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// Double precision float.
    Float(f64),
    /// UTF-8 text.
    String(String),
    /// Ordered list.
    List(Vec<Value>),
    /// String-keyed map.
    Map(BTreeMap<String, Value>),
    /// Raw bytes (BLOB columns that are not text). Last so untagged
    /// deserialization prefers `List` for arrays.
    Bytes(Vec<u8>),
}

impl Value {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// PHP `empty()` semantics: null, false, 0, 0.0, "", "0", empty list/map.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Bool(b) => !b,
            Value::Int(i) => *i == 0,
            Value::Float(f) => *f == 0.0,
            Value::String(s) => s.is_empty() || s == "0",
            Value::Bytes(b) => b.is_empty(),
            Value::List(l) => l.is_empty(),
            Value::Map(m) => m.is_empty(),
        }
    }

    /// Borrow as a string slice if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Interpret as an integer, parsing numeric strings.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Interpret as a boolean using PHP truthiness.
    pub fn as_bool(&self) -> bool {
        !self.is_empty()
    }

    /// Borrow as a list.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// Borrow as a map.
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Mutably borrow as a map.
    pub fn as_map_mut(&mut self) -> Option<&mut BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Whether this value is a list or map (PHP array).
    pub fn is_array(&self) -> bool {
        matches!(self, Value::List(_) | Value::Map(_))
    }

    /// Scalar string form used for keys, concatenation and lookups.
    ///
    /// Returns `None` for lists and maps.
    pub fn to_key(&self) -> Option<String> {
        match self {
            Value::Null => Some(String::new()),
            Value::Bool(b) => Some(if *b { "1".into() } else { String::new() }),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::String(s) => Some(s.clone()),
            Value::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
            Value::List(_) | Value::Map(_) => None,
        }
    }

    /// Look up a nested element by `/`-separated path.
    ///
    /// List elements are addressed by their numeric index.
    pub fn get_path(&self, path: &[&str]) -> Option<&Value> {
        let mut current = self;
        for key in path {
            current = match current {
                Value::Map(m) => m.get(*key)?,
                Value::List(l) => l.get(key.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Iterate the elements of a list, or the values of a map.
    pub fn elements(&self) -> Vec<&Value> {
        match self {
            Value::List(l) => l.iter().collect(),
            Value::Map(m) => m.values().collect(),
            _ => Vec::new(),
        }
    }

    /// Convert to JSON for storage in the target store.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Convert from JSON loaded out of the target store.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(a) => Value::List(a.into_iter().map(Value::from_json).collect()),
            serde_json::Value::Object(o) => {
                Value::Map(o.into_iter().map(|(k, v)| (k, Value::from_json(v))).collect())
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_key() {
            Some(s) => f.write_str(&s),
            None => f.write_str(&self.to_json().to_string()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Value::Map(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Build a `Value::Map` from key/value pairs.
pub fn map<K, V, I>(pairs: I) -> Value
where
    K: Into<String>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    Value::Map(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_php_empty_semantics() {
        assert!(Value::Null.is_empty());
        assert!(Value::from("0").is_empty());
        assert!(Value::from("").is_empty());
        assert!(Value::Int(0).is_empty());
        assert!(Value::List(vec![]).is_empty());
        assert!(!Value::from("a").is_empty());
        assert!(!Value::Int(5).is_empty());
    }

    #[test]
    fn test_get_path_through_maps_and_lists() {
        let v = map([(
            "display",
            map([("full", Value::List(vec!["a".into(), "b".into()]))]),
        )]);
        assert_eq!(v.get_path(&["display", "full", "1"]), Some(&Value::from("b")));
        assert_eq!(v.get_path(&["display", "teaser"]), None);
    }

    #[test]
    fn test_as_i64_parses_numeric_strings() {
        assert_eq!(Value::from("42").as_i64(), Some(42));
        assert_eq!(Value::from("x").as_i64(), None);
        assert_eq!(Value::Float(3.0).as_i64(), Some(3));
    }

    #[test]
    fn test_json_conversion_preserves_integers() {
        let v = map([("tid", Value::Int(7)), ("name", Value::from("Tags"))]);
        assert_eq!(Value::from_json(v.to_json()), v);
    }
}
