//! Property value model.
//!
//! Entity property bags hold arbitrary world-author data. Instead of an
//! untyped blob, every property is one of the [`Value`] variants; well-known
//! keys are read through the typed helpers and unknown keys pass through
//! untouched for forward compatibility.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use variantly::Variantly;

/// A property bag: ordered so iteration (and serialization) is deterministic.
pub type Props = BTreeMap<String, Value>;

/// A single property value.
///
/// Serialized untagged, so world JSON reads naturally
/// (`"portable": true`, `"needs": ["hunger"]`, `"trust_state": {...}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Variantly, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Truthiness used by flag checks: null, false, 0, "" and empty
    /// collections are false, everything else true.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(l) => !l.is_empty(),
            Value::Map(m) => !m.is_empty(),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.bool_ref().copied()
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Vec<Value>> {
        self.list_ref()
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        self.map_ref()
    }

    /// Fetch a key from a map value, `None` for non-maps.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|m| m.get(key))
    }

    /// List of strings, for keys like `needs`, `keywords`, `opens_with`.
    pub fn as_str_list(&self) -> Vec<&str> {
        self.as_list()
            .map(|l| l.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
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
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
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

/// Convenience for building map values in code and tests.
#[macro_export]
macro_rules! value_map {
    ($($key:expr => $val:expr),* $(,)?) => {{
        let mut map = std::collections::BTreeMap::<String, $crate::Value>::new();
        $(map.insert($key.to_string(), $crate::Value::from($val));)*
        $crate::Value::Map(map)
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untagged_round_trip() {
        let json = r#"{"portable": true, "weight": 3, "needs": ["hunger"], "trust_state": {"current": 0, "floor": -5}}"#;
        let parsed: BTreeMap<String, Value> = serde_json::from_str(json).unwrap();
        assert_eq!(parsed["portable"], Value::Bool(true));
        assert_eq!(parsed["weight"], Value::Int(3));
        assert_eq!(parsed["needs"].as_str_list(), vec!["hunger"]);
        assert_eq!(parsed["trust_state"].get("current"), Some(&Value::Int(0)));

        let emitted = serde_json::to_string(&parsed).unwrap();
        let reparsed: BTreeMap<String, Value> = serde_json::from_str(&emitted).unwrap();
        assert_eq!(parsed, reparsed);
    }

    #[test]
    fn truthiness_matches_flag_semantics() {
        assert!(!Value::Null.truthy());
        assert!(!Value::Bool(false).truthy());
        assert!(!Value::Int(0).truthy());
        assert!(!Value::Str(String::new()).truthy());
        assert!(!Value::List(vec![]).truthy());
        assert!(Value::Bool(true).truthy());
        assert!(Value::Int(-2).truthy());
        assert!(Value::Str("set".into()).truthy());
    }

    #[test]
    fn value_map_macro_builds_nested_config() {
        let config = value_map! {
            "open" => false,
            "capacity" => 2,
        };
        assert_eq!(config.get("open"), Some(&Value::Bool(false)));
        assert_eq!(config.get("capacity"), Some(&Value::Int(2)));
    }

    #[test]
    fn get_returns_none_for_non_map() {
        assert!(Value::Int(4).get("key").is_none());
        assert!(Value::Str("x".into()).as_list().is_none());
    }
}
