//! Extensible attribute maps
//!
//! Free-form, JSON-valued attributes attached to users, groups, pools,
//! replicas and location chunks. Backends store whatever they need here;
//! the core only reads the few keys it knows about.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Ordered string-keyed map of JSON values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Extensible(BTreeMap<String, Value>);

impl Extensible {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Builder-style variant of [`Extensible::set`]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Unsigned value, or `default` when the key is absent.
    /// Numeric strings are accepted, as some backends store everything as text.
    pub fn get_u64(&self, key: &str, default: u64) -> Result<u64> {
        match self.0.get(key) {
            None => Ok(default),
            Some(Value::Number(n)) => n.as_u64().ok_or_else(|| mismatch(key, "unsigned")),
            Some(Value::String(s)) => s.trim().parse().map_err(|_| mismatch(key, "unsigned")),
            Some(Value::Bool(b)) => Ok(u64::from(*b)),
            Some(_) => Err(mismatch(key, "unsigned")),
        }
    }

    pub fn get_i64(&self, key: &str, default: i64) -> Result<i64> {
        match self.0.get(key) {
            None => Ok(default),
            Some(Value::Number(n)) => n.as_i64().ok_or_else(|| mismatch(key, "integer")),
            Some(Value::String(s)) => s.trim().parse().map_err(|_| mismatch(key, "integer")),
            Some(Value::Bool(b)) => Ok(i64::from(*b)),
            Some(_) => Err(mismatch(key, "integer")),
        }
    }

    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool> {
        match self.0.get(key) {
            None => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::Number(n)) => Ok(n.as_i64().map(|v| v != 0).unwrap_or(false)),
            Some(Value::String(s)) => match s.to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(true),
                "false" | "no" | "0" | "" => Ok(false),
                _ => Err(mismatch(key, "boolean")),
            },
            Some(_) => Err(mismatch(key, "boolean")),
        }
    }

    pub fn get_str<'a>(&'a self, key: &str, default: &'a str) -> Result<&'a str> {
        match self.0.get(key) {
            None => Ok(default),
            Some(Value::String(s)) => Ok(s),
            Some(_) => Err(mismatch(key, "string")),
        }
    }
}

impl From<BTreeMap<String, Value>> for Extensible {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

fn mismatch(key: &str, expected: &str) -> Error {
    Error::invalid_argument(format!("attribute '{}' is not {}", key, expected))
}
