//! Typed parameter records for pipeline tasks.
//!
//! Every task section of a pipeline document carries a loose bag of settings.
//! They are stored as tagged [`Value`]s so consumers can check types at the
//! point of use through [`ParameterRecord::as_typed`] and the typed helpers.

use crate::error::{Error, Result};
use serde::Serialize;
use std::borrow::Cow;
use std::collections::BTreeMap;

/// The kind of a parameter value, used in type checks and error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    String,
    Bool,
    Integer,
    Float,
    List,
    Record,
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueKind::String => write!(f, "string"),
            ValueKind::Bool => write!(f, "bool"),
            ValueKind::Integer => write!(f, "integer"),
            ValueKind::Float => write!(f, "float"),
            ValueKind::List => write!(f, "list of numbers"),
            ValueKind::Record => write!(f, "record"),
        }
    }
}

/// A list element. Integers and floats are kept apart so documents
/// serialize back the way they were written.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Number {
    Integer(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Integer(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    fn to_toml(self) -> toml::Value {
        match self {
            Number::Integer(i) => toml::Value::Integer(i),
            Number::Float(f) => toml::Value::Float(f),
        }
    }
}

/// A single parameter value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    String(String),
    Bool(bool),
    Integer(i64),
    Float(f64),
    List(Vec<Number>),
    Record(ParameterRecord),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::String(_) => ValueKind::String,
            Value::Bool(_) => ValueKind::Bool,
            Value::Integer(_) => ValueKind::Integer,
            Value::Float(_) => ValueKind::Float,
            Value::List(_) => ValueKind::List,
            Value::Record(_) => ValueKind::Record,
        }
    }

    /// Convert a parsed TOML value.
    ///
    /// Problems are pushed onto `malformed` as `MalformedValue` errors keyed by
    /// the dotted path of the offending entry. Returns `None` when `raw` itself
    /// cannot be represented.
    pub(crate) fn from_toml(key: &str, raw: &toml::Value, malformed: &mut Vec<Error>) -> Option<Self> {
        let reject = |reason: &str, malformed: &mut Vec<Error>| {
            malformed.push(Error::MalformedValue {
                key: key.to_string(),
                reason: reason.to_string(),
            });
            None
        };

        match raw {
            toml::Value::String(s) => Some(Value::String(s.clone())),
            toml::Value::Boolean(b) => Some(Value::Bool(*b)),
            toml::Value::Integer(i) => Some(Value::Integer(*i)),
            toml::Value::Float(f) => Some(Value::Float(*f)),
            toml::Value::Datetime(_) => reject("dates are not supported", malformed),
            toml::Value::Array(items) => {
                if !items.is_empty() && items.iter().all(|item| item.is_table()) {
                    return reject("arrays of tables are not supported", malformed);
                }
                let mut numbers = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        toml::Value::Integer(i) => numbers.push(Number::Integer(*i)),
                        toml::Value::Float(f) => numbers.push(Number::Float(*f)),
                        other => {
                            return reject(
                                &format!("lists may only hold numbers, found {}", other.type_str()),
                                malformed,
                            )
                        }
                    }
                }
                Some(Value::List(numbers))
            }
            toml::Value::Table(table) => Some(Value::Record(ParameterRecord::from_toml_table(
                key, table, malformed,
            ))),
        }
    }

    pub(crate) fn to_toml(&self) -> toml::Value {
        match self {
            Value::String(s) => toml::Value::String(s.clone()),
            Value::Bool(b) => toml::Value::Boolean(*b),
            Value::Integer(i) => toml::Value::Integer(*i),
            Value::Float(f) => toml::Value::Float(*f),
            Value::List(numbers) => {
                toml::Value::Array(numbers.iter().map(|n| n.to_toml()).collect())
            }
            Value::Record(record) => toml::Value::Table(record.to_toml_table()),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<ParameterRecord> for Value {
    fn from(value: ParameterRecord) -> Self {
        Value::Record(value)
    }
}

/// The configuration values of one task.
///
/// Keys are unique; iteration is in key order. The record owns its values and
/// only hands out shared references or copies.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ParameterRecord {
    entries: BTreeMap<String, Value>,
}

impl ParameterRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning the previous one for the key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Get the stored value for `key`.
    ///
    /// # Errors
    /// `MissingParameter` when the key is absent.
    pub fn get(&self, key: &str) -> Result<&Value> {
        self.entries.get(key).ok_or_else(|| Error::MissingParameter {
            key: key.to_string(),
        })
    }

    /// Get the stored value for `key`, falling back to a caller-declared default.
    pub fn get_or<'a>(&'a self, key: &str, default: &'a Value) -> &'a Value {
        self.entries.get(key).unwrap_or(default)
    }

    /// Check that `key` holds a value of the `expected` kind.
    ///
    /// Integers are accepted where floats are expected and come back converted.
    ///
    /// # Errors
    /// `MissingParameter` when absent, `TypeMismatch` when the kind differs.
    pub fn as_typed(&self, key: &str, expected: ValueKind) -> Result<Cow<'_, Value>> {
        let value = self.get(key)?;
        match (value, expected) {
            (v, expected) if v.kind() == expected => Ok(Cow::Borrowed(v)),
            (Value::Integer(i), ValueKind::Float) => Ok(Cow::Owned(Value::Float(*i as f64))),
            (v, expected) => Err(Error::TypeMismatch {
                key: key.to_string(),
                expected,
                actual: v.kind(),
            }),
        }
    }

    pub fn get_str(&self, key: &str) -> Result<&str> {
        match self.get(key)? {
            Value::String(s) => Ok(s),
            other => Err(self.mismatch(key, ValueKind::String, other)),
        }
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        match self.get(key)? {
            Value::Bool(b) => Ok(*b),
            other => Err(self.mismatch(key, ValueKind::Bool, other)),
        }
    }

    pub fn get_int(&self, key: &str) -> Result<i64> {
        match self.get(key)? {
            Value::Integer(i) => Ok(*i),
            other => Err(self.mismatch(key, ValueKind::Integer, other)),
        }
    }

    pub fn get_float(&self, key: &str) -> Result<f64> {
        match self.as_typed(key, ValueKind::Float)?.as_ref() {
            Value::Float(f) => Ok(*f),
            other => Err(self.mismatch(key, ValueKind::Float, other)),
        }
    }

    /// Get a numeric list with every element widened to `f64`.
    pub fn get_numbers(&self, key: &str) -> Result<Vec<f64>> {
        match self.get(key)? {
            Value::List(numbers) => Ok(numbers.iter().map(|n| n.as_f64()).collect()),
            other => Err(self.mismatch(key, ValueKind::List, other)),
        }
    }

    pub fn get_record(&self, key: &str) -> Result<&ParameterRecord> {
        match self.get(key)? {
            Value::Record(record) => Ok(record),
            other => Err(self.mismatch(key, ValueKind::Record, other)),
        }
    }

    fn mismatch(&self, key: &str, expected: ValueKind, actual: &Value) -> Error {
        Error::TypeMismatch {
            key: key.to_string(),
            expected,
            actual: actual.kind(),
        }
    }

    pub(crate) fn from_toml_table(
        prefix: &str,
        table: &toml::Table,
        malformed: &mut Vec<Error>,
    ) -> Self {
        let mut record = Self::new();
        for (key, raw) in table {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{}.{}", prefix, key)
            };
            if let Some(value) = Value::from_toml(&path, raw, malformed) {
                record.entries.insert(key.clone(), value);
            }
        }
        record
    }

    pub(crate) fn to_toml_table(&self) -> toml::Table {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), v.to_toml()))
            .collect()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for ParameterRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
