use chrono::{DateTime, SecondsFormat, Utc};
use optisync_proto::WireRow;
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

/// A typed column value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    Json(serde_json::Value),
}

impl Value {
    pub fn is_null(&self) -> bool { matches!(self, Value::Null) }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Integer(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f).map(serde_json::Value::Number).unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Timestamp(t) => serde_json::Value::String(t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Value::Json(j) => j.clone(),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            other => Value::Json(other),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self { Value::Bool(b) }
}
impl From<i64> for Value {
    fn from(i: i64) -> Self { Value::Integer(i) }
}
impl From<i32> for Value {
    fn from(i: i32) -> Self { Value::Integer(i as i64) }
}
impl From<f64> for Value {
    fn from(f: f64) -> Self { Value::Float(f) }
}
impl From<&str> for Value {
    fn from(s: &str) -> Self { Value::String(s.to_string()) }
}
impl From<String> for Value {
    fn from(s: String) -> Self { Value::String(s) }
}
impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self { Value::Timestamp(t) }
}
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self { v.map(Into::into).unwrap_or(Value::Null) }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> { self.to_json().serialize(serializer) }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> { serde_json::Value::deserialize(deserializer).map(Value::from) }
}

/// A row of a collection: column name to value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(BTreeMap<String, Value>);

impl Row {
    pub fn new() -> Self { Self::default() }

    pub fn get(&self, column: &str) -> Option<&Value> { self.0.get(column) }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) { self.0.insert(column.into(), value.into()); }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    pub fn remove(&mut self, column: &str) -> Option<Value> { self.0.remove(column) }

    pub fn contains(&self, column: &str) -> bool { self.0.contains_key(column) }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn columns(&self) -> impl Iterator<Item = &str> { self.0.keys().map(String::as_str) }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> { self.0.iter().map(|(k, v)| (k.as_str(), v)) }

    /// Overwrites every column present in `patch`
    pub fn merge(&mut self, patch: &Row) {
        for (column, value) in &patch.0 {
            self.0.insert(column.clone(), value.clone());
        }
    }

    /// The patch that turns `self` into `other`. Columns missing from `other` become `Null`.
    pub fn diff(&self, other: &Row) -> Row {
        let mut patch = Row::new();
        for (column, value) in &other.0 {
            if self.0.get(column) != Some(value) {
                patch.0.insert(column.clone(), value.clone());
            }
        }
        for column in self.0.keys() {
            if !other.0.contains_key(column) {
                patch.0.insert(column.clone(), Value::Null);
            }
        }
        patch
    }

    pub fn to_wire(&self) -> WireRow { self.0.iter().map(|(k, v)| (k.clone(), v.to_json())).collect() }

    /// Converts an untyped JSON object without any schema knowledge
    pub fn from_wire(wire: &WireRow) -> Self { Row(wire.iter().map(|(k, v)| (k.clone(), Value::from(v.clone()))).collect()) }

    pub fn to_record<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> { serde_json::from_value(serde_json::Value::Object(self.to_wire())) }

    pub fn from_record<T: Serialize>(record: &T) -> Result<Self, serde_json::Error> {
        match serde_json::to_value(record)? {
            serde_json::Value::Object(map) => Ok(Row::from_wire(&map)),
            _ => Err(serde::ser::Error::custom("record did not serialize to an object")),
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self { Row(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect()) }
}
