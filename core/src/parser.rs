//! Conversion of stringly-typed shape-log columns into typed values.
//!
//! The shape log sends most column values as strings. Once a `Schema` message has named each
//! column's Postgres type, the matching parse function turns the string into a [`Value`].
//! Callers can replace or add parse functions per type name.

use chrono::{DateTime, NaiveDateTime, Utc};
use optisync_proto::{ColumnInfo, WireRow};
use std::{collections::BTreeMap, collections::HashMap, sync::Arc};

use crate::{error::ParseError, value::Row, value::Value};

pub type ParseFn = Arc<dyn Fn(&str) -> Result<Value, String> + Send + Sync>;

#[derive(Clone)]
pub struct ColumnParser {
    parsers: HashMap<String, ParseFn>,
    // column name -> type name, as announced by the stream
    schema: BTreeMap<String, String>,
}

impl std::fmt::Debug for ColumnParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColumnParser").field("types", &self.parsers.keys().collect::<Vec<_>>()).field("schema", &self.schema).finish()
    }
}

impl Default for ColumnParser {
    fn default() -> Self { Self::new() }
}

impl ColumnParser {
    /// A parser with the built-in Postgres type conversions
    pub fn new() -> Self {
        let mut parser = Self { parsers: HashMap::new(), schema: BTreeMap::new() };
        parser.register("bool", parse_bool);
        for ty in ["int2", "int4", "int8"] {
            parser.register(ty, parse_int);
        }
        for ty in ["float4", "float8", "numeric"] {
            parser.register(ty, parse_float);
        }
        parser.register("timestamptz", parse_timestamptz);
        parser.register("timestamp", parse_timestamp);
        parser.register("json", parse_json);
        parser.register("jsonb", parse_json);
        parser
    }

    /// Registers (or replaces) the parse function for a type name
    pub fn register(&mut self, type_name: &str, f: impl Fn(&str) -> Result<Value, String> + Send + Sync + 'static) {
        self.parsers.insert(type_name.to_string(), Arc::new(f));
    }

    pub fn with(mut self, type_name: &str, f: impl Fn(&str) -> Result<Value, String> + Send + Sync + 'static) -> Self {
        self.register(type_name, f);
        self
    }

    pub fn set_schema(&mut self, schema: &BTreeMap<String, ColumnInfo>) {
        self.schema = schema.iter().map(|(column, info)| (column.clone(), info.type_name.clone())).collect();
    }

    pub fn column_type(&self, column: &str) -> Option<&str> { self.schema.get(column).map(String::as_str) }

    pub fn parse_row(&self, wire: &WireRow) -> Result<Row, ParseError> {
        let mut row = Row::new();
        for (column, raw) in wire {
            row.set(column.as_str(), self.parse_value(column, raw)?);
        }
        Ok(row)
    }

    fn parse_value(&self, column: &str, raw: &serde_json::Value) -> Result<Value, ParseError> {
        let serde_json::Value::String(text) = raw else {
            // already typed on the wire
            return Ok(Value::from(raw.clone()));
        };
        let Some(type_name) = self.column_type(column) else {
            return Ok(Value::String(text.clone()));
        };
        match self.parsers.get(type_name) {
            Some(parse) => parse(text).map_err(|_| ParseError { column: column.to_string(), type_name: type_name.to_string(), value: text.clone() }),
            None => Ok(Value::String(text.clone())),
        }
    }
}

fn parse_bool(s: &str) -> Result<Value, String> {
    match s {
        "t" | "true" => Ok(Value::Bool(true)),
        "f" | "false" => Ok(Value::Bool(false)),
        other => Err(format!("not a boolean: {other}")),
    }
}

fn parse_int(s: &str) -> Result<Value, String> { s.parse::<i64>().map(Value::Integer).map_err(|e| e.to_string()) }

fn parse_float(s: &str) -> Result<Value, String> { s.parse::<f64>().map(Value::Float).map_err(|e| e.to_string()) }

fn parse_timestamptz(s: &str) -> Result<Value, String> {
    // RFC 3339, or Postgres' text form ("2025-01-02 03:04:05.123+00")
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z"))
        .map(|t| Value::Timestamp(t.with_timezone(&Utc)))
        .map_err(|e| e.to_string())
}

fn parse_timestamp(s: &str) -> Result<Value, String> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .map(|t| Value::Timestamp(t.and_utc()))
        .map_err(|e| e.to_string())
}

fn parse_json(s: &str) -> Result<Value, String> {
    let parsed: serde_json::Value = serde_json::from_str(s).map_err(|e| e.to_string())?;
    // Some writers store JSON that was stringified twice; unwrap one more level if so
    if let serde_json::Value::String(inner) = &parsed {
        if let Ok(nested) = serde_json::from_str::<serde_json::Value>(inner) {
            return Ok(Value::Json(nested));
        }
    }
    Ok(Value::Json(parsed))
}
