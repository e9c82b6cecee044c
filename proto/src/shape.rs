use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{id::RowKey, offset::Offset, txid::Txid};

/// Raw column values as they arrive from the shape log. Most are strings; the column
/// parser turns them into typed values using the table's schema.
pub type WireRow = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Insert => write!(f, "insert"),
            Operation::Update => write!(f, "update"),
            Operation::Delete => write!(f, "delete"),
        }
    }
}

/// One entry of a shape log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ShapeMessage {
    Change(ChangeMessage),
    Control(ControlMessage),
    Schema(SchemaMessage),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeMessage {
    pub key: RowKey,
    #[serde(default)]
    pub value: WireRow,
    pub headers: ChangeHeaders,
    pub offset: Offset,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeHeaders {
    pub operation: Operation,
    /// Empty for rows delivered by the initial snapshot
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub txids: Vec<Txid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    pub headers: ControlHeaders,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlHeaders {
    pub control: Control,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Control {
    /// Everything up to this point forms a consistent batch
    UpToDate,
    /// The server discarded this log; the client must drop its state and start over
    MustRefetch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaMessage {
    pub headers: SchemaHeaders,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaHeaders {
    pub schema: BTreeMap<String, ColumnInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    #[serde(rename = "type")]
    pub type_name: String,
}

impl ShapeMessage {
    pub fn change(key: impl Into<RowKey>, operation: Operation, value: WireRow, txids: Vec<Txid>, offset: Offset) -> Self {
        ShapeMessage::Change(ChangeMessage { key: key.into(), value, headers: ChangeHeaders { operation, txids }, offset })
    }

    pub fn up_to_date() -> Self { ShapeMessage::Control(ControlMessage { headers: ControlHeaders { control: Control::UpToDate } }) }

    pub fn must_refetch() -> Self { ShapeMessage::Control(ControlMessage { headers: ControlHeaders { control: Control::MustRefetch } }) }

    pub fn schema<'a>(columns: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let schema = columns.into_iter().map(|(name, ty)| (name.to_string(), ColumnInfo { type_name: ty.to_string() })).collect();
        ShapeMessage::Schema(SchemaMessage { headers: SchemaHeaders { schema } })
    }
}

impl std::fmt::Display for ShapeMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShapeMessage::Change(change) => write!(f, "Change: {} {} @{}", change.headers.operation, change.key, change.offset),
            ShapeMessage::Control(control) => write!(f, "Control: {:?}", control.headers.control),
            ShapeMessage::Schema(schema) => write!(f, "Schema: {} columns", schema.headers.schema.len()),
        }
    }
}

/// Decode a single frame from the shape log. A frame is either a JSON array of messages
/// or one bare message.
pub fn decode_frame(frame: &str) -> Result<Vec<ShapeMessage>, serde_json::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Frame {
        Many(Vec<ShapeMessage>),
        One(ShapeMessage),
    }

    Ok(match serde_json::from_str(frame)? {
        Frame::Many(messages) => messages,
        Frame::One(message) => vec![message],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_mixed_frame() {
        let frame = r#"[
            {"headers": {"schema": {"id": {"type": "uuid"}, "title": {"type": "text"}}}},
            {"key": "k1", "value": {"id": "k1", "title": "Buy milk"}, "headers": {"operation": "insert", "txids": [42]}, "offset": "5_0"},
            {"headers": {"control": "up-to-date"}}
        ]"#;
        let messages = decode_frame(frame).unwrap();
        assert_eq!(messages.len(), 3);
        assert!(matches!(&messages[0], ShapeMessage::Schema(s) if s.headers.schema["id"].type_name == "uuid"));
        match &messages[1] {
            ShapeMessage::Change(change) => {
                assert_eq!(change.key, RowKey::from("k1"));
                assert_eq!(change.headers.operation, Operation::Insert);
                assert_eq!(change.headers.txids, vec![Txid::new(42)]);
                assert_eq!(change.offset, Offset::at(5, 0));
            }
            other => panic!("expected change, got {other}"),
        }
        assert_eq!(messages[2], ShapeMessage::up_to_date());
    }

    #[test]
    fn decodes_a_single_message_frame() {
        let messages = decode_frame(r#"{"headers": {"control": "must-refetch"}}"#).unwrap();
        assert_eq!(messages, vec![ShapeMessage::must_refetch()]);
    }

    #[test]
    fn snapshot_rows_have_no_txids() {
        let message = ShapeMessage::change("k1", Operation::Insert, WireRow::new(), vec![], Offset::at(0, 0));
        let json = serde_json::to_string(&message).unwrap();
        assert!(!json.contains("txids"));
        assert_eq!(decode_frame(&json).unwrap(), vec![message]);
    }
}
