use serde::{Deserialize, Serialize};

use crate::{collection::TableName, id::RowKey, shape::WireRow, txid::Txid};

/// Body of one persist request. The authority exposes one endpoint per mutation kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PersistRequest {
    Create { table: TableName, row: WireRow },
    Update { table: TableName, key: RowKey, patch: WireRow },
    Delete { table: TableName, key: RowKey },
}

impl PersistRequest {
    pub fn table(&self) -> &TableName {
        match self {
            PersistRequest::Create { table, .. } | PersistRequest::Update { table, .. } | PersistRequest::Delete { table, .. } => table,
        }
    }
}

/// Successful persist response. `row` is echoed back by create and update, `success` by delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistResponse {
    pub txid: Txid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<WireRow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

/// Body of a non-success persist response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ErrorBody {
    /// The most specific human readable reason the body carries
    pub fn reason(&self) -> Option<&str> { self.message.as_deref().or(self.error.as_deref()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delete_response_carries_success_and_txid() {
        let response: PersistResponse = serde_json::from_str(r#"{"success": true, "txid": "77"}"#).unwrap();
        assert_eq!(response.txid, Txid::new(77));
        assert_eq!(response.success, Some(true));
        assert!(response.row.is_none());
    }

    #[test]
    fn error_body_prefers_message() {
        let body: ErrorBody = serde_json::from_str(r#"{"error": "Cannot create todo with 'slow' in the title"}"#).unwrap();
        assert_eq!(body.reason(), Some("Cannot create todo with 'slow' in the title"));
        let body: ErrorBody = serde_json::from_str(r#"{"message": "m", "error": "e"}"#).unwrap();
        assert_eq!(body.reason(), Some("m"));
    }

    #[test]
    fn requests_are_tagged_by_kind() {
        let request = PersistRequest::Delete { table: "todos".into(), key: "k1".into() };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["type"], "delete");
        assert_eq!(json["key"], "k1");
        assert_eq!(request.table().as_str(), "todos");
    }
}
