use optisync_proto::{ChangeMessage, Offset, Operation, RowKey, TableName, Txid};

use crate::{error::ParseError, manager::row_key, parser::ColumnParser, value::Row};

/// A typed, immutable row-level change read from the change stream
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub table: TableName,
    pub operation: Operation,
    pub key: RowKey,
    /// Full row for inserts, full or partial row for updates, key columns for deletes
    pub payload: Row,
    /// None for rows delivered by the initial snapshot
    pub txid: Option<Txid>,
    pub offset: Offset,
}

impl ChangeEvent {
    /// Keys the event by the row's `primary_key` column, the same key local mutations use.
    /// Messages whose payload lacks that column keep the shape log's own key.
    pub fn from_message(table: &TableName, primary_key: &str, message: &ChangeMessage, parser: &ColumnParser) -> Result<Self, ParseError> {
        let payload = parser.parse_row(&message.value)?;
        let key = row_key(&payload, primary_key).unwrap_or_else(|_| message.key.clone());
        Ok(ChangeEvent {
            table: table.clone(),
            operation: message.headers.operation,
            key,
            payload,
            txid: message.headers.txids.iter().max().copied(),
            offset: message.offset,
        })
    }
}
