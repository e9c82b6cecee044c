use optisync_proto::{MutationId, Operation, PersistRequest, RowKey, TableName, TransactionId, Txid};

use crate::{error::MutationError, value::Row};

/// One user-initiated change to one row
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub id: MutationId,
    pub kind: Operation,
    pub key: RowKey,
    /// Full row for insert, patch for update, empty for delete
    pub changes: Row,
    /// The visible row before this mutation; filled in on submit for update and delete
    pub original: Option<Row>,
}

impl Mutation {
    pub fn insert(key: impl Into<RowKey>, row: Row) -> Self { Self { id: MutationId::new(), kind: Operation::Insert, key: key.into(), changes: row, original: None } }

    pub fn update(key: impl Into<RowKey>, patch: Row) -> Self { Self { id: MutationId::new(), kind: Operation::Update, key: key.into(), changes: patch, original: None } }

    pub fn delete(key: impl Into<RowKey>) -> Self { Self { id: MutationId::new(), kind: Operation::Delete, key: key.into(), changes: Row::new(), original: None } }

    /// The request body for the authority's endpoint for this kind of mutation
    pub fn to_request(&self, table: &TableName) -> PersistRequest {
        match self.kind {
            Operation::Insert => PersistRequest::Create { table: table.clone(), row: self.changes.to_wire() },
            Operation::Update => PersistRequest::Update { table: table.clone(), key: self.key.clone(), patch: self.changes.to_wire() },
            Operation::Delete => PersistRequest::Delete { table: table.clone(), key: self.key.clone() },
        }
    }
}

/// A batch of mutations persisted with a single call
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: TransactionId,
    pub table: TableName,
    pub mutations: Vec<Mutation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum TransactionStatus {
    Pending,
    Persisted,
    Confirmed,
    Failed,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool { matches!(self, TransactionStatus::Confirmed | TransactionStatus::Failed) }

    /// pending -> persisted -> confirmed, or pending|persisted -> failed
    pub fn can_advance_to(&self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!((self, next), (Pending, Persisted) | (Persisted, Confirmed) | (Pending, Failed) | (Persisted, Failed))
    }
}

/// Lifecycle of a submitted transaction, with the data each stage carries
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionState {
    Pending,
    Persisted(Txid),
    Confirmed(Txid),
    Failed(MutationError),
}

impl TransactionState {
    pub fn status(&self) -> TransactionStatus {
        match self {
            TransactionState::Pending => TransactionStatus::Pending,
            TransactionState::Persisted(_) => TransactionStatus::Persisted,
            TransactionState::Confirmed(_) => TransactionStatus::Confirmed,
            TransactionState::Failed(_) => TransactionStatus::Failed,
        }
    }

    pub fn txid(&self) -> Option<Txid> {
        match self {
            TransactionState::Persisted(txid) | TransactionState::Confirmed(txid) => Some(*txid),
            _ => None,
        }
    }

    /// Moves to `next` if the transition is legal
    pub(crate) fn advance(&mut self, next: TransactionState) -> Result<(), crate::error::IllegalTransition> {
        let (from, to) = (self.status(), next.status());
        if !from.can_advance_to(to) {
            return Err(crate::error::IllegalTransition { from, to });
        }
        *self = next;
        Ok(())
    }
}
