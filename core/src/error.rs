use optisync_proto::{ErrorBody, RowKey, Txid};
use thiserror::Error;

use crate::transaction::TransactionStatus;

const RATE_LIMITED: &str = "Too many requests. Please try again later.";

/// Failure of the external persist call.
///
/// Every variant rolls the transaction back the same way; `is_rejection` tells a decision by
/// the authority apart from a failure to reach it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PersistError {
    /// The authority declined the mutation (validation or policy)
    #[error("{reason}")]
    Rejected { status: Option<u16>, reason: String },

    /// The authority refused to process the request right now (HTTP 429)
    #[error("{reason}")]
    RateLimited { reason: String },

    #[error("server error ({status}): {reason}")]
    Server { status: u16, reason: String },

    #[error("transport error: {0}")]
    Transport(String),
}

impl PersistError {
    pub fn rejected(reason: impl Into<String>) -> Self { PersistError::Rejected { status: None, reason: reason.into() } }

    /// Classifies a non-success HTTP status and its (optional) error body
    pub fn from_status(status: u16, body: Option<&ErrorBody>) -> Self {
        let reason = body.and_then(|b| b.reason()).map(str::to_string);
        match status {
            429 => PersistError::RateLimited { reason: reason.unwrap_or_else(|| RATE_LIMITED.to_string()) },
            400..=499 => PersistError::Rejected { status: Some(status), reason: reason.unwrap_or_else(|| format!("Request failed: {status}")) },
            _ => PersistError::Server { status, reason: reason.unwrap_or_else(|| format!("Request failed: {status}")) },
        }
    }

    pub fn is_rejection(&self) -> bool { matches!(self, PersistError::Rejected { .. } | PersistError::RateLimited { .. }) }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfirmationError {
    /// The change stream gave up reconnecting; no txid can be observed anymore
    #[error("change stream exhausted after {attempts} attempts")]
    StreamExhausted { attempts: u32 },

    /// The collection was shut down before the txid was observed
    #[error("change stream stopped")]
    StreamStopped,

    #[error("timed out waiting for confirmation")]
    Timeout { txid: Option<Txid> },
}

/// Error type for mutation operations.
///
/// Returned from: `Collection::insert`, `update`, `delete`, `transaction`; `PendingTransaction::persisted`, `confirmed`
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MutationError {
    /// The mutation is invalid (user error); nothing was applied
    #[error("invalid mutation: {0}")]
    Invalid(String),

    #[error("row {0} not found")]
    NotFound(RowKey),

    #[error("row {0} already exists")]
    AlreadyExists(RowKey),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error(transparent)]
    Confirmation(#[from] ConfirmationError),
}

impl MutationError {
    /// The persist failure behind this error, if any
    pub fn persist_error(&self) -> Option<&PersistError> {
        match self {
            MutationError::Persist(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("column {column}: cannot parse {value:?} as {type_name}")]
pub struct ParseError {
    pub column: String,
    pub type_name: String,
    pub value: String,
}

/// Change stream failures. All of them are retried by the consumer; see `StreamState::Exhausted`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StreamError {
    #[error("failed to connect: {0}")]
    Connect(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to decode shape message: {0}")]
    Decode(String),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("illegal transaction transition {from} -> {to}")]
pub struct IllegalTransition {
    pub from: TransactionStatus,
    pub to: TransactionStatus,
}
