use optisync_proto::{Operation, RowKey, TableName, TransactionId, Txid};
use optisync_signals::{Get, Mut, Read, Wait, With};
use std::{collections::BTreeSet, sync::Arc, time::Duration};
use tracing::{debug, error, info, warn};

use crate::{
    confirm::TxidCoordinator,
    error::{ConfirmationError, MutationError},
    overlay::Projection,
    persist::Persister,
    state::{SharedState, SyncState},
    transaction::{Mutation, Transaction, TransactionState, TransactionStatus},
    value::{Row, Value},
};

/// Checks a mutation before it is applied. An `Err` rejects the whole transaction.
pub type Validator = Arc<dyn Fn(&Mutation) -> Result<(), String> + Send + Sync>;

struct Inner {
    table: TableName,
    primary_key: String,
    state: SharedState,
    persister: Arc<dyn Persister>,
    coordinator: TxidCoordinator,
    validator: Option<Validator>,
}

/// Drives transactions from submission to confirmation or rollback.
///
/// `submit` applies a transaction to the overlay synchronously and returns a handle. The
/// persist call and the wait for the change stream run on a spawned task; once the stream has
/// caught up with the returned txid the overlay entries are retired, and on any failure they
/// are rolled back. Either way, the base store is never touched.
#[derive(Clone)]
pub struct TransactionManager(Arc<Inner>);

impl TransactionManager {
    pub(crate) fn new(
        table: TableName,
        primary_key: String,
        state: SharedState,
        persister: Arc<dyn Persister>,
        coordinator: TxidCoordinator,
        validator: Option<Validator>,
    ) -> Self {
        Self(Arc::new(Inner { table, primary_key, state, persister, coordinator, validator }))
    }

    pub fn primary_key(&self) -> &str { &self.0.primary_key }

    /// Applies the mutations optimistically and starts persisting them.
    ///
    /// Validation failures return `Err` with nothing applied. Must be called from within a tokio
    /// runtime.
    pub fn submit(&self, mutations: Vec<Mutation>) -> Result<PendingTransaction, MutationError> {
        if mutations.is_empty() {
            return Err(MutationError::Invalid("transaction has no mutations".into()));
        }
        let id = TransactionId::new();
        let keys: BTreeSet<RowKey> = mutations.iter().map(|m| m.key.clone()).collect();
        let mutations = self.0.state.mutate(
            move |_| keys,
            |state| {
                let mut applied = Vec::with_capacity(mutations.len());
                for mut mutation in mutations {
                    if let Err(e) = self.prepare(state, &mut mutation) {
                        state.overlay.rollback(id);
                        return Err(e);
                    }
                    state.overlay.apply(id, &mutation);
                    applied.push(mutation);
                }
                Ok(applied)
            },
        )?;

        debug!("{} submitted with {} mutations on {}", id, mutations.len(), self.0.table);
        let transaction = Transaction { id, table: self.0.table.clone(), mutations };
        let state = Arc::new(Mut::new(TransactionState::Pending));
        tokio::spawn(Self::drive(self.0.clone(), transaction, state.clone()));
        Ok(PendingTransaction { id, state: state.read() })
    }

    /// Validates `mutation` against the current merged view and records what it replaces
    fn prepare(&self, state: &SyncState, mutation: &mut Mutation) -> Result<(), MutationError> {
        if let Some(validator) = &self.0.validator {
            validator(mutation).map_err(MutationError::Invalid)?;
        }
        let primary_key = self.0.primary_key.as_str();
        match (mutation.kind, state.project(&mutation.key)) {
            (Operation::Insert, Projection::Present(_)) => Err(MutationError::AlreadyExists(mutation.key.clone())),
            (Operation::Insert, _) => match mutation.changes.get(primary_key) {
                None => {
                    mutation.changes.set(primary_key, mutation.key.as_str());
                    Ok(())
                }
                Some(value) if key_matches(value, &mutation.key) => Ok(()),
                Some(value) => Err(MutationError::Invalid(format!("{} {:?} does not match key {}", primary_key, value, mutation.key))),
            },
            (Operation::Update, Projection::Present(current)) => {
                if mutation.changes.is_empty() {
                    return Err(MutationError::Invalid(format!("update of {} changes nothing", mutation.key)));
                }
                if mutation.changes.get(primary_key).is_some_and(|value| current.get(primary_key) != Some(value)) {
                    return Err(MutationError::Invalid(format!("cannot change {} of {}", primary_key, mutation.key)));
                }
                mutation.original = Some(current);
                Ok(())
            }
            (Operation::Delete, Projection::Present(current)) => {
                mutation.original = Some(current);
                Ok(())
            }
            (_, _) => Err(MutationError::NotFound(mutation.key.clone())),
        }
    }

    async fn drive(inner: Arc<Inner>, transaction: Transaction, state: Arc<Mut<TransactionState>>) {
        let id = transaction.id;
        let result = async {
            let txid = inner.persister.persist(&transaction).await?;
            debug!("{} persisted with txid {}", id, txid);
            advance(id, &state, TransactionState::Persisted(txid));
            inner.coordinator.await_txid(txid).await?;
            Ok::<_, MutationError>(txid)
        }
        .await;

        match result {
            Ok(txid) => {
                inner.state.mutate(|s| s.overlay.keys_for(id), |s| s.overlay.retire(id));
                info!("{} confirmed at txid {}", id, txid);
                advance(id, &state, TransactionState::Confirmed(txid));
            }
            Err(e) => {
                warn!("{} failed, rolling back: {}", id, e);
                inner.state.mutate(|s| s.overlay.keys_for(id), |s| s.overlay.rollback(id));
                advance(id, &state, TransactionState::Failed(e));
            }
        }
    }
}

fn advance(id: TransactionId, state: &Mut<TransactionState>, next: TransactionState) {
    state.update(|current| match current.advance(next) {
        Ok(()) => true,
        Err(e) => {
            error!("{}: {}", id, e);
            false
        }
    });
}

/// The key a row's primary key column maps to
pub(crate) fn row_key(row: &Row, primary_key: &str) -> Result<RowKey, MutationError> {
    match row.get(primary_key) {
        Some(Value::String(s)) if !s.is_empty() => Ok(RowKey::new(s.clone())),
        Some(Value::Integer(i)) => Ok(RowKey::new(i.to_string())),
        Some(other) => Err(MutationError::Invalid(format!("unsupported primary key value {other:?}"))),
        None => Err(MutationError::Invalid(format!("row has no {primary_key} column"))),
    }
}

fn key_matches(value: &Value, key: &RowKey) -> bool {
    match value {
        Value::String(s) => s == key.as_str(),
        Value::Integer(i) => i.to_string() == key.as_str(),
        _ => false,
    }
}

/// Handle to a submitted transaction
#[derive(Clone)]
pub struct PendingTransaction {
    id: TransactionId,
    state: Read<TransactionState>,
}

impl PendingTransaction {
    pub fn id(&self) -> TransactionId { self.id }

    pub fn state(&self) -> TransactionState { self.state.get() }

    pub fn status(&self) -> TransactionStatus { self.state.with(|s| s.status()) }

    /// The lifecycle as a signal, for observers
    pub fn watch(&self) -> Read<TransactionState> { self.state.clone() }

    /// Resolves once the authority accepted the transaction, with the txid it assigned
    pub async fn persisted(&self) -> Result<Txid, MutationError> {
        self.state
            .wait_for(|state| match state {
                TransactionState::Pending => None,
                TransactionState::Persisted(txid) | TransactionState::Confirmed(txid) => Some(Ok(*txid)),
                TransactionState::Failed(e) => Some(Err(e.clone())),
            })
            .await
    }

    /// Resolves once the change stream has caught up with the transaction and its overlay
    /// entries are retired
    pub async fn confirmed(&self) -> Result<Txid, MutationError> {
        self.state
            .wait_for(|state| match state {
                TransactionState::Confirmed(txid) => Some(Ok(*txid)),
                TransactionState::Failed(e) => Some(Err(e.clone())),
                _ => None,
            })
            .await
    }

    /// Like `confirmed`, but gives up waiting after `timeout`. The transaction itself keeps
    /// going; only this wait ends.
    pub async fn confirmed_within(&self, timeout: Duration) -> Result<Txid, MutationError> {
        match tokio::time::timeout(timeout, self.confirmed()).await {
            Ok(result) => result,
            Err(_) => Err(ConfirmationError::Timeout { txid: self.state.with(|s| s.txid()) }.into()),
        }
    }
}

impl std::fmt::Debug for PendingTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingTransaction").field("id", &self.id).field("state", &self.state()).finish()
    }
}
