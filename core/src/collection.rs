use optisync_proto::{RowKey, TableName};
use optisync_signals::{ListenerGuard, Read};
use serde::{de::DeserializeOwned, Serialize};
use std::{collections::BTreeMap, sync::Arc};
use tracing::info;

use crate::{
    changes::ChangeSet,
    config::CollectionConfig,
    confirm::TxidCoordinator,
    error::{MutationError, StreamError},
    manager::{row_key, PendingTransaction, TransactionManager, Validator},
    parser::ColumnParser,
    persist::Persister,
    state::SharedState,
    stream::{ShapeConsumer, ShapeSource, StreamState, SyncProgress},
    transaction::Mutation,
    value::{Row, Value},
};

struct Inner {
    config: CollectionConfig,
    state: SharedState,
    consumer: ShapeConsumer,
    manager: TransactionManager,
}

/// A locally mirrored table with optimistic writes.
///
/// Reads see the merged view: the stream-derived base rows with every pending local mutation
/// applied on top. Cloning is cheap and every clone shares the same state.
#[derive(Clone)]
pub struct Collection(Arc<Inner>);

impl Collection {
    /// Starts the change-stream consumer on the current tokio runtime
    pub fn new(config: CollectionConfig, source: Arc<dyn ShapeSource>, persister: Arc<dyn Persister>) -> Self {
        Self::builder(config).build(source, persister)
    }

    pub fn builder(config: CollectionConfig) -> CollectionBuilder { CollectionBuilder { config, parser: ColumnParser::new(), validator: None } }

    pub fn table(&self) -> &TableName { &self.0.config.table }

    pub fn config(&self) -> &CollectionConfig { &self.0.config }

    /// Every visible row, by key
    pub fn data(&self) -> BTreeMap<RowKey, Row> {
        self.0.state.read(|state| state.all_keys().into_iter().filter_map(|key| state.project(&key).into_row().map(|row| (key, row))).collect())
    }

    pub fn get(&self, key: impl Into<RowKey>) -> Option<Row> {
        let key = key.into();
        self.0.state.read(|state| state.project(&key).into_row())
    }

    pub fn contains(&self, key: impl Into<RowKey>) -> bool { self.get(key).is_some() }

    pub fn len(&self) -> usize { self.0.state.read(|state| state.all_keys().iter().filter(|key| state.project(key).row().is_some()).count()) }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// The visible rows converted to `T`, in key order
    pub fn items<T: DeserializeOwned>(&self) -> Result<Vec<T>, serde_json::Error> { self.data().values().map(Row::to_record).collect() }

    /// The authoritative row as last delivered by the change stream, ignoring pending mutations
    pub fn base_row(&self, key: impl Into<RowKey>) -> Option<Row> {
        let key = key.into();
        self.0.state.read(|state| state.base.get(&key).cloned())
    }

    /// Whether any unconfirmed mutation touches `key`
    pub fn has_pending(&self, key: impl Into<RowKey>) -> bool {
        let key = key.into();
        self.0.state.read(|state| !state.overlay.pending_for(&key).is_empty())
    }

    pub fn is_settled(&self) -> bool { self.0.state.read(|state| state.overlay.is_empty()) }

    pub fn progress(&self) -> Read<SyncProgress> { self.0.consumer.progress() }

    pub fn stream_state(&self) -> Read<StreamState> { self.0.consumer.state() }

    /// Waits until the first batch of the change stream has been committed
    pub async fn ready(&self) -> Result<(), StreamError> { self.0.consumer.ready().await }

    pub fn coordinator(&self) -> TxidCoordinator { TxidCoordinator::new(self.0.consumer.progress()) }

    pub fn manager(&self) -> &TransactionManager { &self.0.manager }

    /// Calls `listener` with every visible change to the merged view. Dropping the guard
    /// unsubscribes.
    pub fn subscribe<F>(&self, listener: F) -> ListenerGuard<ChangeSet>
    where F: Fn(ChangeSet) + Send + Sync + 'static {
        self.0.state.listen(Arc::new(listener))
    }

    /// Inserts a row keyed by its primary key column
    pub fn insert(&self, row: Row) -> Result<PendingTransaction, MutationError> {
        let key = row_key(&row, self.0.manager.primary_key())?;
        self.0.manager.submit(vec![Mutation::insert(key, row)])
    }

    pub fn insert_record<T: Serialize>(&self, record: &T) -> Result<PendingTransaction, MutationError> {
        let row = Row::from_record(record).map_err(|e| MutationError::Invalid(e.to_string()))?;
        self.insert(row)
    }

    pub fn update(&self, key: impl Into<RowKey>, patch: Row) -> Result<PendingTransaction, MutationError> {
        self.0.manager.submit(vec![Mutation::update(key, patch)])
    }

    /// Updates a row by editing a copy of it. The patch is whatever `f` changed.
    pub fn update_with(&self, key: impl Into<RowKey>, f: impl FnOnce(&mut Row)) -> Result<PendingTransaction, MutationError> {
        let key = key.into();
        let current = self.get(key.clone()).ok_or_else(|| MutationError::NotFound(key.clone()))?;
        let mut draft = current.clone();
        f(&mut draft);
        let patch = current.diff(&draft);
        if patch.is_empty() {
            return Err(MutationError::Invalid(format!("update of {} changes nothing", key)));
        }
        self.update(key, patch)
    }

    pub fn delete(&self, key: impl Into<RowKey>) -> Result<PendingTransaction, MutationError> {
        self.0.manager.submit(vec![Mutation::delete(key)])
    }

    /// Collects several mutations into one transaction, persisted with a single call.
    ///
    /// Nothing is applied if `f` returns an error or any mutation fails validation.
    pub fn transaction<F>(&self, f: F) -> Result<PendingTransaction, MutationError>
    where F: FnOnce(&mut TransactionBuilder) -> Result<(), MutationError> {
        let mut builder = TransactionBuilder { primary_key: self.0.manager.primary_key().to_string(), mutations: Vec::new() };
        f(&mut builder)?;
        self.0.manager.submit(builder.mutations)
    }

    /// Stops the change-stream consumer. Transactions still waiting for confirmation fail with
    /// `ConfirmationError::StreamStopped` and are rolled back.
    pub async fn shutdown(&self) {
        info!("Shutting down collection {}", self.0.config.table);
        self.0.consumer.shutdown().await;
    }
}

pub struct CollectionBuilder {
    config: CollectionConfig,
    parser: ColumnParser,
    validator: Option<Validator>,
}

impl CollectionBuilder {
    /// Overrides how wire values of a Postgres type are parsed
    pub fn parser(mut self, type_name: &str, f: impl Fn(&str) -> Result<Value, String> + Send + Sync + 'static) -> Self {
        self.parser.register(type_name, f);
        self
    }

    pub fn validator(mut self, f: impl Fn(&Mutation) -> Result<(), String> + Send + Sync + 'static) -> Self {
        self.validator = Some(Arc::new(f));
        self
    }

    pub fn build(self, source: Arc<dyn ShapeSource>, persister: Arc<dyn Persister>) -> Collection {
        let state = SharedState::new();
        let consumer = ShapeConsumer::start(
            self.config.table.clone(),
            self.config.primary_key.clone(),
            source,
            state.clone(),
            self.parser,
            self.config.stream.clone(),
        );
        let coordinator = TxidCoordinator::new(consumer.progress());
        let manager = TransactionManager::new(self.config.table.clone(), self.config.primary_key.clone(), state.clone(), persister, coordinator, self.validator);
        info!("Collection {} started", self.config.table);
        Collection(Arc::new(Inner { config: self.config, state, consumer, manager }))
    }
}

/// Mutations of one transaction, in order
pub struct TransactionBuilder {
    primary_key: String,
    mutations: Vec<Mutation>,
}

impl TransactionBuilder {
    /// Returns the key of the inserted row
    pub fn insert(&mut self, row: Row) -> Result<RowKey, MutationError> {
        let key = row_key(&row, &self.primary_key)?;
        self.mutations.push(Mutation::insert(key.clone(), row));
        Ok(key)
    }

    pub fn update(&mut self, key: impl Into<RowKey>, patch: Row) { self.mutations.push(Mutation::update(key, patch)); }

    pub fn delete(&mut self, key: impl Into<RowKey>) { self.mutations.push(Mutation::delete(key)); }

    pub fn len(&self) -> usize { self.mutations.len() }

    pub fn is_empty(&self) -> bool { self.mutations.is_empty() }
}
