#![allow(unused)]

use async_trait::async_trait;
use futures::StreamExt;
use optisync_core::{
    proto::{ErrorBody, Offset, Operation, PersistRequest, PersistResponse, ShapeMessage, TableName, Txid, WireRow},
    ChangeSet, PerMutationPersister, PersistError, Persister, Row, ShapeSource, ShapeStream, StreamError, Transaction,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::sync::{mpsc, oneshot};
use tracing::Level;

const TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub completed: bool,
}

pub fn todo(id: &str, title: &str) -> Row { Row::new().with("id", id).with("title", title) }

pub fn wire(row: &Row) -> WireRow { row.to_wire() }

pub fn change(key: &str, operation: Operation, row: &Row, txid: u64, lsn: u64) -> ShapeMessage {
    ShapeMessage::change(key, operation, row.to_wire(), vec![Txid::new(txid)], Offset::at(lsn, 0))
}

// Initialize tracing for tests
#[ctor::ctor]
fn init_tracing() {
    tracing_subscriber::fmt().with_max_level(Level::INFO).with_test_writer().init();
}

/// A `ShapeSource` whose sessions are driven by the test through a `ShapeServer`
pub struct TestSource {
    sessions: mpsc::UnboundedSender<Session>,
    failing_connects: AtomicU32,
    offsets: Mutex<Vec<Offset>>,
}

pub struct ShapeServer {
    sessions: mpsc::UnboundedReceiver<Session>,
}

/// One open change-stream session. Dropping it ends the stream.
pub struct Session {
    pub offset: Offset,
    messages: mpsc::UnboundedSender<Result<ShapeMessage, StreamError>>,
}

pub fn test_source() -> (Arc<TestSource>, ShapeServer) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(TestSource { sessions: tx, failing_connects: AtomicU32::new(0), offsets: Mutex::new(Vec::new()) }), ShapeServer { sessions: rx })
}

impl TestSource {
    /// Makes the next `n` connection attempts fail
    pub fn fail_connects(&self, n: u32) { self.failing_connects.store(n, Ordering::SeqCst); }

    /// Offsets of every connection attempt, in order
    pub fn offsets(&self) -> Vec<Offset> { self.offsets.lock().unwrap().clone() }
}

#[async_trait]
impl ShapeSource for TestSource {
    async fn connect(&self, _table: &TableName, offset: Offset) -> Result<ShapeStream, StreamError> {
        self.offsets.lock().unwrap().push(offset);
        if self.failing_connects.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok() {
            return Err(StreamError::Connect("connection refused".into()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.sessions.send(Session { offset, messages: tx }).map_err(|_| StreamError::Connect("server gone".into()))?;
        Ok(futures::stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|message| (message, rx)) }).boxed())
    }
}

impl ShapeServer {
    pub async fn accept(&mut self) -> Session {
        tokio::time::timeout(TIMEOUT, self.sessions.recv()).await.expect("no connection within timeout").expect("source dropped")
    }
}

impl Session {
    pub fn send(&self, message: ShapeMessage) { let _ = self.messages.send(Ok(message)); }

    pub fn send_all(&self, messages: impl IntoIterator<Item = ShapeMessage>) {
        for message in messages {
            self.send(message);
        }
    }

    pub fn up_to_date(&self) { self.send(ShapeMessage::up_to_date()); }

    pub fn fail(&self, error: StreamError) { let _ = self.messages.send(Err(error)); }
}

/// A `Persister` that hands every call to the test and waits for its reply
pub struct TestPersister {
    calls: mpsc::UnboundedSender<PersistCall>,
}

pub struct PersistInbox {
    calls: mpsc::UnboundedReceiver<PersistCall>,
}

pub struct PersistCall {
    pub transaction: Transaction,
    reply: oneshot::Sender<Result<Txid, PersistError>>,
}

pub fn test_persister() -> (Arc<TestPersister>, PersistInbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(TestPersister { calls: tx }), PersistInbox { calls: rx })
}

#[async_trait]
impl Persister for TestPersister {
    async fn persist(&self, transaction: &Transaction) -> Result<Txid, PersistError> {
        let (reply, rx) = oneshot::channel();
        self.calls.send(PersistCall { transaction: transaction.clone(), reply }).map_err(|_| PersistError::Transport("inbox closed".into()))?;
        rx.await.map_err(|_| PersistError::Transport("call dropped".into()))?
    }
}

impl PersistInbox {
    pub async fn next(&mut self) -> PersistCall {
        tokio::time::timeout(TIMEOUT, self.calls.recv()).await.expect("no persist call within timeout").expect("persister dropped")
    }

    pub fn assert_idle(&mut self) { assert!(self.calls.try_recv().is_err(), "unexpected persist call") }
}

impl PersistCall {
    pub fn reply(self, result: Result<u64, PersistError>) { let _ = self.reply.send(result.map(Txid::new)); }
}

/// A tiny in-memory authority: applies persist requests, assigns txids and queues the
/// resulting change messages until `flush`.
pub struct Authority {
    state: Mutex<AuthorityState>,
}

struct AuthorityState {
    rows: BTreeMap<String, WireRow>,
    txid: u64,
    lsn: u64,
    outbox: Vec<ShapeMessage>,
}

impl Authority {
    pub fn new(first_txid: u64) -> Arc<Self> {
        Arc::new(Self { state: Mutex::new(AuthorityState { rows: BTreeMap::new(), txid: first_txid - 1, lsn: 0, outbox: Vec::new() }) })
    }

    pub fn persister(self: &Arc<Self>) -> Arc<dyn Persister> {
        let authority = self.clone();
        Arc::new(PerMutationPersister::new(move |request: PersistRequest| {
            let authority = authority.clone();
            async move { authority.handle(request) }
        }))
    }

    pub fn handle(&self, request: PersistRequest) -> Result<PersistResponse, PersistError> {
        let mut state = self.state.lock().unwrap();
        let (key, operation, value) = match request {
            PersistRequest::Create { row, .. } => {
                let title = row.get("title").and_then(|t| t.as_str()).unwrap_or_default();
                if title.contains("slow") {
                    let body = ErrorBody { message: None, error: Some("Cannot create todo with 'slow' in the title".into()) };
                    return Err(PersistError::from_status(400, Some(&body)));
                }
                let key = row.get("id").and_then(|id| id.as_str()).map(str::to_string).ok_or_else(|| PersistError::from_status(422, None))?;
                state.rows.insert(key.clone(), row.clone());
                (key, Operation::Insert, row)
            }
            PersistRequest::Update { key, patch, .. } => {
                let row = state.rows.get_mut(key.as_str()).ok_or_else(|| PersistError::from_status(404, None))?;
                row.extend(patch.clone());
                (key.as_str().to_string(), Operation::Update, patch)
            }
            PersistRequest::Delete { key, .. } => {
                state.rows.remove(key.as_str()).ok_or_else(|| PersistError::from_status(404, None))?;
                let mut value = WireRow::new();
                value.insert("id".into(), key.as_str().into());
                (key.as_str().to_string(), Operation::Delete, value)
            }
        };
        state.txid += 1;
        state.lsn += 1;
        let txid = Txid::new(state.txid);
        let message = ShapeMessage::change(key, operation, value, vec![txid], Offset::at(state.lsn, 0));
        state.outbox.push(message);
        Ok(PersistResponse { txid, row: None, success: Some(true) })
    }

    /// Delivers every queued change followed by an up-to-date marker
    pub fn flush(&self, session: &Session) {
        let messages: Vec<_> = self.state.lock().unwrap().outbox.drain(..).collect();
        session.send_all(messages);
        session.up_to_date();
    }

    pub fn rows(&self) -> BTreeMap<String, Row> { self.state.lock().unwrap().rows.iter().map(|(k, v)| (k.clone(), Row::from_wire(v))).collect() }
}

/// Records every `ChangeSet` a collection emits
pub fn change_watcher() -> (impl Fn(ChangeSet) + Send + Sync + 'static, impl Fn() -> Vec<ChangeSet>) {
    let changes = Arc::new(Mutex::new(Vec::new()));
    let watcher = {
        let changes = changes.clone();
        move |changeset: ChangeSet| changes.lock().unwrap().push(changeset)
    };
    let check = move || changes.lock().unwrap().drain(..).collect::<Vec<_>>();
    (watcher, check)
}
