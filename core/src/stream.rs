use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use optisync_proto::{Control, Offset, ShapeMessage, TableName, Txid};
use optisync_signals::{Mut, Read, Wait, With};
use std::{
    collections::BTreeSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use strum::Display;
use tokio::{select, sync::Notify, task::JoinHandle, time::sleep};
use tracing::{debug, error, info, warn};

use crate::{config::StreamConfig, error::StreamError, event::ChangeEvent, parser::ColumnParser, state::SharedState};

/// Messages of one change-stream session, in log order
pub type ShapeStream = BoxStream<'static, Result<ShapeMessage, StreamError>>;

/// Opens change-stream sessions for a table.
///
/// A session starts strictly after `offset` (or from the beginning for `Offset::BeforeAll`),
/// delivers changes in log order, and marks each consistent point with an up-to-date control
/// message. The consumer opens a new session whenever the previous one ends.
#[async_trait]
pub trait ShapeSource: Send + Sync + 'static {
    async fn connect(&self, table: &TableName, offset: Offset) -> Result<ShapeStream, StreamError>;
}

#[derive(Debug, Clone, PartialEq, Display)]
pub enum StreamState {
    #[strum(serialize = "Connecting")]
    Connecting { attempt: u32 },
    /// Caught up with the authority as of the last up-to-date message
    Live,
    #[strum(serialize = "Backoff")]
    Backoff { attempt: u32, delay: Duration },
    /// Gave up after `attempts` consecutive failed sessions. Terminal.
    #[strum(serialize = "Exhausted")]
    Exhausted { attempts: u32, error: StreamError },
    Stopped,
}

/// What the consumer has committed so far
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncProgress {
    /// Largest txid among committed events. Never decreases.
    pub high_water: Option<Txid>,
    /// Offset of the last committed event; sessions resume strictly after it
    pub cursor: Offset,
    /// Set once the consumer gave up, with the number of attempts made
    pub exhausted: Option<u32>,
    /// Set once the consumer was shut down or dropped
    pub stopped: bool,
}

impl SyncProgress {
    pub fn has_observed(&self, txid: Txid) -> bool { self.high_water.is_some_and(|hw| hw >= txid) }
}

struct Inner {
    table: TableName,
    primary_key: String,
    source: Arc<dyn ShapeSource>,
    state: SharedState,
    config: StreamConfig,
    progress: Mut<SyncProgress>,
    stream_state: Mut<StreamState>,
    shutdown: Notify,
    shutdown_requested: AtomicBool,
}

/// How a session ended
struct SessionEnd {
    /// At least one up-to-date batch was committed, or a refetch was requested
    progressed: bool,
    result: Result<(), StreamError>,
}

/// Reads a table's change stream into the base store.
///
/// Events are buffered until the next up-to-date message and committed as one batch: rows are
/// applied to the base store first, then the cursor and the high-water mark advance. A session
/// that ends without committing anything counts as a failed attempt; after
/// `StreamConfig::max_attempts` consecutive failures the consumer stops for good.
pub struct ShapeConsumer {
    inner: Arc<Inner>,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ShapeConsumer {
    /// Spawns the consumer on the current tokio runtime
    pub(crate) fn start(
        table: TableName,
        primary_key: String,
        source: Arc<dyn ShapeSource>,
        state: SharedState,
        parser: ColumnParser,
        config: StreamConfig,
    ) -> Self {
        let inner = Arc::new(Inner {
            table,
            primary_key,
            source,
            state,
            config,
            progress: Mut::new(SyncProgress::default()),
            stream_state: Mut::new(StreamState::Connecting { attempt: 1 }),
            shutdown: Notify::new(),
            shutdown_requested: AtomicBool::new(false),
        });
        let task = tokio::spawn(Self::run(inner.clone(), parser));
        Self { inner, task: std::sync::Mutex::new(Some(task)) }
    }

    pub fn progress(&self) -> Read<SyncProgress> { self.inner.progress.read() }

    pub fn state(&self) -> Read<StreamState> { self.inner.stream_state.read() }

    /// Waits for the first committed batch. Fails if the consumer gives up first.
    pub async fn ready(&self) -> Result<(), StreamError> {
        self.state()
            .wait_for(|state| match state {
                StreamState::Live => Some(Ok(())),
                StreamState::Exhausted { error, .. } => Some(Err(error.clone())),
                StreamState::Stopped => Some(Err(StreamError::Transport("consumer stopped".into()))),
                _ => None,
            })
            .await
    }

    /// Stops the consumer and waits for its task to finish
    pub async fn shutdown(&self) {
        let task = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        let Some(task) = task else {
            debug!("Consumer for {} already stopped", self.inner.table);
            return;
        };
        self.inner.shutdown_requested.store(true, Ordering::Release);
        self.inner.shutdown.notify_waiters();
        if let Err(e) = task.await {
            warn!("Consumer task join error during shutdown: {}", e);
        }
    }

    async fn run(inner: Arc<Inner>, mut parser: ColumnParser) {
        let mut failures: u32 = 0;
        let mut backoff = inner.config.initial_backoff();
        info!("Starting change stream consumer for {}", inner.table);

        loop {
            if inner.shutdown_requested.load(Ordering::Acquire) {
                break;
            }
            inner.stream_state.update(|s| replace(s, StreamState::Connecting { attempt: failures + 1 }));
            select! {
                _ = inner.shutdown.notified() => break,
                end = Self::connect_once(&inner, &mut parser) => {
                    if inner.shutdown_requested.load(Ordering::Acquire) {
                        break;
                    }
                    if end.progressed {
                        failures = 0;
                        backoff = inner.config.initial_backoff();
                    }
                    let error = match end.result {
                        Err(e) => e,
                        Ok(()) if end.progressed => {
                            debug!("Session for {} ended, resuming from {}", inner.table, inner.progress.with(|p| p.cursor));
                            continue;
                        }
                        Ok(()) => StreamError::Transport("stream ended before up-to-date".into()),
                    };
                    if end.progressed {
                        // the session did commit; reconnect right away
                        warn!("Session for {} failed after progress: {}", inner.table, error);
                        continue;
                    }

                    failures += 1;
                    error!("Change stream for {} failed (attempt {}): {}", inner.table, failures, error);
                    if inner.config.max_attempts.is_some_and(|max| failures >= max) {
                        error!("Giving up on change stream for {} after {} attempts", inner.table, failures);
                        inner.progress.update(|p| {
                            p.exhausted = Some(failures);
                            true
                        });
                        inner.stream_state.set(StreamState::Exhausted { attempts: failures, error });
                        return;
                    }

                    info!("Reconnecting in {:?}", backoff);
                    inner.stream_state.set(StreamState::Backoff { attempt: failures, delay: backoff });
                    select! {
                        _ = inner.shutdown.notified() => break,
                        _ = sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(inner.config.max_backoff());
                }
            }
        }

        info!("Change stream consumer for {} stopped", inner.table);
        Self::mark_stopped(&inner);
    }

    fn mark_stopped(inner: &Inner) {
        inner.progress.update(|p| !std::mem::replace(&mut p.stopped, true));
        inner.stream_state.update(|s| !matches!(s, StreamState::Exhausted { .. }) && replace(s, StreamState::Stopped));
    }

    async fn connect_once(inner: &Arc<Inner>, parser: &mut ColumnParser) -> SessionEnd {
        let mut progressed = false;
        let result = Self::session(inner, parser, &mut progressed).await;
        SessionEnd { progressed, result }
    }

    async fn session(inner: &Arc<Inner>, parser: &mut ColumnParser, progressed: &mut bool) -> Result<(), StreamError> {
        let cursor = inner.progress.with(|p| p.cursor);
        debug!("Opening change stream for {} after offset {}", inner.table, cursor);
        let mut stream = inner.source.connect(&inner.table, cursor).await?;

        let mut batch: Vec<ChangeEvent> = Vec::new();
        while let Some(message) = stream.next().await {
            match message? {
                ShapeMessage::Change(change) => {
                    let event = ChangeEvent::from_message(&inner.table, &inner.primary_key, &change, parser)?;
                    if event.offset <= inner.progress.with(|p| p.cursor) {
                        debug!("Skipping already committed event {} at {}", event.key, event.offset);
                        continue;
                    }
                    batch.push(event);
                }
                ShapeMessage::Schema(schema) => {
                    debug!("Schema for {}: {} columns", inner.table, schema.headers.schema.len());
                    parser.set_schema(&schema.headers.schema);
                }
                ShapeMessage::Control(control) => match control.headers.control {
                    Control::UpToDate => {
                        Self::commit(inner, std::mem::take(&mut batch));
                        *progressed = true;
                    }
                    Control::MustRefetch => {
                        warn!("Server requested a refetch of {}", inner.table);
                        Self::refetch(inner);
                        *progressed = true;
                        return Ok(());
                    }
                },
            }
        }
        if !batch.is_empty() {
            debug!("Dropping {} uncommitted events for {}", batch.len(), inner.table);
        }
        Ok(())
    }

    fn commit(inner: &Inner, batch: Vec<ChangeEvent>) {
        if !batch.is_empty() {
            let keys: BTreeSet<_> = batch.iter().map(|e| e.key.clone()).collect();
            inner.state.mutate(
                |_| keys,
                |state| {
                    for event in &batch {
                        state.base.apply_event(event);
                    }
                },
            );

            let cursor = batch.iter().map(|e| e.offset).max();
            let txid = batch.iter().filter_map(|e| e.txid).max();
            debug!("Committed {} events for {} (cursor {:?}, txid {:?})", batch.len(), inner.table, cursor, txid);
            inner.progress.update(|p| {
                let before = (p.cursor, p.high_water);
                p.cursor = p.cursor.max(cursor.unwrap_or_default());
                p.high_water = p.high_water.max(txid);
                before != (p.cursor, p.high_water)
            });
        }
        inner.stream_state.update(|s| replace(s, StreamState::Live));
    }

    fn refetch(inner: &Inner) {
        inner.state.mutate(|state| state.base.keys().cloned().collect(), |state| state.base.clear());
        inner.progress.update(|p| {
            p.cursor = Offset::BeforeAll;
            true
        });
    }
}

fn replace(current: &mut StreamState, next: StreamState) -> bool {
    if *current == next {
        return false;
    }
    *current = next;
    true
}

impl Drop for ShapeConsumer {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().unwrap_or_else(|e| e.into_inner()).take() {
            debug!("Consumer for {} dropped, requesting shutdown", self.inner.table);
            self.inner.shutdown_requested.store(true, Ordering::Release);
            self.inner.shutdown.notify_waiters();
            task.abort();
            Self::mark_stopped(&self.inner);
        }
    }
}
