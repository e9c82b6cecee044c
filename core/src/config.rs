use optisync_proto::TableName;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const INITIAL_BACKOFF_MS: u64 = 1_000;
const MAX_BACKOFF_MS: u64 = 30_000;

/// Reconnection policy of the change-stream consumer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Delay before the first reconnect; doubles on every consecutive failure
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Consecutive failed sessions before the consumer gives up. None retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for StreamConfig {
    fn default() -> Self { Self { initial_backoff_ms: INITIAL_BACKOFF_MS, max_backoff_ms: MAX_BACKOFF_MS, max_attempts: None } }
}

impl StreamConfig {
    pub fn initial_backoff(&self) -> Duration { Duration::from_millis(self.initial_backoff_ms) }

    pub fn max_backoff(&self) -> Duration { Duration::from_millis(self.max_backoff_ms.max(self.initial_backoff_ms)) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub table: TableName,
    /// Column holding the row's primary key
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    #[serde(default)]
    pub stream: StreamConfig,
}

fn default_primary_key() -> String { "id".to_string() }

impl CollectionConfig {
    pub fn new(table: impl Into<TableName>) -> Self { Self { table: table.into(), primary_key: default_primary_key(), stream: StreamConfig::default() } }

    pub fn with_primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }

    pub fn with_stream(mut self, stream: StreamConfig) -> Self {
        self.stream = stream;
        self
    }
}
