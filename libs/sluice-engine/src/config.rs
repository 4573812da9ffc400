use std::time::Duration;

use serde::Deserialize;

use crate::error::EngineError;

/// Root configuration — parsed from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct SluiceConfig {
    pub source: SourceConfig,
    pub sink: SinkConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Broker bootstrap address(es), comma separated.
    pub brokers: String,
    pub topic: String,

    /// Where a partition with no checkpoint starts consuming.
    #[serde(default)]
    pub start: StartOffsetPolicy,

    /// Most records pulled in one trigger cycle per partition.
    #[serde(default = "default_max_batch_records")]
    pub max_batch_records: usize,

    /// How long one fetch waits for data before returning what it has.
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartOffsetPolicy {
    #[default]
    Earliest,
    Latest,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    pub nodes: Vec<String>,

    #[serde(default = "default_keyspace")]
    pub keyspace: String,

    #[serde(default = "default_table")]
    pub table: String,

    #[serde(default = "default_replication_factor")]
    pub replication_factor: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Wall-clock period between consecutive pull attempts.
    #[serde(default = "default_trigger_interval_secs")]
    pub trigger_interval_secs: u64,

    /// Directory holding per-partition checkpoint files.
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_batch_records() -> usize {
    500
}
fn default_poll_timeout_ms() -> u64 {
    1000
}
fn default_keyspace() -> String {
    "user_data".into()
}
fn default_table() -> String {
    "users".into()
}
fn default_replication_factor() -> u16 {
    1
}
fn default_trigger_interval_secs() -> u64 {
    10
}
fn default_checkpoint_dir() -> String {
    "./checkpoints".into()
}
fn default_max_attempts() -> u32 {
    5
}
fn default_initial_backoff_ms() -> u64 {
    200
}
fn default_max_backoff_ms() -> u64 {
    5000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            trigger_interval_secs: default_trigger_interval_secs(),
            checkpoint_dir: default_checkpoint_dir(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl SluiceConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, EngineError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| EngineError::Config(format!("{path}: {e}")))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, EngineError> {
        toml::from_str(toml_str).map_err(|e| EngineError::Config(e.to_string()))
    }
}

impl SourceConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

impl EngineConfig {
    pub fn trigger_interval(&self) -> Duration {
        Duration::from_secs(self.trigger_interval_secs)
    }
}

impl RetryConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}
