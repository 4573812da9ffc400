use sluice_api::error::{SinkError, SourceError};
use sluice_api::record::{Offset, PartitionId};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("config error: {0}")]
    Config(String),

    #[error("schema provisioning: {0}")]
    Provision(#[source] SinkError),

    #[error("source error: {0}")]
    Source(#[from] SourceError),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),
}

/// Progress tracking failed. Fatal for the affected partition: without a
/// trustworthy checkpoint the worker must halt rather than guess an offset.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("checkpoint io ({path}): {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("checkpoint parse ({path}): {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("partition {partition}: offset {proposed} regresses below committed {committed}")]
    Regressed {
        partition: PartitionId,
        committed: Offset,
        proposed: Offset,
    },
}

/// A batch write that exhausted its retries.
#[derive(Debug, thiserror::Error)]
#[error("sink write failed after {attempts} attempts: {last}")]
pub struct WriteError {
    pub attempts: u32,
    #[source]
    pub last: SinkError,
}
