use std::sync::Arc;

use tokio::sync::watch;

use sluice_api::record::PartitionId;
use sluice_api::sink::RecordSink;
use sluice_api::source::{RecordSource, StartPosition};

use crate::checkpoint::CheckpointStore;
use crate::config::{SluiceConfig, StartOffsetPolicy};
use crate::error::EngineError;
use crate::worker::{self, WorkerContext};
use crate::writer::SinkWriter;

/// Per-partition shutdown + join handle.
struct WorkerSlot {
    partition: PartitionId,
    handle: tokio::task::JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

/// The running engine — one worker task per source partition.
///
/// Workers share nothing mutable except the checkpoint store, which
/// commits per partition without cross-partition locking.
pub struct Engine {
    workers: Vec<WorkerSlot>,
}

impl Engine {
    /// Bootstrap the engine: provision the sink, recover checkpoints, open
    /// one stream per partition, spawn workers.
    ///
    /// Provisioning failure is fatal — the engine must not start consuming
    /// into an unprovisioned sink.
    pub async fn bootstrap(
        config: &SluiceConfig,
        source: Arc<dyn RecordSource>,
        sink: Arc<dyn RecordSink>,
    ) -> Result<Self, EngineError> {
        sink.ensure_schema().await.map_err(EngineError::Provision)?;
        tracing::info!("sink schema provisioned");

        let checkpoints = Arc::new(CheckpointStore::open(&config.engine.checkpoint_dir)?);
        let recovered = checkpoints.load();
        if !recovered.is_empty() {
            tracing::info!(partitions = recovered.len(), "recovered checkpoints");
        }

        let partitions = source.partitions().await?;
        tracing::info!(
            topic = %config.source.topic,
            partitions = partitions.len(),
            "discovered source partitions"
        );

        let writer = Arc::new(SinkWriter::new(sink, config.retry.clone()));

        let mut workers = Vec::with_capacity(partitions.len());
        for partition in partitions {
            let start = match checkpoints.committed(partition) {
                // The checkpoint holds the last committed offset; resume
                // with the message after it.
                Some(offset) => StartPosition::Offset(offset + 1),
                None => match config.source.start {
                    StartOffsetPolicy::Earliest => StartPosition::Earliest,
                    StartOffsetPolicy::Latest => StartPosition::Latest,
                },
            };

            let stream = source.open(partition, start).await?;
            tracing::info!(partition, ?start, "opened partition stream");

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let ctx = WorkerContext {
                partition,
                stream,
                writer: Arc::clone(&writer),
                checkpoints: Arc::clone(&checkpoints),
                trigger_interval: config.engine.trigger_interval(),
                max_batch_records: config.source.max_batch_records,
            };
            let handle = tokio::spawn(worker::run(ctx, shutdown_rx));

            workers.push(WorkerSlot {
                partition,
                handle,
                shutdown_tx,
            });
        }

        Ok(Engine { workers })
    }

    pub fn partition_count(&self) -> usize {
        self.workers.len()
    }

    /// Graceful shutdown: signal all workers and wait for them. A worker
    /// past its write step finishes the checkpoint commit before exiting.
    pub async fn shutdown(self) {
        for slot in &self.workers {
            let _ = slot.shutdown_tx.send(true);
        }
        for slot in self.workers {
            if let Err(e) = slot.handle.await {
                tracing::error!(partition = slot.partition, error = %e, "worker task failed");
            }
        }
        tracing::info!("engine shut down");
    }
}
