use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use sluice_api::codec;
use sluice_api::record::{Offset, PartitionId, UserRecord};
use sluice_api::source::PartitionStream;

use crate::checkpoint::CheckpointStore;
use crate::error::CheckpointError;
use crate::writer::SinkWriter;

pub(crate) struct WorkerContext {
    pub partition: PartitionId,
    pub stream: Box<dyn PartitionStream>,
    pub writer: Arc<SinkWriter>,
    pub checkpoints: Arc<CheckpointStore>,
    pub trigger_interval: Duration,
    pub max_batch_records: usize,
}

/// A decoded batch waiting on write + commit. Retained across ticks when
/// the sink write fails, so the same batch is retried without re-pulling.
pub(crate) struct PendingBatch {
    records: Vec<UserRecord>,
    end_offset: Offset,
}

/// One logical worker loop per partition: on every cadence tick, pull,
/// decode, write through the sink, then advance the checkpoint. Shutdown
/// is only observed between ticks — an in-flight cycle always finishes its
/// write-and-commit, so the write-before-commit ordering is never torn.
pub(crate) async fn run(mut ctx: WorkerContext, mut shutdown_rx: watch::Receiver<bool>) {
    let mut tick = tokio::time::interval(ctx.trigger_interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut pending: Option<PendingBatch> = None;

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = shutdown_rx.changed() => {
                tracing::info!(partition = ctx.partition, "worker shutting down");
                return;
            }
        }

        match run_cycle(&mut ctx, pending.take()).await {
            Ok(next) => pending = next,
            Err(e) => {
                // Without a trustworthy checkpoint this partition cannot
                // make progress; other partitions keep running.
                tracing::error!(partition = ctx.partition, error = %e, "halting partition worker");
                return;
            }
        }
    }
}

/// One trigger cycle. Returns the batch to retry next tick when the sink
/// rejected it, `None` when everything (or nothing) was committed.
pub(crate) async fn run_cycle(
    ctx: &mut WorkerContext,
    pending: Option<PendingBatch>,
) -> Result<Option<PendingBatch>, CheckpointError> {
    let batch = match pending {
        // Same batch as last tick: no new pull until it lands.
        Some(batch) => batch,
        None => match pull_batch(ctx).await {
            Some(batch) => batch,
            None => return Ok(None),
        },
    };

    if !batch.records.is_empty() {
        if let Err(e) = ctx.writer.write(&batch.records).await {
            tracing::error!(
                partition = ctx.partition,
                end_offset = batch.end_offset,
                error = %e,
                "batch write failed, retrying on next tick"
            );
            return Ok(Some(batch));
        }
    }

    ctx.checkpoints.commit(ctx.partition, batch.end_offset)?;
    tracing::debug!(
        partition = ctx.partition,
        end_offset = batch.end_offset,
        records = batch.records.len(),
        "batch committed"
    );
    Ok(None)
}

/// Pull and decode the next batch. Undecodable messages are dropped with a
/// warning; they never fail the batch. Returns `None` on an empty pull or
/// a fetch error (both just wait for the next tick).
async fn pull_batch(ctx: &mut WorkerContext) -> Option<PendingBatch> {
    let messages = match ctx.stream.fetch(ctx.max_batch_records).await {
        Ok(messages) => messages,
        Err(e) => {
            tracing::warn!(partition = ctx.partition, error = %e, "fetch failed, retrying on next tick");
            return None;
        }
    };

    let end_offset = messages.last().map(|m| m.offset)?;

    let mut records = Vec::with_capacity(messages.len());
    for message in &messages {
        match codec::decode(&message.payload) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!(
                    partition = message.partition,
                    offset = message.offset,
                    error = %e,
                    "dropping undecodable message"
                );
            }
        }
    }

    Some(PendingBatch {
        records,
        end_offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::mock::{json_message, MemorySink, ScriptedStream};
    use sluice_api::error::SourceError;
    use std::collections::VecDeque;
    use uuid::Uuid;

    const ANN: &str = r#"{"id":"72e7ff34-3b65-4f7b-b053-5ab63aad5b77","first_name":"Ann","email":"a@x.com"}"#;
    const BOB: &str = r#"{"id":"c4f94c37-56f5-4d27-a3c5-4e19b9a6b31a","first_name":"Bob"}"#;

    fn ann_id() -> Uuid {
        Uuid::parse_str("72e7ff34-3b65-4f7b-b053-5ab63aad5b77").unwrap()
    }

    struct Fixture {
        sink: Arc<MemorySink>,
        ctx: WorkerContext,
        _dir: tempfile::TempDir,
    }

    fn fixture(
        script: VecDeque<Result<Vec<sluice_api::record::SourceMessage>, SourceError>>,
        retry: RetryConfig,
    ) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(MemorySink::new());
        let ctx = WorkerContext {
            partition: 0,
            stream: Box::new(ScriptedStream::new(script)),
            writer: Arc::new(SinkWriter::new(sink.clone(), retry)),
            checkpoints: Arc::new(CheckpointStore::open(dir.path()).unwrap()),
            trigger_interval: Duration::from_secs(10),
            max_batch_records: 500,
        };
        Fixture {
            sink,
            ctx,
            _dir: dir,
        }
    }

    fn quick_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 1,
            initial_backoff_ms: 1,
            max_backoff_ms: 1,
        }
    }

    #[tokio::test]
    async fn commits_a_decoded_batch() {
        let script = VecDeque::from([Ok(vec![
            json_message(0, 10, ANN),
            json_message(0, 11, BOB),
        ])]);
        let mut f = fixture(script, quick_retry());

        let pending = run_cycle(&mut f.ctx, None).await.unwrap();
        assert!(pending.is_none());
        assert_eq!(f.sink.rows().len(), 2);
        assert_eq!(f.ctx.checkpoints.committed(0), Some(11));
    }

    #[tokio::test]
    async fn empty_pull_is_not_an_error() {
        let mut f = fixture(VecDeque::new(), quick_retry());
        let pending = run_cycle(&mut f.ctx, None).await.unwrap();
        assert!(pending.is_none());
        assert_eq!(f.ctx.checkpoints.committed(0), None);
        assert_eq!(f.sink.write_calls(), 0);
    }

    #[tokio::test]
    async fn malformed_message_is_dropped_not_fatal() {
        let script = VecDeque::from([Ok(vec![
            json_message(0, 5, "definitely not json"),
            json_message(0, 6, ANN),
        ])]);
        let mut f = fixture(script, quick_retry());

        run_cycle(&mut f.ctx, None).await.unwrap();
        assert_eq!(f.sink.rows().len(), 1);
        assert_eq!(f.sink.row(ann_id()).unwrap().first_name.as_deref(), Some("Ann"));
        assert_eq!(f.ctx.checkpoints.committed(0), Some(6));
    }

    #[tokio::test]
    async fn fully_undecodable_batch_still_advances() {
        let script = VecDeque::from([Ok(vec![json_message(0, 3, "{"), json_message(0, 4, "[]")])]);
        let mut f = fixture(script, quick_retry());

        run_cycle(&mut f.ctx, None).await.unwrap();
        assert_eq!(f.sink.write_calls(), 0);
        assert_eq!(f.ctx.checkpoints.committed(0), Some(4));
    }

    #[tokio::test]
    async fn fetch_error_waits_for_next_tick() {
        let script = VecDeque::from([
            Err(SourceError::Fetch {
                partition: 0,
                message: "broker away".into(),
            }),
            Ok(vec![json_message(0, 1, ANN)]),
        ]);
        let mut f = fixture(script, quick_retry());

        let pending = run_cycle(&mut f.ctx, None).await.unwrap();
        assert!(pending.is_none());
        assert_eq!(f.ctx.checkpoints.committed(0), None);

        run_cycle(&mut f.ctx, None).await.unwrap();
        assert_eq!(f.ctx.checkpoints.committed(0), Some(1));
    }

    #[tokio::test]
    async fn failed_write_parks_the_batch_without_committing() {
        let script = VecDeque::from([Ok(vec![json_message(0, 20, ANN)])]);
        let mut f = fixture(script, quick_retry());
        f.sink.fail_next_writes(1);

        let pending = run_cycle(&mut f.ctx, None).await.unwrap();
        let pending = pending.expect("batch should be parked for retry");
        assert_eq!(f.ctx.checkpoints.committed(0), None);
        assert!(f.sink.rows().is_empty());

        // Sink healed: the same batch lands and commits on the next tick.
        let pending = run_cycle(&mut f.ctx, Some(pending)).await.unwrap();
        assert!(pending.is_none());
        assert_eq!(f.sink.rows().len(), 1);
        assert_eq!(f.ctx.checkpoints.committed(0), Some(20));
    }

    #[tokio::test]
    async fn redelivery_after_lost_commit_is_idempotent() {
        // First delivery reached the sink, but the process died before the
        // checkpoint commit.
        let script = VecDeque::from([Ok(vec![json_message(0, 7, ANN)])]);
        let mut f = fixture(script, quick_retry());
        let record = sluice_api::codec::decode(ANN.as_bytes()).unwrap();
        f.ctx.writer.write(&[record]).await.unwrap();
        let after_first = f.sink.rows();
        assert_eq!(f.ctx.checkpoints.committed(0), None);

        // The restarted worker re-pulls the same message from offset 7.
        run_cycle(&mut f.ctx, None).await.unwrap();

        assert_eq!(f.sink.rows(), after_first);
        assert_eq!(f.sink.rows().len(), 1);
        assert_eq!(f.ctx.checkpoints.committed(0), Some(7));
    }

    #[tokio::test]
    async fn commits_in_offset_order() {
        let script = VecDeque::from([
            Ok(vec![json_message(0, 1, ANN)]),
            Ok(vec![json_message(0, 2, BOB)]),
        ]);
        let mut f = fixture(script, quick_retry());

        run_cycle(&mut f.ctx, None).await.unwrap();
        let first = f.ctx.checkpoints.committed(0).unwrap();
        run_cycle(&mut f.ctx, None).await.unwrap();
        let second = f.ctx.checkpoints.committed(0).unwrap();
        assert!(second >= first);
    }
}
