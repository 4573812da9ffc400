use std::sync::Arc;

use sluice_api::record::UserRecord;
use sluice_api::sink::RecordSink;

use crate::config::RetryConfig;
use crate::error::WriteError;

/// Retrying wrapper around the sink seam.
///
/// Every write error is retried with bounded exponential backoff; only
/// exhaustion surfaces to the engine, which then parks the batch for the
/// next cadence tick. There is no partial outcome — the sink contract is
/// all-or-nothing and re-writing an already-written prefix is a safe
/// upsert.
pub struct SinkWriter {
    sink: Arc<dyn RecordSink>,
    retry: RetryConfig,
}

impl SinkWriter {
    pub fn new(sink: Arc<dyn RecordSink>, retry: RetryConfig) -> Self {
        Self { sink, retry }
    }

    pub async fn write(&self, records: &[UserRecord]) -> Result<(), WriteError> {
        let attempts = self.retry.max_attempts.max(1);
        let mut delay = self.retry.initial_backoff();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.sink.write(records).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt >= attempts => {
                    return Err(WriteError {
                        attempts: attempt,
                        last: e,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        backoff_ms = delay.as_millis() as u64,
                        error = %e,
                        "sink write failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(self.retry.max_backoff());
                }
            }
        }
    }
}
