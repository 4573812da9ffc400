use std::future::Future;
use std::pin::Pin;

use crate::error::SinkError;
use crate::record::UserRecord;

/// Sink store seam.
///
/// For the engine, the sink is just this trait: provision once, then
/// upsert batches keyed by record id.
pub trait RecordSink: Send + Sync {
    /// Create the destination keyspace and table if absent. Idempotent and
    /// called on every process start; the engine must not consume until
    /// this has succeeded.
    fn ensure_schema(&self) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>>;

    /// Upsert every record, keyed by `id` with last write winning.
    /// All-or-nothing from the caller's perspective: the first failure
    /// aborts the call. Safe to call twice with the same records.
    fn write(
        &self,
        records: &[UserRecord],
    ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>>;
}
