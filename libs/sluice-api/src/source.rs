use std::future::Future;
use std::pin::Pin;

use crate::error::SourceError;
use crate::record::{Offset, PartitionId, SourceMessage};

/// Where a partition stream starts consuming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPosition {
    /// Oldest offset the source still retains.
    Earliest,
    /// Only messages appended after the stream opens.
    Latest,
    /// Resume at this offset; the first message returned carries it.
    Offset(Offset),
}

/// A positioned consumer over a single partition.
///
/// `fetch` pulls up to `max` messages, returning whatever arrives within
/// the implementation's poll window. An empty result is normal — the
/// engine just waits for the next cadence tick.
pub trait PartitionStream: Send {
    fn fetch(
        &mut self,
        max: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SourceMessage>, SourceError>> + Send + '_>>;
}

/// Source queue seam.
///
/// The engine doesn't know concrete sources; offsets are tracked by the
/// engine's checkpoint store, so implementations must not advance any
/// server-side consumer position on their own.
pub trait RecordSource: Send + Sync {
    /// Discover the topic's partitions.
    fn partitions(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<PartitionId>, SourceError>> + Send + '_>>;

    /// Open a stream over one partition, positioned at `start`.
    fn open(
        &self,
        partition: PartitionId,
        start: StartPosition,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn PartitionStream>, SourceError>> + Send + '_>>;
}
