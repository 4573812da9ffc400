//! In-memory source and sink doubles, for tests and local development.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use uuid::Uuid;

use sluice_api::error::{SinkError, SourceError};
use sluice_api::record::{PartitionId, SourceMessage, UserRecord};
use sluice_api::sink::RecordSink;
use sluice_api::source::{PartitionStream, RecordSource, StartPosition};

/// Sink double: upserts into a map keyed by record id, with optional
/// injected write failures.
#[derive(Default)]
pub struct MemorySink {
    rows: Mutex<HashMap<Uuid, UserRecord>>,
    provision_calls: AtomicU32,
    write_calls: AtomicU32,
    failures_left: AtomicU32,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` write calls with a write error.
    pub fn fail_next_writes(&self, n: u32) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    pub fn rows(&self) -> Vec<UserRecord> {
        let guard = match self.rows.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.values().cloned().collect()
    }

    pub fn row(&self, id: Uuid) -> Option<UserRecord> {
        let guard = match self.rows.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.get(&id).cloned()
    }

    pub fn provision_calls(&self) -> u32 {
        self.provision_calls.load(Ordering::SeqCst)
    }

    pub fn write_calls(&self) -> u32 {
        self.write_calls.load(Ordering::SeqCst)
    }
}

impl RecordSink for MemorySink {
    fn ensure_schema(&self) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>> {
        Box::pin(async move {
            self.provision_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn write(
        &self,
        records: &[UserRecord],
    ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>> {
        let records = records.to_vec();
        Box::pin(async move {
            self.write_calls.fetch_add(1, Ordering::SeqCst);

            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                if left != u32::MAX {
                    self.failures_left.store(left - 1, Ordering::SeqCst);
                }
                return Err(SinkError::Write("injected failure".into()));
            }

            let mut guard = match self.rows.lock() {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };
            for record in records {
                guard.insert(record.id, record);
            }
            Ok(())
        })
    }
}

/// Source double fed from per-partition scripts of fetch outcomes. Each
/// `fetch` pops the next scripted outcome; an exhausted script keeps
/// returning empty pulls.
pub struct ScriptedSource {
    partitions: Vec<PartitionId>,
    scripts: Mutex<HashMap<PartitionId, VecDeque<Result<Vec<SourceMessage>, SourceError>>>>,
    opens: Mutex<Vec<(PartitionId, StartPosition)>>,
}

impl ScriptedSource {
    pub fn new(partitions: Vec<PartitionId>) -> Self {
        Self {
            partitions,
            scripts: Mutex::new(HashMap::new()),
            opens: Mutex::new(Vec::new()),
        }
    }

    /// Queue the outcome of the next fetch on `partition`.
    pub fn push_fetch(
        &self,
        partition: PartitionId,
        outcome: Result<Vec<SourceMessage>, SourceError>,
    ) {
        let mut guard = match self.scripts.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.entry(partition).or_default().push_back(outcome);
    }

    /// Every `(partition, start)` pair passed to `open` so far.
    pub fn opens(&self) -> Vec<(PartitionId, StartPosition)> {
        let guard = match self.opens.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.clone()
    }
}

impl RecordSource for ScriptedSource {
    fn partitions(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<PartitionId>, SourceError>> + Send + '_>> {
        Box::pin(async move { Ok(self.partitions.clone()) })
    }

    fn open(
        &self,
        partition: PartitionId,
        start: StartPosition,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn PartitionStream>, SourceError>> + Send + '_>>
    {
        Box::pin(async move {
            {
                let mut guard = match self.opens.lock() {
                    Ok(g) => g,
                    Err(poisoned) => poisoned.into_inner(),
                };
                guard.push((partition, start));
            }
            let script = {
                let mut guard = match self.scripts.lock() {
                    Ok(g) => g,
                    Err(poisoned) => poisoned.into_inner(),
                };
                guard.remove(&partition).unwrap_or_default()
            };
            Ok(Box::new(ScriptedStream { script }) as Box<dyn PartitionStream>)
        })
    }
}

pub struct ScriptedStream {
    script: VecDeque<Result<Vec<SourceMessage>, SourceError>>,
}

impl ScriptedStream {
    pub fn new(script: VecDeque<Result<Vec<SourceMessage>, SourceError>>) -> Self {
        Self { script }
    }
}

impl PartitionStream for ScriptedStream {
    fn fetch(
        &mut self,
        _max: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SourceMessage>, SourceError>> + Send + '_>> {
        Box::pin(async move { self.script.pop_front().unwrap_or_else(|| Ok(Vec::new())) })
    }
}

/// Build a source message holding a JSON payload at the given offset.
pub fn json_message(partition: PartitionId, offset: i64, json: &str) -> SourceMessage {
    SourceMessage {
        partition,
        offset,
        payload: json.as_bytes().to_vec(),
    }
}
