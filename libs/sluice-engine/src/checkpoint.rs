use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use sluice_api::record::{Offset, PartitionId};

use crate::error::CheckpointError;

#[derive(Debug, Serialize, Deserialize)]
struct CheckpointFile {
    offset: Offset,
}

/// Durable per-partition offset store.
///
/// One JSON file per partition under the checkpoint directory, replaced
/// atomically (temp file + fsync + rename) on every commit. Partitions
/// commit independently; the only invariant enforced here is that a
/// partition's offset never decreases.
pub struct CheckpointStore {
    dir: PathBuf,
    committed: RwLock<HashMap<PartitionId, Offset>>,
}

impl CheckpointStore {
    /// Open the store, creating the directory if needed and recovering any
    /// offsets committed by a previous process.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CheckpointError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| CheckpointError::Io {
            path: dir.display().to_string(),
            source: e,
        })?;

        let mut committed = HashMap::new();
        let entries = fs::read_dir(&dir).map_err(|e| CheckpointError::Io {
            path: dir.display().to_string(),
            source: e,
        })?;
        for entry in entries {
            let entry = entry.map_err(|e| CheckpointError::Io {
                path: dir.display().to_string(),
                source: e,
            })?;
            let name = entry.file_name();
            // Skip anything that is not ours, including temp files left by
            // a crash mid-commit (the rename never happened, so the live
            // file still holds the last durable offset).
            let Some(partition) = parse_partition_file_name(&name.to_string_lossy()) else {
                continue;
            };

            let path = entry.path();
            let content = fs::read_to_string(&path).map_err(|e| CheckpointError::Io {
                path: path.display().to_string(),
                source: e,
            })?;
            let file: CheckpointFile =
                serde_json::from_str(&content).map_err(|e| CheckpointError::Parse {
                    path: path.display().to_string(),
                    source: e,
                })?;
            committed.insert(partition, file.offset);
        }

        Ok(Self {
            dir,
            committed: RwLock::new(committed),
        })
    }

    /// Last committed offsets for every known partition.
    pub fn load(&self) -> HashMap<PartitionId, Offset> {
        self.read_map().clone()
    }

    /// Last committed offset for one partition, if any.
    pub fn committed(&self, partition: PartitionId) -> Option<Offset> {
        self.read_map().get(&partition).copied()
    }

    /// Durably persist `offset` as the last committed position of
    /// `partition`. Returns only after the file has reached stable storage.
    pub fn commit(&self, partition: PartitionId, offset: Offset) -> Result<(), CheckpointError> {
        if let Some(&current) = self.read_map().get(&partition) {
            if offset < current {
                return Err(CheckpointError::Regressed {
                    partition,
                    committed: current,
                    proposed: offset,
                });
            }
        }

        let path = self.dir.join(partition_file_name(partition));
        let tmp = self.dir.join(format!("{}.tmp", partition_file_name(partition)));

        let body = serde_json::to_vec(&CheckpointFile { offset }).map_err(|e| {
            CheckpointError::Parse {
                path: path.display().to_string(),
                source: e,
            }
        })?;

        let io_err = |e: std::io::Error| CheckpointError::Io {
            path: tmp.display().to_string(),
            source: e,
        };
        let mut f = fs::File::create(&tmp).map_err(io_err)?;
        f.write_all(&body).map_err(io_err)?;
        f.sync_all().map_err(io_err)?;
        drop(f);

        fs::rename(&tmp, &path).map_err(|e| CheckpointError::Io {
            path: path.display().to_string(),
            source: e,
        })?;

        self.write_map().insert(partition, offset);
        Ok(())
    }

    fn read_map(&self) -> std::sync::RwLockReadGuard<'_, HashMap<PartitionId, Offset>> {
        match self.committed.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("checkpoint map lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write_map(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<PartitionId, Offset>> {
        match self.committed.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("checkpoint map lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

fn partition_file_name(partition: PartitionId) -> String {
    format!("partition-{partition}.json")
}

fn parse_partition_file_name(name: &str) -> Option<PartitionId> {
    name.strip_prefix("partition-")?
        .strip_suffix(".json")?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cold_start_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(dir.path()).unwrap();
        assert!(store.load().is_empty());
        assert_eq!(store.committed(0), None);
    }

    #[test]
    fn commit_then_reopen_recovers_offsets() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = CheckpointStore::open(dir.path()).unwrap();
            store.commit(0, 41).unwrap();
            store.commit(0, 42).unwrap();
            store.commit(3, 7).unwrap();
        }

        let store = CheckpointStore::open(dir.path()).unwrap();
        assert_eq!(store.committed(0), Some(42));
        assert_eq!(store.committed(3), Some(7));
        assert_eq!(store.load().len(), 2);
    }

    #[test]
    fn partitions_commit_independently() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(dir.path()).unwrap();
        store.commit(1, 100).unwrap();
        store.commit(2, 5).unwrap();
        assert_eq!(store.committed(1), Some(100));
        assert_eq!(store.committed(2), Some(5));
    }

    #[test]
    fn offset_regression_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(dir.path()).unwrap();
        store.commit(0, 10).unwrap();
        let err = store.commit(0, 9).unwrap_err();
        assert!(matches!(
            err,
            CheckpointError::Regressed {
                partition: 0,
                committed: 10,
                proposed: 9
            }
        ));
        // Re-committing the same offset is fine (idempotent redelivery).
        store.commit(0, 10).unwrap();
    }

    #[test]
    fn commit_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(dir.path()).unwrap();
        store.commit(0, 1).unwrap();
        store.commit(0, 2).unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["partition-0.json".to_string()]);
    }

    #[test]
    fn stray_files_are_ignored_on_open() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("partition-0.json.tmp"), b"{}").unwrap();
        fs::write(dir.path().join("notes.txt"), b"hi").unwrap();

        let store = CheckpointStore::open(dir.path()).unwrap();
        assert!(store.load().is_empty());
    }
}
