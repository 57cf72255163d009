use chrono::{DateTime, Utc};
use diskforge_core::{ForgeError, PartitionRecord, TableFormat};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Persisted prior state of one disk, written before a destructive call
/// and read only by an explicit rollback. Captures partition metadata when
/// the layout probe can supply it; "clean + convert" is the guaranteed
/// minimum a snapshot can always restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackSnapshot {
    pub disk: u32,
    pub taken_at: DateTime<Utc>,
    pub table: Option<TableFormat>,
    pub partitions: Vec<PartitionRecord>,
}

/// One JSON file per (disk, timestamp) under a fixed directory; the
/// filename pattern sorts lexicographically by timestamp, which is how the
/// latest snapshot is discovered.
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        SnapshotStore { dir: dir.into() }
    }

    pub fn default_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("diskforge")
            .join("snapshots")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_name(disk: u32, taken_at: &DateTime<Utc>) -> String {
        format!("disk{:03}-{}.json", disk, taken_at.format("%Y%m%dT%H%M%S%3f"))
    }

    /// Durably writes a snapshot: temp file, fsync, then rename, so a
    /// crash mid-write never leaves a half-committed snapshot behind.
    pub fn write(&self, snapshot: &RollbackSnapshot) -> Result<PathBuf, ForgeError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(Self::file_name(snapshot.disk, &snapshot.taken_at));
        let tmp = path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&serde_json::to_vec_pretty(snapshot)?)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(path)
    }

    /// Most recent snapshot for a disk, or `None` when none exists.
    pub fn latest(&self, disk: u32) -> Result<Option<RollbackSnapshot>, ForgeError> {
        let prefix = format!("disk{:03}-", disk);
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut names: Vec<String> = entries
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with(&prefix) && n.ends_with(".json"))
            .collect();
        names.sort();
        let Some(name) = names.pop() else {
            return Ok(None);
        };
        let text = fs::read_to_string(self.dir.join(name))?;
        Ok(Some(serde_json::from_str(&text)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn snapshot_at(disk: u32, secs: u32) -> RollbackSnapshot {
        RollbackSnapshot {
            disk,
            taken_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, secs).unwrap(),
            table: Some(TableFormat::Gpt),
            partitions: vec![],
        }
    }

    #[test]
    fn latest_picks_the_newest_by_filename() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        store.write(&snapshot_at(1, 10)).unwrap();
        store.write(&snapshot_at(1, 30)).unwrap();
        store.write(&snapshot_at(1, 20)).unwrap();
        store.write(&snapshot_at(2, 59)).unwrap();

        let latest = store.latest(1).unwrap().expect("snapshot exists");
        assert_eq!(latest.taken_at.timestamp() % 60, 30);
    }

    #[test]
    fn missing_disk_or_directory_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("never-created"));
        assert!(store.latest(7).unwrap().is_none());

        let store = SnapshotStore::new(dir.path());
        store.write(&snapshot_at(1, 0)).unwrap();
        assert!(store.latest(9).unwrap().is_none());
    }

    #[test]
    fn snapshots_round_trip_partition_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let mut snapshot = snapshot_at(4, 0);
        snapshot.partitions.push(PartitionRecord {
            number: 1,
            offset_bytes: 1_048_576,
            size_bytes: 256 * 1_048_576,
            kind: Some("Basic".to_string()),
            letter: Some('G'),
        });
        store.write(&snapshot).unwrap();
        assert_eq!(store.latest(4).unwrap().unwrap(), snapshot);
    }
}
