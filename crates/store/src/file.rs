//! File-backed checkpoint store: one JSON file per instance.
//!
//! Writes go to a temp file in the same directory followed by an atomic
//! rename over the target, so a crash mid-write leaves the previous record
//! intact. Stale temp files from a crashed writer are ignored on load and
//! overwritten by the next save.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{CheckpointRecord, CheckpointStore, StoreError};

const TMP_SUFFIX: &str = ".json.tmp";

pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn record_path(&self, instance_id: &str) -> Result<PathBuf, StoreError> {
        // Instance ids become file names; anything that could escape the
        // store directory is rejected outright.
        let ok = !instance_id.is_empty()
            && instance_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !ok {
            return Err(StoreError::InvalidId(instance_id.to_string()));
        }
        Ok(self.dir.join(format!("{instance_id}.json")))
    }

    fn tmp_path(path: &Path) -> PathBuf {
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        PathBuf::from(tmp)
    }
}

#[async_trait]
impl CheckpointStore for FileStore {
    async fn save(&self, record: CheckpointRecord) -> Result<(), StoreError> {
        let path = self.record_path(&record.instance_id)?;

        match self.load(&record.instance_id).await {
            Ok(existing) if existing.same_payload(&record) => {
                debug!(instance_id = %record.instance_id, "identical checkpoint, skipping write");
                return Ok(());
            }
            Ok(_) | Err(StoreError::NotFound(_)) => {}
            Err(err) => {
                // A corrupt current record must not block recovery; the
                // atomic replace below supersedes it.
                warn!(instance_id = %record.instance_id, %err, "replacing unreadable checkpoint");
            }
        }

        let bytes = serde_json::to_vec_pretty(&record)?;
        let tmp = Self::tmp_path(&path);
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn load(&self, instance_id: &str) -> Result<CheckpointRecord, StoreError> {
        let path = self.record_path(instance_id)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(instance_id.to_string()));
            }
            Err(err) => return Err(err.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn delete(&self, instance_id: &str) -> Result<(), StoreError> {
        let path = self.record_path(instance_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(instance_id.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.ends_with(TMP_SUFFIX) {
                continue;
            }
            if let Some(id) = name.strip_suffix(".json") {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn save_load_roundtrip() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();

        let record = CheckpointRecord::new("inst-1", "aggregate", json!({ "total": 7 }));
        store.save(record).await.unwrap();

        let loaded = store.load("inst-1").await.unwrap();
        assert_eq!(loaded.step_name, "aggregate");
        assert_eq!(loaded.state_blob["total"], 7);
    }

    #[tokio::test]
    async fn crash_before_rename_leaves_previous_record_loadable() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();

        let good = CheckpointRecord::new("inst-1", "validate", json!({ "n": 3 }));
        store.save(good).await.unwrap();

        // Simulate a writer that died after writing half a temp file.
        let torn = dir.path().join("inst-1.json.tmp");
        std::fs::write(&torn, b"{\"instance_id\": \"inst-1\", \"step_na").unwrap();

        let loaded = store.load("inst-1").await.unwrap();
        assert_eq!(loaded.step_name, "validate");
        assert_eq!(loaded.state_blob, json!({ "n": 3 }));
    }

    #[tokio::test]
    async fn temp_files_are_not_listed() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();

        store
            .save(CheckpointRecord::new("inst-1", "init", json!({})))
            .await
            .unwrap();
        std::fs::write(dir.path().join("inst-2.json.tmp"), b"partial").unwrap();

        assert_eq!(store.list().await.unwrap(), vec!["inst-1".to_string()]);
    }

    #[tokio::test]
    async fn identical_save_is_a_no_op() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();

        let record = CheckpointRecord::new("inst-1", "process", json!({ "n": 1 }));
        let written_at = record.written_at;
        store.save(record.clone()).await.unwrap();

        let mut again = record;
        again.written_at = written_at + chrono::Duration::seconds(60);
        store.save(again).await.unwrap();

        // The original record survives untouched, timestamp included.
        assert_eq!(store.load("inst-1").await.unwrap().written_at, written_at);
    }

    #[tokio::test]
    async fn path_escaping_ids_are_rejected() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();

        let record = CheckpointRecord::new("../evil", "init", json!({}));
        assert!(matches!(
            store.save(record).await,
            Err(StoreError::InvalidId(_))
        ));
    }

    #[tokio::test]
    async fn delete_removes_the_record() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();

        store
            .save(CheckpointRecord::new("inst-1", "init", json!({})))
            .await
            .unwrap();
        store.delete("inst-1").await.unwrap();

        assert!(matches!(
            store.load("inst-1").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.delete("inst-1").await,
            Err(StoreError::NotFound(_))
        ));
    }
}
