//! In-memory checkpoint store.
//!
//! Backs unit tests and ephemeral API runs. Keyed concurrent map, so saves
//! to distinct instance ids never contend on a shared lock.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::{CheckpointRecord, CheckpointStore, StoreError};

#[derive(Default)]
pub struct MemoryStore {
    records: DashMap<String, CheckpointRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn save(&self, record: CheckpointRecord) -> Result<(), StoreError> {
        if let Some(existing) = self.records.get(&record.instance_id) {
            if existing.same_payload(&record) {
                return Ok(());
            }
        }
        self.records.insert(record.instance_id.clone(), record);
        Ok(())
    }

    async fn load(&self, instance_id: &str) -> Result<CheckpointRecord, StoreError> {
        self.records
            .get(instance_id)
            .map(|r| r.clone())
            .ok_or_else(|| StoreError::NotFound(instance_id.to_string()))
    }

    async fn delete(&self, instance_id: &str) -> Result<(), StoreError> {
        self.records
            .remove(instance_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(instance_id.to_string()))
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.records.iter().map(|r| r.key().clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn save_load_roundtrip() {
        let store = MemoryStore::new();
        let record = CheckpointRecord::new("inst-1", "validate", json!({ "n": 3 }));
        store.save(record.clone()).await.unwrap();

        let loaded = store.load("inst-1").await.unwrap();
        assert_eq!(loaded.step_name, "validate");
        assert_eq!(loaded.state_blob, json!({ "n": 3 }));
    }

    #[tokio::test]
    async fn load_unknown_id_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.load("ghost").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn identical_save_keeps_original_timestamp() {
        let store = MemoryStore::new();
        let first = CheckpointRecord::new("inst-1", "process", json!({ "n": 1 }));
        let written_at = first.written_at;
        store.save(first.clone()).await.unwrap();

        // Same payload, later timestamp: observably a no-op.
        let mut second = first.clone();
        second.written_at = written_at + chrono::Duration::seconds(30);
        store.save(second).await.unwrap();

        assert_eq!(store.load("inst-1").await.unwrap().written_at, written_at);
    }

    #[tokio::test]
    async fn concurrent_saves_to_distinct_ids() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..32 {
            let store = store.clone();
            tasks.spawn(async move {
                let id = format!("inst-{i}");
                store
                    .save(CheckpointRecord::new(&id, "init", json!({ "i": i })))
                    .await
                    .unwrap();
            });
        }
        while tasks.join_next().await.is_some() {}

        assert_eq!(store.list().await.unwrap().len(), 32);
    }
}
