//! `store` crate — pure persistence layer.
//!
//! Provides the [`CheckpointStore`] trait, the checkpoint record type, and
//! two backends: an in-memory map for tests and ephemeral runs, and an
//! atomic-replace file store for durable runs. No business logic lives here.

pub mod error;
pub mod file;
pub mod memory;
pub mod models;

use async_trait::async_trait;

pub use error::StoreError;
pub use file::FileStore;
pub use memory::MemoryStore;
pub use models::CheckpointRecord;

/// Durable keyed storage for the latest checkpoint of each instance.
///
/// Implementations must make `save` atomic per instance id — a crash
/// mid-write never leaves a torn record — and must tolerate concurrent
/// access keyed by distinct ids without cross-instance locking. Writes to
/// the same id are serialized by the executor, never by the store.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist `record` as the latest checkpoint for its instance id
    /// (last-write-wins). Saving an identical checkpoint twice is
    /// observably a no-op.
    async fn save(&self, record: CheckpointRecord) -> Result<(), StoreError>;

    /// Load the latest checkpoint for `instance_id`.
    ///
    /// # Errors
    /// [`StoreError::NotFound`] if no checkpoint exists.
    async fn load(&self, instance_id: &str) -> Result<CheckpointRecord, StoreError>;

    /// Remove an instance's checkpoint. This is the garbage-collection
    /// surface — the executor never deletes.
    async fn delete(&self, instance_id: &str) -> Result<(), StoreError>;

    /// All instance ids with a stored checkpoint.
    async fn list(&self) -> Result<Vec<String>, StoreError>;
}
