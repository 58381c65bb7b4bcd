//! The checkpoint record — the only shape the store knows.
//!
//! This is a *persistence* model; it carries no domain behaviour. The engine
//! serializes its instance into `state_blob` and interprets it on the way
//! back out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Latest-checkpoint record for one workflow instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRecord {
    /// Primary key; resume is a lookup by this field only.
    pub instance_id: String,
    /// Step the instance last completed (or is suspended at).
    pub step_name: String,
    /// Serialized, versioned instance state.
    pub state_blob: serde_json::Value,
    /// When this record was written.
    pub written_at: DateTime<Utc>,
}

impl CheckpointRecord {
    pub fn new(
        instance_id: impl Into<String>,
        step_name: impl Into<String>,
        state_blob: serde_json::Value,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            step_name: step_name.into(),
            state_blob,
            written_at: Utc::now(),
        }
    }

    /// Whether `other` carries the same payload (timestamp excluded); used
    /// by backends to make repeated saves observably no-ops.
    pub fn same_payload(&self, other: &CheckpointRecord) -> bool {
        self.instance_id == other.instance_id
            && self.step_name == other.step_name
            && self.state_blob == other.state_blob
    }
}
