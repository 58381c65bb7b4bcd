//! Core domain models for the workflow engine.
//!
//! These types are the source of truth for what a workflow instance looks
//! like in memory. The instance serialises into the `state_blob` column of a
//! checkpoint record and back out on resume.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use store::CheckpointRecord;

use crate::EngineError;

/// Bumped whenever the snapshot layout changes shape.
pub const STATE_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// StateSnapshot
// ---------------------------------------------------------------------------

/// An immutable, versioned value representing workflow state at a point in
/// time. Handed to the store only as a deep copy — never mutated in place
/// afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub schema_version: u32,
    pub data: Value,
}

impl StateSnapshot {
    pub fn new(data: Value) -> Self {
        Self {
            schema_version: STATE_SCHEMA_VERSION,
            data,
        }
    }
}

impl Default for StateSnapshot {
    /// A fresh, independently-owned empty object on every call — two
    /// instances never share a container.
    fn default() -> Self {
        Self::new(Value::Object(serde_json::Map::new()))
    }
}

// ---------------------------------------------------------------------------
// InstanceStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a workflow instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Running,
    Suspended,
    Completed,
    Failed,
    Cancelled,
}

impl InstanceStatus {
    /// Terminal statuses block forward progress; the last checkpoint stays
    /// queryable.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Suspended => write!(f, "suspended"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

// ---------------------------------------------------------------------------
// NextStep
// ---------------------------------------------------------------------------

/// Tagged result of a router decision: symbolic next-step label(s). All
/// dynamic transitions are label-based — there is no chaining by handler
/// identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextStep {
    Single(String),
    FanOut(Vec<String>),
}

impl NextStep {
    pub fn single(label: impl Into<String>) -> Self {
        Self::Single(label.into())
    }

    pub fn fan_out<I: IntoIterator<Item = S>, S: Into<String>>(labels: I) -> Self {
        Self::FanOut(labels.into_iter().map(Into::into).collect())
    }

    pub fn into_labels(self) -> Vec<String> {
        match self {
            Self::Single(label) => vec![label],
            Self::FanOut(labels) => labels,
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowInstance
// ---------------------------------------------------------------------------

/// One durable execution of a workflow definition.
///
/// Created when the executor first runs with no matching persisted id;
/// destroyed only by the store's garbage-collection surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub instance_id: String,
    /// Name of the definition this instance runs against.
    pub workflow: String,
    /// Last step that completed (empty until the first step finishes).
    pub current_step: String,
    pub status: InstanceStatus,
    pub state: StateSnapshot,
    /// Steps eligible to run next, in scheduling order.
    pub frontier: Vec<String>,
    /// Steps completed in the current pass (revision loops clear re-run
    /// steps out of this set, never out of `history`).
    pub completed: Vec<String>,
    /// Every step ever completed by this instance, re-runs included.
    pub history: Vec<String>,
    pub revision_count: u32,
    /// Message of the failure that ended the run, if any.
    pub error: Option<String>,
    /// Wall-clock anchor of the open pause, for timeout accounting.
    pub paused_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowInstance {
    pub fn new(workflow: impl Into<String>, frontier: Vec<String>, state: StateSnapshot) -> Self {
        let now = Utc::now();
        Self {
            instance_id: uuid::Uuid::new_v4().to_string(),
            workflow: workflow.into(),
            current_step: String::new(),
            status: InstanceStatus::Running,
            state,
            frontier,
            completed: Vec::new(),
            history: Vec::new(),
            revision_count: 0,
            error: None,
            paused_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Serialise into a checkpoint record. The blob is a deep copy; later
    /// mutation of `self` never reaches the store.
    pub fn to_checkpoint(&self) -> Result<CheckpointRecord, EngineError> {
        let blob = serde_json::to_value(self).map_err(store::StoreError::from)?;
        Ok(CheckpointRecord::new(
            self.instance_id.clone(),
            self.current_step.clone(),
            blob,
        ))
    }

    pub fn from_checkpoint(record: &CheckpointRecord) -> Result<Self, EngineError> {
        let instance: WorkflowInstance =
            serde_json::from_value(record.state_blob.clone()).map_err(store::StoreError::from)?;
        Ok(instance)
    }
}

// ---------------------------------------------------------------------------
// Run surface
// ---------------------------------------------------------------------------

/// What a `start`/`resume` call produced. Step failures land here as
/// `status = Failed` plus `error`; `Err` is reserved for infrastructure
/// faults (unknown instance, validation, persistence).
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub instance_id: String,
    pub status: InstanceStatus,
    pub error: Option<String>,
}

/// Inputs to the kickoff entrypoint. A present `instance_id` makes the call
/// a resume request; absence creates a new instance.
#[derive(Debug, Clone, Default)]
pub struct KickoffInputs {
    pub instance_id: Option<String>,
    pub state: Value,
}

impl KickoffInputs {
    pub fn fresh(state: Value) -> Self {
        Self {
            instance_id: None,
            state,
        }
    }

    pub fn resume(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: Some(instance_id.into()),
            state: Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_snapshots_do_not_share_a_container() {
        let mut a = StateSnapshot::default();
        let b = StateSnapshot::default();

        a.data["poisoned"] = json!(true);
        assert!(b.data.get("poisoned").is_none());
    }

    #[test]
    fn instance_roundtrips_through_checkpoint() {
        let mut instance = WorkflowInstance::new(
            "pipeline",
            vec!["init".into()],
            StateSnapshot::new(json!({ "records": 3 })),
        );
        instance.current_step = "validate".into();
        instance.completed = vec!["init".into(), "collect".into(), "validate".into()];
        instance.history = instance.completed.clone();

        let record = instance.to_checkpoint().unwrap();
        assert_eq!(record.step_name, "validate");

        let restored = WorkflowInstance::from_checkpoint(&record).unwrap();
        assert_eq!(restored.instance_id, instance.instance_id);
        assert_eq!(restored.state, instance.state);
        assert_eq!(restored.completed, instance.completed);
    }

    #[test]
    fn checkpoint_blob_is_a_deep_copy() {
        let mut instance = WorkflowInstance::new(
            "pipeline",
            vec!["init".into()],
            StateSnapshot::new(json!({ "n": 1 })),
        );
        let record = instance.to_checkpoint().unwrap();

        instance.state.data["n"] = json!(2);
        assert_eq!(record.state_blob["state"]["data"]["n"], 1);
    }
}
