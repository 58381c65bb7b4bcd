//! The interrupt controller — human-in-the-loop pause/resume as explicit
//! state.
//!
//! A pause step never blocks on console or network input. It records an
//! [`InterruptRequest`] here and the executor suspends; some external
//! channel (CLI, HTTP, a queue consumer) later calls [`submit_response`]
//! and resumes the instance. The response is consumed exactly once.
//!
//! [`submit_response`]: InterruptController::submit_response

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use steps::InterruptResponse;

/// An open question addressed to a human (or any external decider).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterruptRequest {
    pub instance_id: String,
    pub step_name: String,
    pub prompt: String,
    pub created_at: DateTime<Utc>,
}

/// In-memory request/response exchange keyed by instance id.
///
/// One pending request and at most one pending response per instance; the
/// executor guarantees a single pause point is open at a time.
#[derive(Default)]
pub struct InterruptController {
    requests: DashMap<String, InterruptRequest>,
    responses: DashMap<String, InterruptResponse>,
}

impl InterruptController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pause request. Re-declaring the same pause (a replayed
    /// resume) keeps the original `created_at` so timeout accounting is
    /// stable.
    pub fn declare_pause(
        &self,
        instance_id: impl Into<String>,
        step_name: impl Into<String>,
        prompt: impl Into<String>,
    ) -> InterruptRequest {
        let instance_id = instance_id.into();
        let step_name = step_name.into();

        if let Some(existing) = self.requests.get(&instance_id) {
            if existing.step_name == step_name {
                return existing.clone();
            }
        }

        let request = InterruptRequest {
            instance_id: instance_id.clone(),
            step_name,
            prompt: prompt.into(),
            created_at: Utc::now(),
        };
        info!(instance_id = %request.instance_id, step = %request.step_name, "pause declared");
        self.requests.insert(instance_id, request.clone());
        request
    }

    /// Store an answer, making the instance eligible for resume.
    pub fn submit_response(&self, response: InterruptResponse) {
        info!(instance_id = %response.instance_id, decision = ?response.decision, "interrupt response submitted");
        self.responses
            .insert(response.instance_id.clone(), response);
    }

    pub fn has_response(&self, instance_id: &str) -> bool {
        self.responses.contains_key(instance_id)
    }

    /// Consume the pending response (and its request). Exactly-once: a
    /// second call returns `None` until a new response is submitted.
    pub fn take_response(&self, instance_id: &str) -> Option<InterruptResponse> {
        let response = self.responses.remove(instance_id).map(|(_, r)| r)?;
        self.requests.remove(instance_id);
        Some(response)
    }

    pub fn pending_request(&self, instance_id: &str) -> Option<InterruptRequest> {
        self.requests.get(instance_id).map(|r| r.clone())
    }

    /// All open requests, for channel frontends that list work.
    pub fn pending(&self) -> Vec<InterruptRequest> {
        self.requests.iter().map(|r| r.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use steps::Decision;

    fn response(id: &str) -> InterruptResponse {
        InterruptResponse {
            instance_id: id.to_string(),
            decision: Decision::Approve,
            payload: "ship it".to_string(),
        }
    }

    #[test]
    fn response_is_consumed_exactly_once() {
        let controller = InterruptController::new();
        controller.declare_pause("inst-1", "review", "approve?");
        controller.submit_response(response("inst-1"));

        assert!(controller.has_response("inst-1"));
        assert!(controller.take_response("inst-1").is_some());
        assert!(controller.take_response("inst-1").is_none());
        assert!(controller.pending_request("inst-1").is_none());
    }

    #[test]
    fn redeclaring_the_same_pause_keeps_the_original_clock() {
        let controller = InterruptController::new();
        let first = controller.declare_pause("inst-1", "review", "approve?");
        let second = controller.declare_pause("inst-1", "review", "approve?");
        assert_eq!(first.created_at, second.created_at);
    }

    #[test]
    fn responses_are_keyed_by_instance() {
        let controller = InterruptController::new();
        controller.submit_response(response("inst-1"));

        assert!(!controller.has_response("inst-2"));
        assert!(controller.take_response("inst-2").is_none());
        assert!(controller.has_response("inst-1"));
    }
}
