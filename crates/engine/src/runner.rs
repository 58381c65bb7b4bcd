//! Parallel runner — many isolated instances, bounded concurrency.
//!
//! Each instance owns its in-memory state exclusively and talks to the rest
//! of the system only through the checkpoint store, so the runner needs no
//! shared mutable memory beyond the abort flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::executor::Executor;
use crate::models::{InstanceStatus, KickoffInputs};
use crate::StepGraph;

/// What a batch failure does to the rest of the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// A failure in one instance never cancels or blocks the others.
    Independent,
    /// A failure cooperatively cancels not-yet-started instances only;
    /// in-flight steps run to completion.
    FailFast,
}

/// One unit of batch work: a definition plus its kickoff inputs.
pub struct RunRequest {
    pub graph: Arc<StepGraph>,
    pub inputs: KickoffInputs,
}

/// Terminal outcome of one batch entry, in request order.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// `None` when the entry was skipped (fail-fast) or never got an id
    /// (validation failure before instance creation).
    pub instance_id: Option<String>,
    pub status: InstanceStatus,
    pub error: Option<String>,
}

pub struct ParallelRunner {
    executor: Arc<Executor>,
    max_concurrency: usize,
    policy: FailurePolicy,
}

impl ParallelRunner {
    pub fn new(executor: Arc<Executor>, max_concurrency: usize, policy: FailurePolicy) -> Self {
        Self {
            executor,
            max_concurrency: max_concurrency.max(1),
            policy,
        }
    }

    /// Run every request with at most `max_concurrency` executors in flight.
    /// Outcomes come back in request order.
    pub async fn run_many(&self, requests: Vec<RunRequest>) -> Vec<RunOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let abort = Arc::new(AtomicBool::new(false));
        let mut tasks: JoinSet<(usize, RunOutcome)> = JoinSet::new();

        for (index, request) in requests.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let abort = Arc::clone(&abort);
            let executor = Arc::clone(&self.executor);
            let policy = self.policy;

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    // The semaphore is never closed; treat it as a skip.
                    return (index, skipped(request.inputs.instance_id));
                };

                if abort.load(Ordering::SeqCst) {
                    info!(index, "batch aborted before this instance started");
                    return (index, skipped(request.inputs.instance_id));
                }

                let requested_id = request.inputs.instance_id.clone();
                let outcome = match executor.kickoff(&request.graph, request.inputs).await {
                    Ok(run) => RunOutcome {
                        instance_id: Some(run.instance_id),
                        status: run.status,
                        error: run.error,
                    },
                    Err(err) => RunOutcome {
                        instance_id: requested_id,
                        status: InstanceStatus::Failed,
                        error: Some(err.to_string()),
                    },
                };

                if outcome.status == InstanceStatus::Failed && policy == FailurePolicy::FailFast {
                    warn!(index, "instance failed, aborting remaining batch entries");
                    abort.store(true, Ordering::SeqCst);
                }

                (index, outcome)
            });
        }

        let mut outcomes: Vec<Option<RunOutcome>> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => {
                    if outcomes.len() <= index {
                        outcomes.resize(index + 1, None);
                    }
                    outcomes[index] = Some(outcome);
                }
                Err(err) => warn!(%err, "batch task panicked"),
            }
        }

        outcomes
            .into_iter()
            .map(|outcome| outcome.unwrap_or_else(|| skipped(None)))
            .collect()
    }
}

fn skipped(instance_id: Option<String>) -> RunOutcome {
    RunOutcome {
        instance_id,
        status: InstanceStatus::Cancelled,
        error: None,
    }
}
