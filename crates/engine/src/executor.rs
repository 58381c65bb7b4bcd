//! Workflow execution engine.
//!
//! `Executor` is the central orchestrator:
//! 1. Validates the step graph before touching an instance.
//! 2. Walks the active frontier one step at a time (execution within an
//!    instance is strictly single-threaded).
//! 3. Dispatches each step through the retry policy.
//! 4. Persists a checkpoint after every completed step and *before* the next
//!    one begins, which is what makes crash replay safe.
//! 5. Turns router decisions into the next frontier, bounding revision loops.
//! 6. Suspends at declared pause points instead of blocking on input.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{error, info, instrument, warn};

use steps::StepError;
use store::{CheckpointRecord, CheckpointStore, StoreError};

use crate::graph::{PauseSpec, StepGraph, StepKind};
use crate::interrupt::InterruptController;
use crate::models::{
    InstanceStatus, KickoffInputs, RunReport, StateSnapshot, WorkflowInstance,
};
use crate::retry::RetryPolicy;
use crate::{EngineError, TimeoutClass};

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Cooperative cancellation handle. Checked between steps only — the
/// currently executing step always finishes naturally, so no partial state
/// mutation ever goes unrecorded.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Drives workflow instances against a checkpoint store.
///
/// One executor serves any number of instances; within a single instance it
/// issues at most one store write at a time, which is what lets the store
/// skip same-id write locking.
pub struct Executor {
    store: Arc<dyn CheckpointStore>,
    interrupts: Arc<InterruptController>,
    retry: RetryPolicy,
}

impl Executor {
    pub fn new(
        store: Arc<dyn CheckpointStore>,
        interrupts: Arc<InterruptController>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            interrupts,
            retry,
        }
    }

    /// The controller external channels submit interrupt responses through.
    pub fn interrupts(&self) -> Arc<InterruptController> {
        Arc::clone(&self.interrupts)
    }

    /// External entrypoint: an instance id in `inputs` makes this a resume
    /// request; absence creates a new instance.
    pub async fn kickoff(
        &self,
        graph: &StepGraph,
        inputs: KickoffInputs,
    ) -> Result<RunReport, EngineError> {
        match inputs.instance_id {
            Some(id) => self.resume(graph, &id).await,
            None => self.start(graph, inputs.state).await,
        }
    }

    /// Create a new instance at the entry frontier, persist the initial
    /// checkpoint, then run until a terminal status or suspension.
    pub async fn start(
        &self,
        graph: &StepGraph,
        initial_state: Value,
    ) -> Result<RunReport, EngineError> {
        self.start_with_cancel(graph, initial_state, &CancelFlag::new())
            .await
    }

    #[instrument(skip_all, fields(workflow = graph.name()))]
    pub async fn start_with_cancel(
        &self,
        graph: &StepGraph,
        initial_state: Value,
        cancel: &CancelFlag,
    ) -> Result<RunReport, EngineError> {
        graph.validate()?;

        let mut instance = WorkflowInstance::new(
            graph.name(),
            graph.entry_steps(),
            StateSnapshot::new(initial_state),
        );
        info!(instance_id = %instance.instance_id, "starting workflow instance");

        self.persist(&mut instance).await?;
        self.drive(graph, instance, cancel).await
    }

    /// Load the latest checkpoint and continue from its frontier.
    pub async fn resume(
        &self,
        graph: &StepGraph,
        instance_id: &str,
    ) -> Result<RunReport, EngineError> {
        self.resume_with_cancel(graph, instance_id, &CancelFlag::new())
            .await
    }

    #[instrument(skip_all, fields(workflow = graph.name(), instance_id = %instance_id))]
    pub async fn resume_with_cancel(
        &self,
        graph: &StepGraph,
        instance_id: &str,
        cancel: &CancelFlag,
    ) -> Result<RunReport, EngineError> {
        graph.validate()?;

        let record = self.load(instance_id).await?;
        let mut instance = WorkflowInstance::from_checkpoint(&record)?;

        match instance.status {
            status @ (InstanceStatus::Completed
            | InstanceStatus::Failed
            | InstanceStatus::Cancelled) => {
                // Inspectable, not advanceable.
                info!(instance_id, %status, "resume on terminal instance");
                return Ok(report(&instance));
            }
            InstanceStatus::Suspended => {
                let answered = self.interrupts.has_response(instance_id);
                if !answered && !pause_timed_out(graph, &instance) {
                    return Err(EngineError::NotFound(format!(
                        "instance '{instance_id}' is suspended awaiting an interrupt response"
                    )));
                }
                instance.status = InstanceStatus::Running;
            }
            InstanceStatus::Running => {}
        }

        info!(instance_id, last_step = %instance.current_step, "resuming from checkpoint");
        self.drive(graph, instance, cancel).await
    }

    /// Read-only view of the latest checkpoint.
    pub async fn status(&self, instance_id: &str) -> Result<WorkflowInstance, EngineError> {
        let record = self.load(instance_id).await?;
        WorkflowInstance::from_checkpoint(&record)
    }

    // -----------------------------------------------------------------------
    // Internal: the per-instance run loop.
    // -----------------------------------------------------------------------

    async fn drive(
        &self,
        graph: &StepGraph,
        mut instance: WorkflowInstance,
        cancel: &CancelFlag,
    ) -> Result<RunReport, EngineError> {
        let mut frontier: VecDeque<String> = instance.frontier.drain(..).collect();
        let mut completed: Vec<String> = std::mem::take(&mut instance.completed);

        while let Some(step_name) = frontier.pop_front() {
            if cancel.is_cancelled() {
                frontier.push_front(step_name);
                info!(instance_id = %instance.instance_id, "cancellation requested, stopping before next step");
                instance.status = InstanceStatus::Cancelled;
                sync(&mut instance, &frontier, &completed);
                self.persist(&mut instance).await?;
                return Ok(report(&instance));
            }

            let Some(record) = graph.step(&step_name) else {
                frontier.push_front(step_name.clone());
                return self
                    .fail_instance(
                        instance,
                        frontier,
                        completed,
                        EngineError::UnknownStep(step_name),
                    )
                    .await;
            };

            match &record.kind {
                StepKind::Action { handler } => {
                    let outcome = self
                        .retry
                        .run(
                            &instance.instance_id,
                            &step_name,
                            handler.as_ref(),
                            &instance.state.data,
                            None,
                        )
                        .await;

                    match outcome {
                        Ok(output) => {
                            instance.state.data = output;
                            complete_step(graph, &mut instance, &mut frontier, &mut completed, &step_name);
                            sync(&mut instance, &frontier, &completed);
                            self.persist(&mut instance).await?;
                        }
                        Err(err) => {
                            frontier.push_front(step_name);
                            return self.fail_instance(instance, frontier, completed, err).await;
                        }
                    }
                }

                StepKind::Router { decide } => {
                    let decision = match (decide.as_ref())(&instance.state) {
                        Ok(decision) => decision,
                        Err(StepError::Fatal(message) | StepError::Retryable(message)) => {
                            // Routers are pure; a failing decision is a
                            // definition bug, not a transient fault.
                            frontier.push_front(step_name.clone());
                            return self
                                .fail_instance(
                                    instance,
                                    frontier,
                                    completed,
                                    EngineError::FatalStep {
                                        step: step_name,
                                        message,
                                    },
                                )
                                .await;
                        }
                    };

                    let mut labels = decision.into_labels();
                    if let Some(unknown) = labels
                        .iter()
                        .find(|label| graph.step(label.as_str()).is_none())
                    {
                        let err = EngineError::UnknownStep(unknown.clone());
                        frontier.push_front(step_name);
                        return self.fail_instance(instance, frontier, completed, err).await;
                    }

                    // The router itself completes before revision
                    // invalidation so a loop that spans it re-runs it too.
                    if !completed.iter().any(|s| s == &step_name) {
                        completed.push(step_name.clone());
                    }
                    instance.history.push(step_name.clone());
                    instance.current_step = step_name.clone();

                    let revisits: Vec<String> = labels
                        .iter()
                        .filter(|label| instance.history.iter().any(|h| &h == label))
                        .cloned()
                        .collect();

                    if !revisits.is_empty() {
                        if instance.revision_count >= graph.max_revisions() {
                            let fallback = graph
                                .fallback()
                                .expect("validated: routers require a fallback")
                                .to_string();
                            warn!(
                                instance_id = %instance.instance_id,
                                step = %step_name,
                                revision_count = instance.revision_count,
                                %fallback,
                                "revision bound reached, overriding router decision"
                            );
                            labels = vec![fallback];
                        } else {
                            instance.revision_count += 1;
                            info!(
                                instance_id = %instance.instance_id,
                                step = %step_name,
                                revision_count = instance.revision_count,
                                "router re-entered visited step, starting revision pass"
                            );
                            for label in &revisits {
                                let invalidated = graph.descendants(label);
                                completed
                                    .retain(|c| c != label && !invalidated.contains(c));
                            }
                        }
                    }

                    // Dynamic transition: the frontier becomes exactly the
                    // routed labels.
                    frontier.clear();
                    frontier.extend(labels);
                    sync(&mut instance, &frontier, &completed);
                    self.persist(&mut instance).await?;
                }

                StepKind::Pause { spec, handler } => {
                    match self.interrupts.take_response(&instance.instance_id) {
                        Some(response) => {
                            instance.paused_at = None;
                            let outcome = self
                                .retry
                                .run(
                                    &instance.instance_id,
                                    &step_name,
                                    handler.as_ref(),
                                    &instance.state.data,
                                    Some(response),
                                )
                                .await;

                            match outcome {
                                Ok(output) => {
                                    instance.state.data = output;
                                    complete_step(
                                        graph,
                                        &mut instance,
                                        &mut frontier,
                                        &mut completed,
                                        &step_name,
                                    );
                                    sync(&mut instance, &frontier, &completed);
                                    self.persist(&mut instance).await?;
                                }
                                Err(err) => {
                                    frontier.push_front(step_name);
                                    return self
                                        .fail_instance(instance, frontier, completed, err)
                                        .await;
                                }
                            }
                        }
                        None => {
                            if deadline_passed(spec, instance.paused_at) {
                                let message =
                                    "pause timed out without a response".to_string();
                                let err = match spec.on_timeout {
                                    TimeoutClass::Fatal => EngineError::FatalStep {
                                        step: step_name.clone(),
                                        message,
                                    },
                                    TimeoutClass::Retryable => EngineError::RetryExhausted {
                                        step: step_name.clone(),
                                        attempts: 1,
                                        message,
                                    },
                                };
                                frontier.push_front(step_name);
                                return self
                                    .fail_instance(instance, frontier, completed, err)
                                    .await;
                            }

                            if instance.paused_at.is_none() {
                                instance.paused_at = Some(Utc::now());
                            }
                            self.interrupts.declare_pause(
                                &instance.instance_id,
                                &step_name,
                                &spec.prompt,
                            );

                            info!(
                                instance_id = %instance.instance_id,
                                step = %step_name,
                                "suspending for external input"
                            );
                            frontier.push_front(step_name);
                            instance.status = InstanceStatus::Suspended;
                            sync(&mut instance, &frontier, &completed);
                            self.persist(&mut instance).await?;
                            return Ok(report(&instance));
                        }
                    }
                }
            }
        }

        // Frontier drained: the last completed step had no runnable
        // successors.
        instance.status = InstanceStatus::Completed;
        sync(&mut instance, &frontier, &completed);
        self.persist(&mut instance).await?;
        info!(
            instance_id = %instance.instance_id,
            final_step = %instance.current_step,
            "workflow instance completed"
        );
        Ok(report(&instance))
    }

    async fn fail_instance(
        &self,
        mut instance: WorkflowInstance,
        frontier: VecDeque<String>,
        completed: Vec<String>,
        err: EngineError,
    ) -> Result<RunReport, EngineError> {
        error!(instance_id = %instance.instance_id, %err, "workflow instance failed");
        instance.status = InstanceStatus::Failed;
        instance.error = Some(err.to_string());
        sync(&mut instance, &frontier, &completed);
        // The failure status must reach the store before control returns.
        self.persist(&mut instance).await?;
        Ok(report(&instance))
    }

    async fn persist(&self, instance: &mut WorkflowInstance) -> Result<(), EngineError> {
        instance.updated_at = Utc::now();
        let record = instance.to_checkpoint()?;
        // A failed save aborts the transition; the previous checkpoint
        // remains the recovery point.
        self.store.save(record).await?;
        Ok(())
    }

    async fn load(&self, instance_id: &str) -> Result<CheckpointRecord, EngineError> {
        match self.store.load(instance_id).await {
            Ok(record) => Ok(record),
            Err(StoreError::NotFound(id)) => Err(EngineError::NotFound(id)),
            Err(err) => Err(err.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Loop helpers
// ---------------------------------------------------------------------------

fn report(instance: &WorkflowInstance) -> RunReport {
    RunReport {
        instance_id: instance.instance_id.clone(),
        status: instance.status,
        error: instance.error.clone(),
    }
}

fn sync(instance: &mut WorkflowInstance, frontier: &VecDeque<String>, completed: &[String]) {
    instance.frontier = frontier.iter().cloned().collect();
    instance.completed = completed.to_vec();
}

/// Record a completed step and queue every statically-ready successor.
/// AND-join: a successor becomes ready only once *all* of its declared
/// predecessors are in the completed set.
fn complete_step(
    graph: &StepGraph,
    instance: &mut WorkflowInstance,
    frontier: &mut VecDeque<String>,
    completed: &mut Vec<String>,
    step_name: &str,
) {
    if !completed.iter().any(|s| s == step_name) {
        completed.push(step_name.to_string());
    }
    instance.history.push(step_name.to_string());
    instance.current_step = step_name.to_string();

    for succ in graph.successors(step_name) {
        if completed.iter().any(|s| s == &succ.name) || frontier.contains(&succ.name) {
            continue;
        }
        if succ
            .predecessors
            .iter()
            .all(|p| completed.iter().any(|c| c == p))
        {
            frontier.push_back(succ.name.clone());
        }
    }
}

fn deadline_passed(spec: &PauseSpec, paused_at: Option<DateTime<Utc>>) -> bool {
    match (spec.timeout, paused_at) {
        (Some(after), Some(at)) => match chrono::Duration::from_std(after) {
            Ok(after) => Utc::now() - at >= after,
            // A timeout too large to represent never fires.
            Err(_) => false,
        },
        _ => false,
    }
}

/// Whether a suspended instance's open pause has outlived its declared
/// timeout (making it resumable into the failure path).
fn pause_timed_out(graph: &StepGraph, instance: &WorkflowInstance) -> bool {
    let Some(step_name) = instance.frontier.first() else {
        return false;
    };
    let Some(record) = graph.step(step_name) else {
        return false;
    };
    let StepKind::Pause { spec, .. } = &record.kind else {
        return false;
    };
    deadline_passed(spec, instance.paused_at)
}
