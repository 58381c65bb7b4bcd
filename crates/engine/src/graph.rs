//! The step graph — registry, validation, and static wiring.
//!
//! Rules enforced at build time:
//! 1. Step names are unique.
//! 2. Every declared predecessor references an already-registered step.
//! 3. The static predecessor graph is acyclic (topological sort succeeds)
//!    and has at least one entry step.
//! 4. A graph with routers declares a fallback terminal step for the
//!    revision-bound override.
//!
//! Dynamic edges (router results) are not part of these checks; they are
//! resolved label-by-label at execution time.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use steps::{StepAction, StepError};

use crate::models::{NextStep, StateSnapshot};
use crate::EngineError;

/// Router decision function. Must be pure: no side effects, deterministic
/// for byte-identical state, so replay after a crash before the checkpoint
/// write reproduces the same decision.
pub type RouterFn = dyn Fn(&StateSnapshot) -> Result<NextStep, StepError> + Send + Sync;

/// How an unanswered pause that outlives its timeout is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutClass {
    Retryable,
    Fatal,
}

/// Declaration of a human-input pause point.
#[derive(Clone)]
pub struct PauseSpec {
    /// Shown to whoever answers the interrupt.
    pub prompt: String,
    /// Optional wall-clock bound; `None` suspends indefinitely.
    pub timeout: Option<Duration>,
    pub on_timeout: TimeoutClass,
}

impl PauseSpec {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            timeout: None,
            on_timeout: TimeoutClass::Fatal,
        }
    }

    pub fn with_timeout(mut self, after: Duration, on_timeout: TimeoutClass) -> Self {
        self.timeout = Some(after);
        self.on_timeout = on_timeout;
        self
    }
}

/// What a registered step does when scheduled.
pub enum StepKind {
    /// Mutates state through a handler, subject to the retry policy.
    Action { handler: Arc<dyn StepAction> },
    /// Selects the next label(s) from state; never mutates state.
    Router { decide: Arc<RouterFn> },
    /// Suspends until an interrupt response arrives, then runs its handler
    /// with the consumed response in context.
    Pause {
        spec: PauseSpec,
        handler: Arc<dyn StepAction>,
    },
}

/// A single registered step.
pub struct StepRecord {
    pub name: String,
    pub predecessors: Vec<String>,
    pub kind: StepKind,
}

/// A complete workflow definition: named steps, static wiring, and the
/// revision-loop configuration.
pub struct StepGraph {
    name: String,
    steps: Vec<StepRecord>,
    index: HashMap<String, usize>,
    max_revisions: u32,
    fallback: Option<String>,
}

impl StepGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            index: HashMap::new(),
            max_revisions: 3,
            fallback: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_revisions(&self) -> u32 {
        self.max_revisions
    }

    pub fn fallback(&self) -> Option<&str> {
        self.fallback.as_deref()
    }

    /// Bound on router-induced revision loops before the fallback override.
    pub fn set_max_revisions(&mut self, max_revisions: u32) -> &mut Self {
        self.max_revisions = max_revisions;
        self
    }

    /// Terminal step the executor forces once the revision bound is hit.
    pub fn set_fallback(&mut self, step: impl Into<String>) -> &mut Self {
        self.fallback = Some(step.into());
        self
    }

    fn insert(&mut self, record: StepRecord) -> Result<(), EngineError> {
        if self.index.contains_key(&record.name) {
            return Err(EngineError::DuplicateStep(record.name));
        }
        for pred in &record.predecessors {
            if !self.index.contains_key(pred) {
                return Err(EngineError::UnknownPredecessor {
                    step: record.name.clone(),
                    predecessor: pred.clone(),
                });
            }
        }
        self.index.insert(record.name.clone(), self.steps.len());
        self.steps.push(record);
        Ok(())
    }

    /// Register an action step.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        predecessors: &[&str],
        handler: Arc<dyn StepAction>,
    ) -> Result<(), EngineError> {
        self.insert(StepRecord {
            name: name.into(),
            predecessors: predecessors.iter().map(|s| s.to_string()).collect(),
            kind: StepKind::Action { handler },
        })
    }

    /// Register a router step. `decide` must be pure.
    pub fn register_router<F>(
        &mut self,
        name: impl Into<String>,
        predecessors: &[&str],
        decide: F,
    ) -> Result<(), EngineError>
    where
        F: Fn(&StateSnapshot) -> Result<NextStep, StepError> + Send + Sync + 'static,
    {
        self.insert(StepRecord {
            name: name.into(),
            predecessors: predecessors.iter().map(|s| s.to_string()).collect(),
            kind: StepKind::Router {
                decide: Arc::new(decide),
            },
        })
    }

    /// Register a declared pause point.
    pub fn register_pause(
        &mut self,
        name: impl Into<String>,
        predecessors: &[&str],
        spec: PauseSpec,
        handler: Arc<dyn StepAction>,
    ) -> Result<(), EngineError> {
        self.insert(StepRecord {
            name: name.into(),
            predecessors: predecessors.iter().map(|s| s.to_string()).collect(),
            kind: StepKind::Pause { spec, handler },
        })
    }

    pub fn step(&self, name: &str) -> Option<&StepRecord> {
        self.index.get(name).map(|&i| &self.steps[i])
    }

    /// All zero-predecessor steps, in registration order. These form the
    /// initial frontier.
    pub fn entry_steps(&self) -> Vec<String> {
        self.steps
            .iter()
            .filter(|s| s.predecessors.is_empty())
            .map(|s| s.name.clone())
            .collect()
    }

    /// Steps that statically declare `name` as a predecessor, in
    /// registration order (keeps scheduling deterministic for replay).
    pub fn successors(&self, name: &str) -> Vec<&StepRecord> {
        self.steps
            .iter()
            .filter(|s| s.predecessors.iter().any(|p| p == name))
            .collect()
    }

    /// Every step statically reachable from `name` (exclusive). Revision
    /// re-entry clears these from the completed set so the loop re-runs
    /// them.
    pub fn descendants(&self, name: &str) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(name);
        while let Some(current) = queue.pop_front() {
            for succ in self.successors(current) {
                if seen.insert(succ.name.clone()) {
                    queue.push_back(&succ.name);
                }
            }
        }
        seen
    }

    fn has_router(&self) -> bool {
        self.steps
            .iter()
            .any(|s| matches!(s.kind, StepKind::Router { .. }))
    }

    /// Validate the static graph and return steps in topological execution
    /// order.
    ///
    /// # Errors
    /// - [`EngineError::NoEntryStep`] if every step has predecessors.
    /// - [`EngineError::CycleDetected`] if the static graph is not acyclic.
    /// - [`EngineError::UnknownStep`] if the declared fallback is unknown.
    /// - [`EngineError::MissingFallback`] if a router exists without one.
    pub fn validate(&self) -> Result<Vec<String>, EngineError> {
        if self.steps.is_empty() || self.entry_steps().is_empty() {
            return Err(EngineError::NoEntryStep);
        }

        if let Some(fallback) = &self.fallback {
            if !self.index.contains_key(fallback) {
                return Err(EngineError::UnknownStep(fallback.clone()));
            }
        }
        if self.has_router() && self.fallback.is_none() {
            return Err(EngineError::MissingFallback(self.name.clone()));
        }

        // Kahn's algorithm over the static predecessor edges.
        let mut in_degree: HashMap<&str, usize> = self
            .steps
            .iter()
            .map(|s| (s.name.as_str(), s.predecessors.len()))
            .collect();

        let mut queue: VecDeque<&str> = self
            .steps
            .iter()
            .filter(|s| s.predecessors.is_empty())
            .map(|s| s.name.as_str())
            .collect();

        let mut sorted: Vec<String> = Vec::with_capacity(self.steps.len());

        while let Some(step_name) = queue.pop_front() {
            sorted.push(step_name.to_owned());

            for succ in self.successors(step_name) {
                if let Some(deg) = in_degree.get_mut(succ.name.as_str()) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(&succ.name);
                    }
                }
            }
        }

        // If we didn't visit every step the static graph contains a cycle.
        if sorted.len() != self.steps.len() {
            return Err(EngineError::CycleDetected);
        }

        Ok(sorted)
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use steps::FnStep;

    fn noop() -> Arc<dyn StepAction> {
        Arc::new(FnStep::new(|state, _ctx| Ok(state)))
    }

    fn linear_graph(names: &[&str]) -> StepGraph {
        let mut graph = StepGraph::new("test-linear");
        for (i, name) in names.iter().enumerate() {
            let preds: Vec<&str> = if i == 0 { vec![] } else { vec![names[i - 1]] };
            graph.register(*name, &preds, noop()).expect("register");
        }
        graph
    }

    #[test]
    fn valid_linear_graph_returns_sorted_order() {
        let graph = linear_graph(&["a", "b", "c"]);
        let sorted = graph.validate().expect("should be valid");
        assert_eq!(sorted, vec!["a", "b", "c"]);
    }

    #[test]
    fn valid_diamond_graph() {
        //   a
        //  / \
        // b   c
        //  \ /
        //   d
        let mut graph = StepGraph::new("diamond");
        graph.register("a", &[], noop()).unwrap();
        graph.register("b", &["a"], noop()).unwrap();
        graph.register("c", &["a"], noop()).unwrap();
        graph.register("d", &["b", "c"], noop()).unwrap();

        let sorted = graph.validate().expect("should be valid");
        assert_eq!(sorted.first().unwrap(), "a");
        assert_eq!(sorted.last().unwrap(), "d");
        assert_eq!(sorted.len(), 4);
    }

    #[test]
    fn duplicate_step_name_is_rejected() {
        let mut graph = StepGraph::new("dup");
        graph.register("a", &[], noop()).unwrap();
        assert!(matches!(
            graph.register("a", &[], noop()),
            Err(EngineError::DuplicateStep(name)) if name == "a"
        ));
    }

    #[test]
    fn unknown_predecessor_is_rejected_at_registration() {
        let mut graph = StepGraph::new("bad");
        assert!(matches!(
            graph.register("a", &["ghost"], noop()),
            Err(EngineError::UnknownPredecessor { predecessor, .. }) if predecessor == "ghost"
        ));
    }

    #[test]
    fn graph_without_entry_step_is_rejected() {
        let graph = StepGraph::new("empty");
        assert!(matches!(graph.validate(), Err(EngineError::NoEntryStep)));
    }

    #[test]
    fn router_without_fallback_is_rejected() {
        let mut graph = linear_graph(&["work"]);
        graph
            .register_router("check", &["work"], |_state| Ok(NextStep::single("work")))
            .unwrap();
        assert!(matches!(
            graph.validate(),
            Err(EngineError::MissingFallback(_))
        ));
    }

    #[test]
    fn unknown_fallback_is_rejected() {
        let mut graph = linear_graph(&["work"]);
        graph
            .register_router("check", &["work"], |_state| Ok(NextStep::single("work")))
            .unwrap();
        graph.set_fallback("ghost");
        assert!(matches!(
            graph.validate(),
            Err(EngineError::UnknownStep(name)) if name == "ghost"
        ));
    }

    #[test]
    fn descendants_follow_static_edges_only() {
        let mut graph = linear_graph(&["a", "b", "c"]);
        graph.register("side", &["a"], noop()).unwrap();

        let descendants = graph.descendants("b");
        assert!(descendants.contains("c"));
        assert!(!descendants.contains("a"));
        assert!(!descendants.contains("side"));
    }

    #[test]
    fn router_purity_same_state_same_labels() {
        let decide = |state: &StateSnapshot| -> Result<NextStep, StepError> {
            if state.data["status"] == "approved" {
                Ok(NextStep::single("finalize"))
            } else {
                Ok(NextStep::single("revise"))
            }
        };

        let state = StateSnapshot::new(json!({ "status": "approved" }));
        let first = decide(&state).unwrap();
        let second = decide(&state).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, NextStep::single("finalize"));
    }
}
