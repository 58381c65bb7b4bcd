//! `engine` crate — core domain models, the step graph, and the durable
//! execution engine.

pub mod error;
pub mod executor;
pub mod graph;
pub mod interrupt;
pub mod models;
pub mod retry;
pub mod runner;

pub use error::EngineError;
pub use executor::{CancelFlag, Executor};
pub use graph::{PauseSpec, StepGraph, TimeoutClass};
pub use interrupt::{InterruptController, InterruptRequest};
pub use models::{
    InstanceStatus, KickoffInputs, NextStep, RunReport, StateSnapshot, WorkflowInstance,
};
pub use retry::RetryPolicy;
pub use runner::{FailurePolicy, ParallelRunner, RunOutcome, RunRequest};
