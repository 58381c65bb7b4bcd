//! `steps` crate — the `StepAction` trait and the collaborators a step may
//! drive (tools, reasoning engines).
//!
//! Every step body — built-in, demo, and test double alike — implements
//! [`StepAction`]. The engine crate dispatches execution through this trait
//! object and never learns anything else about what a step does.

pub mod agent;
pub mod error;
pub mod mock;
pub mod tool;
pub mod traits;

pub use error::StepError;
pub use traits::{Decision, FnStep, InterruptResponse, StepAction, StepContext};
