//! Composition root.
//!
//! - `Orchestrator`: `process` for utterances, `execute_task` for governed
//!   task runs, runtime threshold and backend control
//! - `lifecycle`: mandatory and optional initializer lists

mod engine;
mod lifecycle;

pub use engine::{Orchestrator, PipelineResponse};
