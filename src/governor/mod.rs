//! Turn-governed task execution.
//!
//! - `TurnLedger`: immutable state machine snapshot with pure transitions
//! - `TurnBudgetPolicy`: budget from task size and kind, optionally rescaled
//! - `TurnGovernor`: runs agent turns, assesses, retries with a larger budget
//! - `SignalHandler`: cancellation observed between turns

mod agent;
mod budget;
mod engine;
mod signal;
mod state;

pub use agent::{Artifact, Assessment, DeliverableAssessor, TurnAgent, TurnReport};
pub use budget::{
    BudgetDecision, ComplexityEstimator, GenerativeEstimator, TaskKind, TaskProfile, TaskSize,
    TurnBudgetPolicy,
};
pub use engine::{GovernorOutcome, TurnGovernor};
pub use signal::SignalHandler;
pub use state::{StateTransition, TurnEvent, TurnLedger, TurnState};
