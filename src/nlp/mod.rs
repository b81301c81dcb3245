//! Natural-language interpretation.
//!
//! - `FastPathMatcher`: deterministic shortcut for literal read commands
//! - `stages`: the classification cascade
//! - `structured`: JSON extraction from generated text
//! - `ConfidenceAggregator` / `ConfidenceGate`: overall score and threshold
//! - `InterpretationPipeline`: fast path → cascade → gate

mod aggregator;
mod context;
mod fast_path;
mod pipeline;
mod prompt;
pub mod stages;
mod structured;

pub use aggregator::{ConfidenceAggregator, ConfidenceGate, GateDecision, MinAggregator};
pub use context::{
    Confidence, EntityTypes, Identifier, Intent, Operation, OperationContext, SessionContext,
    StageName, StageScore,
};
pub use fast_path::{FAST_PATH_CONFIDENCE, FastPathMatcher};
pub use pipeline::{Clarification, Interpretation, InterpretationPipeline};
pub use prompt::{PromptBuilder, STOP_SEQUENCES};
pub use structured::{ParseError, parse_structured};
