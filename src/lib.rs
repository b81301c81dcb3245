pub mod capability;
pub mod cli;
pub mod command;
pub mod config;
pub mod error;
pub mod governor;
pub mod model;
pub mod nlp;
pub mod orchestrator;

pub use capability::{CapabilityHandle, TextGenerator};
pub use command::{CommandExecutor, CommandValidator, ExecutionResult, ValidationError};
pub use config::WorkConfig;
pub use error::{GenerationError, Result, WorkError};
pub use governor::{TurnGovernor, TurnState};
pub use model::{EntityStore, MemoryStore};
pub use nlp::{InterpretationPipeline, OperationContext, SessionContext};
pub use orchestrator::{Orchestrator, PipelineResponse};
