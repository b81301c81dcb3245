//! Command validation and execution against the entity store.
//!
//! - `CommandValidator`: checks an interpreted command against hierarchy
//!   invariants and resolves its target
//! - `CommandExecutor`: applies a `ValidatedCommand` under a project lock
//! - `BulkCommandExecutor`: expands ALL targets, cascading child-first
//! - `ExecutionResult`: the uniform result envelope

mod boundary;
mod bulk;
mod executor;
mod graph;
mod result;
mod validator;

pub use boundary::{LockScope, ProjectLocks};
pub use bulk::BulkCommandExecutor;
pub use executor::CommandExecutor;
pub use result::{BulkOutcome, EntityRef, ExecutionResult, FailedItem};
pub use validator::{CommandTarget, CommandValidator, ValidatedCommand, ValidationError};
