use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::Task;

/// Something a turn produced: a file, a patch, a note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    #[serde(default)]
    pub summary: String,
}

impl Artifact {
    pub fn new(name: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            summary: summary.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnReport {
    /// The agent considers the task done.
    pub finished: bool,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
}

impl TurnReport {
    pub fn progress(artifacts: Vec<Artifact>) -> Self {
        Self {
            finished: false,
            artifacts,
        }
    }

    pub fn finished(artifacts: Vec<Artifact>) -> Self {
        Self {
            finished: true,
            artifacts,
        }
    }
}

/// External agent performing one unit of work per call.
///
/// Errors use `WorkError::AgentTurn`; `transient` failures consume the turn,
/// anything else ends the execution.
#[async_trait]
pub trait TurnAgent: Send + Sync {
    async fn run_turn(&self, task: &Task, turn: u32, budget: u32) -> Result<TurnReport>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub satisfied: bool,
    #[serde(default)]
    pub reason: String,
}

impl Assessment {
    pub fn satisfied(reason: impl Into<String>) -> Self {
        Self {
            satisfied: true,
            reason: reason.into(),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            satisfied: false,
            reason: reason.into(),
        }
    }
}

/// Judges whether artifacts already satisfy the task once a budget runs out.
#[async_trait]
pub trait DeliverableAssessor: Send + Sync {
    async fn assess(&self, task: &Task, artifacts: &[Artifact]) -> Result<Assessment>;
}
