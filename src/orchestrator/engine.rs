use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::lifecycle::Wiring;
use crate::capability::{CapabilityHandle, CapabilityState, TextGenerator};
use crate::command::{
    CommandExecutor, CommandValidator, ExecutionResult, LockScope, ValidationError,
};
use crate::config::WorkConfig;
use crate::error::{Result, WorkError};
use crate::governor::{
    DeliverableAssessor, GovernorOutcome, SignalHandler, TurnAgent, TurnGovernor, TurnState,
};
use crate::model::{
    DeleteMode, Entity, EntityChanges, EntityId, EntityStore, EntityType, Status,
};
use crate::nlp::{
    Clarification, Confidence, Intent, Interpretation, InterpretationPipeline, SessionContext,
};

/// What `Orchestrator::process` hands back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineResponse {
    Executed(ExecutionResult),
    Clarification(Clarification),
    NotACommand {
        intent: Intent,
        confidence: Confidence,
    },
}

impl PipelineResponse {
    pub fn execution(&self) -> Option<&ExecutionResult> {
        match self {
            Self::Executed(result) => Some(result),
            _ => None,
        }
    }
}

/// Composition root: interpretation, validation, execution and governed
/// task runs over one shared store and one shared capability handle.
pub struct Orchestrator {
    config: WorkConfig,
    store: Arc<dyn EntityStore>,
    capability: Arc<CapabilityHandle>,
    pipeline: InterpretationPipeline,
    executor: CommandExecutor,
    governor: TurnGovernor,
}

impl Orchestrator {
    /// Never fails for lack of a backend; the capability then starts out
    /// unavailable and only fast-path commands succeed.
    pub fn new(config: WorkConfig, store: Arc<dyn EntityStore>) -> Result<Self> {
        config.validate()?;
        let components = Wiring::new(&config, Arc::clone(&store)).run()?;
        info!(
            capability = %components.capability.state(),
            backend = ?components.capability.backend_name(),
            threshold = %components.pipeline.threshold(),
            "Orchestrator ready"
        );
        Ok(Self {
            config,
            store,
            capability: components.capability,
            pipeline: components.pipeline,
            executor: components.executor,
            governor: components.governor,
        })
    }

    pub fn config(&self) -> &WorkConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    pub fn capability_state(&self) -> CapabilityState {
        self.capability.state()
    }

    pub fn capability(&self) -> &Arc<CapabilityHandle> {
        &self.capability
    }

    pub fn confidence_threshold(&self) -> Confidence {
        self.pipeline.threshold()
    }

    /// Takes effect for the next command; prompts are untouched.
    pub fn set_confidence_threshold(&self, threshold: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(WorkError::Config(format!(
                "confidence threshold {} is outside 0.0..=1.0",
                threshold
            )));
        }
        self.pipeline.set_threshold(threshold);
        Ok(())
    }

    /// Probe `backend`, then swap it in for every dependent at once. On a
    /// failed probe the previous backend stays active, unless a concurrent
    /// switch installed a newer one in the meantime.
    pub async fn switch_backend(&self, backend: Arc<dyn TextGenerator>) -> Result<u64> {
        let pending = self.capability.begin_switch();
        match backend.probe().await {
            Ok(()) => {
                let epoch = self.capability.install(backend);
                info!(epoch, "Backend switched");
                Ok(epoch)
            }
            Err(e) => {
                let reason = format!("switch to {} failed: {}", backend.name(), e);
                let restored = self.capability.restore(pending, &reason);
                warn!(backend = backend.name(), error = %e, restored, "Backend probe failed");
                Err(e.into())
            }
        }
    }

    pub async fn process(&self, text: &str, session: &SessionContext) -> Result<PipelineResponse> {
        self.process_with_mode(text, session, self.config.bulk.delete_mode)
            .await
    }

    pub async fn process_with_mode(
        &self,
        text: &str,
        session: &SessionContext,
        mode: DeleteMode,
    ) -> Result<PipelineResponse> {
        match self.pipeline.interpret(text, session).await? {
            Interpretation::Accepted { context, .. } => {
                let command =
                    CommandValidator::new(self.store.as_ref()).validate(&context, session)?;
                let result = self.executor.execute(command, mode)?;
                Ok(PipelineResponse::Executed(result))
            }
            Interpretation::Clarification(clarification) => {
                Ok(PipelineResponse::Clarification(clarification))
            }
            Interpretation::NotACommand { intent, confidence } => {
                Ok(PipelineResponse::NotACommand { intent, confidence })
            }
        }
    }

    /// Run a task under the turn governor. The task is marked in progress
    /// first; its final status follows the outcome. A cancelled run leaves
    /// the task as the last completed turn left it.
    pub async fn execute_task(
        &self,
        task_id: EntityId,
        session: &SessionContext,
        agent: &dyn TurnAgent,
        assessor: &dyn DeliverableAssessor,
        signal: &SignalHandler,
    ) -> Result<GovernorOutcome> {
        let task = match self.store.get_live(EntityType::Task, task_id)? {
            Some(Entity::Task(task)) => task,
            _ => {
                return Err(ValidationError::TargetNotFound {
                    entity_type: EntityType::Task,
                    identifier: format!("#{}", task_id),
                }
                .into());
            }
        };
        if let Some(project_id) = session.current_project
            && project_id != task.project_id
        {
            return Err(ValidationError::ParentProjectMismatch {
                entity_type: EntityType::Task,
                id: task_id,
                project_id,
            }
            .into());
        }

        self.set_task_status(task.project_id, task_id, Status::InProgress)?;
        let outcome = self.governor.run(&task, agent, assessor, signal).await?;

        let status = match outcome.state {
            TurnState::Completed | TurnState::CompletedWithPartialCredit => Some(Status::Completed),
            TurnState::Failed => Some(Status::Blocked),
            _ => None,
        };
        if let Some(status) = status {
            self.set_task_status(task.project_id, task_id, status)?;
        }
        Ok(outcome)
    }

    fn set_task_status(&self, project_id: EntityId, task_id: EntityId, status: Status) -> Result<()> {
        let changes = EntityChanges {
            status: Some(status),
            ..Default::default()
        };
        self.executor
            .locks()
            .with(LockScope::Project(project_id), || {
                self.store.update(EntityType::Task, task_id, &changes)
            })?;
        self.store.flush()?;
        Ok(())
    }
}
