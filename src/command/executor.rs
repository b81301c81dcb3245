use std::sync::Arc;

use tracing::{debug, info};

use super::boundary::{LockScope, ProjectLocks};
use super::bulk::{BulkCommandExecutor, expand_epic_scope};
use super::result::ExecutionResult;
use super::validator::{CommandTarget, CommandValidator, ValidatedCommand};
use crate::config::BulkConfig;
use crate::error::{Result, WorkError};
use crate::model::{DeleteMode, EntityDraft, EntityStore, EntityType, ListFilter};
use crate::nlp::Operation;

/// Applies validated commands to the store.
///
/// Every mutation takes the owning project's lock exactly once. Creates and
/// single updates re-run reference checks inside the lock, since the store
/// may have changed since validation.
pub struct CommandExecutor {
    store: Arc<dyn EntityStore>,
    locks: Arc<ProjectLocks>,
    bulk: BulkCommandExecutor,
}

impl CommandExecutor {
    pub fn new(store: Arc<dyn EntityStore>, config: BulkConfig) -> Self {
        let locks = Arc::new(ProjectLocks::new());
        let bulk = BulkCommandExecutor::new(Arc::clone(&store), Arc::clone(&locks), config);
        Self { store, locks, bulk }
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    pub fn locks(&self) -> &Arc<ProjectLocks> {
        &self.locks
    }

    pub fn execute(&self, command: ValidatedCommand, mode: DeleteMode) -> Result<ExecutionResult> {
        debug!(
            operation = %command.operation,
            entity_type = %command.entity_type,
            bulk = command.is_bulk(),
            "Executing command"
        );
        let operation = command.operation;
        let result = match operation {
            Operation::Create => self.create(command)?,
            Operation::Update => self.update(command)?,
            Operation::Delete => self.delete(command, mode)?,
            Operation::Query => self.query(command)?,
        };
        if operation.mutates() {
            self.store.flush()?;
        }
        info!(
            success = result.success,
            affected = result.affected_ids.len(),
            "{}", result.message
        );
        Ok(result)
    }

    fn create(&self, command: ValidatedCommand) -> Result<ExecutionResult> {
        let scope = match (command.entity_type, command.changes.project_id) {
            (EntityType::Project, _) | (_, None) => LockScope::NewProject,
            (_, Some(project_id)) => LockScope::Project(project_id),
        };
        let entity = self.locks.with(scope, || {
            CommandValidator::new(self.store.as_ref())
                .check_create_references(command.entity_type, &command.changes)?;
            Ok::<_, WorkError>(
                self.store
                    .create(EntityDraft::new(command.entity_type, command.changes))?,
            )
        })?;
        Ok(ExecutionResult::created(&entity))
    }

    fn update(&self, command: ValidatedCommand) -> Result<ExecutionResult> {
        match &command.target {
            CommandTarget::One(entity) => {
                let project_id = entity.project_id();
                let updated = self.locks.with(LockScope::Project(project_id), || {
                    CommandValidator::new(self.store.as_ref()).check_references(
                        command.entity_type,
                        Some(entity.id()),
                        project_id,
                        &command.changes,
                    )?;
                    Ok::<_, WorkError>(self.store.update(
                        command.entity_type,
                        entity.id(),
                        &command.changes,
                    )?)
                })?;
                Ok(ExecutionResult::updated(&updated))
            }
            CommandTarget::All { .. } => {
                let filter = command.list_filter().unwrap_or_else(all_projects);
                let outcome = self
                    .bulk
                    .update_all(command.entity_type, &filter, &command.changes)?;
                Ok(ExecutionResult::bulk("Updated", outcome))
            }
            CommandTarget::New => Ok(ExecutionResult::bulk("Updated", Default::default())),
        }
    }

    fn delete(&self, command: ValidatedCommand, mode: DeleteMode) -> Result<ExecutionResult> {
        let outcome = match &command.target {
            CommandTarget::One(entity) => self.bulk.delete_one(entity, mode),
            CommandTarget::All { .. } => {
                let filter = command.list_filter().unwrap_or_else(all_projects);
                self.bulk.delete_all(command.entity_type, &filter, mode)?
            }
            CommandTarget::New => Default::default(),
        };
        Ok(ExecutionResult::bulk("Deleted", outcome))
    }

    fn query(&self, command: ValidatedCommand) -> Result<ExecutionResult> {
        match &command.target {
            CommandTarget::One(entity) => Ok(ExecutionResult::found(entity)),
            _ => {
                let filter = command.list_filter().unwrap_or_else(all_projects);
                let filter = expand_epic_scope(self.store.as_ref(), command.entity_type, &filter)?;
                let entities = self.store.list(command.entity_type, &filter)?;
                Ok(ExecutionResult::listed(command.entity_type, &entities))
            }
        }
    }
}

fn all_projects() -> ListFilter {
    ListFilter::new(crate::model::ProjectScope::AllProjects)
}
