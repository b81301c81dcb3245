use std::sync::Arc;

use tracing::{debug, info, warn};

use super::boundary::{LockScope, ProjectLocks};
use super::result::BulkOutcome;
use super::validator::CommandValidator;
use crate::config::BulkConfig;
use crate::error::Result;
use crate::model::{
    DeleteMode, Entity, EntityChanges, EntityId, EntityStore, EntityType, ListFilter,
    ProjectScope,
};

/// Expands bulk targets into ordered per-entity operations.
///
/// Each project is processed inside its own lock, and the target list is
/// read inside that lock, so concurrent runs neither double-count nor leave
/// orphans. Deletion is depth-first: every child goes before its parent,
/// which yields Task → Story → Epic → Milestone → Project order.
pub struct BulkCommandExecutor {
    store: Arc<dyn EntityStore>,
    locks: Arc<ProjectLocks>,
    config: BulkConfig,
}

impl BulkCommandExecutor {
    pub fn new(store: Arc<dyn EntityStore>, locks: Arc<ProjectLocks>, config: BulkConfig) -> Self {
        Self {
            store,
            locks,
            config,
        }
    }

    /// Delete every entity of `entity_type` matching `filter`, cascading to
    /// children.
    pub fn delete_all(
        &self,
        entity_type: EntityType,
        filter: &ListFilter,
        mode: DeleteMode,
    ) -> Result<BulkOutcome> {
        let mut outcome = BulkOutcome::default();
        for project_id in self.projects_in(filter.scope)? {
            self.locks.with(LockScope::Project(project_id), || -> Result<()> {
                let targets = self.targets(entity_type, filter, project_id)?;
                debug!(project_id, count = targets.len(), entity_type = %entity_type, "Bulk delete targets");
                for target in &targets {
                    self.delete_subtree(target, mode, &mut outcome);
                    if outcome.aborted {
                        break;
                    }
                }
                Ok(())
            })?;
            if outcome.aborted {
                break;
            }
        }
        info!(
            entity_type = %entity_type,
            ?mode,
            deleted = outcome.total(),
            failed = outcome.failed.len(),
            "Bulk delete finished"
        );
        Ok(outcome)
    }

    /// Delete one entity and everything beneath it.
    pub fn delete_one(&self, entity: &Entity, mode: DeleteMode) -> BulkOutcome {
        let mut outcome = BulkOutcome::default();
        self.locks
            .with(LockScope::Project(entity.project_id()), || {
                self.delete_subtree(entity, mode, &mut outcome)
            });
        outcome
    }

    /// Apply the same sparse change to every entity matching `filter`.
    pub fn update_all(
        &self,
        entity_type: EntityType,
        filter: &ListFilter,
        changes: &EntityChanges,
    ) -> Result<BulkOutcome> {
        let validator = CommandValidator::new(self.store.as_ref());
        let mut outcome = BulkOutcome::default();

        for project_id in self.projects_in(filter.scope)? {
            self.locks.with(LockScope::Project(project_id), || -> Result<()> {
                let targets = self.targets(entity_type, filter, project_id)?;
                for target in &targets {
                    let applied = validator
                        .check_references(entity_type, Some(target.id()), project_id, changes)
                        .and_then(|()| Ok(self.store.update(entity_type, target.id(), changes)?));
                    match applied {
                        Ok(_) => outcome.record(entity_type, target.id()),
                        Err(e) => {
                            self.record_failure(&mut outcome, target, e);
                            if outcome.aborted {
                                break;
                            }
                        }
                    }
                }
                Ok(())
            })?;
            if outcome.aborted {
                break;
            }
        }
        info!(
            entity_type = %entity_type,
            updated = outcome.total(),
            failed = outcome.failed.len(),
            "Bulk update finished"
        );
        Ok(outcome)
    }

    fn targets(
        &self,
        entity_type: EntityType,
        filter: &ListFilter,
        project_id: EntityId,
    ) -> Result<Vec<Entity>> {
        let filter = scoped(filter, project_id);
        let filter = expand_epic_scope(self.store.as_ref(), entity_type, &filter)?;
        Ok(self.store.list(entity_type, &filter)?)
    }

    /// Projects a scope covers. Cross-project runs must say so explicitly.
    fn projects_in(&self, scope: ProjectScope) -> Result<Vec<EntityId>> {
        Ok(match scope {
            ProjectScope::Project(id) => vec![id],
            ProjectScope::AllProjects => self
                .store
                .list(EntityType::Project, &ListFilter::new(ProjectScope::AllProjects))?
                .iter()
                .map(Entity::id)
                .collect(),
        })
    }

    /// Caller holds the project lock.
    fn delete_subtree(&self, entity: &Entity, mode: DeleteMode, outcome: &mut BulkOutcome) {
        let children = match self.children(entity, mode) {
            Ok(children) => children,
            Err(e) => {
                self.record_failure(outcome, entity, e);
                return;
            }
        };

        let failures_before = outcome.failed.len();
        for child in &children {
            self.delete_subtree(child, mode, outcome);
            if outcome.aborted {
                return;
            }
        }
        if outcome.failed.len() > failures_before {
            // A surviving child would be orphaned.
            self.record_failure(outcome, entity, "children could not be deleted");
            return;
        }

        match self.store.delete(entity.entity_type(), entity.id(), mode) {
            Ok(()) => {
                outcome.record(entity.entity_type(), entity.id());
                self.prune_references(entity, outcome);
            }
            Err(e) => self.record_failure(outcome, entity, e),
        }
    }

    /// Direct children, ordered so that every subtree is removed child-first.
    fn children(&self, entity: &Entity, mode: DeleteMode) -> Result<Vec<Entity>> {
        let parent = (entity.entity_type(), entity.id());
        let mut filter = ListFilter::new(ProjectScope::Project(entity.project_id()));
        if mode == DeleteMode::Hard {
            filter = filter.including_deleted();
        }

        let mut children = Vec::new();
        for child_type in EntityType::DELETION_ORDER {
            if !entity.entity_type().dependents().contains(&child_type) {
                continue;
            }
            children.extend(
                self.store
                    .list(child_type, &filter)?
                    .into_iter()
                    .filter(|child| child.parent() == Some(parent)),
            );
        }
        Ok(children)
    }

    /// Drop references to a deleted epic from milestones, and to a deleted
    /// task from other tasks' dependencies.
    fn prune_references(&self, deleted: &Entity, outcome: &mut BulkOutcome) {
        let (referrer_type, id) = match deleted.entity_type() {
            EntityType::Epic => (EntityType::Milestone, deleted.id()),
            EntityType::Task => (EntityType::Task, deleted.id()),
            _ => return,
        };
        let filter = ListFilter::new(ProjectScope::Project(deleted.project_id()));
        let referrers = match self.store.list(referrer_type, &filter) {
            Ok(referrers) => referrers,
            Err(e) => {
                warn!(error = %e, "Failed to list referrers for pruning");
                return;
            }
        };

        for referrer in referrers {
            let changes = match &referrer {
                Entity::Milestone(m) if m.epic_ids.contains(&id) => {
                    let mut epic_ids = m.epic_ids.clone();
                    epic_ids.remove(&id);
                    EntityChanges {
                        epic_ids: Some(epic_ids),
                        ..Default::default()
                    }
                }
                Entity::Task(t) if t.dependencies.contains(&id) => {
                    let mut dependencies = t.dependencies.clone();
                    dependencies.remove(&id);
                    EntityChanges {
                        dependencies: Some(dependencies),
                        ..Default::default()
                    }
                }
                _ => continue,
            };
            match self.store.update(referrer_type, referrer.id(), &changes) {
                Ok(_) => debug!(
                    referrer = referrer.id(),
                    removed = id,
                    "Pruned reference to deleted {}", deleted.entity_type()
                ),
                Err(e) => outcome.fail(referrer_type, referrer.id(), e),
            }
        }
    }

    fn record_failure(&self, outcome: &mut BulkOutcome, entity: &Entity, error: impl ToString) {
        let error = error.to_string();
        warn!(
            entity_type = %entity.entity_type(),
            id = entity.id(),
            error = %error,
            "Bulk item failed"
        );
        outcome.fail(entity.entity_type(), entity.id(), error);
        if self.config.abort_on_first_error {
            outcome.aborted = true;
        }
    }
}

/// Tasks under an epic are the tasks of that epic's live stories.
pub(crate) fn expand_epic_scope(
    store: &dyn EntityStore,
    entity_type: EntityType,
    filter: &ListFilter,
) -> Result<ListFilter> {
    let Some((EntityType::Epic, epic_id)) = filter.parent else {
        return Ok(filter.clone());
    };
    if entity_type != EntityType::Task {
        return Ok(filter.clone());
    }
    let stories = store
        .list(
            EntityType::Story,
            &ListFilter::new(filter.scope).with_parent(EntityType::Epic, epic_id),
        )?
        .iter()
        .map(Entity::id)
        .collect();
    Ok(filter.clone().within_stories(stories))
}

fn scoped(filter: &ListFilter, project_id: EntityId) -> ListFilter {
    let mut filter = filter.clone();
    filter.scope = ProjectScope::Project(project_id);
    filter
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityDraft, MemoryStore};

    struct Fixture {
        store: Arc<MemoryStore>,
        bulk: BulkCommandExecutor,
    }

    fn fixture(config: BulkConfig) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let bulk = BulkCommandExecutor::new(store.clone(), Arc::new(ProjectLocks::new()), config);
        Fixture { store, bulk }
    }

    fn create(store: &MemoryStore, entity_type: EntityType, changes: EntityChanges) -> Entity {
        store.create(EntityDraft::new(entity_type, changes)).unwrap()
    }

    fn in_project(project_id: EntityId) -> EntityChanges {
        EntityChanges {
            project_id: Some(project_id),
            ..Default::default()
        }
    }

    #[test]
    fn test_epic_cascade_prunes_milestones() {
        let f = fixture(BulkConfig::default());
        let project = create(&f.store, EntityType::Project, EntityChanges::default()).id();
        let epic = create(&f.store, EntityType::Epic, in_project(project)).id();
        let story = create(
            &f.store,
            EntityType::Story,
            EntityChanges {
                epic_id: Some(epic),
                ..in_project(project)
            },
        )
        .id();
        create(
            &f.store,
            EntityType::Task,
            EntityChanges {
                story_id: Some(story),
                ..in_project(project)
            },
        );
        let milestone = create(
            &f.store,
            EntityType::Milestone,
            EntityChanges {
                epic_ids: Some([epic].into()),
                ..in_project(project)
            },
        )
        .id();

        let epic_entity = f.store.get(EntityType::Epic, epic).unwrap().unwrap();
        let outcome = f.bulk.delete_one(&epic_entity, DeleteMode::Soft);

        assert!(outcome.is_clean());
        assert_eq!(outcome.count(EntityType::Task), 1);
        assert_eq!(outcome.count(EntityType::Story), 1);
        assert_eq!(outcome.count(EntityType::Epic), 1);
        let order: Vec<EntityType> = outcome.affected.iter().map(|r| r.entity_type).collect();
        assert_eq!(order, [EntityType::Task, EntityType::Story, EntityType::Epic]);

        let Some(Entity::Milestone(m)) = f.store.get(EntityType::Milestone, milestone).unwrap()
        else {
            panic!("milestone missing");
        };
        assert!(m.epic_ids.is_empty());
    }

    #[test]
    fn test_hard_delete_removes_records() {
        let f = fixture(BulkConfig::default());
        let project = create(&f.store, EntityType::Project, EntityChanges::default()).id();
        create(&f.store, EntityType::Epic, in_project(project));

        let outcome = f
            .bulk
            .delete_all(
                EntityType::Project,
                &ListFilter::new(ProjectScope::AllProjects),
                DeleteMode::Hard,
            )
            .unwrap();
        assert_eq!(outcome.count(EntityType::Project), 1);
        assert_eq!(outcome.count(EntityType::Epic), 1);
        assert_eq!(f.store.count(EntityType::Project), 0);
        assert_eq!(f.store.count(EntityType::Epic), 0);
    }

    #[test]
    fn test_bulk_update_applies_to_scope_only() {
        let f = fixture(BulkConfig::default());
        let a = create(&f.store, EntityType::Project, EntityChanges::default()).id();
        let b = create(&f.store, EntityType::Project, EntityChanges::default()).id();
        for project in [a, a, b] {
            create(&f.store, EntityType::Task, in_project(project));
        }

        let changes = EntityChanges {
            status: Some(crate::model::Status::Completed),
            ..Default::default()
        };
        let outcome = f
            .bulk
            .update_all(
                EntityType::Task,
                &ListFilter::new(ProjectScope::Project(a)),
                &changes,
            )
            .unwrap();
        assert_eq!(outcome.count(EntityType::Task), 2);

        let untouched = f
            .store
            .list(
                EntityType::Task,
                &ListFilter::new(ProjectScope::Project(b))
                    .with_status(crate::model::Status::Pending),
            )
            .unwrap();
        assert_eq!(untouched.len(), 1);
    }
}
