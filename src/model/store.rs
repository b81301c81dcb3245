use std::collections::BTreeSet;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{
    Entity, EntityId, EntityMeta, EntityType, Epic, Milestone, Priority, Project, Status, Story,
    Task,
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("{entity_type} {id} not found")]
    NotFound {
        entity_type: EntityType,
        id: EntityId,
    },

    #[error("{entity_type} {id} is already deleted")]
    AlreadyDeleted {
        entity_type: EntityType,
        id: EntityId,
    },

    #[error("{entity_type} requires field '{field}'")]
    MissingField {
        entity_type: EntityType,
        field: &'static str,
    },

    #[error("Persistence failed: {0}")]
    Persistence(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteMode {
    /// Mark as deleted and keep the record.
    #[default]
    Soft,
    /// Physically remove the record.
    Hard,
}

/// Which projects a list call may see. There is deliberately no default:
/// callers state cross-project reads explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectScope {
    Project(EntityId),
    AllProjects,
}

impl ProjectScope {
    pub fn admits(&self, entity: &Entity) -> bool {
        match self {
            Self::AllProjects => true,
            Self::Project(id) => entity.project_id() == *id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListFilter {
    pub scope: ProjectScope,
    pub parent: Option<(EntityType, EntityId)>,
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    /// Tasks only: keep tasks whose story is in the set.
    pub stories: Option<BTreeSet<EntityId>>,
    pub include_deleted: bool,
}

impl ListFilter {
    pub fn new(scope: ProjectScope) -> Self {
        Self {
            scope,
            parent: None,
            status: None,
            priority: None,
            stories: None,
            include_deleted: false,
        }
    }

    pub fn with_parent(mut self, parent_type: EntityType, parent_id: EntityId) -> Self {
        self.parent = Some((parent_type, parent_id));
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Replace the parent with a set of story ids. Used to scope tasks by
    /// epic, since a task names its story rather than its epic.
    pub fn within_stories(mut self, stories: BTreeSet<EntityId>) -> Self {
        self.parent = None;
        self.stories = Some(stories);
        self
    }

    pub fn including_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }

    pub fn matches(&self, entity: &Entity) -> bool {
        if !self.include_deleted && entity.is_deleted() {
            return false;
        }
        if !self.scope.admits(entity) {
            return false;
        }
        if let Some((parent_type, parent_id)) = self.parent
            && !entity.belongs_to(parent_type, parent_id)
        {
            return false;
        }
        if let Some(stories) = &self.stories
            && !entity
                .as_task()
                .and_then(|t| t.story_id)
                .is_some_and(|story_id| stories.contains(&story_id))
        {
            return false;
        }
        if let Some(status) = self.status
            && entity.status() != status
        {
            return false;
        }
        if let Some(priority) = self.priority
            && entity.priority() != Some(priority)
        {
            return false;
        }
        true
    }
}

/// Typed field changes. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub project_id: Option<EntityId>,
    pub epic_id: Option<EntityId>,
    pub story_id: Option<EntityId>,
    pub dependencies: Option<BTreeSet<EntityId>>,
    pub epic_ids: Option<BTreeSet<EntityId>>,
    pub due_date: Option<NaiveDate>,
}

impl EntityChanges {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply supplied fields in place. Fields that do not exist on the
    /// entity's type are ignored; the validator rejects them earlier.
    pub fn apply_to(&self, entity: &mut Entity) {
        match entity {
            Entity::Project(p) => {
                set(&mut p.name, &self.name);
                set_opt(&mut p.description, &self.description);
                set(&mut p.status, &self.status);
            }
            Entity::Epic(e) => {
                set(&mut e.name, &self.name);
                set_opt(&mut e.description, &self.description);
                set(&mut e.status, &self.status);
                set(&mut e.priority, &self.priority);
            }
            Entity::Story(s) => {
                set(&mut s.name, &self.name);
                set_opt(&mut s.description, &self.description);
                set(&mut s.status, &self.status);
                set(&mut s.priority, &self.priority);
                set(&mut s.epic_id, &self.epic_id);
            }
            Entity::Task(t) => {
                set(&mut t.name, &self.name);
                set_opt(&mut t.description, &self.description);
                set(&mut t.status, &self.status);
                set(&mut t.priority, &self.priority);
                set_opt(&mut t.story_id, &self.story_id);
                set(&mut t.dependencies, &self.dependencies);
            }
            Entity::Milestone(m) => {
                set(&mut m.name, &self.name);
                set_opt(&mut m.description, &self.description);
                set(&mut m.status, &self.status);
                set(&mut m.epic_ids, &self.epic_ids);
                set_opt(&mut m.due_date, &self.due_date);
            }
        }
        entity.meta_mut().touch();
    }
}

fn set<T: Clone>(target: &mut T, value: &Option<T>) {
    if let Some(v) = value {
        *target = v.clone();
    }
}

fn set_opt<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
    if value.is_some() {
        target.clone_from(value);
    }
}

/// A not-yet-persisted entity. The store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDraft {
    pub entity_type: EntityType,
    pub changes: EntityChanges,
}

impl EntityDraft {
    pub fn new(entity_type: EntityType, changes: EntityChanges) -> Self {
        Self {
            entity_type,
            changes,
        }
    }

    /// Materialize with `id`, filling defaults for every unsupplied field.
    pub fn build(self, id: EntityId) -> Result<Entity, StoreError> {
        let entity_type = self.entity_type;
        let c = self.changes;
        let name = c
            .name
            .unwrap_or_else(|| format!("Untitled {}", entity_type.as_str()));
        let meta = EntityMeta::now();
        let require = |value: Option<EntityId>, field: &'static str| {
            value.ok_or(StoreError::MissingField { entity_type, field })
        };

        let entity = match entity_type {
            EntityType::Project => Entity::Project(Project {
                id,
                name,
                description: c.description,
                status: c.status.unwrap_or_default(),
                meta,
            }),
            EntityType::Epic => Entity::Epic(Epic {
                id,
                project_id: require(c.project_id, "project_id")?,
                name,
                description: c.description,
                status: c.status.unwrap_or_default(),
                priority: c.priority.unwrap_or_default(),
                meta,
            }),
            EntityType::Story => Entity::Story(Story {
                id,
                project_id: require(c.project_id, "project_id")?,
                epic_id: require(c.epic_id, "epic_id")?,
                name,
                description: c.description,
                status: c.status.unwrap_or_default(),
                priority: c.priority.unwrap_or_default(),
                meta,
            }),
            EntityType::Task => Entity::Task(Task {
                id,
                project_id: require(c.project_id, "project_id")?,
                story_id: c.story_id,
                name,
                description: c.description,
                status: c.status.unwrap_or_default(),
                priority: c.priority.unwrap_or_default(),
                dependencies: c.dependencies.unwrap_or_default(),
                meta,
            }),
            EntityType::Milestone => Entity::Milestone(Milestone {
                id,
                project_id: require(c.project_id, "project_id")?,
                name,
                description: c.description,
                status: c.status.unwrap_or_default(),
                epic_ids: c.epic_ids.unwrap_or_default(),
                due_date: c.due_date,
                meta,
            }),
        };
        Ok(entity)
    }
}

/// Persistence contract: symmetric CRUD over all five entity types.
///
/// `get` returns soft-deleted records (callers inspect `is_deleted`);
/// `list` hides them unless the filter opts in.
pub trait EntityStore: Send + Sync {
    fn create(&self, draft: EntityDraft) -> Result<Entity, StoreError>;

    fn get(&self, entity_type: EntityType, id: EntityId) -> Result<Option<Entity>, StoreError>;

    fn list(&self, entity_type: EntityType, filter: &ListFilter)
    -> Result<Vec<Entity>, StoreError>;

    fn update(
        &self,
        entity_type: EntityType,
        id: EntityId,
        changes: &EntityChanges,
    ) -> Result<Entity, StoreError>;

    fn delete(&self, entity_type: EntityType, id: EntityId, mode: DeleteMode)
    -> Result<(), StoreError>;

    /// Persist buffered state, if the implementation buffers.
    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Live (non-deleted) entity, or `None` when missing or soft-deleted.
    fn get_live(
        &self,
        entity_type: EntityType,
        id: EntityId,
    ) -> Result<Option<Entity>, StoreError> {
        Ok(self.get(entity_type, id)?.filter(|e| !e.is_deleted()))
    }
}

pub(crate) fn soft_delete(entity: &mut Entity) -> Result<(), StoreError> {
    if entity.is_deleted() {
        return Err(StoreError::AlreadyDeleted {
            entity_type: entity.entity_type(),
            id: entity.id(),
        });
    }
    let meta = entity.meta_mut();
    meta.deleted_at = Some(Utc::now());
    meta.touch();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draft_defaults() {
        let changes = EntityChanges {
            project_id: Some(1),
            ..Default::default()
        };
        let entity = EntityDraft::new(EntityType::Task, changes).build(10).unwrap();
        let task = entity.as_task().unwrap();
        assert_eq!(task.id, 10);
        assert_eq!(task.name, "Untitled task");
        assert_eq!(task.status, Status::Pending);
        assert_eq!(task.priority, Priority::Medium);
        assert!(task.dependencies.is_empty());
    }

    #[test]
    fn test_story_set_filter() {
        let task = |id, story_id| {
            EntityDraft::new(
                EntityType::Task,
                EntityChanges {
                    project_id: Some(1),
                    story_id,
                    ..Default::default()
                },
            )
            .build(id)
            .unwrap()
        };
        let filter = ListFilter::new(ProjectScope::Project(1))
            .with_parent(EntityType::Epic, 7)
            .within_stories(BTreeSet::from([3, 4]));
        assert_eq!(filter.parent, None);
        assert!(filter.matches(&task(1, Some(3))));
        assert!(!filter.matches(&task(2, Some(5))));
        assert!(!filter.matches(&task(3, None)));
    }

    #[test]
    fn test_story_draft_requires_epic() {
        let changes = EntityChanges {
            project_id: Some(1),
            ..Default::default()
        };
        let err = EntityDraft::new(EntityType::Story, changes)
            .build(1)
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::MissingField {
                entity_type: EntityType::Story,
                field: "epic_id"
            }
        );
    }

    #[test]
    fn test_changes_are_sparse() {
        let mut entity = EntityDraft::new(
            EntityType::Epic,
            EntityChanges {
                project_id: Some(1),
                name: Some("Billing".into()),
                description: Some("Invoices".into()),
                ..Default::default()
            },
        )
        .build(3)
        .unwrap();

        EntityChanges {
            status: Some(Status::Blocked),
            ..Default::default()
        }
        .apply_to(&mut entity);

        let Entity::Epic(epic) = entity else {
            panic!("expected epic");
        };
        assert_eq!(epic.status, Status::Blocked);
        assert_eq!(epic.name, "Billing");
        assert_eq!(epic.description.as_deref(), Some("Invoices"));
    }
}
