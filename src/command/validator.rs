use std::collections::{BTreeSet, HashMap};
use std::fmt;

use chrono::NaiveDate;
use tracing::debug;

use super::graph::find_cycle;
use crate::error::Result;
use crate::model::{
    Entity, EntityChanges, EntityId, EntityStore, EntityType, Field, FieldPatch, FieldValue,
    ListFilter, Priority, ProjectScope, Status,
};
use crate::nlp::{Identifier, Operation, OperationContext, SessionContext};

/// A command that failed an invariant. `invariant()` names the rule with a
/// stable identifier.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    StoryEpicRequired,
    ProjectRequired {
        entity_type: EntityType,
    },
    ParentMissing {
        entity_type: EntityType,
        id: EntityId,
    },
    ParentDeleted {
        entity_type: EntityType,
        id: EntityId,
    },
    ParentProjectMismatch {
        entity_type: EntityType,
        id: EntityId,
        project_id: EntityId,
    },
    SelfDependency {
        task_id: EntityId,
    },
    DependencyCycle {
        path: Vec<EntityId>,
    },
    DependencyOutsideProject {
        dependency: EntityId,
        project_id: EntityId,
    },
    InvalidFieldValue {
        field: Field,
        value: String,
        expected: String,
    },
    FieldNotApplicable {
        field: Field,
        entity_type: EntityType,
    },
    AmbiguousIdentifier {
        entity_type: EntityType,
        name: String,
        candidates: Vec<EntityId>,
    },
    TargetNotFound {
        entity_type: EntityType,
        identifier: String,
    },
    BulkCreate {
        entity_type: EntityType,
    },
    MissingTarget {
        operation: Operation,
    },
    EmptyUpdate,
}

impl ValidationError {
    pub fn invariant(&self) -> &'static str {
        match self {
            Self::StoryEpicRequired => "story.epic_required",
            Self::ProjectRequired { entity_type } => match entity_type {
                EntityType::Epic => "epic.project_required",
                EntityType::Story => "story.project_required",
                EntityType::Task => "task.project_required",
                EntityType::Milestone => "milestone.project_required",
                EntityType::Project => "project.project_required",
            },
            Self::ParentMissing { .. } => "parent.exists",
            Self::ParentDeleted { .. } => "parent.not_deleted",
            Self::ParentProjectMismatch { .. } => "parent.same_project",
            Self::SelfDependency { .. } => "task.no_self_dependency",
            Self::DependencyCycle { .. } => "task.dependencies_acyclic",
            Self::DependencyOutsideProject { .. } => "task.dependencies_same_project",
            Self::InvalidFieldValue { .. } => "field.domain",
            Self::FieldNotApplicable { .. } => "field.applicable",
            Self::AmbiguousIdentifier { .. } => "identifier.unambiguous",
            Self::TargetNotFound { .. } => "identifier.exists",
            Self::BulkCreate { .. } => "create.no_bulk_target",
            Self::MissingTarget { .. } => "operation.target_required",
            Self::EmptyUpdate => "update.fields_required",
        }
    }

    fn detail(&self) -> String {
        match self {
            Self::StoryEpicRequired => {
                "a story must belong to an epic; say which epic it goes in".to_string()
            }
            Self::ProjectRequired { entity_type } => format!(
                "a {} needs a project; select a project or name one",
                entity_type
            ),
            Self::ParentMissing { entity_type, id } => {
                format!("{} #{} does not exist", entity_type, id)
            }
            Self::ParentDeleted { entity_type, id } => {
                format!("{} #{} has been deleted", entity_type, id)
            }
            Self::ParentProjectMismatch {
                entity_type,
                id,
                project_id,
            } => format!(
                "{} #{} is not in project #{}",
                entity_type, id, project_id
            ),
            Self::SelfDependency { task_id } => {
                format!("task #{} cannot depend on itself", task_id)
            }
            Self::DependencyCycle { path } => {
                let path: Vec<String> = path.iter().map(|id| format!("#{}", id)).collect();
                format!("dependency cycle: {}", path.join(" -> "))
            }
            Self::DependencyOutsideProject {
                dependency,
                project_id,
            } => format!(
                "task #{} is outside project #{}",
                dependency, project_id
            ),
            Self::InvalidFieldValue {
                field,
                value,
                expected,
            } => format!("'{}' is not a valid {} (expected {})", value, field, expected),
            Self::FieldNotApplicable { field, entity_type } => {
                format!("{} has no field '{}'", entity_type, field)
            }
            Self::AmbiguousIdentifier {
                entity_type,
                name,
                candidates,
            } => {
                let ids: Vec<String> = candidates.iter().map(|id| format!("#{}", id)).collect();
                format!(
                    "\"{}\" matches {} {}: {}",
                    name,
                    candidates.len(),
                    entity_type.plural(),
                    ids.join(", ")
                )
            }
            Self::TargetNotFound {
                entity_type,
                identifier,
            } => format!("no {} matches {}", entity_type, identifier),
            Self::BulkCreate { entity_type } => {
                format!("cannot create ALL {}", entity_type.plural())
            }
            Self::MissingTarget { operation } => {
                format!("{} needs a target entity", operation)
            }
            Self::EmptyUpdate => "no fields to update".to_string(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.invariant(), self.detail())
    }
}

impl std::error::Error for ValidationError {}

/// What a validated command acts on.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandTarget {
    /// CREATE: the entity does not exist yet.
    New,
    One(Entity),
    /// Every live entity of the type in scope, optionally under one parent.
    All {
        scope: ProjectScope,
        parent: Option<(EntityType, EntityId)>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedCommand {
    pub operation: Operation,
    pub entity_type: EntityType,
    pub target: CommandTarget,
    /// Typed field values. For CREATE the owning references are resolved.
    pub changes: EntityChanges,
    pub status_filter: Option<Status>,
    pub priority_filter: Option<Priority>,
}

impl ValidatedCommand {
    pub fn is_bulk(&self) -> bool {
        matches!(self.target, CommandTarget::All { .. })
    }

    pub fn list_filter(&self) -> Option<ListFilter> {
        let CommandTarget::All { scope, parent } = &self.target else {
            return None;
        };
        let mut filter = ListFilter::new(*scope);
        if let Some((parent_type, parent_id)) = parent {
            filter = filter.with_parent(*parent_type, *parent_id);
        }
        if let Some(status) = self.status_filter {
            filter = filter.with_status(status);
        }
        if let Some(priority) = self.priority_filter {
            filter = filter.with_priority(priority);
        }
        Some(filter)
    }
}

fn writable_fields(entity_type: EntityType) -> &'static [Field] {
    const COMMON: [Field; 3] = [Field::Name, Field::Description, Field::Status];
    match entity_type {
        EntityType::Project => &COMMON,
        EntityType::Epic => &[
            Field::Name,
            Field::Description,
            Field::Status,
            Field::Priority,
            Field::ProjectId,
        ],
        EntityType::Story => &[
            Field::Name,
            Field::Description,
            Field::Status,
            Field::Priority,
            Field::ProjectId,
            Field::EpicId,
        ],
        EntityType::Task => &[
            Field::Name,
            Field::Description,
            Field::Status,
            Field::Priority,
            Field::ProjectId,
            Field::StoryId,
            Field::Dependencies,
        ],
        EntityType::Milestone => &[
            Field::Name,
            Field::Description,
            Field::Status,
            Field::ProjectId,
            Field::EpicIds,
            Field::DueDate,
        ],
    }
}

/// Pure check of an interpreted command against a read-only store view.
pub struct CommandValidator<'a> {
    store: &'a dyn EntityStore,
}

impl<'a> CommandValidator<'a> {
    pub fn new(store: &'a dyn EntityStore) -> Self {
        Self { store }
    }

    pub fn validate(
        &self,
        ctx: &OperationContext,
        session: &SessionContext,
    ) -> Result<ValidatedCommand> {
        let entity_type = ctx.entity_types.target();
        debug!(
            operation = %ctx.operation,
            entity_types = %ctx.entity_types,
            identifier = ?ctx.identifier,
            "Validating command"
        );

        match (ctx.operation, &ctx.identifier) {
            (Operation::Create, Some(Identifier::All)) => {
                return Err(ValidationError::BulkCreate { entity_type }.into());
            }
            (op @ (Operation::Update | Operation::Delete), None) => {
                return Err(ValidationError::MissingTarget { operation: op }.into());
            }
            _ => {}
        }

        match ctx.operation {
            Operation::Create => self.validate_create(entity_type, &ctx.parameters, session),
            Operation::Update => self.validate_update(ctx, session),
            Operation::Delete => self.validate_delete(ctx, session),
            Operation::Query => self.validate_query(ctx, session),
        }
    }

    fn validate_create(
        &self,
        entity_type: EntityType,
        parameters: &FieldPatch,
        session: &SessionContext,
    ) -> Result<ValidatedCommand> {
        let mut changes = typed_changes(entity_type, parameters)?;

        match entity_type {
            EntityType::Project => {}
            EntityType::Epic | EntityType::Milestone => {
                let project_id = changes
                    .project_id
                    .or(session.current_project)
                    .ok_or(ValidationError::ProjectRequired { entity_type })?;
                self.require_live(EntityType::Project, project_id)?;
                changes.project_id = Some(project_id);
            }
            EntityType::Story => {
                let epic_id = changes
                    .epic_id
                    .ok_or(ValidationError::StoryEpicRequired)?;
                let epic = self.require_live(EntityType::Epic, epic_id)?;
                if let Some(project_id) = changes.project_id
                    && project_id != epic.project_id()
                {
                    return Err(ValidationError::ParentProjectMismatch {
                        entity_type: EntityType::Epic,
                        id: epic_id,
                        project_id,
                    }
                    .into());
                }
                changes.project_id = Some(epic.project_id());
            }
            EntityType::Task => {
                let story = match changes.story_id {
                    Some(story_id) => Some(self.require_live(EntityType::Story, story_id)?),
                    None => None,
                };
                let project_id = changes
                    .project_id
                    .or(story.as_ref().map(Entity::project_id))
                    .or(session.current_project)
                    .ok_or(ValidationError::ProjectRequired { entity_type })?;
                self.require_live(EntityType::Project, project_id)?;
                if let Some(story) = &story {
                    self.require_same_project(story, project_id)?;
                }
                changes.project_id = Some(project_id);
            }
        }

        self.check_create_references(entity_type, &changes)?;

        Ok(ValidatedCommand {
            operation: Operation::Create,
            entity_type,
            target: CommandTarget::New,
            changes,
            status_filter: None,
            priority_filter: None,
        })
    }

    fn validate_update(
        &self,
        ctx: &OperationContext,
        session: &SessionContext,
    ) -> Result<ValidatedCommand> {
        let entity_type = ctx.entity_types.target();
        let mut changes = typed_changes(entity_type, &ctx.parameters)?;
        // On update, project_id selects scope; entities never move projects.
        let scope = changes
            .project_id
            .take()
            .map(ProjectScope::Project)
            .unwrap_or_else(|| session.scope());
        if changes.is_empty() {
            return Err(ValidationError::EmptyUpdate.into());
        }

        let target = self.resolve_target(ctx, scope, None)?;
        match &target {
            CommandTarget::One(entity) => {
                self.check_references(entity_type, Some(entity.id()), entity.project_id(), &changes)?;
            }
            CommandTarget::All { .. } => self.check_references_exist(&changes)?,
            CommandTarget::New => {}
        }

        Ok(ValidatedCommand {
            operation: Operation::Update,
            entity_type,
            target,
            changes,
            status_filter: None,
            priority_filter: None,
        })
    }

    fn validate_delete(
        &self,
        ctx: &OperationContext,
        session: &SessionContext,
    ) -> Result<ValidatedCommand> {
        let filters = QueryFilters::from_patch(&ctx.parameters, session)?;
        let target = self.resolve_target(ctx, filters.scope, filters.parent)?;
        Ok(ValidatedCommand {
            operation: Operation::Delete,
            entity_type: ctx.entity_types.target(),
            target,
            changes: EntityChanges::default(),
            status_filter: filters.status,
            priority_filter: filters.priority,
        })
    }

    fn validate_query(
        &self,
        ctx: &OperationContext,
        session: &SessionContext,
    ) -> Result<ValidatedCommand> {
        let filters = QueryFilters::from_patch(&ctx.parameters, session)?;
        let target = match &ctx.identifier {
            None => CommandTarget::All {
                scope: filters.scope,
                parent: filters.parent,
            },
            Some(_) => self.resolve_target(ctx, filters.scope, filters.parent)?,
        };
        Ok(ValidatedCommand {
            operation: Operation::Query,
            entity_type: ctx.entity_types.target(),
            target,
            changes: EntityChanges::default(),
            status_filter: filters.status,
            priority_filter: filters.priority,
        })
    }

    /// Resolve the identifier. With a scoping type (`[task, epic]` + 5) the
    /// identifier names the parent and the target is every child under it.
    fn resolve_target(
        &self,
        ctx: &OperationContext,
        scope: ProjectScope,
        parent: Option<(EntityType, EntityId)>,
    ) -> Result<CommandTarget> {
        let entity_type = ctx.entity_types.target();
        let Some(identifier) = &ctx.identifier else {
            return Err(ValidationError::MissingTarget {
                operation: ctx.operation,
            }
            .into());
        };

        if let Identifier::All = identifier {
            return Ok(CommandTarget::All { scope, parent });
        }

        if let Some(scope_type) = ctx.entity_types.scope() {
            let parent = self.resolve_one(scope_type, identifier, scope)?;
            return Ok(CommandTarget::All {
                scope,
                parent: Some((scope_type, parent.id())),
            });
        }

        Ok(CommandTarget::One(
            self.resolve_one(entity_type, identifier, scope)?,
        ))
    }

    fn resolve_one(
        &self,
        entity_type: EntityType,
        identifier: &Identifier,
        scope: ProjectScope,
    ) -> Result<Entity> {
        let not_found = || ValidationError::TargetNotFound {
            entity_type,
            identifier: identifier.to_string(),
        };

        match identifier {
            Identifier::Id(id) => Ok(self
                .store
                .get_live(entity_type, *id)?
                .filter(|entity| scope.admits(entity))
                .ok_or_else(not_found)?),
            Identifier::Name(name) => {
                let candidates = self.store.list(entity_type, &ListFilter::new(scope))?;
                let wanted = name.trim().to_lowercase();
                let mut matches: Vec<Entity> = candidates
                    .iter()
                    .filter(|e| e.name().to_lowercase() == wanted)
                    .cloned()
                    .collect();
                if matches.is_empty() {
                    matches = candidates
                        .into_iter()
                        .filter(|e| e.name().to_lowercase().contains(&wanted))
                        .collect();
                }
                match matches.len() {
                    0 => Err(not_found().into()),
                    1 => Ok(matches.remove(0)),
                    _ => Err(ValidationError::AmbiguousIdentifier {
                        entity_type,
                        name: name.clone(),
                        candidates: matches.iter().map(Entity::id).collect(),
                    }
                    .into()),
                }
            }
            Identifier::All => Err(not_found().into()),
        }
    }

    fn require_live(&self, entity_type: EntityType, id: EntityId) -> Result<Entity> {
        match self.store.get(entity_type, id)? {
            None => Err(ValidationError::ParentMissing { entity_type, id }.into()),
            Some(entity) if entity.is_deleted() => {
                Err(ValidationError::ParentDeleted { entity_type, id }.into())
            }
            Some(entity) => Ok(entity),
        }
    }

    fn require_same_project(&self, parent: &Entity, project_id: EntityId) -> Result<()> {
        if parent.project_id() == project_id {
            Ok(())
        } else {
            Err(ValidationError::ParentProjectMismatch {
                entity_type: parent.entity_type(),
                id: parent.id(),
                project_id,
            }
            .into())
        }
    }

    /// Owning project and references of a new entity are live. Runs again
    /// under the project lock right before insertion.
    pub(crate) fn check_create_references(
        &self,
        entity_type: EntityType,
        changes: &EntityChanges,
    ) -> Result<()> {
        let Some(project_id) = changes.project_id else {
            return Ok(());
        };
        if entity_type != EntityType::Project {
            self.require_live(EntityType::Project, project_id)?;
        }
        self.check_references(entity_type, None, project_id, changes)
    }

    /// Reference checks for one entity in `project_id`.
    pub(crate) fn check_references(
        &self,
        entity_type: EntityType,
        entity_id: Option<EntityId>,
        project_id: EntityId,
        changes: &EntityChanges,
    ) -> Result<()> {
        if entity_type == EntityType::Story
            && let Some(epic_id) = changes.epic_id
        {
            let epic = self.require_live(EntityType::Epic, epic_id)?;
            self.require_same_project(&epic, project_id)?;
        }
        if entity_type == EntityType::Task {
            if let Some(story_id) = changes.story_id {
                let story = self.require_live(EntityType::Story, story_id)?;
                self.require_same_project(&story, project_id)?;
            }
            if let Some(dependencies) = &changes.dependencies {
                self.check_dependencies(entity_id, project_id, dependencies)?;
            }
        }
        if let Some(epic_ids) = &changes.epic_ids {
            for epic_id in epic_ids {
                let epic = self.require_live(EntityType::Epic, *epic_id)?;
                self.require_same_project(&epic, project_id)?;
            }
        }
        Ok(())
    }

    /// Bulk updates span entities in several projects; only existence is
    /// checked up front, per-entity rules run during execution.
    fn check_references_exist(&self, changes: &EntityChanges) -> Result<()> {
        if let Some(epic_id) = changes.epic_id {
            self.require_live(EntityType::Epic, epic_id)?;
        }
        if let Some(story_id) = changes.story_id {
            self.require_live(EntityType::Story, story_id)?;
        }
        for epic_id in changes.epic_ids.iter().flatten() {
            self.require_live(EntityType::Epic, *epic_id)?;
        }
        for task_id in changes.dependencies.iter().flatten() {
            self.require_live(EntityType::Task, *task_id)?;
        }
        Ok(())
    }

    /// Dependencies must be live tasks of the same project, and the graph
    /// must stay acyclic once `task_id` takes `dependencies`.
    pub fn check_dependencies(
        &self,
        task_id: Option<EntityId>,
        project_id: EntityId,
        dependencies: &BTreeSet<EntityId>,
    ) -> Result<()> {
        for dependency in dependencies {
            if Some(*dependency) == task_id {
                return Err(ValidationError::SelfDependency {
                    task_id: *dependency,
                }
                .into());
            }
            let task = self.require_live(EntityType::Task, *dependency)?;
            if task.project_id() != project_id {
                return Err(ValidationError::DependencyOutsideProject {
                    dependency: *dependency,
                    project_id,
                }
                .into());
            }
        }

        let Some(task_id) = task_id else {
            return Ok(());
        };
        let mut graph: HashMap<EntityId, BTreeSet<EntityId>> = self
            .store
            .list(
                EntityType::Task,
                &ListFilter::new(ProjectScope::Project(project_id)),
            )?
            .iter()
            .filter_map(Entity::as_task)
            .map(|t| (t.id, t.dependencies.clone()))
            .collect();
        graph.insert(task_id, dependencies.clone());

        match find_cycle(&graph, task_id) {
            Some(path) => Err(ValidationError::DependencyCycle { path }.into()),
            None => Ok(()),
        }
    }
}

/// Parameters that select rather than change, for QUERY and DELETE.
struct QueryFilters {
    scope: ProjectScope,
    parent: Option<(EntityType, EntityId)>,
    status: Option<Status>,
    priority: Option<Priority>,
}

impl QueryFilters {
    fn from_patch(patch: &FieldPatch, session: &SessionContext) -> Result<Self> {
        let scope = match patch.get(Field::ProjectId) {
            Some(value) => ProjectScope::Project(parse_id(Field::ProjectId, value)?),
            None => session.scope(),
        };
        let parent = match (patch.get(Field::StoryId), patch.get(Field::EpicId)) {
            (Some(story), _) => Some((EntityType::Story, parse_id(Field::StoryId, story)?)),
            (None, Some(epic)) => Some((EntityType::Epic, parse_id(Field::EpicId, epic)?)),
            (None, None) => None,
        };
        let status = patch
            .get(Field::Status)
            .map(parse_status)
            .transpose()?;
        let priority = patch
            .get(Field::Priority)
            .map(parse_priority)
            .transpose()?;
        Ok(Self {
            scope,
            parent,
            status,
            priority,
        })
    }
}

/// Convert supplied parameters to typed changes, rejecting fields the
/// entity type does not have and values outside each field's domain.
fn typed_changes(
    entity_type: EntityType,
    patch: &FieldPatch,
) -> std::result::Result<EntityChanges, ValidationError> {
    let allowed = writable_fields(entity_type);
    let mut changes = EntityChanges::default();

    for (field, value) in patch.supplied() {
        if !allowed.contains(&field) {
            return Err(ValidationError::FieldNotApplicable { field, entity_type });
        }
        match field {
            Field::Name => changes.name = Some(text_of(value)),
            Field::Description => changes.description = Some(text_of(value)),
            Field::Status => changes.status = Some(parse_status(value)?),
            Field::Priority => changes.priority = Some(parse_priority(value)?),
            Field::ProjectId => changes.project_id = Some(parse_id(field, value)?),
            Field::EpicId => changes.epic_id = Some(parse_id(field, value)?),
            Field::StoryId => changes.story_id = Some(parse_id(field, value)?),
            Field::Dependencies => changes.dependencies = Some(parse_ids(field, value)?),
            Field::EpicIds => changes.epic_ids = Some(parse_ids(field, value)?),
            Field::DueDate => {
                let text = text_of(value);
                let date = NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").map_err(|_| {
                    ValidationError::InvalidFieldValue {
                        field,
                        value: text.clone(),
                        expected: "a date as YYYY-MM-DD".to_string(),
                    }
                })?;
                changes.due_date = Some(date);
            }
        }
    }
    Ok(changes)
}

fn text_of(value: &FieldValue) -> String {
    match value {
        FieldValue::Text(s) => s.clone(),
        FieldValue::Id(id) => id.to_string(),
        FieldValue::Ids(ids) => ids
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", "),
        FieldValue::Unset => String::new(),
    }
}

fn invalid(field: Field, value: &FieldValue, expected: impl Into<String>) -> ValidationError {
    ValidationError::InvalidFieldValue {
        field,
        value: text_of(value),
        expected: expected.into(),
    }
}

fn parse_status(value: &FieldValue) -> std::result::Result<Status, ValidationError> {
    text_of(value)
        .parse()
        .map_err(|_| invalid(Field::Status, value, format!("one of {}", Status::VALUES.join(", "))))
}

fn parse_priority(value: &FieldValue) -> std::result::Result<Priority, ValidationError> {
    text_of(value).parse().map_err(|_| {
        invalid(
            Field::Priority,
            value,
            format!("one of {}", Priority::VALUES.join(", ")),
        )
    })
}

fn parse_id(field: Field, value: &FieldValue) -> std::result::Result<EntityId, ValidationError> {
    value
        .as_id()
        .ok_or_else(|| invalid(field, value, "a numeric id"))
}

fn parse_ids(
    field: Field,
    value: &FieldValue,
) -> std::result::Result<BTreeSet<EntityId>, ValidationError> {
    value
        .as_ids()
        .map(|ids| ids.into_iter().collect())
        .ok_or_else(|| invalid(field, value, "a list of numeric ids"))
}
