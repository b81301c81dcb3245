use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub type EntityId = u64;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Project,
    Epic,
    Story,
    Task,
    Milestone,
}

impl EntityType {
    pub const ALL: [EntityType; 5] = [
        Self::Project,
        Self::Epic,
        Self::Story,
        Self::Task,
        Self::Milestone,
    ];

    /// Children before parents. Milestones reference epics, so they go
    /// after them but before the owning project.
    pub const DELETION_ORDER: [EntityType; 5] = [
        Self::Task,
        Self::Story,
        Self::Epic,
        Self::Milestone,
        Self::Project,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Epic => "epic",
            Self::Story => "story",
            Self::Task => "task",
            Self::Milestone => "milestone",
        }
    }

    pub fn plural(&self) -> &'static str {
        match self {
            Self::Project => "projects",
            Self::Epic => "epics",
            Self::Story => "stories",
            Self::Task => "tasks",
            Self::Milestone => "milestones",
        }
    }

    /// Types that can name this one as their direct parent. A cascade
    /// reaches deeper descendants through these.
    pub fn dependents(&self) -> &'static [EntityType] {
        match self {
            Self::Project => &[Self::Task, Self::Epic, Self::Milestone],
            Self::Epic => &[Self::Story],
            Self::Story => &[Self::Task],
            Self::Task | Self::Milestone => &[],
        }
    }

    /// Parse singular or plural words, case-insensitive.
    pub fn from_word(word: &str) -> Option<Self> {
        match word.trim().to_lowercase().as_str() {
            "project" | "projects" => Some(Self::Project),
            "epic" | "epics" => Some(Self::Epic),
            "story" | "stories" => Some(Self::Story),
            "task" | "tasks" => Some(Self::Task),
            "milestone" | "milestones" => Some(Self::Milestone),
            _ => None,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Pending,
    InProgress,
    Blocked,
    Completed,
    Cancelled,
}

impl Status {
    pub const VALUES: &'static [&'static str] =
        &["pending", "in_progress", "blocked", "completed", "cancelled"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Blocked => "blocked",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl FromStr for Status {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "pending" | "todo" | "open" => Ok(Self::Pending),
            "in_progress" | "active" | "started" => Ok(Self::InProgress),
            "blocked" => Ok(Self::Blocked),
            "completed" | "done" | "complete" => Ok(Self::Completed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    pub const VALUES: &'static [&'static str] = &["low", "medium", "high", "critical"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl FromStr for Priority {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" | "p3" => Ok(Self::Low),
            "medium" | "normal" | "p2" => Ok(Self::Medium),
            "high" | "p1" => Ok(Self::High),
            "critical" | "urgent" | "p0" => Ok(Self::Critical),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bookkeeping shared by every entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMeta {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set by soft deletion. Soft-deleted entities stay in the store but are
    /// invisible to lists and parent checks.
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl EntityMeta {
    pub fn now() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Status,
    pub meta: EntityMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Epic {
    pub id: EntityId,
    pub project_id: EntityId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub priority: Priority,
    pub meta: EntityMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub id: EntityId,
    pub project_id: EntityId,
    pub epic_id: EntityId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub priority: Priority,
    pub meta: EntityMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: EntityId,
    pub project_id: EntityId,
    #[serde(default)]
    pub story_id: Option<EntityId>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub dependencies: BTreeSet<EntityId>,
    pub meta: EntityMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub id: EntityId,
    pub project_id: EntityId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub epic_ids: BTreeSet<EntityId>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    pub meta: EntityMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity_type", rename_all = "snake_case")]
pub enum Entity {
    Project(Project),
    Epic(Epic),
    Story(Story),
    Task(Task),
    Milestone(Milestone),
}

impl Entity {
    pub fn id(&self) -> EntityId {
        match self {
            Self::Project(e) => e.id,
            Self::Epic(e) => e.id,
            Self::Story(e) => e.id,
            Self::Task(e) => e.id,
            Self::Milestone(e) => e.id,
        }
    }

    pub fn entity_type(&self) -> EntityType {
        match self {
            Self::Project(_) => EntityType::Project,
            Self::Epic(_) => EntityType::Epic,
            Self::Story(_) => EntityType::Story,
            Self::Task(_) => EntityType::Task,
            Self::Milestone(_) => EntityType::Milestone,
        }
    }

    /// Owning project. A project is its own scope.
    pub fn project_id(&self) -> EntityId {
        match self {
            Self::Project(e) => e.id,
            Self::Epic(e) => e.project_id,
            Self::Story(e) => e.project_id,
            Self::Task(e) => e.project_id,
            Self::Milestone(e) => e.project_id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Project(e) => &e.name,
            Self::Epic(e) => &e.name,
            Self::Story(e) => &e.name,
            Self::Task(e) => &e.name,
            Self::Milestone(e) => &e.name,
        }
    }

    pub fn status(&self) -> Status {
        match self {
            Self::Project(e) => e.status,
            Self::Epic(e) => e.status,
            Self::Story(e) => e.status,
            Self::Task(e) => e.status,
            Self::Milestone(e) => e.status,
        }
    }

    pub fn priority(&self) -> Option<Priority> {
        match self {
            Self::Epic(e) => Some(e.priority),
            Self::Story(e) => Some(e.priority),
            Self::Task(e) => Some(e.priority),
            Self::Project(_) | Self::Milestone(_) => None,
        }
    }

    pub fn meta(&self) -> &EntityMeta {
        match self {
            Self::Project(e) => &e.meta,
            Self::Epic(e) => &e.meta,
            Self::Story(e) => &e.meta,
            Self::Task(e) => &e.meta,
            Self::Milestone(e) => &e.meta,
        }
    }

    pub fn meta_mut(&mut self) -> &mut EntityMeta {
        match self {
            Self::Project(e) => &mut e.meta,
            Self::Epic(e) => &mut e.meta,
            Self::Story(e) => &mut e.meta,
            Self::Task(e) => &mut e.meta,
            Self::Milestone(e) => &mut e.meta,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.meta().deleted_at.is_some()
    }

    /// Direct parent reference used for orphan checks and scoped queries.
    pub fn parent(&self) -> Option<(EntityType, EntityId)> {
        match self {
            Self::Project(_) => None,
            Self::Epic(e) => Some((EntityType::Project, e.project_id)),
            Self::Story(e) => Some((EntityType::Epic, e.epic_id)),
            Self::Task(e) => match e.story_id {
                Some(story_id) => Some((EntityType::Story, story_id)),
                None => Some((EntityType::Project, e.project_id)),
            },
            Self::Milestone(e) => Some((EntityType::Project, e.project_id)),
        }
    }

    /// Whether this entity sits beneath `(parent_type, parent_id)` in the
    /// hierarchy. Tasks without a story only relate to their project, and a
    /// task relates to an epic only through its story, which needs a store
    /// lookup (see `ListFilter::within_stories`).
    pub fn belongs_to(&self, parent_type: EntityType, parent_id: EntityId) -> bool {
        match (self, parent_type) {
            (_, EntityType::Project) => self.project_id() == parent_id,
            (Self::Story(s), EntityType::Epic) => s.epic_id == parent_id,
            (Self::Task(t), EntityType::Story) => t.story_id == Some(parent_id),
            (Self::Milestone(m), EntityType::Epic) => m.epic_ids.contains(&parent_id),
            _ => false,
        }
    }

    pub fn as_task(&self) -> Option<&Task> {
        match self {
            Self::Task(t) => Some(t),
            _ => None,
        }
    }
}
