use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::EntityId;

/// Writable entity fields addressable from a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Name,
    Description,
    Status,
    Priority,
    ProjectId,
    EpicId,
    StoryId,
    Dependencies,
    EpicIds,
    DueDate,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Description => "description",
            Self::Status => "status",
            Self::Priority => "priority",
            Self::ProjectId => "project_id",
            Self::EpicId => "epic_id",
            Self::StoryId => "story_id",
            Self::Dependencies => "dependencies",
            Self::EpicIds => "epic_ids",
            Self::DueDate => "due_date",
        }
    }

    /// Accepts the canonical key plus the aliases generators commonly emit.
    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "name" | "title" => Some(Self::Name),
            "description" | "desc" | "details" => Some(Self::Description),
            "status" | "state" => Some(Self::Status),
            "priority" => Some(Self::Priority),
            "project_id" | "project" => Some(Self::ProjectId),
            "epic_id" | "epic" => Some(Self::EpicId),
            "story_id" | "story" => Some(Self::StoryId),
            "dependencies" | "depends_on" | "dependency_ids" => Some(Self::Dependencies),
            "epic_ids" | "epics" => Some(Self::EpicIds),
            "due_date" | "due" | "target_date" => Some(Self::DueDate),
            _ => None,
        }
    }

    pub fn is_id_list(&self) -> bool {
        matches!(self, Self::Dependencies | Self::EpicIds)
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Self::ProjectId | Self::EpicId | Self::StoryId)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single parameter value. `Unset` marks a field the utterance did not
/// mention; it is never written to an entity.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    #[default]
    Unset,
    Text(String),
    Id(EntityId),
    Ids(Vec<EntityId>),
}

impl FieldValue {
    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_id(&self) -> Option<EntityId> {
        match self {
            Self::Id(id) => Some(*id),
            Self::Text(s) => s.trim().trim_start_matches('#').parse().ok(),
            _ => None,
        }
    }

    pub fn as_ids(&self) -> Option<Vec<EntityId>> {
        match self {
            Self::Ids(ids) => Some(ids.clone()),
            Self::Id(id) => Some(vec![*id]),
            Self::Text(s) => s
                .split([',', ' '])
                .filter(|part| !part.trim().is_empty())
                .map(|part| part.trim().trim_start_matches('#').parse().ok())
                .collect(),
            Self::Unset => None,
        }
    }

    /// Convert a generated JSON value for `field`. `null`, empty strings and
    /// shapes that cannot be typed become `Unset`, so a missing optional field
    /// never reaches typed validation as a bogus value.
    pub fn from_json(field: Field, value: &Value) -> Self {
        match value {
            Value::Null => Self::Unset,
            Value::String(s) if s.trim().is_empty() => Self::Unset,
            Value::String(s) if is_null_word(s) => Self::Unset,
            Value::String(s) => Self::Text(s.trim().to_string()),
            Value::Number(n) => match n.as_u64() {
                Some(id) if field.is_id_list() => Self::Ids(vec![id]),
                Some(id) => Self::Id(id),
                None => Self::Text(n.to_string()),
            },
            Value::Array(items) => {
                let ids: Option<Vec<EntityId>> = items
                    .iter()
                    .map(|item| match item {
                        Value::Number(n) => n.as_u64(),
                        Value::String(s) => s.trim().trim_start_matches('#').parse().ok(),
                        _ => None,
                    })
                    .collect();
                match ids {
                    Some(ids) if !ids.is_empty() => Self::Ids(ids),
                    Some(_) => Self::Unset,
                    None => {
                        debug!(field = %field, "Dropping non-numeric list value");
                        Self::Unset
                    }
                }
            }
            Value::Bool(_) | Value::Object(_) => Self::Unset,
        }
    }
}

fn is_null_word(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "null" | "none" | "n/a" | "unset" | "unknown"
    )
}

/// Sparse field map. Only supplied (non-`Unset`) fields are applied.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FieldPatch {
    fields: BTreeMap<Field, FieldValue>,
}

impl FieldPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: Field, value: FieldValue) -> Self {
        self.set(field, value);
        self
    }

    pub fn with_text(self, field: Field, value: impl Into<String>) -> Self {
        self.with(field, FieldValue::Text(value.into()))
    }

    pub fn with_id(self, field: Field, id: EntityId) -> Self {
        self.with(field, FieldValue::Id(id))
    }

    pub fn set(&mut self, field: Field, value: FieldValue) {
        self.fields.insert(field, value);
    }

    /// Value for `field` if supplied. `Unset` reads as absent.
    pub fn get(&self, field: Field) -> Option<&FieldValue> {
        self.fields.get(&field).filter(|v| !v.is_unset())
    }

    pub fn text(&self, field: Field) -> Option<&str> {
        self.get(field).and_then(FieldValue::as_text)
    }

    pub fn id(&self, field: Field) -> Option<EntityId> {
        self.get(field).and_then(FieldValue::as_id)
    }

    pub fn ids(&self, field: Field) -> Option<Vec<EntityId>> {
        self.get(field).and_then(FieldValue::as_ids)
    }

    pub fn contains(&self, field: Field) -> bool {
        self.get(field).is_some()
    }

    pub fn supplied(&self) -> impl Iterator<Item = (Field, &FieldValue)> {
        self.fields
            .iter()
            .filter(|(_, v)| !v.is_unset())
            .map(|(f, v)| (*f, v))
    }

    pub fn is_empty(&self) -> bool {
        self.supplied().next().is_none()
    }

    /// Build from a generated JSON object. Unknown keys are dropped.
    pub fn from_json_object(object: &serde_json::Map<String, Value>) -> Self {
        let mut patch = Self::new();
        for (key, value) in object {
            match Field::from_key(key) {
                Some(field) => patch.set(field, FieldValue::from_json(field, value)),
                None => debug!(key = %key, "Ignoring unknown parameter key"),
            }
        }
        patch
    }
}
