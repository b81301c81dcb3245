use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::model::{EntityId, EntityType, FieldPatch, ProjectScope};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Command,
    Question,
    Ambiguous,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::Question => "question",
            Self::Ambiguous => "ambiguous",
        }
    }
}

impl FromStr for Intent {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "command" | "instruction" | "action" => Ok(Self::Command),
            "question" | "query_question" | "chat" => Ok(Self::Question),
            "ambiguous" | "unclear" | "unknown" => Ok(Self::Ambiguous),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    Create,
    Update,
    Delete,
    Query,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Query => "QUERY",
        }
    }

    pub fn mutates(&self) -> bool {
        !matches!(self, Self::Query)
    }
}

impl FromStr for Operation {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "create" | "add" | "new" | "make" => Ok(Self::Create),
            "update" | "edit" | "modify" | "change" | "set" | "rename" => Ok(Self::Update),
            "delete" | "remove" | "drop" | "destroy" => Ok(Self::Delete),
            "query" | "list" | "show" | "get" | "find" | "read" => Ok(Self::Query),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a command targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Identifier {
    Id(EntityId),
    Name(String),
    /// Bulk marker: every entity of the type in scope.
    All,
}

impl Identifier {
    /// Parse a generated identifier. Bulk words map to `All`, digits
    /// (optionally prefixed with `#`) to `Id`, anything else to `Name`.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim().trim_matches('"');
        if trimmed.is_empty() {
            return None;
        }
        let lower = trimmed.to_lowercase();
        if matches!(lower.as_str(), "none" | "null" | "n/a") {
            return None;
        }
        if matches!(lower.as_str(), "all" | "*" | "every" | "everything") {
            return Some(Self::All);
        }
        match trimmed.trim_start_matches('#').parse() {
            Ok(id) => Some(Self::Id(id)),
            Err(_) => Some(Self::Name(trimmed.to_string())),
        }
    }

    pub fn is_bulk(&self) -> bool {
        matches!(self, Self::All)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "#{}", id),
            Self::Name(name) => write!(f, "\"{}\"", name),
            Self::All => f.write_str("ALL"),
        }
    }
}

/// Non-empty ordered set of entity types. The first element is the target
/// type; the rest scope it (`[task, epic]` = tasks beneath an epic).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<EntityType>", into = "Vec<EntityType>")]
pub struct EntityTypes(Vec<EntityType>);

impl EntityTypes {
    pub fn one(target: EntityType) -> Self {
        Self(vec![target])
    }

    pub fn scoped(target: EntityType, scope: EntityType) -> Self {
        Self::from_vec(vec![target, scope]).unwrap_or_else(|| Self::one(target))
    }

    /// Drops duplicates keeping first occurrence. `None` when empty.
    pub fn from_vec(types: Vec<EntityType>) -> Option<Self> {
        let mut ordered = Vec::with_capacity(types.len());
        for t in types {
            if !ordered.contains(&t) {
                ordered.push(t);
            }
        }
        (!ordered.is_empty()).then_some(Self(ordered))
    }

    pub fn target(&self) -> EntityType {
        self.0[0]
    }

    /// The nearest scoping parent, if any.
    pub fn scope(&self) -> Option<EntityType> {
        self.0.get(1).copied()
    }

    pub fn as_slice(&self) -> &[EntityType] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl TryFrom<Vec<EntityType>> for EntityTypes {
    type Error = String;

    fn try_from(types: Vec<EntityType>) -> Result<Self, Self::Error> {
        Self::from_vec(types).ok_or_else(|| "entity_types must not be empty".to_string())
    }
}

impl From<EntityTypes> for Vec<EntityType> {
    fn from(types: EntityTypes) -> Self {
        types.0
    }
}

impl fmt::Display for EntityTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(|t| t.as_str()).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

/// Score in `[0, 1]`. Out-of-range and NaN inputs are clamped.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(from = "f32", into = "f32")]
pub struct Confidence(f32);

impl Confidence {
    pub const ZERO: Confidence = Confidence(0.0);
    pub const CERTAIN: Confidence = Confidence(1.0);

    pub fn new(value: f32) -> Self {
        if value.is_nan() {
            return Self::ZERO;
        }
        Self(value.clamp(0.0, 1.0))
    }

    pub fn value(&self) -> f32 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 <= 0.0
    }

    pub fn min(self, other: Self) -> Self {
        if other.0 < self.0 { other } else { self }
    }
}

impl From<f32> for Confidence {
    fn from(value: f32) -> Self {
        Self::new(value)
    }
}

impl From<Confidence> for f32 {
    fn from(c: Confidence) -> Self {
        c.0
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// A fully interpreted command, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationContext {
    pub operation: Operation,
    pub entity_types: EntityTypes,
    /// Absent for CREATE.
    pub identifier: Option<Identifier>,
    pub parameters: FieldPatch,
    pub confidence: Confidence,
}

impl OperationContext {
    pub fn new(operation: Operation, entity_types: EntityTypes) -> Self {
        Self {
            operation,
            entity_types,
            identifier: None,
            parameters: FieldPatch::new(),
            confidence: Confidence::CERTAIN,
        }
    }

    pub fn with_identifier(mut self, identifier: Identifier) -> Self {
        self.identifier = Some(identifier);
        self
    }

    pub fn with_parameters(mut self, parameters: FieldPatch) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_confidence(mut self, confidence: Confidence) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn is_bulk(&self) -> bool {
        self.identifier.as_ref().is_some_and(Identifier::is_bulk)
    }
}

/// Conversation state passed into every pipeline call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    pub current_project: Option<EntityId>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_project(project_id: EntityId) -> Self {
        Self {
            current_project: Some(project_id),
        }
    }

    /// The selected project, or every project when none is selected.
    pub fn scope(&self) -> ProjectScope {
        match self.current_project {
            Some(id) => ProjectScope::Project(id),
            None => ProjectScope::AllProjects,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    FastPath,
    Intent,
    Operation,
    EntityType,
    Identifier,
    Parameters,
}

impl StageName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FastPath => "fast_path",
            Self::Intent => "intent",
            Self::Operation => "operation",
            Self::EntityType => "entity_type",
            Self::Identifier => "identifier",
            Self::Parameters => "parameters",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageScore {
    pub stage: StageName,
    pub confidence: Confidence,
}

impl StageScore {
    pub fn new(stage: StageName, confidence: impl Into<Confidence>) -> Self {
        Self {
            stage,
            confidence: confidence.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_clamps() {
        assert_eq!(Confidence::new(1.7).value(), 1.0);
        assert_eq!(Confidence::new(-0.2).value(), 0.0);
        assert_eq!(Confidence::new(f32::NAN), Confidence::ZERO);
    }

    #[test]
    fn test_confidence_deserializes_clamped() {
        let c: Confidence = serde_json::from_str("3.5").unwrap();
        assert_eq!(c, Confidence::CERTAIN);
    }

    #[test]
    fn test_entity_types_never_empty() {
        assert!(EntityTypes::from_vec(vec![]).is_none());
        assert!(serde_json::from_str::<EntityTypes>("[]").is_err());

        let types = EntityTypes::from_vec(vec![
            EntityType::Task,
            EntityType::Epic,
            EntityType::Task,
        ])
        .unwrap();
        assert_eq!(types.as_slice(), &[EntityType::Task, EntityType::Epic]);
        assert_eq!(types.target(), EntityType::Task);
        assert_eq!(types.scope(), Some(EntityType::Epic));
    }

    #[test]
    fn test_identifier_parse() {
        assert_eq!(Identifier::parse("#42"), Some(Identifier::Id(42)));
        assert_eq!(Identifier::parse("ALL"), Some(Identifier::All));
        assert_eq!(
            Identifier::parse("Login page"),
            Some(Identifier::Name("Login page".into()))
        );
        assert_eq!(Identifier::parse("null"), None);
        assert_eq!(Identifier::parse("  "), None);
    }

    #[test]
    fn test_session_scope_is_explicit() {
        assert_eq!(SessionContext::new().scope(), ProjectScope::AllProjects);
        assert_eq!(
            SessionContext::for_project(3).scope(),
            ProjectScope::Project(3)
        );
    }
}
