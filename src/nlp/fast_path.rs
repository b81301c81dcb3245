use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use super::context::{Confidence, EntityTypes, Identifier, Operation, OperationContext};
use crate::model::EntityType;

/// Confidence attached to every fast-path match.
pub const FAST_PATH_CONFIDENCE: f32 = 0.95;

fn list_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:list(?:\s+all)?|show\s+all|get\s+all)\s+([a-z]+)\s*[.!?]?\s*$")
            .unwrap()
    })
}

fn lookup_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:get|show)\s+([a-z]+)\s+(?:#|id\s+|number\s+)?(\d+)\s*[.!?]?\s*$")
            .unwrap()
    })
}

/// Deterministic matcher for a small fixed vocabulary of read commands.
///
/// Recognizes `list <entity>`, `show all <entity>`, `get <entity> <id>` and
/// `show <entity> <id>`, case-insensitively, singular or plural. Anything
/// else returns `None` and goes to the classification cascade.
#[derive(Debug, Clone, Copy, Default)]
pub struct FastPathMatcher;

impl FastPathMatcher {
    pub fn new() -> Self {
        Self
    }

    pub fn try_match(&self, text: &str) -> Option<OperationContext> {
        if let Some(caps) = lookup_pattern().captures(text) {
            let entity_type = EntityType::from_word(&caps[1])?;
            // Out-of-range ids fall through to the cascade.
            let id = caps[2].parse().ok()?;
            debug!(entity_type = %entity_type, id, "Fast path lookup");
            return Some(Self::query(entity_type, Identifier::Id(id)));
        }

        if let Some(caps) = list_pattern().captures(text) {
            let entity_type = EntityType::from_word(&caps[1])?;
            debug!(entity_type = %entity_type, "Fast path list");
            return Some(Self::query(entity_type, Identifier::All));
        }

        None
    }

    fn query(entity_type: EntityType, identifier: Identifier) -> OperationContext {
        OperationContext::new(Operation::Query, EntityTypes::one(entity_type))
            .with_identifier(identifier)
            .with_confidence(Confidence::new(FAST_PATH_CONFIDENCE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> FastPathMatcher {
        FastPathMatcher::new()
    }

    #[test]
    fn test_list_forms() {
        for text in ["list tasks", "LIST ALL Projects", "show all epics", "list story."] {
            let ctx = matcher().try_match(text).unwrap_or_else(|| panic!("{text}"));
            assert_eq!(ctx.operation, Operation::Query);
            assert_eq!(ctx.identifier, Some(Identifier::All));
            assert_eq!(ctx.entity_types.len(), 1);
        }
    }

    #[test]
    fn test_lookup_forms() {
        let ctx = matcher().try_match("get task 12").unwrap();
        assert_eq!(ctx.entity_types.target(), EntityType::Task);
        assert_eq!(ctx.identifier, Some(Identifier::Id(12)));

        let ctx = matcher().try_match("Show Milestone #3").unwrap();
        assert_eq!(ctx.entity_types.target(), EntityType::Milestone);
        assert_eq!(ctx.identifier, Some(Identifier::Id(3)));
    }

    #[test]
    fn test_confidence_is_constant() {
        let ctx = matcher().try_match("list epics").unwrap();
        assert!(ctx.confidence.value() >= FAST_PATH_CONFIDENCE);
    }

    #[test]
    fn test_non_matches() {
        for text in [
            "",
            "list",
            "list sprints",
            "create a task called list tasks",
            "show tasks for epic 5",
            "get task 99999999999999999999999",
            "delete all projects",
            "\u{0}\u{ffff}",
        ] {
            assert!(matcher().try_match(text).is_none(), "{text:?}");
        }
    }
}
