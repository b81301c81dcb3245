use schemars::JsonSchema;
use serde::Deserialize;

use super::{StageContext, StageOutcome, words};
use crate::error::Result;
use crate::model::EntityType;
use crate::nlp::context::{EntityTypes, Operation, StageName};
use crate::nlp::structured::scan_labelled;

/// Accepts a bare string as well as a list; both normalize to a list.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct EntityTypeReply {
    /// Target type first, then scoping parents.
    #[serde(alias = "entity_type")]
    pub entity_types: OneOrMany,
    #[serde(default)]
    pub confidence: Option<f32>,
}

impl EntityTypeReply {
    fn types(self) -> Option<EntityTypes> {
        let words = match self.entity_types {
            OneOrMany::One(word) => vec![word],
            OneOrMany::Many(words) => words,
        };
        EntityTypes::from_vec(
            words
                .iter()
                .filter_map(|w| EntityType::from_word(w))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EntityTypeClassifier;

impl EntityTypeClassifier {
    pub async fn classify(
        &self,
        text: &str,
        operation: Operation,
        ctx: &StageContext<'_>,
    ) -> Result<StageOutcome<Option<EntityTypes>>> {
        let request = ctx.prompts.entity_types::<EntityTypeReply>(text, operation);
        ctx.run(
            StageName::EntityType,
            request,
            |reply: EntityTypeReply| {
                let confidence = reply.confidence;
                Some((Some(reply.types()?), confidence))
            },
            |raw| fallback(raw).map(Some),
            None,
        )
        .await
    }
}

fn fallback(raw: &str) -> Option<EntityTypes> {
    let source = scan_labelled(raw, &["entity_types", "entity_type", "entities"])
        .unwrap_or_else(|| raw.to_string());
    EntityTypes::from_vec(words(&source).filter_map(EntityType::from_word).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nlp::prompt::PromptBuilder;
    use crate::nlp::context::SessionContext;
    use crate::nlp::stages::test_support::lease;

    async fn classify(reply: &'static str) -> StageOutcome<Option<EntityTypes>> {
        let lease = lease(reply);
        let prompts = PromptBuilder::default();
        let session = SessionContext::new();
        let ctx = StageContext {
            lease: &lease,
            prompts: &prompts,
            session: &session,
            fallback_confidence: 0.5,
        };
        EntityTypeClassifier
            .classify("show tasks for epic 5", Operation::Query, &ctx)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_scoped_types_keep_order() {
        let outcome = classify(r#"{"entity_types": ["tasks", "epic"], "confidence": 0.9}"#).await;
        let types = outcome.label.unwrap();
        assert_eq!(types.as_slice(), &[EntityType::Task, EntityType::Epic]);
    }

    #[tokio::test]
    async fn test_singular_field_normalizes_to_list() {
        let outcome = classify(r#"{"entity_type": "story", "confidence": 0.8}"#).await;
        assert_eq!(outcome.label.unwrap().as_slice(), &[EntityType::Story]);
    }

    #[tokio::test]
    async fn test_unknown_types_degrade() {
        let outcome = classify(r#"{"entity_types": ["sprint"], "confidence": 0.9}"#).await;
        assert!(outcome.label.is_none());
        assert!(outcome.is_degraded());
    }
}
