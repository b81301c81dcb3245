use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use super::{StageContext, StageOutcome};
use crate::error::Result;
use crate::model::{Field, FieldPatch, FieldValue};
use crate::nlp::context::{EntityTypes, Operation, StageName};
use crate::nlp::structured::scan_labelled;

const FIELD_KEYS: [Field; 10] = [
    Field::Name,
    Field::Description,
    Field::Status,
    Field::Priority,
    Field::ProjectId,
    Field::EpicId,
    Field::StoryId,
    Field::Dependencies,
    Field::EpicIds,
    Field::DueDate,
];

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ParametersReply {
    /// Field name to value; `null` for fields the utterance does not mention.
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
    #[serde(default)]
    pub confidence: Option<f32>,
}

/// Extracts the sparse field map. Its confidence is recorded but does not
/// gate the command.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParameterExtractor;

impl ParameterExtractor {
    pub async fn classify(
        &self,
        text: &str,
        operation: Operation,
        entity_types: &EntityTypes,
        ctx: &StageContext<'_>,
    ) -> Result<StageOutcome<FieldPatch>> {
        let request =
            ctx.prompts
                .parameters::<ParametersReply>(text, operation, entity_types, ctx.session);
        ctx.run(
            StageName::Parameters,
            request,
            |reply: ParametersReply| {
                let object: serde_json::Map<String, Value> = reply.parameters.into_iter().collect();
                Some((FieldPatch::from_json_object(&object), reply.confidence))
            },
            fallback,
            FieldPatch::new(),
        )
        .await
    }
}

fn fallback(raw: &str) -> Option<FieldPatch> {
    let mut patch = FieldPatch::new();
    for field in FIELD_KEYS {
        if let Some(value) = scan_labelled(raw, &[field.as_str()]) {
            patch.set(field, FieldValue::from_json(field, &Value::String(value)));
        }
    }
    (!patch.is_empty()).then_some(patch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nlp::context::SessionContext;
    use crate::nlp::prompt::PromptBuilder;
    use crate::nlp::stages::test_support::lease;

    #[tokio::test]
    async fn test_nulls_become_unset() {
        let lease = lease(
            r#"{"parameters": {"name": "Checkout", "epic_id": 3, "status": null, "due_date": ""}, "confidence": 0.8}"#,
        );
        let prompts = PromptBuilder::default();
        let session = SessionContext::new();
        let ctx = StageContext {
            lease: &lease,
            prompts: &prompts,
            session: &session,
            fallback_confidence: 0.5,
        };
        let outcome = ParameterExtractor
            .classify(
                "add story Checkout to epic 3",
                Operation::Create,
                &EntityTypes::one(crate::model::EntityType::Story),
                &ctx,
            )
            .await
            .unwrap();

        let patch = outcome.label;
        assert_eq!(patch.text(Field::Name), Some("Checkout"));
        assert_eq!(patch.id(Field::EpicId), Some(3));
        assert!(!patch.contains(Field::Status));
        assert!(!patch.contains(Field::DueDate));
    }

    #[test]
    fn test_fallback_scans_known_fields() {
        let patch = fallback("name: Release plan\npriority: high\nowner: sam").unwrap();
        assert_eq!(patch.text(Field::Name), Some("Release plan"));
        assert_eq!(patch.text(Field::Priority), Some("high"));
        assert!(fallback("nothing useful").is_none());
    }
}
