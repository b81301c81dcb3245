use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use super::{StageContext, StageOutcome};
use crate::error::Result;
use crate::nlp::context::{EntityTypes, Identifier, Operation, StageName};
use crate::nlp::structured::scan_labelled;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct IdentifierReply {
    /// One of `id`, `name`, `all`, `none`.
    pub kind: String,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub confidence: Option<f32>,
}

impl IdentifierReply {
    /// `None` when the reply is malformed; `Some(None)` for an explicit
    /// "no identifier".
    fn identifier(&self) -> Option<Option<Identifier>> {
        let value_text = match &self.value {
            Some(Value::String(s)) => Some(s.trim().to_string()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        match self.kind.trim().to_lowercase().as_str() {
            "id" => {
                let id = value_text?.trim_start_matches('#').parse().ok()?;
                Some(Some(Identifier::Id(id)))
            }
            "name" => {
                let name = value_text.filter(|s| !s.is_empty())?;
                Some(Some(Identifier::Name(name)))
            }
            "all" | "bulk" => Some(Some(Identifier::All)),
            "none" | "null" => Some(None),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IdentifierExtractor;

impl IdentifierExtractor {
    pub async fn classify(
        &self,
        text: &str,
        operation: Operation,
        entity_types: &EntityTypes,
        ctx: &StageContext<'_>,
    ) -> Result<StageOutcome<Option<Identifier>>> {
        let request = ctx
            .prompts
            .identifier::<IdentifierReply>(text, operation, entity_types);
        ctx.run(
            StageName::Identifier,
            request,
            |reply: IdentifierReply| Some((reply.identifier()?, reply.confidence)),
            fallback,
            None,
        )
        .await
    }
}

fn fallback(raw: &str) -> Option<Option<Identifier>> {
    let value = scan_labelled(raw, &["identifier", "id", "value"])?;
    Some(Identifier::parse(&value))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn reply(kind: &str, value: Value) -> IdentifierReply {
        IdentifierReply {
            kind: kind.into(),
            value: Some(value),
            confidence: Some(0.9),
        }
    }

    #[test]
    fn test_reply_kinds() {
        assert_eq!(
            reply("id", json!(12)).identifier(),
            Some(Some(Identifier::Id(12)))
        );
        assert_eq!(
            reply("id", json!("#7")).identifier(),
            Some(Some(Identifier::Id(7)))
        );
        assert_eq!(
            reply("name", json!("Billing")).identifier(),
            Some(Some(Identifier::Name("Billing".into())))
        );
        assert_eq!(
            reply("ALL", Value::Null).identifier(),
            Some(Some(Identifier::All))
        );
        assert_eq!(reply("none", Value::Null).identifier(), Some(None));
        assert_eq!(reply("id", json!("twelve")).identifier(), None);
        assert_eq!(reply("guess", json!(1)).identifier(), None);
    }

    #[test]
    fn test_fallback() {
        assert_eq!(fallback("identifier: 42"), Some(Some(Identifier::Id(42))));
        assert_eq!(fallback("identifier: all"), Some(Some(Identifier::All)));
        assert_eq!(fallback("nothing"), None);
    }
}
