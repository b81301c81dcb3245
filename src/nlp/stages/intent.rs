use schemars::JsonSchema;
use serde::Deserialize;

use super::{StageContext, StageOutcome, words};
use crate::error::Result;
use crate::nlp::context::{Intent, StageName};
use crate::nlp::structured::scan_labelled;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct IntentReply {
    /// One of `command`, `question`, `ambiguous`.
    pub intent: String,
    #[serde(default)]
    pub confidence: Option<f32>,
}

/// Decides whether the utterance is a command at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntentClassifier;

impl IntentClassifier {
    pub async fn classify(&self, text: &str, ctx: &StageContext<'_>) -> Result<StageOutcome<Intent>> {
        let request = ctx.prompts.intent::<IntentReply>(text, ctx.session);
        ctx.run(
            StageName::Intent,
            request,
            |reply: IntentReply| Some((reply.intent.parse::<Intent>().ok()?, reply.confidence)),
            fallback,
            Intent::Ambiguous,
        )
        .await
    }
}

fn fallback(raw: &str) -> Option<Intent> {
    if let Some(value) = scan_labelled(raw, &["intent"])
        && let Ok(intent) = value.parse()
    {
        return Some(intent);
    }
    words(raw).find_map(|w| match w.to_lowercase().as_str() {
        "command" => Some(Intent::Command),
        "question" => Some(Intent::Question),
        "ambiguous" => Some(Intent::Ambiguous),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nlp::context::SessionContext;
    use crate::nlp::prompt::PromptBuilder;
    use crate::nlp::stages::OutcomeSource;
    use crate::nlp::stages::test_support::lease;

    async fn classify(reply: &'static str) -> StageOutcome<Intent> {
        let lease = lease(reply);
        let prompts = PromptBuilder::default();
        let session = SessionContext::new();
        let ctx = StageContext {
            lease: &lease,
            prompts: &prompts,
            session: &session,
            fallback_confidence: 0.5,
        };
        IntentClassifier.classify("add a task", &ctx).await.unwrap()
    }

    #[tokio::test]
    async fn test_structured_reply() {
        let outcome = classify(r#"{"intent": "command", "confidence": 0.91}"#).await;
        assert_eq!(outcome.label, Intent::Command);
        assert_eq!(outcome.source, OutcomeSource::Structured);
        assert!((outcome.confidence.value() - 0.91).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_keyword_fallback() {
        let outcome = classify("This is clearly a Command. confidence: 0.7").await;
        assert_eq!(outcome.label, Intent::Command);
        assert_eq!(outcome.source, OutcomeSource::Fallback);
        assert!(outcome.parse_error.is_some());
        assert!((outcome.confidence.value() - 0.7).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_garbage_degrades() {
        let outcome = classify("¯\\_(ツ)_/¯").await;
        assert_eq!(outcome.label, Intent::Ambiguous);
        assert!(outcome.is_degraded());
        assert!(outcome.confidence.is_zero());
    }
}
