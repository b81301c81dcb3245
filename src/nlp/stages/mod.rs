//! Classification cascade stages.
//!
//! - `IntentClassifier`: command, question or ambiguous
//! - `OperationClassifier`: CREATE, UPDATE, DELETE or QUERY
//! - `EntityTypeClassifier`: ordered, non-empty entity type set
//! - `IdentifierExtractor`: id, name, bulk marker or none
//! - `ParameterExtractor`: sparse field map
//!
//! Each stage issues exactly one generation call. Output that does not
//! parse goes to a stage-specific keyword fallback; if that fails too the
//! stage degrades to confidence 0 instead of erroring.

mod entity_type;
mod identifier;
mod intent;
mod operation;
mod parameters;

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::context::{Confidence, SessionContext, StageName};
use super::prompt::PromptBuilder;
use super::structured::{ParseError, parse_structured, scan_confidence};
use crate::capability::{CapabilityLease, GenerationRequest};
use crate::error::Result;

pub use entity_type::{EntityTypeClassifier, EntityTypeReply};
pub use identifier::{IdentifierExtractor, IdentifierReply};
pub use intent::{IntentClassifier, IntentReply};
pub use operation::{OperationClassifier, OperationReply};
pub use parameters::{ParameterExtractor, ParametersReply};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeSource {
    Structured,
    Fallback,
    Degraded,
}

/// Result of one stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutcome<L> {
    pub label: L,
    pub confidence: Confidence,
    /// Generated text the label was read from.
    pub raw: String,
    pub source: OutcomeSource,
    /// Set when structured parsing failed, including when the fallback
    /// then recovered a label.
    pub parse_error: Option<ParseError>,
}

impl<L> StageOutcome<L> {
    pub fn is_degraded(&self) -> bool {
        self.source == OutcomeSource::Degraded
    }
}

/// Everything a stage needs for one command. The lease pins one backend
/// for every stage of the command.
pub struct StageContext<'a> {
    pub lease: &'a CapabilityLease,
    pub prompts: &'a PromptBuilder,
    pub session: &'a SessionContext,
    pub fallback_confidence: f32,
}

impl StageContext<'_> {
    pub(crate) async fn run<R, L>(
        &self,
        stage: StageName,
        request: GenerationRequest,
        interpret: impl FnOnce(R) -> Option<(L, Option<f32>)>,
        fallback: impl FnOnce(&str) -> Option<L>,
        degraded: L,
    ) -> Result<StageOutcome<L>>
    where
        R: DeserializeOwned,
    {
        let raw = self.lease.generate(&request).await?;

        let parse_error = match parse_structured::<R>(&raw) {
            Ok(reply) => match interpret(reply) {
                Some((label, confidence)) => {
                    let confidence =
                        Confidence::new(confidence.unwrap_or(self.fallback_confidence));
                    debug!(stage = %stage, confidence = %confidence, "Stage classified");
                    return Ok(StageOutcome {
                        label,
                        confidence,
                        raw,
                        source: OutcomeSource::Structured,
                        parse_error: None,
                    });
                }
                None => ParseError::NonConforming {
                    reason: "label outside the allowed set".to_string(),
                },
            },
            Err(e) => e,
        };

        if let Some(label) = fallback(&raw) {
            let confidence =
                Confidence::new(scan_confidence(&raw).unwrap_or(self.fallback_confidence));
            debug!(stage = %stage, confidence = %confidence, error = %parse_error, "Stage used fallback");
            return Ok(StageOutcome {
                label,
                confidence,
                raw,
                source: OutcomeSource::Fallback,
                parse_error: Some(parse_error),
            });
        }

        warn!(stage = %stage, error = %parse_error, "Stage degraded");
        Ok(StageOutcome {
            label: degraded,
            confidence: Confidence::ZERO,
            raw,
            source: OutcomeSource::Degraded,
            parse_error: Some(parse_error),
        })
    }
}

/// Words of `text` in order, split on anything but letters, digits and `_`.
pub(crate) fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::capability::{CapabilityHandle, CapabilityLease, GenerationRequest, TextGenerator};
    use crate::error::GenerationError;

    /// Replies with the same text to every request.
    pub struct Canned(pub &'static str);

    #[async_trait]
    impl TextGenerator for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        async fn generate(&self, _: &GenerationRequest) -> Result<String, GenerationError> {
            Ok(self.0.to_string())
        }
    }

    pub fn lease(reply: &'static str) -> CapabilityLease {
        CapabilityHandle::with_backend(Arc::new(Canned(reply)), Duration::from_secs(5))
            .lease()
            .unwrap()
    }
}
