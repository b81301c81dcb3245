use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info};

use super::aggregator::{ConfidenceAggregator, ConfidenceGate, GateDecision, MinAggregator, weakest};
use super::context::{
    Confidence, Intent, Operation, OperationContext, SessionContext, StageName, StageScore,
};
use super::fast_path::FastPathMatcher;
use super::prompt::PromptBuilder;
use super::stages::{
    EntityTypeClassifier, IdentifierExtractor, IntentClassifier, OperationClassifier,
    ParameterExtractor, StageContext,
};
use crate::capability::CapabilityHandle;
use crate::config::{GenerationConfig, PipelineConfig};
use crate::error::Result;

/// Outcome of interpreting one utterance.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Interpretation {
    Accepted {
        context: OperationContext,
        /// Gating stage scores, in cascade order.
        scores: Vec<StageScore>,
        /// Recorded but never gating.
        parameter_confidence: Option<Confidence>,
        via_fast_path: bool,
    },
    Clarification(Clarification),
    NotACommand {
        intent: Intent,
        confidence: Confidence,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Clarification {
    pub overall: Confidence,
    pub threshold: Confidence,
    pub weakest: Option<StageScore>,
    pub scores: Vec<StageScore>,
    pub message: String,
}

impl Clarification {
    fn new(overall: Confidence, threshold: Confidence, scores: Vec<StageScore>) -> Self {
        let weakest = weakest(&scores);
        let message = match &weakest {
            Some(w) => format!(
                "Not confident enough to act ({} < {}). The {} was unclear ({}); please rephrase.",
                overall,
                threshold,
                describe(w.stage),
                w.confidence
            ),
            None => format!(
                "Not confident enough to act ({} < {}); please rephrase.",
                overall, threshold
            ),
        };
        Self {
            overall,
            threshold,
            weakest,
            scores,
            message,
        }
    }
}

fn describe(stage: StageName) -> &'static str {
    match stage {
        StageName::FastPath => "shortcut match",
        StageName::Intent => "intent",
        StageName::Operation => "operation",
        StageName::EntityType => "entity type",
        StageName::Identifier => "target",
        StageName::Parameters => "field values",
    }
}

/// Fast path, then the classification cascade, then the confidence gate.
///
/// Every stage of one call reads the backend through a single lease taken
/// from the shared handle.
pub struct InterpretationPipeline {
    capability: Arc<CapabilityHandle>,
    prompts: PromptBuilder,
    fast_path: FastPathMatcher,
    aggregator: Arc<dyn ConfidenceAggregator>,
    threshold: RwLock<Confidence>,
    fallback_confidence: f32,
    fast_path_enabled: bool,
}

impl InterpretationPipeline {
    pub fn new(
        capability: Arc<CapabilityHandle>,
        pipeline: &PipelineConfig,
        generation: &GenerationConfig,
    ) -> Self {
        Self {
            capability,
            prompts: PromptBuilder::new(generation),
            fast_path: FastPathMatcher::new(),
            aggregator: Arc::new(MinAggregator),
            threshold: RwLock::new(Confidence::new(pipeline.confidence_threshold)),
            fallback_confidence: pipeline.fallback_confidence,
            fast_path_enabled: pipeline.fast_path_enabled,
        }
    }

    pub fn with_aggregator(mut self, aggregator: Arc<dyn ConfidenceAggregator>) -> Self {
        self.aggregator = aggregator;
        self
    }

    pub fn aggregator_name(&self) -> &str {
        self.aggregator.name()
    }

    pub fn threshold(&self) -> Confidence {
        *self.threshold.read()
    }

    pub fn set_threshold(&self, threshold: f32) {
        let threshold = Confidence::new(threshold);
        *self.threshold.write() = threshold;
        info!(threshold = %threshold, "Confidence threshold updated");
    }

    pub async fn interpret(&self, text: &str, session: &SessionContext) -> Result<Interpretation> {
        let gate = ConfidenceGate::new(self.threshold());

        if self.fast_path_enabled
            && let Some(context) = self.fast_path.try_match(text)
        {
            let scores = vec![StageScore::new(StageName::FastPath, context.confidence)];
            return Ok(self.decide(&gate, context, scores, None, true));
        }

        let lease = self.capability.lease()?;
        debug!(backend = lease.backend_name(), epoch = lease.epoch(), "Running cascade");
        let ctx = StageContext {
            lease: &lease,
            prompts: &self.prompts,
            session,
            fallback_confidence: self.fallback_confidence,
        };
        let mut scores = Vec::with_capacity(4);

        let intent = IntentClassifier.classify(text, &ctx).await?;
        scores.push(StageScore::new(StageName::Intent, intent.confidence));
        if intent.confidence.is_zero() {
            return Ok(self.short_circuit(&gate, scores));
        }
        match intent.label {
            Intent::Command => {}
            Intent::Question => {
                return Ok(Interpretation::NotACommand {
                    intent: intent.label,
                    confidence: intent.confidence,
                });
            }
            Intent::Ambiguous => {
                return Ok(Interpretation::Clarification(Clarification::new(
                    Confidence::ZERO,
                    gate.threshold(),
                    scores,
                )));
            }
        }

        let operation = OperationClassifier.classify(text, &ctx).await?;
        scores.push(StageScore::new(StageName::Operation, operation.confidence));
        let Some(op) = operation.label.filter(|_| !operation.confidence.is_zero()) else {
            return Ok(self.short_circuit(&gate, scores));
        };

        let entity = EntityTypeClassifier.classify(text, op, &ctx).await?;
        scores.push(StageScore::new(StageName::EntityType, entity.confidence));
        let Some(entity_types) = entity.label.filter(|_| !entity.confidence.is_zero()) else {
            return Ok(self.short_circuit(&gate, scores));
        };

        let identifier = if op == Operation::Create {
            None
        } else {
            let outcome = IdentifierExtractor
                .classify(text, op, &entity_types, &ctx)
                .await?;
            scores.push(StageScore::new(StageName::Identifier, outcome.confidence));
            if outcome.confidence.is_zero() {
                return Ok(self.short_circuit(&gate, scores));
            }
            outcome.label
        };

        let (parameters, parameter_confidence) = if op == Operation::Delete {
            (Default::default(), None)
        } else {
            let outcome = ParameterExtractor
                .classify(text, op, &entity_types, &ctx)
                .await?;
            (outcome.label, Some(outcome.confidence))
        };

        let mut context = OperationContext::new(op, entity_types).with_parameters(parameters);
        context.identifier = identifier;
        Ok(self.decide(&gate, context, scores, parameter_confidence, false))
    }

    fn decide(
        &self,
        gate: &ConfidenceGate,
        context: OperationContext,
        scores: Vec<StageScore>,
        parameter_confidence: Option<Confidence>,
        via_fast_path: bool,
    ) -> Interpretation {
        match gate.evaluate(self.aggregator.as_ref(), &scores) {
            GateDecision::Accept { overall } => {
                info!(
                    operation = %context.operation,
                    entity_types = %context.entity_types,
                    overall = %overall,
                    via_fast_path,
                    "Command accepted"
                );
                Interpretation::Accepted {
                    context: context.with_confidence(overall),
                    scores,
                    parameter_confidence,
                    via_fast_path,
                }
            }
            GateDecision::Reject {
                overall, threshold, ..
            } => {
                info!(overall = %overall, threshold = %threshold, "Command needs clarification");
                Interpretation::Clarification(Clarification::new(overall, threshold, scores))
            }
        }
    }

    /// A zero-confidence stage ends the cascade; later stages are not called.
    fn short_circuit(&self, gate: &ConfidenceGate, scores: Vec<StageScore>) -> Interpretation {
        let overall = self.aggregator.aggregate(&scores);
        info!(stages = scores.len(), "Cascade short-circuited");
        Interpretation::Clarification(Clarification::new(overall, gate.threshold(), scores))
    }
}
