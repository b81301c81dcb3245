use serde::Serialize;

use super::context::{Confidence, StageScore};

/// Combines gating stage confidences into one overall score.
pub trait ConfidenceAggregator: Send + Sync {
    fn name(&self) -> &str;

    /// Overall confidence. Must not exceed any input score.
    fn aggregate(&self, scores: &[StageScore]) -> Confidence;
}

/// Conjunctive aggregation: the command is only as certain as its weakest
/// stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinAggregator;

impl ConfidenceAggregator for MinAggregator {
    fn name(&self) -> &str {
        "min"
    }

    fn aggregate(&self, scores: &[StageScore]) -> Confidence {
        scores
            .iter()
            .map(|s| s.confidence)
            .reduce(Confidence::min)
            .unwrap_or(Confidence::ZERO)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GateDecision {
    Accept {
        overall: Confidence,
    },
    Reject {
        overall: Confidence,
        threshold: Confidence,
        /// Lowest-scoring stage.
        weakest: Option<StageScore>,
    },
}

impl GateDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accept { .. })
    }

    pub fn overall(&self) -> Confidence {
        match self {
            Self::Accept { overall } | Self::Reject { overall, .. } => *overall,
        }
    }
}

/// Accepts when `overall >= threshold`.
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceGate {
    threshold: Confidence,
}

impl ConfidenceGate {
    pub fn new(threshold: impl Into<Confidence>) -> Self {
        Self {
            threshold: threshold.into(),
        }
    }

    pub fn threshold(&self) -> Confidence {
        self.threshold
    }

    pub fn evaluate(
        &self,
        aggregator: &dyn ConfidenceAggregator,
        scores: &[StageScore],
    ) -> GateDecision {
        let overall = aggregator.aggregate(scores);
        if overall >= self.threshold {
            GateDecision::Accept { overall }
        } else {
            GateDecision::Reject {
                overall,
                threshold: self.threshold,
                weakest: weakest(scores),
            }
        }
    }
}

pub fn weakest(scores: &[StageScore]) -> Option<StageScore> {
    scores
        .iter()
        .copied()
        .reduce(|a, b| if b.confidence < a.confidence { b } else { a })
}
