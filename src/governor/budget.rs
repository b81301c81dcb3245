use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::capability::{CapabilityHandle, GenerationRequest};
use crate::config::TurnConfig;
use crate::error::{Result, WorkError};
use crate::model::Task;
use crate::nlp::parse_structured;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskSize {
    Small,
    Medium,
    Large,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Feature,
    Bugfix,
    Refactor,
    Test,
    Documentation,
    Research,
}

impl TaskKind {
    const KEYWORDS: &'static [(TaskKind, &'static [&'static str])] = &[
        (TaskKind::Bugfix, &["fix", "bug", "crash", "broken", "regression", "error"]),
        (TaskKind::Test, &["test", "tests", "coverage", "spec"]),
        (TaskKind::Documentation, &["doc", "docs", "document", "readme", "changelog"]),
        (TaskKind::Refactor, &["refactor", "cleanup", "rename", "extract", "simplify"]),
        (TaskKind::Research, &["investigate", "research", "spike", "evaluate", "explore"]),
    ];

    fn classify(text: &str) -> Self {
        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();
        Self::KEYWORDS
            .iter()
            .find(|(_, keys)| words.iter().any(|w| keys.contains(&w.as_str())))
            .map(|(kind, _)| *kind)
            .unwrap_or(TaskKind::Feature)
    }
}

/// Size and kind of a task, derived from its text and dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskProfile {
    pub size: TaskSize,
    pub kind: TaskKind,
}

impl TaskProfile {
    pub fn new(size: TaskSize, kind: TaskKind) -> Self {
        Self { size, kind }
    }

    pub fn classify(task: &Task) -> Self {
        let text = format!("{} {}", task.name, task.description.as_deref().unwrap_or(""));
        let word_count = text.split_whitespace().count();
        let size = match (word_count, task.dependencies.len()) {
            (0..=30, 0..=1) => TaskSize::Small,
            (0..=120, 0..=4) => TaskSize::Medium,
            _ => TaskSize::Large,
        };
        Self {
            size,
            kind: TaskKind::classify(&text),
        }
    }
}

impl fmt::Display for TaskProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{:?}", self.size, self.kind)
    }
}

/// Optional refinement of a computed budget. Returns a scale factor.
#[async_trait]
pub trait ComplexityEstimator: Send + Sync {
    fn name(&self) -> &str;

    async fn estimate(&self, task: &Task, profile: TaskProfile) -> Result<f32>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BudgetDecision {
    pub profile: TaskProfile,
    /// Budget from size and kind alone.
    pub base: u32,
    /// Estimator scale actually applied, if any.
    pub scale: Option<f32>,
    pub budget: u32,
}

pub struct TurnBudgetPolicy {
    config: TurnConfig,
}

impl TurnBudgetPolicy {
    pub fn new(config: TurnConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TurnConfig {
        &self.config
    }

    pub fn base_budget(&self, profile: TaskProfile) -> u32 {
        let budgets = &self.config.budgets;
        let base = match profile.size {
            TaskSize::Small => budgets.small,
            TaskSize::Medium => budgets.medium,
            TaskSize::Large => budgets.large,
        };
        let m = &self.config.kind_multipliers;
        let multiplier = match profile.kind {
            TaskKind::Feature => m.feature,
            TaskKind::Bugfix => m.bugfix,
            TaskKind::Refactor => m.refactor,
            TaskKind::Test => m.test,
            TaskKind::Documentation => m.documentation,
            TaskKind::Research => m.research,
        };
        self.floor((base as f32 * multiplier).round())
    }

    /// The base budget is always computed first. The estimator, when enabled
    /// and supplied, can only rescale it; its failure leaves the base as is.
    pub async fn compute(
        &self,
        task: &Task,
        estimator: Option<&dyn ComplexityEstimator>,
    ) -> BudgetDecision {
        let profile = TaskProfile::classify(task);
        let base = self.base_budget(profile);
        let mut decision = BudgetDecision {
            profile,
            base,
            scale: None,
            budget: base,
        };

        if self.config.complexity_estimation
            && let Some(estimator) = estimator
        {
            match estimator.estimate(task, profile).await {
                Ok(scale) => {
                    let scale = self.clamp_scale(scale);
                    decision.scale = Some(scale);
                    decision.budget = self.floor((base as f32 * scale).round());
                }
                Err(e) => warn!(
                    estimator = estimator.name(),
                    error = %e,
                    "Complexity estimation failed, keeping base budget"
                ),
            }
        }

        info!(
            task_id = task.id,
            profile = %profile,
            base,
            budget = decision.budget,
            scale = ?decision.scale,
            "Turn budget computed"
        );
        decision
    }

    fn clamp_scale(&self, scale: f32) -> f32 {
        let max = self.config.max_budget_scale.max(1.0);
        if scale.is_finite() {
            scale.clamp(1.0 / max, max)
        } else {
            1.0
        }
    }

    fn floor(&self, value: f32) -> u32 {
        let min = self.config.min_budget.max(1);
        if value.is_finite() && value >= min as f32 {
            value.min(u32::MAX as f32) as u32
        } else {
            min
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct EstimateReply {
    /// Multiplier for the turn budget; 1.0 keeps it unchanged.
    scale: f32,
    #[serde(default)]
    #[allow(dead_code)]
    reasoning: Option<String>,
}

/// Estimator that asks the shared generative capability for a scale factor.
pub struct GenerativeEstimator {
    capability: Arc<CapabilityHandle>,
    max_tokens: u32,
}

impl GenerativeEstimator {
    pub fn new(capability: Arc<CapabilityHandle>) -> Self {
        Self {
            capability,
            max_tokens: 256,
        }
    }

    fn request(task: &Task, profile: TaskProfile) -> GenerationRequest {
        let schema = serde_json::to_string(&schemars::schema_for!(EstimateReply))
            .unwrap_or_default();
        let prompt = format!(
            "Task: {}\nDescription: {}\nDependencies: {}\nClassified as: {}\n\n\
             Reply with JSON matching this schema:\n{}",
            task.name,
            task.description.as_deref().unwrap_or("(none)"),
            task.dependencies.len(),
            profile,
            schema
        );
        GenerationRequest::new(
            "You estimate how much agent effort a software task needs relative to \
             its classification. Answer with JSON only.",
            prompt,
        )
        .with_temperature(0.0)
    }
}

#[async_trait]
impl ComplexityEstimator for GenerativeEstimator {
    fn name(&self) -> &str {
        "generative"
    }

    async fn estimate(&self, task: &Task, profile: TaskProfile) -> Result<f32> {
        let lease = self.capability.lease()?;
        let request = Self::request(task, profile).with_max_tokens(self.max_tokens);
        let text = lease.generate(&request).await?;
        let reply: EstimateReply = parse_structured(&text)
            .map_err(|e| WorkError::Generation(format!("complexity estimate: {}", e)))?;
        debug!(task_id = task.id, scale = reply.scale, "Complexity estimate");
        Ok(reply.scale)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::model::{EntityMeta, Priority, Status};

    fn task(name: &str, description: Option<&str>, deps: usize) -> Task {
        Task {
            id: 1,
            project_id: 1,
            story_id: None,
            name: name.into(),
            description: description.map(Into::into),
            status: Status::Pending,
            priority: Priority::Medium,
            dependencies: (100..100 + deps as u64).collect::<BTreeSet<_>>(),
            meta: EntityMeta::now(),
        }
    }

    struct Fixed(Result<f32>);

    #[async_trait]
    impl ComplexityEstimator for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn estimate(&self, _task: &Task, _profile: TaskProfile) -> Result<f32> {
            match &self.0 {
                Ok(scale) => Ok(*scale),
                Err(e) => Err(WorkError::Generation(e.to_string())),
            }
        }
    }

    fn policy(estimation: bool) -> TurnBudgetPolicy {
        TurnBudgetPolicy::new(TurnConfig {
            complexity_estimation: estimation,
            ..Default::default()
        })
    }

    #[test]
    fn test_profile_classification() {
        let p = TaskProfile::classify(&task("Fix login crash", None, 0));
        assert_eq!(p, TaskProfile::new(TaskSize::Small, TaskKind::Bugfix));

        let long = "word ".repeat(200);
        let p = TaskProfile::classify(&task("Payment flow", Some(&long), 0));
        assert_eq!(p, TaskProfile::new(TaskSize::Large, TaskKind::Feature));

        let p = TaskProfile::classify(&task("Write README", None, 3));
        assert_eq!(p, TaskProfile::new(TaskSize::Medium, TaskKind::Documentation));
    }

    #[test]
    fn test_base_budget_uses_kind_multiplier() {
        let policy = policy(false);
        assert_eq!(
            policy.base_budget(TaskProfile::new(TaskSize::Medium, TaskKind::Feature)),
            20
        );
        assert_eq!(
            policy.base_budget(TaskProfile::new(TaskSize::Small, TaskKind::Documentation)),
            4
        );
    }

    #[test]
    fn test_base_budget_never_zero() {
        let mut config = TurnConfig::default();
        config.kind_multipliers.documentation = 0.01;
        let policy = TurnBudgetPolicy::new(config);
        assert_eq!(
            policy.base_budget(TaskProfile::new(TaskSize::Small, TaskKind::Documentation)),
            1
        );
    }

    #[tokio::test]
    async fn test_budget_positive_with_and_without_estimation() {
        let t = task("Add export", None, 0);
        let failing = Fixed(Err(WorkError::Generation("down".into())));
        for (estimation, estimator) in [
            (false, None),
            (true, None),
            (true, Some(&failing as &dyn ComplexityEstimator)),
        ] {
            let decision = policy(estimation).compute(&t, estimator).await;
            assert!(decision.budget > 0);
            assert_eq!(decision.budget, decision.base);
        }
    }

    #[tokio::test]
    async fn test_estimator_only_scales() {
        let t = task("Add export", None, 0);
        let doubling = Fixed(Ok(2.0));
        let decision = policy(true).compute(&t, Some(&doubling)).await;
        assert_eq!(decision.base, 8);
        assert_eq!(decision.budget, 16);

        let absurd = Fixed(Ok(1000.0));
        let decision = policy(true).compute(&t, Some(&absurd)).await;
        assert_eq!(decision.scale, Some(4.0));

        let disabled = policy(false).compute(&t, Some(&doubling)).await;
        assert_eq!(disabled.budget, 8);
        assert_eq!(disabled.scale, None);
    }

    #[tokio::test]
    async fn test_generative_estimator_parses_reply() {
        let handle = Arc::new(CapabilityHandle::with_backend(
            Arc::new(crate::nlp::stages::test_support::Canned(
                r#"{"scale": 1.5, "reasoning": "touches two services"}"#,
            )),
            std::time::Duration::from_secs(5),
        ));
        let scale = GenerativeEstimator::new(handle)
            .estimate(&task("Add export", None, 0), TaskProfile::new(TaskSize::Small, TaskKind::Feature))
            .await
            .unwrap();
        assert!((scale - 1.5).abs() < f32::EPSILON);
    }
}
