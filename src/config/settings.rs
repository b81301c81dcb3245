use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{Result, WorkError};
use crate::model::DeleteMode;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkConfig {
    pub pipeline: PipelineConfig,
    pub generation: GenerationConfig,
    pub bulk: BulkConfig,
    pub turns: TurnConfig,
    pub store: StoreConfig,
}

impl WorkConfig {
    pub async fn load(work_dir: &Path) -> Result<Self> {
        let config_path = work_dir.join("config.toml");
        let config = if config_path.exists() {
            let content = fs::read_to_string(&config_path).await?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub async fn save(&self, work_dir: &Path) -> Result<()> {
        self.validate()?;
        let config_path = work_dir.join("config.toml");
        let content =
            toml::to_string_pretty(self).map_err(|e| WorkError::Config(e.to_string()))?;
        fs::write(&config_path, content).await?;
        Ok(())
    }

    /// Validate configuration values for consistency and safety.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        let p = &self.pipeline;
        if !(0.0..=1.0).contains(&p.confidence_threshold) {
            errors.push("pipeline.confidence_threshold must be between 0.0 and 1.0");
        }
        if !(0.0..=1.0).contains(&p.fallback_confidence) {
            errors.push("pipeline.fallback_confidence must be between 0.0 and 1.0");
        }

        let g = &self.generation;
        if g.timeout_secs == 0 {
            errors.push("generation.timeout_secs must be greater than 0");
        }
        if g.max_tokens == 0 {
            errors.push("generation.max_tokens must be greater than 0");
        }
        if !(0.0..=2.0).contains(&g.temperature) {
            errors.push("generation.temperature must be between 0.0 and 2.0");
        }
        if g.backend != BackendKind::None && g.model.is_empty() {
            errors.push("generation.model must not be empty when a backend is configured");
        }

        let t = &self.turns;
        if t.budgets.small == 0 || t.budgets.medium == 0 || t.budgets.large == 0 {
            errors.push("turns.budgets must all be greater than 0");
        }
        if t.min_budget == 0 {
            errors.push("turns.min_budget must be greater than 0");
        }
        if t.retry_multiplier < 1 {
            errors.push("turns.retry_multiplier must be at least 1");
        }
        if t.max_budget_scale < 1.0 {
            errors.push("turns.max_budget_scale must be >= 1.0");
        }
        if t.kind_multipliers.iter().any(|m| *m <= 0.0) {
            errors.push("turns.kind_multipliers must all be positive");
        }

        if self.store.persist && self.store.snapshot_file.is_empty() {
            errors.push("store.snapshot_file must not be empty when persist is true");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(WorkError::Config(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Gate threshold τ. Adjustable at runtime through the orchestrator.
    pub confidence_threshold: f32,
    /// Confidence assigned to labels recovered by the keyword fallback when
    /// the generated text does not state one.
    pub fallback_confidence: f32,
    pub fast_path_enabled: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.6,
            fallback_confidence: 0.5,
            fast_path_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Anthropic,
    OpenAi,
    /// No backend; only the fast path can answer.
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub backend: BackendKind,
    /// Endpoint override. Defaults to the vendor endpoint for `backend`.
    pub api_url: Option<String>,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl GenerationConfig {
    pub fn resolved_api_url(&self) -> &str {
        match (&self.api_url, self.backend) {
            (Some(url), _) => url,
            (None, BackendKind::OpenAi) => "https://api.openai.com/v1/chat/completions",
            (None, _) => "https://api.anthropic.com/v1/messages",
        }
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Anthropic,
            api_url: None,
            model: "claude-3-5-haiku-latest".to_string(),
            api_key_env: "LLM_API_KEY".to_string(),
            temperature: 0.0,
            max_tokens: 512,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkConfig {
    pub delete_mode: DeleteMode,
    /// Stop a bulk run at the first per-entity failure instead of collecting
    /// failures and continuing.
    pub abort_on_first_error: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SizeBudgets {
    pub small: u32,
    pub medium: u32,
    pub large: u32,
}

impl Default for SizeBudgets {
    fn default() -> Self {
        Self {
            small: 8,
            medium: 20,
            large: 40,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KindMultipliers {
    pub feature: f32,
    pub bugfix: f32,
    pub refactor: f32,
    pub test: f32,
    pub documentation: f32,
    pub research: f32,
}

impl KindMultipliers {
    pub fn iter(&self) -> impl Iterator<Item = &f32> {
        [
            &self.feature,
            &self.bugfix,
            &self.refactor,
            &self.test,
            &self.documentation,
            &self.research,
        ]
        .into_iter()
    }
}

impl Default for KindMultipliers {
    fn default() -> Self {
        Self {
            feature: 1.0,
            bugfix: 0.75,
            refactor: 1.25,
            test: 0.75,
            documentation: 0.5,
            research: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    pub budgets: SizeBudgets,
    pub kind_multipliers: KindMultipliers,
    pub retry_multiplier: u32,
    pub max_retries: u32,
    /// Let a complexity estimator scale the computed budget. The base budget
    /// is computed either way.
    pub complexity_estimation: bool,
    pub min_budget: u32,
    /// Upper bound on the estimator's scale factor.
    pub max_budget_scale: f32,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            budgets: SizeBudgets::default(),
            kind_multipliers: KindMultipliers::default(),
            retry_multiplier: 3,
            max_retries: 2,
            complexity_estimation: false,
            min_budget: 1,
            max_budget_scale: 4.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub persist: bool,
    pub snapshot_file: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            persist: true,
            snapshot_file: "store.yaml".to_string(),
        }
    }
}

#[derive(Clone)]
pub struct WorkPaths {
    pub root: PathBuf,
    pub work_dir: PathBuf,
    pub config_file: PathBuf,
}

impl WorkPaths {
    pub fn new(root: PathBuf) -> Self {
        let work_dir = root.join(".work-pilot");
        Self {
            config_file: work_dir.join("config.toml"),
            work_dir,
            root,
        }
    }

    pub async fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.work_dir).await?;
        Ok(())
    }

    pub fn snapshot_file(&self, config: &StoreConfig) -> PathBuf {
        self.work_dir.join(&config.snapshot_file)
    }
}
