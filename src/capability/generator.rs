use async_trait::async_trait;

use crate::error::GenerationError;

/// One generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stop: Vec<String>,
}

impl GenerationRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            temperature: 0.0,
            max_tokens: 512,
            stop: Vec::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_stop(mut self, stop: &[&str]) -> Self {
        self.stop = stop.iter().map(|s| s.to_string()).collect();
        self
    }
}

/// Text-in, text-out generation backend.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Stable backend name, used in logs and prompt selection.
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;

    /// Cheap readiness check run before a backend is switched in.
    async fn probe(&self) -> Result<(), GenerationError> {
        Ok(())
    }
}
