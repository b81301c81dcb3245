//! HTTP generation backend for Anthropic and OpenAI-compatible APIs.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{GenerationRequest, TextGenerator};
use crate::config::{BackendKind, GenerationConfig};
use crate::error::GenerationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFormat {
    Anthropic,
    OpenAi,
}

pub struct HttpGenerator {
    client: Client,
    name: String,
    api_key: String,
    api_url: String,
    model: String,
    api_format: ApiFormat,
}

impl HttpGenerator {
    pub fn new(api_key: String, api_url: String, model: String, api_format: ApiFormat) -> Self {
        let name = match api_format {
            ApiFormat::Anthropic => format!("anthropic:{}", model),
            ApiFormat::OpenAi => format!("openai:{}", model),
        };
        Self {
            client: Client::new(),
            name,
            api_key,
            api_url,
            model,
            api_format,
        }
    }

    /// Build from configuration, reading the key from `api_key_env`.
    pub fn from_config(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let api_format = match config.backend {
            BackendKind::Anthropic => ApiFormat::Anthropic,
            BackendKind::OpenAi => ApiFormat::OpenAi,
            BackendKind::None => {
                return Err(GenerationError::Unavailable(
                    "no generation backend configured".to_string(),
                ));
            }
        };
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            GenerationError::Unavailable(format!("{} not set", config.api_key_env))
        })?;
        Ok(Self::new(
            api_key,
            config.resolved_api_url().to_string(),
            config.model.clone(),
            api_format,
        ))
    }

    async fn complete_anthropic(
        &self,
        request: &GenerationRequest,
    ) -> Result<String, GenerationError> {
        let body = AnthropicRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: &request.system,
            stop_sequences: &request.stop,
            messages: vec![Message {
                role: "user",
                content: &request.prompt,
            }],
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GenerationError::from_message(&format!(
                "{} {}",
                status, error_text
            )));
        }

        let completion: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        completion
            .content
            .into_iter()
            .find_map(|c| c.text)
            .ok_or_else(|| GenerationError::InvalidResponse("empty response".into()))
    }

    async fn complete_openai(
        &self,
        request: &GenerationRequest,
    ) -> Result<String, GenerationError> {
        let body = OpenAiRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stop: (!request.stop.is_empty()).then_some(&request.stop),
            messages: vec![
                Message {
                    role: "system",
                    content: &request.system,
                },
                Message {
                    role: "user",
                    content: &request.prompt,
                },
            ],
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GenerationError::from_message(&format!(
                "{} {}",
                status, error_text
            )));
        }

        let completion: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| GenerationError::InvalidResponse("empty response".into()))
    }
}

fn transport_error(e: reqwest::Error) -> GenerationError {
    if e.is_timeout() {
        GenerationError::Timeout { duration_secs: 0 }
    } else {
        GenerationError::Connection(e.to_string())
    }
}

#[async_trait]
impl TextGenerator for HttpGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        debug!(
            backend = %self.name,
            prompt_len = request.prompt.len(),
            "Sending generation request"
        );
        match self.api_format {
            ApiFormat::Anthropic => self.complete_anthropic(request).await,
            ApiFormat::OpenAi => self.complete_openai(request).await,
        }
    }
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    stop_sequences: &'a [String],
    messages: Vec<Message<'a>>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a Vec<String>>,
    messages: Vec<Message<'a>>,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}
