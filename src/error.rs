
use thiserror::Error;

use crate::command::ValidationError;
use crate::model::StoreError;

/// Failure talking to a generative-text backend.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationError {
    /// No backend is selected, or a switch is in progress.
    Unavailable(String),
    Timeout {
        duration_secs: u64,
    },
    RateLimited {
        retry_after_secs: Option<u64>,
    },
    Connection(String),
    InvalidResponse(String),
}

impl GenerationError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::RateLimited { .. } | Self::Connection(_)
        )
    }

    /// Classify a backend error message.
    /// Only unambiguous markers (HTTP codes, explicit keywords) are mapped;
    /// anything else is reported as an invalid response.
    pub fn from_message(msg: &str) -> Self {
        if msg.contains("429") || msg.contains("Too Many Requests") {
            return Self::RateLimited {
                retry_after_secs: Self::extract_retry_after(msg),
            };
        }
        if msg.contains("502")
            || msg.contains("503")
            || msg.contains("504")
            || msg.contains("connection refused")
            || msg.contains("error sending request")
        {
            return Self::Connection(msg.to_string());
        }
        if msg.contains("timed out after") || msg.contains("timeout after") {
            return Self::Timeout {
                duration_secs: Self::extract_seconds(msg).unwrap_or(0),
            };
        }
        Self::InvalidResponse(msg.to_string())
    }

    fn extract_retry_after(msg: &str) -> Option<u64> {
        let msg_lower = msg.to_lowercase();
        for pattern in ["retry after ", "retry-after: ", "retry_after="] {
            if let Some(idx) = msg_lower.find(pattern) {
                let after_pattern = &msg_lower[idx + pattern.len()..];
                let num_str: String = after_pattern
                    .chars()
                    .take_while(|c| c.is_ascii_digit())
                    .collect();
                if let Ok(secs) = num_str.parse() {
                    return Some(secs);
                }
            }
        }
        None
    }

    fn extract_seconds(msg: &str) -> Option<u64> {
        msg.split(|c: char| !c.is_ascii_digit())
            .find_map(|s| s.parse().ok())
    }
}

impl std::fmt::Display for GenerationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(reason) => write!(f, "Capability unavailable: {}", reason),
            Self::Timeout { duration_secs } => {
                write!(f, "Generation timed out after {}s", duration_secs)
            }
            Self::RateLimited { retry_after_secs } => {
                if let Some(secs) = retry_after_secs {
                    write!(f, "Rate limited, retry after {}s", secs)
                } else {
                    write!(f, "Rate limited")
                }
            }
            Self::Connection(msg) => write!(f, "Connection error: {}", msg),
            Self::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
        }
    }
}

impl std::error::Error for GenerationError {}

#[derive(Error, Debug)]
pub enum WorkError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Generative capability unavailable: {0}")]
    CapabilityUnavailable(String),

    #[error("Generation timed out after {duration_secs}s")]
    GenerationTimeout { duration_secs: u64 },

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid state transition: {from} → {to} (allowed: {allowed})")]
    InvalidStateTransition {
        from: String,
        to: String,
        allowed: String,
    },

    #[error("Agent turn failed: {message}")]
    AgentTurn { message: String, transient: bool },

    #[error("Assessment failed: {0}")]
    Assessment(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not initialized. Run 'work-pilot init' first.")]
    NotInitialized,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml_bw::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl WorkError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::GenerationTimeout { .. } => true,
            Self::AgentTurn { transient, .. } => *transient,
            _ => false,
        }
    }

    pub fn agent_turn(message: impl Into<String>) -> Self {
        Self::AgentTurn {
            message: message.into(),
            transient: false,
        }
    }

    pub fn transient_agent_turn(message: impl Into<String>) -> Self {
        Self::AgentTurn {
            message: message.into(),
            transient: true,
        }
    }
}

pub type Result<T> = std::result::Result<T, WorkError>;

impl From<GenerationError> for WorkError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::Unavailable(reason) => WorkError::CapabilityUnavailable(reason),
            GenerationError::Timeout { duration_secs } => {
                WorkError::GenerationTimeout { duration_secs }
            }
            other => WorkError::Generation(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_classification() {
        let err = GenerationError::from_message("HTTP 429 Too Many Requests, retry after 42");
        assert_eq!(
            err,
            GenerationError::RateLimited {
                retry_after_secs: Some(42)
            }
        );
        assert!(err.is_transient());
    }

    #[test]
    fn test_timeout_classification() {
        let err = GenerationError::from_message("request timed out after 30s");
        assert_eq!(err, GenerationError::Timeout { duration_secs: 30 });
    }

    #[test]
    fn test_unknown_message_is_invalid_response() {
        let err = GenerationError::from_message("model returned garbage");
        assert!(matches!(err, GenerationError::InvalidResponse(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_unavailable_maps_to_distinct_variant() {
        let err: WorkError = GenerationError::Unavailable("no backend".into()).into();
        assert!(matches!(err, WorkError::CapabilityUnavailable(_)));

        let err: WorkError = GenerationError::Timeout { duration_secs: 5 }.into();
        assert!(matches!(
            err,
            WorkError::GenerationTimeout { duration_secs: 5 }
        ));
        assert!(err.is_transient());
    }
}
