//! Scripted text generator for driving the cascade without a live backend.

use std::collections::HashMap;
use std::sync::OnceLock;

use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;

use work_pilot::capability::{GenerationRequest, TextGenerator};
use work_pilot::error::GenerationError;

fn stage_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^Task \(([a-z_]+)\):").unwrap())
}

/// Replies per cascade stage. A stage reply is either conditional on the
/// utterance or the stage default; the first matching pattern wins.
pub struct ScriptedGenerator {
    name: String,
    conditional: HashMap<String, Vec<(Regex, String)>>,
    defaults: HashMap<String, String>,
    calls: Mutex<HashMap<String, usize>>,
    probe_error: Option<GenerationError>,
}

impl ScriptedGenerator {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            conditional: HashMap::new(),
            defaults: HashMap::new(),
            calls: Mutex::new(HashMap::new()),
            probe_error: None,
        }
    }

    /// A backend that reads every utterance as a confident command.
    pub fn command(
        name: impl Into<String>,
        operation: &str,
        entity_types: &str,
        identifier: &str,
        parameters: &str,
    ) -> Self {
        Self::new(name)
            .reply("intent", r#"{"intent":"command","confidence":0.95}"#)
            .reply(
                "operation",
                format!(r#"{{"operation":"{}","confidence":0.93}}"#, operation),
            )
            .reply(
                "entity_type",
                format!(r#"{{"entity_types":{},"confidence":0.92}}"#, entity_types),
            )
            .reply("identifier", identifier)
            .reply(
                "parameters",
                format!(r#"{{"parameters":{},"confidence":0.9}}"#, parameters),
            )
    }

    pub fn reply(mut self, stage: &str, reply: impl Into<String>) -> Self {
        self.defaults.insert(stage.to_string(), reply.into());
        self
    }

    pub fn when(mut self, stage: &str, utterance: &str, reply: impl Into<String>) -> Self {
        let regex = Regex::new(utterance)
            .unwrap_or_else(|e| panic!("Invalid regex pattern '{}': {}", utterance, e));
        self.conditional
            .entry(stage.to_string())
            .or_default()
            .push((regex, reply.into()));
        self
    }

    pub fn failing_probe(mut self, error: GenerationError) -> Self {
        self.probe_error = Some(error);
        self
    }

    pub fn calls(&self, stage: &str) -> usize {
        self.calls.lock().get(stage).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    fn script_for(&self, stage: &str, utterance: &str) -> Option<String> {
        self.conditional
            .get(stage)
            .and_then(|patterns| {
                patterns
                    .iter()
                    .find(|(pattern, _)| pattern.is_match(utterance))
                    .map(|(_, reply)| reply.clone())
            })
            .or_else(|| self.defaults.get(stage).cloned())
    }
}

fn utterance_of(prompt: &str) -> &str {
    prompt
        .rsplit("Utterance: ")
        .next()
        .unwrap_or("")
        .trim_end_matches("JSON:")
        .trim()
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let stage = stage_pattern()
            .captures(&request.prompt)
            .map(|caps| caps[1].to_string())
            .ok_or_else(|| GenerationError::InvalidResponse("prompt has no stage".into()))?;
        *self.calls.lock().entry(stage.clone()).or_default() += 1;

        self.script_for(&stage, utterance_of(&request.prompt))
            .ok_or_else(|| GenerationError::InvalidResponse(format!("no script for {}", stage)))
    }

    async fn probe(&self) -> Result<(), GenerationError> {
        match &self.probe_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}
