use schemars::JsonSchema;

use super::context::{EntityTypes, Operation, SessionContext, StageName};
use crate::capability::GenerationRequest;
use crate::config::GenerationConfig;

/// Markers that end generation. Both begin with a blank line, which
/// neither compact nor pretty-printed JSON ever contains.
pub const STOP_SEQUENCES: [&str; 2] = ["\n\nUtterance:", "\n\n###"];

const SYSTEM_PROMPT: &str = "You interpret commands for a work tracker whose hierarchy is \
Project > Epic > Story > Task, plus Milestones that group Epics within a Project. \
Answer with a single JSON object matching the schema you are given. \
Do not add commentary.";

/// Builds one generation request per cascade stage.
///
/// Every prompt ends with the utterance and a `JSON:` cue; worked examples
/// are separated by `###` so the stop markers cut off any continuation.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    temperature: f32,
    max_tokens: u32,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(&GenerationConfig::default())
    }
}

impl PromptBuilder {
    pub fn new(config: &GenerationConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    pub fn intent<R: JsonSchema>(&self, text: &str, session: &SessionContext) -> GenerationRequest {
        self.build::<R>(
            StageName::Intent,
            "Classify whether the utterance is a COMMAND to change or read tracker data, \
             a QUESTION about something else, or AMBIGUOUS.",
            &[
                ("add a task to fix the login bug", r#"{"intent":"command","confidence":0.95}"#),
                ("what does an epic mean?", r#"{"intent":"question","confidence":0.9}"#),
            ],
            &session_lines(session),
            text,
        )
    }

    pub fn operation<R: JsonSchema>(&self, text: &str) -> GenerationRequest {
        self.build::<R>(
            StageName::Operation,
            "Classify the operation as exactly one of CREATE, UPDATE, DELETE or QUERY.",
            &[
                ("mark story 4 as done", r#"{"operation":"UPDATE","confidence":0.92}"#),
                ("remove every milestone", r#"{"operation":"DELETE","confidence":0.9}"#),
            ],
            &[],
            text,
        )
    }

    pub fn entity_types<R: JsonSchema>(&self, text: &str, operation: Operation) -> GenerationRequest {
        self.build::<R>(
            StageName::EntityType,
            "List the entity types involved, target first, then any scoping parents. \
             Allowed values: project, epic, story, task, milestone.",
            &[
                ("show tasks for epic 5", r#"{"entity_types":["task","epic"],"confidence":0.93}"#),
                ("create a project named Apollo", r#"{"entity_types":["project"],"confidence":0.97}"#),
            ],
            &[format!("Operation: {}", operation)],
            text,
        )
    }

    pub fn identifier<R: JsonSchema>(
        &self,
        text: &str,
        operation: Operation,
        entity_types: &EntityTypes,
    ) -> GenerationRequest {
        let mut context = vec![
            format!("Operation: {}", operation),
            format!("Entity types: {}", entity_types),
        ];
        if entity_types.scope().is_some() {
            context.push("The identifier names the scoping parent, not the target.".to_string());
        }
        self.build::<R>(
            StageName::Identifier,
            "Extract which entity the command targets: kind is \"id\" with a number, \
             \"name\" with the quoted name, \"all\" for every entity of the type, \
             or \"none\".",
            &[
                ("delete task 12", r#"{"kind":"id","value":12,"confidence":0.96}"#),
                ("rename the Billing epic to Payments", r#"{"kind":"name","value":"Billing","confidence":0.85}"#),
                ("delete all projects", r#"{"kind":"all","value":null,"confidence":0.94}"#),
            ],
            &context,
            text,
        )
    }

    pub fn parameters<R: JsonSchema>(
        &self,
        text: &str,
        operation: Operation,
        entity_types: &EntityTypes,
        session: &SessionContext,
    ) -> GenerationRequest {
        let mut context = vec![
            format!("Operation: {}", operation),
            format!("Entity types: {}", entity_types),
        ];
        context.extend(session_lines(session));
        self.build::<R>(
            StageName::Parameters,
            "Extract field values stated in the utterance. Use null for any field that is \
             not mentioned. Fields: name, description, status (pending, in_progress, \
             blocked, completed, cancelled), priority (low, medium, high, critical), \
             project_id, epic_id, story_id, dependencies (task ids), epic_ids, \
             due_date (YYYY-MM-DD).",
            &[(
                "add a high priority story Checkout to epic 3",
                r#"{"parameters":{"name":"Checkout","priority":"high","epic_id":3,"status":null},"confidence":0.9}"#,
            )],
            &context,
            text,
        )
    }

    fn build<R: JsonSchema>(
        &self,
        stage: StageName,
        instructions: &str,
        examples: &[(&str, &str)],
        context: &[String],
        text: &str,
    ) -> GenerationRequest {
        let schema = serde_json::to_string(&schemars::schema_for!(R)).unwrap_or_default();

        let mut prompt = format!("Task ({}): {}\nSchema: {}\n", stage, instructions, schema);
        for (utterance, answer) in examples {
            prompt.push_str(&format!("\n###\nUtterance: {}\nJSON: {}\n", utterance, answer));
        }
        prompt.push_str("\n###\n");
        for line in context {
            prompt.push_str(line);
            prompt.push('\n');
        }
        prompt.push_str(&format!("Utterance: {}\nJSON:", single_line(text)));

        GenerationRequest::new(SYSTEM_PROMPT, prompt)
            .with_stop(&STOP_SEQUENCES)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
    }
}

fn session_lines(session: &SessionContext) -> Vec<String> {
    match session.current_project {
        Some(id) => vec![format!("Current project: {}", id)],
        None => vec!["Current project: none selected".to_string()],
    }
}

/// Blank lines in user text would collide with the stop markers.
fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
