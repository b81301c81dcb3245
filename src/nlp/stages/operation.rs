use schemars::JsonSchema;
use serde::Deserialize;

use super::{StageContext, StageOutcome, words};
use crate::error::Result;
use crate::nlp::context::{Operation, StageName};
use crate::nlp::structured::scan_labelled;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct OperationReply {
    /// One of `CREATE`, `UPDATE`, `DELETE`, `QUERY`.
    pub operation: String,
    #[serde(default)]
    pub confidence: Option<f32>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OperationClassifier;

impl OperationClassifier {
    pub async fn classify(
        &self,
        text: &str,
        ctx: &StageContext<'_>,
    ) -> Result<StageOutcome<Option<Operation>>> {
        let request = ctx.prompts.operation::<OperationReply>(text);
        ctx.run(
            StageName::Operation,
            request,
            |reply: OperationReply| {
                let operation = reply.operation.parse::<Operation>().ok()?;
                Some((Some(operation), reply.confidence))
            },
            |raw| fallback(raw).map(Some),
            None,
        )
        .await
    }
}

fn fallback(raw: &str) -> Option<Operation> {
    if let Some(value) = scan_labelled(raw, &["operation", "op"])
        && let Ok(operation) = value.parse()
    {
        return Some(operation);
    }
    // Free text only counts when it names an operation outright.
    words(raw).find_map(|w| match w.to_uppercase().as_str() {
        "CREATE" => Some(Operation::Create),
        "UPDATE" => Some(Operation::Update),
        "DELETE" => Some(Operation::Delete),
        "QUERY" => Some(Operation::Query),
        _ => None,
    })
}
