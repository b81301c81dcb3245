use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::model::{Entity, EntityId, EntityType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity_type: EntityType,
    pub id: EntityId,
}

impl EntityRef {
    pub fn new(entity_type: EntityType, id: EntityId) -> Self {
        Self { entity_type, id }
    }

    pub fn of(entity: &Entity) -> Self {
        Self::new(entity.entity_type(), entity.id())
    }
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} #{}", self.entity_type, self.id)
    }
}

/// One per-entity failure inside a bulk run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedItem {
    pub entity_type: EntityType,
    pub id: EntityId,
    pub error: String,
}

/// Tally of a bulk run. Counts include cascaded children.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkOutcome {
    pub counts: BTreeMap<EntityType, usize>,
    pub affected: Vec<EntityRef>,
    pub failed: Vec<FailedItem>,
    pub aborted: bool,
}

impl BulkOutcome {
    pub fn record(&mut self, entity_type: EntityType, id: EntityId) {
        *self.counts.entry(entity_type).or_default() += 1;
        self.affected.push(EntityRef::new(entity_type, id));
    }

    pub fn fail(&mut self, entity_type: EntityType, id: EntityId, error: impl ToString) {
        self.failed.push(FailedItem {
            entity_type,
            id,
            error: error.to_string(),
        });
    }

    pub fn count(&self, entity_type: EntityType) -> usize {
        self.counts.get(&entity_type).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && !self.aborted
    }
}

/// Caller-facing envelope. Every operation on every entity type returns
/// this shape; `affected_ids` is always a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub affected_ids: Vec<EntityRef>,
    pub message: String,
    #[serde(default)]
    pub data: Value,
}

impl ExecutionResult {
    pub fn created(entity: &Entity) -> Self {
        Self::single(entity, format!("Created {} #{}", entity.entity_type(), entity.id()))
    }

    pub fn updated(entity: &Entity) -> Self {
        Self::single(entity, format!("Updated {} #{}", entity.entity_type(), entity.id()))
    }

    pub fn found(entity: &Entity) -> Self {
        Self::single(
            entity,
            format!("{} #{}: {}", entity.entity_type(), entity.id(), entity.name()),
        )
    }

    fn single(entity: &Entity, message: String) -> Self {
        Self {
            success: true,
            affected_ids: vec![EntityRef::of(entity)],
            message,
            data: json!({ "entity": to_value(entity) }),
        }
    }

    pub fn listed(entity_type: EntityType, entities: &[Entity]) -> Self {
        let noun = if entities.len() == 1 {
            entity_type.as_str()
        } else {
            entity_type.plural()
        };
        Self {
            success: true,
            affected_ids: entities.iter().map(EntityRef::of).collect(),
            message: format!("Found {} {}", entities.len(), noun),
            data: json!({
                "entity_type": entity_type,
                "count": entities.len(),
                "entities": entities.iter().map(to_value).collect::<Vec<_>>(),
            }),
        }
    }

    /// Single deletes and bulk runs share this shape: per-type counts plus
    /// every failed item. Partial failure is `success: false`.
    pub fn bulk(verb: &str, outcome: BulkOutcome) -> Self {
        let summary = if outcome.counts.is_empty() {
            "nothing".to_string()
        } else {
            outcome
                .counts
                .iter()
                .map(|(t, n)| format!("{} {}", n, if *n == 1 { t.as_str() } else { t.plural() }))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let mut message = format!("{} {}", verb, summary);
        if !outcome.failed.is_empty() {
            message.push_str(&format!("; {} failed", outcome.failed.len()));
        }
        if outcome.aborted {
            message.push_str("; aborted after first error");
        }

        Self {
            success: outcome.is_clean(),
            data: json!({
                "counts": outcome.counts,
                "failed": outcome.failed,
            }),
            affected_ids: outcome.affected,
            message,
        }
    }
}

fn to_value(entity: &Entity) -> Value {
    serde_json::to_value(entity).unwrap_or(Value::Null)
}
