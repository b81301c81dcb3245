use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::agent::{Artifact, DeliverableAssessor, TurnAgent};
use super::budget::{BudgetDecision, ComplexityEstimator, TurnBudgetPolicy};
use super::signal::SignalHandler;
use super::state::{StateTransition, TurnEvent, TurnLedger, TurnState};
use crate::config::TurnConfig;
use crate::error::Result;
use crate::model::{EntityId, Task};

/// Final report of one governed execution. Artifacts survive every outcome,
/// failure included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernorOutcome {
    pub task_id: EntityId,
    pub state: TurnState,
    pub budget: BudgetDecision,
    pub budget_history: Vec<u32>,
    pub turns_used: u32,
    pub retries: u32,
    pub released_turns: u32,
    pub artifacts: Vec<Artifact>,
    pub failure: Option<String>,
    pub transitions: Vec<StateTransition>,
}

impl GovernorOutcome {
    fn from_ledger(
        task_id: EntityId,
        budget: BudgetDecision,
        ledger: TurnLedger,
        artifacts: Vec<Artifact>,
    ) -> Self {
        Self {
            task_id,
            state: ledger.state,
            budget,
            budget_history: ledger.budget_history,
            turns_used: ledger.total_turns,
            retries: ledger.retries,
            released_turns: ledger.released_turns,
            artifacts,
            failure: ledger.failure,
            transitions: ledger.transitions,
        }
    }

    pub fn is_success(&self) -> bool {
        self.state.is_success()
    }
}

/// Bounds agent turns for one task execution.
///
/// The loop drives `TurnLedger` through its states; every decision is a
/// ledger transition. Retries are bounded by `max_retries`.
pub struct TurnGovernor {
    policy: TurnBudgetPolicy,
    estimator: Option<Arc<dyn ComplexityEstimator>>,
}

impl TurnGovernor {
    pub fn new(config: TurnConfig) -> Self {
        Self {
            policy: TurnBudgetPolicy::new(config),
            estimator: None,
        }
    }

    pub fn with_estimator(mut self, estimator: Arc<dyn ComplexityEstimator>) -> Self {
        self.estimator = Some(estimator);
        self
    }

    pub fn set_estimator(&mut self, estimator: Option<Arc<dyn ComplexityEstimator>>) {
        self.estimator = estimator;
    }

    pub fn has_estimator(&self) -> bool {
        self.estimator.is_some()
    }

    pub fn policy(&self) -> &TurnBudgetPolicy {
        &self.policy
    }

    pub async fn run(
        &self,
        task: &Task,
        agent: &dyn TurnAgent,
        assessor: &dyn DeliverableAssessor,
        signal: &SignalHandler,
    ) -> Result<GovernorOutcome> {
        let decision = self.policy.compute(task, self.estimator.as_deref()).await;
        let mut ledger = TurnLedger::new(decision.budget, self.policy.config());
        let mut artifacts = Vec::new();

        ledger = self.step(&ledger, task.id, TurnEvent::Start)?;

        while !ledger.state.is_terminal() {
            let event = match ledger.state {
                TurnState::Running | TurnState::Retrying if signal.take_cancel() => {
                    TurnEvent::Cancel
                }
                TurnState::Running => {
                    let turn = ledger.turns_used + 1;
                    debug!(task_id = task.id, turn, budget = ledger.budget, "Running turn");
                    match agent.run_turn(task, turn, ledger.budget).await {
                        Ok(report) => {
                            artifacts.extend(report.artifacts);
                            TurnEvent::TurnConsumed {
                                finished: report.finished,
                            }
                        }
                        Err(e) if e.is_transient() => {
                            warn!(task_id = task.id, turn, error = %e, "Transient agent error, turn consumed");
                            TurnEvent::TurnConsumed { finished: false }
                        }
                        Err(e) => TurnEvent::Fail {
                            reason: e.to_string(),
                        },
                    }
                }
                TurnState::MaxTurnsExceeded => TurnEvent::BeginAssessment,
                TurnState::AssessingDeliverable => {
                    let satisfied = match assessor.assess(task, &artifacts).await {
                        Ok(assessment) => {
                            info!(
                                task_id = task.id,
                                satisfied = assessment.satisfied,
                                reason = %assessment.reason,
                                "Deliverable assessed"
                            );
                            assessment.satisfied
                        }
                        Err(e) => {
                            warn!(task_id = task.id, error = %e, "Assessment failed, treating as negative");
                            false
                        }
                    };
                    TurnEvent::Assessed { satisfied }
                }
                TurnState::Retrying => TurnEvent::Resume,
                TurnState::Initialized => TurnEvent::Start,
                TurnState::Completed
                | TurnState::CompletedWithPartialCredit
                | TurnState::Failed
                | TurnState::Cancelled => break,
            };
            ledger = self.step(&ledger, task.id, event)?;
        }

        info!(
            task_id = task.id,
            state = %ledger.state,
            turns = ledger.total_turns,
            retries = ledger.retries,
            artifacts = artifacts.len(),
            "Task execution finished"
        );
        Ok(GovernorOutcome::from_ledger(task.id, decision, ledger, artifacts))
    }

    fn step(&self, ledger: &TurnLedger, task_id: EntityId, event: TurnEvent) -> Result<TurnLedger> {
        let next = ledger.apply(event)?;
        if next.state != ledger.state {
            debug!(task_id, from = %ledger.state, to = %next.state, "Turn state transition");
        }
        Ok(next)
    }
}
