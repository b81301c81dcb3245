use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::TurnConfig;
use crate::error::{Result, WorkError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    #[default]
    Initialized,
    Running,
    Completed,
    MaxTurnsExceeded,
    AssessingDeliverable,
    CompletedWithPartialCredit,
    Retrying,
    Failed,
    Cancelled,
}

impl TurnState {
    pub fn allowed_transitions(&self) -> &'static [TurnState] {
        use TurnState::*;
        match self {
            Initialized => &[Running, Failed, Cancelled],
            Running => &[Running, Completed, MaxTurnsExceeded, Failed, Cancelled],
            MaxTurnsExceeded => &[AssessingDeliverable, Cancelled],
            AssessingDeliverable => &[CompletedWithPartialCredit, Retrying, Failed, Cancelled],
            Retrying => &[Running, Cancelled],
            Completed => &[],
            CompletedWithPartialCredit => &[],
            Failed => &[],
            Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, target: TurnState) -> bool {
        self.allowed_transitions().contains(&target)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TurnState::Completed
                | TurnState::CompletedWithPartialCredit
                | TurnState::Failed
                | TurnState::Cancelled
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self,
            TurnState::Completed | TurnState::CompletedWithPartialCredit
        )
    }
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Initialized => "Initialized",
            Self::Running => "Running",
            Self::Completed => "Completed",
            Self::MaxTurnsExceeded => "MaxTurnsExceeded",
            Self::AssessingDeliverable => "AssessingDeliverable",
            Self::CompletedWithPartialCredit => "CompletedWithPartialCredit",
            Self::Retrying => "Retrying",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Inputs to the turn state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    Start,
    /// One turn was consumed; `finished` when the agent reports the task done.
    TurnConsumed { finished: bool },
    BeginAssessment,
    Assessed { satisfied: bool },
    Resume,
    Fail { reason: String },
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: TurnState,
    pub to: TurnState,
    pub reason: String,
}

/// Immutable snapshot of one governed execution. `apply` never mutates;
/// it returns the next snapshot or rejects the event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnLedger {
    pub state: TurnState,
    /// Budget of the current attempt. Always at least 1.
    pub budget: u32,
    /// Turns used in the current attempt.
    pub turns_used: u32,
    pub total_turns: u32,
    pub retries: u32,
    pub max_retries: u32,
    pub retry_multiplier: u32,
    /// Budget of every attempt, first one included.
    pub budget_history: Vec<u32>,
    pub released_turns: u32,
    pub failure: Option<String>,
    pub transitions: Vec<StateTransition>,
}

impl TurnLedger {
    pub fn new(budget: u32, config: &TurnConfig) -> Self {
        let budget = budget.max(1);
        Self {
            state: TurnState::Initialized,
            budget,
            turns_used: 0,
            total_turns: 0,
            retries: 0,
            max_retries: config.max_retries,
            retry_multiplier: config.retry_multiplier.max(1),
            budget_history: vec![budget],
            released_turns: 0,
            failure: None,
            transitions: Vec::new(),
        }
    }

    pub fn remaining(&self) -> u32 {
        self.budget.saturating_sub(self.turns_used)
    }

    pub fn apply(&self, event: TurnEvent) -> Result<TurnLedger> {
        let mut next = self.clone();
        let (target, reason) = match event {
            TurnEvent::Start => {
                self.require(TurnState::Initialized, "start")?;
                (TurnState::Running, "started".to_string())
            }
            TurnEvent::TurnConsumed { finished } => {
                self.require(TurnState::Running, "turn consumed")?;
                next.turns_used += 1;
                next.total_turns += 1;
                if finished {
                    (TurnState::Completed, "agent reported completion".to_string())
                } else if next.turns_used >= next.budget {
                    (
                        TurnState::MaxTurnsExceeded,
                        format!("budget of {} turns exhausted", next.budget),
                    )
                } else {
                    (TurnState::Running, format!("turn {}", next.turns_used))
                }
            }
            TurnEvent::BeginAssessment => (
                TurnState::AssessingDeliverable,
                "assessing deliverable".to_string(),
            ),
            TurnEvent::Assessed { satisfied: true } => (
                TurnState::CompletedWithPartialCredit,
                "deliverable satisfies the task".to_string(),
            ),
            TurnEvent::Assessed { satisfied: false } => {
                self.require(TurnState::AssessingDeliverable, "assessment")?;
                if self.retries < self.max_retries {
                    next.retries += 1;
                    next.budget = self.budget.saturating_mul(self.retry_multiplier);
                    next.turns_used = 0;
                    next.budget_history.push(next.budget);
                    (
                        TurnState::Retrying,
                        format!("retry {} with budget {}", next.retries, next.budget),
                    )
                } else {
                    let reason = format!("deliverable rejected after {} retries", self.retries);
                    next.failure = Some(reason.clone());
                    (TurnState::Failed, reason)
                }
            }
            TurnEvent::Resume => {
                self.require(TurnState::Retrying, "resume")?;
                (TurnState::Running, "resumed".to_string())
            }
            TurnEvent::Fail { reason } => {
                next.failure = Some(reason.clone());
                (TurnState::Failed, reason)
            }
            TurnEvent::Cancel => {
                next.released_turns = self.remaining();
                (
                    TurnState::Cancelled,
                    format!("cancelled, {} turns released", next.released_turns),
                )
            }
        };

        if !self.state.can_transition_to(target) {
            return Err(self.invalid(target));
        }
        next.state = target;
        if self.state != target {
            next.transitions.push(StateTransition {
                from: self.state,
                to: target,
                reason,
            });
        }
        Ok(next)
    }

    fn require(&self, expected: TurnState, event: &str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(WorkError::InvalidStateTransition {
                from: self.state.to_string(),
                to: event.to_string(),
                allowed: expected.to_string(),
            })
        }
    }

    fn invalid(&self, target: TurnState) -> WorkError {
        WorkError::InvalidStateTransition {
            from: self.state.to_string(),
            to: target.to_string(),
            allowed: self
                .state
                .allowed_transitions()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}
