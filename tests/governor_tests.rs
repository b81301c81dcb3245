mod fixtures;

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use fixtures::{offline_orchestrator, seed};
use work_pilot::error::{Result, WorkError};
use work_pilot::governor::{
    Artifact, Assessment, DeliverableAssessor, SignalHandler, TaskSize, TurnAgent, TurnReport,
    TurnState,
};
use work_pilot::model::{EntityStore, EntityType, Status, Task};
use work_pilot::nlp::SessionContext;

/// Finishes on turn `finish_on`, or never.
struct CountingAgent {
    finish_on: Option<u32>,
    calls: AtomicU32,
    cancel_after: Option<(u32, SignalHandler)>,
}

impl CountingAgent {
    fn finishing_on(turn: u32) -> Self {
        Self {
            finish_on: Some(turn),
            calls: AtomicU32::new(0),
            cancel_after: None,
        }
    }

    fn never_finishing() -> Self {
        Self {
            finish_on: None,
            calls: AtomicU32::new(0),
            cancel_after: None,
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TurnAgent for CountingAgent {
    async fn run_turn(&self, task: &Task, _turn: u32, _budget: u32) -> Result<TurnReport> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((after, signal)) = &self.cancel_after
            && call == *after
        {
            signal.cancel();
        }
        let artifact = vec![Artifact::new(
            format!("{}-{}.diff", task.id, call),
            format!("turn {}", call),
        )];
        if self.finish_on == Some(call) {
            Ok(TurnReport::finished(artifact))
        } else {
            Ok(TurnReport::progress(artifact))
        }
    }
}

struct FixedAssessor(bool);

#[async_trait]
impl DeliverableAssessor for FixedAssessor {
    async fn assess(&self, _task: &Task, artifacts: &[Artifact]) -> Result<Assessment> {
        if self.0 && !artifacts.is_empty() {
            Ok(Assessment::satisfied("usable as is"))
        } else {
            Ok(Assessment::rejected("missing pieces"))
        }
    }
}

fn status_of(store: &dyn EntityStore, task_id: u64) -> Status {
    store.get_live(EntityType::Task, task_id).unwrap().unwrap().status()
}

#[tokio::test]
async fn test_task_completes_within_budget() {
    let (orchestrator, store) = offline_orchestrator();
    let project = seed::project(store.as_ref(), "Apollo");
    let task = seed::task(store.as_ref(), project, None, "Add search box", "Header search input");

    let agent = CountingAgent::finishing_on(3);
    let outcome = orchestrator
        .execute_task(
            task,
            &SessionContext::for_project(project),
            &agent,
            &FixedAssessor(false),
            &SignalHandler::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.state, TurnState::Completed);
    assert_eq!(outcome.budget.profile.size, TaskSize::Small);
    assert!(outcome.budget.budget >= 3);
    assert_eq!(outcome.turns_used, 3);
    assert_eq!(outcome.artifacts.len(), 3);
    assert_eq!(agent.calls(), 3);
    assert_eq!(status_of(store.as_ref(), task), Status::Completed);
}

#[tokio::test]
async fn test_exhausted_budget_with_good_deliverable_gets_partial_credit() {
    let (orchestrator, store) = offline_orchestrator();
    let project = seed::project(store.as_ref(), "Apollo");
    let task = seed::task(store.as_ref(), project, None, "Fix login crash", "");

    let agent = CountingAgent::never_finishing();
    let outcome = orchestrator
        .execute_task(
            task,
            &SessionContext::new(),
            &agent,
            &FixedAssessor(true),
            &SignalHandler::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.state, TurnState::CompletedWithPartialCredit);
    assert_eq!(outcome.retries, 0);
    assert_eq!(agent.calls(), outcome.budget.budget);
    assert_eq!(status_of(store.as_ref(), task), Status::Completed);
}

#[tokio::test]
async fn test_rejected_deliverable_retries_then_blocks_task() {
    let (orchestrator, store) = offline_orchestrator();
    let project = seed::project(store.as_ref(), "Apollo");
    let task = seed::task(store.as_ref(), project, None, "Fix login crash", "");

    let agent = CountingAgent::never_finishing();
    let outcome = orchestrator
        .execute_task(
            task,
            &SessionContext::new(),
            &agent,
            &FixedAssessor(false),
            &SignalHandler::new(),
        )
        .await
        .unwrap();

    let first = outcome.budget.budget;
    assert_eq!(outcome.state, TurnState::Failed);
    assert_eq!(outcome.retries, 2);
    assert_eq!(outcome.budget_history, vec![first, first * 3, first * 9]);
    assert_eq!(agent.calls(), first * 13);
    assert!(outcome.failure.is_some());
    assert_eq!(outcome.artifacts.len() as u32, agent.calls());
    assert_eq!(status_of(store.as_ref(), task), Status::Blocked);
}

#[tokio::test]
async fn test_cancellation_releases_budget_and_keeps_status() {
    let (orchestrator, store) = offline_orchestrator();
    let project = seed::project(store.as_ref(), "Apollo");
    let task = seed::task(store.as_ref(), project, None, "Add search box", "");

    let signal = SignalHandler::new();
    let agent = CountingAgent {
        finish_on: None,
        calls: AtomicU32::new(0),
        cancel_after: Some((2, signal.clone())),
    };
    let outcome = orchestrator
        .execute_task(
            task,
            &SessionContext::new(),
            &agent,
            &FixedAssessor(true),
            &signal,
        )
        .await
        .unwrap();

    assert_eq!(outcome.state, TurnState::Cancelled);
    assert_eq!(agent.calls(), 2);
    assert_eq!(outcome.released_turns, outcome.budget.budget - 2);
    assert_eq!(status_of(store.as_ref(), task), Status::InProgress);
}

#[tokio::test]
async fn test_task_outside_session_project_is_rejected() {
    let (orchestrator, store) = offline_orchestrator();
    let project = seed::project(store.as_ref(), "Apollo");
    let other = seed::project(store.as_ref(), "Gemini");
    let task = seed::task(store.as_ref(), project, None, "Add search box", "");

    let err = orchestrator
        .execute_task(
            task,
            &SessionContext::for_project(other),
            &CountingAgent::finishing_on(1),
            &FixedAssessor(true),
            &SignalHandler::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WorkError::Validation(_)), "{err}");
    assert_eq!(status_of(store.as_ref(), task), Status::Pending);

    let err = orchestrator
        .execute_task(
            9999,
            &SessionContext::new(),
            &CountingAgent::finishing_on(1),
            &FixedAssessor(true),
            &SignalHandler::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WorkError::Validation(_)), "{err}");
}
