use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{GenerationRequest, TextGenerator};
use crate::error::GenerationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityState {
    Unavailable,
    Available,
    Switching,
}

impl fmt::Display for CapabilityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unavailable => "Unavailable",
            Self::Available => "Available",
            Self::Switching => "Switching",
        };
        write!(f, "{}", s)
    }
}

struct Slot {
    state: CapabilityState,
    backend: Option<Arc<dyn TextGenerator>>,
    epoch: u64,
    reason: String,
}

/// The single owner of the current backend.
///
/// Every component that generates text holds an `Arc<CapabilityHandle>`
/// rather than a backend, so replacing the backend here is the only update a
/// switch needs. The epoch increments on every install.
pub struct CapabilityHandle {
    slot: RwLock<Slot>,
    timeout: Duration,
}

impl CapabilityHandle {
    pub fn unavailable(reason: impl Into<String>, timeout: Duration) -> Self {
        Self {
            slot: RwLock::new(Slot {
                state: CapabilityState::Unavailable,
                backend: None,
                epoch: 0,
                reason: reason.into(),
            }),
            timeout,
        }
    }

    pub fn with_backend(backend: Arc<dyn TextGenerator>, timeout: Duration) -> Self {
        let handle = Self::unavailable("not yet installed", timeout);
        handle.install(backend);
        handle
    }

    pub fn state(&self) -> CapabilityState {
        self.slot.read().state
    }

    pub fn epoch(&self) -> u64 {
        self.slot.read().epoch
    }

    pub fn backend_name(&self) -> Option<String> {
        self.slot
            .read()
            .backend
            .as_ref()
            .map(|b| b.name().to_string())
    }

    /// Pin the current backend for the duration of one command.
    pub fn lease(&self) -> Result<CapabilityLease, GenerationError> {
        let slot = self.slot.read();
        match (&slot.state, &slot.backend) {
            (CapabilityState::Available, Some(backend)) => Ok(CapabilityLease {
                backend: Arc::clone(backend),
                epoch: slot.epoch,
                timeout: self.timeout,
            }),
            (CapabilityState::Switching, _) => Err(GenerationError::Unavailable(
                "backend switch in progress".to_string(),
            )),
            _ => Err(GenerationError::Unavailable(slot.reason.clone())),
        }
    }

    /// Enter `Switching`, remembering the backend being replaced.
    pub(crate) fn begin_switch(&self) -> PendingSwitch {
        let mut slot = self.slot.write();
        slot.state = CapabilityState::Switching;
        debug!(epoch = slot.epoch, "Capability switch started");
        PendingSwitch {
            previous: slot.backend.clone(),
            epoch: slot.epoch,
        }
    }

    /// Install `backend` and make it available. Returns the new epoch.
    pub(crate) fn install(&self, backend: Arc<dyn TextGenerator>) -> u64 {
        let mut slot = self.slot.write();
        slot.epoch += 1;
        info!(backend = backend.name(), epoch = slot.epoch, "Capability installed");
        slot.backend = Some(backend);
        slot.state = CapabilityState::Available;
        slot.reason.clear();
        slot.epoch
    }

    /// Put back the backend that was active before a failed switch. A no-op
    /// when another switch has installed since `pending` began.
    pub(crate) fn restore(&self, pending: PendingSwitch, reason: &str) -> bool {
        let mut slot = self.slot.write();
        if slot.epoch != pending.epoch {
            debug!(
                started = pending.epoch,
                current = slot.epoch,
                "Newer backend installed, not restoring"
            );
            return false;
        }
        slot.state = if pending.previous.is_some() {
            CapabilityState::Available
        } else {
            CapabilityState::Unavailable
        };
        slot.backend = pending.previous;
        slot.reason = reason.to_string();
        true
    }

    pub fn mark_unavailable(&self, reason: impl Into<String>) {
        let mut slot = self.slot.write();
        slot.state = CapabilityState::Unavailable;
        slot.backend = None;
        slot.reason = reason.into();
        info!(reason = %slot.reason, "Capability marked unavailable");
    }
}

/// State captured when a switch begins.
pub(crate) struct PendingSwitch {
    previous: Option<Arc<dyn TextGenerator>>,
    epoch: u64,
}

/// A backend pinned for one command, with the call timeout applied.
#[derive(Clone)]
pub struct CapabilityLease {
    backend: Arc<dyn TextGenerator>,
    epoch: u64,
    timeout: Duration,
}

impl CapabilityLease {
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        match tokio::time::timeout(self.timeout, self.backend.generate(request)).await {
            Ok(result) => result,
            Err(_) => Err(GenerationError::Timeout {
                duration_secs: self.timeout.as_secs(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;

    struct Named(&'static str);

    #[async_trait]
    impl TextGenerator for Named {
        fn name(&self) -> &str {
            self.0
        }

        async fn generate(&self, _: &GenerationRequest) -> Result<String, GenerationError> {
            Ok(self.0.to_string())
        }
    }

    struct Stalled;

    #[async_trait]
    impl TextGenerator for Stalled {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn generate(&self, _: &GenerationRequest) -> Result<String, GenerationError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(String::new())
        }
    }

    #[test]
    fn test_unavailable_lease_fails_distinctly() {
        let handle = CapabilityHandle::unavailable("no api key", Duration::from_secs(1));
        let err = handle.lease().err().unwrap();
        assert_eq!(err, GenerationError::Unavailable("no api key".into()));
    }

    #[test]
    fn test_switching_blocks_leases() {
        let handle = CapabilityHandle::with_backend(Arc::new(Named("a")), Duration::from_secs(1));
        let pending = handle.begin_switch();
        assert_eq!(handle.state(), CapabilityState::Switching);
        assert!(handle.lease().is_err());
        assert!(handle.restore(pending, ""));
        assert_eq!(handle.lease().unwrap().backend_name(), "a");
    }

    #[test]
    fn test_install_bumps_epoch() {
        let handle = CapabilityHandle::with_backend(Arc::new(Named("a")), Duration::from_secs(1));
        let before = handle.lease().unwrap();
        handle.begin_switch();
        handle.install(Arc::new(Named("b")));
        let after = handle.lease().unwrap();
        assert_eq!(after.backend_name(), "b");
        assert_eq!(after.epoch(), before.epoch() + 1);
    }

    #[test]
    fn test_failed_switch_does_not_undo_newer_install() {
        let handle = CapabilityHandle::with_backend(Arc::new(Named("a")), Duration::from_secs(1));
        let first = handle.begin_switch();
        let second = handle.begin_switch();
        let epoch = handle.install(Arc::new(Named("b")));

        assert!(!handle.restore(first, "probe failed"));
        assert_eq!(handle.state(), CapabilityState::Available);
        assert_eq!(handle.backend_name().as_deref(), Some("b"));
        assert_eq!(handle.epoch(), epoch);
        drop(second);
    }

    #[tokio::test]
    async fn test_lease_times_out() {
        let handle = CapabilityHandle::with_backend(Arc::new(Stalled), Duration::from_millis(50));
        let lease = handle.lease().unwrap();
        let err = lease
            .generate(&GenerationRequest::new("s", "p"))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Timeout { .. }));
    }
}
