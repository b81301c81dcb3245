use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cancellation request shared between a caller and a running governor.
///
/// The governor only looks at it between turns; a turn in flight always
/// completes.
#[derive(Clone, Default)]
pub struct SignalHandler {
    cancelled: Arc<AtomicBool>,
    acknowledged: Arc<AtomicBool>,
}

impl SignalHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.acknowledged.store(false, Ordering::SeqCst);
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
        self.acknowledged.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn acknowledge(&self) {
        self.acknowledged.store(true, Ordering::SeqCst);
    }

    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged.load(Ordering::SeqCst)
    }

    /// True once per cancel request. Consumes the request and acknowledges
    /// it.
    pub fn take_cancel(&self) -> bool {
        let cancelled = self.cancelled.swap(false, Ordering::SeqCst);
        if cancelled {
            self.acknowledge();
        }
        cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let handler = SignalHandler::new();
        let remote = handler.clone();
        assert!(!handler.is_cancelled());

        remote.cancel();
        assert!(handler.take_cancel());
        assert!(remote.is_acknowledged());

        handler.clear();
        assert!(!remote.is_cancelled());
        assert!(!remote.is_acknowledged());
    }

    #[test]
    fn test_cancel_is_taken_once() {
        let handler = SignalHandler::new();
        assert!(!handler.take_cancel());

        handler.cancel();
        assert!(handler.take_cancel());
        assert!(!handler.take_cancel());
        assert!(!handler.is_cancelled());
        assert!(handler.is_acknowledged());

        handler.cancel();
        assert!(!handler.is_acknowledged());
        assert!(handler.take_cancel());
    }
}
