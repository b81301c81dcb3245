use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::trace;

use crate::model::EntityId;

/// What a mutation locks. Creating a project has no project yet, so it
/// serializes on its own key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockScope {
    Project(EntityId),
    NewProject,
}

/// Per-project transaction boundary.
///
/// Mutations in one project are serialized; different projects proceed in
/// parallel. The mutex is not reentrant: take it once, at the entry point.
#[derive(Default)]
pub struct ProjectLocks {
    locks: DashMap<LockScope, Arc<Mutex<()>>>,
}

impl ProjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, scope: LockScope) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.entry(scope).or_default().value())
    }

    pub fn with<T>(&self, scope: LockScope, f: impl FnOnce() -> T) -> T {
        let lock = self.lock_for(scope);
        let _guard = lock.lock();
        trace!(?scope, "Acquired project lock");
        f()
    }

    pub fn is_locked(&self, scope: LockScope) -> bool {
        self.locks
            .get(&scope)
            .is_some_and(|lock| lock.is_locked())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use super::*;

    #[test]
    fn test_lock_held_only_inside_closure() {
        let locks = ProjectLocks::new();
        let scope = LockScope::Project(1);
        let inside = locks.with(scope, || locks.is_locked(scope));
        assert!(inside);
        assert!(!locks.is_locked(scope));
        assert!(!locks.is_locked(LockScope::Project(2)));
    }

    #[test]
    fn test_same_project_is_serialized() {
        let locks = Arc::new(ProjectLocks::new());
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let active = Arc::clone(&active);
                let max_seen = Arc::clone(&max_seen);
                thread::spawn(move || {
                    locks.with(LockScope::Project(7), || {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(std::time::Duration::from_millis(2));
                        active.fetch_sub(1, Ordering::SeqCst);
                    })
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }
}
