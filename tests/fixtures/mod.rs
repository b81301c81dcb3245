#![allow(dead_code)]

pub mod mock_generator;
pub mod seed;

use std::sync::Arc;

use work_pilot::Orchestrator;
use work_pilot::config::{BackendKind, WorkConfig};
use work_pilot::model::{EntityStore, MemoryStore};

/// Config with no live backend and no snapshot file.
pub fn offline_config() -> WorkConfig {
    let mut config = WorkConfig::default();
    config.generation.backend = BackendKind::None;
    config.store.persist = false;
    config
}

pub fn offline_orchestrator() -> (Orchestrator, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let shared: Arc<dyn EntityStore> = store.clone();
    let orchestrator = Orchestrator::new(offline_config(), shared).unwrap();
    (orchestrator, store)
}
