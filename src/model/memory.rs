//! In-process entity store with optional YAML snapshot persistence.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::store::soft_delete;
use super::{
    DeleteMode, Entity, EntityChanges, EntityDraft, EntityId, EntityStore, EntityType, ListFilter,
    StoreError,
};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    #[serde(default)]
    next_ids: BTreeMap<EntityType, EntityId>,
    #[serde(default)]
    entities: BTreeMap<EntityType, BTreeMap<EntityId, Entity>>,
}

impl StoreState {
    fn allocate_id(&mut self, entity_type: EntityType) -> EntityId {
        let next = self.next_ids.entry(entity_type).or_insert(1);
        let id = *next;
        *next += 1;
        id
    }

    fn table(&self, entity_type: EntityType) -> Option<&BTreeMap<EntityId, Entity>> {
        self.entities.get(&entity_type)
    }

    fn table_mut(&mut self, entity_type: EntityType) -> &mut BTreeMap<EntityId, Entity> {
        self.entities.entry(entity_type).or_default()
    }
}

pub struct MemoryStore {
    state: RwLock<StoreState>,
    snapshot_path: Option<PathBuf>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            snapshot_path: None,
        }
    }

    /// Open a store backed by a snapshot file. A missing file yields an empty
    /// store; leftovers from an interrupted write are discarded.
    pub fn open(snapshot_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = snapshot_path.as_ref().to_path_buf();
        let tmp_path = path.with_extension("yaml.tmp");
        if tmp_path.exists() {
            debug!(path = %tmp_path.display(), "Removing interrupted write");
            let _ = std::fs::remove_file(&tmp_path);
        }

        let state = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(persistence_err)?;
            serde_yaml_bw::from_str(&content).map_err(persistence_err)?
        } else {
            StoreState::default()
        };

        Ok(Self {
            state: RwLock::new(state),
            snapshot_path: Some(path),
        })
    }

    pub fn count(&self, entity_type: EntityType) -> usize {
        self.state
            .read()
            .table(entity_type)
            .map(|t| t.len())
            .unwrap_or(0)
    }

    fn write_atomic(path: &Path, content: &str) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(persistence_err)?;
        }
        let tmp_path = path.with_extension("yaml.tmp");
        std::fs::write(&tmp_path, content).map_err(persistence_err)?;
        if let Err(e) = std::fs::File::open(&tmp_path).and_then(|file| file.sync_all()) {
            warn!(error = %e, "Failed to sync temp file to disk");
        }
        std::fs::rename(&tmp_path, path).map_err(persistence_err)?;
        debug!(path = %path.display(), "Atomic write completed");
        Ok(())
    }
}

fn persistence_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::Persistence(e.to_string())
}

impl EntityStore for MemoryStore {
    fn create(&self, draft: EntityDraft) -> Result<Entity, StoreError> {
        let mut state = self.state.write();
        let entity_type = draft.entity_type;
        // Validate the draft before burning an id.
        draft.clone().build(0)?;
        let id = state.allocate_id(entity_type);
        let entity = draft.build(id)?;
        state.table_mut(entity_type).insert(id, entity.clone());
        Ok(entity)
    }

    fn get(&self, entity_type: EntityType, id: EntityId) -> Result<Option<Entity>, StoreError> {
        Ok(self
            .state
            .read()
            .table(entity_type)
            .and_then(|t| t.get(&id))
            .cloned())
    }

    fn list(
        &self,
        entity_type: EntityType,
        filter: &ListFilter,
    ) -> Result<Vec<Entity>, StoreError> {
        let state = self.state.read();
        Ok(state
            .table(entity_type)
            .map(|t| t.values().filter(|e| filter.matches(e)).cloned().collect())
            .unwrap_or_default())
    }

    fn update(
        &self,
        entity_type: EntityType,
        id: EntityId,
        changes: &EntityChanges,
    ) -> Result<Entity, StoreError> {
        let mut state = self.state.write();
        let entity = state
            .table_mut(entity_type)
            .get_mut(&id)
            .ok_or(StoreError::NotFound { entity_type, id })?;
        if entity.is_deleted() {
            return Err(StoreError::AlreadyDeleted { entity_type, id });
        }
        changes.apply_to(entity);
        Ok(entity.clone())
    }

    fn delete(
        &self,
        entity_type: EntityType,
        id: EntityId,
        mode: DeleteMode,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write();
        let table = state.table_mut(entity_type);
        match mode {
            DeleteMode::Soft => {
                let entity = table
                    .get_mut(&id)
                    .ok_or(StoreError::NotFound { entity_type, id })?;
                soft_delete(entity)
            }
            DeleteMode::Hard => table
                .remove(&id)
                .map(|_| ())
                .ok_or(StoreError::NotFound { entity_type, id }),
        }
    }

    fn flush(&self) -> Result<(), StoreError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let content = {
            let state = self.state.read();
            serde_yaml_bw::to_string(&*state).map_err(persistence_err)?
        };
        Self::write_atomic(path, &content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProjectScope;

    fn project(store: &MemoryStore, name: &str) -> Entity {
        store
            .create(EntityDraft::new(
                EntityType::Project,
                EntityChanges {
                    name: Some(name.into()),
                    ..Default::default()
                },
            ))
            .unwrap()
    }

    #[test]
    fn test_ids_are_per_type() {
        let store = MemoryStore::new();
        let p1 = project(&store, "A");
        let p2 = project(&store, "B");
        let epic = store
            .create(EntityDraft::new(
                EntityType::Epic,
                EntityChanges {
                    project_id: Some(p1.id()),
                    ..Default::default()
                },
            ))
            .unwrap();
        assert_eq!((p1.id(), p2.id(), epic.id()), (1, 2, 1));
    }

    #[test]
    fn test_failed_create_does_not_consume_id() {
        let store = MemoryStore::new();
        let err = store.create(EntityDraft::new(EntityType::Epic, EntityChanges::default()));
        assert!(err.is_err());
        let p = project(&store, "A");
        let epic = store
            .create(EntityDraft::new(
                EntityType::Epic,
                EntityChanges {
                    project_id: Some(p.id()),
                    ..Default::default()
                },
            ))
            .unwrap();
        assert_eq!(epic.id(), 1);
    }

    #[test]
    fn test_soft_delete_hides_from_list() {
        let store = MemoryStore::new();
        let p = project(&store, "A");
        store
            .delete(EntityType::Project, p.id(), DeleteMode::Soft)
            .unwrap();

        let filter = ListFilter::new(ProjectScope::AllProjects);
        assert!(store.list(EntityType::Project, &filter).unwrap().is_empty());
        assert_eq!(
            store
                .list(EntityType::Project, &filter.including_deleted())
                .unwrap()
                .len(),
            1
        );
        assert!(store.get_live(EntityType::Project, p.id()).unwrap().is_none());
        assert_eq!(
            store.delete(EntityType::Project, p.id(), DeleteMode::Soft),
            Err(StoreError::AlreadyDeleted {
                entity_type: EntityType::Project,
                id: p.id()
            })
        );
    }

    #[test]
    fn test_hard_delete_removes() {
        let store = MemoryStore::new();
        let p = project(&store, "A");
        store
            .delete(EntityType::Project, p.id(), DeleteMode::Hard)
            .unwrap();
        assert_eq!(store.count(EntityType::Project), 0);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.yaml");
        {
            let store = MemoryStore::open(&path).unwrap();
            project(&store, "Persisted");
            store.flush().unwrap();
        }
        let reopened = MemoryStore::open(&path).unwrap();
        let projects = reopened
            .list(EntityType::Project, &ListFilter::new(ProjectScope::AllProjects))
            .unwrap();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].name(), "Persisted");
        // Id counter survives the reload.
        assert_eq!(project(&reopened, "Next").id(), 2);
    }
}
