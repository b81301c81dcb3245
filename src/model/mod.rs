//! Work hierarchy entities and the persistence contract.
//!
//! - `Entity`: Project → Epic → Story → Task, plus Milestone
//! - `FieldPatch`: sparse parameter map with an explicit `Unset` sentinel
//! - `EntityStore`: symmetric CRUD with explicit project scoping
//! - `MemoryStore`: in-process store with YAML snapshots

mod entity;
mod memory;
mod patch;
mod store;

pub use entity::{
    Entity, EntityId, EntityMeta, EntityType, Epic, Milestone, Priority, Project, Status, Story,
    Task,
};
pub use memory::MemoryStore;
pub use patch::{Field, FieldPatch, FieldValue};
pub use store::{
    DeleteMode, EntityChanges, EntityDraft, EntityStore, ListFilter, ProjectScope, StoreError,
};
