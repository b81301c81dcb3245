//! Store seeding helpers.

use std::collections::BTreeSet;

use work_pilot::model::{EntityChanges, EntityDraft, EntityId, EntityStore, EntityType};

fn create(store: &dyn EntityStore, entity_type: EntityType, changes: EntityChanges) -> EntityId {
    store
        .create(EntityDraft::new(entity_type, changes))
        .unwrap()
        .id()
}

pub fn project(store: &dyn EntityStore, name: &str) -> EntityId {
    create(
        store,
        EntityType::Project,
        EntityChanges {
            name: Some(name.into()),
            ..Default::default()
        },
    )
}

pub fn epic(store: &dyn EntityStore, project_id: EntityId, name: &str) -> EntityId {
    create(
        store,
        EntityType::Epic,
        EntityChanges {
            name: Some(name.into()),
            project_id: Some(project_id),
            ..Default::default()
        },
    )
}

pub fn story(store: &dyn EntityStore, project_id: EntityId, epic_id: EntityId, name: &str) -> EntityId {
    create(
        store,
        EntityType::Story,
        EntityChanges {
            name: Some(name.into()),
            project_id: Some(project_id),
            epic_id: Some(epic_id),
            ..Default::default()
        },
    )
}

pub fn task(
    store: &dyn EntityStore,
    project_id: EntityId,
    story_id: Option<EntityId>,
    name: &str,
    description: &str,
) -> EntityId {
    create(
        store,
        EntityType::Task,
        EntityChanges {
            name: Some(name.into()),
            description: Some(description.into()),
            project_id: Some(project_id),
            story_id,
            ..Default::default()
        },
    )
}

pub fn milestone(
    store: &dyn EntityStore,
    project_id: EntityId,
    name: &str,
    epic_ids: &[EntityId],
) -> EntityId {
    create(
        store,
        EntityType::Milestone,
        EntityChanges {
            name: Some(name.into()),
            project_id: Some(project_id),
            epic_ids: Some(epic_ids.iter().copied().collect::<BTreeSet<_>>()),
            ..Default::default()
        },
    )
}
