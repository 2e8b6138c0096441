//! Authoritative set of objects mirrored into the GPU object tables.
//!
//! Scene diffs are staged and only take effect in [`ObjectRegistry::reconcile`],
//! once per frame. A removal followed by a re-add of the same entity before
//! that point becomes an in-place update that keeps the `ObjectId`.

use std::collections::{BTreeMap, BTreeSet};

use super::entity::SceneEntity;
use super::events::SceneEvent;
use super::key::SurfaceCacheKey;
use crate::alloc::SlotAllocator;
use crate::core::{Aabb, EntityId, ObjectId, SurfaceCacheId};
use crate::render::{MiniObjectGpuData, ObjectGpuData};
use crate::surface::SurfaceCacheManager;

pub struct ObjectRecord {
    pub id: ObjectId,
    pub entity: SceneEntity,
    pub world_bounds: Aabb,
    pub surface_cache: Option<SurfaceCacheId>,
    pub key: Option<SurfaceCacheKey>,
}

impl ObjectRecord {
    pub fn gpu_data(&self) -> ObjectGpuData {
        ObjectGpuData::new(self)
    }
}

/// Object ids touched by the last reconciliation, for GPU table sync.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjectCommands {
    pub added: Vec<ObjectId>,
    pub updated: Vec<ObjectId>,
    pub removed: Vec<ObjectId>,
}

impl ObjectCommands {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    pub fn clear(&mut self) {
        self.added.clear();
        self.updated.clear();
        self.removed.clear();
    }
}

pub struct ObjectRegistry {
    ids: SlotAllocator<EntityId>,
    records: Vec<Option<ObjectRecord>>,
    pending_add: BTreeMap<EntityId, SceneEntity>,
    pending_remove: BTreeSet<EntityId>,
    commands: ObjectCommands,
    dirty_bounds: Vec<Aabb>,
}

impl ObjectRegistry {
    pub fn new(capacity: u32) -> Self {
        let mut records = Vec::with_capacity(capacity as usize);
        records.resize_with(capacity as usize, || None);
        Self {
            ids: SlotAllocator::new(capacity),
            records,
            pending_add: BTreeMap::new(),
            pending_remove: BTreeSet::new(),
            commands: ObjectCommands::default(),
            dirty_bounds: Vec::new(),
        }
    }

    /// Stages one frame's diff. Removals are applied before additions so
    /// an entity listed in both is treated as updated.
    pub fn apply_scene_diff(&mut self, added: &[SceneEntity], removed: &[EntityId]) {
        for id in removed {
            self.stage_remove(*id);
        }
        for entity in added {
            self.stage_add(entity.clone());
        }
    }

    pub fn apply_events(&mut self, events: impl IntoIterator<Item = SceneEvent>) {
        for event in events {
            match event {
                SceneEvent::Added(entity) => self.stage_add(entity),
                SceneEvent::Removed(id) => self.stage_remove(id),
            }
        }
    }

    fn stage_add(&mut self, entity: SceneEntity) {
        self.pending_add.insert(entity.id, entity);
    }

    fn stage_remove(&mut self, id: EntityId) {
        self.pending_remove.insert(id);
        // add then remove before reconciliation cancels out
        self.pending_add.remove(&id);
    }

    /// Applies every staged change, keeping surface cache references in step.
    pub fn reconcile(&mut self, surface: &mut SurfaceCacheManager) -> &ObjectCommands {
        self.commands.clear();

        let removals = std::mem::take(&mut self.pending_remove);
        for entity_id in removals {
            let Some(slot) = self.ids.find(&entity_id) else {
                continue;
            };
            let object = ObjectId(slot);

            let readded = self
                .pending_add
                .remove(&entity_id)
                .filter(|e| e.gi_visible);
            match readded {
                Some(entity) => self.update_in_place(object, entity, surface),
                None => self.remove_object(entity_id, object, surface),
            }
        }

        let additions = std::mem::take(&mut self.pending_add);
        for (entity_id, entity) in additions {
            if !entity.gi_visible {
                continue;
            }
            if let Some(slot) = self.ids.find(&entity_id) {
                // added twice without a removal in between
                self.update_in_place(ObjectId(slot), entity, surface);
                continue;
            }
            let Some(slot) = self.ids.allocate(entity_id) else {
                tracing::warn!(?entity_id, "Object table full, skipping entity this frame");
                continue;
            };

            let object = ObjectId(slot);
            let world_bounds = entity.world_bounds();
            let record = self.records[object.index()].insert(ObjectRecord {
                id: object,
                entity,
                world_bounds,
                surface_cache: None,
                key: None,
            });
            surface.reference_surface_cache(record);
            self.dirty_bounds.push(world_bounds);
            self.commands.added.push(object);
        }

        if !self.commands.is_empty() {
            tracing::debug!(
                added = self.commands.added.len(),
                updated = self.commands.updated.len(),
                removed = self.commands.removed.len(),
                live = self.ids.len(),
                "Reconciled scene objects"
            );
        }
        &self.commands
    }

    fn update_in_place(
        &mut self,
        object: ObjectId,
        entity: SceneEntity,
        surface: &mut SurfaceCacheManager,
    ) {
        let Some(record) = self.records[object.index()].as_mut() else {
            panic!("object slot {} has no record", object.0);
        };
        let old_bounds = record.world_bounds;
        record.world_bounds = entity.world_bounds();
        record.entity = entity;
        surface.reference_surface_cache(record);

        self.dirty_bounds.push(old_bounds);
        self.dirty_bounds.push(record.world_bounds);
        self.commands.updated.push(object);
    }

    fn remove_object(
        &mut self,
        entity_id: EntityId,
        object: ObjectId,
        surface: &mut SurfaceCacheManager,
    ) {
        let Some(mut record) = self.records[object.index()].take() else {
            panic!("object slot {} has no record", object.0);
        };
        surface.dereference_surface_cache(&mut record);
        self.ids.release(&entity_id);

        self.dirty_bounds.push(record.world_bounds);
        self.commands.removed.push(object);
    }

    pub fn get(&self, id: ObjectId) -> Option<&ObjectRecord> {
        self.records.get(id.index()).and_then(|r| r.as_ref())
    }

    pub fn find(&self, entity: EntityId) -> Option<ObjectId> {
        self.ids.find(&entity).map(ObjectId)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn capacity(&self) -> u32 {
        self.ids.capacity()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObjectRecord> {
        self.records.iter().flatten()
    }

    pub fn commands(&self) -> &ObjectCommands {
        &self.commands
    }

    pub fn take_dirty_bounds(&mut self) -> Vec<Aabb> {
        std::mem::take(&mut self.dirty_bounds)
    }

    /// Descriptors of objects added or updated by the last reconciliation.
    pub fn changed_object_data(&self) -> Vec<(ObjectId, ObjectGpuData)> {
        self.commands
            .added
            .iter()
            .chain(&self.commands.updated)
            .filter_map(|id| self.get(*id).map(|r| (*id, r.gpu_data())))
            .collect()
    }

    /// Live objects packed without holes, in slot order.
    pub fn compact_object_data(&self) -> Vec<MiniObjectGpuData> {
        self.iter().map(MiniObjectGpuData::new).collect()
    }
}
