//! Surface cache entries: deduplicated captured appearance shared by every
//! object with the same [`SurfaceCacheKey`].
//!
//! Each entry owns one atlas region per card. An entry lives exactly as long
//! as its reference set is non-empty; dropping the last reference releases
//! its regions (queued for clearing) and its id in the same call.

use std::collections::BTreeSet;

use glam::{Mat4, Vec4};
use rand::prelude::*;

use super::card::{CubeFace, card_view_projection, uv_transform, viewport_info};
use crate::alloc::{AtlasAllocator, AtlasRegion, SlotAllocator};
use crate::constants::MAX_CARDS_PER_MESH;
use crate::core::{Aabb, ObjectId, SurfaceCacheId};
use crate::render::{CardGpuData, SurfaceCacheGpuData};
use crate::scene::{LayoutId, MaterialId, ObjectRecord, ObjectRegistry, SurfaceCacheKey};
use crate::settings::SurfaceCacheSettings;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Card {
    pub face: CubeFace,
    pub local_to_card: Mat4,
    pub region: Option<AtlasRegion>,
}

/// A drawable batch of the representative object, drawn once per card.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CaptureBatch {
    pub layout: LayoutId,
    pub material: MaterialId,
    pub instance_count: u32,
}

pub struct SurfaceCacheEntry {
    pub id: SurfaceCacheId,
    pub key: SurfaceCacheKey,
    references: BTreeSet<ObjectId>,
    pub cards: Vec<Card>,
    pub resolution: u32,
    pub representative: Option<ObjectId>,
    pub batches: Vec<CaptureBatch>,
}

impl SurfaceCacheEntry {
    fn new(id: SurfaceCacheId, key: SurfaceCacheKey) -> Self {
        Self {
            id,
            key,
            references: BTreeSet::new(),
            cards: CubeFace::ALL
                .iter()
                .map(|&face| Card {
                    face,
                    local_to_card: Mat4::IDENTITY,
                    region: None,
                })
                .collect(),
            resolution: 0,
            representative: None,
            batches: Vec::new(),
        }
    }

    pub fn references(&self) -> &BTreeSet<ObjectId> {
        &self.references
    }

    pub fn reference_count(&self) -> usize {
        self.references.len()
    }

    pub fn is_placed(&self) -> bool {
        self.cards.iter().all(|c| c.region.is_some())
    }

    pub fn gpu_data(&self) -> SurfaceCacheGpuData {
        SurfaceCacheGpuData::new(self.id.0, self.cards.len() as u32, self.resolution)
    }

    pub fn card_gpu_data(&self) -> Vec<CardGpuData> {
        self.cards
            .iter()
            .map(|card| {
                let uv = card.region.as_ref().map(uv_transform).unwrap_or(Vec4::ZERO);
                CardGpuData::new(card.local_to_card, uv)
            })
            .collect()
    }
}

/// One card render request.
#[derive(Clone, Debug, PartialEq)]
pub struct CardCapture {
    pub face: CubeFace,
    pub region: AtlasRegion,
    pub view_projection: Mat4,
    pub viewport: Vec4,
}

/// Everything the rasterizer needs to refresh one surface cache entry.
#[derive(Clone, Debug, PartialEq)]
pub struct CaptureJob {
    pub surface_cache: SurfaceCacheId,
    pub representative: ObjectId,
    pub local_to_world: Mat4,
    pub resolution: u32,
    pub cards: Vec<CardCapture>,
    pub batches: Vec<CaptureBatch>,
}

pub struct SurfaceCacheManager {
    settings: SurfaceCacheSettings,
    ids: SlotAllocator<SurfaceCacheKey>,
    entries: Vec<Option<SurfaceCacheEntry>>,
    atlas: AtlasAllocator,
    pending_capture: BTreeSet<SurfaceCacheId>,
    deferred_capture: BTreeSet<SurfaceCacheId>,
    clear_regions: Vec<AtlasRegion>,
    released: Vec<SurfaceCacheId>,
    rng: StdRng,
}

impl SurfaceCacheManager {
    pub fn new(settings: &SurfaceCacheSettings, capacity: u32) -> Self {
        let mut entries = Vec::with_capacity(capacity as usize);
        entries.resize_with(capacity as usize, || None);
        Self {
            settings: settings.clone(),
            ids: SlotAllocator::new(capacity),
            entries,
            atlas: AtlasAllocator::new(settings.atlas_resolution, settings.min_node_size),
            pending_capture: BTreeSet::new(),
            deferred_capture: BTreeSet::new(),
            clear_regions: Vec::new(),
            released: Vec::new(),
            rng: StdRng::seed_from_u64(settings.rotation_seed),
        }
    }

    /// Replaces every tuning field. Atlas layout fields are fixed at
    /// construction; a new rotation seed restarts the check rotation.
    pub fn update_tuning(&mut self, settings: &SurfaceCacheSettings) {
        if settings.rotation_seed != self.settings.rotation_seed {
            self.rng = StdRng::seed_from_u64(settings.rotation_seed);
        }
        self.settings = SurfaceCacheSettings {
            atlas_resolution: self.settings.atlas_resolution,
            min_node_size: self.settings.min_node_size,
            ..settings.clone()
        };
    }

    pub fn set_force_capture(&mut self, force: bool) {
        self.settings.force_capture = force;
    }

    pub fn get(&self, id: SurfaceCacheId) -> Option<&SurfaceCacheEntry> {
        self.entries.get(id.index()).and_then(|e| e.as_ref())
    }

    fn entry_mut(&mut self, id: SurfaceCacheId) -> &mut SurfaceCacheEntry {
        match self.entries.get_mut(id.index()).and_then(|e| e.as_mut()) {
            Some(entry) => entry,
            None => panic!("surface cache {} is not allocated", id.0),
        }
    }

    pub fn find(&self, key: &SurfaceCacheKey) -> Option<SurfaceCacheId> {
        self.ids.find(key).map(SurfaceCacheId)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SurfaceCacheEntry> {
        self.entries.iter().flatten()
    }

    pub fn settings(&self) -> &SurfaceCacheSettings {
        &self.settings
    }

    pub fn live_entries(&self) -> usize {
        self.ids.len()
    }

    pub fn capacity(&self) -> u32 {
        self.ids.capacity()
    }

    pub fn atlas(&self) -> &AtlasAllocator {
        &self.atlas
    }

    pub fn pending_captures(&self) -> &BTreeSet<SurfaceCacheId> {
        &self.pending_capture
    }

    pub fn deferred_captures(&self) -> &BTreeSet<SurfaceCacheId> {
        &self.deferred_capture
    }

    /// Binds `record` to the entry matching its current key, creating and
    /// queueing a new entry if none matches. A previous binding to another
    /// entry is dropped only after the new reference is in place.
    pub fn reference_surface_cache(&mut self, record: &mut ObjectRecord) -> Option<SurfaceCacheId> {
        let key = SurfaceCacheKey::from_entity(&record.entity);
        let id = match self.find(&key) {
            Some(id) => Some(id),
            None => self.create_entry(key.clone()),
        };

        if let Some(id) = id {
            self.entry_mut(id).references.insert(record.id);
        }
        if let Some(old) = record.surface_cache {
            if Some(old) != id {
                self.drop_reference(old, record.id);
            }
        }

        record.surface_cache = id;
        record.key = id.map(|_| key);
        id
    }

    pub fn dereference_surface_cache(&mut self, record: &mut ObjectRecord) {
        if let Some(id) = record.surface_cache.take() {
            self.drop_reference(id, record.id);
        }
        record.key = None;
    }

    fn create_entry(&mut self, key: SurfaceCacheKey) -> Option<SurfaceCacheId> {
        let Some(slot) = self.ids.allocate(key.clone()) else {
            tracing::warn!("Surface cache table full, object left without a surface cache");
            return None;
        };
        let id = SurfaceCacheId(slot);
        self.entries[id.index()] = Some(SurfaceCacheEntry::new(id, key));
        self.pending_capture.insert(id);
        tracing::trace!(id = id.0, "Created surface cache entry");
        Some(id)
    }

    fn drop_reference(&mut self, id: SurfaceCacheId, object: ObjectId) {
        let entry = self.entry_mut(id);
        assert!(
            entry.references.remove(&object),
            "object {} does not reference surface cache {}",
            object.0,
            id.0
        );
        if !entry.references.is_empty() {
            return;
        }

        self.release_texture_space(id);
        if let Some(entry) = self.entries[id.index()].take() {
            self.ids.release(&entry.key);
        }
        self.pending_capture.remove(&id);
        self.deferred_capture.remove(&id);
        self.released.push(id);
        tracing::trace!(id = id.0, "Released surface cache entry");
    }

    /// Frees every placed card of `id` and queues the regions for clearing.
    pub fn release_texture_space(&mut self, id: SurfaceCacheId) {
        let entry = self.entry_mut(id);
        if entry.resolution == 0 {
            return;
        }
        let regions: Vec<AtlasRegion> =
            entry.cards.iter_mut().filter_map(|c| c.region.take()).collect();
        entry.resolution = 0;

        for region in regions {
            self.atlas.release(region);
            self.clear_regions.push(region);
        }
    }

    /// Card resolution for an object whose largest scaled axis is `world_size`.
    pub fn target_resolution(&self, world_size: f32) -> u32 {
        let s = &self.settings;
        let tier = s
            .resolution_thresholds
            .iter()
            .take_while(|&&threshold| world_size >= threshold)
            .count() as u32;
        (s.min_node_size << tier).clamp(s.min_node_size, s.max_card_resolution)
    }

    /// Resizes `id` for its largest consumer. Returns true if the entry was
    /// queued for recapture; the world bounds of every referencing object
    /// are appended to `dirty` in that case.
    pub fn adjust_resolution(
        &mut self,
        id: SurfaceCacheId,
        registry: &ObjectRegistry,
        dirty: &mut Vec<Aabb>,
    ) -> bool {
        let Some(entry) = self.get(id) else {
            return false;
        };
        let required = entry
            .references
            .iter()
            .filter_map(|object| registry.get(*object))
            .map(|record| self.target_resolution(record.entity.world_size()))
            .max()
            .unwrap_or(self.settings.default_card_resolution);

        if required == entry.resolution && !self.settings.force_capture {
            return false;
        }

        dirty.extend(
            entry
                .references
                .iter()
                .filter_map(|object| registry.get(*object))
                .map(|record| record.world_bounds),
        );
        self.release_texture_space(id);
        self.entry_mut(id).resolution = required;
        self.pending_capture.insert(id);
        true
    }

    /// Checks up to the per-frame quota of entries, walking round-robin from
    /// a random start.
    pub fn run_resolution_checks(
        &mut self,
        registry: &ObjectRegistry,
        dirty: &mut Vec<Aabb>,
    ) -> usize {
        let live: Vec<SurfaceCacheId> = self.iter().map(|e| e.id).collect();
        if live.is_empty() {
            return 0;
        }

        let quota = self.settings.resolution_checks_per_frame.min(live.len());
        let start = self.rng.random_range(0..live.len());
        let mut changed = 0;
        for i in 0..quota {
            let id = live[(start + i) % live.len()];
            if self.adjust_resolution(id, registry, dirty) {
                changed += 1;
            }
        }
        changed
    }

    /// Places one region per card at the entry's resolution. On failure
    /// nothing stays allocated and the caller should retry next frame.
    pub fn allocate_capture_space(&mut self, id: SurfaceCacheId) -> bool {
        let default_resolution = self
            .settings
            .default_card_resolution
            .clamp(self.settings.min_node_size, self.settings.max_card_resolution);
        let entry = self.entry_mut(id);
        if entry.resolution == 0 {
            entry.resolution = default_resolution;
        }
        if entry.is_placed() {
            return true;
        }
        let resolution = entry.resolution;
        let card_count = entry.cards.len();

        let mut placed = Vec::with_capacity(card_count);
        for _ in 0..card_count {
            match self.atlas.allocate(resolution) {
                Some(region) => placed.push(region),
                None => {
                    for region in placed {
                        self.atlas.release(region);
                    }
                    tracing::warn!(
                        id = id.0,
                        resolution,
                        "Surface cache atlas full, deferring capture"
                    );
                    return false;
                }
            }
        }

        let entry = self.entry_mut(id);
        for (card, region) in entry.cards.iter_mut().zip(placed) {
            card.region = Some(region);
        }
        true
    }

    /// Picks the representative object and derives the card transforms and
    /// drawable batches from it.
    pub fn gather_capture_geometry(
        &mut self,
        id: SurfaceCacheId,
        registry: &ObjectRegistry,
    ) -> bool {
        let entry = self.entry_mut(id);
        let Some(record) = entry
            .references
            .iter()
            .find_map(|object| registry.get(*object))
        else {
            return false;
        };

        let instance_count = entry.cards.len() as u32;
        for card in entry.cards.iter_mut() {
            card.local_to_card = card_view_projection(card.face, &record.entity.local_bounds);
        }
        entry.batches = record
            .entity
            .capture_batches()
            .map(|b| CaptureBatch {
                layout: b.layout,
                material: b.material,
                instance_count,
            })
            .collect();
        entry.representative = Some(record.id);
        true
    }

    /// Resolution checks, then capture-space allocation for everything
    /// queued, then geometry gathering. Entries that could not be placed are
    /// carried to the next frame.
    pub fn prepare_captures(
        &mut self,
        registry: &ObjectRegistry,
        dirty: &mut Vec<Aabb>,
    ) -> Vec<CaptureJob> {
        let deferred = std::mem::take(&mut self.deferred_capture);
        self.pending_capture.extend(deferred);

        let changed = self.run_resolution_checks(registry, dirty);

        let queued = std::mem::take(&mut self.pending_capture);
        let mut placed = Vec::with_capacity(queued.len());
        for id in queued {
            if self.allocate_capture_space(id) {
                placed.push(id);
            } else {
                self.deferred_capture.insert(id);
            }
        }

        let mut jobs = Vec::with_capacity(placed.len());
        for id in placed {
            if !self.gather_capture_geometry(id, registry) {
                continue;
            }
            if let Some(job) = self.capture_job(id, registry) {
                jobs.push(job);
            }
        }

        if !jobs.is_empty() || changed > 0 {
            tracing::debug!(
                captures = jobs.len(),
                resized = changed,
                deferred = self.deferred_capture.len(),
                "Prepared surface cache captures"
            );
        }
        jobs
    }

    fn capture_job(&self, id: SurfaceCacheId, registry: &ObjectRegistry) -> Option<CaptureJob> {
        let entry = self.get(id)?;
        let representative = entry.representative?;
        let record = registry.get(representative)?;
        let atlas_resolution = self.atlas.resolution();

        let cards = entry
            .cards
            .iter()
            .filter_map(|card| {
                let region = card.region?;
                Some(CardCapture {
                    face: card.face,
                    region,
                    view_projection: card.local_to_card,
                    viewport: viewport_info(&region, atlas_resolution),
                })
            })
            .collect();

        Some(CaptureJob {
            surface_cache: id,
            representative,
            local_to_world: record.entity.transform,
            resolution: entry.resolution,
            cards,
            batches: entry.batches.clone(),
        })
    }

    pub fn take_clear_regions(&mut self) -> Vec<AtlasRegion> {
        std::mem::take(&mut self.clear_regions)
    }

    pub fn take_released(&mut self) -> Vec<SurfaceCacheId> {
        std::mem::take(&mut self.released)
    }

    /// Full descriptor tables: one `SurfaceCacheGpuData` per slot and
    /// `MAX_CARDS_PER_MESH` card records per slot.
    pub fn descriptor_arrays(&self) -> (Vec<SurfaceCacheGpuData>, Vec<CardGpuData>) {
        let capacity = self.entries.len();
        let mut infos = vec![SurfaceCacheGpuData::invalid(); capacity];
        let mut cards = vec![CardGpuData::default(); capacity * MAX_CARDS_PER_MESH];
        for entry in self.iter() {
            infos[entry.id.index()] = entry.gpu_data();
            let base = entry.id.index() * MAX_CARDS_PER_MESH;
            for (i, card) in entry.card_gpu_data().into_iter().enumerate() {
                cards[base + i] = card;
            }
        }
        (infos, cards)
    }
}
