//! Per-frame scheduler tying the registry, surface caches and per-view
//! clipmaps together.
//!
//! One call to [`GiScene::update`] runs the fixed pipeline: drain scene
//! events, reconcile objects, check surface cache resolutions, allocate
//! capture space, gather capture geometry, then scroll and dirty every
//! view's clipmap. Views live in an explicit map; a view not listed in a
//! frame is dropped by the sweep at the end of that frame.

use std::sync::Arc;

use glam::Vec3;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::alloc::AtlasRegion;
use crate::core::{Aabb, EntityId, ObjectId, SurfaceCacheId, ViewId};
use crate::error::{GiError, GiResult};
use crate::render::{CardGpuData, MiniObjectGpuData, ObjectGpuData, SurfaceCacheGpuData};
use crate::scene::{ObjectCommands, ObjectRegistry, SceneDiffQueue, SceneDiffSender, SceneEntity};
use crate::settings::GiSettings;
use crate::surface::{CaptureJob, SurfaceCacheManager};
use crate::voxel::{ChunkOccupancy, ClipmapUpdate, PageTableUpdate, VoxelClipmap, VoxelInjector};

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ViewInput {
    pub id: ViewId,
    pub position: Vec3,
}

struct ViewState {
    clipmap: VoxelClipmap,
    last_frame: u64,
}

#[derive(Clone, Debug)]
pub struct SurfaceCacheUpload {
    pub id: SurfaceCacheId,
    pub info: SurfaceCacheGpuData,
    pub cards: Vec<CardGpuData>,
}

#[derive(Clone, Debug)]
pub struct ViewOutputs {
    pub view: ViewId,
    pub clipmap: ClipmapUpdate,
    /// Page-table entries changed since the previous frame's outputs.
    pub page_updates: Vec<PageTableUpdate>,
}

/// Everything one frame hands to the rendering backend.
#[derive(Clone, Debug, Default)]
pub struct FrameOutputs {
    pub frame: u64,
    pub object_commands: ObjectCommands,
    pub changed_objects: Vec<(ObjectId, ObjectGpuData)>,
    pub objects: Vec<MiniObjectGpuData>,
    pub surface_caches: Vec<SurfaceCacheUpload>,
    pub released_surface_caches: Vec<SurfaceCacheId>,
    pub captures: Vec<CaptureJob>,
    pub clear_regions: Vec<AtlasRegion>,
    pub dirty_bounds: Vec<Aabb>,
    pub views: Vec<ViewOutputs>,
}

impl FrameOutputs {
    pub fn view(&self, id: ViewId) -> Option<&ViewOutputs> {
        self.views.iter().find(|v| v.view == id)
    }
}

/// Last committed frame, readable from other threads.
#[derive(Clone, Default)]
pub struct SharedFrameOutputs {
    inner: Arc<RwLock<Option<Arc<FrameOutputs>>>>,
}

impl SharedFrameOutputs {
    pub fn publish(&self, outputs: Arc<FrameOutputs>) {
        *self.inner.write() = Some(outputs);
    }

    pub fn latest(&self) -> Option<Arc<FrameOutputs>> {
        self.inner.read().clone()
    }
}

pub struct GiScene {
    settings: GiSettings,
    frame: u64,
    registry: ObjectRegistry,
    surface: SurfaceCacheManager,
    views: FxHashMap<ViewId, ViewState>,
    events: SceneDiffQueue,
    shared: SharedFrameOutputs,
}

impl GiScene {
    pub fn new(settings: GiSettings) -> GiResult<Self> {
        settings.validate()?;
        tracing::info!(
            max_objects = settings.scene.max_objects,
            max_surface_caches = settings.scene.max_surface_caches,
            atlas = settings.surface_cache.atlas_resolution,
            levels = settings.clipmap.num_levels,
            "Creating GI scene"
        );
        Ok(Self {
            registry: ObjectRegistry::new(settings.scene.max_objects),
            surface: SurfaceCacheManager::new(
                &settings.surface_cache,
                settings.scene.max_surface_caches,
            ),
            settings,
            frame: 0,
            views: FxHashMap::default(),
            events: SceneDiffQueue::new(),
            shared: SharedFrameOutputs::default(),
        })
    }

    pub fn settings(&self) -> &GiSettings {
        &self.settings
    }

    /// Applies tunables. Table capacities and the atlas layout are fixed
    /// for the lifetime of the scene; clipmap layout changes reset every
    /// view's volumes.
    pub fn apply_settings(&mut self, settings: GiSettings) -> GiResult<()> {
        settings.validate()?;
        let old = &self.settings;
        if settings.scene != old.scene
            || settings.surface_cache.atlas_resolution != old.surface_cache.atlas_resolution
            || settings.surface_cache.min_node_size != old.surface_cache.min_node_size
        {
            return Err(GiError::invalid_settings(
                "table capacities and atlas layout cannot change at runtime",
            ));
        }

        self.surface.update_tuning(&settings.surface_cache);
        for view in self.views.values_mut() {
            view.clipmap.apply_settings(&settings.clipmap);
        }
        self.settings = settings;
        Ok(())
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    pub fn surface(&self) -> &SurfaceCacheManager {
        &self.surface
    }

    pub fn scene_sender(&self) -> SceneDiffSender {
        self.events.sender()
    }

    pub fn shared_outputs(&self) -> SharedFrameOutputs {
        self.shared.clone()
    }

    /// Stages a diff directly, bypassing the event queue.
    pub fn apply_scene_diff(&mut self, added: &[SceneEntity], removed: &[EntityId]) {
        self.registry.apply_scene_diff(added, removed);
    }

    pub fn clipmap(&self, view: ViewId) -> Option<&VoxelClipmap> {
        self.views.get(&view).map(|v| &v.clipmap)
    }

    pub fn view_count(&self) -> usize {
        self.views.len()
    }

    pub fn update(&mut self, views: &[ViewInput]) -> Arc<FrameOutputs> {
        self.frame += 1;
        let frame = self.frame;

        self.registry.apply_events(self.events.drain());
        let object_commands = self.registry.reconcile(&mut self.surface).clone();
        let mut dirty_bounds = self.registry.take_dirty_bounds();

        let captures = self.surface.prepare_captures(&self.registry, &mut dirty_bounds);
        let surface_caches = captures
            .iter()
            .filter_map(|job| self.surface.get(job.surface_cache))
            .map(|entry| SurfaceCacheUpload {
                id: entry.id,
                info: entry.gpu_data(),
                cards: entry.card_gpu_data(),
            })
            .collect();

        for input in views {
            let clipmap_settings = &self.settings.clipmap;
            let state = self.views.entry(input.id).or_insert_with(|| {
                tracing::debug!(view = ?input.id, "New view");
                ViewState {
                    clipmap: VoxelClipmap::new(clipmap_settings),
                    last_frame: frame,
                }
            });
            state.last_frame = frame;
        }
        self.sweep_views();

        let mut view_outputs = Vec::with_capacity(views.len());
        for input in views {
            if view_outputs.iter().any(|v: &ViewOutputs| v.view == input.id) {
                continue;
            }
            let Some(state) = self.views.get_mut(&input.id) else {
                continue;
            };
            let clipmap = state.clipmap.update(frame, input.position, &dirty_bounds);
            view_outputs.push(ViewOutputs {
                view: input.id,
                clipmap,
                page_updates: state.clipmap.take_page_updates(),
            });
        }

        let outputs = Arc::new(FrameOutputs {
            frame,
            changed_objects: self.registry.changed_object_data(),
            objects: self.registry.compact_object_data(),
            object_commands,
            surface_caches,
            released_surface_caches: self.surface.take_released(),
            captures,
            clear_regions: self.surface.take_clear_regions(),
            dirty_bounds,
            views: view_outputs,
        });

        self.shared.publish(outputs.clone());
        outputs
    }

    /// Drops every view that was not refreshed this frame.
    pub fn sweep_views(&mut self) -> usize {
        let frame = self.frame;
        let before = self.views.len();
        self.views.retain(|id, state| {
            let keep = state.last_frame == frame;
            if !keep {
                tracing::debug!(view = ?id, "Dropping stale view");
            }
            keep
        });
        before - self.views.len()
    }

    pub fn commit_injection(
        &mut self,
        view: ViewId,
        level: usize,
        results: &[ChunkOccupancy],
    ) -> GiResult<()> {
        let state = self.views.get_mut(&view).ok_or(GiError::UnknownView(view))?;
        state.clipmap.commit_injection(level, results);
        Ok(())
    }

    /// Runs `injector` over every view's work-list from `outputs`.
    pub fn inject(&mut self, outputs: &FrameOutputs, injector: &mut dyn VoxelInjector) {
        for view in &outputs.views {
            if let Some(state) = self.views.get_mut(&view.view) {
                state.clipmap.inject(&view.clipmap, injector);
            }
        }
    }
}
