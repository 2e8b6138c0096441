//! Multi-level scrolling voxel clipmap owned by one viewpoint.
//!
//! Per frame, for each level: re-home on the viewer, carry queued dirty
//! chunks along with the scroll, mark freshly exposed planes and changed
//! object bounds, then hand out a bounded work-list. Page releases made
//! while clearing or re-injecting become reusable at the next update.

use glam::{UVec3, Vec3};

use super::inject::{ChunkOccupancy, VoxelInjector};
use super::page_table::{CellChange, PageTable, PageTableUpdate};
use super::volume::{VolumeInfo, VolumeState};
use crate::alloc::PageAllocator;
use crate::constants::VOXEL_BLOCK_SIZE;
use crate::core::{Aabb, index_1d_to_3d};
use crate::render::ClipmapGpuParams;
use crate::settings::ClipmapSettings;

/// Work produced for one level in one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct ClipmapLevelOutput {
    pub level: usize,
    pub params: ClipmapGpuParams,
    pub state: VolumeState,
    /// Chunks to voxelize this frame, oldest first.
    pub update_chunks: Vec<u32>,
    /// Chunks whose previous contents must be blanked first.
    pub cleanup_chunks: Vec<u32>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClipmapUpdate {
    pub levels: Vec<ClipmapLevelOutput>,
    pub pages_flushed: usize,
    pub pages_released: usize,
}

pub struct VoxelClipmap {
    settings: ClipmapSettings,
    volumes: Vec<VolumeInfo>,
    page_table: PageTable,
    pages: PageAllocator,
    needs_reset: bool,
    exhausted_cells: usize,
}

impl VoxelClipmap {
    pub fn new(settings: &ClipmapSettings) -> Self {
        let volumes = (0..settings.num_levels)
            .map(|level| VolumeInfo::new(level, settings))
            .collect();
        Self {
            settings: settings.clone(),
            volumes,
            page_table: PageTable::new(
                settings.volume_resolution / VOXEL_BLOCK_SIZE,
                settings.num_levels,
            ),
            pages: PageAllocator::new(settings.page_capacity()),
            needs_reset: true,
            exhausted_cells: 0,
        }
    }

    /// Swaps in new settings. Any change to the volume layout rebuilds every
    /// level and drops all pages.
    pub fn apply_settings(&mut self, settings: &ClipmapSettings) {
        if self.settings.layout_differs(settings) {
            tracing::info!(
                levels = settings.num_levels,
                resolution = settings.volume_resolution,
                cell_size = settings.voxel_cell_size,
                "Clipmap layout changed, resetting volumes"
            );
            *self = Self::new(settings);
        } else {
            self.settings = settings.clone();
        }
    }

    pub fn settings(&self) -> &ClipmapSettings {
        &self.settings
    }

    pub fn levels(&self) -> &[VolumeInfo] {
        &self.volumes
    }

    pub fn level(&self, level: usize) -> Option<&VolumeInfo> {
        self.volumes.get(level)
    }

    pub fn page_table(&self) -> &PageTable {
        &self.page_table
    }

    pub fn pages(&self) -> &PageAllocator {
        &self.pages
    }

    pub fn take_page_updates(&mut self) -> Vec<PageTableUpdate> {
        self.page_table.take_updates()
    }

    /// Runs one frame of scroll and dirty processing for every level.
    pub fn update(
        &mut self,
        frame: u64,
        view_position: Vec3,
        dirty_bounds: &[Aabb],
    ) -> ClipmapUpdate {
        // previous frame's GPU work no longer reads released pages
        let pages_flushed = self.pages.flush();

        if self.needs_reset {
            for volume in &mut self.volumes {
                volume.reset(frame);
            }
            self.page_table.reset();
            self.pages.reset();
            self.needs_reset = false;
            tracing::info!(levels = self.volumes.len(), "Clipmap volumes reset");
        }

        let padding = self.settings.dirty_padding_cells;
        let quota = self.settings.chunk_updates_per_frame;
        let mut levels = Vec::with_capacity(self.volumes.len());
        let mut pages_released = 0;

        for level in 0..self.volumes.len() {
            let volume = &mut self.volumes[level];
            let delta = volume.update_position(view_position);
            if delta != glam::IVec3::ZERO {
                volume.reindex_pending(delta);
                let exposed = volume.mark_exposed_planes(delta, frame);
                tracing::trace!(level, ?delta, exposed, "Clipmap level scrolled");
            }
            for bounds in dirty_bounds {
                volume.mark_bounds(bounds, padding, frame);
            }

            let cleanup_chunks = volume.cleanup_list(frame);
            let update_chunks = volume.pop_update_list(quota);
            volume.refresh_state();

            for &chunk in &cleanup_chunks {
                pages_released += self.clear_chunk(level, chunk);
            }

            let volume = &self.volumes[level];
            levels.push(ClipmapLevelOutput {
                level,
                params: ClipmapGpuParams::new(level, volume),
                state: volume.state(),
                update_chunks,
                cleanup_chunks,
            });
        }

        let queued: usize = self.volumes.iter().map(|v| v.pending_len()).sum();
        tracing::debug!(
            frame,
            queued,
            updates = levels.iter().map(|l| l.update_chunks.len()).sum::<usize>(),
            pages_flushed,
            pages_released,
            "Clipmap updated"
        );

        ClipmapUpdate {
            levels,
            pages_flushed,
            pages_released,
        }
    }

    fn cells_per_chunk(&self, level: usize) -> u32 {
        self.volumes[level].chunk_resolution() / VOXEL_BLOCK_SIZE
    }

    /// Physical page-table cells covered by a logical chunk.
    fn chunk_cells(&self, level: usize, chunk: u32) -> impl Iterator<Item = UVec3> + use<> {
        let volume = &self.volumes[level];
        let per_chunk = self.cells_per_chunk(level);
        let base = volume.physical_chunk(volume.chunk_coord(chunk)) * per_chunk;
        let dims = UVec3::splat(per_chunk);
        (0..per_chunk.pow(3)).map(move |i| base + index_1d_to_3d(i, dims))
    }

    fn clear_chunk(&mut self, level: usize, chunk: u32) -> usize {
        let mut released = 0;
        for cell in self.chunk_cells(level, chunk) {
            let change = self.page_table.clear_cell(level, cell, &mut self.pages);
            if let CellChange::Unmapped(_) = change {
                released += 1;
            }
        }
        released
    }

    /// Applies occupancy reported for chunks of `level` injected this frame.
    /// Must run before the next [`update`](Self::update) so chunk indices
    /// still refer to the current scroll.
    pub fn commit_injection(&mut self, level: usize, results: &[ChunkOccupancy]) {
        let mut mapped = 0;
        let mut exhausted = 0;
        for result in results {
            let cells: Vec<UVec3> = self.chunk_cells(level, result.chunk).collect();
            debug_assert_eq!(cells.len(), result.cells.len());
            for (cell, &mask) in cells.into_iter().zip(&result.cells) {
                match self.page_table.set_occupancy(level, cell, mask, &mut self.pages) {
                    CellChange::Mapped(_) => mapped += 1,
                    CellChange::Exhausted => exhausted += 1,
                    _ => {}
                }
            }
        }

        if exhausted > 0 {
            self.exhausted_cells += exhausted;
            tracing::warn!(
                level,
                exhausted,
                free = self.pages.free_count(),
                "Voxel page pool exhausted, cells left unmapped"
            );
        }
        tracing::trace!(level, mapped, "Committed voxel injection");
    }

    /// Runs `injector` over the work-list of every level and commits the
    /// resulting occupancy.
    pub fn inject(&mut self, update: &ClipmapUpdate, injector: &mut dyn VoxelInjector) {
        for output in &update.levels {
            if output.update_chunks.is_empty() {
                continue;
            }
            let results = injector.inject(&self.volumes[output.level], &output.update_chunks);
            self.commit_injection(output.level, &results);
        }
    }

    pub fn exhausted_cells(&self) -> usize {
        self.exhausted_cells
    }

    pub fn is_stable(&self) -> bool {
        self.volumes.iter().all(|v| v.state() == VolumeState::Stable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel::BoundsInjector;

    fn settings() -> ClipmapSettings {
        ClipmapSettings {
            num_levels: 2,
            volume_resolution: 64,
            chunks_per_axis: 8,
            voxel_cell_size: 1.0,
            chunk_updates_per_frame: 600,
            pages_per_axis: 16,
            ..ClipmapSettings::default()
        }
    }

    /// Drains the initial full-volume dirtying.
    fn settled(settings: &ClipmapSettings, position: Vec3) -> VoxelClipmap {
        let mut clipmap = VoxelClipmap::new(settings);
        clipmap.update(1, position, &[]);
        clipmap
    }

    #[test]
    fn test_first_frame_dirties_everything() {
        let mut clipmap = VoxelClipmap::new(&ClipmapSettings {
            chunk_updates_per_frame: 64,
            ..settings()
        });
        let update = clipmap.update(1, Vec3::ZERO, &[]);
        for level in &update.levels {
            assert_eq!(level.update_chunks.len(), 64);
            assert_eq!(level.cleanup_chunks.len(), 512);
            assert_eq!(level.state, VolumeState::DirtyPropagating);
        }

        // carried-over chunks are not cleaned again
        let update = clipmap.update(2, Vec3::ZERO, &[]);
        assert_eq!(update.levels[0].update_chunks.len(), 64);
        assert!(update.levels[0].cleanup_chunks.is_empty());
    }

    #[test]
    fn test_translation_by_one_chunk_marks_only_exposed_plane() {
        let settings = settings();
        let mut clipmap = settled(&settings, Vec3::splat(1.0));
        let update = clipmap.update(2, Vec3::splat(1.0), &[]);
        assert!(update.levels.iter().all(|l| l.update_chunks.is_empty()));

        // level 0 chunks are 8 units wide, level 1 chunks 16
        let update = clipmap.update(3, Vec3::new(9.0, 1.0, 1.0), &[]);
        let l0 = &update.levels[0];
        assert_eq!(l0.state, VolumeState::Scrolling);
        assert_eq!(l0.update_chunks.len(), 64);
        let volume = clipmap.level(0).unwrap();
        assert!(l0.update_chunks.iter().all(|&c| volume.chunk_coord(c).x == 7));
        assert_eq!(l0.cleanup_chunks, l0.update_chunks);

        let l1 = &update.levels[1];
        assert!(l1.update_chunks.is_empty());
        assert_eq!(l1.state, VolumeState::Stable);
    }

    #[test]
    fn test_dirty_bounds_mark_every_level() {
        let settings = settings();
        let mut clipmap = settled(&settings, Vec3::ZERO);
        let b = Aabb::new(Vec3::splat(2.0), Vec3::splat(3.0));
        let update = clipmap.update(2, Vec3::ZERO, &[b]);
        assert_eq!(update.levels[0].update_chunks.len(), 1);
        assert_eq!(update.levels[1].update_chunks.len(), 1);
        assert_eq!(update.levels[0].cleanup_chunks.len(), 1);
    }

    #[test]
    fn test_quota_defers_excess_chunks() {
        let settings = ClipmapSettings {
            chunk_updates_per_frame: 3,
            ..settings()
        };
        let mut clipmap = VoxelClipmap::new(&settings);
        let mut seen = 0;
        for frame in 1..=200 {
            let update = clipmap.update(frame, Vec3::ZERO, &[]);
            assert!(update.levels[0].update_chunks.len() <= 3);
            seen += update.levels[0].update_chunks.len();
        }
        assert_eq!(seen, 512);
        assert!(clipmap.is_stable());
    }

    #[test]
    fn test_pages_follow_occupancy_with_delayed_reuse() {
        let settings = settings();
        let mut clipmap = VoxelClipmap::new(&settings);
        let mut injector = BoundsInjector::new();
        injector.set_solids([Aabb::new(Vec3::splat(0.1), Vec3::splat(2.9))]);

        let update = clipmap.update(1, Vec3::ZERO, &[]);
        clipmap.inject(&update, &mut injector);
        // a few voxels in a single cell on each level
        assert_eq!(clipmap.page_table().mapped_count(), 2);
        assert_eq!(clipmap.pages().allocated_count(), 2);

        // the solid disappears: its chunk is re-dirtied, cleared and re-injected empty
        injector.set_solids([]);
        let gone = Aabb::new(Vec3::splat(0.1), Vec3::splat(2.9));
        let update = clipmap.update(2, Vec3::ZERO, &[gone]);
        assert_eq!(update.pages_released, 2);
        clipmap.inject(&update, &mut injector);
        assert_eq!(clipmap.page_table().mapped_count(), 0);
        assert_eq!(clipmap.pages().pending_count(), 2);

        let update = clipmap.update(3, Vec3::ZERO, &[]);
        assert_eq!(update.pages_flushed, 2);
        assert_eq!(clipmap.pages().free_count(), 16usize.pow(3));
    }

    #[test]
    fn test_layout_change_resets() {
        let settings = settings();
        let mut clipmap = settled(&settings, Vec3::ZERO);
        clipmap.apply_settings(&ClipmapSettings {
            num_levels: 1,
            ..settings.clone()
        });
        assert_eq!(clipmap.levels().len(), 1);
        let update = clipmap.update(2, Vec3::ZERO, &[]);
        assert_eq!(update.levels[0].cleanup_chunks.len(), 512);

        // quota tweaks keep the queue
        clipmap.apply_settings(&ClipmapSettings {
            num_levels: 1,
            chunk_updates_per_frame: 5,
            ..settings
        });
        assert_eq!(clipmap.update(3, Vec3::ZERO, &[]).levels[0].cleanup_chunks.len(), 0);
    }
}
