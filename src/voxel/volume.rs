//! One clipmap level: a viewer-centered, wrap-around scrolling volume and
//! its queue of chunks awaiting re-injection.
//!
//! Chunk indices are logical, relative to the volume's minimum corner, and
//! linearized with X fastest. The physical location of a chunk in the voxel
//! texture is its logical position shifted by the scroll offset.

use std::collections::VecDeque;

use glam::{IVec3, UVec3, Vec3};
use rustc_hash::FxHashSet;

use crate::core::{Aabb, index_1d_to_3d, index_3d_to_1d, wrap};
use crate::settings::ClipmapSettings;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VolumeState {
    /// Centered on the viewer with nothing queued.
    Stable,
    /// Re-centered this frame.
    Scrolling,
    /// Dirty chunks are still waiting for their injection slot.
    DirtyPropagating,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DirtyChunk {
    pub index: u32,
    /// Frame the chunk was marked.
    pub timestamp: u64,
}

pub struct VolumeInfo {
    level: usize,
    resolution: u32,
    chunks_per_axis: u32,
    voxel_size: f32,
    center: Vec3,
    center_chunk: IVec3,
    scroll: IVec3,
    delta: IVec3,
    state: VolumeState,
    initialized: bool,
    pending: VecDeque<DirtyChunk>,
    pending_set: FxHashSet<u32>,
}

impl VolumeInfo {
    pub fn new(level: usize, settings: &ClipmapSettings) -> Self {
        Self {
            level,
            resolution: settings.volume_resolution,
            chunks_per_axis: settings.chunks_per_axis,
            voxel_size: settings.voxel_cell_size * (1u32 << level) as f32,
            center: Vec3::ZERO,
            center_chunk: IVec3::ZERO,
            scroll: IVec3::ZERO,
            delta: IVec3::ZERO,
            state: VolumeState::Stable,
            initialized: false,
            pending: VecDeque::new(),
            pending_set: FxHashSet::default(),
        }
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn voxel_size(&self) -> f32 {
        self.voxel_size
    }

    pub fn chunks_per_axis(&self) -> u32 {
        self.chunks_per_axis
    }

    pub fn chunk_count(&self) -> u32 {
        self.chunks_per_axis.pow(3)
    }

    /// Voxels along one edge of a chunk.
    pub fn chunk_resolution(&self) -> u32 {
        self.resolution / self.chunks_per_axis
    }

    pub fn chunk_world_size(&self) -> f32 {
        self.chunk_resolution() as f32 * self.voxel_size
    }

    pub fn center(&self) -> Vec3 {
        self.center
    }

    pub fn cover_range(&self) -> Vec3 {
        Vec3::splat(self.resolution as f32 * self.voxel_size)
    }

    pub fn bounds(&self) -> Aabb {
        Aabb::from_center_extent(self.center, self.cover_range() * 0.5)
    }

    pub fn scroll(&self) -> IVec3 {
        self.scroll
    }

    /// Chunk delta applied by the last position update.
    pub fn delta(&self) -> IVec3 {
        self.delta
    }

    pub fn state(&self) -> VolumeState {
        self.state
    }

    fn chunk_dims(&self) -> UVec3 {
        UVec3::splat(self.chunks_per_axis)
    }

    pub fn chunk_coord(&self, index: u32) -> UVec3 {
        index_1d_to_3d(index, self.chunk_dims())
    }

    pub fn chunk_index(&self, coord: UVec3) -> u32 {
        index_3d_to_1d(coord, self.chunk_dims())
    }

    /// Physical chunk slot of a logical chunk after scrolling.
    pub fn physical_chunk(&self, logical: UVec3) -> UVec3 {
        let res = IVec3::splat(self.resolution as i32);
        let voxel = logical.as_ivec3() * self.chunk_resolution() as i32 + self.scroll;
        (wrap(voxel, res) / self.chunk_resolution() as i32).as_uvec3()
    }

    /// World-space minimum corner of a logical chunk.
    pub fn chunk_min(&self, logical: UVec3) -> Vec3 {
        self.bounds().min + logical.as_vec3() * self.chunk_world_size()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, index: u32) -> bool {
        self.pending_set.contains(&index)
    }

    pub fn pending(&self) -> impl Iterator<Item = &DirtyChunk> {
        self.pending.iter()
    }

    /// Queues `index` unless it is already queued. Returns true if added.
    pub fn push_dirty(&mut self, index: u32, timestamp: u64) -> bool {
        if !self.pending_set.insert(index) {
            return false;
        }
        self.pending.push_back(DirtyChunk { index, timestamp });
        true
    }

    /// Like [`push_dirty`](Self::push_dirty), but an already queued chunk
    /// takes the new timestamp so it is cleared again this frame.
    fn refresh_dirty(&mut self, index: u32, timestamp: u64) {
        if self.push_dirty(index, timestamp) {
            return;
        }
        if let Some(chunk) = self.pending.iter_mut().find(|c| c.index == index) {
            chunk.timestamp = timestamp;
        }
    }

    pub fn pop_dirty(&mut self) -> Option<DirtyChunk> {
        let chunk = self.pending.pop_front()?;
        self.pending_set.remove(&chunk.index);
        Some(chunk)
    }

    /// Clears the queue, recenters on the next update and marks every chunk.
    pub fn reset(&mut self, frame: u64) {
        self.pending.clear();
        self.pending_set.clear();
        self.scroll = IVec3::ZERO;
        self.delta = IVec3::ZERO;
        self.initialized = false;
        for index in 0..self.chunk_count() {
            self.push_dirty(index, frame);
        }
    }

    /// Re-homes the volume on the chunk containing `view_position` and
    /// advances the scroll offset. Returns the chunk delta.
    pub fn update_position(&mut self, view_position: Vec3) -> IVec3 {
        let chunk_size = self.chunk_world_size();
        let grid = (view_position / chunk_size).floor().as_ivec3();

        self.delta = if self.initialized {
            // Teleports across the saturated float range would overflow i32.
            let step = |axis: usize| {
                (grid[axis] as i64 - self.center_chunk[axis] as i64)
                    .clamp(i32::MIN as i64, i32::MAX as i64) as i32
            };
            IVec3::new(step(0), step(1), step(2))
        } else {
            self.initialized = true;
            IVec3::ZERO
        };

        if self.delta != IVec3::ZERO {
            let res = self.resolution as i64;
            let chunk_res = self.chunk_resolution() as i64;
            let scroll = |axis: usize| {
                (self.scroll[axis] as i64 + self.delta[axis] as i64 * chunk_res).rem_euclid(res)
                    as i32
            };
            self.scroll = IVec3::new(scroll(0), scroll(1), scroll(2));
        }
        self.center_chunk = grid;
        self.center = grid.as_vec3() * chunk_size;
        self.delta
    }

    /// Shifts queued chunks by `-delta` so they keep addressing the same
    /// world region. Chunks that leave the volume wrap around.
    pub fn reindex_pending(&mut self, delta: IVec3) {
        if delta == IVec3::ZERO {
            return;
        }
        let dims = IVec3::splat(self.chunks_per_axis as i32);
        let shift = wrap(delta, dims);
        let queued: Vec<DirtyChunk> = self.pending.drain(..).collect();
        self.pending_set.clear();
        for chunk in queued {
            let coord = self.chunk_coord(chunk.index).as_ivec3() - shift;
            let index = self.chunk_index(wrap(coord, dims).as_uvec3());
            self.push_dirty(index, chunk.timestamp);
        }
    }

    /// Marks the planes of chunks that scrolled into coverage. Returns the
    /// number of chunks marked.
    pub fn mark_exposed_planes(&mut self, delta: IVec3, frame: u64) -> usize {
        let n = self.chunks_per_axis;
        let mut marked = 0;
        for axis in 0..3 {
            let d = delta[axis];
            if d == 0 {
                continue;
            }
            let count = d.unsigned_abs().min(n);
            let range = if d > 0 { n - count..n } else { 0..count };

            for index in 0..self.chunk_count() {
                let coord = self.chunk_coord(index);
                if range.contains(&coord[axis]) {
                    self.refresh_dirty(index, frame);
                    marked += 1;
                }
            }
        }
        marked
    }

    /// Marks every chunk overlapped by `bounds` grown by `padding_cells`
    /// voxels. Boxes outside the volume are ignored.
    pub fn mark_bounds(&mut self, bounds: &Aabb, padding_cells: u32, frame: u64) -> usize {
        let padded = bounds.expand(padding_cells as f32 * self.voxel_size);
        if !padded.intersects(&self.bounds()) {
            return 0;
        }

        let chunk_size = self.chunk_world_size();
        let min = self.bounds().min;
        let max = IVec3::splat(self.chunks_per_axis as i32 - 1);
        let to_chunk =
            |p: Vec3| ((p - min) / chunk_size).floor().as_ivec3().clamp(IVec3::ZERO, max);
        let lo = to_chunk(padded.min);
        let hi = to_chunk(padded.max);

        let mut marked = 0;
        for z in lo.z..=hi.z {
            for y in lo.y..=hi.y {
                for x in lo.x..=hi.x {
                    let index = self.chunk_index(UVec3::new(x as u32, y as u32, z as u32));
                    if self.push_dirty(index, frame) {
                        marked += 1;
                    }
                }
            }
        }
        marked
    }

    /// Queued chunks marked during `frame`, oldest first. Must be taken
    /// before popping the frame's work-list.
    pub fn cleanup_list(&self, frame: u64) -> Vec<u32> {
        self.pending
            .iter()
            .filter(|c| c.timestamp == frame)
            .map(|c| c.index)
            .collect()
    }

    /// Pops at most `quota` chunks, oldest first.
    pub fn pop_update_list(&mut self, quota: usize) -> Vec<u32> {
        let mut list = Vec::with_capacity(quota.min(self.pending.len()));
        while list.len() < quota {
            match self.pop_dirty() {
                Some(chunk) => list.push(chunk.index),
                None => break,
            }
        }
        list
    }

    pub fn refresh_state(&mut self) {
        self.state = if self.delta != IVec3::ZERO {
            VolumeState::Scrolling
        } else if !self.pending.is_empty() {
            VolumeState::DirtyPropagating
        } else {
            VolumeState::Stable
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use std::collections::HashSet;

    fn volume() -> VolumeInfo {
        let settings = ClipmapSettings {
            volume_resolution: 64,
            chunks_per_axis: 8,
            voxel_cell_size: 1.0,
            ..ClipmapSettings::default()
        };
        VolumeInfo::new(0, &settings)
    }

    fn assert_mirror(v: &VolumeInfo) {
        let fifo: Vec<u32> = v.pending().map(|c| c.index).collect();
        let unique: HashSet<u32> = fifo.iter().copied().collect();
        assert_eq!(unique.len(), fifo.len(), "duplicate chunk in queue");
        assert_eq!(unique, v.pending_set.iter().copied().collect::<HashSet<u32>>());
    }

    #[test]
    fn test_push_dedupes() {
        let mut v = volume();
        assert!(v.push_dirty(5, 1));
        assert!(!v.push_dirty(5, 2));
        assert_eq!(v.pending_len(), 1);
        assert_eq!(v.pop_dirty(), Some(DirtyChunk { index: 5, timestamp: 1 }));
        assert!(!v.is_pending(5));
        assert!(v.push_dirty(5, 3));
    }

    #[test]
    fn test_mirror_after_random_interleaving() {
        let mut v = volume();
        let mut rng = StdRng::seed_from_u64(9);
        for frame in 0..500u64 {
            match rng.random_range(0..4) {
                0 | 1 => {
                    v.push_dirty(rng.random_range(0..v.chunk_count()), frame);
                }
                2 => {
                    v.pop_update_list(rng.random_range(0..6));
                }
                _ => {
                    let delta = IVec3::new(rng.random_range(-2..3), rng.random_range(-1..2), 0);
                    v.reindex_pending(delta);
                    v.mark_exposed_planes(delta, frame);
                }
            }
            assert_mirror(&v);
        }
    }

    #[test]
    fn test_first_update_does_not_scroll() {
        let mut v = volume();
        assert_eq!(v.update_position(Vec3::new(100.0, 3.0, -20.0)), IVec3::ZERO);
        assert_eq!(v.center(), Vec3::new(96.0, 0.0, -24.0));
        assert_eq!(v.scroll(), IVec3::ZERO);
    }

    #[test]
    fn test_scroll_wraps() {
        let mut v = volume();
        v.update_position(Vec3::ZERO);
        assert_eq!(v.update_position(Vec3::new(-8.0, 0.0, 17.0)), IVec3::new(-1, 0, 2));
        assert_eq!(v.scroll(), IVec3::new(56, 0, 16));
        assert_eq!(v.physical_chunk(UVec3::new(0, 0, 0)), UVec3::new(7, 0, 2));
    }

    #[test]
    fn test_one_chunk_move_marks_one_leading_plane() {
        let mut v = volume();
        v.update_position(Vec3::splat(1.0));
        let delta = v.update_position(Vec3::new(9.0, 1.0, 1.0));
        assert_eq!(delta, IVec3::new(1, 0, 0));

        let marked = v.mark_exposed_planes(delta, 7);
        assert_eq!(marked, 64);
        assert!(v.pending().all(|c| v.chunk_coord(c.index).x == 7));
        assert_eq!(v.cleanup_list(7).len(), 64);
    }

    #[test]
    fn test_two_chunk_move_marks_two_planes() {
        let mut v = volume();
        v.update_position(Vec3::ZERO);
        let delta = v.update_position(Vec3::new(-16.0, 0.0, 0.0));
        assert_eq!(v.mark_exposed_planes(delta, 2), 128);
        assert!(v.pending().all(|c| v.chunk_coord(c.index).x < 2));
    }

    #[test]
    fn test_reindex_follows_world_position() {
        let mut v = volume();
        let index = v.chunk_index(UVec3::new(3, 4, 5));
        v.push_dirty(index, 1);
        v.reindex_pending(IVec3::new(1, 0, -1));
        let moved = v.chunk_index(UVec3::new(2, 4, 6));
        assert!(v.is_pending(moved));
        assert_eq!(v.pending().next().unwrap().timestamp, 1);

        // leaving the volume wraps to the opposite side
        let edge = v.chunk_index(UVec3::new(0, 0, 0));
        v.push_dirty(edge, 1);
        v.reindex_pending(IVec3::new(1, 0, 0));
        assert!(v.is_pending(v.chunk_index(UVec3::new(7, 0, 0))));
        assert_mirror(&v);
    }

    #[test]
    fn test_exposed_plane_refreshes_wrapped_chunk() {
        let mut v = volume();
        v.push_dirty(v.chunk_index(UVec3::new(0, 2, 2)), 1);
        let delta = IVec3::new(1, 0, 0);
        v.reindex_pending(delta);
        v.mark_exposed_planes(delta, 5);
        let wrapped = v.chunk_index(UVec3::new(7, 2, 2));
        assert!(v.cleanup_list(5).contains(&wrapped));
        assert_eq!(v.pending_len(), 64);
    }

    #[test]
    fn test_mark_bounds_with_padding() {
        let mut v = volume();
        v.update_position(Vec3::ZERO);
        // volume spans [-32, 32); chunk 4 starts at 0
        let b = Aabb::new(Vec3::new(0.5, 0.5, 0.5), Vec3::new(1.0, 1.0, 1.0));
        assert_eq!(v.mark_bounds(&b, 0, 1), 1);
        assert!(v.is_pending(v.chunk_index(UVec3::new(4, 4, 4))));

        // one voxel of padding reaches into the neighbours below
        let mut v = volume();
        v.update_position(Vec3::ZERO);
        assert_eq!(v.mark_bounds(&b, 1, 1), 8);
    }

    #[test]
    fn test_mark_bounds_odd_chunk_count() {
        let settings = ClipmapSettings {
            volume_resolution: 96,
            chunks_per_axis: 3,
            voxel_cell_size: 1.0,
            ..ClipmapSettings::default()
        };
        let gi = crate::settings::GiSettings {
            clipmap: settings.clone(),
            ..Default::default()
        };
        assert!(gi.validate().is_ok());

        // volume spans [-48, 48); chunks start at -48, -16 and 16
        let mut v = VolumeInfo::new(0, &settings);
        v.update_position(Vec3::ZERO);
        let b = Aabb::new(Vec3::splat(20.0), Vec3::splat(30.0));
        assert_eq!(v.mark_bounds(&b, 0, 1), 1);
        assert!(v.is_pending(v.chunk_index(UVec3::splat(2))));

        let mut v = VolumeInfo::new(0, &settings);
        v.update_position(Vec3::ZERO);
        let b = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        assert_eq!(v.mark_bounds(&b, 0, 1), 1);
        let index = v.pending().next().unwrap().index;
        let lo = v.chunk_min(v.chunk_coord(index));
        let chunk = Aabb::new(lo, lo + Vec3::splat(v.chunk_world_size()));
        assert!(chunk.intersects(&b));
        assert_eq!(v.chunk_coord(index), UVec3::ONE);
    }

    #[test]
    fn test_extreme_teleport_keeps_scroll_in_range() {
        let mut v = volume();
        v.update_position(Vec3::ZERO);
        for position in [Vec3::splat(1.0e30), Vec3::splat(-1.0e30), Vec3::ZERO] {
            v.push_dirty(3, 1);
            let delta = v.update_position(position);
            v.reindex_pending(delta);
            assert!(v.scroll().cmpge(IVec3::ZERO).all());
            assert!(v.scroll().cmplt(IVec3::splat(64)).all());
            v.mark_exposed_planes(delta, 2);
            assert_eq!(v.pending_len(), 512);
            assert_mirror(&v);
            v.pop_update_list(512);
        }
    }

    #[test]
    fn test_mark_bounds_outside_volume_is_ignored() {
        let mut v = volume();
        v.update_position(Vec3::ZERO);
        let far = Aabb::new(Vec3::splat(500.0), Vec3::splat(501.0));
        assert_eq!(v.mark_bounds(&far, 1, 1), 0);
        assert_eq!(v.pending_len(), 0);
    }

    #[test]
    fn test_cleanup_lists_only_current_frame() {
        let mut v = volume();
        v.push_dirty(1, 3);
        v.push_dirty(2, 4);
        v.push_dirty(3, 4);
        assert_eq!(v.cleanup_list(4), vec![2, 3]);
        assert_eq!(v.pop_update_list(2), vec![1, 2]);
        assert_eq!(v.pending_len(), 1);
    }

    #[test]
    fn test_reset_marks_everything() {
        let mut v = volume();
        v.reset(1);
        assert_eq!(v.pending_len(), 512);
        v.refresh_state();
        assert_eq!(v.state(), VolumeState::DirtyPropagating);
    }
}
