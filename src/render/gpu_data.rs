//! GPU-side descriptor layouts
//!
//! Plain `#[repr(C)]` records uploaded as-is by the rendering backend. Every
//! struct is a multiple of 16 bytes so it maps onto std430 arrays.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

use crate::constants::OBJECT_ID_INVALID;
use crate::scene::ObjectRecord;
use crate::surface::CubeFace;
use crate::voxel::VolumeInfo;

#[inline]
fn vec4(v: Vec3, w: f32) -> [f32; 4] {
    v.extend(w).to_array()
}

/// Full per-object record indexed by `ObjectId`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct ObjectGpuData {
    /// x: object id, y: surface cache id, z: card count, w: unused
    pub ids: [u32; 4],
    pub local_bounds_min: [f32; 4],
    pub local_bounds_max: [f32; 4],
    pub world_bounds_min: [f32; 4],
    pub world_bounds_max: [f32; 4],
    pub local_to_world: [[f32; 4]; 4],
    pub world_to_local: [[f32; 4]; 4],
}

impl ObjectGpuData {
    pub fn new(record: &ObjectRecord) -> Self {
        let transform = record.entity.transform;
        let (surface_cache, cards) = match record.surface_cache {
            Some(id) => (id.0, CubeFace::ALL.len() as u32),
            None => (OBJECT_ID_INVALID, 0),
        };
        Self {
            ids: [record.id.0, surface_cache, cards, 0],
            local_bounds_min: vec4(record.entity.local_bounds.min, 0.0),
            local_bounds_max: vec4(record.entity.local_bounds.max, 0.0),
            world_bounds_min: vec4(record.world_bounds.min, 0.0),
            world_bounds_max: vec4(record.world_bounds.max, 0.0),
            local_to_world: transform.to_cols_array_2d(),
            world_to_local: transform.inverse().to_cols_array_2d(),
        }
    }

    pub fn surface_cache_id(&self) -> u32 {
        self.ids[1]
    }
}

/// Compact culling record: world bounds with the object id in `min.w`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct MiniObjectGpuData {
    pub world_bounds_min_and_id: [f32; 4],
    pub world_bounds_max: [f32; 4],
}

impl MiniObjectGpuData {
    pub fn new(record: &ObjectRecord) -> Self {
        Self {
            world_bounds_min_and_id: vec4(record.world_bounds.min, f32::from_bits(record.id.0)),
            world_bounds_max: vec4(record.world_bounds.max, 0.0),
        }
    }

    pub fn object_id(&self) -> u32 {
        self.world_bounds_min_and_id[3].to_bits()
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct SurfaceCacheGpuData {
    id: u32,
    card_count: u32,
    resolution: u32,
    _padding: u32,
}

impl SurfaceCacheGpuData {
    pub fn new(id: u32, card_count: u32, resolution: u32) -> Self {
        Self {
            id,
            card_count,
            resolution,
            _padding: 0,
        }
    }

    pub fn invalid() -> Self {
        Self::new(OBJECT_ID_INVALID, 0, 0)
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn card_count(&self) -> u32 {
        self.card_count
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }
}

/// One card: local-to-card projection and `(size, size, x, y)` atlas texels.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct CardGpuData {
    pub local_to_card: [[f32; 4]; 4],
    pub uv_transform: [f32; 4],
}

impl CardGpuData {
    pub fn new(local_to_card: Mat4, uv_transform: Vec4) -> Self {
        Self {
            local_to_card: local_to_card.to_cols_array_2d(),
            uv_transform: uv_transform.to_array(),
        }
    }
}

/// Placement of one clipmap level.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct ClipmapGpuParams {
    /// xyz: center, w: voxel size
    pub center: [f32; 4],
    /// xyz: covered extent, w: level
    pub cover_range: [f32; 4],
    /// xyz: wrap-around scroll in voxels, w: volume resolution
    pub scroll: [i32; 4],
}

impl ClipmapGpuParams {
    pub fn new(level: usize, volume: &VolumeInfo) -> Self {
        Self {
            center: vec4(volume.center(), volume.voxel_size()),
            cover_range: vec4(volume.cover_range(), level as f32),
            scroll: volume.scroll().extend(volume.resolution() as i32).to_array(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_sizes() {
        assert_eq!(std::mem::size_of::<ObjectGpuData>(), 208);
        assert_eq!(std::mem::size_of::<MiniObjectGpuData>(), 32);
        assert_eq!(std::mem::size_of::<SurfaceCacheGpuData>(), 16);
        assert_eq!(std::mem::size_of::<CardGpuData>(), 80);
        assert_eq!(std::mem::size_of::<ClipmapGpuParams>(), 48);
    }

    #[test]
    fn test_descriptors_cast_to_bytes() {
        let cards = [CardGpuData::new(Mat4::IDENTITY, Vec4::new(32.0, 32.0, 64.0, 0.0)); 2];
        let bytes: &[u8] = bytemuck::cast_slice(&cards);
        assert_eq!(bytes.len(), 160);
    }
}
