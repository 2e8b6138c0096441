use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use crate::core::{Aabb, EntityId};

/// Identity of a vertex layout / vertex factory.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LayoutId(pub u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MaterialId(pub u32);

/// One drawable sub-mesh of an entity.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshBatch {
    pub layout: LayoutId,
    pub material: MaterialId,
    pub lod: u8,
    /// Batches that only carry depth or editor helpers opt out of capture.
    pub use_for_material: bool,
}

impl MeshBatch {
    pub fn new(layout: LayoutId, material: MaterialId) -> Self {
        Self {
            layout,
            material,
            lod: 0,
            use_for_material: true,
        }
    }

    pub fn with_lod(mut self, lod: u8) -> Self {
        self.lod = lod;
        self
    }
}

/// An entity as submitted by the external scene.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneEntity {
    pub id: EntityId,
    pub batches: Vec<MeshBatch>,
    pub local_bounds: Aabb,
    pub transform: Mat4,
    pub gi_visible: bool,
}

impl SceneEntity {
    pub fn new(id: EntityId, batches: Vec<MeshBatch>, local_bounds: Aabb, transform: Mat4) -> Self {
        Self {
            id,
            batches,
            local_bounds,
            transform,
            gi_visible: true,
        }
    }

    pub fn world_bounds(&self) -> Aabb {
        self.local_bounds.transformed(&self.transform)
    }

    pub fn world_scale(&self) -> Vec3 {
        Vec3::new(
            self.transform.x_axis.truncate().length(),
            self.transform.y_axis.truncate().length(),
            self.transform.z_axis.truncate().length(),
        )
    }

    /// Largest axis of the local box after world scaling.
    pub fn world_size(&self) -> f32 {
        (self.local_bounds.size() * self.world_scale()).max_element()
    }

    /// Batches at the finest LOD that contribute to material capture.
    pub fn capture_batches(&self) -> impl Iterator<Item = &MeshBatch> {
        let min_lod = self
            .batches
            .iter()
            .filter(|b| b.use_for_material)
            .map(|b| b.lod)
            .min()
            .unwrap_or(0);
        self.batches
            .iter()
            .filter(move |b| b.use_for_material && b.lod == min_lod)
    }
}
