use serde::{Deserialize, Serialize};

/// Stable identity of an entity owned by the external scene.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

/// Dense slot of a registered object in the GPU object tables.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u32);

/// Dense slot of a surface cache entry.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceCacheId(pub u32);

/// Index of a voxel page in the pooled page volume.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub u32);

/// Identity of a viewpoint owning its own clipmap.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ViewId(pub u32);

macro_rules! impl_index {
    ($($t:ty),*) => {
        $(impl $t {
            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        })*
    };
}

impl_index!(ObjectId, SurfaceCacheId, PageId);
