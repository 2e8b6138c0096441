//! Deduplication key for surface cache entries.

use std::hash::{Hash, Hasher};

use super::entity::{LayoutId, MaterialId, MeshBatch, SceneEntity};

#[inline]
fn hash_combine(seed: u64, value: u64) -> u64 {
    seed ^ value
        .wrapping_add(0x9e37_79b9_7f4a_7c15)
        .wrapping_add(seed << 6)
        .wrapping_add(seed >> 2)
}

/// Ordered (layout, material) pairs of an entity's capture batches.
///
/// Equality compares the combined hash first and then the full list, so two
/// entities share a key only when they would render identically.
#[derive(Clone, Debug)]
pub struct SurfaceCacheKey {
    hash: u64,
    pairs: Vec<(LayoutId, MaterialId)>,
}

impl SurfaceCacheKey {
    pub fn from_batches<'a>(batches: impl IntoIterator<Item = &'a MeshBatch>) -> Self {
        let mut hash = 0u64;
        let mut pairs = Vec::new();
        for batch in batches {
            hash = hash_combine(hash, batch.layout.0 as u64);
            hash = hash_combine(hash, batch.material.0 as u64);
            pairs.push((batch.layout, batch.material));
        }
        Self { hash, pairs }
    }

    pub fn from_entity(entity: &SceneEntity) -> Self {
        Self::from_batches(entity.capture_batches())
    }

    pub fn hash_value(&self) -> u64 {
        self.hash
    }

    pub fn pairs(&self) -> &[(LayoutId, MaterialId)] {
        &self.pairs
    }
}

impl PartialEq for SurfaceCacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.pairs == other.pairs
    }
}

impl Eq for SurfaceCacheKey {}

impl Hash for SurfaceCacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(pairs: &[(u32, u32)]) -> SurfaceCacheKey {
        let batches: Vec<MeshBatch> = pairs
            .iter()
            .map(|&(l, m)| MeshBatch::new(LayoutId(l), MaterialId(m)))
            .collect();
        SurfaceCacheKey::from_batches(&batches)
    }

    #[test]
    fn test_equal_pairs_give_equal_keys() {
        assert_eq!(key(&[(1, 2), (1, 3)]), key(&[(1, 2), (1, 3)]));
    }

    #[test]
    fn test_order_matters() {
        assert_ne!(key(&[(1, 2), (1, 3)]), key(&[(1, 3), (1, 2)]));
    }

    #[test]
    fn test_material_change_changes_key() {
        let a = key(&[(1, 2)]);
        let b = key(&[(1, 4)]);
        assert_ne!(a, b);
        assert_ne!(a.hash_value(), b.hash_value());
    }
}
