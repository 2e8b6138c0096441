//! Quad-tree packing of square power-of-two regions into a 2-D atlas.
//!
//! The tree is complete and stored implicitly: node `i` has its children at
//! `4 * i + 1 + q` for quadrants top-left, top-right, bottom-left,
//! bottom-right. Every node keeps an `empty` flag (nothing below is
//! allocated) and a `full` flag (the node is claimed or all four children
//! are full).

use glam::UVec2;

const ROOT: usize = 0;

/// Quadrant offsets in units of the child size.
const QUADRANTS: [UVec2; 4] = [
    UVec2::new(0, 0),
    UVec2::new(1, 0),
    UVec2::new(0, 1),
    UVec2::new(1, 1),
];

#[inline]
fn child_index(parent: usize, quadrant: usize) -> usize {
    4 * parent + 1 + quadrant
}

/// A square block of atlas texels.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct AtlasRegion {
    pub offset: UVec2,
    pub size: u32,
}

impl AtlasRegion {
    pub fn max(&self) -> UVec2 {
        self.offset + UVec2::splat(self.size)
    }

    pub fn overlaps(&self, other: &AtlasRegion) -> bool {
        self.offset.cmplt(other.max()).all() && other.offset.cmplt(self.max()).all()
    }

    pub fn area(&self) -> u64 {
        self.size as u64 * self.size as u64
    }
}

#[derive(Copy, Clone, Debug)]
struct NodeFlags {
    empty: bool,
    full: bool,
    claimed: bool,
}

impl Default for NodeFlags {
    fn default() -> Self {
        Self {
            empty: true,
            full: false,
            claimed: false,
        }
    }
}

pub struct AtlasAllocator {
    resolution: u32,
    min_node_size: u32,
    nodes: Vec<NodeFlags>,
    allocated_area: u64,
}

impl AtlasAllocator {
    pub fn new(resolution: u32, min_node_size: u32) -> Self {
        assert!(
            resolution.is_power_of_two() && min_node_size.is_power_of_two(),
            "atlas sizes must be powers of two"
        );
        assert!(min_node_size <= resolution);

        let levels = (resolution / min_node_size).trailing_zeros() + 1;
        let node_count = (0..levels).map(|level| 1usize << (2 * level)).sum();

        Self {
            resolution,
            min_node_size,
            nodes: vec![NodeFlags::default(); node_count],
            allocated_area: 0,
        }
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn min_node_size(&self) -> u32 {
        self.min_node_size
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn allocated_area(&self) -> u64 {
        self.allocated_area
    }

    pub fn is_empty(&self) -> bool {
        self.nodes[ROOT].empty
    }

    pub fn is_full(&self) -> bool {
        self.nodes[ROOT].full
    }

    pub fn reset(&mut self) {
        self.nodes.fill(NodeFlags::default());
        self.allocated_area = 0;
    }

    /// Claims a region of exactly `size` texels per side, or `None` if no
    /// node of that size is free.
    pub fn allocate(&mut self, size: u32) -> Option<AtlasRegion> {
        assert!(
            size.is_power_of_two() && size >= self.min_node_size && size <= self.resolution,
            "invalid atlas region size {}",
            size
        );
        let region = self.allocate_node(ROOT, UVec2::ZERO, self.resolution, size)?;
        self.allocated_area += region.area();
        Some(region)
    }

    fn allocate_node(
        &mut self,
        node: usize,
        offset: UVec2,
        node_size: u32,
        target: u32,
    ) -> Option<AtlasRegion> {
        let flags = self.nodes[node];
        if flags.full {
            return None;
        }

        if node_size == target {
            if !flags.empty {
                return None;
            }
            self.nodes[node] = NodeFlags {
                empty: false,
                full: true,
                claimed: true,
            };
            return Some(AtlasRegion {
                offset,
                size: node_size,
            });
        }

        let half = node_size / 2;
        for (quadrant, corner) in QUADRANTS.iter().enumerate() {
            let child = child_index(node, quadrant);
            if let Some(region) = self.allocate_node(child, offset + *corner * half, half, target) {
                self.refresh(node);
                return Some(region);
            }
        }
        None
    }

    /// Returns a region obtained from [`allocate`](Self::allocate).
    ///
    /// Panics if the region is not currently allocated.
    pub fn release(&mut self, region: AtlasRegion) {
        self.release_node(ROOT, UVec2::ZERO, self.resolution, region);
        self.allocated_area -= region.area();
    }

    fn release_node(&mut self, node: usize, offset: UVec2, node_size: u32, region: AtlasRegion) {
        if node_size == region.size && offset == region.offset {
            assert!(
                self.nodes[node].claimed,
                "releasing unallocated atlas region {:?}",
                region
            );
            self.nodes[node] = NodeFlags::default();
            return;
        }

        assert!(
            node_size > region.size && node_size > self.min_node_size && !self.nodes[node].claimed,
            "releasing unallocated atlas region {:?}",
            region
        );

        // Compare doubled centers to stay in integers.
        let region_center = region.offset * 2 + UVec2::splat(region.size);
        let node_center = offset * 2 + UVec2::splat(node_size);
        let quadrant = (region_center.x > node_center.x) as usize
            | ((region_center.y > node_center.y) as usize) << 1;

        let half = node_size / 2;
        self.release_node(
            child_index(node, quadrant),
            offset + QUADRANTS[quadrant] * half,
            half,
            region,
        );
        self.refresh(node);
    }

    fn refresh(&mut self, node: usize) {
        let children = [0, 1, 2, 3].map(|q| self.nodes[child_index(node, q)]);
        let flags = &mut self.nodes[node];
        flags.empty = children.iter().all(|c| c.empty);
        flags.full = children.iter().all(|c| c.full);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;

    /// Walks the tree and checks both flags against the claimed leaves.
    /// Returns (fully covered, nothing covered).
    fn check_flags(atlas: &AtlasAllocator, node: usize, node_size: u32) -> (bool, bool) {
        let flags = atlas.nodes[node];
        let coverage = if flags.claimed {
            (true, false)
        } else if node_size == atlas.min_node_size {
            (false, true)
        } else {
            let mut all = true;
            let mut none = true;
            for q in 0..4 {
                let (c_all, c_none) = check_flags(atlas, child_index(node, q), node_size / 2);
                all &= c_all;
                none &= c_none;
            }
            (all, none)
        };
        assert_eq!(flags.full, coverage.0, "full flag mismatch at node {}", node);
        assert_eq!(flags.empty, coverage.1, "empty flag mismatch at node {}", node);
        coverage
    }

    #[test]
    fn test_node_count() {
        assert_eq!(AtlasAllocator::new(64, 16).node_count(), 1 + 4 + 16);
        assert_eq!(AtlasAllocator::new(16, 16).node_count(), 1);
    }

    #[test]
    fn test_four_quadrants_are_disjoint_and_reused() {
        let mut atlas = AtlasAllocator::new(2048, 16);
        let regions: Vec<AtlasRegion> = (0..4).map(|_| atlas.allocate(512).unwrap()).collect();

        assert_eq!(regions[0].offset, UVec2::new(0, 0));
        assert_eq!(regions[1].offset, UVec2::new(512, 0));
        assert_eq!(regions[2].offset, UVec2::new(0, 512));
        assert_eq!(regions[3].offset, UVec2::new(512, 512));
        for (i, a) in regions.iter().enumerate() {
            for b in &regions[i + 1..] {
                assert!(!a.overlaps(b));
            }
        }

        atlas.release(regions[2]);
        let again = atlas.allocate(512).unwrap();
        assert_eq!(again, regions[2]);
        check_flags(&atlas, ROOT, 2048);
    }

    #[test]
    fn test_full_atlas_returns_none() {
        let mut atlas = AtlasAllocator::new(64, 16);
        assert!(atlas.allocate(64).is_some());
        assert!(atlas.is_full());
        assert_eq!(atlas.allocate(16), None);
    }

    #[test]
    fn test_partial_subtree_blocks_larger_claim() {
        let mut atlas = AtlasAllocator::new(64, 16);
        let small = atlas.allocate(16).unwrap();
        assert_eq!(small.offset, UVec2::ZERO);
        // the top-left 32 quadrant is no longer empty
        let big = atlas.allocate(32).unwrap();
        assert_eq!(big.offset, UVec2::new(32, 0));
        assert_eq!(atlas.allocate(64), None);
        atlas.release(small);
        atlas.release(big);
        assert!(atlas.is_empty());
        assert_eq!(atlas.allocated_area(), 0);
    }

    #[test]
    #[should_panic(expected = "releasing unallocated atlas region")]
    fn test_release_parent_of_children_panics() {
        let mut atlas = AtlasAllocator::new(64, 16);
        for _ in 0..4 {
            atlas.allocate(16).unwrap();
        }
        // top-left 32 quadrant is full through its children, not claimed itself
        atlas.release(AtlasRegion {
            offset: UVec2::ZERO,
            size: 32,
        });
    }

    #[test]
    #[should_panic(expected = "releasing unallocated atlas region")]
    fn test_release_never_allocated_panics() {
        let mut atlas = AtlasAllocator::new(64, 16);
        atlas.release(AtlasRegion {
            offset: UVec2::new(16, 16),
            size: 16,
        });
    }

    #[test]
    fn test_random_sequence_never_overlaps() {
        let mut atlas = AtlasAllocator::new(128, 8);
        let sizes = [8, 16, 32, 64];
        let mut live: Vec<AtlasRegion> = Vec::new();
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..3000 {
            if live.is_empty() || rng.random_range(0..5) < 3 {
                let size = sizes[rng.random_range(0..sizes.len())];
                if let Some(region) = atlas.allocate(size) {
                    assert_eq!(region.size, size);
                    assert!(region.max().cmple(UVec2::splat(128)).all());
                    for other in &live {
                        assert!(!region.overlaps(other), "{:?} overlaps {:?}", region, other);
                    }
                    live.push(region);
                }
            } else {
                let victim = live.swap_remove(rng.random_range(0..live.len()));
                atlas.release(victim);
                // the freed square must be claimable again at the same size
                let again = atlas.allocate(victim.size).unwrap();
                assert_eq!(again.size, victim.size);
                live.push(again);
                let victim = live.swap_remove(rng.random_range(0..live.len()));
                atlas.release(victim);
            }

            let area: u64 = live.iter().map(|r| r.area()).sum();
            assert_eq!(atlas.allocated_area(), area);
            check_flags(&atlas, ROOT, 128);
        }
    }
}
