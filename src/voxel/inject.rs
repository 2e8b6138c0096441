//! Voxel injection seam
//!
//! The GPU backend voxelizes the surface caches into the chunks of each
//! frame's work-list and reports back which page cells ended up occupied.
//! [`BoundsInjector`] is a CPU stand-in that treats world boxes as solid.

use glam::{IVec3, UVec3, Vec3};

use super::volume::VolumeInfo;
use crate::constants::VOXEL_BLOCK_SIZE;
use crate::core::{Aabb, index_3d_to_1d};

/// Per-cell voxel occupancy of one injected chunk. Bit `x + 4y + 16z` of a
/// mask is the voxel at `(x, y, z)` inside the cell.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkOccupancy {
    pub chunk: u32,
    pub cells: Vec<u64>,
}

impl ChunkOccupancy {
    pub fn empty(chunk: u32, cells_per_chunk: u32) -> Self {
        Self {
            chunk,
            cells: vec![0; cells_per_chunk.pow(3) as usize],
        }
    }

    pub fn occupied_cells(&self) -> usize {
        self.cells.iter().filter(|&&m| m != 0).count()
    }
}

pub trait VoxelInjector {
    fn inject(&mut self, volume: &VolumeInfo, chunks: &[u32]) -> Vec<ChunkOccupancy>;
}

#[derive(Default)]
pub struct BoundsInjector {
    solids: Vec<Aabb>,
}

impl BoundsInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_solids(&mut self, solids: impl IntoIterator<Item = Aabb>) {
        self.solids.clear();
        self.solids.extend(solids);
    }

    fn inject_chunk(&self, volume: &VolumeInfo, chunk: u32) -> ChunkOccupancy {
        let chunk_res = volume.chunk_resolution();
        let cells_per_chunk = chunk_res / VOXEL_BLOCK_SIZE;
        let mut occupancy = ChunkOccupancy::empty(chunk, cells_per_chunk);

        let voxel = volume.voxel_size();
        let chunk_min = volume.chunk_min(volume.chunk_coord(chunk));
        let last = IVec3::splat(chunk_res as i32 - 1);

        for solid in &self.solids {
            // voxels whose centers fall inside the box
            let lo = ((solid.min - chunk_min) / voxel - Vec3::splat(0.5))
                .ceil()
                .as_ivec3()
                .max(IVec3::ZERO);
            let hi = ((solid.max - chunk_min) / voxel - Vec3::splat(0.5))
                .floor()
                .as_ivec3()
                .min(last);
            if lo.cmpgt(hi).any() {
                continue;
            }

            for z in lo.z..=hi.z {
                for y in lo.y..=hi.y {
                    for x in lo.x..=hi.x {
                        let v = UVec3::new(x as u32, y as u32, z as u32);
                        let cell = v / VOXEL_BLOCK_SIZE;
                        let bit =
                            index_3d_to_1d(v % VOXEL_BLOCK_SIZE, UVec3::splat(VOXEL_BLOCK_SIZE));
                        let slot = index_3d_to_1d(cell, UVec3::splat(cells_per_chunk));
                        occupancy.cells[slot as usize] |= 1u64 << bit;
                    }
                }
            }
        }
        occupancy
    }
}

impl VoxelInjector for BoundsInjector {
    fn inject(&mut self, volume: &VolumeInfo, chunks: &[u32]) -> Vec<ChunkOccupancy> {
        chunks
            .iter()
            .map(|&chunk| self.inject_chunk(volume, chunk))
            .collect()
    }
}
