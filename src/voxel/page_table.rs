//! Sparse page table over the physical voxel volumes of every clipmap level.
//!
//! Each cell covers a 4x4x4 block of voxels and points at a page of the
//! shared pool only while at least one of its voxels is occupied. Levels
//! are stacked along Z, giving a `(n, n, n * levels)` table for `n` cells
//! per axis.

use glam::UVec3;

use crate::alloc::PageAllocator;
use crate::constants::PAGE_ID_INVALID;
use crate::core::{PageId, index_3d_to_1d};

/// One changed table entry, for incremental upload.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PageTableUpdate {
    pub cell: u32,
    pub page: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CellChange {
    Unchanged,
    Mapped(PageId),
    Unmapped(PageId),
    /// Occupied, but the page pool is empty.
    Exhausted,
}

pub struct PageTable {
    cells_per_axis: u32,
    dims: UVec3,
    entries: Vec<u32>,
    occupancy: Vec<u64>,
    updates: Vec<PageTableUpdate>,
}

impl PageTable {
    pub fn new(cells_per_axis: u32, levels: usize) -> Self {
        let dims = UVec3::new(cells_per_axis, cells_per_axis, cells_per_axis * levels as u32);
        let count = (dims.x * dims.y * dims.z) as usize;
        Self {
            cells_per_axis,
            dims,
            entries: vec![PAGE_ID_INVALID; count],
            occupancy: vec![0; count],
            updates: Vec::new(),
        }
    }

    pub fn dims(&self) -> UVec3 {
        self.dims
    }

    pub fn cells_per_axis(&self) -> u32 {
        self.cells_per_axis
    }

    fn cell_index(&self, level: usize, cell: UVec3) -> u32 {
        debug_assert!(cell.cmplt(UVec3::splat(self.cells_per_axis)).all());
        let stacked = cell + UVec3::new(0, 0, level as u32 * self.cells_per_axis);
        index_3d_to_1d(stacked, self.dims)
    }

    pub fn page(&self, level: usize, cell: UVec3) -> Option<PageId> {
        let entry = self.entries[self.cell_index(level, cell) as usize];
        (entry != PAGE_ID_INVALID).then_some(PageId(entry))
    }

    pub fn occupancy(&self, level: usize, cell: UVec3) -> u64 {
        self.occupancy[self.cell_index(level, cell) as usize]
    }

    /// Records the injected occupancy of a cell, mapping a page when it
    /// becomes occupied and releasing it when it empties.
    pub fn set_occupancy(
        &mut self,
        level: usize,
        cell: UVec3,
        mask: u64,
        pages: &mut PageAllocator,
    ) -> CellChange {
        let index = self.cell_index(level, cell);
        let slot = index as usize;
        self.occupancy[slot] = mask;
        let current = self.entries[slot];

        match (mask != 0, current != PAGE_ID_INVALID) {
            (true, false) => match pages.allocate() {
                Some(page) => {
                    self.set_entry(index, page.0);
                    CellChange::Mapped(page)
                }
                None => CellChange::Exhausted,
            },
            (false, true) => {
                pages.release(PageId(current));
                self.set_entry(index, PAGE_ID_INVALID);
                CellChange::Unmapped(PageId(current))
            }
            _ => CellChange::Unchanged,
        }
    }

    pub fn clear_cell(
        &mut self,
        level: usize,
        cell: UVec3,
        pages: &mut PageAllocator,
    ) -> CellChange {
        self.set_occupancy(level, cell, 0, pages)
    }

    fn set_entry(&mut self, index: u32, page: u32) {
        self.entries[index as usize] = page;
        self.updates.push(PageTableUpdate { cell: index, page });
    }

    /// Current table contents, `PAGE_ID_INVALID` for unmapped cells.
    pub fn entries(&self) -> &[u32] {
        &self.entries
    }

    pub fn mapped_count(&self) -> usize {
        self.entries.iter().filter(|&&e| e != PAGE_ID_INVALID).count()
    }

    pub fn take_updates(&mut self) -> Vec<PageTableUpdate> {
        std::mem::take(&mut self.updates)
    }

    pub fn reset(&mut self) {
        self.entries.fill(PAGE_ID_INVALID);
        self.occupancy.fill(0);
        self.updates.clear();
    }
}
