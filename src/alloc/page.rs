//! Two-phase free list for voxel pages.
//!
//! A released page is parked in the pending list and only becomes
//! allocatable again after [`PageAllocator::flush`], which the scheduler
//! calls at the start of the following frame once GPU readers of the old
//! binding have retired.

use crate::core::PageId;

pub struct PageAllocator {
    capacity: u32,
    free: Vec<u32>,
    pending_release: Vec<u32>,
    allocated: Vec<bool>,
}

impl PageAllocator {
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            // reversed so pops hand out 0, 1, 2, ...
            free: (0..capacity).rev().collect(),
            pending_release: Vec::new(),
            allocated: vec![false; capacity as usize],
        }
    }

    pub fn allocate(&mut self) -> Option<PageId> {
        let page = self.free.pop()?;
        self.allocated[page as usize] = true;
        Some(PageId(page))
    }

    /// Stages `page` for reuse after the next flush.
    ///
    /// Panics if the page is not currently allocated.
    pub fn release(&mut self, page: PageId) {
        let slot = &mut self.allocated[page.index()];
        assert!(*slot, "releasing unallocated voxel page {}", page.0);
        *slot = false;
        self.pending_release.push(page.0);
    }

    /// Moves every staged page back onto the free list.
    pub fn flush(&mut self) -> usize {
        let count = self.pending_release.len();
        self.free.append(&mut self.pending_release);
        count
    }

    pub fn reset(&mut self) {
        self.free = (0..self.capacity).rev().collect();
        self.pending_release.clear();
        self.allocated.fill(false);
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending_release.len()
    }

    pub fn allocated_count(&self) -> usize {
        self.capacity as usize - self.free.len() - self.pending_release.len()
    }

    /// Free pages in pop order, last element first.
    pub fn free_list(&self) -> &[u32] {
        &self.free
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocates_in_order() {
        let mut pages = PageAllocator::new(4);
        assert_eq!(pages.allocate(), Some(PageId(0)));
        assert_eq!(pages.allocate(), Some(PageId(1)));
        assert_eq!(pages.allocated_count(), 2);
    }

    #[test]
    fn test_released_page_waits_for_flush() {
        let mut pages = PageAllocator::new(2);
        let a = pages.allocate().unwrap();
        let _b = pages.allocate().unwrap();
        pages.release(a);

        assert_eq!(pages.pending_count(), 1);
        assert_eq!(pages.allocate(), None);

        assert_eq!(pages.flush(), 1);
        assert_eq!(pages.allocate(), Some(a));
    }

    #[test]
    #[should_panic(expected = "releasing unallocated voxel page")]
    fn test_double_release_panics() {
        let mut pages = PageAllocator::new(2);
        let a = pages.allocate().unwrap();
        pages.release(a);
        pages.release(a);
    }

    #[test]
    fn test_reset_restores_pool() {
        let mut pages = PageAllocator::new(3);
        let a = pages.allocate().unwrap();
        pages.allocate().unwrap();
        pages.release(a);
        pages.reset();
        assert_eq!(pages.free_count(), 3);
        assert_eq!(pages.pending_count(), 0);
        assert_eq!(pages.allocate(), Some(PageId(0)));
    }
}
