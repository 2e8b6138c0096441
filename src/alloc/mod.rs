//! Allocators backing the GPU-resident tables
//!
//! - `slot`: fixed-capacity keyed id tables (objects, surface caches)
//! - `quadtree`: square region packing for the surface cache atlas
//! - `page`: two-phase free list for pooled voxel pages

pub mod page;
pub mod quadtree;
pub mod slot;

pub use page::PageAllocator;
pub use quadtree::{AtlasAllocator, AtlasRegion};
pub use slot::SlotAllocator;
