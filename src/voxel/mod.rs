//! Sparse scrolling voxel clipmap
//!
//! - `volume`: one clipmap level and its dirty-chunk queue
//! - `clipmap`: per-view set of levels, work-lists and page feedback
//! - `page_table`: cell-to-page indirection for the pooled voxel texture
//! - `inject`: the injection seam and a CPU reference injector

pub mod clipmap;
pub mod inject;
pub mod page_table;
pub mod volume;

pub use clipmap::{ClipmapLevelOutput, ClipmapUpdate, VoxelClipmap};
pub use inject::{BoundsInjector, ChunkOccupancy, VoxelInjector};
pub use page_table::{CellChange, PageTable, PageTableUpdate};
pub use volume::{DirtyChunk, VolumeInfo, VolumeState};
