// Object and surface cache tables
pub const MAX_OBJECTS: u32 = 16384;
pub const MAX_SURFACE_CACHES: u32 = 4096;
pub const MAX_CARDS_PER_MESH: usize = 12;
pub const OBJECT_ID_INVALID: u32 = u32::MAX;

// Surface cache atlas
pub const SURFACE_ATLAS_RESOLUTION: u32 = 2048;
pub const SURFACE_MIN_NODE_SIZE: u32 = 16;
pub const SURFACE_MAX_CARD_RESOLUTION: u32 = 128;
pub const SURFACE_DEFAULT_CARD_RESOLUTION: u32 = 32;
pub const SURFACE_RESOLUTION_THRESHOLDS: [f32; 3] = [400.0, 1600.0, 6400.0];
pub const SURFACE_RESOLUTION_CHECKS_PER_FRAME: usize = 8;
/// Relative growth of capture bounds so faces never clip the mesh.
pub const CARD_BOUNDS_PADDING: f32 = 1e-3;

// Voxel clipmap
pub const MAX_CLIP_NUM: usize = 4;
pub const VOXEL_BLOCK_SIZE: u32 = 4;
pub const UPDATE_CHUNK_NUM: u32 = 8;
pub const VOLUME_RESOLUTIONS: [u32; 3] = [64, 96, 128];
pub const DEFAULT_VOXEL_CELL_SIZE: f32 = 20.0;
pub const CHUNK_UPDATES_PER_FRAME: usize = 64;
pub const DIRTY_PADDING_CELLS: u32 = 1;

// Voxel page pool
pub const PAGES_PER_AXIS: u32 = 32;
pub const PAGE_ID_INVALID: u32 = 0x3FFF_FFFF;
