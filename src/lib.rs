// Core module with fundamental types
pub mod core;

// Allocators for ids, atlas regions and voxel pages
pub mod alloc;

// Scene inputs and the object registry
pub mod scene;

// Surface cache entries and card capture
pub mod surface;

// Scrolling voxel clipmap and sparse paging
pub mod voxel;

// GPU descriptor layouts
pub mod render;

// Other modules
pub mod constants;
pub mod error;
pub mod gi_scene;
pub mod settings;

// Re-exports
pub use self::alloc::{AtlasAllocator, AtlasRegion, PageAllocator, SlotAllocator};
pub use constants::*;
pub use self::core::{Aabb, EntityId, ObjectId, PageId, SurfaceCacheId, ViewId};
pub use error::{GiError, GiResult};
pub use gi_scene::{
    FrameOutputs, GiScene, SharedFrameOutputs, SurfaceCacheUpload, ViewInput, ViewOutputs,
};
pub use render::{
    CardGpuData, ClipmapGpuParams, MiniObjectGpuData, ObjectGpuData, SurfaceCacheGpuData,
};
pub use scene::{
    LayoutId, MaterialId, MeshBatch, ObjectCommands, ObjectRecord, ObjectRegistry, SceneDiffQueue,
    SceneDiffSender, SceneEntity, SceneEvent, SurfaceCacheKey,
};
pub use settings::{
    ClipmapSettings, GiSettings, SceneSettings, SurfaceCacheSettings, VolumeResolutionPreset,
    load_settings, save_settings,
};
pub use surface::{CaptureJob, CubeFace, SurfaceCacheEntry, SurfaceCacheManager};
pub use voxel::{
    BoundsInjector, ChunkOccupancy, ClipmapLevelOutput, ClipmapUpdate, VolumeInfo, VolumeState,
    VoxelClipmap, VoxelInjector,
};
