//! Render-facing data produced by the GI scene core
//!
//! Only the layouts consumed by the GPU backend live here; pass setup and
//! dispatch belong to the backend.

pub mod gpu_data;

pub use gpu_data::{
    CardGpuData, ClipmapGpuParams, MiniObjectGpuData, ObjectGpuData, SurfaceCacheGpuData,
};
