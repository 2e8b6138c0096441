//! Surface cache management
//!
//! - `card`: per-face capture projections and atlas viewport math
//! - `cache`: entry lifetime, adaptive resolution and the capture work-list

pub mod cache;
pub mod card;

pub use cache::{
    CaptureBatch, CaptureJob, Card, CardCapture, SurfaceCacheEntry, SurfaceCacheManager,
};
pub use card::{CubeFace, card_view_projection, uv_transform, viewport_info};
