//! Core module containing fundamental types
//!
//! This module contains the basic building blocks shared by every stage:
//! - Bounding boxes
//! - Typed handles (entities, objects, surface caches, pages, views)
//! - Integer grid indexing

pub mod bounds;
pub mod grid;
pub mod ids;

pub use bounds::Aabb;
pub use grid::{index_1d_to_3d, index_3d_to_1d, wrap};
pub use ids::{EntityId, ObjectId, PageId, SurfaceCacheId, ViewId};
