//! Scene-side inputs and the object registry
//!
//! External systems describe entities with [`SceneEntity`]; the registry
//! stages their additions and removals and reconciles them once per frame.

pub mod entity;
pub mod events;
pub mod key;
pub mod registry;

pub use entity::{LayoutId, MaterialId, MeshBatch, SceneEntity};
pub use events::{SceneDiffQueue, SceneDiffSender, SceneEvent};
pub use key::SurfaceCacheKey;
pub use registry::{ObjectCommands, ObjectRecord, ObjectRegistry};
