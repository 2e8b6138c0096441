//! Card projections: one orthographic capture per cube face of an object's
//! local bounding box.

use glam::{Mat4, Vec3, Vec4};

use crate::alloc::AtlasRegion;
use crate::constants::CARD_BOUNDS_PADDING;
use crate::core::Aabb;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CubeFace {
    PosX,
    NegX,
    PosY,
    NegY,
    PosZ,
    NegZ,
}

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PosX,
        CubeFace::NegX,
        CubeFace::PosY,
        CubeFace::NegY,
        CubeFace::PosZ,
        CubeFace::NegZ,
    ];

    /// Outward normal of the face the card looks at.
    pub fn normal(self) -> Vec3 {
        match self {
            CubeFace::PosX => Vec3::X,
            CubeFace::NegX => Vec3::NEG_X,
            CubeFace::PosY => Vec3::Y,
            CubeFace::NegY => Vec3::NEG_Y,
            CubeFace::PosZ => Vec3::Z,
            CubeFace::NegZ => Vec3::NEG_Z,
        }
    }

    fn up(self) -> Vec3 {
        match self {
            CubeFace::PosZ | CubeFace::NegZ => Vec3::Y,
            _ => Vec3::Z,
        }
    }

    /// Local axes spanning the card horizontally and vertically.
    pub fn extent_axes(self) -> (usize, usize) {
        match self {
            CubeFace::PosX | CubeFace::NegX => (1, 2),
            CubeFace::PosY | CubeFace::NegY => (0, 2),
            CubeFace::PosZ | CubeFace::NegZ => (0, 1),
        }
    }
}

/// Local-to-clip transform capturing `face` of `bounds`.
///
/// Width and height follow the box extents on the face's own axes so the
/// projection fills the card; depth spans the largest extent.
pub fn card_view_projection(face: CubeFace, bounds: &Aabb) -> Mat4 {
    let center = bounds.center();
    let size = (bounds.size() * (1.0 + CARD_BOUNDS_PADDING)).max(Vec3::splat(1e-4));
    let (u, v) = face.extent_axes();
    let half_w = size[u] * 0.5;
    let half_h = size[v] * 0.5;
    let half_d = size.max_element() * 0.5;

    // camera sits on the face side looking back into the box
    let view = Mat4::look_to_rh(center, -face.normal(), face.up());
    let projection = Mat4::orthographic_rh(-half_w, half_w, -half_h, half_h, -half_d, half_d);
    projection * view
}

/// Clip-space scale (xy) and offset (zw) placing a card render inside its
/// atlas region, shrunk by one texel and flipped for a top-left origin.
pub fn viewport_info(region: &AtlasRegion, atlas_resolution: u32) -> Vec4 {
    let uv = uv_transform(region) / atlas_resolution as f32;
    let padding = (region.size as f32 - 1.0) / region.size as f32;
    let offset_x = (uv.z + 0.5 * uv.x) * 2.0 - 1.0;
    let offset_y = (uv.w + 0.5 * uv.y) * 2.0 - 1.0;
    Vec4::new(uv.x * padding, -(uv.y * padding), offset_x, -offset_y)
}

/// `(size, size, offset.x, offset.y)` in texels.
pub fn uv_transform(region: &AtlasRegion) -> Vec4 {
    Vec4::new(
        region.size as f32,
        region.size as f32,
        region.offset.x as f32,
        region.offset.y as f32,
    )
}
