//! Integer grid helpers shared by the clipmap volumes and page tables.

use glam::{IVec3, UVec3};

/// Linear index with X varying fastest.
#[inline]
pub fn index_3d_to_1d(p: UVec3, dims: UVec3) -> u32 {
    p.x + p.y * dims.x + p.z * dims.x * dims.y
}

#[inline]
pub fn index_1d_to_3d(index: u32, dims: UVec3) -> UVec3 {
    let slice = dims.x * dims.y;
    UVec3::new(index % dims.x, (index % slice) / dims.x, index / slice)
}

/// Component-wise Euclidean remainder, always in `[0, m)`.
#[inline]
pub fn wrap(v: IVec3, m: IVec3) -> IVec3 {
    IVec3::new(
        v.x.rem_euclid(m.x),
        v.y.rem_euclid(m.y),
        v.z.rem_euclid(m.z),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_roundtrip_corners() {
        let dims = UVec3::new(8, 4, 2);
        assert_eq!(index_3d_to_1d(UVec3::new(7, 3, 1), dims), 63);
        assert_eq!(index_1d_to_3d(63, dims), UVec3::new(7, 3, 1));
        assert_eq!(index_1d_to_3d(9, dims), UVec3::new(1, 1, 0));
    }

    #[test]
    fn test_wrap_negative() {
        let m = IVec3::splat(8);
        assert_eq!(wrap(IVec3::new(-1, 8, 17), m), IVec3::new(7, 0, 1));
    }
}
