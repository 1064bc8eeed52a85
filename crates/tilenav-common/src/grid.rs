//! Grid direction helpers used by every voxel stage.

/// Number of cardinal directions on the voxel grid.
pub const DIR_COUNT: usize = 4;

const DIR_OFFSET_X: [i32; 4] = [-1, 0, 1, 0];
const DIR_OFFSET_Z: [i32; 4] = [0, 1, 0, -1];

/// X offset for a cardinal direction (0 = -x, 1 = +z, 2 = +x, 3 = -z).
#[inline]
pub fn dir_offset_x(dir: usize) -> i32 {
    DIR_OFFSET_X[dir & 0x3]
}

/// Z offset for a cardinal direction.
#[inline]
pub fn dir_offset_z(dir: usize) -> i32 {
    DIR_OFFSET_Z[dir & 0x3]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directions_are_cyclic_and_opposed() {
        for dir in 0..DIR_COUNT {
            let opposite = (dir + 2) & 0x3;
            assert_eq!(dir_offset_x(dir), -dir_offset_x(opposite));
            assert_eq!(dir_offset_z(dir), -dir_offset_z(opposite));
        }
    }
}
