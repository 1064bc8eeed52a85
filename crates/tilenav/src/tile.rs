//! Tile grid coordinates, tile bounds and the coordinate conversion from
//! world space into navmesh space.

use glam::Vec3;

use crate::settings::Settings;

/// Position of one tile on the world-space tiling
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TilePosition {
    pub x: i32,
    pub y: i32,
}

impl TilePosition {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Chebyshev distance to another tile
    pub fn distance(&self, other: TilePosition) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }
}

/// Converts a world-space point (z up) into navmesh space (y up), applying
/// the configured unit scale.
#[inline]
pub fn to_navmesh_coordinates(settings: &Settings, position: Vec3) -> Vec3 {
    Vec3::new(position.x, position.z, position.y) * settings.recast_scale_factor
}

/// Horizontal bounds of a tile in navmesh space, without border padding.
/// The tile's grid y axis maps to the navmesh z axis.
pub fn tile_bounds(settings: &Settings, tile: TilePosition) -> (Vec3, Vec3) {
    let size = settings.tile_world_size();
    let bmin = Vec3::new(tile.x as f32 * size, 0.0, tile.y as f32 * size);
    let bmax = bmin + Vec3::new(size, 0.0, size);
    (bmin, bmax)
}

/// Whether a changed tile is worth building: every tile within the same
/// Chebyshev distance of the reference tile must fit the tile budget.
pub fn should_add_tile(
    tile: TilePosition,
    reference: TilePosition,
    max_tiles: i32,
) -> bool {
    let distance = tile.distance(reference) as i64;
    let side = 2 * distance + 1;
    side * side <= max_tiles as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_swaps_up_axis_and_scales() {
        let mut settings = Settings::default();
        settings.recast_scale_factor = 2.0;
        let p = to_navmesh_coordinates(&settings, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(p, Vec3::new(2.0, 6.0, 4.0));
    }

    #[test]
    fn bounds_tile_the_plane() {
        let settings = Settings::default();
        let (bmin0, bmax0) = tile_bounds(&settings, TilePosition::new(0, 0));
        let (bmin1, _) = tile_bounds(&settings, TilePosition::new(1, 0));
        assert_eq!(bmax0.x, bmin1.x);
        assert_eq!(bmin0.x, 0.0);
        assert_eq!(bmin0.z, 0.0);
    }

    #[test]
    fn budget_policy_counts_the_surrounding_square() {
        let origin = TilePosition::new(0, 0);
        // Distance 1 needs a 3x3 square of tiles.
        assert!(should_add_tile(TilePosition::new(1, 1), origin, 9));
        assert!(!should_add_tile(TilePosition::new(1, 1), origin, 8));
        assert!(!should_add_tile(TilePosition::new(5, 0), origin, 100));
        assert!(should_add_tile(TilePosition::new(5, 0), origin, 121));
    }
}
