//! Voxel-space build configuration for one tile.

use glam::Vec3;

/// Configuration parameters for a single tile build, all in voxelizer
/// coordinate space (y-up). Derived by the runtime crate from the agent
/// capsule and the world-unit settings.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Grid width along the x-axis, including border padding
    pub width: i32,
    /// Grid height along the z-axis, including border padding
    pub height: i32,

    /// Horizontal voxel resolution (cell size)
    pub cs: f32,
    /// Vertical voxel resolution (cell height)
    pub ch: f32,

    /// Minimum bounds of the padded tile AABB
    pub bmin: Vec3,
    /// Maximum bounds of the padded tile AABB
    pub bmax: Vec3,

    /// Maximum walkable slope in degrees
    pub walkable_slope_angle: f32,
    /// Minimum floor-to-ceiling clearance, in voxels
    pub walkable_height: i32,
    /// Maximum ledge height still traversable, in voxels
    pub walkable_climb: i32,
    /// Agent radius, in voxels
    pub walkable_radius: i32,

    /// Maximum contour edge length along mesh borders, in voxels
    pub max_edge_len: i32,
    /// Maximum deviation of simplified contours from raw contours
    pub max_simplification_error: f32,
    /// Minimum span count for isolated regions
    pub min_region_area: i32,
    /// Regions smaller than this are merged into neighbors when possible
    pub merge_region_area: i32,

    /// Maximum vertices per polygon produced by polygonization
    pub max_verts_per_poly: i32,

    /// Detail mesh sample spacing in world units, 0 disables sampling
    pub detail_sample_dist: f32,
    /// Maximum detail surface deviation from heightfield data
    pub detail_sample_max_error: f32,

    /// Non-navigable border padding around the tile, in voxels
    pub border_size: i32,
    /// Tile side length without padding, in voxels
    pub tile_size: i32,
}

impl BuildConfig {
    /// Validates the configuration parameters
    pub fn validate(&self) -> tilenav_common::Result<()> {
        use tilenav_common::Error;

        if self.width <= 0 || self.height <= 0 {
            return Err(Error::BuildFailure("invalid grid size".to_string()));
        }
        if self.cs <= 0.0 || self.ch <= 0.0 {
            return Err(Error::BuildFailure(
                "invalid cell size or height".to_string(),
            ));
        }
        if !(0.0..=90.0).contains(&self.walkable_slope_angle) {
            return Err(Error::BuildFailure(
                "invalid walkable slope angle".to_string(),
            ));
        }
        if self.max_verts_per_poly < 3 {
            return Err(Error::BuildFailure(
                "too few vertices per polygon".to_string(),
            ));
        }

        Ok(())
    }
}
