//! Build settings shared by all tiles and agents.

use serde::{Deserialize, Serialize};

/// World-unit parameters of the navmesh build, loaded once from
/// configuration and treated as immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Horizontal voxel size in navmesh units
    pub cell_size: f32,
    /// Vertical voxel size in navmesh units
    pub cell_height: f32,
    /// Maximum walkable slope in degrees
    pub max_slope: f32,
    /// Maximum traversable ledge height in world units
    pub max_climb: f32,
    /// Non-navigable padding around each tile, in voxels
    pub border_size: i32,
    /// Tile side length in voxels, without padding
    pub tile_size: i32,
    /// Maximum length of border edges in navmesh units
    pub max_edge_len: f32,
    /// Maximum deviation of simplified contours, in voxels
    pub max_simplification_error: f32,
    /// Side length of the smallest allowed isolated region, in voxels
    pub region_min_size: i32,
    /// Regions below this side length are merged into neighbors
    pub region_merge_size: i32,
    /// Maximum vertices per navigation polygon
    pub max_verts_per_poly: i32,
    /// Detail mesh sample spacing factor, values below 0.9 disable sampling
    pub detail_sample_dist: f32,
    /// Detail mesh sample error factor, in cell heights
    pub detail_sample_max_error: f32,
    /// Scale from world units into navmesh units
    pub recast_scale_factor: f32,
    /// Fraction of the agent height kept below the water surface
    pub swim_height_scale: f32,
    /// Upper bound on the number of tiles kept in the navmesh
    pub max_tiles: i32,
    /// Upper bound on polygons per tile, drives the identifier bit split
    pub max_polys: i32,
    /// Tile cache capacity in bytes
    pub max_cache_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cell_size: 0.2,
            cell_height: 0.2,
            max_slope: 49.0,
            max_climb: 0.34,
            border_size: 16,
            tile_size: 64,
            max_edge_len: 2.4,
            max_simplification_error: 1.3,
            region_min_size: 8,
            region_merge_size: 20,
            max_verts_per_poly: 6,
            detail_sample_dist: 6.0,
            detail_sample_max_error: 1.0,
            recast_scale_factor: 0.017_647_06,
            swim_height_scale: 0.89,
            max_tiles: 512,
            max_polys: 4096,
            max_cache_size: 32 * 1024 * 1024,
        }
    }
}

impl Settings {
    /// Tile side length in navmesh units
    #[inline]
    pub fn tile_world_size(&self) -> f32 {
        self.tile_size as f32 * self.cell_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_consistent() {
        let settings = Settings::default();
        assert!(settings.cell_size > 0.0);
        assert!(settings.cell_height > 0.0);
        assert!(settings.max_verts_per_poly >= 3);
        assert!((settings.tile_world_size() - 12.8).abs() < 1e-5);
    }

    #[test]
    fn settings_deserialize_with_defaults() {
        let settings: Settings = serde_json::from_str("{\"tile_size\": 32}").unwrap();
        assert_eq!(settings.tile_size, 32);
        assert_eq!(settings.max_verts_per_poly, 6);
    }
}
