//! Derivation of the voxel-space build configuration for one tile.

use glam::Vec3;
use tilenav_gen::BuildConfig;

use crate::input::AgentHalfExtents;
use crate::settings::Settings;
use crate::tile::{tile_bounds, TilePosition};

/// Agent body height in navmesh units
fn agent_height(settings: &Settings, agent: &AgentHalfExtents) -> f32 {
    2.0 * agent.height * settings.recast_scale_factor
}

/// Agent radius in navmesh units
fn agent_radius(settings: &Settings, agent: &AgentHalfExtents) -> f32 {
    agent.radius * settings.recast_scale_factor
}

/// Maximum climb height in navmesh units
fn max_climb(settings: &Settings) -> f32 {
    settings.max_climb * settings.recast_scale_factor
}

/// Builds the per-tile voxelization parameters from the agent capsule, the
/// settings and the tile's vertical extent (navmesh units).
pub fn make_config(
    settings: &Settings,
    agent: &AgentHalfExtents,
    tile: TilePosition,
    min_y: f32,
    max_y: f32,
) -> BuildConfig {
    let cs = settings.cell_size;
    let ch = settings.cell_height;

    let (tile_min, tile_max) = tile_bounds(settings, tile);
    let border = settings.border_size;
    let padding = border as f32 * cs;

    BuildConfig {
        width: settings.tile_size + border * 2,
        height: settings.tile_size + border * 2,
        cs,
        ch,
        bmin: Vec3::new(tile_min.x - padding, min_y - ch, tile_min.z - padding),
        bmax: Vec3::new(tile_max.x + padding, max_y + ch, tile_max.z + padding),
        walkable_slope_angle: settings.max_slope,
        walkable_height: (agent_height(settings, agent) / ch).ceil() as i32,
        walkable_climb: (max_climb(settings) / ch).floor() as i32,
        walkable_radius: (agent_radius(settings, agent) / cs).ceil() as i32,
        max_edge_len: (settings.max_edge_len / cs).round() as i32,
        max_simplification_error: settings.max_simplification_error,
        min_region_area: settings.region_min_size * settings.region_min_size,
        merge_region_area: settings.region_merge_size * settings.region_merge_size,
        max_verts_per_poly: settings.max_verts_per_poly,
        detail_sample_dist: if settings.detail_sample_dist < 0.9 {
            0.0
        } else {
            cs * settings.detail_sample_dist
        },
        detail_sample_max_error: ch * settings.detail_sample_max_error,
        border_size: border,
        tile_size: settings.tile_size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent() -> AgentHalfExtents {
        AgentHalfExtents {
            radius: 0.25,
            height: 0.5,
        }
    }

    fn settings() -> Settings {
        Settings {
            cell_size: 0.5,
            cell_height: 0.25,
            recast_scale_factor: 1.0,
            border_size: 4,
            tile_size: 16,
            max_climb: 0.5,
            max_edge_len: 6.0,
            detail_sample_dist: 6.0,
            detail_sample_max_error: 1.0,
            ..Settings::default()
        }
    }

    #[test]
    fn voxel_parameters_round_the_right_way() {
        let config = make_config(&settings(), &agent(), TilePosition::new(0, 0), 0.0, 2.0);
        // height = 1.0 / 0.25, radius = 0.25 / 0.5 rounded up.
        assert_eq!(config.walkable_height, 4);
        assert_eq!(config.walkable_climb, 2);
        assert_eq!(config.walkable_radius, 1);
        assert_eq!(config.max_edge_len, 12);
        assert_eq!(config.width, 24);
        assert_eq!(config.min_region_area, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn bounds_are_padded_by_the_border() {
        let config = make_config(&settings(), &agent(), TilePosition::new(1, 0), 0.0, 2.0);
        // Tile spans [8, 16] in x, padded by 4 cells of 0.5.
        assert!((config.bmin.x - 6.0).abs() < 1e-6);
        assert!((config.bmax.x - 18.0).abs() < 1e-6);
        assert!((config.bmin.y - -0.25).abs() < 1e-6);
    }

    #[test]
    fn small_sample_dist_disables_sampling() {
        let mut s = settings();
        s.detail_sample_dist = 0.5;
        let config = make_config(&s, &agent(), TilePosition::new(0, 0), 0.0, 2.0);
        assert_eq!(config.detail_sample_dist, 0.0);
    }
}
