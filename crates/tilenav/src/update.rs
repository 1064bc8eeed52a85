//! Single-tile update orchestration.
//!
//! Ties the pieces together for one changed tile: decide whether the tile
//! should exist at all, reuse cached build results when the input has not
//! changed, build otherwise, serialize and swap the tile into the shared
//! navigation mesh.

use log::debug;
use tilenav_common::Result;

use crate::build::prepare_tile_data;
use crate::cache::TilesCache;
use crate::input::{AgentHalfExtents, InputMesh};
use crate::navmesh::SharedNavMesh;
use crate::settings::Settings;
use crate::tile::{should_add_tile, TilePosition};
use crate::tiledata::{make_nav_mesh_tile_data, OffMeshConnection};

/// What happened to the tile in the shared mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileOutcome {
    /// The tile was not present before and is now
    Added,
    /// An existing tile was swapped for a new blob
    Replaced,
    /// The tile is absent after the update
    Removed,
}

/// Result of one tile update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateStatus {
    pub outcome: TileOutcome,
    /// Whether the geometry came from the cache instead of a fresh build
    pub from_cache: bool,
}

fn remove(nav_mesh: &SharedNavMesh, tile: TilePosition) -> UpdateStatus {
    nav_mesh.lock().remove_tile(tile);
    UpdateStatus {
        outcome: TileOutcome::Removed,
        from_cache: false,
    }
}

/// Updates one tile of the shared navigation mesh for one agent size.
///
/// `input` is the full geometry overlapping the tile, `None` when the tile
/// has no geometry left. `reference` anchors the tile budget: tiles whose
/// surrounding square around the reference would not fit the budget are
/// removed instead of built.
pub fn update_nav_mesh(
    agent: &AgentHalfExtents,
    input: Option<&InputMesh>,
    tile: TilePosition,
    reference: TilePosition,
    off_mesh_connections: &[OffMeshConnection],
    settings: &Settings,
    nav_mesh: &SharedNavMesh,
    cache: &TilesCache,
) -> Result<UpdateStatus> {
    let Some(input) = input else {
        debug!("tile {tile:?}: no input geometry, removing");
        return Ok(remove(nav_mesh, tile));
    };
    if input.is_empty() {
        debug!("tile {tile:?}: empty input geometry, removing");
        return Ok(remove(nav_mesh, tile));
    }

    let max_tiles = settings.max_tiles.min(nav_mesh.lock_const().params().max_tiles);
    if !should_add_tile(tile, reference, max_tiles) {
        debug!("tile {tile:?}: outside the tile budget, removing");
        return Ok(remove(nav_mesh, tile));
    }

    let (data, from_cache) = match cache.get(agent, tile, input) {
        Some(cached) => (cached, true),
        None => match prepare_tile_data(input, agent, settings, tile)? {
            Some(fresh) => (cache.set(agent, tile, input, fresh), false),
            None => {
                debug!("tile {tile:?}: no traversable surface, removing");
                return Ok(remove(nav_mesh, tile));
            }
        },
    };

    // Off-mesh connections are applied at serialization time, so a cached
    // build still picks up the current set.
    let serialized = make_nav_mesh_tile_data(&data, tile, agent, settings, off_mesh_connections)?;

    let previous = nav_mesh.lock().add_tile(tile, serialized);
    let outcome = if previous.is_some() {
        TileOutcome::Replaced
    } else {
        TileOutcome::Added
    };
    Ok(UpdateStatus { outcome, from_cache })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::tests::{ground_tile_mesh, test_agent, test_settings};
    use crate::navmesh::make_empty_nav_mesh;

    fn fixture() -> (Settings, SharedNavMesh, TilesCache) {
        let settings = test_settings();
        let nav_mesh = make_empty_nav_mesh(&settings).unwrap();
        let cache = TilesCache::new(16 * 1024 * 1024);
        (settings, nav_mesh, cache)
    }

    #[test]
    fn flat_ground_adds_a_tile() {
        let (settings, nav_mesh, cache) = fixture();
        let tile = TilePosition::new(0, 0);

        let status = update_nav_mesh(
            &test_agent(),
            Some(&ground_tile_mesh()),
            tile,
            tile,
            &[],
            &settings,
            &nav_mesh,
            &cache,
        )
        .unwrap();

        assert_eq!(status.outcome, TileOutcome::Added);
        assert!(!status.from_cache);
        assert_eq!(nav_mesh.lock_const().tile_count(), 1);
    }

    #[test]
    fn repeated_update_hits_the_cache_and_replaces() {
        let (settings, nav_mesh, cache) = fixture();
        let tile = TilePosition::new(0, 0);
        let input = ground_tile_mesh();

        let first = update_nav_mesh(
            &test_agent(),
            Some(&input),
            tile,
            tile,
            &[],
            &settings,
            &nav_mesh,
            &cache,
        )
        .unwrap();
        let blob_after_first = nav_mesh.lock_const().tile(tile).cloned().unwrap();

        let second = update_nav_mesh(
            &test_agent(),
            Some(&input),
            tile,
            tile,
            &[],
            &settings,
            &nav_mesh,
            &cache,
        )
        .unwrap();
        let blob_after_second = nav_mesh.lock_const().tile(tile).cloned().unwrap();

        assert_eq!(first.outcome, TileOutcome::Added);
        assert!(!first.from_cache);
        assert_eq!(second.outcome, TileOutcome::Replaced);
        assert!(second.from_cache);
        assert_eq!(blob_after_first, blob_after_second);
    }

    #[test]
    fn missing_input_removes_the_tile() {
        let (settings, nav_mesh, cache) = fixture();
        let tile = TilePosition::new(0, 0);

        update_nav_mesh(
            &test_agent(),
            Some(&ground_tile_mesh()),
            tile,
            tile,
            &[],
            &settings,
            &nav_mesh,
            &cache,
        )
        .unwrap();
        assert_eq!(nav_mesh.lock_const().tile_count(), 1);

        let status = update_nav_mesh(
            &test_agent(),
            None,
            tile,
            tile,
            &[],
            &settings,
            &nav_mesh,
            &cache,
        )
        .unwrap();
        assert_eq!(status.outcome, TileOutcome::Removed);
        assert_eq!(nav_mesh.lock_const().tile_count(), 0);
    }

    #[test]
    fn unwalkable_rebuild_removes_an_existing_tile() {
        use crate::areas::AreaType;

        let (settings, nav_mesh, cache) = fixture();
        let tile = TilePosition::new(0, 0);

        update_nav_mesh(
            &test_agent(),
            Some(&ground_tile_mesh()),
            tile,
            tile,
            &[],
            &settings,
            &nav_mesh,
            &cache,
        )
        .unwrap();
        assert_eq!(nav_mesh.lock_const().tile_count(), 1);

        // The ground is replaced by a vertical wall, which the slope
        // filter rejects entirely.
        let wall = InputMesh {
            vertices: vec![
                0.0, 0.0, 0.0, //
                4.0, 0.0, 0.0, //
                4.0, 0.0, 8.0, //
                0.0, 0.0, 8.0,
            ],
            indices: vec![0, 1, 2, 0, 2, 3],
            area_types: vec![AreaType::Ground, AreaType::Ground],
            water: Vec::new(),
        };
        let status = update_nav_mesh(
            &test_agent(),
            Some(&wall),
            tile,
            tile,
            &[],
            &settings,
            &nav_mesh,
            &cache,
        )
        .unwrap();
        assert_eq!(status.outcome, TileOutcome::Removed);
        assert_eq!(nav_mesh.lock_const().tile_count(), 0);
    }

    #[test]
    fn empty_input_counts_as_removal() {
        let (settings, nav_mesh, cache) = fixture();
        let tile = TilePosition::new(3, 3);

        let status = update_nav_mesh(
            &test_agent(),
            Some(&InputMesh::default()),
            tile,
            tile,
            &[],
            &settings,
            &nav_mesh,
            &cache,
        )
        .unwrap();
        assert_eq!(status.outcome, TileOutcome::Removed);
    }

    #[test]
    fn tiles_past_the_budget_are_removed() {
        let (mut settings, nav_mesh, cache) = fixture();
        settings.max_tiles = 9;
        let reference = TilePosition::new(0, 0);
        let far = TilePosition::new(2, 0);

        let status = update_nav_mesh(
            &test_agent(),
            Some(&ground_tile_mesh()),
            far,
            reference,
            &[],
            &settings,
            &nav_mesh,
            &cache,
        )
        .unwrap();
        assert_eq!(status.outcome, TileOutcome::Removed);
        assert_eq!(nav_mesh.lock_const().tile_count(), 0);
    }

    #[test]
    fn off_mesh_connections_change_the_serialized_tile() {
        use crate::areas::AreaType;
        use glam::Vec3;

        let (settings, nav_mesh, cache) = fixture();
        let tile = TilePosition::new(0, 0);
        let input = ground_tile_mesh();

        update_nav_mesh(
            &test_agent(),
            Some(&input),
            tile,
            tile,
            &[],
            &settings,
            &nav_mesh,
            &cache,
        )
        .unwrap();
        let without = nav_mesh.lock_const().tile(tile).cloned().unwrap();

        let connection = OffMeshConnection {
            start: Vec3::new(1.0, 1.0, 0.5),
            end: Vec3::new(3.0, 3.0, 0.5),
            area_type: AreaType::Door,
            bidirectional: true,
        };
        let status = update_nav_mesh(
            &test_agent(),
            Some(&input),
            tile,
            tile,
            &[connection],
            &settings,
            &nav_mesh,
            &cache,
        )
        .unwrap();
        let with = nav_mesh.lock_const().tile(tile).cloned().unwrap();

        assert!(status.from_cache);
        assert_ne!(without, with);
    }
}
