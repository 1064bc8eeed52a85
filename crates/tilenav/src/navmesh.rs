//! The shared navigation mesh and its guarded accessor.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tilenav_common::{Error, Result};

use crate::settings::Settings;
use crate::tile::TilePosition;
use crate::tiledata::SerializedTile;

/// Tile and polygon identifiers share this many bits
const ID_BITS: u32 = 22;

/// Navmesh-wide parameters fixed at creation time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NavMeshParams {
    /// Tile side length in navmesh units
    pub tile_size: f32,
    /// Upper bound on the number of tiles
    pub max_tiles: i32,
    /// Upper bound on polygons per tile
    pub max_polys: i32,
}

/// Smallest bit width able to represent `value` distinct values
fn min_valuable_bits(value: i32) -> u32 {
    let mut bits = 0;
    while bits < i64::BITS && (1i64 << bits) < value as i64 {
        bits += 1;
    }
    bits
}

/// The navigation mesh: fixed parameters plus one serialized blob per
/// tile. Tiles are always fully formed; replacement swaps the whole blob.
#[derive(Debug)]
pub struct NavMesh {
    params: NavMeshParams,
    tiles: BTreeMap<TilePosition, SerializedTile>,
}

impl NavMesh {
    /// Parameters the mesh was created with
    pub fn params(&self) -> &NavMeshParams {
        &self.params
    }

    /// Inserts or replaces a tile, returning the previous blob if any
    pub fn add_tile(&mut self, position: TilePosition, tile: SerializedTile) -> Option<SerializedTile> {
        self.tiles.insert(position, tile)
    }

    /// Removes a tile, returning its blob if it existed
    pub fn remove_tile(&mut self, position: TilePosition) -> Option<SerializedTile> {
        self.tiles.remove(&position)
    }

    /// Blob of one tile
    pub fn tile(&self, position: TilePosition) -> Option<&SerializedTile> {
        self.tiles.get(&position)
    }

    /// Number of tiles currently held
    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }
}

/// Guarded access to the shared navigation mesh. All mutation goes through
/// `lock`, all read-only access through `lock_const`; the raw mesh is
/// never exposed unguarded.
#[derive(Debug, Clone)]
pub struct SharedNavMesh {
    inner: Arc<RwLock<NavMesh>>,
}

impl SharedNavMesh {
    fn new(mesh: NavMesh) -> Self {
        Self {
            inner: Arc::new(RwLock::new(mesh)),
        }
    }

    /// Exclusive access for tile mutation
    pub fn lock(&self) -> RwLockWriteGuard<'_, NavMesh> {
        self.inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Shared access for path queries and inspection
    pub fn lock_const(&self) -> RwLockReadGuard<'_, NavMesh> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Creates an empty navigation mesh for the given settings. The polygon
/// budget must leave at least one of the 22 identifier bits for tiles.
pub fn make_empty_nav_mesh(settings: &Settings) -> Result<SharedNavMesh> {
    let poly_bits = min_valuable_bits(settings.max_polys);
    if poly_bits >= ID_BITS {
        return Err(Error::InvalidArgument(format!(
            "max polygons {} needs {} bits, only {} available",
            settings.max_polys,
            poly_bits,
            ID_BITS - 1
        )));
    }
    let tile_bits = ID_BITS - poly_bits;
    let max_tiles = 1i32 << tile_bits.min(31);

    let params = NavMeshParams {
        tile_size: settings.tile_world_size(),
        max_tiles,
        max_polys: 1i32 << poly_bits,
    };

    Ok(SharedNavMesh::new(NavMesh {
        params,
        tiles: BTreeMap::new(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_widths_cover_the_value_range() {
        assert_eq!(min_valuable_bits(1), 0);
        assert_eq!(min_valuable_bits(2), 1);
        assert_eq!(min_valuable_bits(1024), 10);
        assert_eq!(min_valuable_bits(1025), 11);
    }

    #[test]
    fn polygon_budget_within_bits_succeeds() {
        let mut settings = Settings::default();
        settings.max_polys = 1 << 21;
        let mesh = make_empty_nav_mesh(&settings).unwrap();
        assert_eq!(mesh.lock_const().params().max_polys, 1 << 21);
        assert_eq!(mesh.lock_const().params().max_tiles, 2);
    }

    #[test]
    fn polygon_budget_beyond_bits_is_invalid() {
        let mut settings = Settings::default();
        settings.max_polys = (1 << 21) + 1;
        match make_empty_nav_mesh(&settings) {
            Err(Error::InvalidArgument(_)) => {}
            other => panic!("expected InvalidArgument, got {other:?}"),
        }
    }

    #[test]
    fn tiles_replace_atomically() {
        let mesh = make_empty_nav_mesh(&Settings::default()).unwrap();
        let position = TilePosition::new(1, 2);

        let first = SerializedTile { data: vec![1, 2, 3] };
        let second = SerializedTile { data: vec![4, 5] };

        assert!(mesh.lock().add_tile(position, first.clone()).is_none());
        let previous = mesh.lock().add_tile(position, second.clone());
        assert_eq!(previous, Some(first));
        assert_eq!(mesh.lock_const().tile(position), Some(&second));

        assert_eq!(mesh.lock().remove_tile(position), Some(second));
        assert_eq!(mesh.lock_const().tile_count(), 0);
    }

    #[test]
    fn shared_mesh_supports_concurrent_writers() {
        use std::thread;

        let mesh = make_empty_nav_mesh(&Settings::default()).unwrap();
        let mut handles = Vec::new();
        for t in 0..4 {
            let mesh = mesh.clone();
            handles.push(thread::spawn(move || {
                for i in 0..16 {
                    let position = TilePosition::new(t, i);
                    mesh.lock()
                        .add_tile(position, SerializedTile { data: vec![t as u8, i as u8] });
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(mesh.lock_const().tile_count(), 64);
    }
}
