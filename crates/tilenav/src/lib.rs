//! Tiled navigation mesh runtime.
//!
//! Turns world geometry into a tiled navigation mesh, one tile at a time:
//! input meshes are voxelized and polygonized by `tilenav-gen`, serialized
//! into self-contained tile blobs and swapped into a shared mesh guarded
//! for concurrent access. Build results are cached by input content so
//! unchanged tiles never rebuild.

pub mod areas;
pub mod build;
pub mod cache;
pub mod config;
pub mod input;
pub mod navmesh;
pub mod settings;
pub mod tile;
pub mod tiledata;
pub mod update;

pub use areas::{area_flags, poly_flags, AreaType};
pub use build::{prepare_tile_data, PreparedTileData};
pub use cache::{CacheStats, TilesCache};
pub use config::make_config;
pub use input::{AgentHalfExtents, InputMesh, WaterBody, WaterFootprint};
pub use navmesh::{make_empty_nav_mesh, NavMesh, NavMeshParams, SharedNavMesh};
pub use settings::Settings;
pub use tile::{should_add_tile, tile_bounds, to_navmesh_coordinates, TilePosition};
pub use tiledata::{make_nav_mesh_tile_data, OffMeshConnection, SerializedTile, TileHeader};
pub use update::{update_nav_mesh, TileOutcome, UpdateStatus};
