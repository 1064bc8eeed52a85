//! Navigation mesh generation pipeline.
//!
//! Turns a voxel heightfield into a partitioned, simplified polygon mesh:
//! rasterization, compaction, erosion, distance field, watershed regions,
//! contour extraction and polygonization, plus a height-accurate detail mesh.

mod area;
mod compact;
mod config;
mod contour;
mod detail;
mod distance;
mod heightfield;
mod polymesh;
mod rasterize;
mod region;

pub use area::erode_walkable_area;
pub use compact::{CompactCell, CompactHeightfield, CompactSpan, NOT_CONNECTED};
pub use config::BuildConfig;
pub use contour::{build_contours, Contour, ContourSet};
pub use detail::{build_poly_mesh_detail, PolyMeshDetail};
pub use distance::build_distance_field;
pub use heightfield::{Heightfield, Span, NULL_AREA, SPAN_MAX_HEIGHT};
pub use polymesh::{build_poly_mesh, PolyMesh, MESH_NULL_IDX};
pub use rasterize::{clear_unwalkable_triangles, rasterize_triangles};
pub use region::{build_regions, BORDER_REG};
