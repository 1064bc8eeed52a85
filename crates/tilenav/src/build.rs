//! Per-tile build pipeline driver.
//!
//! Runs the full geometry pipeline for one tile and agent size: coordinate
//! conversion, triangle and water rasterization, filtering, region
//! partitioning, contour extraction and polygonization. The result is the
//! cacheable portion of a tile, independent of off-mesh connections.

use glam::Vec3;
use log::debug;
use tilenav_common::{Error, Result};
use tilenav_gen::{
    build_contours, build_distance_field, build_poly_mesh, build_poly_mesh_detail, build_regions,
    clear_unwalkable_triangles, erode_walkable_area, rasterize_triangles, CompactHeightfield,
    Heightfield, PolyMesh, PolyMeshDetail,
};

use crate::areas::{area_flags, AreaType};
use crate::config::make_config;
use crate::input::{AgentHalfExtents, InputMesh, WaterBody, WaterFootprint};
use crate::settings::Settings;
use crate::tile::{to_navmesh_coordinates, TilePosition};

/// Geometry portion of one built tile, valid independent of off-mesh
/// connections. Immutable once built, shared between cache and consumers.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedTileData {
    /// Navigation polygons
    pub poly_mesh: PolyMesh,
    /// Height detail triangles
    pub detail_mesh: PolyMeshDetail,
    /// Horizontal voxel size the tile was built with
    pub cell_size: f32,
    /// Vertical voxel size the tile was built with
    pub cell_height: f32,
}

impl PreparedTileData {
    /// Approximate in-memory size, used for cache accounting
    pub fn byte_size(&self) -> usize {
        let mesh = &self.poly_mesh;
        let detail = &self.detail_mesh;
        mesh.verts.len() * 6
            + mesh.polys.len() * 2
            + mesh.regs.len() * 2
            + mesh.flags.len() * 2
            + mesh.areas.len()
            + detail.meshes.len() * 16
            + detail.verts.len() * 12
            + detail.tris.len() * 4
            + std::mem::size_of::<Self>()
    }
}

/// Converts the input triangles into navmesh space
fn convert_triangles(
    settings: &Settings,
    input: &InputMesh,
) -> Result<(Vec<Vec3>, Vec<u32>, Vec<u8>)> {
    if input.indices.len() != input.area_types.len() * 3 {
        return Err(Error::BuildFailure(format!(
            "area count {} does not match triangle count {}",
            input.area_types.len(),
            input.indices.len() / 3
        )));
    }

    let vertex_count = input.vertices.len() / 3;
    let mut vertices = Vec::with_capacity(vertex_count);
    for v in input.vertices.chunks_exact(3) {
        vertices.push(to_navmesh_coordinates(
            settings,
            Vec3::new(v[0], v[1], v[2]),
        ));
    }

    let mut indices = Vec::with_capacity(input.indices.len());
    for triangle in input.indices.chunks_exact(3) {
        for &index in triangle {
            if index < 0 || index as usize >= vertex_count {
                return Err(Error::BuildFailure(format!(
                    "triangle index {index} out of range"
                )));
            }
        }
        // The axis swap above mirrors the geometry, so the winding of each
        // triangle must be reversed to keep walkable surfaces facing up.
        indices.push(triangle[0] as u32);
        indices.push(triangle[2] as u32);
        indices.push(triangle[1] as u32);
    }

    let areas = input.area_types.iter().map(|a| a.value()).collect();
    Ok((vertices, indices, areas))
}

/// Water level in navmesh units for the given agent, kept below the
/// surface by a fraction of the agent height.
fn swim_level(settings: &Settings, agent: &AgentHalfExtents, body: &WaterBody) -> f32 {
    (body.shift.z - agent.height * settings.swim_height_scale) * settings.recast_scale_factor
}

/// Rasterizes one water body as a flat quad clipped to the tile bounds.
/// A footprint that degenerates to zero area contributes nothing.
fn rasterize_water(
    settings: &Settings,
    agent: &AgentHalfExtents,
    body: &WaterBody,
    heightfield: &mut Heightfield,
    walkable_climb: i32,
) -> Result<()> {
    let y = swim_level(settings, agent, body);

    let (mut min_x, mut min_z, mut max_x, mut max_z) = match body.footprint {
        WaterFootprint::Bounded(size) => {
            let half = size * settings.recast_scale_factor / 2.0;
            let center = to_navmesh_coordinates(settings, body.shift);
            (
                center.x - half,
                center.z - half,
                center.x + half,
                center.z + half,
            )
        }
        WaterFootprint::Unbounded => (
            heightfield.bmin.x,
            heightfield.bmin.z,
            heightfield.bmax.x,
            heightfield.bmax.z,
        ),
    };

    min_x = min_x.max(heightfield.bmin.x);
    min_z = min_z.max(heightfield.bmin.z);
    max_x = max_x.min(heightfield.bmax.x);
    max_z = max_z.min(heightfield.bmax.z);
    if min_x >= max_x || min_z >= max_z {
        debug!("water body outside tile, skipped");
        return Ok(());
    }

    let vertices = [
        Vec3::new(min_x, y, min_z),
        Vec3::new(max_x, y, min_z),
        Vec3::new(max_x, y, max_z),
        Vec3::new(min_x, y, max_z),
    ];
    let indices = [0, 1, 2, 0, 2, 3];
    let areas = [AreaType::Water.value(); 2];
    rasterize_triangles(heightfield, &vertices, &indices, &areas, walkable_climb)
}

/// Runs the geometry pipeline for one tile. `Ok(None)` means the tile
/// contains no traversable surface, which is a normal outcome rather than
/// an error.
pub fn prepare_tile_data(
    input: &InputMesh,
    agent: &AgentHalfExtents,
    settings: &Settings,
    tile: TilePosition,
) -> Result<Option<PreparedTileData>> {
    let (vertices, indices, mut areas) = convert_triangles(settings, input)?;

    // Vertical extent of the tile: geometry plus water levels.
    let mut min_y = f32::MAX;
    let mut max_y = f32::MIN;
    for v in &vertices {
        min_y = min_y.min(v.y);
        max_y = max_y.max(v.y);
    }
    for body in &input.water {
        let level = swim_level(settings, agent, body);
        min_y = min_y.min(level);
        max_y = max_y.max(level);
    }
    if min_y > max_y {
        return Ok(None);
    }

    let config = make_config(settings, agent, tile, min_y, max_y);
    config.validate()?;

    let mut heightfield = Heightfield::new(
        config.width,
        config.height,
        config.bmin,
        config.bmax,
        config.cs,
        config.ch,
    )?;

    clear_unwalkable_triangles(config.walkable_slope_angle, &vertices, &indices, &mut areas);
    rasterize_triangles(
        &mut heightfield,
        &vertices,
        &indices,
        &areas,
        config.walkable_climb,
    )?;
    for body in &input.water {
        rasterize_water(settings, agent, body, &mut heightfield, config.walkable_climb)?;
    }

    heightfield.filter_low_hanging_walkable_obstacles(config.walkable_climb);
    heightfield.filter_ledge_spans(config.walkable_height, config.walkable_climb);
    heightfield.filter_walkable_low_height_spans(config.walkable_height);

    let mut chf =
        CompactHeightfield::build(config.walkable_height, config.walkable_climb, &heightfield)?;
    erode_walkable_area(config.walkable_radius, &mut chf);
    build_distance_field(&mut chf);
    build_regions(
        &mut chf,
        config.border_size,
        config.min_region_area,
        config.merge_region_area,
    )?;

    let cset = build_contours(&chf, config.max_simplification_error, config.max_edge_len)?;
    if cset.contours.is_empty() {
        debug!("tile {:?} has no contours", tile);
        return Ok(None);
    }

    let mut poly_mesh = build_poly_mesh(&cset, config.max_verts_per_poly as usize)?;
    for i in 0..poly_mesh.flags.len() {
        poly_mesh.flags[i] = area_flags(AreaType::from_value(poly_mesh.areas[i]));
    }

    let detail_mesh = build_poly_mesh_detail(
        &poly_mesh,
        &chf,
        config.detail_sample_dist,
        config.detail_sample_max_error,
    )?;

    if poly_mesh.poly_count() == 0 {
        return Ok(None);
    }

    Ok(Some(PreparedTileData {
        poly_mesh,
        detail_mesh,
        cell_size: config.cs,
        cell_height: config.ch,
    }))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::areas::poly_flags;

    pub(crate) fn test_settings() -> Settings {
        Settings {
            cell_size: 0.5,
            cell_height: 0.25,
            recast_scale_factor: 1.0,
            border_size: 4,
            tile_size: 16,
            max_climb: 0.5,
            max_edge_len: 6.0,
            region_min_size: 2,
            region_merge_size: 4,
            detail_sample_dist: 0.0,
            detail_sample_max_error: 1.0,
            swim_height_scale: 0.5,
            ..Settings::default()
        }
    }

    pub(crate) fn test_agent() -> AgentHalfExtents {
        AgentHalfExtents {
            radius: 0.25,
            height: 0.5,
        }
    }

    /// Two ground triangles covering the origin tile and its padding,
    /// world coordinates with z up.
    pub(crate) fn ground_tile_mesh() -> InputMesh {
        InputMesh {
            vertices: vec![
                -8.0, -8.0, 0.5, //
                16.0, -8.0, 0.5, //
                16.0, 16.0, 0.5, //
                -8.0, 16.0, 0.5,
            ],
            indices: vec![0, 1, 2, 0, 2, 3],
            area_types: vec![AreaType::Ground, AreaType::Ground],
            water: Vec::new(),
        }
    }

    #[test]
    fn converted_ground_triangles_stay_walkable() {
        let settings = test_settings();
        let (vertices, indices, mut areas) =
            convert_triangles(&settings, &ground_tile_mesh()).unwrap();
        clear_unwalkable_triangles(settings.max_slope, &vertices, &indices, &mut areas);
        assert_eq!(areas, vec![AreaType::Ground.value(); 2]);
    }

    #[test]
    fn flat_ground_produces_walkable_polygons() {
        let data = prepare_tile_data(
            &ground_tile_mesh(),
            &test_agent(),
            &test_settings(),
            TilePosition::new(0, 0),
        )
        .unwrap()
        .unwrap();

        assert!(data.poly_mesh.poly_count() >= 1);
        assert!(data
            .poly_mesh
            .flags
            .iter()
            .any(|&f| f & poly_flags::WALK != 0));
    }

    #[test]
    fn identical_inputs_build_identical_data() {
        let a = prepare_tile_data(
            &ground_tile_mesh(),
            &test_agent(),
            &test_settings(),
            TilePosition::new(0, 0),
        )
        .unwrap()
        .unwrap();
        let b = prepare_tile_data(
            &ground_tile_mesh(),
            &test_agent(),
            &test_settings(),
            TilePosition::new(0, 0),
        )
        .unwrap()
        .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_mesh_yields_no_tile() {
        let result = prepare_tile_data(
            &InputMesh::default(),
            &test_agent(),
            &test_settings(),
            TilePosition::new(0, 0),
        )
        .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn distant_water_contributes_nothing() {
        let mut input = InputMesh::default();
        input.water.push(WaterBody {
            footprint: WaterFootprint::Bounded(2.0),
            shift: Vec3::new(1000.0, 1000.0, 0.0),
        });

        let result = prepare_tile_data(
            &input,
            &test_agent(),
            &test_settings(),
            TilePosition::new(0, 0),
        )
        .unwrap();
        // The water level defines bounds, but no spans are rasterized.
        assert!(result.is_none());
    }

    #[test]
    fn water_polygons_get_the_swim_flag() {
        let mut input = InputMesh::default();
        input.water.push(WaterBody {
            footprint: WaterFootprint::Unbounded,
            shift: Vec3::new(0.0, 0.0, 1.0),
        });

        let data = prepare_tile_data(
            &input,
            &test_agent(),
            &test_settings(),
            TilePosition::new(0, 0),
        )
        .unwrap()
        .unwrap();
        assert!(data
            .poly_mesh
            .flags
            .iter()
            .all(|&f| f == poly_flags::SWIM));
    }

    #[test]
    fn mismatched_area_list_is_rejected() {
        let mut input = ground_tile_mesh();
        input.area_types.pop();
        let result = prepare_tile_data(
            &input,
            &test_agent(),
            &test_settings(),
            TilePosition::new(0, 0),
        );
        assert!(result.is_err());
    }
}
