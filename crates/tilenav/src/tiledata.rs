//! Serialization of a built tile into the binary blob stored in the
//! navmesh.
//!
//! The blob is an in-memory contract, not a file format: a little-endian
//! header followed by the vertex, polygon, detail and off-mesh connection
//! arrays and a flat bounding-volume tree over the polygons.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use glam::Vec3;
use tilenav_common::{Error, Result};
use tilenav_gen::MESH_NULL_IDX;

use crate::areas::{area_flags, AreaType};
use crate::build::PreparedTileData;
use crate::input::AgentHalfExtents;
use crate::settings::Settings;
use crate::tile::{to_navmesh_coordinates, TilePosition};

const TILE_MAGIC: u32 = u32::from_le_bytes(*b"TNAV");
const TILE_VERSION: u32 = 1;

/// A non-contiguous traversable link baked into the tile, supplied fresh
/// on every update and never cached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffMeshConnection {
    /// Start point in world coordinates (z up)
    pub start: Vec3,
    /// End point in world coordinates (z up)
    pub end: Vec3,
    /// Classification determining the connection's flags
    pub area_type: AreaType,
    /// Whether the link can be traversed back
    pub bidirectional: bool,
}

/// Final binary tile blob, owning its buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedTile {
    pub data: Vec<u8>,
}

/// Deserialized tile header, used for inspection and sanity checks
#[derive(Debug, Clone, PartialEq)]
pub struct TileHeader {
    pub x: i32,
    pub y: i32,
    pub poly_count: u32,
    pub vert_count: u32,
    pub detail_mesh_count: u32,
    pub detail_vert_count: u32,
    pub detail_tri_count: u32,
    pub off_mesh_count: u32,
    pub bv_node_count: u32,
    pub nvp: u32,
    pub walkable_height: f32,
    pub walkable_radius: f32,
    pub walkable_climb: f32,
    pub cell_size: f32,
    pub cell_height: f32,
    pub bmin: Vec3,
    pub bmax: Vec3,
    pub bv_quant_factor: f32,
}

impl TileHeader {
    /// Reads the header back from a serialized tile
    pub fn read(data: &[u8]) -> Result<Self> {
        let mut r = Cursor::new(data);
        let read_err = |_| Error::BuildFailure("truncated tile data".to_string());

        let magic = r.read_u32::<LittleEndian>().map_err(read_err)?;
        if magic != TILE_MAGIC {
            return Err(Error::BuildFailure(format!("bad tile magic {magic:#x}")));
        }
        let version = r.read_u32::<LittleEndian>().map_err(read_err)?;
        if version != TILE_VERSION {
            return Err(Error::BuildFailure(format!("bad tile version {version}")));
        }

        let read_f32 = |r: &mut Cursor<&[u8]>| r.read_f32::<LittleEndian>().map_err(read_err);

        Ok(Self {
            x: r.read_i32::<LittleEndian>().map_err(read_err)?,
            y: r.read_i32::<LittleEndian>().map_err(read_err)?,
            poly_count: r.read_u32::<LittleEndian>().map_err(read_err)?,
            vert_count: r.read_u32::<LittleEndian>().map_err(read_err)?,
            detail_mesh_count: r.read_u32::<LittleEndian>().map_err(read_err)?,
            detail_vert_count: r.read_u32::<LittleEndian>().map_err(read_err)?,
            detail_tri_count: r.read_u32::<LittleEndian>().map_err(read_err)?,
            off_mesh_count: r.read_u32::<LittleEndian>().map_err(read_err)?,
            bv_node_count: r.read_u32::<LittleEndian>().map_err(read_err)?,
            nvp: r.read_u32::<LittleEndian>().map_err(read_err)?,
            walkable_height: read_f32(&mut r)?,
            walkable_radius: read_f32(&mut r)?,
            walkable_climb: read_f32(&mut r)?,
            cell_size: read_f32(&mut r)?,
            cell_height: read_f32(&mut r)?,
            bmin: Vec3::new(read_f32(&mut r)?, read_f32(&mut r)?, read_f32(&mut r)?),
            bmax: Vec3::new(read_f32(&mut r)?, read_f32(&mut r)?, read_f32(&mut r)?),
            bv_quant_factor: read_f32(&mut r)?,
        })
    }
}

fn write_vec3(out: &mut Vec<u8>, v: Vec3) {
    // Writes into a Vec cannot fail.
    let _ = out.write_f32::<LittleEndian>(v.x);
    let _ = out.write_f32::<LittleEndian>(v.y);
    let _ = out.write_f32::<LittleEndian>(v.z);
}

/// Quantizes a world-space coordinate into bounding-volume grid units
fn quantize(value: f32, min: f32, factor: f32, round_up: bool) -> u16 {
    let scaled = (value - min) * factor;
    let scaled = if round_up { scaled.ceil() } else { scaled.floor() };
    scaled.clamp(0.0, u16::MAX as f32) as u16
}

/// Bakes the prepared geometry, agent parameters and the current off-mesh
/// connections into the final tile blob.
pub fn make_nav_mesh_tile_data(
    prepared: &PreparedTileData,
    tile: TilePosition,
    agent: &AgentHalfExtents,
    settings: &Settings,
    off_mesh_connections: &[OffMeshConnection],
) -> Result<SerializedTile> {
    let mesh = &prepared.poly_mesh;
    let detail = &prepared.detail_mesh;
    let nvp = mesh.nvp;

    if mesh.poly_count() == 0 {
        return Err(Error::BuildFailure("no polygons to serialize".to_string()));
    }
    if detail.meshes.len() != mesh.poly_count() {
        return Err(Error::BuildFailure(format!(
            "detail mesh count {} does not match polygon count {}",
            detail.meshes.len(),
            mesh.poly_count()
        )));
    }

    let cs = prepared.cell_size;
    let ch = prepared.cell_height;
    let scale = settings.recast_scale_factor;
    let walkable_radius = (agent.radius * scale / cs).ceil() * cs;
    let walkable_height = (2.0 * agent.height * scale / ch).ceil() * ch;
    let walkable_climb = (settings.max_climb * scale / ch).floor() * ch;
    let bv_quant_factor = 1.0 / cs;

    // World-space polygon vertices.
    let verts: Vec<Vec3> = mesh
        .verts
        .iter()
        .map(|v| {
            Vec3::new(
                mesh.bmin.x + v[0] as f32 * cs,
                mesh.bmin.y + v[1] as f32 * ch,
                mesh.bmin.z + v[2] as f32 * cs,
            )
        })
        .collect();

    let mut out = Vec::with_capacity(1024);
    let _ = out.write_u32::<LittleEndian>(TILE_MAGIC);
    let _ = out.write_u32::<LittleEndian>(TILE_VERSION);
    let _ = out.write_i32::<LittleEndian>(tile.x);
    let _ = out.write_i32::<LittleEndian>(tile.y);
    let _ = out.write_u32::<LittleEndian>(mesh.poly_count() as u32);
    let _ = out.write_u32::<LittleEndian>(verts.len() as u32);
    let _ = out.write_u32::<LittleEndian>(detail.meshes.len() as u32);
    let _ = out.write_u32::<LittleEndian>(detail.verts.len() as u32);
    let _ = out.write_u32::<LittleEndian>(detail.tris.len() as u32);
    let _ = out.write_u32::<LittleEndian>(off_mesh_connections.len() as u32);
    let _ = out.write_u32::<LittleEndian>(mesh.poly_count() as u32);
    let _ = out.write_u32::<LittleEndian>(nvp as u32);
    let _ = out.write_f32::<LittleEndian>(walkable_height);
    let _ = out.write_f32::<LittleEndian>(walkable_radius);
    let _ = out.write_f32::<LittleEndian>(walkable_climb);
    let _ = out.write_f32::<LittleEndian>(cs);
    let _ = out.write_f32::<LittleEndian>(ch);
    write_vec3(&mut out, mesh.bmin);
    write_vec3(&mut out, mesh.bmax);
    let _ = out.write_f32::<LittleEndian>(bv_quant_factor);

    for v in &verts {
        write_vec3(&mut out, *v);
    }

    for i in 0..mesh.poly_count() {
        let poly = mesh.poly(i);
        for &value in &poly[..nvp * 2] {
            let _ = out.write_u16::<LittleEndian>(value);
        }
        let _ = out.write_u16::<LittleEndian>(mesh.flags[i]);
        out.push(mesh.areas[i]);
        out.push(
            poly[..nvp]
                .iter()
                .take_while(|&&v| v != MESH_NULL_IDX)
                .count() as u8,
        );
    }

    for m in &detail.meshes {
        for &value in m {
            let _ = out.write_u32::<LittleEndian>(value);
        }
    }
    for v in &detail.verts {
        write_vec3(&mut out, *v);
    }
    for t in &detail.tris {
        out.extend_from_slice(t);
    }

    // Flat bounding-volume tree: one leaf per polygon, quantized to the
    // voxel grid.
    for i in 0..mesh.poly_count() {
        let poly = mesh.poly(i);
        let mut bmin = Vec3::splat(f32::MAX);
        let mut bmax = Vec3::splat(f32::MIN);
        for &index in poly[..nvp].iter().take_while(|&&v| v != MESH_NULL_IDX) {
            let v = verts[index as usize];
            bmin = bmin.min(v);
            bmax = bmax.max(v);
        }
        for (value, min) in [
            (bmin.x, mesh.bmin.x),
            (bmin.y, mesh.bmin.y),
            (bmin.z, mesh.bmin.z),
        ] {
            let _ = out.write_u16::<LittleEndian>(quantize(value, min, bv_quant_factor, false));
        }
        for (value, min) in [
            (bmax.x, mesh.bmin.x),
            (bmax.y, mesh.bmin.y),
            (bmax.z, mesh.bmin.z),
        ] {
            let _ = out.write_u16::<LittleEndian>(quantize(value, min, bv_quant_factor, true));
        }
        let _ = out.write_u32::<LittleEndian>(i as u32);
    }

    for connection in off_mesh_connections {
        write_vec3(&mut out, to_navmesh_coordinates(settings, connection.start));
        write_vec3(&mut out, to_navmesh_coordinates(settings, connection.end));
        let _ = out.write_f32::<LittleEndian>(walkable_radius);
        let _ = out.write_u16::<LittleEndian>(area_flags(connection.area_type));
        out.push(connection.area_type.value());
        out.push(connection.bidirectional as u8);
    }

    Ok(SerializedTile { data: out })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::tests::{ground_tile_mesh, test_agent, test_settings};
    use crate::build::prepare_tile_data;

    fn prepared() -> PreparedTileData {
        prepare_tile_data(
            &ground_tile_mesh(),
            &test_agent(),
            &test_settings(),
            TilePosition::new(0, 0),
        )
        .unwrap()
        .unwrap()
    }

    #[test]
    fn header_round_trips() {
        let tile = make_nav_mesh_tile_data(
            &prepared(),
            TilePosition::new(2, -3),
            &test_agent(),
            &test_settings(),
            &[],
        )
        .unwrap();

        let header = TileHeader::read(&tile.data).unwrap();
        assert_eq!(header.x, 2);
        assert_eq!(header.y, -3);
        assert_eq!(header.poly_count, prepared().poly_mesh.poly_count() as u32);
        assert_eq!(header.bv_node_count, header.poly_count);
        assert_eq!(header.off_mesh_count, 0);
        assert!((header.cell_size - 0.5).abs() < 1e-6);
    }

    #[test]
    fn off_mesh_connections_change_the_blob() {
        let data = prepared();
        let plain = make_nav_mesh_tile_data(
            &data,
            TilePosition::new(0, 0),
            &test_agent(),
            &test_settings(),
            &[],
        )
        .unwrap();
        let connection = OffMeshConnection {
            start: Vec3::new(1.0, 1.0, 0.5),
            end: Vec3::new(2.0, 2.0, 0.5),
            area_type: AreaType::Door,
            bidirectional: false,
        };
        let with_door = make_nav_mesh_tile_data(
            &data,
            TilePosition::new(0, 0),
            &test_agent(),
            &test_settings(),
            &[connection],
        )
        .unwrap();

        assert_ne!(plain, with_door);
        let header = TileHeader::read(&with_door.data).unwrap();
        assert_eq!(header.off_mesh_count, 1);
    }

    #[test]
    fn garbage_data_is_rejected() {
        assert!(TileHeader::read(&[0u8; 16]).is_err());
        assert!(TileHeader::read(b"TNAV").is_err());
    }
}
