//! Height detail mesh on top of the polygon mesh.
//!
//! Every polygon gets its own small triangle mesh whose vertices follow the
//! heightfield surface. Edges are sampled and re-simplified against the
//! sample error so long polygon edges track slopes and stairs.

use glam::Vec3;
use log::debug;
use tilenav_common::{dir_offset_x, dir_offset_z, Error, Result, DIR_COUNT};

use crate::compact::CompactHeightfield;
use crate::polymesh::{PolyMesh, MESH_NULL_IDX};

const MAX_VERTS_PER_EDGE: usize = 32;
const MAX_VERTS: usize = 127;

/// Per-polygon detail meshes sharing one vertex and triangle pool
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolyMeshDetail {
    /// Per polygon: vertex base, vertex count, triangle base, triangle count
    pub meshes: Vec<[u32; 4]>,
    /// Vertices in world units
    pub verts: Vec<Vec3>,
    /// Triangles as three vertex indices plus boundary edge flags
    pub tris: Vec<[u8; 4]>,
}

/// Floor height in world units near the given position. Falls back to the
/// neighbor columns when the exact cell holds no walkable span.
fn floor_height(chf: &CompactHeightfield, fx: f32, fz: f32, guess_y: f32) -> f32 {
    let cx = (((fx - chf.bmin.x) / chf.cs) as i32).clamp(0, chf.width - 1);
    let cz = (((fz - chf.bmin.z) / chf.cs) as i32).clamp(0, chf.height - 1);

    let mut best = guess_y;
    let mut best_dist = f32::MAX;
    let probe = |x: i32, z: i32, best: &mut f32, best_dist: &mut f32| {
        if x < 0 || z < 0 || x >= chf.width || z >= chf.height {
            return;
        }
        let cell = *chf.cell(x, z);
        for i in cell.index as usize..(cell.index + cell.count) as usize {
            let y = chf.bmin.y + chf.spans[i].y as f32 * chf.ch;
            let dist = (y - guess_y).abs();
            if dist < *best_dist {
                *best = y;
                *best_dist = dist;
            }
        }
    };

    probe(cx, cz, &mut best, &mut best_dist);
    if best_dist == f32::MAX {
        for dir in 0..DIR_COUNT {
            probe(
                cx + dir_offset_x(dir),
                cz + dir_offset_z(dir),
                &mut best,
                &mut best_dist,
            );
        }
    }
    best
}

/// Samples one polygon edge and keeps the samples that deviate more than
/// the sample error from the straight edge.
fn sample_edge(
    chf: &CompactHeightfield,
    from: Vec3,
    to: Vec3,
    sample_dist: f32,
    sample_max_error: f32,
    out: &mut Vec<Vec3>,
) {
    let dx = to.x - from.x;
    let dz = to.z - from.z;
    let edge_len = (dx * dx + dz * dz).sqrt();
    let mut nn = 1 + (edge_len / sample_dist).floor() as usize;
    nn = nn.min(MAX_VERTS_PER_EDGE - 1);

    let mut samples = Vec::with_capacity(nn + 1);
    for k in 0..=nn {
        let t = k as f32 / nn as f32;
        let mut pos = from.lerp(to, t);
        pos.y = floor_height(chf, pos.x, pos.z, pos.y);
        samples.push(pos);
    }

    // Keep endpoints, insert the worst sample until the edge is within the
    // allowed error.
    let mut kept = vec![0usize, nn];
    let mut k = 0;
    while k < kept.len() - 1 {
        let a = samples[kept[k]];
        let b = samples[kept[k + 1]];

        let mut max_dev = 0.0f32;
        let mut max_index = None;
        for m in kept[k] + 1..kept[k + 1] {
            let dev = (samples[m].y - (a.y + (b.y - a.y) * ((m - kept[k]) as f32 / (kept[k + 1] - kept[k]) as f32))).abs();
            if dev > max_dev {
                max_dev = dev;
                max_index = Some(m);
            }
        }

        match max_index {
            Some(index) if max_dev > sample_max_error => kept.insert(k + 1, index),
            _ => k += 1,
        }
    }

    // Interior points only, the endpoints are the polygon vertices.
    for &index in &kept[1..kept.len() - 1] {
        out.push(samples[index]);
    }
}

/// Builds the detail mesh of one polygon: the polygon hull plus edge
/// samples, fan-triangulated. The hull stays convex, so the fan is valid.
fn build_poly_detail(
    chf: &CompactHeightfield,
    poly_verts: &[Vec3],
    sample_dist: f32,
    sample_max_error: f32,
    verts: &mut Vec<Vec3>,
    tris: &mut Vec<[u8; 4]>,
) {
    verts.clear();
    tris.clear();

    for (j, &vj) in poly_verts.iter().enumerate() {
        verts.push(vj);
        if sample_dist > 0.0 {
            let vi = poly_verts[(j + 1) % poly_verts.len()];
            let mut edge_points = Vec::new();
            sample_edge(chf, vj, vi, sample_dist, sample_max_error, &mut edge_points);
            for p in edge_points {
                if verts.len() >= MAX_VERTS {
                    break;
                }
                verts.push(p);
            }
        }
    }

    let n = verts.len();
    for i in 1..n - 1 {
        // An edge lies on the polygon boundary when its vertices are
        // consecutive on the hull ring.
        let mut flags = 0u8;
        if i == 1 {
            flags |= 1;
        }
        flags |= 1 << 2;
        if i + 2 == n {
            flags |= 1 << 4;
        }
        tris.push([0, i as u8, (i + 1) as u8, flags]);
    }
}

/// Builds the detail mesh for every polygon of the mesh. A sample distance
/// of zero keeps the polygon vertices as the only detail vertices.
pub fn build_poly_mesh_detail(
    mesh: &PolyMesh,
    chf: &CompactHeightfield,
    sample_dist: f32,
    sample_max_error: f32,
) -> Result<PolyMeshDetail> {
    let mut dmesh = PolyMeshDetail::default();
    if mesh.poly_count() == 0 {
        return Ok(dmesh);
    }
    if sample_dist < 0.0 {
        return Err(Error::BuildFailure("negative sample distance".to_string()));
    }

    let mut poly_verts: Vec<Vec3> = Vec::new();
    let mut verts: Vec<Vec3> = Vec::new();
    let mut tris: Vec<[u8; 4]> = Vec::new();

    for i in 0..mesh.poly_count() {
        let poly = mesh.poly(i);

        poly_verts.clear();
        for &index in poly[..mesh.nvp].iter().take_while(|&&v| v != MESH_NULL_IDX) {
            let v = mesh.verts[index as usize];
            let x = mesh.bmin.x + v[0] as f32 * mesh.cs;
            let z = mesh.bmin.z + v[2] as f32 * mesh.cs;
            let guess = chf.bmin.y + v[1] as f32 * mesh.ch;
            // Heights come from the heightfield, not the welded vertex.
            let y = floor_height(chf, x, z, guess);
            poly_verts.push(Vec3::new(x, y, z));
        }
        if poly_verts.len() < 3 {
            return Err(Error::BuildFailure(format!("degenerate polygon {i}")));
        }

        build_poly_detail(
            chf,
            &poly_verts,
            sample_dist,
            sample_max_error,
            &mut verts,
            &mut tris,
        );

        dmesh.meshes.push([
            dmesh.verts.len() as u32,
            verts.len() as u32,
            dmesh.tris.len() as u32,
            tris.len() as u32,
        ]);
        dmesh.verts.extend_from_slice(&verts);
        dmesh.tris.extend_from_slice(&tris);
    }

    debug!(
        "built detail mesh: {} vertices, {} triangles",
        dmesh.verts.len(),
        dmesh.tris.len()
    );
    Ok(dmesh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compact::CompactHeightfield;
    use crate::contour::build_contours;
    use crate::distance::build_distance_field;
    use crate::heightfield::Heightfield;
    use crate::polymesh::build_poly_mesh;
    use crate::region::build_regions;

    fn pipeline(size: i32, sample_dist: f32) -> (PolyMesh, PolyMeshDetail) {
        let mut hf = Heightfield::new(
            size,
            size,
            Vec3::ZERO,
            Vec3::new(size as f32, 4.0, size as f32),
            1.0,
            0.5,
        )
        .unwrap();
        for z in 0..size {
            for x in 0..size {
                hf.add_span(x, z, 0, 2, 1, 1);
            }
        }
        let mut chf = CompactHeightfield::build(2, 1, &hf).unwrap();
        build_distance_field(&mut chf);
        build_regions(&mut chf, 0, 2, 10).unwrap();
        let cset = build_contours(&chf, 1.3, 12).unwrap();
        let mesh = build_poly_mesh(&cset, 6).unwrap();
        let dmesh = build_poly_mesh_detail(&mesh, &chf, sample_dist, 0.5).unwrap();
        (mesh, dmesh)
    }

    #[test]
    fn zero_sample_dist_keeps_polygon_vertices() {
        let (mesh, dmesh) = pipeline(8, 0.0);
        assert_eq!(dmesh.meshes.len(), mesh.poly_count());

        let [vbase, vcount, _, tcount] = dmesh.meshes[0];
        assert_eq!(vbase, 0);
        assert_eq!(vcount, 4);
        assert_eq!(tcount, 2);
    }

    #[test]
    fn detail_heights_follow_the_floor() {
        let (_, dmesh) = pipeline(8, 2.0);
        for v in &dmesh.verts {
            // The floor sits at two half-unit voxels.
            assert!((v.y - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn triangle_indices_stay_local() {
        let (_, dmesh) = pipeline(8, 1.0);
        for (mesh_index, m) in dmesh.meshes.iter().enumerate() {
            let [_, vcount, tbase, tcount] = *m;
            for t in &dmesh.tris[tbase as usize..(tbase + tcount) as usize] {
                for &idx in &t[..3] {
                    assert!((idx as u32) < vcount, "mesh {mesh_index}");
                }
            }
        }
    }
}
