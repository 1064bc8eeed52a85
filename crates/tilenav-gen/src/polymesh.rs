//! Convex polygon mesh built from the simplified contours.
//!
//! Contours are ear-clipped into triangles, the triangles are merged into
//! convex polygons of up to `nvp` vertices, vertices are welded and the
//! polygon adjacency plus tile-border portal edges are computed.

use glam::Vec3;
use log::{debug, warn};
use tilenav_common::{Error, Result};

use crate::contour::ContourSet;

/// Null index in polygon vertex and neighbor lists
pub const MESH_NULL_IDX: u16 = 0xffff;

/// Bit marking a polygon edge as a portal to a neighbor tile
const EXTERNAL_EDGE: u16 = 0x8000;

const VERTEX_BUCKET_COUNT: usize = 1 << 12;

/// Convex polygon mesh of one tile
#[derive(Debug, Clone, PartialEq)]
pub struct PolyMesh {
    /// Welded vertices in voxel units
    pub verts: Vec<[u16; 3]>,
    /// Polygon data, `2 * nvp` entries per polygon: `nvp` vertex indices
    /// followed by `nvp` edge neighbors
    pub polys: Vec<u16>,
    /// Region id per polygon
    pub regs: Vec<u16>,
    /// User flags per polygon
    pub flags: Vec<u16>,
    /// Area id per polygon
    pub areas: Vec<u8>,
    /// Maximum vertices per polygon
    pub nvp: usize,
    /// Minimum bounds of the tile
    pub bmin: Vec3,
    /// Maximum bounds of the tile
    pub bmax: Vec3,
    /// Horizontal resolution
    pub cs: f32,
    /// Vertical resolution
    pub ch: f32,
    /// Border padding the source contours were built with
    pub border_size: i32,
}

impl PolyMesh {
    /// Number of polygons
    #[inline]
    pub fn poly_count(&self) -> usize {
        self.polys.len() / (self.nvp * 2)
    }

    /// Vertex indices and neighbors of one polygon
    #[inline]
    pub fn poly(&self, i: usize) -> &[u16] {
        &self.polys[i * self.nvp * 2..(i + 1) * self.nvp * 2]
    }

    fn poly_vertex_count(&self, i: usize) -> usize {
        count_poly_verts(self.poly(i), self.nvp)
    }
}

fn count_poly_verts(poly: &[u16], nvp: usize) -> usize {
    poly[..nvp]
        .iter()
        .take_while(|&&v| v != MESH_NULL_IDX)
        .count()
}

// Signed area helpers on integer xz coordinates.

fn area2(a: &[i32; 4], b: &[i32; 4], c: &[i32; 4]) -> i64 {
    (b[0] - a[0]) as i64 * (c[2] - a[2]) as i64 - (c[0] - a[0]) as i64 * (b[2] - a[2]) as i64
}

fn left(a: &[i32; 4], b: &[i32; 4], c: &[i32; 4]) -> bool {
    area2(a, b, c) < 0
}

fn left_on(a: &[i32; 4], b: &[i32; 4], c: &[i32; 4]) -> bool {
    area2(a, b, c) <= 0
}

fn collinear(a: &[i32; 4], b: &[i32; 4], c: &[i32; 4]) -> bool {
    area2(a, b, c) == 0
}

/// Proper intersection of segments ab and cd, excluding endpoints
fn intersect_prop(a: &[i32; 4], b: &[i32; 4], c: &[i32; 4], d: &[i32; 4]) -> bool {
    if collinear(a, b, c) || collinear(a, b, d) || collinear(c, d, a) || collinear(c, d, b) {
        return false;
    }
    (left(a, b, c) ^ left(a, b, d)) && (left(c, d, a) ^ left(c, d, b))
}

fn between(a: &[i32; 4], b: &[i32; 4], c: &[i32; 4]) -> bool {
    if !collinear(a, b, c) {
        return false;
    }
    if a[0] != b[0] {
        (a[0] <= c[0] && c[0] <= b[0]) || (a[0] >= c[0] && c[0] >= b[0])
    } else {
        (a[2] <= c[2] && c[2] <= b[2]) || (a[2] >= c[2] && c[2] >= b[2])
    }
}

fn intersect(a: &[i32; 4], b: &[i32; 4], c: &[i32; 4], d: &[i32; 4]) -> bool {
    intersect_prop(a, b, c, d)
        || between(a, b, c)
        || between(a, b, d)
        || between(c, d, a)
        || between(c, d, b)
}

fn vequal(a: &[i32; 4], b: &[i32; 4]) -> bool {
    a[0] == b[0] && a[2] == b[2]
}

fn next(i: usize, n: usize) -> usize {
    (i + 1) % n
}

fn prev(i: usize, n: usize) -> usize {
    (i + n - 1) % n
}

const REMOVABLE: i32 = i32::MIN;

fn vert<'a>(verts: &'a [[i32; 4]], indices: &[i32], i: usize) -> &'a [i32; 4] {
    &verts[(indices[i] & !REMOVABLE) as usize]
}

/// True when the diagonal (i, j) lies inside the polygon and does not cross
/// any edge.
fn diagonalie(i: usize, j: usize, n: usize, verts: &[[i32; 4]], indices: &[i32]) -> bool {
    let d0 = vert(verts, indices, i);
    let d1 = vert(verts, indices, j);

    for k in 0..n {
        let k1 = next(k, n);
        if k == i || k1 == i || k == j || k1 == j {
            continue;
        }
        let p0 = vert(verts, indices, k);
        let p1 = vert(verts, indices, k1);
        if vequal(d0, p0) || vequal(d1, p0) || vequal(d0, p1) || vequal(d1, p1) {
            continue;
        }
        if intersect(d0, d1, p0, p1) {
            return false;
        }
    }
    true
}

fn in_cone(i: usize, j: usize, n: usize, verts: &[[i32; 4]], indices: &[i32]) -> bool {
    let p = vert(verts, indices, i);
    let pj = vert(verts, indices, j);
    let p_next = vert(verts, indices, next(i, n));
    let p_prev = vert(verts, indices, prev(i, n));

    if left_on(p_prev, p, p_next) {
        left(p, pj, p_prev) && left(pj, p, p_next)
    } else {
        !(left_on(p, pj, p_next) && left_on(pj, p, p_prev))
    }
}

fn diagonal(i: usize, j: usize, n: usize, verts: &[[i32; 4]], indices: &[i32]) -> bool {
    in_cone(i, j, n, verts, indices) && diagonalie(i, j, n, verts, indices)
}

/// Looser variants that allow the diagonal to touch the outline, used when
/// strict ear clipping gets stuck on degenerate contours.
fn diagonalie_loose(i: usize, j: usize, n: usize, verts: &[[i32; 4]], indices: &[i32]) -> bool {
    let d0 = vert(verts, indices, i);
    let d1 = vert(verts, indices, j);

    for k in 0..n {
        let k1 = next(k, n);
        if k == i || k1 == i || k == j || k1 == j {
            continue;
        }
        let p0 = vert(verts, indices, k);
        let p1 = vert(verts, indices, k1);
        if vequal(d0, p0) || vequal(d1, p0) || vequal(d0, p1) || vequal(d1, p1) {
            continue;
        }
        if intersect_prop(d0, d1, p0, p1) {
            return false;
        }
    }
    true
}

fn in_cone_loose(i: usize, j: usize, n: usize, verts: &[[i32; 4]], indices: &[i32]) -> bool {
    let p = vert(verts, indices, i);
    let pj = vert(verts, indices, j);
    let p_next = vert(verts, indices, next(i, n));
    let p_prev = vert(verts, indices, prev(i, n));

    if left_on(p_prev, p, p_next) {
        left_on(p, pj, p_prev) && left_on(pj, p, p_next)
    } else {
        !(left_on(p, pj, p_next) && left_on(pj, p, p_prev))
    }
}

fn diagonal_loose(i: usize, j: usize, n: usize, verts: &[[i32; 4]], indices: &[i32]) -> bool {
    in_cone_loose(i, j, n, verts, indices) && diagonalie_loose(i, j, n, verts, indices)
}

/// Ear-clips a contour into triangles. Returns false when the contour had
/// to fall back to loose clipping and may contain overlaps.
fn triangulate(verts: &[[i32; 4]], indices: &mut Vec<i32>, tris: &mut Vec<[u16; 3]>) -> bool {
    let mut clean = true;
    let mut n = indices.len();

    for i in 0..n {
        let i1 = next(i, n);
        let i2 = next(i1, n);
        if diagonal(i, i2, n, verts, indices) {
            indices[i1] |= REMOVABLE;
        }
    }

    while n > 3 {
        let mut min_len = i64::MAX;
        let mut min_index = None;
        for i in 0..n {
            let i1 = next(i, n);
            if indices[i1] & REMOVABLE == 0 {
                continue;
            }
            let p0 = vert(verts, indices, i);
            let p2 = vert(verts, indices, next(i1, n));
            let dx = (p2[0] - p0[0]) as i64;
            let dz = (p2[2] - p0[2]) as i64;
            let len = dx * dx + dz * dz;
            if len < min_len {
                min_len = len;
                min_index = Some(i);
            }
        }

        if min_index.is_none() {
            // The contour is degenerate, retry with loose tests.
            clean = false;
            for i in 0..n {
                let i1 = next(i, n);
                let i2 = next(i1, n);
                if diagonal_loose(i, i2, n, verts, indices) {
                    let p0 = vert(verts, indices, i);
                    let p2 = vert(verts, indices, i2);
                    let dx = (p2[0] - p0[0]) as i64;
                    let dz = (p2[2] - p0[2]) as i64;
                    let len = dx * dx + dz * dz;
                    if len < min_len {
                        min_len = len;
                        min_index = Some(i);
                    }
                }
            }
            if min_index.is_none() {
                return false;
            }
        }

        let i = min_index.unwrap_or(0);
        let i1 = next(i, n);
        let i2 = next(i1, n);

        tris.push([
            (indices[i] & !REMOVABLE) as u16,
            (indices[i1] & !REMOVABLE) as u16,
            (indices[i2] & !REMOVABLE) as u16,
        ]);

        indices.remove(i1);
        n -= 1;
        let i1 = if i1 >= n { 0 } else { i1 };
        let i = prev(i1, n);

        if diagonal(prev(i, n), i1, n, verts, indices) {
            indices[i] |= REMOVABLE;
        } else {
            indices[i] &= !REMOVABLE;
        }
        if diagonal(i, next(i1, n), n, verts, indices) {
            indices[i1] |= REMOVABLE;
        } else {
            indices[i1] &= !REMOVABLE;
        }
    }

    tris.push([
        (indices[0] & !REMOVABLE) as u16,
        (indices[1] & !REMOVABLE) as u16,
        (indices[2] & !REMOVABLE) as u16,
    ]);
    clean
}

fn vertex_hash(x: u16, y: u16, z: u16) -> usize {
    let h = (x as u32)
        .wrapping_mul(0x8da6_b343)
        .wrapping_add((y as u32).wrapping_mul(0xd816_3841))
        .wrapping_add((z as u32).wrapping_mul(0xcb1a_b31f));
    h as usize & (VERTEX_BUCKET_COUNT - 1)
}

/// Welds a vertex into the mesh vertex pool. Vertices match when x and z
/// are equal and y differs by at most two voxels.
fn add_vertex(
    x: u16,
    y: u16,
    z: u16,
    verts: &mut Vec<[u16; 3]>,
    first_vert: &mut [i32],
    next_vert: &mut Vec<i32>,
) -> u16 {
    let bucket = vertex_hash(x, 0, z);
    let mut i = first_vert[bucket];
    while i != -1 {
        let v = verts[i as usize];
        if v[0] == x && v[2] == z && (v[1] as i32 - y as i32).abs() <= 2 {
            return i as u16;
        }
        i = next_vert[i as usize];
    }

    let index = verts.len();
    verts.push([x, y, z]);
    next_vert.push(first_vert[bucket]);
    first_vert[bucket] = index as i32;
    index as u16
}

fn uleft(a: &[u16; 3], b: &[u16; 3], c: &[u16; 3]) -> bool {
    (b[0] as i32 - a[0] as i32) * (c[2] as i32 - a[2] as i32)
        - (c[0] as i32 - a[0] as i32) * (b[2] as i32 - a[2] as i32)
        < 0
}

/// Length of the edge shared by two polygons, or None when they cannot be
/// merged into one convex polygon of at most `nvp` vertices.
fn poly_merge_value(
    pa: &[u16],
    pb: &[u16],
    verts: &[[u16; 3]],
    nvp: usize,
) -> Option<(i64, usize, usize)> {
    let na = count_poly_verts(pa, nvp);
    let nb = count_poly_verts(pb, nvp);
    if na + nb - 2 > nvp {
        return None;
    }

    let mut shared = None;
    for i in 0..na {
        let mut va0 = pa[i];
        let mut va1 = pa[next(i, na)];
        if va0 > va1 {
            std::mem::swap(&mut va0, &mut va1);
        }
        for j in 0..nb {
            let mut vb0 = pb[j];
            let mut vb1 = pb[next(j, nb)];
            if vb0 > vb1 {
                std::mem::swap(&mut vb0, &mut vb1);
            }
            if va0 == vb0 && va1 == vb1 {
                shared = Some((i, j));
            }
        }
    }
    let (ea, eb) = shared?;

    // The merged polygon must stay convex at both junctions.
    let va = &verts[pa[prev(ea, na)] as usize];
    let vb = &verts[pa[ea] as usize];
    let vc = &verts[pb[(eb + 2) % nb] as usize];
    if !uleft(va, vb, vc) {
        return None;
    }
    let va = &verts[pb[prev(eb, nb)] as usize];
    let vb = &verts[pb[eb] as usize];
    let vc = &verts[pa[(ea + 2) % na] as usize];
    if !uleft(va, vb, vc) {
        return None;
    }

    let va = &verts[pa[ea] as usize];
    let vb = &verts[pa[next(ea, na)] as usize];
    let dx = vb[0] as i64 - va[0] as i64;
    let dz = vb[2] as i64 - va[2] as i64;
    Some((dx * dx + dz * dz, ea, eb))
}

fn merge_polys(pa: &mut [u16], pb: &[u16], ea: usize, eb: usize, nvp: usize) {
    let na = count_poly_verts(pa, nvp);
    let nb = count_poly_verts(pb, nvp);

    let mut merged = vec![MESH_NULL_IDX; nvp];
    let mut n = 0;
    for i in 0..na - 1 {
        merged[n] = pa[(ea + 1 + i) % na];
        n += 1;
    }
    for i in 0..nb - 1 {
        merged[n] = pb[(eb + 1 + i) % nb];
        n += 1;
    }
    pa[..nvp].copy_from_slice(&merged);
}

/// Computes the shared-edge adjacency of all polygons in place.
fn build_mesh_adjacency(polys: &mut [u16], nverts: usize, nvp: usize) {
    struct Edge {
        vert: [u16; 2],
        poly: [u16; 2],
        poly_edge: [u16; 2],
    }

    let npolys = polys.len() / (nvp * 2);
    let mut first_edge = vec![-1i32; nverts];
    let mut next_edge: Vec<i32> = Vec::new();
    let mut edges: Vec<Edge> = Vec::new();

    for i in 0..npolys {
        let poly = &polys[i * nvp * 2..];
        for j in 0..nvp {
            if poly[j] == MESH_NULL_IDX {
                break;
            }
            let v0 = poly[j];
            let v1 = if j + 1 >= nvp || poly[j + 1] == MESH_NULL_IDX {
                poly[0]
            } else {
                poly[j + 1]
            };
            if v0 < v1 {
                next_edge.push(first_edge[v0 as usize]);
                first_edge[v0 as usize] = edges.len() as i32;
                edges.push(Edge {
                    vert: [v0, v1],
                    poly: [i as u16, i as u16],
                    poly_edge: [j as u16, 0],
                });
            }
        }
    }

    for i in 0..npolys {
        let poly = &polys[i * nvp * 2..];
        for j in 0..nvp {
            if poly[j] == MESH_NULL_IDX {
                break;
            }
            let v0 = poly[j];
            let v1 = if j + 1 >= nvp || poly[j + 1] == MESH_NULL_IDX {
                poly[0]
            } else {
                poly[j + 1]
            };
            if v0 > v1 {
                let mut e = first_edge[v1 as usize];
                while e != -1 {
                    let edge = &mut edges[e as usize];
                    if edge.vert[1] == v0 && edge.poly[0] == edge.poly[1] {
                        edge.poly[1] = i as u16;
                        edge.poly_edge[1] = j as u16;
                        break;
                    }
                    e = next_edge[e as usize];
                }
            }
        }
    }

    for edge in &edges {
        if edge.poly[0] != edge.poly[1] {
            let p0 = edge.poly[0] as usize;
            let p1 = edge.poly[1] as usize;
            polys[p0 * nvp * 2 + nvp + edge.poly_edge[0] as usize] = edge.poly[1];
            polys[p1 * nvp * 2 + nvp + edge.poly_edge[1] as usize] = edge.poly[0];
        }
    }
}

/// Builds the convex polygon mesh from a contour set. `nvp` is the maximum
/// number of vertices per polygon.
pub fn build_poly_mesh(cset: &ContourSet, nvp: usize) -> Result<PolyMesh> {
    let mut mesh = PolyMesh {
        verts: Vec::new(),
        polys: Vec::new(),
        regs: Vec::new(),
        flags: Vec::new(),
        areas: Vec::new(),
        nvp,
        bmin: cset.bmin,
        bmax: cset.bmax,
        cs: cset.cs,
        ch: cset.ch,
        border_size: cset.border_size,
    };

    let mut first_vert = vec![-1i32; VERTEX_BUCKET_COUNT];
    let mut next_vert: Vec<i32> = Vec::new();

    let mut indices: Vec<i32> = Vec::new();
    let mut tris: Vec<[u16; 3]> = Vec::new();
    let mut polys: Vec<u16> = Vec::new();

    for contour in &cset.contours {
        if contour.verts.len() < 3 {
            continue;
        }

        indices.clear();
        indices.extend(0..contour.verts.len() as i32);
        tris.clear();
        if !triangulate(&contour.verts, &mut indices, &mut tris) {
            // Keep what could be clipped, drop nothing else.
            warn!("bad triangulation in region {}", contour.reg);
        }
        if tris.is_empty() {
            continue;
        }

        // Weld the contour vertices into the mesh pool.
        let mut vert_indices = Vec::with_capacity(contour.verts.len());
        for v in &contour.verts {
            vert_indices.push(add_vertex(
                v[0] as u16,
                v[1] as u16,
                v[2] as u16,
                &mut mesh.verts,
                &mut first_vert,
                &mut next_vert,
            ));
        }

        polys.clear();
        for tri in &tris {
            let a = vert_indices[tri[0] as usize];
            let b = vert_indices[tri[1] as usize];
            let c = vert_indices[tri[2] as usize];
            if a != b && a != c && b != c {
                let mut poly = vec![MESH_NULL_IDX; nvp];
                poly[0] = a;
                poly[1] = b;
                poly[2] = c;
                polys.extend_from_slice(&poly);
            }
        }
        if polys.is_empty() {
            continue;
        }

        // Merge triangles into larger convex polygons, longest shared edge
        // first.
        if nvp > 3 {
            loop {
                let npolys = polys.len() / nvp;
                let mut best = 0;
                let mut best_pair = None;
                for i in 0..npolys - 1 {
                    for j in i + 1..npolys {
                        let pa = &polys[i * nvp..(i + 1) * nvp];
                        let pb = &polys[j * nvp..(j + 1) * nvp];
                        if let Some((value, ea, eb)) = poly_merge_value(pa, pb, &mesh.verts, nvp)
                        {
                            if value > best {
                                best = value;
                                best_pair = Some((i, j, ea, eb));
                            }
                        }
                    }
                }
                let Some((i, j, ea, eb)) = best_pair else {
                    break;
                };

                let pb = polys[j * nvp..(j + 1) * nvp].to_vec();
                let pa = &mut polys[i * nvp..(i + 1) * nvp];
                merge_polys(pa, &pb, ea, eb, nvp);
                let last = polys.len() - nvp;
                polys.copy_within(last.., j * nvp);
                polys.truncate(last);
            }
        }

        for poly in polys.chunks_exact(nvp) {
            let mut entry = vec![MESH_NULL_IDX; nvp * 2];
            entry[..nvp].copy_from_slice(poly);
            mesh.polys.extend_from_slice(&entry);
            mesh.regs.push(contour.reg);
            mesh.flags.push(0);
            mesh.areas.push(contour.area);
        }
    }

    if mesh.verts.len() > MESH_NULL_IDX as usize - 1 {
        return Err(Error::BuildFailure(format!(
            "too many vertices in poly mesh: {}",
            mesh.verts.len()
        )));
    }

    let nverts = mesh.verts.len();
    build_mesh_adjacency(&mut mesh.polys, nverts, nvp);

    // Open edges that run along the tile sides become portals.
    if mesh.border_size > 0 {
        let w = cset.width as u16;
        let h = cset.height as u16;
        for i in 0..mesh.poly_count() {
            let nv = mesh.poly_vertex_count(i);
            for j in 0..nv {
                let poly = &mesh.polys[i * nvp * 2..];
                if poly[nvp + j] != MESH_NULL_IDX {
                    continue;
                }
                let va = mesh.verts[poly[j] as usize];
                let vb = mesh.verts[poly[next(j, nv)] as usize];

                let side = if va[0] == 0 && vb[0] == 0 {
                    Some(0)
                } else if va[2] == h && vb[2] == h {
                    Some(1)
                } else if va[0] == w && vb[0] == w {
                    Some(2)
                } else if va[2] == 0 && vb[2] == 0 {
                    Some(3)
                } else {
                    None
                };
                if let Some(side) = side {
                    mesh.polys[i * nvp * 2 + nvp + j] = EXTERNAL_EDGE | side;
                }
            }
        }
    }

    debug!(
        "built poly mesh: {} vertices, {} polygons",
        mesh.verts.len(),
        mesh.poly_count()
    );
    Ok(mesh)
}
