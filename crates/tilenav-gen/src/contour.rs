//! Contour extraction and simplification.
//!
//! Traces the outline of every region, simplifies it against a maximum
//! deviation, tessellates long wall edges and merges hole outlines into
//! their surrounding region outline.

use glam::Vec3;
use log::debug;
use tilenav_common::{dir_offset_x, dir_offset_z, Error, Result, DIR_COUNT};

use crate::compact::CompactHeightfield;
use crate::region::BORDER_REG;

/// Mask of the neighbor region id in a contour vertex flag
const CONTOUR_REG_MASK: i32 = 0xffff;

/// Flag marking an edge between two walkable areas of different type
const AREA_BORDER: i32 = 0x10000;

const MAX_WALK_ITERS: usize = 40_000;

/// Simplified outline of one region. Vertices are `[x, y, z, flags]` in
/// voxel units, the flags carry the neighbor region across the edge.
#[derive(Debug, Clone)]
pub struct Contour {
    /// Simplified outline vertices
    pub verts: Vec<[i32; 4]>,
    /// Raw outline vertices before simplification
    pub rverts: Vec<[i32; 4]>,
    /// Region id of the contour
    pub reg: u16,
    /// Area id of the contour
    pub area: u8,
}

/// All region outlines of one tile
#[derive(Debug, Clone)]
pub struct ContourSet {
    /// Contours, one per region (holes are merged into their outline)
    pub contours: Vec<Contour>,
    /// Minimum bounds of the unpadded tile
    pub bmin: Vec3,
    /// Maximum bounds of the unpadded tile
    pub bmax: Vec3,
    /// Horizontal resolution
    pub cs: f32,
    /// Vertical resolution
    pub ch: f32,
    /// Grid width without border padding
    pub width: i32,
    /// Grid height without border padding
    pub height: i32,
    /// Border padding that was subtracted from the vertices
    pub border_size: i32,
}

/// Height of the corner ahead of the walk direction, the maximum floor of
/// the spans meeting at that corner.
fn corner_height(
    x: i32,
    z: i32,
    i: usize,
    dir: usize,
    chf: &CompactHeightfield,
) -> i32 {
    let span = chf.spans[i];
    let dirp = (dir + 1) & 0x3;
    let mut height = span.y as i32;

    if let Some(ni) = chf.connection(&span, x, z, dir) {
        height = height.max(chf.spans[ni].y as i32);
        let nx = x + dir_offset_x(dir);
        let nz = z + dir_offset_z(dir);
        if let Some(di) = chf.connection(&chf.spans[ni], nx, nz, dirp) {
            height = height.max(chf.spans[di].y as i32);
        }
    }
    if let Some(ni) = chf.connection(&span, x, z, dirp) {
        height = height.max(chf.spans[ni].y as i32);
        let nx = x + dir_offset_x(dirp);
        let nz = z + dir_offset_z(dirp);
        if let Some(di) = chf.connection(&chf.spans[ni], nx, nz, dir) {
            height = height.max(chf.spans[di].y as i32);
        }
    }

    height
}

/// Walks along the boundary of a region, clearing edge flags as it goes,
/// and collects the raw contour vertices.
fn walk_contour(
    mut x: i32,
    mut z: i32,
    mut i: usize,
    chf: &CompactHeightfield,
    flags: &mut [u8],
    points: &mut Vec<[i32; 4]>,
) {
    let mut dir = (0..DIR_COUNT)
        .find(|&d| flags[i] & (1 << d) != 0)
        .unwrap_or(0);
    let start_i = i;
    let start_dir = dir;
    let area = chf.areas[i];

    for _ in 0..MAX_WALK_ITERS {
        if flags[i] & (1 << dir) != 0 {
            let py = corner_height(x, z, i, dir, chf);
            let (px, pz) = match dir {
                0 => (x, z + 1),
                1 => (x + 1, z + 1),
                2 => (x + 1, z),
                _ => (x, z),
            };

            let span = chf.spans[i];
            let mut flag = 0;
            if let Some(ni) = chf.connection(&span, x, z, dir) {
                flag = chf.spans[ni].reg as i32;
                if chf.areas[ni] != area {
                    flag |= AREA_BORDER;
                }
            }
            points.push([px, py, pz, flag]);

            flags[i] &= !(1 << dir);
            dir = (dir + 1) & 0x3;
        } else {
            let span = chf.spans[i];
            match chf.connection(&span, x, z, dir) {
                Some(ni) => {
                    x += dir_offset_x(dir);
                    z += dir_offset_z(dir);
                    i = ni;
                }
                // The edge flag said there is a neighbor.
                None => return,
            }
            dir = (dir + 3) & 0x3;
        }

        if i == start_i && dir == start_dir {
            return;
        }
    }
}

/// Squared distance of a point from a segment, in the xz plane
fn distance_point_segment_sq(x: i32, z: i32, px: i32, pz: i32, qx: i32, qz: i32) -> f32 {
    let pqx = (qx - px) as f32;
    let pqz = (qz - pz) as f32;
    let mut dx = (x - px) as f32;
    let mut dz = (z - pz) as f32;
    let d = pqx * pqx + pqz * pqz;
    let mut t = pqx * dx + pqz * dz;
    if d > 0.0 {
        t /= d;
    }
    t = t.clamp(0.0, 1.0);

    dx = px as f32 + t * pqx - x as f32;
    dz = pz as f32 + t * pqz - z as f32;
    dx * dx + dz * dz
}

/// Simplifies a raw contour: keeps points where the neighbor region
/// changes, then inserts points until the outline deviates less than
/// `max_error` from the raw one, and finally splits wall edges longer than
/// `max_edge_len`.
fn simplify_contour(
    points: &[[i32; 4]],
    simplified: &mut Vec<[i32; 4]>,
    max_error: f32,
    max_edge_len: i32,
) {
    let pn = points.len();

    let has_connections = points.iter().any(|p| p[3] & CONTOUR_REG_MASK != 0);
    if has_connections {
        // Seed with the points where the neighbor region or area changes.
        for i in 0..pn {
            let ii = (i + 1) % pn;
            let different_regs =
                points[i][3] & CONTOUR_REG_MASK != points[ii][3] & CONTOUR_REG_MASK;
            let area_borders = points[i][3] & AREA_BORDER != points[ii][3] & AREA_BORDER;
            if different_regs || area_borders {
                simplified.push([points[i][0], points[i][1], points[i][2], i as i32]);
            }
        }
    }

    if simplified.is_empty() {
        // The contour borders no other region. Seed with the lower-left
        // and upper-right corners.
        let mut lower = 0;
        let mut upper = 0;
        for (i, p) in points.iter().enumerate() {
            let l = &points[lower];
            if p[0] < l[0] || (p[0] == l[0] && p[2] < l[2]) {
                lower = i;
            }
            let u = &points[upper];
            if p[0] > u[0] || (p[0] == u[0] && p[2] > u[2]) {
                upper = i;
            }
        }
        simplified.push([
            points[lower][0],
            points[lower][1],
            points[lower][2],
            lower as i32,
        ]);
        simplified.push([
            points[upper][0],
            points[upper][1],
            points[upper][2],
            upper as i32,
        ]);
    }

    // Add points until the simplified outline is close enough to the raw
    // one.
    let mut i = 0;
    while i < simplified.len() {
        let ii = (i + 1) % simplified.len();

        let mut ax = simplified[i][0];
        let mut az = simplified[i][2];
        let ai = simplified[i][3] as usize;
        let mut bx = simplified[ii][0];
        let mut bz = simplified[ii][2];
        let bi = simplified[ii][3] as usize;

        // Traverse the raw segment in lexicographic order so that the
        // result does not depend on the walk direction.
        let (mut ci, cinc, endi) = if bx > ax || (bx == ax && bz > az) {
            (((ai + 1) % pn), 1usize, bi)
        } else {
            std::mem::swap(&mut ax, &mut bx);
            std::mem::swap(&mut az, &mut bz);
            (((bi + pn - 1) % pn), pn - 1, ai)
        };

        let mut max_deviation = 0.0f32;
        let mut max_index = None;
        // Tessellate only edges facing open space or a different area.
        if points[ci][3] & CONTOUR_REG_MASK == 0 || points[ci][3] & AREA_BORDER != 0 {
            while ci != endi {
                let deviation =
                    distance_point_segment_sq(points[ci][0], points[ci][2], ax, az, bx, bz);
                if deviation > max_deviation {
                    max_deviation = deviation;
                    max_index = Some(ci);
                }
                ci = (ci + cinc) % pn;
            }
        }

        match max_index {
            Some(index) if max_deviation > max_error * max_error => {
                simplified.insert(
                    i + 1,
                    [points[index][0], points[index][1], points[index][2], index as i32],
                );
            }
            _ => i += 1,
        }
    }

    // Split wall edges longer than the maximum edge length.
    if max_edge_len > 0 {
        let mut i = 0;
        while i < simplified.len() {
            let ii = (i + 1) % simplified.len();

            let ax = simplified[i][0];
            let az = simplified[i][2];
            let ai = simplified[i][3] as usize;
            let bx = simplified[ii][0];
            let bz = simplified[ii][2];
            let bi = simplified[ii][3] as usize;

            let mut split_index = None;
            let ci = (ai + 1) % pn;
            if points[ci][3] & CONTOUR_REG_MASK == 0 {
                let dx = (bx - ax) as i64;
                let dz = (bz - az) as i64;
                if dx * dx + dz * dz > (max_edge_len as i64) * (max_edge_len as i64) {
                    let n = if bi < ai { bi + pn - ai } else { bi - ai };
                    if n > 1 {
                        let index = if bx > ax || (bx == ax && bz > az) {
                            (ai + n / 2) % pn
                        } else {
                            (ai + (n + 1) / 2) % pn
                        };
                        split_index = Some(index);
                    }
                }
            }

            match split_index {
                Some(index) => {
                    simplified.insert(
                        i + 1,
                        [points[index][0], points[index][1], points[index][2], index as i32],
                    );
                }
                None => i += 1,
            }
        }
    }

    // Replace the raw point index with the edge flags: the neighbor region
    // comes from the raw point following the vertex.
    for vertex in simplified.iter_mut() {
        let ai = (vertex[3] as usize + 1) % pn;
        vertex[3] = points[ai][3];
    }
}

/// Removes vertices that coincide with their successor in the xz plane
fn remove_degenerate_segments(simplified: &mut Vec<[i32; 4]>) {
    let mut i = 0;
    while i < simplified.len() {
        let ni = (i + 1) % simplified.len();
        if simplified.len() > 1
            && simplified[i][0] == simplified[ni][0]
            && simplified[i][2] == simplified[ni][2]
        {
            simplified.remove(ni);
        } else {
            i += 1;
        }
    }
}

/// Twice the signed area of a contour in the xz plane. Holes are wound the
/// opposite way and come out negative.
fn contour_area_2d(verts: &[[i32; 4]]) -> i64 {
    let mut area = 0i64;
    for i in 0..verts.len() {
        let j = (i + verts.len() - 1) % verts.len();
        area += verts[i][0] as i64 * verts[j][2] as i64;
        area -= verts[j][0] as i64 * verts[i][2] as i64;
    }
    area
}

fn leftmost_vertex(verts: &[[i32; 4]]) -> usize {
    let mut best = 0;
    for i in 1..verts.len() {
        if verts[i][0] < verts[best][0]
            || (verts[i][0] == verts[best][0] && verts[i][2] < verts[best][2])
        {
            best = i;
        }
    }
    best
}

/// Splices a hole outline into its surrounding outline at the closest
/// vertex pair, duplicating the junction vertices.
fn merge_hole(outline: &mut Contour, hole: &Contour) {
    let hole_index = leftmost_vertex(&hole.verts);
    let hv = hole.verts[hole_index];

    let mut outline_index = 0;
    let mut best = i64::MAX;
    for (i, v) in outline.verts.iter().enumerate() {
        let dx = (v[0] - hv[0]) as i64;
        let dz = (v[2] - hv[2]) as i64;
        let d = dx * dx + dz * dz;
        if d < best {
            best = d;
            outline_index = i;
        }
    }

    let on = outline.verts.len();
    let hn = hole.verts.len();
    let mut merged = Vec::with_capacity(on + hn + 2);
    for k in 0..=on {
        merged.push(outline.verts[(outline_index + k) % on]);
    }
    for k in 0..=hn {
        merged.push(hole.verts[(hole_index + k) % hn]);
    }
    outline.verts = merged;
}

/// Builds the simplified contours of all regions. The distance by which
/// outlines may deviate from the raw region boundary is `max_error` in
/// world units, wall edges longer than `max_edge_len` voxels are split.
pub fn build_contours(
    chf: &CompactHeightfield,
    max_error: f32,
    max_edge_len: i32,
) -> Result<ContourSet> {
    let w = chf.width;
    let h = chf.height;
    let border = chf.border_size;

    let mut bmin = chf.bmin;
    let mut bmax = chf.bmax;
    if border > 0 {
        let pad = border as f32 * chf.cs;
        bmin.x += pad;
        bmin.z += pad;
        bmax.x -= pad;
        bmax.z -= pad;
    }

    let mut cset = ContourSet {
        contours: Vec::new(),
        bmin,
        bmax,
        cs: chf.cs,
        ch: chf.ch,
        width: w - border * 2,
        height: h - border * 2,
        border_size: border,
    };

    // Mark the span edges that face a different region.
    let mut flags = vec![0u8; chf.spans.len()];
    for z in 0..h {
        for x in 0..w {
            let cell = *chf.cell(x, z);
            for i in cell.index as usize..(cell.index + cell.count) as usize {
                let span = chf.spans[i];
                if span.reg == 0 || span.reg & BORDER_REG != 0 {
                    continue;
                }
                let mut res = 0u8;
                for dir in 0..DIR_COUNT {
                    let neighbor_reg = chf
                        .connection(&span, x, z, dir)
                        .map_or(0, |ni| chf.spans[ni].reg);
                    if neighbor_reg == span.reg {
                        res |= 1 << dir;
                    }
                }
                flags[i] = res ^ 0xf;
            }
        }
    }

    let mut raw = Vec::with_capacity(256);
    let mut simplified = Vec::with_capacity(64);

    for z in 0..h {
        for x in 0..w {
            let cell = *chf.cell(x, z);
            for i in cell.index as usize..(cell.index + cell.count) as usize {
                if flags[i] == 0 || flags[i] == 0xf {
                    flags[i] = 0;
                    continue;
                }
                let reg = chf.spans[i].reg;
                if reg == 0 || reg & BORDER_REG != 0 {
                    continue;
                }

                raw.clear();
                simplified.clear();
                walk_contour(x, z, i, chf, &mut flags, &mut raw);
                if raw.is_empty() {
                    continue;
                }
                simplify_contour(&raw, &mut simplified, max_error, max_edge_len);
                remove_degenerate_segments(&mut simplified);

                if simplified.len() < 3 {
                    continue;
                }

                let mut verts = simplified.clone();
                let mut rverts = raw.clone();
                if border > 0 {
                    for v in verts.iter_mut().chain(rverts.iter_mut()) {
                        v[0] -= border;
                        v[2] -= border;
                    }
                }

                cset.contours.push(Contour {
                    verts,
                    rverts,
                    reg,
                    area: chf.areas[i],
                });
            }
        }
    }

    merge_region_holes(&mut cset)?;

    debug!("extracted {} contours", cset.contours.len());
    Ok(cset)
}

/// Merges hole contours (negative winding) into the outline contour of the
/// same region.
fn merge_region_holes(cset: &mut ContourSet) -> Result<()> {
    let has_holes = cset
        .contours
        .iter()
        .any(|c| contour_area_2d(&c.verts) < 0);
    if !has_holes {
        return Ok(());
    }

    let mut outlines: Vec<Contour> = Vec::new();
    let mut holes: Vec<Contour> = Vec::new();
    for contour in cset.contours.drain(..) {
        if contour_area_2d(&contour.verts) < 0 {
            holes.push(contour);
        } else {
            outlines.push(contour);
        }
    }

    // Merge left to right so junction vertices stay deterministic.
    holes.sort_by_key(|hole| {
        let v = hole.verts[leftmost_vertex(&hole.verts)];
        (v[0], v[2])
    });

    for hole in holes {
        let outline = outlines
            .iter_mut()
            .find(|outline| outline.reg == hole.reg)
            .ok_or_else(|| {
                Error::BuildFailure(format!("hole contour without outline in region {}", hole.reg))
            })?;
        merge_hole(outline, &hole);
    }

    cset.contours = outlines;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::build_distance_field;
    use crate::heightfield::Heightfield;
    use crate::region::build_regions;

    fn contours_for(hf: &Heightfield, border: i32) -> ContourSet {
        let mut chf = CompactHeightfield::build(2, 1, hf).unwrap();
        build_distance_field(&mut chf);
        build_regions(&mut chf, border, 2, 10).unwrap();
        build_contours(&chf, 1.3, 12).unwrap()
    }

    fn flat_field(size: i32) -> Heightfield {
        let mut hf = Heightfield::new(
            size,
            size,
            Vec3::ZERO,
            Vec3::new(size as f32, 4.0, size as f32),
            1.0,
            1.0,
        )
        .unwrap();
        for z in 0..size {
            for x in 0..size {
                hf.add_span(x, z, 0, 1, 1, 1);
            }
        }
        hf
    }

    #[test]
    fn open_floor_yields_one_rectangle() {
        let cset = contours_for(&flat_field(8), 0);
        assert_eq!(cset.contours.len(), 1);

        let contour = &cset.contours[0];
        assert_eq!(contour.verts.len(), 4);
        for v in &contour.verts {
            assert!(v[0] == 0 || v[0] == 8);
            assert!(v[2] == 0 || v[2] == 8);
        }
    }

    #[test]
    fn border_offset_is_subtracted() {
        let cset = contours_for(&flat_field(12), 2);
        assert_eq!(cset.border_size, 2);
        assert_eq!(cset.width, 8);

        for contour in &cset.contours {
            for v in &contour.verts {
                assert!((0..=8).contains(&v[0]));
                assert!((0..=8).contains(&v[2]));
            }
        }
    }

    #[test]
    fn pillar_floor_leaves_no_hole_contours() {
        // Open floor with a solid 2x2 pillar in the middle.
        let mut hf = Heightfield::new(
            10,
            10,
            Vec3::ZERO,
            Vec3::new(10.0, 4.0, 10.0),
            1.0,
            1.0,
        )
        .unwrap();
        for z in 0..10 {
            for x in 0..10 {
                if (4..6).contains(&x) && (4..6).contains(&z) {
                    continue;
                }
                hf.add_span(x, z, 0, 1, 1, 1);
            }
        }

        let cset = contours_for(&hf, 0);
        assert!(!cset.contours.is_empty());
        for contour in &cset.contours {
            assert!(contour_area_2d(&contour.verts) >= 0);
        }
    }

    #[test]
    fn merge_hole_splices_at_closest_vertices() {
        let mut outline = Contour {
            verts: vec![[0, 0, 0, 0], [10, 0, 0, 0], [10, 0, 10, 0], [0, 0, 10, 0]],
            rverts: Vec::new(),
            reg: 1,
            area: 1,
        };
        let hole = Contour {
            verts: vec![[4, 0, 4, 0], [4, 0, 6, 0], [6, 0, 6, 0], [6, 0, 4, 0]],
            rverts: Vec::new(),
            reg: 1,
            area: 1,
        };
        merge_hole(&mut outline, &hole);
        // Both junction vertices are duplicated.
        assert_eq!(outline.verts.len(), 10);
    }

    #[test]
    fn degenerate_segments_are_removed() {
        let mut simplified = vec![
            [0, 0, 0, 0],
            [4, 0, 0, 0],
            [4, 1, 0, 0],
            [4, 1, 4, 0],
            [0, 0, 4, 0],
        ];
        remove_degenerate_segments(&mut simplified);
        assert_eq!(simplified.len(), 4);
    }
}
