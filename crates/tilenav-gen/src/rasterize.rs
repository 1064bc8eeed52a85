//! Triangle rasterization into the voxel heightfield.

use glam::Vec3;
use tilenav_common::{Error, Result};

use crate::heightfield::{Heightfield, NULL_AREA, SPAN_MAX_HEIGHT};

/// Clears the area id of triangles steeper than the walkable slope angle.
/// Areas and indices are matched by triangle order.
pub fn clear_unwalkable_triangles(
    walkable_slope_angle: f32,
    vertices: &[Vec3],
    indices: &[u32],
    areas: &mut [u8],
) {
    let walkable_threshold = walkable_slope_angle.to_radians().cos();

    for (triangle, area) in indices.chunks_exact(3).zip(areas.iter_mut()) {
        let v0 = vertices[triangle[0] as usize];
        let v1 = vertices[triangle[1] as usize];
        let v2 = vertices[triangle[2] as usize];
        let normal = (v1 - v0).cross(v2 - v0).normalize_or_zero();
        if normal.y <= walkable_threshold {
            *area = NULL_AREA;
        }
    }
}

/// Splits a convex polygon along an axis-aligned line. Vertices on the
/// negative side go to `below`, the rest to `above`; points on the line are
/// added to both.
fn divide_poly(
    polygon: &[Vec3],
    below: &mut Vec<Vec3>,
    above: &mut Vec<Vec3>,
    axis_offset: f32,
    axis: usize,
) {
    below.clear();
    above.clear();

    let distances: Vec<f32> = polygon.iter().map(|v| axis_offset - v[axis]).collect();

    for i in 0..polygon.len() {
        let j = (i + polygon.len() - 1) % polygon.len();
        let in_a = distances[j] >= 0.0;
        let in_b = distances[i] >= 0.0;
        if in_a != in_b {
            let s = distances[j] / (distances[j] - distances[i]);
            let point = polygon[j] + (polygon[i] - polygon[j]) * s;
            below.push(point);
            above.push(point);
        }
        if distances[i] > 0.0 {
            below.push(polygon[i]);
        } else if distances[i] < 0.0 {
            above.push(polygon[i]);
        } else {
            below.push(polygon[i]);
            above.push(polygon[i]);
        }
    }
}

/// Rasterizes one triangle into the heightfield by clipping it against the
/// grid row by row and cell by cell.
fn rasterize_triangle(
    v0: Vec3,
    v1: Vec3,
    v2: Vec3,
    area: u8,
    heightfield: &mut Heightfield,
    flag_merge_threshold: i32,
) {
    let bmin = heightfield.bmin;
    let bmax = heightfield.bmax;
    let cs = heightfield.cs;
    let inverse_cs = 1.0 / heightfield.cs;
    let inverse_ch = 1.0 / heightfield.ch;

    let tri_min = v0.min(v1).min(v2);
    let tri_max = v0.max(v1).max(v2);
    if tri_min.x > bmax.x
        || tri_max.x < bmin.x
        || tri_min.y > bmax.y
        || tri_max.y < bmin.y
        || tri_min.z > bmax.z
        || tri_max.z < bmin.z
    {
        return;
    }

    let width = heightfield.width;
    let height = heightfield.height;
    let field_height = bmax.y - bmin.y;

    // z0 may start one row outside so the first clip discards the part of
    // the triangle below the grid.
    let z0 = (((tri_min.z - bmin.z) * inverse_cs) as i32).clamp(-1, height - 1);
    let z1 = (((tri_max.z - bmin.z) * inverse_cs) as i32).clamp(0, height - 1);

    let mut input = vec![v0, v1, v2];
    let mut row = Vec::with_capacity(7);
    let mut remainder = Vec::with_capacity(7);
    let mut cell = Vec::with_capacity(7);

    for z in z0..=z1 {
        let row_max = bmin.z + (z + 1) as f32 * cs;
        divide_poly(&input, &mut row, &mut remainder, row_max, 2);
        std::mem::swap(&mut input, &mut remainder);
        if row.len() < 3 || z < 0 {
            continue;
        }

        let row_x_min = row.iter().map(|v| v.x).fold(f32::MAX, f32::min);
        let row_x_max = row.iter().map(|v| v.x).fold(f32::MIN, f32::max);
        if row_x_max < bmin.x || row_x_min > bmax.x {
            continue;
        }
        let x0 = (((row_x_min - bmin.x) * inverse_cs) as i32).clamp(-1, width - 1);
        let x1 = (((row_x_max - bmin.x) * inverse_cs) as i32).clamp(0, width - 1);

        let mut row_input = row.clone();
        for x in x0..=x1 {
            let cell_max = bmin.x + (x + 1) as f32 * cs;
            divide_poly(&row_input, &mut cell, &mut remainder, cell_max, 0);
            std::mem::swap(&mut row_input, &mut remainder);
            if cell.len() < 3 || x < 0 {
                continue;
            }

            let mut span_min = cell.iter().map(|v| v.y).fold(f32::MAX, f32::min) - bmin.y;
            let mut span_max = cell.iter().map(|v| v.y).fold(f32::MIN, f32::max) - bmin.y;
            if span_max < 0.0 || span_min > field_height {
                continue;
            }
            span_min = span_min.max(0.0);
            span_max = span_max.min(field_height);

            let smin = ((span_min * inverse_ch).floor() as i32).clamp(0, SPAN_MAX_HEIGHT - 1);
            let smax = ((span_max * inverse_ch).ceil() as i32).clamp(smin + 1, SPAN_MAX_HEIGHT);

            heightfield.add_span(x, z, smin, smax, area, flag_merge_threshold);
        }
    }
}

/// Rasterizes indexed triangles into the heightfield. One area id per
/// triangle.
pub fn rasterize_triangles(
    heightfield: &mut Heightfield,
    vertices: &[Vec3],
    indices: &[u32],
    areas: &[u8],
    flag_merge_threshold: i32,
) -> Result<()> {
    if indices.len() != areas.len() * 3 {
        return Err(Error::BuildFailure(format!(
            "triangle count mismatch: {} indices for {} areas",
            indices.len(),
            areas.len()
        )));
    }

    for (triangle, &area) in indices.chunks_exact(3).zip(areas.iter()) {
        rasterize_triangle(
            vertices[triangle[0] as usize],
            vertices[triangle[1] as usize],
            vertices[triangle[2] as usize],
            area,
            heightfield,
            flag_merge_threshold,
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field() -> Heightfield {
        Heightfield::new(
            4,
            4,
            Vec3::ZERO,
            Vec3::new(4.0, 4.0, 4.0),
            1.0,
            0.5,
        )
        .unwrap()
    }

    #[test]
    fn flat_quad_fills_covered_cells() {
        let mut hf = field();
        let vertices = [
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(4.0, 1.0, 0.0),
            Vec3::new(4.0, 1.0, 4.0),
            Vec3::new(0.0, 1.0, 4.0),
        ];
        let indices = [0, 1, 2, 0, 2, 3];
        rasterize_triangles(&mut hf, &vertices, &indices, &[1, 1], 1).unwrap();

        assert_eq!(hf.span_count(), 16);
        for z in 0..4 {
            for x in 0..4 {
                let column = hf.column(x, z);
                assert_eq!(column.len(), 1);
                // A surface exactly on a cell boundary rounds up one cell.
                assert_eq!(column[0].smax, 3);
                assert_eq!(column[0].area, 1);
            }
        }
    }

    #[test]
    fn triangle_outside_bounds_adds_nothing() {
        let mut hf = field();
        let vertices = [
            Vec3::new(10.0, 1.0, 10.0),
            Vec3::new(12.0, 1.0, 10.0),
            Vec3::new(12.0, 1.0, 12.0),
        ];
        rasterize_triangles(&mut hf, &vertices, &[0, 1, 2], &[1], 1).unwrap();
        assert_eq!(hf.span_count(), 0);
    }

    #[test]
    fn mismatched_areas_are_rejected() {
        let mut hf = field();
        let vertices = [Vec3::ZERO, Vec3::X, Vec3::Z];
        assert!(rasterize_triangles(&mut hf, &vertices, &[0, 1, 2], &[1, 1], 1).is_err());
    }

    #[test]
    fn steep_triangles_are_cleared() {
        let vertices = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(0.0, 0.0, 2.0),
            Vec3::new(1.0, 4.0, 2.0),
            Vec3::new(1.0, 4.0, 3.0),
        ];
        // First triangle is flat and wound to face up, second is a
        // near-vertical wall.
        let indices = [0, 2, 1, 3, 5, 4];
        let mut areas = [1, 1];
        clear_unwalkable_triangles(50.0, &vertices, &indices, &mut areas);
        assert_eq!(areas, [1, NULL_AREA]);
    }
}
