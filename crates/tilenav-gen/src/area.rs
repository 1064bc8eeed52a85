//! Walkable area erosion by the agent radius.

use tilenav_common::DIR_COUNT;

use crate::compact::CompactHeightfield;
use crate::heightfield::NULL_AREA;

/// Removes walkable area within `radius` voxels of a boundary, so polygon
/// centers can be navigated by an agent of that radius. Distances are
/// doubled so diagonal steps can cost 3 against 2 for cardinal steps.
pub fn erode_walkable_area(radius: i32, chf: &mut CompactHeightfield) {
    let mut dist = vec![u8::MAX; chf.spans.len()];

    // Boundary spans: non-walkable, or bordering non-walkable space.
    for z in 0..chf.height {
        for x in 0..chf.width {
            let cell = *chf.cell(x, z);
            for i in cell.index as usize..(cell.index + cell.count) as usize {
                if chf.areas[i] == NULL_AREA {
                    dist[i] = 0;
                    continue;
                }
                let span = chf.spans[i];
                let mut connected = 0;
                for dir in 0..DIR_COUNT {
                    if let Some(ni) = chf.connection(&span, x, z, dir) {
                        if chf.areas[ni] != NULL_AREA {
                            connected += 1;
                        }
                    }
                }
                if connected != DIR_COUNT {
                    dist[i] = 0;
                }
            }
        }
    }

    // Forward pass: (-1, 0), (-1, -1), (0, -1), (1, -1).
    for z in 0..chf.height {
        for x in 0..chf.width {
            let cell = *chf.cell(x, z);
            for i in cell.index as usize..(cell.index + cell.count) as usize {
                let span = chf.spans[i];
                propagate(chf, &mut dist, i, span, x, z, 0, 3);
                propagate(chf, &mut dist, i, span, x, z, 3, 2);
            }
        }
    }

    // Backward pass: (1, 0), (1, 1), (0, 1), (-1, 1).
    for z in (0..chf.height).rev() {
        for x in (0..chf.width).rev() {
            let cell = *chf.cell(x, z);
            for i in cell.index as usize..(cell.index + cell.count) as usize {
                let span = chf.spans[i];
                propagate(chf, &mut dist, i, span, x, z, 2, 1);
                propagate(chf, &mut dist, i, span, x, z, 1, 0);
            }
        }
    }

    let threshold = (radius * 2).min(u8::MAX as i32) as u8;
    for (area, &d) in chf.areas.iter_mut().zip(dist.iter()) {
        if d < threshold {
            *area = NULL_AREA;
        }
    }
}

/// Relaxes the distance of span `i` from a cardinal neighbor and the
/// diagonal reached through it.
fn propagate(
    chf: &CompactHeightfield,
    dist: &mut [u8],
    i: usize,
    span: crate::compact::CompactSpan,
    x: i32,
    z: i32,
    dir: usize,
    diagonal_dir: usize,
) {
    let Some(ni) = chf.connection(&span, x, z, dir) else {
        return;
    };
    dist[i] = dist[i].min(dist[ni].saturating_add(2));

    let nx = x + tilenav_common::dir_offset_x(dir);
    let nz = z + tilenav_common::dir_offset_z(dir);
    let neighbor = chf.spans[ni];
    if let Some(di) = chf.connection(&neighbor, nx, nz, diagonal_dir) {
        dist[i] = dist[i].min(dist[di].saturating_add(3));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heightfield::Heightfield;
    use glam::Vec3;

    fn open_field(size: i32) -> CompactHeightfield {
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
        CompactHeightfield::build(2, 1, &hf).unwrap()
    }

    #[test]
    fn erosion_strips_the_rim() {
        let mut chf = open_field(7);
        erode_walkable_area(1, &mut chf);

        for z in 0..7 {
            for x in 0..7 {
                let cell = *chf.cell(x, z);
                let on_rim = x == 0 || z == 0 || x == 6 || z == 6;
                let expected = if on_rim { NULL_AREA } else { 1 };
                assert_eq!(chf.areas[cell.index as usize], expected, "at ({x}, {z})");
            }
        }
    }

    #[test]
    fn large_radius_clears_everything() {
        let mut chf = open_field(5);
        erode_walkable_area(4, &mut chf);
        assert!(chf.areas.iter().all(|&a| a == NULL_AREA));
    }
}
