//! Chamfer distance field over the compact heightfield.
//!
//! Distance to the nearest area boundary, in half-voxel steps, smoothed by a
//! box blur. The watershed partitioning floods regions from the highest
//! distances down.

use tilenav_common::{dir_offset_x, dir_offset_z, DIR_COUNT};

use crate::compact::CompactHeightfield;
use crate::heightfield::NULL_AREA;

/// Computes the blurred distance field and stores it in the compact
/// heightfield together with its maximum value.
pub fn build_distance_field(chf: &mut CompactHeightfield) {
    let mut src = vec![u16::MAX; chf.spans.len()];

    // Boundary spans are spans without four same-area neighbors.
    for z in 0..chf.height {
        for x in 0..chf.width {
            let cell = *chf.cell(x, z);
            for i in cell.index as usize..(cell.index + cell.count) as usize {
                let area = chf.areas[i];
                if area == NULL_AREA {
                    src[i] = 0;
                    continue;
                }
                let span = chf.spans[i];
                let mut same_area = 0;
                for dir in 0..DIR_COUNT {
                    if let Some(ni) = chf.connection(&span, x, z, dir) {
                        if chf.areas[ni] == area {
                            same_area += 1;
                        }
                    }
                }
                if same_area != DIR_COUNT {
                    src[i] = 0;
                }
            }
        }
    }

    // Forward pass: (-1, 0), (-1, -1), (0, -1), (1, -1).
    for z in 0..chf.height {
        for x in 0..chf.width {
            let cell = *chf.cell(x, z);
            for i in cell.index as usize..(cell.index + cell.count) as usize {
                relax(chf, &mut src, i, x, z, 0, 3);
                relax(chf, &mut src, i, x, z, 3, 2);
            }
        }
    }

    // Backward pass: (1, 0), (1, 1), (0, 1), (-1, 1).
    for z in (0..chf.height).rev() {
        for x in (0..chf.width).rev() {
            let cell = *chf.cell(x, z);
            for i in cell.index as usize..(cell.index + cell.count) as usize {
                relax(chf, &mut src, i, x, z, 2, 1);
                relax(chf, &mut src, i, x, z, 1, 0);
            }
        }
    }

    chf.max_distance = src.iter().copied().max().unwrap_or(0);
    chf.dist = box_blur(chf, 1, &src);
}

fn relax(
    chf: &CompactHeightfield,
    src: &mut [u16],
    i: usize,
    x: i32,
    z: i32,
    dir: usize,
    diagonal_dir: usize,
) {
    let span = chf.spans[i];
    let Some(ni) = chf.connection(&span, x, z, dir) else {
        return;
    };
    src[i] = src[i].min(src[ni].saturating_add(2));

    let neighbor = chf.spans[ni];
    let nx = x + dir_offset_x(dir);
    let nz = z + dir_offset_z(dir);
    if let Some(di) = chf.connection(&neighbor, nx, nz, diagonal_dir) {
        src[i] = src[i].min(src[di].saturating_add(3));
    }
}

/// Smooths the raw distance field. Missing neighbors fall back to the span's
/// own distance so the border keeps its gradient.
fn box_blur(chf: &CompactHeightfield, threshold: u16, src: &[u16]) -> Vec<u16> {
    let threshold = threshold * 2;
    let mut dst = vec![0u16; src.len()];

    for z in 0..chf.height {
        for x in 0..chf.width {
            let cell = *chf.cell(x, z);
            for i in cell.index as usize..(cell.index + cell.count) as usize {
                let center = src[i];
                if center <= threshold {
                    dst[i] = center;
                    continue;
                }

                let span = chf.spans[i];
                let mut total = center as i32;
                for dir in 0..DIR_COUNT {
                    match chf.connection(&span, x, z, dir) {
                        Some(ni) => {
                            total += src[ni] as i32;
                            let neighbor = chf.spans[ni];
                            let nx = x + dir_offset_x(dir);
                            let nz = z + dir_offset_z(dir);
                            let diagonal_dir = (dir + 1) & 0x3;
                            match chf.connection(&neighbor, nx, nz, diagonal_dir) {
                                Some(di) => total += src[di] as i32,
                                None => total += center as i32,
                            }
                        }
                        None => total += 2 * center as i32,
                    }
                }
                dst[i] = ((total + 5) / 9) as u16;
            }
        }
    }

    dst
}
