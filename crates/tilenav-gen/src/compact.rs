//! Compact heightfield of open, walkable space.
//!
//! The solid heightfield stores what is filled; the compact heightfield
//! stores the gaps above walkable floors together with 4-way neighbor
//! connectivity, and is the input of every later pipeline stage.

use glam::Vec3;
use tilenav_common::{dir_offset_x, dir_offset_z, Error, Result, DIR_COUNT};

use crate::heightfield::{Heightfield, NULL_AREA, SPAN_MAX_HEIGHT};

/// Marker for a direction without a connected neighbor span
pub const NOT_CONNECTED: u8 = 0xff;

/// Largest span layer index that can still be addressed by a connection
const MAX_LAYERS: usize = NOT_CONNECTED as usize - 1;

/// One column of the compact heightfield, indexing into the span array
#[derive(Debug, Clone, Copy, Default)]
pub struct CompactCell {
    /// Index of the first span of the column
    pub index: u32,
    /// Number of spans in the column
    pub count: u32,
}

/// Open space above a walkable floor
#[derive(Debug, Clone, Copy)]
pub struct CompactSpan {
    /// Floor height in voxels
    pub y: u16,
    /// Region id assigned by the watershed partitioning, 0 when unassigned
    pub reg: u16,
    /// Clearance above the floor in voxels
    pub h: u16,
    /// Neighbor span layer index per direction, or `NOT_CONNECTED`
    pub con: [u8; DIR_COUNT],
}

/// Compact representation of the walkable space of a heightfield
#[derive(Debug, Clone)]
pub struct CompactHeightfield {
    /// Grid width along the x-axis
    pub width: i32,
    /// Grid height along the z-axis
    pub height: i32,
    /// Walkable clearance used when linking spans, in voxels
    pub walkable_height: i32,
    /// Climbable height difference used when linking spans, in voxels
    pub walkable_climb: i32,
    /// Non-navigable border padding, in voxels
    pub border_size: i32,
    /// Maximum value of the distance field, set by `build_distance_field`
    pub max_distance: u16,
    /// Number of regions, set by `build_regions`
    pub max_regions: u16,
    /// Minimum bounds of the grid AABB
    pub bmin: Vec3,
    /// Maximum bounds of the grid AABB, raised by the walkable height
    pub bmax: Vec3,
    /// Horizontal resolution
    pub cs: f32,
    /// Vertical resolution
    pub ch: f32,
    /// Grid of columns, `width * height` entries
    pub cells: Vec<CompactCell>,
    /// All spans, grouped by column
    pub spans: Vec<CompactSpan>,
    /// Border distance per span, set by `build_distance_field`
    pub dist: Vec<u16>,
    /// Area id per span
    pub areas: Vec<u8>,
}

impl CompactHeightfield {
    /// Builds the compact heightfield from the walkable spans of a solid
    /// heightfield and links neighboring spans that an agent can walk
    /// between.
    pub fn build(
        walkable_height: i32,
        walkable_climb: i32,
        heightfield: &Heightfield,
    ) -> Result<Self> {
        let width = heightfield.width;
        let height = heightfield.height;

        let mut chf = Self {
            width,
            height,
            walkable_height,
            walkable_climb,
            border_size: 0,
            max_distance: 0,
            max_regions: 0,
            bmin: heightfield.bmin,
            bmax: heightfield.bmax + Vec3::new(0.0, walkable_height as f32 * heightfield.ch, 0.0),
            cs: heightfield.cs,
            ch: heightfield.ch,
            cells: vec![CompactCell::default(); (width * height) as usize],
            spans: Vec::new(),
            dist: Vec::new(),
            areas: Vec::new(),
        };

        for z in 0..height {
            for x in 0..width {
                let cell_index = (x + z * width) as usize;
                chf.cells[cell_index].index = chf.spans.len() as u32;

                let column = heightfield.column(x, z);
                for (i, span) in column.iter().enumerate() {
                    if span.area == NULL_AREA {
                        continue;
                    }
                    let top = column.get(i + 1).map_or(SPAN_MAX_HEIGHT, |next| next.smin);
                    chf.spans.push(CompactSpan {
                        y: span.smax.clamp(0, 0xffff) as u16,
                        reg: 0,
                        h: (top - span.smax).clamp(0, 0xffff) as u16,
                        con: [NOT_CONNECTED; DIR_COUNT],
                    });
                    chf.areas.push(span.area);
                }

                chf.cells[cell_index].count =
                    chf.spans.len() as u32 - chf.cells[cell_index].index;
            }
        }

        chf.link_neighbors()?;
        Ok(chf)
    }

    fn link_neighbors(&mut self) -> Result<()> {
        for z in 0..self.height {
            for x in 0..self.width {
                let cell = self.cells[(x + z * self.width) as usize];
                for i in cell.index..cell.index + cell.count {
                    let span = self.spans[i as usize];

                    for dir in 0..DIR_COUNT {
                        let nx = x + dir_offset_x(dir);
                        let nz = z + dir_offset_z(dir);
                        if nx < 0 || nz < 0 || nx >= self.width || nz >= self.height {
                            continue;
                        }

                        let neighbor_cell = self.cells[(nx + nz * self.width) as usize];
                        for k in neighbor_cell.index..neighbor_cell.index + neighbor_cell.count {
                            let neighbor = self.spans[k as usize];
                            let bot = span.y.max(neighbor.y) as i32;
                            let top = (span.y as i32 + span.h as i32)
                                .min(neighbor.y as i32 + neighbor.h as i32);

                            if top - bot >= self.walkable_height
                                && (neighbor.y as i32 - span.y as i32).abs()
                                    <= self.walkable_climb
                            {
                                let layer = (k - neighbor_cell.index) as usize;
                                if layer > MAX_LAYERS {
                                    return Err(Error::BuildFailure(format!(
                                        "too many layers in column ({nx}, {nz})"
                                    )));
                                }
                                self.spans[i as usize].con[dir] = layer as u8;
                                break;
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Connected neighbor span index in the given direction, if any
    #[inline]
    pub fn connection(&self, span: &CompactSpan, x: i32, z: i32, dir: usize) -> Option<usize> {
        let layer = span.con[dir];
        if layer == NOT_CONNECTED {
            return None;
        }
        let nx = x + dir_offset_x(dir);
        let nz = z + dir_offset_z(dir);
        let cell = &self.cells[(nx + nz * self.width) as usize];
        Some(cell.index as usize + layer as usize)
    }

    /// Cell of the column at (x, z)
    #[inline]
    pub fn cell(&self, x: i32, z: i32) -> &CompactCell {
        &self.cells[(x + z * self.width) as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_field(width: i32, height: i32) -> Heightfield {
        let mut hf = Heightfield::new(
            width,
            height,
            Vec3::ZERO,
            Vec3::new(width as f32, 4.0, height as f32),
            1.0,
            1.0,
        )
        .unwrap();
        for z in 0..height {
            for x in 0..width {
                hf.add_span(x, z, 0, 1, 1, 1);
            }
        }
        hf
    }

    #[test]
    fn keeps_only_walkable_spans() {
        let mut hf =
            Heightfield::new(3, 3, Vec3::ZERO, Vec3::new(3.0, 4.0, 3.0), 1.0, 1.0).unwrap();
        for z in 0..3 {
            for x in 0..3 {
                let area = if x == 1 && z == 1 { NULL_AREA } else { 1 };
                hf.add_span(x, z, 0, 1, area, 1);
            }
        }

        let chf = CompactHeightfield::build(2, 1, &hf).unwrap();
        assert_eq!(chf.spans.len(), 8);
        assert_eq!(chf.cell(1, 1).count, 0);
    }

    #[test]
    fn links_level_neighbors() {
        let hf = flat_field(3, 3);
        let chf = CompactHeightfield::build(2, 1, &hf).unwrap();

        let center = chf.cell(1, 1);
        let span = chf.spans[center.index as usize];
        for dir in 0..DIR_COUNT {
            assert!(chf.connection(&span, 1, 1, dir).is_some());
        }

        // Corner spans only connect inward.
        let corner = chf.cell(0, 0);
        let span = chf.spans[corner.index as usize];
        assert_eq!(
            (0..DIR_COUNT)
                .filter(|&dir| chf.connection(&span, 0, 0, dir).is_some())
                .count(),
            2
        );
    }

    #[test]
    fn does_not_link_across_high_steps() {
        let mut hf = Heightfield::new(2, 1, Vec3::ZERO, Vec3::new(2.0, 20.0, 1.0), 1.0, 1.0)
            .unwrap();
        hf.add_span(0, 0, 0, 1, 1, 1);
        hf.add_span(1, 0, 0, 10, 1, 1);

        let chf = CompactHeightfield::build(2, 2, &hf).unwrap();
        let span = chf.spans[chf.cell(0, 0).index as usize];
        assert!((0..DIR_COUNT).all(|dir| chf.connection(&span, 0, 0, dir).is_none()));
    }
}
