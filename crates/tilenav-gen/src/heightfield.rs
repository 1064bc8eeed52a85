//! Voxel heightfield built from rasterized triangles.
//!
//! Each grid cell holds a sorted, non-overlapping list of solid spans.
//! Span columns use flat vectors rather than linked lists so that iteration
//! order is fully deterministic.

use glam::Vec3;
use tilenav_common::{dir_offset_x, dir_offset_z, Error, Result};

/// Area id of non-walkable voxels
pub const NULL_AREA: u8 = 0;

/// Maximum span height in voxel units
pub const SPAN_MAX_HEIGHT: i32 = 0xffff;

/// A solid vertical segment of one heightfield column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// Lower extent of the span
    pub smin: i32,
    /// Upper extent of the span; the walkable floor sits on top of it
    pub smax: i32,
    /// Area id of the surface on top of the span
    pub area: u8,
}

/// Heightfield grid of solid span columns
#[derive(Debug, Clone)]
pub struct Heightfield {
    /// Grid width along the x-axis
    pub width: i32,
    /// Grid height (depth) along the z-axis
    pub height: i32,
    /// Minimum bounds of the grid AABB
    pub bmin: Vec3,
    /// Maximum bounds of the grid AABB
    pub bmax: Vec3,
    /// Horizontal resolution
    pub cs: f32,
    /// Vertical resolution
    pub ch: f32,
    columns: Vec<Vec<Span>>,
}

impl Heightfield {
    /// Creates an empty heightfield. Fails when the grid dimensions or the
    /// voxel resolution are not positive.
    pub fn new(width: i32, height: i32, bmin: Vec3, bmax: Vec3, cs: f32, ch: f32) -> Result<Self> {
        if width <= 0 || height <= 0 {
            return Err(Error::BuildFailure(format!(
                "invalid heightfield size {width}x{height}"
            )));
        }
        if cs <= 0.0 || ch <= 0.0 {
            return Err(Error::BuildFailure(format!(
                "invalid voxel resolution cs={cs} ch={ch}"
            )));
        }

        Ok(Self {
            width,
            height,
            bmin,
            bmax,
            cs,
            ch,
            columns: vec![Vec::new(); (width * height) as usize],
        })
    }

    /// Spans of the column at (x, z), ordered by increasing height
    #[inline]
    pub fn column(&self, x: i32, z: i32) -> &[Span] {
        &self.columns[(x + z * self.width) as usize]
    }

    /// Total number of spans in the grid
    pub fn span_count(&self) -> usize {
        self.columns.iter().map(Vec::len).sum()
    }

    /// Adds a span, merging it with overlapping spans in the column. When the
    /// tops of merged spans are within `merge_threshold`, the higher area id
    /// wins. Out-of-bounds coordinates are ignored.
    pub fn add_span(
        &mut self,
        x: i32,
        z: i32,
        smin: i32,
        smax: i32,
        area: u8,
        merge_threshold: i32,
    ) {
        if x < 0 || z < 0 || x >= self.width || z >= self.height || smin > smax {
            return;
        }

        let column = &mut self.columns[(x + z * self.width) as usize];
        let mut new_span = Span { smin, smax, area };

        // Index of the first span that is not entirely below the new one.
        let start = column.partition_point(|s| s.smax < new_span.smin);
        let mut end = start;
        while end < column.len() && column[end].smin <= new_span.smax {
            let other = column[end];
            new_span.smin = new_span.smin.min(other.smin);
            new_span.smax = new_span.smax.max(other.smax);
            if (new_span.smax - other.smax).abs() <= merge_threshold {
                new_span.area = new_span.area.max(other.area);
            }
            end += 1;
        }

        column.splice(start..end, std::iter::once(new_span));
    }

    /// Clearance above a span, up to the next span in the column
    fn clearance(column: &[Span], index: usize) -> i32 {
        let top = column
            .get(index + 1)
            .map_or(SPAN_MAX_HEIGHT, |next| next.smin);
        top - column[index].smax
    }

    /// Marks non-walkable spans as walkable when a walkable span sits just
    /// below them within climb reach, so thin debris does not block movement.
    pub fn filter_low_hanging_walkable_obstacles(&mut self, walkable_climb: i32) {
        for column in &mut self.columns {
            let mut previous_walkable = false;
            let mut previous_area = NULL_AREA;
            let mut previous_max = 0;

            for span in column.iter_mut() {
                let walkable = span.area != NULL_AREA;
                if !walkable && previous_walkable && span.smax - previous_max <= walkable_climb {
                    span.area = previous_area;
                }
                // Track the original walkability so chains of obstacles do
                // not propagate the area upwards.
                previous_walkable = walkable;
                previous_area = span.area;
                previous_max = span.smax;
            }
        }
    }

    /// Marks spans adjacent to drops deeper than the climb height as
    /// non-walkable.
    pub fn filter_ledge_spans(&mut self, walkable_height: i32, walkable_climb: i32) {
        for z in 0..self.height {
            for x in 0..self.width {
                for index in 0..self.column(x, z).len() {
                    let span = self.column(x, z)[index];
                    if span.area == NULL_AREA {
                        continue;
                    }

                    let bot = span.smax;
                    let top = bot + Self::clearance(self.column(x, z), index);

                    // Lowest reachable neighbor floor relative to this span,
                    // and the extent of floors within climb reach.
                    let mut min_neighbor_diff = SPAN_MAX_HEIGHT;
                    let mut accessible_min = span.smax;
                    let mut accessible_max = span.smax;

                    for dir in 0..4 {
                        let nx = x + dir_offset_x(dir);
                        let nz = z + dir_offset_z(dir);
                        if nx < 0 || nz < 0 || nx >= self.width || nz >= self.height {
                            min_neighbor_diff = min_neighbor_diff.min(-walkable_climb - 1);
                            continue;
                        }

                        let neighbor = self.column(nx, nz);

                        // Gap below the neighbor's first span counts as a
                        // potential floor at the climb limit.
                        let mut neighbor_bot = -walkable_climb;
                        let mut neighbor_top =
                            neighbor.first().map_or(SPAN_MAX_HEIGHT, |s| s.smin);
                        if top.min(neighbor_top) - bot.max(neighbor_bot) > walkable_height {
                            min_neighbor_diff = min_neighbor_diff.min(neighbor_bot - bot);
                        }

                        for (ni, nspan) in neighbor.iter().enumerate() {
                            neighbor_bot = nspan.smax;
                            neighbor_top = neighbor
                                .get(ni + 1)
                                .map_or(SPAN_MAX_HEIGHT, |next| next.smin);
                            if top.min(neighbor_top) - bot.max(neighbor_bot) > walkable_height {
                                min_neighbor_diff = min_neighbor_diff.min(neighbor_bot - bot);
                                if (neighbor_bot - bot).abs() <= walkable_climb {
                                    accessible_min = accessible_min.min(neighbor_bot);
                                    accessible_max = accessible_max.max(neighbor_bot);
                                }
                            }
                        }
                    }

                    let is_ledge = min_neighbor_diff < -walkable_climb
                        || accessible_max - accessible_min > walkable_climb;
                    if is_ledge {
                        self.columns[(x + z * self.width) as usize][index].area = NULL_AREA;
                    }
                }
            }
        }
    }

    /// Marks spans whose clearance is below the walkable height as
    /// non-walkable.
    pub fn filter_walkable_low_height_spans(&mut self, walkable_height: i32) {
        for column in &mut self.columns {
            for index in 0..column.len() {
                if Self::clearance(column, index) <= walkable_height {
                    column[index].area = NULL_AREA;
                }
            }
        }
    }
}
