//! Watershed partitioning of the walkable surface into regions.
//!
//! Regions are flooded from the highest distance-field values downwards, two
//! levels at a time, then regions that are too small are removed or merged
//! into their neighbors. Every region ends up as a simply connected patch
//! that the contour stage can trace with a single outline.

use log::debug;
use tilenav_common::{dir_offset_x, dir_offset_z, Error, Result, DIR_COUNT};

use crate::compact::CompactHeightfield;
use crate::heightfield::NULL_AREA;

/// Bit marking regions of the non-navigable tile border
pub const BORDER_REG: u16 = 0x8000;

const EXPAND_ITERS: usize = 8;
const MAX_WALK_ITERS: usize = 40_000;

struct Region {
    id: u16,
    span_count: i32,
    area: u8,
    visited: bool,
    remap: bool,
    /// Neighbor region ids along the region outline, in walk order
    connections: Vec<u16>,
    /// Region ids of spans stacked above or below this region's spans
    floors: Vec<u16>,
}

impl Region {
    fn new(id: u16) -> Self {
        Self {
            id,
            span_count: 0,
            area: 0,
            visited: false,
            remap: false,
            connections: Vec::new(),
            floors: Vec::new(),
        }
    }

    fn connects_to_null_region(&self) -> bool {
        self.connections.contains(&0)
    }
}

/// Partitions the walkable spans into regions and writes the region id of
/// each span into the compact heightfield. Requires the distance field.
pub fn build_regions(
    chf: &mut CompactHeightfield,
    border_size: i32,
    min_region_area: i32,
    merge_region_area: i32,
) -> Result<()> {
    let span_count = chf.spans.len();
    let mut src_reg = vec![0u16; span_count];
    let mut src_dist = vec![0u16; span_count];
    let mut region_id: u16 = 1;

    chf.border_size = border_size;
    if border_size > 0 {
        let w = chf.width;
        let h = chf.height;
        let bw = w.min(border_size);
        let bh = h.min(border_size);
        paint_rect_region(chf, &mut src_reg, 0, bw, 0, h, region_id | BORDER_REG);
        region_id += 1;
        paint_rect_region(chf, &mut src_reg, w - bw, w, 0, h, region_id | BORDER_REG);
        region_id += 1;
        paint_rect_region(chf, &mut src_reg, 0, w, 0, bh, region_id | BORDER_REG);
        region_id += 1;
        paint_rect_region(chf, &mut src_reg, 0, w, h - bh, h, region_id | BORDER_REG);
        region_id += 1;
    }

    let mut level = (chf.max_distance as i32 + 1) & !1;
    while level > 0 {
        level = (level - 2).max(0);

        expand_regions(EXPAND_ITERS, level as u16, chf, &mut src_reg, &mut src_dist);

        // Seed new regions at the current level.
        for z in 0..chf.height {
            for x in 0..chf.width {
                let cell = *chf.cell(x, z);
                for i in cell.index as usize..(cell.index + cell.count) as usize {
                    if chf.dist[i] < level as u16
                        || src_reg[i] != 0
                        || chf.areas[i] == NULL_AREA
                    {
                        continue;
                    }
                    if region_id & BORDER_REG != 0 {
                        return Err(Error::BuildFailure("region id overflow".to_string()));
                    }
                    if flood_region(
                        x,
                        z,
                        i,
                        level as u16,
                        region_id,
                        chf,
                        &mut src_reg,
                        &mut src_dist,
                    ) {
                        region_id += 1;
                    }
                }
            }
        }
    }

    expand_regions(EXPAND_ITERS * 8, 0, chf, &mut src_reg, &mut src_dist);

    let max_region_id = merge_and_filter_regions(
        min_region_area,
        merge_region_area,
        region_id,
        chf,
        &mut src_reg,
    )?;

    chf.max_regions = max_region_id;
    for (span, &reg) in chf.spans.iter_mut().zip(src_reg.iter()) {
        span.reg = reg;
    }

    debug!("built {} regions", max_region_id);
    Ok(())
}

fn paint_rect_region(
    chf: &CompactHeightfield,
    src_reg: &mut [u16],
    min_x: i32,
    max_x: i32,
    min_z: i32,
    max_z: i32,
    reg_id: u16,
) {
    for z in min_z..max_z {
        for x in min_x..max_x {
            let cell = *chf.cell(x, z);
            for i in cell.index as usize..(cell.index + cell.count) as usize {
                if chf.areas[i] != NULL_AREA {
                    src_reg[i] = reg_id;
                }
            }
        }
    }
}

/// Floods one new region from the seed span outwards, claiming connected
/// spans at or above the water level. Gives up spans that already touch a
/// different region.
#[allow(clippy::too_many_arguments)]
fn flood_region(
    x: i32,
    z: i32,
    i: usize,
    level: u16,
    reg_id: u16,
    chf: &CompactHeightfield,
    src_reg: &mut [u16],
    src_dist: &mut [u16],
) -> bool {
    let area = chf.areas[i];
    let lev = level.saturating_sub(2);

    let mut stack = vec![(x, z, i)];
    src_reg[i] = reg_id;
    src_dist[i] = 0;
    let mut count = 0;

    while let Some((cx, cz, ci)) = stack.pop() {
        let span = chf.spans[ci];

        // If a neighbor (including diagonals) already belongs to another
        // region, this span stays unclaimed.
        let mut adjacent_region = 0;
        for dir in 0..DIR_COUNT {
            let Some(ni) = chf.connection(&span, cx, cz, dir) else {
                continue;
            };
            if chf.areas[ni] != area {
                continue;
            }
            let nr = src_reg[ni];
            if nr & BORDER_REG != 0 {
                continue;
            }
            if nr != 0 && nr != reg_id {
                adjacent_region = nr;
                break;
            }

            let nx = cx + dir_offset_x(dir);
            let nz = cz + dir_offset_z(dir);
            let diagonal_dir = (dir + 1) & 0x3;
            if let Some(di) = chf.connection(&chf.spans[ni], nx, nz, diagonal_dir) {
                if chf.areas[di] == area {
                    let dr = src_reg[di];
                    if dr != 0 && dr != reg_id && dr & BORDER_REG == 0 {
                        adjacent_region = dr;
                        break;
                    }
                }
            }
        }
        if adjacent_region != 0 {
            src_reg[ci] = 0;
            continue;
        }
        count += 1;

        for dir in 0..DIR_COUNT {
            let Some(ni) = chf.connection(&span, cx, cz, dir) else {
                continue;
            };
            if chf.areas[ni] == area && chf.dist[ni] >= lev && src_reg[ni] == 0 {
                src_reg[ni] = reg_id;
                src_dist[ni] = 0;
                stack.push((cx + dir_offset_x(dir), cz + dir_offset_z(dir), ni));
            }
        }
    }

    count > 0
}

/// Grows existing regions into unclaimed spans at or above the water level.
fn expand_regions(
    max_iterations: usize,
    level: u16,
    chf: &CompactHeightfield,
    src_reg: &mut Vec<u16>,
    src_dist: &mut Vec<u16>,
) {
    // Spans revealed by the new water level that have no region yet.
    let mut stack: Vec<(i32, i32, i64)> = Vec::new();
    for z in 0..chf.height {
        for x in 0..chf.width {
            let cell = *chf.cell(x, z);
            for i in cell.index as usize..(cell.index + cell.count) as usize {
                if chf.dist[i] >= level && src_reg[i] == 0 && chf.areas[i] != NULL_AREA {
                    stack.push((x, z, i as i64));
                }
            }
        }
    }

    let mut iterations = 0;
    while !stack.is_empty() {
        let mut failed = 0;
        let mut dst_reg = src_reg.clone();
        let mut dst_dist = src_dist.clone();

        for entry in stack.iter_mut() {
            let (x, z, i) = *entry;
            if i < 0 {
                failed += 1;
                continue;
            }
            let i = i as usize;

            let mut reg = src_reg[i];
            let mut dist = u16::MAX;
            let area = chf.areas[i];
            let span = chf.spans[i];
            for dir in 0..DIR_COUNT {
                let Some(ni) = chf.connection(&span, x, z, dir) else {
                    continue;
                };
                if chf.areas[ni] != area {
                    continue;
                }
                if src_reg[ni] > 0 && src_reg[ni] & BORDER_REG == 0 {
                    let candidate = src_dist[ni].saturating_add(2);
                    if candidate < dist {
                        reg = src_reg[ni];
                        dist = candidate;
                    }
                }
            }
            if reg > 0 {
                entry.2 = -1;
                dst_reg[i] = reg;
                dst_dist[i] = dist;
            } else {
                failed += 1;
            }
        }

        std::mem::swap(src_reg, &mut dst_reg);
        std::mem::swap(src_dist, &mut dst_dist);

        if failed == stack.len() {
            break;
        }
        if level > 0 {
            iterations += 1;
            if iterations >= max_iterations {
                break;
            }
        }
    }
}

/// True when the span edge in `dir` borders a different region
fn is_region_edge(
    chf: &CompactHeightfield,
    src_reg: &[u16],
    x: i32,
    z: i32,
    i: usize,
    dir: usize,
) -> bool {
    let span = chf.spans[i];
    let neighbor_reg = chf
        .connection(&span, x, z, dir)
        .map_or(0, |ni| src_reg[ni]);
    neighbor_reg != src_reg[i]
}

/// Walks the outline of a region and records the sequence of neighbor
/// region ids along it.
fn walk_region_outline(
    mut x: i32,
    mut z: i32,
    mut i: usize,
    mut dir: usize,
    chf: &CompactHeightfield,
    src_reg: &[u16],
    connections: &mut Vec<u16>,
) {
    let start_i = i;
    let start_dir = dir;

    let span = chf.spans[i];
    let mut current_reg = chf
        .connection(&span, x, z, dir)
        .map_or(0, |ni| src_reg[ni]);
    connections.push(current_reg);

    for _ in 0..MAX_WALK_ITERS {
        let span = chf.spans[i];

        if is_region_edge(chf, src_reg, x, z, i, dir) {
            let reg = chf
                .connection(&span, x, z, dir)
                .map_or(0, |ni| src_reg[ni]);
            if reg != current_reg {
                current_reg = reg;
                connections.push(reg);
            }
            dir = (dir + 1) & 0x3;
        } else {
            match chf.connection(&span, x, z, dir) {
                Some(ni) => {
                    x += dir_offset_x(dir);
                    z += dir_offset_z(dir);
                    i = ni;
                }
                // Should not happen, the edge test covers this.
                None => return,
            }
            dir = (dir + 3) & 0x3;
        }

        if i == start_i && dir == start_dir {
            break;
        }
    }

    remove_adjacent_duplicates(connections);
}

fn remove_adjacent_duplicates(connections: &mut Vec<u16>) {
    let mut i = 0;
    while connections.len() > 1 && i < connections.len() {
        let next = (i + 1) % connections.len();
        if connections[i] == connections[next] {
            connections.remove(next);
        } else {
            i += 1;
        }
    }
}

fn add_unique_floor(region: &mut Region, floor: u16) {
    if !region.floors.contains(&floor) {
        region.floors.push(floor);
    }
}

fn can_merge(a: &Region, b: &Region) -> bool {
    if a.area != b.area {
        return false;
    }
    // A single shared border segment keeps the merged region simply
    // connected.
    if a.connections.iter().filter(|&&c| c == b.id).count() != 1 {
        return false;
    }
    !a.floors.contains(&b.id)
}

fn merge_regions(regions: &mut [Region], target: usize, source: usize) -> bool {
    let target_id = regions[target].id;
    let source_id = regions[source].id;

    let Some(insert_target) = regions[target].connections.iter().position(|&c| c == source_id)
    else {
        return false;
    };
    let Some(insert_source) = regions[source].connections.iter().position(|&c| c == target_id)
    else {
        return false;
    };

    let target_cons = regions[target].connections.clone();
    let source_cons = regions[source].connections.clone();

    // Stitch the two outlines together at the shared edge.
    let mut merged = Vec::with_capacity(target_cons.len() + source_cons.len());
    for k in 0..target_cons.len() - 1 {
        merged.push(target_cons[(insert_target + 1 + k) % target_cons.len()]);
    }
    for k in 0..source_cons.len() - 1 {
        merged.push(source_cons[(insert_source + 1 + k) % source_cons.len()]);
    }
    remove_adjacent_duplicates(&mut merged);

    regions[target].connections = merged;
    for floor in regions[source].floors.clone() {
        add_unique_floor(&mut regions[target], floor);
    }
    regions[target].span_count += regions[source].span_count;
    regions[source].span_count = 0;
    regions[source].connections.clear();
    true
}

fn replace_neighbor(region: &mut Region, old_id: u16, new_id: u16) {
    let mut changed = false;
    for connection in region.connections.iter_mut() {
        if *connection == old_id {
            *connection = new_id;
            changed = true;
        }
    }
    for floor in region.floors.iter_mut() {
        if *floor == old_id {
            *floor = new_id;
        }
    }
    if changed {
        remove_adjacent_duplicates(&mut region.connections);
    }
}

/// Removes regions below the minimum size unless they touch the tile edge,
/// merges regions below the merge size into their neighbors and compacts
/// the region ids. Returns the highest region id in use.
fn merge_and_filter_regions(
    min_region_area: i32,
    merge_region_area: i32,
    max_region_id: u16,
    chf: &CompactHeightfield,
    src_reg: &mut [u16],
) -> Result<u16> {
    let nreg = max_region_id as usize;
    let mut regions: Vec<Region> = (0..nreg as u16).map(Region::new).collect();

    // Gather region sizes, floors and outline connectivity.
    for z in 0..chf.height {
        for x in 0..chf.width {
            let cell = *chf.cell(x, z);
            for i in cell.index as usize..(cell.index + cell.count) as usize {
                let r = src_reg[i];
                if r == 0 || r as usize >= nreg {
                    continue;
                }

                regions[r as usize].span_count += 1;
                regions[r as usize].area = chf.areas[i];

                for j in cell.index as usize..(cell.index + cell.count) as usize {
                    if i == j {
                        continue;
                    }
                    let floor = src_reg[j];
                    if floor == 0 || floor as usize >= nreg {
                        continue;
                    }
                    add_unique_floor(&mut regions[r as usize], floor);
                }

                if !regions[r as usize].connections.is_empty() {
                    continue;
                }
                if let Some(dir) = (0..DIR_COUNT)
                    .find(|&dir| is_region_edge(chf, src_reg, x, z, i, dir))
                {
                    let mut connections = Vec::new();
                    walk_region_outline(x, z, i, dir, chf, src_reg, &mut connections);
                    regions[r as usize].connections = connections;
                }
            }
        }
    }

    // Remove groups of connected small regions that neither reach the
    // minimum size together nor touch the tile edge.
    for start in 1..nreg {
        if regions[start].id == 0
            || regions[start].id & BORDER_REG != 0
            || regions[start].span_count == 0
            || regions[start].visited
        {
            continue;
        }

        let mut connected_count = 0;
        let mut touches_border = false;
        let mut group = Vec::new();
        let mut stack = vec![start];
        regions[start].visited = true;

        while let Some(ri) = stack.pop() {
            connected_count += regions[ri].span_count;
            group.push(ri);
            for k in 0..regions[ri].connections.len() {
                let connection = regions[ri].connections[k];
                if connection & BORDER_REG != 0 {
                    touches_border = true;
                    continue;
                }
                let ci = connection as usize;
                if ci == 0 || ci >= nreg {
                    continue;
                }
                if regions[ci].visited || regions[ci].id == 0 {
                    continue;
                }
                regions[ci].visited = true;
                stack.push(ci);
            }
        }

        if connected_count < min_region_area && !touches_border {
            for ri in group {
                regions[ri].span_count = 0;
                regions[ri].id = 0;
            }
        }
    }

    // Merge small regions into their smallest mergeable neighbor until
    // nothing changes.
    loop {
        let mut merged_any = false;
        for ri in 0..nreg {
            let region = &regions[ri];
            if region.id == 0 || region.id & BORDER_REG != 0 || region.span_count == 0 {
                continue;
            }
            if region.span_count > merge_region_area && region.connects_to_null_region() {
                continue;
            }

            let mut smallest = i32::MAX;
            let mut merge_target = usize::MAX;
            for &connection in &region.connections {
                if connection & BORDER_REG != 0 || connection == 0 {
                    continue;
                }
                let ci = connection as usize;
                if ci >= nreg {
                    continue;
                }
                let candidate = &regions[ci];
                if candidate.id == 0 || candidate.id & BORDER_REG != 0 {
                    continue;
                }
                if candidate.span_count < smallest
                    && can_merge(region, candidate)
                    && can_merge(candidate, region)
                {
                    smallest = candidate.span_count;
                    merge_target = ci;
                }
            }

            if merge_target != usize::MAX {
                let old_id = regions[ri].id;
                let new_id = regions[merge_target].id;
                if merge_regions(&mut regions, merge_target, ri) {
                    for region in regions.iter_mut() {
                        if region.id == 0 || region.id & BORDER_REG != 0 {
                            continue;
                        }
                        if region.id == old_id {
                            region.id = new_id;
                        }
                        replace_neighbor(region, old_id, new_id);
                    }
                    merged_any = true;
                }
            }
        }
        if !merged_any {
            break;
        }
    }

    // Compact the surviving ids into 1..=max.
    for region in regions.iter_mut() {
        region.remap = region.id != 0 && region.id & BORDER_REG == 0;
    }
    let mut id_gen = 0u16;
    for ri in 0..nreg {
        if !regions[ri].remap {
            continue;
        }
        id_gen += 1;
        let old_id = regions[ri].id;
        for region in regions.iter_mut() {
            if region.id == old_id {
                region.id = id_gen;
                region.remap = false;
            }
        }
    }

    for reg in src_reg.iter_mut() {
        if *reg & BORDER_REG != 0 || *reg == 0 {
            continue;
        }
        let ri = *reg as usize;
        if ri < nreg {
            *reg = regions[ri].id;
        }
    }

    Ok(id_gen)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::build_distance_field;
    use crate::heightfield::Heightfield;
    use glam::Vec3;

    fn partitioned_field(size: i32, border: i32) -> CompactHeightfield {
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
        let mut chf = CompactHeightfield::build(2, 1, &hf).unwrap();
        build_distance_field(&mut chf);
        build_regions(&mut chf, border, 2, 10).unwrap();
        chf
    }

    #[test]
    fn open_floor_forms_one_region() {
        let chf = partitioned_field(10, 0);
        assert_eq!(chf.max_regions, 1);

        let interior = chf.cell(5, 5).index as usize;
        assert_eq!(chf.spans[interior].reg, 1);
    }

    #[test]
    fn border_spans_get_border_regions() {
        let chf = partitioned_field(12, 2);

        let rim = chf.cell(0, 6).index as usize;
        assert_ne!(chf.spans[rim].reg & BORDER_REG, 0);

        let interior = chf.cell(6, 6).index as usize;
        assert_eq!(chf.spans[interior].reg & BORDER_REG, 0);
        assert_ne!(chf.spans[interior].reg, 0);
    }

    #[test]
    fn separated_islands_get_distinct_regions() {
        // Two 4-wide strips split by a non-walkable gap.
        let mut hf = Heightfield::new(
            9,
            4,
            Vec3::ZERO,
            Vec3::new(9.0, 4.0, 4.0),
            1.0,
            1.0,
        )
        .unwrap();
        for z in 0..4 {
            for x in 0..9 {
                if x != 4 {
                    hf.add_span(x, z, 0, 1, 1, 1);
                }
            }
        }
        let mut chf = CompactHeightfield::build(2, 1, &hf).unwrap();
        build_distance_field(&mut chf);
        build_regions(&mut chf, 0, 2, 10).unwrap();

        let left = chf.spans[chf.cell(1, 1).index as usize].reg;
        let right = chf.spans[chf.cell(7, 1).index as usize].reg;
        assert_ne!(left, 0);
        assert_ne!(right, 0);
        assert_ne!(left, right);
    }

    #[test]
    fn tiny_isolated_regions_are_removed() {
        // A lone walkable cell far from the main floor.
        let mut hf = Heightfield::new(
            8,
            8,
            Vec3::ZERO,
            Vec3::new(8.0, 4.0, 8.0),
            1.0,
            1.0,
        )
        .unwrap();
        for z in 0..4 {
            for x in 0..8 {
                hf.add_span(x, z, 0, 1, 1, 1);
            }
        }
        hf.add_span(6, 6, 0, 1, 1, 1);

        let mut chf = CompactHeightfield::build(2, 1, &hf).unwrap();
        build_distance_field(&mut chf);
        build_regions(&mut chf, 0, 2, 10).unwrap();

        let lone = chf.spans[chf.cell(6, 6).index as usize].reg;
        assert_eq!(lone, 0);
    }
}
