//! Area classification of navigable surfaces and the traversal flags
//! derived from it.

use tilenav_gen::NULL_AREA;

/// Surface classification assigned to input triangles and carried through
/// the pipeline into the final polygons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum AreaType {
    /// Not navigable
    Null = NULL_AREA,
    /// Water surface, traversable by swimming
    Water = 1,
    /// Door opening, traversable after opening the door
    Door = 2,
    /// Path grid edge, preferred by actors following predefined paths
    Pathgrid = 3,
    /// Regular walkable ground. The highest area id wins when spans merge,
    /// so ground dominates every other classification.
    Ground = 63,
}

impl AreaType {
    /// Area id as stored in heightfield spans
    #[inline]
    pub fn value(self) -> u8 {
        self as u8
    }

    /// Area type for a raw span area id
    pub fn from_value(value: u8) -> AreaType {
        match value {
            1 => AreaType::Water,
            2 => AreaType::Door,
            3 => AreaType::Pathgrid,
            63 => AreaType::Ground,
            _ => AreaType::Null,
        }
    }
}

/// Polygon traversal flags
pub mod poly_flags {
    /// Walkable ground
    pub const WALK: u16 = 1;
    /// Swimmable water
    pub const SWIM: u16 = 2;
    /// Requires opening a door
    pub const OPEN_DOOR: u16 = 4;
    /// Follows a path grid edge
    pub const USE_PATHGRID: u16 = 8;
}

/// Traversal flags for an area type. Total over all classifications.
pub fn area_flags(area: AreaType) -> u16 {
    match area {
        AreaType::Null => 0,
        AreaType::Ground => poly_flags::WALK,
        AreaType::Water => poly_flags::SWIM,
        AreaType::Door => poly_flags::OPEN_DOOR,
        AreaType::Pathgrid => poly_flags::USE_PATHGRID,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_follow_the_area_table() {
        assert_eq!(area_flags(AreaType::Null), 0);
        assert_eq!(area_flags(AreaType::Ground), poly_flags::WALK);
        assert_eq!(area_flags(AreaType::Water), poly_flags::SWIM);
        assert_eq!(area_flags(AreaType::Door), poly_flags::OPEN_DOOR);
        assert_eq!(area_flags(AreaType::Pathgrid), poly_flags::USE_PATHGRID);
    }

    #[test]
    fn value_round_trips() {
        for area in [
            AreaType::Null,
            AreaType::Water,
            AreaType::Door,
            AreaType::Pathgrid,
            AreaType::Ground,
        ] {
            assert_eq!(AreaType::from_value(area.value()), area);
        }
        assert_eq!(AreaType::from_value(200), AreaType::Null);
    }
}
