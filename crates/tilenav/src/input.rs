//! Input geometry supplied by the world: triangles with area
//! classification, water bodies and the agent capsule dimensions.

use byteorder::{LittleEndian, WriteBytesExt};
use glam::Vec3;

use crate::areas::AreaType;

/// Capsule half-dimensions of the agent the tile is built for. Compared and
/// hashed by bit pattern so it can key the cache.
#[derive(Debug, Clone, Copy)]
pub struct AgentHalfExtents {
    /// Capsule radius in world units
    pub radius: f32,
    /// Capsule half-height in world units
    pub height: f32,
}

impl AgentHalfExtents {
    /// Bit-pattern key, stable across identical values including -0.0
    #[inline]
    pub fn key(&self) -> [u32; 2] {
        [self.radius.to_bits(), self.height.to_bits()]
    }
}

impl PartialEq for AgentHalfExtents {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for AgentHalfExtents {}

impl std::hash::Hash for AgentHalfExtents {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

/// Horizontal footprint of a water body
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WaterFootprint {
    /// A square of the given side length centered on the shift
    Bounded(f32),
    /// A plane covering every tile it is submitted to
    Unbounded,
}

/// One water body. The shift is in world coordinates (z up); its z
/// component is the water level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaterBody {
    /// Footprint in the horizontal plane
    pub footprint: WaterFootprint,
    /// Center of the footprint, z is the surface level
    pub shift: Vec3,
}

/// Walkable-surface geometry of one tile in world coordinates (z up).
/// Content-identifiable: two meshes with equal geometry and classification
/// produce equal signatures.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputMesh {
    /// Vertex coordinates, three per vertex
    pub vertices: Vec<f32>,
    /// Triangle vertex indices, three per triangle
    pub indices: Vec<i32>,
    /// Area classification, one per triangle
    pub area_types: Vec<AreaType>,
    /// Water bodies overlapping the tile
    pub water: Vec<WaterBody>,
}

impl InputMesh {
    /// True when the mesh carries no triangles and no water
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty() && self.water.is_empty()
    }

    /// Vertical bounds of the triangle geometry (world z axis)
    pub fn vertical_bounds(&self) -> Option<(f32, f32)> {
        let mut bounds: Option<(f32, f32)> = None;
        for v in self.vertices.chunks_exact(3) {
            let z = v[2];
            bounds = Some(match bounds {
                Some((min, max)) => (min.min(z), max.max(z)),
                None => (z, z),
            });
        }
        bounds
    }

    /// Canonical little-endian byte serialization of the content, used as
    /// the cache key.
    pub fn signature(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            16 + self.vertices.len() * 4 + self.indices.len() * 4 + self.area_types.len(),
        );
        // Writes into a Vec cannot fail.
        let _ = out.write_u32::<LittleEndian>(self.vertices.len() as u32);
        for &v in &self.vertices {
            let _ = out.write_u32::<LittleEndian>(v.to_bits());
        }
        let _ = out.write_u32::<LittleEndian>(self.indices.len() as u32);
        for &i in &self.indices {
            let _ = out.write_i32::<LittleEndian>(i);
        }
        let _ = out.write_u32::<LittleEndian>(self.area_types.len() as u32);
        for &area in &self.area_types {
            out.push(area.value());
        }
        let _ = out.write_u32::<LittleEndian>(self.water.len() as u32);
        for body in &self.water {
            match body.footprint {
                WaterFootprint::Bounded(size) => {
                    out.push(1);
                    let _ = out.write_u32::<LittleEndian>(size.to_bits());
                }
                WaterFootprint::Unbounded => out.push(0),
            }
            for c in [body.shift.x, body.shift.y, body.shift.z] {
                let _ = out.write_u32::<LittleEndian>(c.to_bits());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mesh() -> InputMesh {
        InputMesh {
            vertices: vec![0.0, 0.0, 0.5, 1.0, 0.0, 0.5, 1.0, 1.0, 0.25],
            indices: vec![0, 1, 2],
            area_types: vec![AreaType::Ground],
            water: vec![WaterBody {
                footprint: WaterFootprint::Bounded(4.0),
                shift: Vec3::new(0.5, 0.5, 0.1),
            }],
        }
    }

    #[test]
    fn identical_content_has_identical_signature() {
        assert_eq!(mesh().signature(), mesh().signature());
    }

    #[test]
    fn signature_reflects_classification() {
        let mut other = mesh();
        other.area_types[0] = AreaType::Door;
        assert_ne!(mesh().signature(), other.signature());
    }

    #[test]
    fn vertical_bounds_span_the_geometry() {
        assert_eq!(mesh().vertical_bounds(), Some((0.25, 0.5)));
        assert_eq!(InputMesh::default().vertical_bounds(), None);
    }

    #[test]
    fn agent_extents_compare_by_bits() {
        let a = AgentHalfExtents { radius: 0.5, height: 1.0 };
        let b = AgentHalfExtents { radius: 0.5, height: 1.0 };
        assert_eq!(a, b);
        assert_ne!(
            a,
            AgentHalfExtents { radius: 0.5, height: 1.5 }
        );
    }
}
