//! Common types shared by the tilenav pipeline and runtime crates.

mod grid;

pub use grid::*;

/// Represents a 3D position in voxelizer space (y-up).
pub type Vec3 = glam::Vec3;

/// Error types for the library
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A configuration value makes the requested structure impossible to
    /// create. Fatal at navmesh-creation time, not per tile.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A pipeline stage failed for one tile. Other tiles are unaffected.
    #[error("tile build failed: {0}")]
    BuildFailure(String),
}

/// Result type for tilenav operations
pub type Result<T> = std::result::Result<T, Error>;
