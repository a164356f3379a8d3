//! # Shared Error Types
//!
//! Errors raised by grids, the tile registry and configuration loading.

use std::path::PathBuf;

use thiserror::Error;

use crate::tile::TileId;

/// Errors raised by [`Grid2D`](crate::Grid2D) and [`Grid3D`](crate::Grid3D).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GridError {
    /// A cell coordinate fell outside the grid.
    #[error("cell ({x}, {y}) on layer {layer} is outside a {width}x{height}x{depth} grid")]
    OutOfBounds {
        /// Column.
        x: usize,
        /// Row.
        y: usize,
        /// Layer (0 for 2D grids).
        layer: usize,
        /// Grid width.
        width: usize,
        /// Grid height.
        height: usize,
        /// Grid layer count (1 for 2D grids).
        depth: usize,
    },

    /// Bulk data did not match the grid's fixed dimensions.
    #[error("dimension mismatch: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        /// Expected `(width, height, depth)`.
        expected: (usize, usize, usize),
        /// Supplied `(width, height, depth)`.
        actual: (usize, usize, usize),
    },

    /// A grid was requested with a zero-sized dimension.
    #[error("invalid grid dimensions {width}x{height}x{depth}")]
    InvalidDimensions {
        /// Requested width.
        width: usize,
        /// Requested height.
        height: usize,
        /// Requested layer count.
        depth: usize,
    },
}

/// Result type for grid operations.
pub type GridResult<T> = Result<T, GridError>;

/// Errors raised while building or querying the tile registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TileError {
    /// Two descriptors share a name.
    #[error("duplicate tile name: {0}")]
    DuplicateName(String),

    /// The registry has no descriptors at all.
    #[error("tile registry is empty")]
    EmptyRegistry,

    /// Tile id 0 must be the non-opaque air tile.
    #[error("tile 0 ({0}) must be non-opaque air")]
    AirNotTransparent(String),

    /// More descriptors than a 16-bit id can address.
    #[error("too many tile types: {0}")]
    TooManyTiles(usize),

    /// A tile id has no descriptor.
    #[error("unknown tile id {0}")]
    UnknownTile(TileId),

    /// A tile name has no descriptor.
    #[error("unknown tile name: {0}")]
    UnknownName(String),
}

/// Result type for tile registry operations.
pub type TileResult<T> = Result<T, TileError>;

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// Path that failed.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// The `[[tiles]]` list is not a valid registry.
    #[error(transparent)]
    Tile(#[from] TileError),
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;
