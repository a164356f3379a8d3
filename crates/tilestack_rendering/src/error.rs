//! # Rendering Error Types
//!
//! Atlas errors are startup-fatal. Layer errors are caught by the view,
//! which tears the affected layer down and keeps drawing the others.

use std::path::PathBuf;

use thiserror::Error;
use tilestack_shared::{ConfigError, GridError, TileError, TileId};

/// Errors raised while building or querying the atlas registry.
#[derive(Error, Debug)]
pub enum AtlasError {
    /// A registered tile has no texture.
    #[error("tile {tile_id} ({name}) has no texture")]
    UnknownTile {
        /// Tile without a texture.
        tile_id: TileId,
        /// Its registered name.
        name: String,
    },

    /// A tile id outside the registry was resolved.
    #[error("tile {0} is not registered")]
    UnregisteredTile(TileId),

    /// Fixed-capacity mode needs more arrays than allowed.
    #[error(
        "{tile_count} tile textures need more than {max_arrays} arrays of {layers_per_array} layers"
    )]
    CapacityExceeded {
        /// Textures to place.
        tile_count: usize,
        /// Layers per array.
        layers_per_array: u32,
        /// Arrays allowed.
        max_arrays: usize,
    },

    /// The requested mode is not available on this backend.
    #[error("atlas mode unsupported: {0}")]
    UnsupportedMode(String),

    /// No texture files were found.
    #[error("no tile textures found in {0}")]
    NoTextures(PathBuf),

    /// Textures in one atlas must share a size.
    #[error("texture {name} is {actual:?}, expected {expected:?}")]
    ImageSizeMismatch {
        /// Offending texture.
        name: String,
        /// Size of the first texture.
        expected: (u32, u32),
        /// Size of this texture.
        actual: (u32, u32),
    },

    /// A texture directory could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path that failed.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A texture file could not be decoded.
    #[error("failed to decode {path}: {source}")]
    Image {
        /// Path that failed.
        path: PathBuf,
        /// Underlying decode error.
        #[source]
        source: image::ImageError,
    },
}

/// Result type for atlas operations.
pub type AtlasResult<T> = Result<T, AtlasError>;

/// Errors raised by a [`GpuBackend`](crate::backend::GpuBackend).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backend refused a new instance buffer.
    #[error("out of GPU memory: requested {requested} bytes with {live} buffers live")]
    OutOfMemory {
        /// Bytes requested.
        requested: u64,
        /// Buffers alive at the time.
        live: usize,
    },

    /// More instances than the buffer was created for.
    #[error("{len} instances exceed buffer capacity {capacity}")]
    CapacityOverflow {
        /// Buffer capacity.
        capacity: usize,
        /// Instances supplied.
        len: usize,
    },

    /// The instance buffer was already disposed.
    #[error("instance buffer already released")]
    Released,

    /// A draw referenced an atlas resource the backend does not hold.
    #[error("unknown atlas resource {0}")]
    UnknownAtlasResource(u32),

    /// Drawing before textures were installed.
    #[error("no atlas installed")]
    AtlasNotInstalled,

    /// Too many draws queued in one frame.
    #[error("draw limit of {0} per frame reached")]
    TooManyDraws(usize),

    /// The device cannot hold the atlas as laid out.
    #[error("unsupported by this device: {0}")]
    Unsupported(String),

    /// No suitable GPU adapter.
    #[error("no GPU adapter available")]
    AdapterUnavailable,

    /// The adapter refused to create a device.
    #[error("failed to create device: {0}")]
    RequestDevice(String),

    /// Pixel readback failed.
    #[error("readback failed: {0}")]
    Readback(String),
}

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors that tear down one layer.
#[derive(Error, Debug)]
pub enum LayerError {
    /// A cell's atlas resource has no batch and none could be created.
    #[error("layer {layer} has no batch for atlas resource {atlas_resource}")]
    StaleBatchReference {
        /// Layer index.
        layer: usize,
        /// Missing resource.
        atlas_resource: u32,
    },

    /// Creating a batch failed.
    #[error("layer {layer} failed to create batch for atlas resource {atlas_resource}: {source}")]
    BatchCreation {
        /// Layer index.
        layer: usize,
        /// Resource of the batch.
        atlas_resource: u32,
        /// Backend failure.
        #[source]
        source: BackendError,
    },

    /// Uploading or drawing a batch failed.
    #[error("layer {layer} backend failure: {source}")]
    Backend {
        /// Layer index.
        layer: usize,
        /// Backend failure.
        #[source]
        source: BackendError,
    },

    /// A cell update fell outside the layer.
    #[error("cell ({x}, {y}) is outside layer {layer}")]
    CellOutOfBounds {
        /// Layer index.
        layer: usize,
        /// Column.
        x: usize,
        /// Row.
        y: usize,
    },

    /// A cell referenced a tile without an atlas slot.
    #[error("layer {layer}: {source}")]
    Atlas {
        /// Layer index.
        layer: usize,
        /// Atlas failure.
        #[source]
        source: AtlasError,
    },
}

/// Result type for layer operations.
pub type LayerResult<T> = Result<T, LayerError>;

/// Errors raised by the [`View`](crate::view::View).
#[derive(Error, Debug)]
pub enum ViewError {
    /// Volume dimensions are invalid or do not match.
    #[error(transparent)]
    Grid(#[from] GridError),

    /// The volume holds an unregistered tile.
    #[error(transparent)]
    Tile(#[from] TileError),

    /// The volume holds a tile without an atlas slot.
    #[error(transparent)]
    Atlas(#[from] AtlasError),

    /// Configuration could not produce a render context.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for view operations.
pub type ViewResult<T> = Result<T, ViewError>;

/// Errors raised while decoding or streaming two-tone frames.
#[derive(Error, Debug)]
pub enum FeedError {
    /// A frame directory or file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path that failed.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A frame could not be decoded.
    #[error("failed to decode frame {path}: {source}")]
    Image {
        /// Path that failed.
        path: PathBuf,
        /// Underlying decode error.
        #[source]
        source: image::ImageError,
    },

    /// The directory holds no frames.
    #[error("no frames found in {0}")]
    NoFrames(PathBuf),
}

/// Result type for frame feed operations.
pub type FeedResult<T> = Result<T, FeedError>;
