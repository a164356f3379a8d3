//! # TILESTACK Shared
//!
//! GPU-free types shared by the renderer, the CLI and tests:
//!
//! - [`Grid2D`] / [`Grid3D`]: dense, bounds-checked grids
//! - [`TileId`] / [`TileRegistry`]: tile types and their opacity
//! - [`Volume`]: the layered tile volume, plus fixture and frame sources
//! - [`TilestackConfig`]: TOML configuration loaded once at startup
//!
//! ## Rule
//!
//! Nothing in here may depend on wgpu.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod grid;
pub mod tile;
pub mod volume;

pub use config::{AtlasConfig, AtlasModeSetting, TilestackConfig, ViewConfig};
pub use error::{ConfigError, ConfigResult, GridError, GridResult, TileError, TileResult};
pub use grid::{Grid2D, Grid3D};
pub use tile::{TileId, TileRegistry, TileTypeDescriptor};
pub use volume::{two_tone_to_volume, FramePacer, RandomVolume, TwoToneFrame, Volume};
