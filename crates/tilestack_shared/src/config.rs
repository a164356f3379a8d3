//! # Configuration
//!
//! Loaded once at startup from TOML. Every section has defaults, so an
//! empty file is a valid configuration.
//!
//! ```toml
//! [atlas]
//! texture_dir = "assets/tiles"
//! mode = "auto"        # auto | single | fixed
//! max_arrays = 16
//!
//! [view]
//! idle_timeout_ms = 1000
//! tile_size = 1.0
//!
//! [[tiles]]
//! name = "air"
//! opaque = false
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::tile::{TileRegistry, TileTypeDescriptor};

/// How tile textures are addressed on the GPU.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AtlasModeSetting {
    /// Pick from the backend's capabilities.
    #[default]
    Auto,
    /// One open-ended resource holding every tile texture.
    Single,
    /// Fixed-capacity texture arrays.
    Fixed,
}

/// `[atlas]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtlasConfig {
    /// Directory of `<tile name>.png` files.
    pub texture_dir: PathBuf,
    /// Addressing mode.
    pub mode: AtlasModeSetting,
    /// Texture arrays allowed in fixed-capacity mode.
    pub max_arrays: usize,
    /// Overrides the backend-reported layers per array.
    pub layers_per_array: Option<u32>,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            texture_dir: PathBuf::from("assets/tiles"),
            mode: AtlasModeSetting::Auto,
            max_arrays: 16,
            layers_per_array: None,
        }
    }
}

/// `[view]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    /// Idle time before an undrawn layer is evicted.
    pub idle_timeout_ms: u64,
    /// Initial layer cursor. Defaults to the top layer.
    pub start_layer: Option<usize>,
    /// World units per tile.
    pub tile_size: f32,
    /// Draw-position step between layers.
    pub layer_z_stride: f32,
    /// Draw-position step between batches of one layer.
    pub batch_z_stride: f32,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: 1000,
            start_layer: None,
            tile_size: 1.0,
            layer_z_stride: 2.0,
            batch_z_stride: 0.15,
        }
    }
}

impl ViewConfig {
    /// Idle timeout as a `Duration`.
    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TilestackConfig {
    /// Texture atlas settings.
    pub atlas: AtlasConfig,
    /// View settings.
    pub view: ViewConfig,
    /// Tile types in id order. Empty means the built-in list.
    pub tiles: Vec<TileTypeDescriptor>,
}

impl TilestackConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise
    /// the errors of [`Self::from_toml_str`].
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first bad value.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.atlas.max_arrays == 0 {
            return Err(ConfigError::Invalid("atlas.max_arrays must be at least 1".into()));
        }
        if self.atlas.layers_per_array == Some(0) {
            return Err(ConfigError::Invalid("atlas.layers_per_array must be at least 1".into()));
        }
        if !(self.view.tile_size.is_finite() && self.view.tile_size > 0.0) {
            return Err(ConfigError::Invalid("view.tile_size must be positive".into()));
        }
        if !self.view.layer_z_stride.is_finite() || !self.view.batch_z_stride.is_finite() {
            return Err(ConfigError::Invalid("view z strides must be finite".into()));
        }
        Ok(())
    }

    /// Builds the tile registry from `[[tiles]]`, or the built-in list.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Tile`] if the list is not a valid registry.
    pub fn tile_registry(&self) -> ConfigResult<TileRegistry> {
        if self.tiles.is_empty() {
            return Ok(TileRegistry::builtin());
        }
        Ok(TileRegistry::from_descriptors(self.tiles.clone())?)
    }
}
