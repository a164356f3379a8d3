//! Backend capability probe and atlas mode selection.

use tilestack_shared::AtlasModeSetting;

use crate::error::{AtlasError, AtlasResult};

/// What the rendering backend can do with textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Textures can be addressed by index from one binding (binding arrays).
    pub resident_texture_handles: bool,
    /// Layers per texture array.
    pub max_array_layers: u32,
}

impl Capabilities {
    /// Capabilities of the headless recording backend.
    #[must_use]
    pub const fn headless() -> Self {
        Self {
            resident_texture_handles: true,
            max_array_layers: 256,
        }
    }

    /// Chooses the atlas mode for a configured setting.
    ///
    /// # Errors
    ///
    /// Returns [`AtlasError::UnsupportedMode`] if single-resource mode is
    /// forced on a backend without resident handles.
    pub fn atlas_mode(
        &self,
        setting: AtlasModeSetting,
        max_arrays: usize,
        layers_override: Option<u32>,
    ) -> AtlasResult<AtlasMode> {
        let fixed = AtlasMode::FixedCapacity {
            layers_per_array: layers_override
                .map_or(self.max_array_layers, |layers| layers.min(self.max_array_layers)),
            max_arrays,
        };
        match setting {
            AtlasModeSetting::Auto if self.resident_texture_handles => Ok(AtlasMode::SingleResource),
            AtlasModeSetting::Auto | AtlasModeSetting::Fixed => Ok(fixed),
            AtlasModeSetting::Single if self.resident_texture_handles => Ok(AtlasMode::SingleResource),
            AtlasModeSetting::Single => Err(AtlasError::UnsupportedMode(
                "single-resource atlas needs texture binding arrays".into(),
            )),
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::headless()
    }
}

/// How tile textures are grouped into atlas resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtlasMode {
    /// Every tile lives in resource 0.
    SingleResource,
    /// Tiles fill fixed-size texture arrays in order.
    FixedCapacity {
        /// Layers per array.
        layers_per_array: u32,
        /// Arrays allowed.
        max_arrays: usize,
    },
}
