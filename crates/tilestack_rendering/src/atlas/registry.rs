//! Tile id to atlas slot assignment.

use std::collections::BTreeSet;

use tilestack_shared::{TileId, TileRegistry};

use super::capabilities::AtlasMode;
use super::source::{TextureImage, TextureSource};
use crate::error::{AtlasError, AtlasResult};

/// Where a tile's texture lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtlasSlot {
    /// Depth inside the single open-ended resource.
    SingleResource {
        /// Texture index.
        depth: u32,
    },
    /// Layer inside one of the fixed-capacity arrays.
    FixedArray {
        /// Array index (the atlas resource id).
        array: u32,
        /// Layer within the array.
        layer: u32,
    },
}

impl AtlasSlot {
    /// Atlas resource holding the texture.
    #[inline]
    #[must_use]
    pub const fn resource_id(self) -> u32 {
        match self {
            Self::SingleResource { .. } => 0,
            Self::FixedArray { array, .. } => array,
        }
    }

    /// Index of the texture inside its resource.
    #[inline]
    #[must_use]
    pub const fn depth_index(self) -> u32 {
        match self {
            Self::SingleResource { depth } => depth,
            Self::FixedArray { layer, .. } => layer,
        }
    }
}

/// One texture inside an atlas resource.
#[derive(Debug, Clone)]
pub struct AtlasEntry {
    /// Tile the texture belongs to.
    pub tile: TileId,
    /// Decoded texture.
    pub image: TextureImage,
}

/// One GPU texture resource and its contents in depth order.
#[derive(Debug, Clone)]
pub struct AtlasResource {
    /// Resource id.
    pub id: u32,
    /// Textures, index = depth.
    pub entries: Vec<AtlasEntry>,
}

/// Immutable tile to `(atlas resource, depth)` table.
#[derive(Debug, Clone)]
pub struct AtlasRegistry {
    mode: AtlasMode,
    slots: Vec<Option<AtlasSlot>>,
    resources: Vec<AtlasResource>,
    texture_size: Option<(u32, u32)>,
}

impl AtlasRegistry {
    /// Loads textures and assigns every registered tile a slot.
    ///
    /// Textures whose name matches no tile are skipped with a warning.
    /// Air never needs a texture; it resolves to depth 0 of resource 0.
    ///
    /// # Errors
    ///
    /// - [`AtlasError::UnknownTile`] if a non-air tile has no texture
    /// - [`AtlasError::CapacityExceeded`] if fixed-capacity mode needs
    ///   more arrays than allowed
    /// - [`AtlasError::ImageSizeMismatch`] if the textures differ in size
    /// - any error from the texture source
    pub fn build(tiles: &TileRegistry, source: &dyn TextureSource, mode: AtlasMode) -> AtlasResult<Self> {
        let images = source.load_textures()?;
        if images.is_empty() && tiles.len() > 1 {
            return Err(AtlasError::NoTextures(source.location()));
        }

        let mut matched: Vec<AtlasEntry> = Vec::with_capacity(tiles.len());
        for image in images {
            match tiles.id_of(&image.name) {
                Some(tile) if tile.is_air() => {
                    tracing::debug!(texture = %image.name, "Ignoring texture for air");
                }
                Some(tile) if matched.iter().any(|entry| entry.tile == tile) => {
                    tracing::warn!(texture = %image.name, "Duplicate texture for tile, skipping");
                }
                Some(tile) => matched.push(AtlasEntry { tile, image }),
                None => {
                    tracing::warn!(texture = %image.name, "Texture matches no tile, skipping");
                }
            }
        }

        let texture_size = matched.first().map(|entry| entry.image.size());
        if let Some(expected) = texture_size {
            if let Some(entry) = matched.iter().find(|entry| entry.image.size() != expected) {
                return Err(AtlasError::ImageSizeMismatch {
                    name: entry.image.name.clone(),
                    expected,
                    actual: entry.image.size(),
                });
            }
        }

        for (tile, desc) in tiles.iter().skip(1) {
            if !matched.iter().any(|entry| entry.tile == tile) {
                return Err(AtlasError::UnknownTile { tile_id: tile, name: desc.name.clone() });
            }
        }

        let (slots, resources) = assign(tiles.len(), matched, mode)?;
        let registry = Self { mode, slots, resources, texture_size };
        tracing::info!(
            mode = ?registry.mode,
            resources = registry.resource_count(),
            tiles = tiles.len(),
            "Atlas registry built"
        );
        Ok(registry)
    }

    /// Slot of `tile`.
    ///
    /// # Errors
    ///
    /// Returns [`AtlasError::UnregisteredTile`] for ids outside the table.
    #[inline]
    pub fn resolve(&self, tile: TileId) -> AtlasResult<AtlasSlot> {
        self.slots
            .get(tile.index())
            .copied()
            .flatten()
            .ok_or(AtlasError::UnregisteredTile(tile))
    }

    /// The atlas resources referenced by a set of tiles.
    ///
    /// # Errors
    ///
    /// Returns [`AtlasError::UnregisteredTile`] for any unknown id.
    pub fn distinct_resources(&self, tiles: impl IntoIterator<Item = TileId>) -> AtlasResult<BTreeSet<u32>> {
        tiles
            .into_iter()
            .map(|tile| self.resolve(tile).map(AtlasSlot::resource_id))
            .collect()
    }

    /// Mode the registry was built for.
    #[must_use]
    pub const fn mode(&self) -> AtlasMode {
        self.mode
    }

    /// Resources in id order.
    #[must_use]
    pub fn resources(&self) -> &[AtlasResource] {
        &self.resources
    }

    /// Number of atlas resources.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    /// Shared texture size, if any texture was loaded.
    #[must_use]
    pub const fn texture_size(&self) -> Option<(u32, u32)> {
        self.texture_size
    }
}

fn air_slot(mode: AtlasMode) -> AtlasSlot {
    match mode {
        AtlasMode::SingleResource => AtlasSlot::SingleResource { depth: 0 },
        AtlasMode::FixedCapacity { .. } => AtlasSlot::FixedArray { array: 0, layer: 0 },
    }
}

fn assign(
    tile_count: usize,
    matched: Vec<AtlasEntry>,
    mode: AtlasMode,
) -> AtlasResult<(Vec<Option<AtlasSlot>>, Vec<AtlasResource>)> {
    let mut slots = vec![None; tile_count];
    if let Some(air) = slots.first_mut() {
        *air = Some(air_slot(mode));
    }

    let resources = match mode {
        AtlasMode::SingleResource => {
            for (entry, depth) in matched.iter().zip(0u32..) {
                slots[entry.tile.index()] = Some(AtlasSlot::SingleResource { depth });
            }
            if matched.is_empty() {
                Vec::new()
            } else {
                vec![AtlasResource { id: 0, entries: matched }]
            }
        }
        AtlasMode::FixedCapacity { layers_per_array, max_arrays } => {
            let capacity = layers_per_array as usize;
            if capacity == 0 || matched.len().div_ceil(capacity) > max_arrays {
                return Err(AtlasError::CapacityExceeded {
                    tile_count: matched.len(),
                    layers_per_array,
                    max_arrays,
                });
            }

            let mut resources: Vec<AtlasResource> = Vec::new();
            for (ordinal, entry) in matched.into_iter().enumerate() {
                let (array, layer) = (ordinal / capacity, ordinal % capacity);
                #[allow(clippy::cast_possible_truncation)]
                let slot = AtlasSlot::FixedArray { array: array as u32, layer: layer as u32 };
                slots[entry.tile.index()] = Some(slot);
                if layer == 0 {
                    resources.push(AtlasResource { id: slot.resource_id(), entries: Vec::new() });
                }
                if let Some(resource) = resources.last_mut() {
                    resource.entries.push(entry);
                }
            }
            resources
        }
    };
    Ok((slots, resources))
}
