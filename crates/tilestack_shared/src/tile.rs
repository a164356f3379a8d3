//! Tile types.
//!
//! A [`TileId`] is an index into the [`TileRegistry`]. Id 0 is always air.
//! Whether a tile blocks the view of the layers below it comes from
//! [`TileTypeDescriptor::opaque`], never from the id itself.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{TileError, TileResult};
use crate::grid::Grid3D;

/// Tile type id (16-bit).
#[repr(transparent)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TileId(pub u16);

impl TileId {
    /// Air (always ID 0). Never drawn.
    pub const AIR: Self = Self(0);

    /// Creates a new tile ID.
    #[inline]
    #[must_use]
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    /// Returns the raw ID.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Returns the ID as a table index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// True for air.
    #[inline]
    #[must_use]
    pub const fn is_air(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Static description of one tile type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileTypeDescriptor {
    /// Name. Texture files are matched against it by file stem.
    pub name: String,
    /// Blocks the view of everything below it.
    #[serde(default = "default_opaque")]
    pub opaque: bool,
}

const fn default_opaque() -> bool {
    true
}

impl TileTypeDescriptor {
    /// An opaque tile type.
    #[must_use]
    pub fn opaque(name: impl Into<String>) -> Self {
        Self { name: name.into(), opaque: true }
    }

    /// A tile type the layers below show through.
    #[must_use]
    pub fn see_through(name: impl Into<String>) -> Self {
        Self { name: name.into(), opaque: false }
    }
}

/// Built-in tile list: `(name, opaque)`, index = id.
pub const BUILTIN_TILES: &[(&str, bool)] = &[
    ("air", false),
    ("dirt", true),
    ("sand", true),
    ("stone", true),
    ("spruce_leaves", true),
    ("grass", true),
    ("water", true),
    ("oak_planks", true),
    ("glass", false),
];

/// Ordered set of tile types, created once at startup.
#[derive(Debug, Clone)]
pub struct TileRegistry {
    descriptors: Vec<TileTypeDescriptor>,
    by_name: HashMap<String, TileId>,
}

impl Default for TileRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TileRegistry {
    /// The built-in registry from [`BUILTIN_TILES`].
    #[must_use]
    pub fn builtin() -> Self {
        let descriptors: Vec<TileTypeDescriptor> = BUILTIN_TILES
            .iter()
            .map(|&(name, opaque)| TileTypeDescriptor { name: name.to_owned(), opaque })
            .collect();
        let by_name = descriptors
            .iter()
            .zip(0u16..)
            .map(|(desc, id)| (desc.name.clone(), TileId(id)))
            .collect();
        Self { descriptors, by_name }
    }

    /// Builds a registry where each descriptor's position is its id.
    ///
    /// # Errors
    ///
    /// - [`TileError::EmptyRegistry`] for an empty list
    /// - [`TileError::AirNotTransparent`] if id 0 is opaque
    /// - [`TileError::DuplicateName`] if two tiles share a name
    /// - [`TileError::TooManyTiles`] past the 16-bit id range
    pub fn from_descriptors(descriptors: Vec<TileTypeDescriptor>) -> TileResult<Self> {
        let air = descriptors.first().ok_or(TileError::EmptyRegistry)?;
        if air.opaque {
            return Err(TileError::AirNotTransparent(air.name.clone()));
        }
        if descriptors.len() > usize::from(u16::MAX) + 1 {
            return Err(TileError::TooManyTiles(descriptors.len()));
        }

        let mut by_name = HashMap::with_capacity(descriptors.len());
        for (desc, id) in descriptors.iter().zip(0u16..) {
            if by_name.insert(desc.name.clone(), TileId(id)).is_some() {
                return Err(TileError::DuplicateName(desc.name.clone()));
            }
        }
        Ok(Self { descriptors, by_name })
    }

    /// Descriptor for `id`.
    #[inline]
    #[must_use]
    pub fn get(&self, id: TileId) -> Option<&TileTypeDescriptor> {
        self.descriptors.get(id.index())
    }

    /// Id registered under `name`.
    #[must_use]
    pub fn id_of(&self, name: &str) -> Option<TileId> {
        self.by_name.get(name).copied()
    }

    /// Name of `id`.
    #[must_use]
    pub fn name_of(&self, id: TileId) -> Option<&str> {
        self.get(id).map(|desc| desc.name.as_str())
    }

    /// Looks up a name, failing on unknown names.
    ///
    /// # Errors
    ///
    /// Returns [`TileError::UnknownName`] if nothing is registered under `name`.
    pub fn require(&self, name: &str) -> TileResult<TileId> {
        self.id_of(name).ok_or_else(|| TileError::UnknownName(name.to_owned()))
    }

    /// True if `id` blocks the layers below. Unknown ids count as opaque.
    #[inline]
    #[must_use]
    pub fn is_opaque(&self, id: TileId) -> bool {
        self.get(id).map_or(true, |desc| desc.opaque)
    }

    /// True if `id` has a descriptor.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: TileId) -> bool {
        id.index() < self.descriptors.len()
    }

    /// Number of tile types, air included.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// True if no tile types are registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Iterates `(id, descriptor)` in id order.
    pub fn iter(&self) -> impl Iterator<Item = (TileId, &TileTypeDescriptor)> {
        self.descriptors.iter().zip(0u16..).map(|(desc, id)| (TileId(id), desc))
    }

    /// Checks that every cell of a volume names a registered tile.
    ///
    /// # Errors
    ///
    /// Returns [`TileError::UnknownTile`] for the first unregistered id.
    pub fn validate_volume(&self, volume: &Grid3D<TileId>) -> TileResult<()> {
        match volume.cells().iter().find(|id| !self.contains(**id)) {
            Some(&id) => Err(TileError::UnknownTile(id)),
            None => Ok(()),
        }
    }
}
