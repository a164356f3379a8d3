//! Texture atlas assignment.
//!
//! Every tile type resolves to an [`AtlasSlot`]: which atlas resource its
//! texture lives in and at which depth. The registry is built once at
//! startup and never changes.
//!
//! ## Modes
//!
//! - **Single resource**: one open-ended resource, depth = load order
//! - **Fixed capacity**: texture arrays of `layers_per_array`, filled in
//!   filename order

mod capabilities;
mod registry;
mod source;

pub use capabilities::{AtlasMode, Capabilities};
pub use registry::{AtlasEntry, AtlasRegistry, AtlasResource, AtlasSlot};
pub use source::{DirectoryTextureSource, MemoryTextureSource, TextureImage, TextureSource};
