//! # TILESTACK Rendering
//!
//! Draws a layered tile volume seen from above, one instanced draw per
//! `(layer, atlas resource)` pair.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         FRAME                               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Volume + cursor → Visibility Resolver → dense layers       │
//! │        ↓                                                    │
//! │  View → LayerBatchManager (per layer) → Batch (per atlas)   │
//! │        ↓                                                    │
//! │  GpuBackend: headless recorder | wgpu offscreen target      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! - The atlas registry is built once at startup and never changes.
//! - Per-cell edits are O(1); each batch uploads at most once per frame.
//! - Layers not drawn for the idle timeout release their GPU buffers.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod atlas;
pub mod backend;
pub mod camera;
pub mod error;
pub mod feed;
pub mod instancing;
pub mod layer;
pub mod view;
pub mod visibility;

pub use atlas::{AtlasMode, AtlasRegistry, AtlasSlot, Capabilities, DirectoryTextureSource, MemoryTextureSource, TextureSource};
pub use backend::{DrawCall, GpuBackend, HeadlessBackend, WgpuBackend};
pub use camera::Camera;
pub use error::{AtlasError, BackendError, FeedError, LayerError, ViewError};
pub use feed::{spawn_directory_loader, FrameFeed, FrameSender};
pub use instancing::{Batch, TileInstance};
pub use layer::{BatchDrawRecord, LayerBatchManager};
pub use view::{FrameReport, FrameStats, LayerDrawRecord, LayerFault, RenderContext, View, ViewSettings};
pub use visibility::{resolve_visible_layers, ResolvedLayer, VisibleCell, VisibleGrid};
