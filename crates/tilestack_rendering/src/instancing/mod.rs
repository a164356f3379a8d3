//! GPU instancing for tile layers.
//!
//! ## Key Concepts
//!
//! - **Instance record**: grid offset, atlas depth and visibility per cell
//! - **Batch**: one record per cell of a layer for one atlas resource
//! - **Quad template**: 4 vertices / 6 indices shared by every draw

mod batch;
mod instance;

pub use batch::Batch;
pub use instance::{QuadVertex, TileInstance, QUAD_INDICES, QUAD_VERTICES};
