//! GPU backends.
//!
//! The layer and batch code talks to the GPU only through [`GpuBackend`].
//! An instance buffer is an owned handle: dropping it releases its storage,
//! and [`GpuBackend::dispose`] consumes it explicitly.
//!
//! - [`HeadlessBackend`]: records uploads and draws in memory
//! - [`WgpuBackend`]: renders offscreen with wgpu

mod headless;
mod wgpu_backend;

pub use headless::{HeadlessBackend, HeadlessBuffer};
pub use wgpu_backend::{WgpuBackend, WgpuInstanceBuffer, MAX_DRAWS_PER_FRAME};

use crate::atlas::Capabilities;
use crate::error::BackendResult;
use crate::instancing::TileInstance;

/// One instanced draw of the quad template.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawCall {
    /// Atlas resource to sample from.
    pub atlas_resource: u32,
    /// Draw-order position of the batch.
    pub position_z: f32,
    /// Instances to draw.
    pub instance_count: u32,
}

/// The operations the renderer needs from a GPU.
pub trait GpuBackend {
    /// Owned handle to GPU-resident instance storage.
    type InstanceBuffer;

    /// Texture capabilities used to pick the atlas mode.
    fn capabilities(&self) -> Capabilities;

    /// Allocates storage for `capacity` instances.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`](crate::error::BackendError) if the
    /// allocation fails.
    fn create_instance_buffer(&mut self, capacity: usize) -> BackendResult<Self::InstanceBuffer>;

    /// Replaces the buffer's contents.
    ///
    /// # Errors
    ///
    /// Fails if `instances` exceeds the buffer's capacity.
    fn upload(&mut self, buffer: &Self::InstanceBuffer, instances: &[TileInstance]) -> BackendResult<()>;

    /// Draws the quad template once per instance.
    ///
    /// # Errors
    ///
    /// Fails if the atlas resource is unknown or the frame is full.
    fn draw_instanced(&mut self, buffer: &Self::InstanceBuffer, call: DrawCall) -> BackendResult<()>;

    /// Releases the buffer.
    fn dispose(&mut self, buffer: Self::InstanceBuffer);
}
