//! One instanced draw per atlas resource.
//!
//! A batch holds one [`TileInstance`] per cell of its layer, whether or not
//! the cell belongs to it, so every cell index stays addressable. A cell
//! is *owned* by the batch whose atlas resource holds the cell's tile;
//! records of cells owned elsewhere are hidden.

use super::instance::TileInstance;
use crate::backend::{DrawCall, GpuBackend};
use crate::error::{BackendError, BackendResult};

/// GPU-facing instance batch for one `(layer, atlas resource)` pair.
pub struct Batch<B: GpuBackend> {
    atlas_resource: u32,
    instances: Vec<TileInstance>,
    owned: Vec<bool>,
    owned_count: usize,
    visible_count: usize,
    position_z: f32,
    dirty: bool,
    buffer: Option<B::InstanceBuffer>,
}

impl<B: GpuBackend> Batch<B> {
    /// Allocates a batch of `capacity` hidden, unowned records.
    ///
    /// `width` lays the records out row-major so each carries its cell
    /// offset.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the instance buffer cannot be created.
    pub fn new(backend: &mut B, atlas_resource: u32, width: usize, capacity: usize) -> BackendResult<Self> {
        let buffer = backend.create_instance_buffer(capacity)?;
        let width = width.max(1);
        let instances = (0..capacity)
            .map(|i| TileInstance::hidden(i % width, i / width))
            .collect();
        tracing::debug!(atlas_resource, capacity, "Created batch");
        Ok(Self {
            atlas_resource,
            instances,
            owned: vec![false; capacity],
            owned_count: 0,
            visible_count: 0,
            position_z: 0.0,
            dirty: true,
            buffer: Some(buffer),
        })
    }

    /// Writes one record in memory. Nothing is uploaded.
    ///
    /// Out-of-range indices and unchanged records are ignored.
    #[inline]
    pub fn set_instance(&mut self, index: usize, record: TileInstance) {
        let Some(slot) = self.instances.get_mut(index) else {
            return;
        };
        if *slot == record {
            return;
        }
        match (slot.is_visible(), record.is_visible()) {
            (false, true) => self.visible_count += 1,
            (true, false) => self.visible_count -= 1,
            _ => {}
        }
        *slot = record;
        self.dirty = true;
    }

    /// Takes ownership of a cell and writes its record.
    pub fn claim(&mut self, index: usize, record: TileInstance) {
        if let Some(owned) = self.owned.get_mut(index) {
            if !*owned {
                *owned = true;
                self.owned_count += 1;
            }
            self.set_instance(index, record);
        }
    }

    /// Gives up a cell and hides its record.
    pub fn release(&mut self, index: usize) {
        if let Some(owned) = self.owned.get_mut(index) {
            if *owned {
                *owned = false;
                self.owned_count -= 1;
            }
            let hidden = self.instances[index].with_hidden();
            self.set_instance(index, hidden);
        }
    }

    /// Pushes the whole record array to the GPU if anything changed.
    ///
    /// # Errors
    ///
    /// Returns the backend error on failure, or [`BackendError::Released`]
    /// after [`Self::dispose`].
    pub fn upload(&mut self, backend: &mut B) -> BackendResult<()> {
        if !self.dirty {
            return Ok(());
        }
        let buffer = self.buffer.as_ref().ok_or(BackendError::Released)?;
        backend.upload(buffer, &self.instances)?;
        self.dirty = false;
        Ok(())
    }

    /// Issues one instanced draw of `instance_count` records.
    ///
    /// # Errors
    ///
    /// Returns the backend error on failure.
    pub fn draw(&self, backend: &mut B, instance_count: u32) -> BackendResult<()> {
        let buffer = self.buffer.as_ref().ok_or(BackendError::Released)?;
        backend.draw_instanced(
            buffer,
            DrawCall {
                atlas_resource: self.atlas_resource,
                position_z: self.position_z,
                instance_count,
            },
        )
    }

    /// Releases the GPU buffer. Safe to call more than once.
    pub fn dispose(&mut self, backend: &mut B) {
        if let Some(buffer) = self.buffer.take() {
            tracing::trace!(atlas_resource = self.atlas_resource, "Disposing batch");
            backend.dispose(buffer);
        }
    }

    /// Atlas resource this batch draws from.
    #[inline]
    #[must_use]
    pub const fn atlas_resource(&self) -> u32 {
        self.atlas_resource
    }

    /// Fixed record count.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.instances.len()
    }

    /// Records in cell order.
    #[inline]
    #[must_use]
    pub fn instances(&self) -> &[TileInstance] {
        &self.instances
    }

    /// True if the batch owns cell `index`.
    #[inline]
    #[must_use]
    pub fn owns(&self, index: usize) -> bool {
        self.owned.get(index).copied().unwrap_or(false)
    }

    /// Cells owned by this batch.
    #[inline]
    #[must_use]
    pub const fn owned_count(&self) -> usize {
        self.owned_count
    }

    /// Records currently drawn.
    #[inline]
    #[must_use]
    pub const fn visible_count(&self) -> usize {
        self.visible_count
    }

    /// True if records changed since the last upload.
    #[inline]
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// True once the GPU buffer has been released.
    #[inline]
    #[must_use]
    pub const fn is_disposed(&self) -> bool {
        self.buffer.is_none()
    }

    /// Draw-order position.
    #[inline]
    #[must_use]
    pub const fn position_z(&self) -> f32 {
        self.position_z
    }

    /// Sets the draw-order position.
    #[inline]
    pub fn set_position_z(&mut self, position_z: f32) {
        self.position_z = position_z;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;

    #[test]
    fn test_new_batch_is_hidden_and_addressable() {
        let mut backend = HeadlessBackend::default();
        let batch = Batch::new(&mut backend, 2, 3, 6).unwrap();
        assert_eq!(batch.capacity(), 6);
        assert_eq!(batch.visible_count(), 0);
        assert_eq!(batch.instances()[4].grid_offset, [1.0, 1.0]);
        assert!(batch.is_dirty());
    }

    #[test]
    fn test_claim_release_counts() {
        let mut backend = HeadlessBackend::default();
        let mut batch = Batch::new(&mut backend, 0, 2, 4).unwrap();
        batch.claim(1, TileInstance::new(1, 0, 3, true));
        batch.claim(2, TileInstance::new(0, 1, 3, false));
        assert_eq!(batch.owned_count(), 2);
        assert_eq!(batch.visible_count(), 1);

        batch.release(1);
        assert!(!batch.owns(1));
        assert_eq!(batch.owned_count(), 1);
        assert_eq!(batch.visible_count(), 0);
        assert_eq!(batch.instances()[1], TileInstance::hidden(1, 0));
    }

    #[test]
    fn test_upload_only_when_dirty() {
        let mut backend = HeadlessBackend::default();
        let mut batch = Batch::new(&mut backend, 0, 1, 1).unwrap();
        batch.upload(&mut backend).unwrap();
        batch.upload(&mut backend).unwrap();
        assert_eq!(backend.upload_count(), 1);

        batch.set_instance(0, TileInstance::new(0, 0, 1, true));
        batch.upload(&mut backend).unwrap();
        assert_eq!(backend.upload_count(), 2);
    }

    #[test]
    fn test_rewriting_same_record_stays_clean() {
        let mut backend = HeadlessBackend::default();
        let mut batch = Batch::new(&mut backend, 0, 2, 2).unwrap();
        batch.claim(0, TileInstance::new(0, 0, 2, true));
        batch.upload(&mut backend).unwrap();
        assert!(!batch.is_dirty());

        batch.claim(0, TileInstance::new(0, 0, 2, true));
        assert!(!batch.is_dirty());
        assert_eq!(batch.visible_count(), 1);
        batch.upload(&mut backend).unwrap();
        assert_eq!(backend.upload_count(), 1);
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let mut backend = HeadlessBackend::default();
        let mut batch = Batch::new(&mut backend, 0, 1, 1).unwrap();
        batch.dispose(&mut backend);
        batch.dispose(&mut backend);
        assert!(batch.is_disposed());
        assert_eq!(backend.released_buffers(), 1);
        assert!(batch.draw(&mut backend, 1).is_err());
    }

    #[test]
    fn test_drop_releases_buffer() {
        let mut backend = HeadlessBackend::default();
        {
            let _batch = Batch::new(&mut backend, 0, 1, 1).unwrap();
            assert_eq!(backend.live_buffers(), 1);
        }
        assert_eq!(backend.live_buffers(), 0);
    }

    #[test]
    fn test_draw_carries_position() {
        let mut backend = HeadlessBackend::default();
        let mut batch = Batch::new(&mut backend, 4, 2, 2).unwrap();
        batch.set_position_z(2.15);
        batch.draw(&mut backend, 2).unwrap();
        assert_eq!(
            backend.draws(),
            &[DrawCall { atlas_resource: 4, position_z: 2.15, instance_count: 2 }]
        );
    }
}
