//! In-memory backend.
//!
//! Keeps the uploaded bytes of every live buffer and a log of draw calls.
//! Buffers release their storage on drop. A buffer limit can be set to
//! make allocations fail on demand.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use super::{DrawCall, GpuBackend};
use crate::atlas::Capabilities;
use crate::error::{BackendError, BackendResult};
use crate::instancing::TileInstance;

#[derive(Debug, Default)]
struct Ledger {
    buffers: BTreeMap<u64, Vec<u8>>,
    next_id: u64,
    created: usize,
    released: usize,
    uploads: usize,
}

/// Handle to a headless instance buffer.
#[derive(Debug)]
pub struct HeadlessBuffer {
    id: u64,
    capacity: usize,
    ledger: Rc<RefCell<Ledger>>,
}

impl HeadlessBuffer {
    /// Buffer id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Instance capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Drop for HeadlessBuffer {
    fn drop(&mut self) {
        let mut ledger = self.ledger.borrow_mut();
        if ledger.buffers.remove(&self.id).is_some() {
            ledger.released += 1;
        }
    }
}

/// Backend that records instead of rendering.
#[derive(Debug)]
pub struct HeadlessBackend {
    capabilities: Capabilities,
    ledger: Rc<RefCell<Ledger>>,
    draws: Vec<DrawCall>,
    buffer_limit: Option<usize>,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new(Capabilities::headless())
    }
}

impl HeadlessBackend {
    /// Creates a backend reporting `capabilities`.
    #[must_use]
    pub fn new(capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            ledger: Rc::new(RefCell::new(Ledger::default())),
            draws: Vec::new(),
            buffer_limit: None,
        }
    }

    /// Caps the number of live buffers; `None` removes the cap.
    pub fn set_buffer_limit(&mut self, limit: Option<usize>) {
        self.buffer_limit = limit;
    }

    /// Buffers currently alive.
    #[must_use]
    pub fn live_buffers(&self) -> usize {
        self.ledger.borrow().buffers.len()
    }

    /// Buffers ever created.
    #[must_use]
    pub fn created_buffers(&self) -> usize {
        self.ledger.borrow().created
    }

    /// Buffers released by dispose or drop.
    #[must_use]
    pub fn released_buffers(&self) -> usize {
        self.ledger.borrow().released
    }

    /// Uploads performed.
    #[must_use]
    pub fn upload_count(&self) -> usize {
        self.ledger.borrow().uploads
    }

    /// Last uploaded bytes of a live buffer.
    #[must_use]
    pub fn buffer_bytes(&self, buffer: &HeadlessBuffer) -> Option<Vec<u8>> {
        self.ledger.borrow().buffers.get(&buffer.id).cloned()
    }

    /// Snapshot of every live buffer's bytes, keyed by id.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<u64, Vec<u8>> {
        self.ledger.borrow().buffers.clone()
    }

    /// Draw calls recorded so far.
    #[must_use]
    pub fn draws(&self) -> &[DrawCall] {
        &self.draws
    }

    /// Returns and clears the draw log.
    pub fn take_draws(&mut self) -> Vec<DrawCall> {
        std::mem::take(&mut self.draws)
    }
}

impl GpuBackend for HeadlessBackend {
    type InstanceBuffer = HeadlessBuffer;

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn create_instance_buffer(&mut self, capacity: usize) -> BackendResult<HeadlessBuffer> {
        let mut ledger = self.ledger.borrow_mut();
        let live = ledger.buffers.len();
        if self.buffer_limit.is_some_and(|limit| live >= limit) {
            return Err(BackendError::OutOfMemory {
                requested: (capacity * TileInstance::SIZE) as u64,
                live,
            });
        }

        let id = ledger.next_id;
        ledger.next_id += 1;
        ledger.created += 1;
        ledger.buffers.insert(id, Vec::new());
        tracing::trace!(buffer = id, capacity, "Created instance buffer");
        Ok(HeadlessBuffer { id, capacity, ledger: Rc::clone(&self.ledger) })
    }

    fn upload(&mut self, buffer: &HeadlessBuffer, instances: &[TileInstance]) -> BackendResult<()> {
        if instances.len() > buffer.capacity {
            return Err(BackendError::CapacityOverflow { capacity: buffer.capacity, len: instances.len() });
        }
        let mut ledger = self.ledger.borrow_mut();
        ledger.uploads += 1;
        ledger
            .buffers
            .insert(buffer.id, bytemuck::cast_slice(instances).to_vec());
        Ok(())
    }

    fn draw_instanced(&mut self, buffer: &HeadlessBuffer, call: DrawCall) -> BackendResult<()> {
        if call.instance_count as usize > buffer.capacity {
            return Err(BackendError::CapacityOverflow {
                capacity: buffer.capacity,
                len: call.instance_count as usize,
            });
        }
        self.draws.push(call);
        Ok(())
    }

    fn dispose(&mut self, buffer: HeadlessBuffer) {
        tracing::trace!(buffer = buffer.id, "Disposing instance buffer");
        drop(buffer);
    }
}
