//! Layer Batch Manager.
//!
//! Owns the GPU-facing state of one resolved layer: its cached
//! [`VisibleGrid`] and one [`Batch`] per atlas resource the grid uses.
//!
//! ```text
//! grid (w x h cells) ──┬── Batch[resource 0]  owns cells whose tile lives in 0
//!                      ├── Batch[resource 1]  owns cells whose tile lives in 1
//!                      └── ...
//! every batch holds w x h records; unowned records stay hidden
//! ```
//!
//! Every cell is owned by exactly one batch. Air resolves to resource 0.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::atlas::{AtlasRegistry, AtlasSlot};
use crate::backend::GpuBackend;
use crate::error::{LayerError, LayerResult};
use crate::instancing::{Batch, TileInstance};
use crate::view::ViewSettings;
use crate::visibility::{VisibleCell, VisibleGrid};
use tilestack_shared::TileId;

/// What one batch draw looked like, for the HUD.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchDrawRecord {
    /// Atlas resource of the batch.
    pub atlas_resource_id: u32,
    /// Draw-order position used.
    pub draw_position: f32,
}

/// GPU state of one resolved layer.
pub struct LayerBatchManager<B: GpuBackend> {
    layer_index: usize,
    grid: VisibleGrid,
    batches: BTreeMap<u32, Batch<B>>,
    last_used: Instant,
    idle_timeout: Duration,
    layer_z_stride: f32,
    batch_z_stride: f32,
}

impl<B: GpuBackend> LayerBatchManager<B> {
    /// Builds every batch the grid needs and uploads them.
    ///
    /// # Errors
    ///
    /// - [`LayerError::Atlas`] if a cell's tile has no slot
    /// - [`LayerError::BatchCreation`] if a buffer cannot be allocated
    /// - [`LayerError::Backend`] if the initial upload fails
    pub fn create(
        backend: &mut B,
        atlas: &AtlasRegistry,
        layer_index: usize,
        grid: VisibleGrid,
        settings: &ViewSettings,
        now: Instant,
    ) -> LayerResult<Self> {
        let resources = atlas
            .distinct_resources(grid.cells().iter().map(|cell| cell.tile_id))
            .map_err(|source| LayerError::Atlas { layer: layer_index, source })?;

        let mut manager = Self {
            layer_index,
            grid,
            batches: BTreeMap::new(),
            last_used: now,
            idle_timeout: settings.idle_timeout,
            layer_z_stride: settings.layer_z_stride,
            batch_z_stride: settings.batch_z_stride,
        };
        for resource in resources {
            match manager.build_batch(backend, atlas, resource) {
                Ok(batch) => {
                    manager.batches.insert(resource, batch);
                }
                Err(error) => {
                    manager.dispose(backend);
                    return Err(error);
                }
            }
        }
        if let Err(error) = manager.send_tiles(backend) {
            manager.dispose(backend);
            return Err(error);
        }

        tracing::debug!(layer = layer_index, batches = manager.batches.len(), "Created tile layer");
        Ok(manager)
    }

    /// Changes one cell.
    ///
    /// If the tile stays in the same atlas resource the owning batch is
    /// rewritten in place. Otherwise the old batch hides the cell and the
    /// new resource's batch claims it, being created first if needed.
    /// Changes reach the GPU on the next [`Self::send_tiles`].
    ///
    /// # Errors
    ///
    /// - [`LayerError::CellOutOfBounds`] for a cell outside the grid
    /// - [`LayerError::Atlas`] if either tile has no slot
    /// - [`LayerError::StaleBatchReference`] if the cell's current batch
    ///   is missing
    /// - [`LayerError::BatchCreation`] if a new batch cannot be allocated
    pub fn update_cell(
        &mut self,
        backend: &mut B,
        atlas: &AtlasRegistry,
        x: usize,
        y: usize,
        cell: VisibleCell,
    ) -> LayerResult<()> {
        let layer = self.layer_index;
        let (index, old) = match self.grid.index_of(x, y) {
            Some(index) => (index, self.grid.cells()[index]),
            None => return Err(LayerError::CellOutOfBounds { layer, x, y }),
        };
        let old_resource = self.resolve(atlas, old.tile_id)?.resource_id();
        let slot = self.resolve(atlas, cell.tile_id)?;
        let new_resource = slot.resource_id();
        let record = TileInstance::new(x, y, slot.depth_index(), cell.is_visible);

        if old_resource == new_resource {
            self.batches
                .get_mut(&new_resource)
                .ok_or(LayerError::StaleBatchReference { layer, atlas_resource: new_resource })?
                .claim(index, record);
        } else {
            if !self.batches.contains_key(&old_resource) {
                return Err(LayerError::StaleBatchReference { layer, atlas_resource: old_resource });
            }
            if !self.batches.contains_key(&new_resource) {
                let batch = self.build_batch(backend, atlas, new_resource)?;
                self.batches.insert(new_resource, batch);
                tracing::trace!(layer, atlas_resource = new_resource, "Added batch for new resource");
            }

            if let Some(batch) = self.batches.get_mut(&old_resource) {
                batch.release(index);
            }
            self.batches
                .get_mut(&new_resource)
                .ok_or(LayerError::StaleBatchReference { layer, atlas_resource: new_resource })?
                .claim(index, record);
        }

        self.grid
            .set(x, y, cell)
            .map_err(|_| LayerError::CellOutOfBounds { layer, x, y })
    }

    /// Uploads every changed batch and drops batches that own no cell.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::Backend`] if an upload fails.
    pub fn send_tiles(&mut self, backend: &mut B) -> LayerResult<()> {
        let empty: Vec<u32> = self
            .batches
            .iter()
            .filter(|(_, batch)| batch.owned_count() == 0)
            .map(|(&resource, _)| resource)
            .collect();
        for resource in empty {
            if let Some(mut batch) = self.batches.remove(&resource) {
                batch.dispose(backend);
                tracing::debug!(layer = self.layer_index, atlas_resource = resource, "Dropped empty batch");
            }
        }

        let layer = self.layer_index;
        for batch in self.batches.values_mut() {
            batch
                .upload(backend)
                .map_err(|source| LayerError::Backend { layer, source })?;
        }
        Ok(())
    }

    /// Draws every batch with at least one visible cell, in resource order.
    ///
    /// Returns one record per draw issued.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::Backend`] if a draw fails.
    #[allow(clippy::cast_precision_loss)]
    pub fn draw(&mut self, backend: &mut B) -> LayerResult<Vec<BatchDrawRecord>> {
        let layer = self.layer_index;
        let instance_count = u32::try_from(self.grid.len()).unwrap_or(u32::MAX);
        let base = layer as f32 * self.layer_z_stride;

        let mut records = Vec::new();
        for (ordinal, (&resource, batch)) in self.batches.iter_mut().enumerate() {
            let position = base + ordinal as f32 * self.batch_z_stride;
            batch.set_position_z(position);
            if batch.visible_count() == 0 {
                continue;
            }
            batch
                .draw(backend, instance_count)
                .map_err(|source| LayerError::Backend { layer, source })?;
            records.push(BatchDrawRecord { atlas_resource_id: resource, draw_position: position });
        }
        Ok(records)
    }

    /// Marks the layer as used at `now`.
    #[inline]
    pub fn touch(&mut self, now: Instant) {
        self.last_used = now;
    }

    /// True once the layer has gone unused for longer than the idle timeout.
    #[inline]
    #[must_use]
    pub fn is_stale(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_used) > self.idle_timeout
    }

    /// Releases every batch. Safe to call more than once.
    pub fn dispose(&mut self, backend: &mut B) {
        for (_, mut batch) in std::mem::take(&mut self.batches) {
            batch.dispose(backend);
        }
    }

    /// Dense layer index.
    #[inline]
    #[must_use]
    pub const fn layer_index(&self) -> usize {
        self.layer_index
    }

    /// Cached resolved grid.
    #[inline]
    #[must_use]
    pub const fn grid(&self) -> &VisibleGrid {
        &self.grid
    }

    /// Last time the layer was used.
    #[inline]
    #[must_use]
    pub const fn last_used(&self) -> Instant {
        self.last_used
    }

    /// Number of live batches.
    #[inline]
    #[must_use]
    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    /// Atlas resources with a batch, ascending.
    pub fn resources(&self) -> impl Iterator<Item = u32> + '_ {
        self.batches.keys().copied()
    }

    /// Batch for `resource`.
    #[must_use]
    pub fn batch(&self, resource: u32) -> Option<&Batch<B>> {
        self.batches.get(&resource)
    }

    /// Batches in resource order.
    pub fn batches(&self) -> impl Iterator<Item = &Batch<B>> {
        self.batches.values()
    }

    fn resolve(&self, atlas: &AtlasRegistry, tile: TileId) -> LayerResult<AtlasSlot> {
        atlas
            .resolve(tile)
            .map_err(|source| LayerError::Atlas { layer: self.layer_index, source })
    }

    /// A batch covering the whole grid that claims the cells of `resource`.
    fn build_batch(&self, backend: &mut B, atlas: &AtlasRegistry, resource: u32) -> LayerResult<Batch<B>> {
        let (width, capacity) = (self.grid.width(), self.grid.len());
        let mut batch = Batch::new(backend, resource, width, capacity).map_err(|source| {
            LayerError::BatchCreation { layer: self.layer_index, atlas_resource: resource, source }
        })?;
        for (x, y, cell) in self.grid.iter_cells() {
            let slot = self.resolve(atlas, cell.tile_id)?;
            if slot.resource_id() == resource {
                batch.claim(y * width + x, TileInstance::new(x, y, slot.depth_index(), cell.is_visible));
            }
        }
        Ok(batch)
    }
}
