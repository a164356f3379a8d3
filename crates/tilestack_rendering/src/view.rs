//! View - per-frame reconciliation of the volume with GPU layer state.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         FRAME TIMELINE                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  1. Resolve    volume + cursor → dense visible layers          │
//! │  2. Reconcile  new layer → full build                           │
//! │                known layer → per-cell diff, then SendTiles      │
//! │  3. Draw       layers bottom to top, touching each              │
//! │  4. Evict      layers idle past the timeout are released        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A failing layer is torn down and reported; the rest of the frame
//! carries on. Eviction runs after drawing so a layer drawn or created
//! this frame is never evicted by it.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tilestack_shared::{GridError, TileError, TileId, TileRegistry, TilestackConfig, ViewConfig, Volume};

use crate::atlas::{AtlasRegistry, Capabilities, TextureSource};
use crate::backend::GpuBackend;
use crate::camera::Camera;
use crate::error::{LayerError, LayerResult, ViewResult};
use crate::layer::{BatchDrawRecord, LayerBatchManager};
use crate::visibility::{resolve_visible_layers, ResolvedLayer, VisibleGrid};

/// Tuning shared by every layer of a view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewSettings {
    /// Idle time before an undrawn layer is evicted.
    pub idle_timeout: Duration,
    /// Draw-position step between layers.
    pub layer_z_stride: f32,
    /// Draw-position step between batches of one layer.
    pub batch_z_stride: f32,
    /// World units per tile.
    pub tile_size: f32,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self::from_config(&ViewConfig::default())
    }
}

impl ViewSettings {
    /// Settings from the `[view]` config section.
    #[must_use]
    pub const fn from_config(config: &ViewConfig) -> Self {
        Self {
            idle_timeout: config.idle_timeout(),
            layer_z_stride: config.layer_z_stride,
            batch_z_stride: config.batch_z_stride,
            tile_size: config.tile_size,
        }
    }
}

/// Everything the view reads but never owns.
#[derive(Debug, Clone)]
pub struct RenderContext {
    /// Tile to atlas slot table.
    pub atlas: AtlasRegistry,
    /// Tile types and opacity.
    pub tiles: TileRegistry,
    /// Backend capabilities the atlas was built for.
    pub capabilities: Capabilities,
    /// Active camera.
    pub camera: Camera,
    /// Layer tuning.
    pub settings: ViewSettings,
}

impl RenderContext {
    /// Builds the tile registry and atlas from configuration.
    ///
    /// The atlas mode follows `[atlas].mode`, with `auto` deciding from
    /// `capabilities`.
    ///
    /// # Errors
    ///
    /// Fails if the tile list is invalid, the mode is unsupported, or the
    /// atlas cannot be built from `source`.
    pub fn from_config(
        config: &TilestackConfig,
        capabilities: Capabilities,
        source: &dyn TextureSource,
    ) -> ViewResult<Self> {
        let tiles = config.tile_registry()?;
        let mode = capabilities.atlas_mode(
            config.atlas.mode,
            config.atlas.max_arrays,
            config.atlas.layers_per_array,
        )?;
        let atlas = AtlasRegistry::build(&tiles, source, mode)?;
        Ok(Self {
            atlas,
            tiles,
            capabilities,
            camera: Camera::default(),
            settings: ViewSettings::from_config(&config.view),
        })
    }
}

/// Batches drawn for one layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerDrawRecord {
    /// Dense layer index.
    pub layer_id: usize,
    /// One record per draw, in draw order.
    pub batches: Vec<BatchDrawRecord>,
}

/// A layer that failed this frame and was torn down.
#[derive(Debug)]
pub struct LayerFault {
    /// Dense layer index.
    pub layer: usize,
    /// What went wrong.
    pub error: LayerError,
}

/// Frame counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Layers returned by the resolver.
    pub resolved_layers: usize,
    /// Instanced draws issued.
    pub draw_calls: usize,
    /// Cells rewritten on existing layers.
    pub cells_updated: usize,
    /// Layers built from scratch.
    pub layers_created: usize,
}

/// Outcome of one [`View::draw`].
#[derive(Debug, Default)]
pub struct FrameReport {
    /// Drawn layers, bottom first.
    pub layers: Vec<LayerDrawRecord>,
    /// Layers torn down this frame.
    pub faults: Vec<LayerFault>,
    /// Layers evicted by the idle sweep.
    pub evicted: Vec<usize>,
    /// Counters.
    pub stats: FrameStats,
}

/// The layer cursor, the volume, and one batch manager per live layer.
pub struct View<B: GpuBackend> {
    volume: Volume,
    current_layer: usize,
    layers: BTreeMap<usize, LayerBatchManager<B>>,
    frame_count: u64,
}

impl<B: GpuBackend> View<B> {
    /// Creates a view over `volume`.
    ///
    /// `current_layer` defaults to the top layer and is clamped to it.
    ///
    /// # Errors
    ///
    /// - [`GridError::InvalidDimensions`] for an empty volume
    /// - [`TileError::UnknownTile`] for an unregistered tile id
    /// - an atlas error for a tile without a slot
    pub fn new(volume: Volume, current_layer: Option<usize>, ctx: &RenderContext) -> ViewResult<Self> {
        let (width, height, depth) = volume.dimensions();
        if width == 0 || height == 0 || depth == 0 {
            return Err(GridError::InvalidDimensions { width, height, depth }.into());
        }
        Self::validate(&volume, ctx)?;

        let max_layer = depth - 1;
        let current_layer = current_layer.map_or(max_layer, |layer| layer.min(max_layer));
        tracing::info!(width, height, depth, current_layer, "View created");
        Ok(Self {
            volume,
            current_layer,
            layers: BTreeMap::new(),
            frame_count: 0,
        })
    }

    /// Runs one frame: resolve, reconcile, draw, evict.
    pub fn draw(&mut self, backend: &mut B, ctx: &RenderContext, now: Instant) -> FrameReport {
        let mut report = FrameReport::default();
        self.frame_count += 1;

        // === PHASE 1: Resolve ===
        let resolved = resolve_visible_layers(&self.volume, self.current_layer, &ctx.tiles);
        report.stats.resolved_layers = resolved.len();

        // === PHASE 2: Reconcile ===
        for (index, ResolvedLayer { grid, .. }) in resolved.into_iter().enumerate() {
            let result = match self.layers.get_mut(&index) {
                Some(manager) => Self::reconcile(manager, backend, &ctx.atlas, &grid)
                    .map(|updated| report.stats.cells_updated += updated),
                None => LayerBatchManager::create(backend, &ctx.atlas, index, grid, &ctx.settings, now).map(
                    |manager| {
                        self.layers.insert(index, manager);
                        report.stats.layers_created += 1;
                    },
                ),
            };
            if let Err(error) = result {
                self.tear_down(backend, index, error, &mut report);
            }
        }

        // === PHASE 3: Draw (bottom to top) ===
        for index in 0..report.stats.resolved_layers {
            let Some(manager) = self.layers.get_mut(&index) else {
                continue;
            };
            manager.touch(now);
            match manager.draw(backend) {
                Ok(batches) => {
                    report.stats.draw_calls += batches.len();
                    report.layers.push(LayerDrawRecord { layer_id: index, batches });
                }
                Err(error) => self.tear_down(backend, index, error, &mut report),
            }
        }

        // === PHASE 4: Evict ===
        let stale: Vec<usize> = self
            .layers
            .iter()
            .filter(|(_, manager)| manager.is_stale(now))
            .map(|(&index, _)| index)
            .collect();
        for index in stale {
            if let Some(mut manager) = self.layers.remove(&index) {
                tracing::info!("Removing tile layer {index} from memory");
                manager.dispose(backend);
                report.evicted.push(index);
            }
        }

        report
    }

    /// Moves the cursor up one layer, stopping at the top.
    pub fn increase_layer(&mut self) -> usize {
        self.set_current_layer(self.current_layer.saturating_add(1))
    }

    /// Moves the cursor down one layer, stopping at 0.
    pub fn decrease_layer(&mut self) -> usize {
        self.set_current_layer(self.current_layer.saturating_sub(1))
    }

    /// Sets the cursor, clamped to `[0, max_layer]`. Returns the new value.
    pub fn set_current_layer(&mut self, layer: usize) -> usize {
        self.current_layer = layer.min(self.max_layer());
        self.current_layer
    }

    /// Replaces the whole volume between frames.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::DimensionMismatch`] if the dimensions differ,
    /// or the validation errors of [`Self::new`].
    pub fn set_volume(&mut self, volume: Volume, ctx: &RenderContext) -> ViewResult<()> {
        if volume.dimensions() != self.volume.dimensions() {
            return Err(GridError::DimensionMismatch {
                expected: self.volume.dimensions(),
                actual: volume.dimensions(),
            }
            .into());
        }
        Self::validate(&volume, ctx)?;
        self.volume = volume;
        Ok(())
    }

    /// Writes one volume cell between frames.
    ///
    /// # Errors
    ///
    /// Fails for an unregistered tile, a tile without an atlas slot, or
    /// a coordinate outside the volume.
    pub fn set_tile(&mut self, layer: usize, x: usize, y: usize, tile: TileId, ctx: &RenderContext) -> ViewResult<()> {
        if !ctx.tiles.contains(tile) {
            return Err(TileError::UnknownTile(tile).into());
        }
        ctx.atlas.resolve(tile)?;
        self.volume.set(layer, x, y, tile)?;
        Ok(())
    }

    /// What the next frame would resolve, without touching GPU state.
    #[must_use]
    pub fn visible_layers(&self, ctx: &RenderContext) -> Vec<ResolvedLayer> {
        resolve_visible_layers(&self.volume, self.current_layer, &ctx.tiles)
    }

    /// Releases every live layer.
    pub fn dispose(&mut self, backend: &mut B) {
        for (_, mut manager) in std::mem::take(&mut self.layers) {
            manager.dispose(backend);
        }
    }

    /// Layer cursor.
    #[inline]
    #[must_use]
    pub const fn current_layer(&self) -> usize {
        self.current_layer
    }

    /// Highest valid cursor value.
    #[inline]
    #[must_use]
    pub const fn max_layer(&self) -> usize {
        self.volume.depth().saturating_sub(1)
    }

    /// Layers in the volume.
    #[inline]
    #[must_use]
    pub const fn layer_count(&self) -> usize {
        self.volume.depth()
    }

    /// The volume.
    #[inline]
    #[must_use]
    pub const fn volume(&self) -> &Volume {
        &self.volume
    }

    /// Dense indices of layers holding GPU state.
    pub fn live_layers(&self) -> impl Iterator<Item = usize> + '_ {
        self.layers.keys().copied()
    }

    /// Batch manager of a live layer.
    #[must_use]
    pub fn layer(&self, index: usize) -> Option<&LayerBatchManager<B>> {
        self.layers.get(&index)
    }

    /// Frames drawn so far.
    #[inline]
    #[must_use]
    pub const fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn validate(volume: &Volume, ctx: &RenderContext) -> ViewResult<()> {
        ctx.tiles.validate_volume(volume)?;
        ctx.atlas.distinct_resources(volume.cells().iter().copied())?;
        Ok(())
    }

    /// Diffs `grid` into an existing layer and flushes it.
    fn reconcile(
        manager: &mut LayerBatchManager<B>,
        backend: &mut B,
        atlas: &AtlasRegistry,
        grid: &VisibleGrid,
    ) -> LayerResult<usize> {
        let mut updated = 0;
        for (x, y, cell) in grid.iter_cells() {
            let Some(current) = manager.grid().get(x, y).copied() else {
                continue;
            };
            if current == *cell {
                continue;
            }
            // Depth is not part of the instance record; a depth-only change
            // refreshes the cached grid without dirtying a batch.
            if current.tile_id != cell.tile_id || current.is_visible != cell.is_visible {
                updated += 1;
            }
            manager.update_cell(backend, atlas, x, y, *cell)?;
        }
        manager.send_tiles(backend)?;
        Ok(updated)
    }

    fn tear_down(&mut self, backend: &mut B, index: usize, error: LayerError, report: &mut FrameReport) {
        tracing::error!(layer = index, error = %error, "Tearing down tile layer");
        if let Some(mut manager) = self.layers.remove(&index) {
            manager.dispose(backend);
        }
        report.faults.push(LayerFault { layer: index, error });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::{AtlasMode, MemoryTextureSource};
    use crate::backend::HeadlessBackend;
    use crate::error::ViewError;
    use crate::visibility::VisibleCell;
    use tilestack_shared::tile::BUILTIN_TILES;
    use tilestack_shared::volume::fixtures;

    fn context(mode: AtlasMode) -> RenderContext {
        let tiles = TileRegistry::builtin();
        let names = BUILTIN_TILES.iter().skip(1).map(|(name, _)| *name);
        let atlas = AtlasRegistry::build(&tiles, &MemoryTextureSource::solid_tiles(names), mode).unwrap();
        RenderContext {
            atlas,
            tiles,
            capabilities: Capabilities::headless(),
            camera: Camera::default(),
            settings: ViewSettings::default(),
        }
    }

    #[test]
    fn test_cursor_clamps() {
        let ctx = context(AtlasMode::SingleResource);
        let mut view: View<HeadlessBackend> =
            View::new(fixtures::flat(3, 2, 2, TileId(1)), Some(10), &ctx).unwrap();
        assert_eq!(view.current_layer(), 2);
        assert_eq!(view.increase_layer(), 2);
        assert_eq!(view.decrease_layer(), 1);
        assert_eq!(view.decrease_layer(), 0);
        assert_eq!(view.decrease_layer(), 0);
        assert_eq!(view.max_layer(), 2);
    }

    #[test]
    fn test_new_rejects_unknown_tile() {
        let ctx = context(AtlasMode::SingleResource);
        let result = View::<HeadlessBackend>::new(fixtures::flat(1, 1, 1, TileId(99)), None, &ctx);
        assert!(matches!(result, Err(ViewError::Tile(TileError::UnknownTile(TileId(99))))));
    }

    #[test]
    fn test_set_volume_rejects_other_dimensions() {
        let ctx = context(AtlasMode::SingleResource);
        let mut view: View<HeadlessBackend> = View::new(fixtures::scenario_2x2(), None, &ctx).unwrap();
        let err = view.set_volume(fixtures::flat(2, 3, 2, TileId(1)), &ctx).unwrap_err();
        assert!(matches!(err, ViewError::Grid(GridError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_first_frame_builds_then_diffs() {
        let ctx = context(AtlasMode::SingleResource);
        let mut backend = HeadlessBackend::default();
        let mut view = View::new(fixtures::scenario_2x2(), None, &ctx).unwrap();
        let start = Instant::now();

        let first = view.draw(&mut backend, &ctx, start);
        assert_eq!(first.stats.resolved_layers, 2);
        assert_eq!(first.stats.layers_created, 2);
        assert_eq!(first.stats.draw_calls, 2);

        let second = view.draw(&mut backend, &ctx, start);
        assert_eq!(second.stats.layers_created, 0);
        assert_eq!(second.stats.cells_updated, 0);

        view.set_tile(1, 0, 0, TileId(3), &ctx).unwrap();
        let third = view.draw(&mut backend, &ctx, start);
        // Stone over the air cell closes that column in layer 0 too
        assert!(third.stats.cells_updated >= 1);
        assert!(third.faults.is_empty());
    }

    #[test]
    fn test_depth_only_changes_upload_nothing() {
        let ctx = context(AtlasMode::FixedCapacity { layers_per_array: 2, max_arrays: 8 });
        let mut backend = HeadlessBackend::default();
        let mut view = View::new(fixtures::flat(3, 3, 3, TileId(8)), None, &ctx).unwrap();
        let start = Instant::now();

        view.draw(&mut backend, &ctx, start);
        let uploads = backend.upload_count();
        let bytes = backend.snapshot();

        // Glass all the way down: every kept cell only changes depth
        view.decrease_layer();
        let report = view.draw(&mut backend, &ctx, start);
        assert_eq!(report.stats.resolved_layers, 2);
        assert_eq!(report.stats.cells_updated, 0);
        assert_eq!(backend.upload_count(), uploads);
        assert_eq!(backend.snapshot(), bytes);

        let top = view.layer(1).unwrap().grid().get(0, 0).copied();
        assert_eq!(top, Some(VisibleCell::shown(TileId(8), 0.0)));
        view.dispose(&mut backend);
    }

    #[test]
    fn test_stale_batch_tears_layer_down() {
        let single = context(AtlasMode::SingleResource);
        let fixed = context(AtlasMode::FixedCapacity { layers_per_array: 2, max_arrays: 8 });
        let mut backend = HeadlessBackend::default();
        let mut view = View::new(fixtures::flat(1, 2, 2, TileId(8)), None, &single).unwrap();
        let start = Instant::now();
        view.draw(&mut backend, &single, start);

        // Tile 7 shares resource 3 with glass under the fixed atlas
        view.set_tile(0, 0, 0, TileId(7), &fixed).unwrap();
        let report = view.draw(&mut backend, &fixed, start);

        assert_eq!(report.faults.len(), 1);
        assert_eq!(report.faults[0].layer, 0);
        assert!(matches!(
            report.faults[0].error,
            LayerError::StaleBatchReference { layer: 0, atlas_resource: 3 }
        ));
        assert!(report.layers.is_empty());
        assert_eq!(view.live_layers().count(), 0);
        assert_eq!(backend.live_buffers(), 0);

        let rebuilt = view.draw(&mut backend, &fixed, start);
        assert!(rebuilt.faults.is_empty());
        assert_eq!(rebuilt.stats.layers_created, 1);
        view.dispose(&mut backend);
    }

    #[test]
    fn test_draw_order_is_bottom_first() {
        let ctx = context(AtlasMode::FixedCapacity { layers_per_array: 2, max_arrays: 8 });
        let mut backend = HeadlessBackend::default();
        let mut view = View::new(fixtures::transparent_stack(), None, &ctx).unwrap();

        let report = view.draw(&mut backend, &ctx, Instant::now());
        let ids: Vec<usize> = report.layers.iter().map(|layer| layer.layer_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);

        let positions: Vec<f32> = backend.draws().iter().map(|call| call.position_z).collect();
        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_dispose_releases_layers() {
        let ctx = context(AtlasMode::SingleResource);
        let mut backend = HeadlessBackend::default();
        let mut view = View::new(fixtures::scenario_2x2(), None, &ctx).unwrap();
        view.draw(&mut backend, &ctx, Instant::now());
        assert!(backend.live_buffers() > 0);

        view.dispose(&mut backend);
        assert_eq!(view.live_layers().count(), 0);
        assert_eq!(backend.live_buffers(), 0);
    }
}
