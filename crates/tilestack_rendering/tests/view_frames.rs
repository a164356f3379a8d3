//! # View Frame Tests
//!
//! Full frames through the headless backend: draw order, idle eviction,
//! per-layer fault isolation and the two-tone frame feed.

use std::path::Path;
use std::time::{Duration, Instant};

use image::{Rgba, RgbaImage};
use tilestack_rendering::atlas::{AtlasMode, AtlasRegistry, Capabilities, MemoryTextureSource};
use tilestack_rendering::backend::HeadlessBackend;
use tilestack_rendering::{spawn_directory_loader, Camera, LayerError, RenderContext, View, ViewSettings};
use tilestack_shared::tile::BUILTIN_TILES;
use tilestack_shared::volume::fixtures;
use tilestack_shared::{two_tone_to_volume, TileId, TileRegistry, TilestackConfig};

const DIRT: TileId = TileId(1);
const STONE: TileId = TileId(3);

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

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

#[test]
fn test_context_from_default_config() {
    let names = BUILTIN_TILES.iter().skip(1).map(|(name, _)| *name);
    let ctx = RenderContext::from_config(
        &TilestackConfig::default(),
        Capabilities::headless(),
        &MemoryTextureSource::solid_tiles(names),
    )
    .unwrap();
    assert_eq!(ctx.atlas.mode(), AtlasMode::SingleResource);
    assert_eq!(ctx.settings.idle_timeout, ms(1000));
    assert_eq!(ctx.tiles.len(), BUILTIN_TILES.len());
}

#[test]
fn test_scenario_frame_report() {
    let ctx = context(AtlasMode::SingleResource);
    let mut backend = HeadlessBackend::default();
    let mut view = View::new(fixtures::scenario_2x2(), None, &ctx).unwrap();

    let report = view.draw(&mut backend, &ctx, Instant::now());
    assert!(report.faults.is_empty());
    assert_eq!(report.stats.resolved_layers, 2);
    assert_eq!(report.stats.layers_created, 2);
    assert_eq!(report.stats.draw_calls, 2);

    let ids: Vec<usize> = report.layers.iter().map(|layer| layer.layer_id).collect();
    assert_eq!(ids, vec![0, 1]);
    assert_eq!(report.layers[0].batches[0].draw_position, 0.0);
    assert_eq!(report.layers[1].batches[0].draw_position, 2.0);

    let draws = backend.take_draws();
    assert!(draws.iter().all(|draw| draw.instance_count == 4 && draw.atlas_resource == 0));
    assert!(draws[0].position_z < draws[1].position_z);
}

#[test]
fn test_unchanged_frame_uploads_nothing() {
    let ctx = context(AtlasMode::FixedCapacity { layers_per_array: 2, max_arrays: 8 });
    let mut backend = HeadlessBackend::default();
    let mut view = View::new(fixtures::transparent_stack(), None, &ctx).unwrap();
    let start = Instant::now();

    view.draw(&mut backend, &ctx, start);
    let uploads = backend.upload_count();
    let report = view.draw(&mut backend, &ctx, start + ms(16));
    assert_eq!(backend.upload_count(), uploads);
    assert_eq!(report.stats.cells_updated, 0);
    assert_eq!(report.stats.layers_created, 0);
}

#[test]
fn test_set_tile_reaches_next_frame() {
    let ctx = context(AtlasMode::FixedCapacity { layers_per_array: 2, max_arrays: 8 });
    let mut backend = HeadlessBackend::default();
    let mut view = View::new(fixtures::flat(1, 3, 3, DIRT), None, &ctx).unwrap();
    let start = Instant::now();

    let report = view.draw(&mut backend, &ctx, start);
    assert_eq!(report.layers[0].batches.len(), 1);

    // stone lives in resource 1
    view.set_tile(0, 1, 1, STONE, &ctx).unwrap();
    let report = view.draw(&mut backend, &ctx, start + ms(16));
    assert_eq!(report.stats.cells_updated, 1);
    let resources: Vec<u32> = report.layers[0].batches.iter().map(|batch| batch.atlas_resource_id).collect();
    assert_eq!(resources, vec![0, 1]);
    let positions: Vec<f32> = report.layers[0].batches.iter().map(|batch| batch.draw_position).collect();
    assert_eq!(positions, vec![0.0, 0.15]);
}

#[test]
fn test_idle_layers_are_evicted() {
    let ctx = context(AtlasMode::SingleResource);
    let mut backend = HeadlessBackend::default();
    let mut view = View::new(fixtures::transparent_stack(), Some(2), &ctx).unwrap();
    let start = Instant::now();

    let report = view.draw(&mut backend, &ctx, start);
    assert_eq!(report.stats.resolved_layers, 3);
    assert_eq!(view.live_layers().collect::<Vec<_>>(), vec![0, 1, 2]);

    // Only the cursor layer resolves now
    assert_eq!(view.set_current_layer(0), 0);
    let report = view.draw(&mut backend, &ctx, start + ms(500));
    assert_eq!(report.stats.resolved_layers, 1);
    assert!(report.evicted.is_empty());

    // Exactly the timeout is not yet idle
    let report = view.draw(&mut backend, &ctx, start + ms(1000));
    assert!(report.evicted.is_empty());
    assert_eq!(view.layer_count(), 3);

    let report = view.draw(&mut backend, &ctx, start + ms(1500));
    assert_eq!(report.evicted, vec![1, 2]);
    assert_eq!(view.live_layers().collect::<Vec<_>>(), vec![0]);
    assert_eq!(backend.live_buffers(), 1);
}

#[test]
fn test_evicted_layer_is_rebuilt_on_return() {
    let ctx = context(AtlasMode::SingleResource);
    let mut backend = HeadlessBackend::default();
    let mut view = View::new(fixtures::transparent_stack(), Some(2), &ctx).unwrap();
    let start = Instant::now();

    view.draw(&mut backend, &ctx, start);
    view.set_current_layer(0);
    let report = view.draw(&mut backend, &ctx, start + ms(1500));
    assert_eq!(report.evicted, vec![1, 2]);

    view.set_current_layer(2);
    let report = view.draw(&mut backend, &ctx, start + ms(1600));
    assert_eq!(report.stats.layers_created, 2);
    assert_eq!(report.layers.len(), 3);
    assert!(report.faults.is_empty());
}

#[test]
fn test_failed_layer_does_not_stop_the_frame() {
    let ctx = context(AtlasMode::SingleResource);
    let mut backend = HeadlessBackend::default();
    backend.set_buffer_limit(Some(1));
    let mut view = View::new(fixtures::scenario_2x2(), None, &ctx).unwrap();
    let start = Instant::now();

    let report = view.draw(&mut backend, &ctx, start);
    assert_eq!(report.faults.len(), 1);
    assert_eq!(report.faults[0].layer, 1);
    assert!(matches!(report.faults[0].error, LayerError::BatchCreation { layer: 1, .. }));
    assert_eq!(report.layers.len(), 1);
    assert_eq!(report.layers[0].layer_id, 0);
    assert_eq!(view.live_layers().collect::<Vec<_>>(), vec![0]);

    // The failed layer is retried next frame
    backend.set_buffer_limit(None);
    let report = view.draw(&mut backend, &ctx, start + ms(16));
    assert!(report.faults.is_empty());
    assert_eq!(report.stats.layers_created, 1);
    assert_eq!(report.layers.len(), 2);
}

fn write_frame(dir: &Path, name: &str, on: &[(u32, u32)]) {
    let mut image = RgbaImage::from_pixel(3, 2, Rgba([0, 0, 0, 255]));
    for &(x, y) in on {
        image.put_pixel(x, y, Rgba([255, 255, 255, 255]));
    }
    image.save(dir.join(name)).unwrap();
}

#[test]
fn test_frame_feed_drives_volume() {
    let dir = std::env::temp_dir().join(format!("tilestack-view-feed-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    write_frame(&dir, "frame_000.png", &[(0, 0)]);
    write_frame(&dir, "frame_001.png", &[(2, 1), (1, 0)]);

    let (mut feed, loader) = spawn_directory_loader(&dir, 4, None).unwrap();
    assert_eq!(loader.join().unwrap().unwrap(), 2);

    let ctx = context(AtlasMode::FixedCapacity { layers_per_array: 2, max_arrays: 8 });
    let mut backend = HeadlessBackend::default();
    let mut view = View::new(fixtures::flat(1, 3, 2, DIRT), None, &ctx).unwrap();

    let frame = feed.latest().unwrap();
    assert!(frame.get(2, 1).copied().unwrap());
    assert!(!frame.get(0, 0).copied().unwrap());
    view.set_volume(two_tone_to_volume(&frame, STONE, DIRT), &ctx).unwrap();

    let report = view.draw(&mut backend, &ctx, Instant::now());
    let resources: Vec<u32> = report.layers[0].batches.iter().map(|batch| batch.atlas_resource_id).collect();
    assert_eq!(resources, vec![0, 1]);
    let stone = view.layer(0).unwrap().batch(1).unwrap();
    assert_eq!(stone.owned_count(), 2);

    std::fs::remove_dir_all(&dir).unwrap();
}
