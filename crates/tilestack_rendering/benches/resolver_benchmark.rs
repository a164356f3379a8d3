//! Benchmark for visibility resolution and headless frames.
//!
//! TARGET: a 256x256x16 volume resolves and reconciles well inside a 60 FPS frame
//!
//! Run with: cargo bench --package tilestack_rendering --bench resolver_benchmark

use std::time::{Duration, Instant};

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use tilestack_rendering::atlas::{AtlasMode, AtlasRegistry, Capabilities, MemoryTextureSource};
use tilestack_rendering::backend::HeadlessBackend;
use tilestack_rendering::{resolve_visible_layers, Camera, RenderContext, View, ViewSettings};
use tilestack_shared::tile::BUILTIN_TILES;
use tilestack_shared::{RandomVolume, TileId, TileRegistry, Volume};

fn volume(size: usize, layers: usize, seed: u64) -> Volume {
    RandomVolume {
        layers,
        width: size,
        height: size,
        palette: vec![TileId(1), TileId(3), TileId(6), TileId(8)],
        air_ratio: 0.4,
    }
    .generate(seed)
}

fn context(mode: AtlasMode) -> RenderContext {
    let tiles = TileRegistry::builtin();
    let names = BUILTIN_TILES.iter().skip(1).map(|(name, _)| *name);
    let atlas = AtlasRegistry::build(&tiles, &MemoryTextureSource::solid_tiles(names), mode)
        .expect("builtin atlas");
    RenderContext {
        atlas,
        tiles,
        capabilities: Capabilities::headless(),
        camera: Camera::default(),
        settings: ViewSettings::default(),
    }
}

fn benchmark_resolve(c: &mut Criterion) {
    let tiles = TileRegistry::builtin();
    let mut group = c.benchmark_group("resolve_visible_layers");

    for size in [64usize, 256] {
        let volume = volume(size, 16, 42);
        group.throughput(Throughput::Elements((size * size) as u64));
        group.bench_function(format!("{size}x{size}x16"), |b| {
            b.iter(|| black_box(resolve_visible_layers(black_box(&volume), 15, &tiles)));
        });
    }

    group.finish();
}

fn benchmark_steady_frame(c: &mut Criterion) {
    let ctx = context(AtlasMode::FixedCapacity { layers_per_array: 2, max_arrays: 8 });
    let mut backend = HeadlessBackend::default();
    let mut view = View::new(volume(128, 16, 7), None, &ctx).expect("valid volume");
    let start = Instant::now();
    view.draw(&mut backend, &ctx, start);

    c.bench_function("steady_frame_128x128x16", |b| {
        let mut frame = 0u64;
        b.iter(|| {
            frame += 1;
            let report = view.draw(&mut backend, &ctx, start + Duration::from_millis(frame));
            backend.take_draws();
            black_box(report)
        });
    });
}

fn benchmark_volume_swap(c: &mut Criterion) {
    let ctx = context(AtlasMode::FixedCapacity { layers_per_array: 2, max_arrays: 8 });
    let volumes = [volume(128, 16, 1), volume(128, 16, 2)];
    let mut backend = HeadlessBackend::default();
    let mut view = View::new(volumes[0].clone(), None, &ctx).expect("valid volume");
    let start = Instant::now();

    let mut group = c.benchmark_group("volume_swap");
    group.sample_size(20);
    group.throughput(Throughput::Elements(128 * 128 * 16));
    group.bench_function("128x128x16_alternating", |b| {
        let mut frame = 0u64;
        b.iter(|| {
            frame += 1;
            let next = volumes[(frame % 2) as usize].clone();
            view.set_volume(next, &ctx).expect("same dimensions");
            let report = view.draw(&mut backend, &ctx, start + Duration::from_millis(frame));
            backend.take_draws();
            black_box(report.stats.cells_updated)
        });
    });
    group.finish();
}

fn benchmark_cursor_sweep(c: &mut Criterion) {
    let ctx = context(AtlasMode::SingleResource);
    let mut backend = HeadlessBackend::default();
    let mut view = View::new(volume(64, 32, 3), Some(0), &ctx).expect("valid volume");
    let start = Instant::now();

    c.bench_function("cursor_sweep_64x64x32", |b| {
        let mut frame = 0u64;
        b.iter(|| {
            frame += 1;
            if view.increase_layer() == view.max_layer() {
                view.set_current_layer(0);
            }
            let report = view.draw(&mut backend, &ctx, start + Duration::from_millis(frame * 16));
            backend.take_draws();
            black_box(report.stats.draw_calls)
        });
    });
}

criterion_group!(
    benches,
    benchmark_resolve,
    benchmark_steady_frame,
    benchmark_volume_swap,
    benchmark_cursor_sweep,
);
criterion_main!(benches);
