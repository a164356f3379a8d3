//! Subcommand implementations.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context};
use tilestack_rendering::atlas::{DirectoryTextureSource, MemoryTextureSource, TextureSource};
use tilestack_rendering::backend::{GpuBackend, HeadlessBackend, WgpuBackend};
use tilestack_rendering::{spawn_directory_loader, Camera, FrameReport, RenderContext, View};
use tilestack_shared::volume::fixtures;
use tilestack_shared::{
    two_tone_to_volume, FramePacer, RandomVolume, TileRegistry, TilestackConfig, Volume,
};

use crate::cli::{Fixture, VolumeArgs};

/// Loads `path`, or the defaults when no file was given.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<TilestackConfig> {
    match path {
        Some(path) => {
            let config = TilestackConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?;
            tracing::info!(path = %path.display(), "Loaded configuration");
            Ok(config)
        }
        None => Ok(TilestackConfig::default()),
    }
}

/// Builds the selected volume.
pub fn build_volume(args: &VolumeArgs, tiles: &TileRegistry) -> Volume {
    match args.fixture {
        Fixture::Scenario => fixtures::scenario_2x2(),
        Fixture::Stack => fixtures::transparent_stack(),
        Fixture::Random => RandomVolume {
            layers: args.layers.max(1),
            width: args.grid_width.max(1),
            height: args.grid_height.max(1),
            palette: tiles.iter().map(|(id, _)| id).filter(|id| !id.is_air()).collect(),
            air_ratio: args.air_ratio.clamp(0.0, 1.0),
        }
        .generate(args.seed),
    }
}

/// Textures from the configured directory, or flat colours when it is
/// missing so headless runs need no assets.
fn texture_source(config: &TilestackConfig, tiles: &TileRegistry) -> Box<dyn TextureSource> {
    let dir = &config.atlas.texture_dir;
    if dir.is_dir() {
        return Box::new(DirectoryTextureSource::new(dir.clone()));
    }
    tracing::warn!(dir = %dir.display(), "Texture directory missing, using flat colours");
    Box::new(MemoryTextureSource::solid_tiles(
        tiles.iter().filter(|(id, _)| !id.is_air()).map(|(_, desc)| desc.name.as_str()),
    ))
}

fn headless_context(config: &TilestackConfig) -> anyhow::Result<(HeadlessBackend, RenderContext)> {
    let backend = HeadlessBackend::default();
    let tiles = config.tile_registry()?;
    let source = texture_source(config, &tiles);
    let ctx = RenderContext::from_config(config, backend.capabilities(), source.as_ref())
        .context("building render context")?;
    Ok((backend, ctx))
}

/// Logs one HUD line per batch drawn, plus any layer faults.
fn log_frame(frame: u64, cursor: usize, report: &FrameReport) {
    for layer in &report.layers {
        for batch in &layer.batches {
            tracing::info!(
                frame,
                layer = layer.layer_id,
                atlas_resource = batch.atlas_resource_id,
                draw_position = batch.draw_position,
                "HUD"
            );
        }
    }
    for fault in &report.faults {
        tracing::warn!(frame, layer = fault.layer, error = %fault.error, "Layer fault");
    }
    if !report.evicted.is_empty() {
        tracing::debug!(frame, evicted = ?report.evicted, "Evicted layers");
    }
    tracing::debug!(
        frame,
        cursor,
        resolved = report.stats.resolved_layers,
        draws = report.stats.draw_calls,
        updated = report.stats.cells_updated,
        "Frame done"
    );
}

/// Running totals over a session.
#[derive(Debug, Default)]
struct SessionStats {
    frames: u64,
    draw_calls: usize,
    cells_updated: usize,
    layers_created: usize,
    evicted: usize,
    faults: usize,
}

impl SessionStats {
    fn record(&mut self, report: &FrameReport) {
        self.frames += 1;
        self.draw_calls += report.stats.draw_calls;
        self.cells_updated += report.stats.cells_updated;
        self.layers_created += report.stats.layers_created;
        self.evicted += report.evicted.len();
        self.faults += report.faults.len();
    }

    fn log(&self) {
        tracing::info!(
            frames = self.frames,
            draw_calls = self.draw_calls,
            cells_updated = self.cells_updated,
            layers_created = self.layers_created,
            evicted = self.evicted,
            faults = self.faults,
            "Session finished"
        );
    }
}

/// Cursor walk for `--sweep`: down to 0, then back up to the top.
struct Sweep {
    descending: bool,
}

impl Sweep {
    fn step<B: GpuBackend>(&mut self, view: &mut View<B>) {
        if self.descending && view.current_layer() == 0 {
            self.descending = false;
        } else if !self.descending && view.current_layer() == view.max_layer() {
            self.descending = true;
        }
        if self.descending {
            view.decrease_layer();
        } else {
            view.increase_layer();
        }
    }
}

/// `tilestack simulate`
pub fn simulate(
    config: &TilestackConfig,
    frames: u32,
    volume: &VolumeArgs,
    sweep: bool,
    frame_ms: u64,
) -> anyhow::Result<()> {
    let (mut backend, ctx) = headless_context(config)?;
    let mut view = View::new(build_volume(volume, &ctx.tiles), config.view.start_layer, &ctx)?;
    let mut sweep = sweep.then_some(Sweep { descending: true });
    let mut stats = SessionStats::default();
    let start = Instant::now();

    for frame in 0..u64::from(frames) {
        let now = start + Duration::from_millis(frame * frame_ms);
        let report = view.draw(&mut backend, &ctx, now);
        log_frame(frame, view.current_layer(), &report);
        stats.record(&report);
        backend.take_draws();
        if let Some(sweep) = sweep.as_mut() {
            sweep.step(&mut view);
        }
    }

    view.dispose(&mut backend);
    stats.log();
    Ok(())
}

/// `tilestack render`
pub fn render(
    config: &TilestackConfig,
    out: &Path,
    (width, height): (u32, u32),
    layer: Option<usize>,
    volume: &VolumeArgs,
) -> anyhow::Result<()> {
    let mut backend = WgpuBackend::new(width, height).context("opening GPU")?;
    let tiles = config.tile_registry()?;
    let source = DirectoryTextureSource::new(config.atlas.texture_dir.clone());
    let mut ctx = RenderContext::from_config(config, backend.capabilities(), &source)
        .context("building render context")?;
    backend.install_atlas(&ctx.atlas)?;

    let volume = build_volume(volume, &tiles);
    let mut view = View::new(volume, layer.or(config.view.start_layer), &ctx)?;

    #[allow(clippy::cast_precision_loss)]
    let aspect = width as f32 / height.max(1) as f32;
    let (grid_w, grid_h, _) = view.volume().dimensions();
    ctx.camera = Camera::framing(grid_w, grid_h, ctx.settings.tile_size, aspect);

    backend.begin_frame(ctx.camera.view_proj(aspect), ctx.settings.tile_size);
    let report = view.draw(&mut backend, &ctx, Instant::now());
    log_frame(0, view.current_layer(), &report);
    backend.end_frame()?;

    let image = backend.read_pixels()?;
    image.save(out).with_context(|| format!("writing {}", out.display()))?;
    view.dispose(&mut backend);
    tracing::info!(
        out = %out.display(),
        layers = report.layers.len(),
        draws = report.stats.draw_calls,
        "Rendered frame"
    );
    Ok(())
}

/// `tilestack play`
pub fn play(
    config: &TilestackConfig,
    frames_dir: &Path,
    fps: f32,
    (on_tile, off_tile): (&str, &str),
    buffer: usize,
) -> anyhow::Result<()> {
    let (mut backend, ctx) = headless_context(config)?;
    let on = ctx.tiles.require(on_tile)?;
    let off = ctx.tiles.require(off_tile)?;
    let pacer = FramePacer::new(fps);
    let (mut feed, loader) = spawn_directory_loader(frames_dir, buffer, Some(pacer))?;

    let mut view: Option<View<HeadlessBackend>> = None;
    let mut stats = SessionStats::default();
    let start = Instant::now();
    let mut tick = 0u32;

    loop {
        if let Some(frame) = feed.latest() {
            let volume = two_tone_to_volume(&frame, on, off);
            match view.as_mut() {
                Some(view) => view.set_volume(volume, &ctx)?,
                None => view = Some(View::new(volume, None, &ctx)?),
            }
        } else if feed.is_finished() {
            break;
        }

        if let Some(view) = view.as_mut() {
            let report = view.draw(&mut backend, &ctx, Instant::now());
            log_frame(stats.frames, view.current_layer(), &report);
            stats.record(&report);
            backend.take_draws();
        }

        tick = tick.saturating_add(1);
        let due = start + pacer.frame_duration() * tick;
        std::thread::sleep(due.saturating_duration_since(Instant::now()));
    }

    let sent = loader
        .join()
        .map_err(|_| anyhow!("frame loader thread panicked"))??;
    if let Some(view) = view.as_mut() {
        view.dispose(&mut backend);
    }
    tracing::info!(sent, dropped = feed.dropped(), "Playback finished");
    stats.log();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tilestack_shared::TileId;

    fn args(fixture: Fixture) -> VolumeArgs {
        VolumeArgs { fixture, seed: 5, layers: 4, grid_width: 6, grid_height: 3, air_ratio: 0.5 }
    }

    #[test]
    fn test_build_random_volume_uses_arguments() {
        let tiles = TileRegistry::builtin();
        let volume = build_volume(&args(Fixture::Random), &tiles);
        assert_eq!(volume.dimensions(), (6, 3, 4));
        assert_eq!(volume, build_volume(&args(Fixture::Random), &tiles));
    }

    #[test]
    fn test_missing_texture_dir_falls_back_to_colours() {
        let mut config = TilestackConfig::default();
        config.atlas.texture_dir = PathBuf::from("/nonexistent/tilestack/textures");
        let (_, ctx) = headless_context(&config).unwrap();
        assert_eq!(ctx.tiles.len(), 9);
        assert!(ctx.atlas.resolve(TileId(8)).is_ok());
    }

    #[test]
    fn test_sweep_walks_down_then_up() {
        let config = TilestackConfig::default();
        let (mut backend, ctx) = headless_context(&config).unwrap();
        let mut view: View<HeadlessBackend> = View::new(fixtures::transparent_stack(), None, &ctx).unwrap();
        let mut sweep = Sweep { descending: true };
        let mut cursors = Vec::new();
        for _ in 0..6 {
            sweep.step(&mut view);
            cursors.push(view.current_layer());
        }
        assert_eq!(cursors, vec![1, 0, 1, 2, 1, 0]);
        view.dispose(&mut backend);
    }

    #[test]
    fn test_simulate_runs_headless() {
        let mut config = TilestackConfig::default();
        config.atlas.texture_dir = PathBuf::from("/nonexistent/tilestack/textures");
        simulate(&config, 5, &args(Fixture::Stack), true, 400).unwrap();
    }
}
