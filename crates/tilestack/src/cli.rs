//! Command line definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// `tilestack` - draws a layered tile volume seen from above.
///
/// Every layer below the cursor that can be seen through the layers above
/// it is drawn, one instanced draw per layer and atlas resource.
#[derive(Parser, Debug)]
#[command(name = "tilestack", version, about, long_about = None)]
pub struct Cli {
    /// TOML configuration file. Every section is optional.
    #[arg(long, global = true, env = "TILESTACK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// What to run.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run headless frames and log what each one draws
    Simulate {
        /// Frames to run
        #[arg(long, default_value_t = 10)]
        frames: u32,
        #[command(flatten)]
        volume: VolumeArgs,
        /// Walk the cursor down to 0 and back up, one layer per frame
        #[arg(long)]
        sweep: bool,
        /// Milliseconds of simulated time between frames
        #[arg(long, default_value_t = 16)]
        frame_ms: u64,
    },
    /// Draw one frame on the GPU and write it to a PNG
    Render {
        /// Output PNG path
        #[arg(long, short)]
        out: PathBuf,
        /// Image width in pixels
        #[arg(long, default_value_t = 512)]
        width: u32,
        /// Image height in pixels
        #[arg(long, default_value_t = 512)]
        height: u32,
        /// Layer cursor; defaults to the configured start layer or the top
        #[arg(long)]
        layer: Option<usize>,
        #[command(flatten)]
        volume: VolumeArgs,
    },
    /// Stream a directory of two-tone frames through the view
    Play {
        /// Directory of `*.png` / `*.bmp` frames, played in name order
        #[arg(long)]
        frames_dir: PathBuf,
        /// Playback rate
        #[arg(long, default_value_t = 30.0)]
        fps: f32,
        /// Tile drawn for "on" pixels
        #[arg(long, default_value = "stone")]
        on_tile: String,
        /// Tile drawn for "off" pixels
        #[arg(long, default_value = "dirt")]
        off_tile: String,
        /// Frames buffered between the loader and the view
        #[arg(long, default_value_t = 4)]
        buffer: usize,
    },
}

/// Built-in volumes.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fixture {
    /// Two 2x2 layers with a glass pane over a dirt floor
    Scenario,
    /// Seeded random volume
    Random,
    /// Three 2x1 layers of stone and glass
    Stack,
}

/// Volume selection shared by `simulate` and `render`.
#[derive(clap::Args, Debug, Clone)]
pub struct VolumeArgs {
    /// Volume to load
    #[arg(long, value_enum, default_value_t = Fixture::Scenario)]
    pub fixture: Fixture,
    /// Seed for `--fixture random`
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
    /// Layers for `--fixture random`
    #[arg(long, default_value_t = 8)]
    pub layers: usize,
    /// Width for `--fixture random`
    #[arg(long, default_value_t = 32)]
    pub grid_width: usize,
    /// Height for `--fixture random`
    #[arg(long, default_value_t = 32)]
    pub grid_height: usize,
    /// Share of air cells for `--fixture random`
    #[arg(long, default_value_t = 0.3)]
    pub air_ratio: f64,
}
