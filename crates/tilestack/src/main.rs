//! # TILESTACK
//!
//! Command line driver for the layered tile renderer.
//!
//! ```bash
//! # Headless frames with the cursor sweeping through a random volume
//! tilestack simulate --fixture random --layers 12 --frames 60 --sweep
//!
//! # One GPU frame to disk
//! tilestack --config tilestack.toml render --out frame.png
//!
//! # Two-tone clip at 30 fps, JSON logs
//! RUST_LOG=debug tilestack --log-json play --frames-dir clip/ --fps 30
//! ```

mod cli;
mod commands;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::{Cli, Command};

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = commands::load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Simulate { frames, volume, sweep, frame_ms } => {
            commands::simulate(&config, frames, &volume, sweep, frame_ms)
        }
        Command::Render { out, width, height, layer, volume } => {
            commands::render(&config, &out, (width, height), layer, &volume)
        }
        Command::Play { frames_dir, fps, on_tile, off_tile, buffer } => {
            commands::play(&config, &frames_dir, fps, (&on_tile, &off_tile), buffer)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "TILESTACK failed");
            ExitCode::FAILURE
        }
    }
}
