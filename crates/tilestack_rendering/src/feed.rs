//! # Two-Tone Frame Feed
//!
//! Streams decoded two-tone frames from a loader thread to the render
//! thread.
//!
//! ```text
//! ┌──────────────┐  bounded   ┌─────────────┐  latest()  ┌──────────┐
//! │ frame-loader │──────────> │  FrameFeed  │──────────> │   View   │
//! │  (decode)    │  channel   │  (drain)    │  between   │          │
//! └──────────────┘            └─────────────┘  frames    └──────────┘
//! ```
//!
//! The render thread only ever applies the newest frame; anything older
//! still queued is dropped and counted.

use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use image::RgbaImage;
use tilestack_shared::{FramePacer, Grid2D, TwoToneFrame};

use crate::error::{FeedError, FeedResult};

/// Converts a decoded bitmap into a two-tone frame.
///
/// A pixel is "on" when its red channel is exactly 255.
#[must_use]
pub fn two_tone_from_rgba(image: &RgbaImage) -> TwoToneFrame {
    let (width, height) = image.dimensions();
    Grid2D::from_fn(width as usize, height as usize, |x, y| {
        #[allow(clippy::cast_possible_truncation)]
        let pixel = image.get_pixel(x as u32, y as u32);
        pixel[0] == u8::MAX
    })
}

/// Decodes one frame file.
///
/// # Errors
///
/// Returns [`FeedError::Image`] if the file cannot be decoded.
pub fn decode_two_tone(path: &Path) -> FeedResult<TwoToneFrame> {
    let image = image::open(path)
        .map_err(|source| FeedError::Image { path: path.to_path_buf(), source })?
        .to_rgba8();
    Ok(two_tone_from_rgba(&image))
}

/// `*.png` and `*.bmp` files in `dir`, sorted by file name.
///
/// # Errors
///
/// Returns [`FeedError::Io`] if the directory cannot be read and
/// [`FeedError::NoFrames`] if it holds no frames.
pub fn list_frames(dir: &Path) -> FeedResult<Vec<PathBuf>> {
    let io_error = |source| FeedError::Io { path: dir.to_path_buf(), source };
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_error)? {
        let path = entry.map_err(io_error)?.path();
        let is_frame = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("png") || ext.eq_ignore_ascii_case("bmp"));
        if is_frame && path.is_file() {
            paths.push(path);
        }
    }
    if paths.is_empty() {
        return Err(FeedError::NoFrames(dir.to_path_buf()));
    }
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(paths)
}

/// Producer side of a [`FrameFeed`].
#[derive(Debug, Clone)]
pub struct FrameSender {
    sender: Sender<TwoToneFrame>,
}

impl FrameSender {
    /// Sends a frame without blocking.
    ///
    /// Returns `false` if the channel is full or the feed is gone.
    #[inline]
    pub fn send(&self, frame: TwoToneFrame) -> bool {
        match self.sender.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => false,
        }
    }

    /// Sends a frame, waiting for room.
    ///
    /// Returns `false` once the feed has been dropped.
    #[inline]
    pub fn send_blocking(&self, frame: TwoToneFrame) -> bool {
        self.sender.send(frame).is_ok()
    }
}

/// Consumer side: hands the render thread the newest frame.
#[derive(Debug)]
pub struct FrameFeed {
    receiver: Receiver<TwoToneFrame>,
    dropped: usize,
    disconnected: bool,
}

impl FrameFeed {
    /// Creates a connected sender and feed holding up to `capacity` frames.
    #[must_use]
    pub fn channel(capacity: usize) -> (FrameSender, Self) {
        let (sender, receiver) = bounded(capacity.max(1));
        let feed = Self { receiver, dropped: 0, disconnected: false };
        (FrameSender { sender }, feed)
    }

    /// Drains the channel and returns the newest frame, if any arrived.
    pub fn latest(&mut self) -> Option<TwoToneFrame> {
        let mut newest = None;
        let mut skipped = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(frame) => {
                    if newest.replace(frame).is_some() {
                        skipped += 1;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.disconnected = true;
                    break;
                }
            }
        }
        if skipped > 0 {
            self.dropped += skipped;
            tracing::warn!(skipped, total = self.dropped, "Dropped stale frames");
        }
        newest
    }

    /// Frames dropped so far.
    #[must_use]
    pub const fn dropped(&self) -> usize {
        self.dropped
    }

    /// True once the producer has hung up and everything was drained.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.disconnected && self.receiver.is_empty()
    }
}

/// Spawns a thread decoding every frame in `dir` into a new feed.
///
/// With a pacer, frame `i` is sent no earlier than `i` frame durations
/// after start. The thread returns the number of frames sent and stops
/// early if the feed is dropped.
///
/// # Errors
///
/// Fails if the directory cannot be listed, holds no frames, or the
/// thread cannot be spawned.
pub fn spawn_directory_loader(
    dir: &Path,
    capacity: usize,
    pacer: Option<FramePacer>,
) -> FeedResult<(FrameFeed, JoinHandle<FeedResult<usize>>)> {
    let paths = list_frames(dir)?;
    let (sender, feed) = FrameFeed::channel(capacity);
    tracing::info!(dir = %dir.display(), frames = paths.len(), "Starting frame loader");

    let handle = std::thread::Builder::new()
        .name("frame-loader".into())
        .spawn(move || {
            let start = Instant::now();
            let mut sent = 0;
            for (index, path) in paths.iter().enumerate() {
                let frame = decode_two_tone(path)?;
                if let Some(pacer) = pacer {
                    #[allow(clippy::cast_possible_truncation)]
                    let due = start + pacer.frame_duration() * index as u32;
                    std::thread::sleep(due.saturating_duration_since(Instant::now()));
                }
                if !sender.send_blocking(frame) {
                    tracing::debug!(sent, "Frame feed closed, loader stopping");
                    break;
                }
                sent += 1;
            }
            Ok(sent)
        })
        .map_err(|source| FeedError::Io { path: dir.to_path_buf(), source })?;

    Ok((feed, handle))
}
