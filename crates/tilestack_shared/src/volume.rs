//! Volume sources.
//!
//! A [`Volume`] is the full `[layer][x][y]` tile stack owned by the view.
//! This module produces volumes from fixtures, deterministic random fill,
//! and two-tone video frames.

use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::grid::{Grid2D, Grid3D};
use crate::tile::TileId;

/// Layered tile volume, layer 0 at the bottom.
pub type Volume = Grid3D<TileId>;

/// One decoded video frame: `true` where the pixel is "on".
pub type TwoToneFrame = Grid2D<bool>;

/// Maps a two-tone frame onto a one-layer volume.
#[must_use]
pub fn two_tone_to_volume(frame: &TwoToneFrame, on: TileId, off: TileId) -> Volume {
    Grid3D::from_layer(frame.map(|&lit| if lit { on } else { off }))
}

/// Parameters for a deterministic random volume.
#[derive(Debug, Clone)]
pub struct RandomVolume {
    /// Layer count.
    pub layers: usize,
    /// Width of each layer.
    pub width: usize,
    /// Height of each layer.
    pub height: usize,
    /// Non-air tiles to draw from.
    pub palette: Vec<TileId>,
    /// Probability of a cell being air.
    pub air_ratio: f64,
}

impl RandomVolume {
    /// Generates the volume. The same seed always yields the same volume.
    #[must_use]
    pub fn generate(&self, seed: u64) -> Volume {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let air_ratio = self.air_ratio.clamp(0.0, 1.0);

        Grid3D::from_fn(self.layers, self.width, self.height, |_, _, _| {
            if self.palette.is_empty() || rng.gen_bool(air_ratio) {
                TileId::AIR
            } else {
                self.palette[rng.gen_range(0..self.palette.len())]
            }
        })
    }
}

/// Converts elapsed playback time into a frame index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FramePacer {
    fps: f32,
}

impl FramePacer {
    /// Creates a pacer. Non-positive rates fall back to 30 fps.
    #[must_use]
    pub fn new(fps: f32) -> Self {
        let fps = if fps.is_finite() && fps > 0.0 { fps } else { 30.0 };
        Self { fps }
    }

    /// Frames per second.
    #[must_use]
    pub const fn fps(&self) -> f32 {
        self.fps
    }

    /// Time one frame stays on screen.
    #[must_use]
    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.fps))
    }

    /// Index of the frame showing after `elapsed`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn frame_index(&self, elapsed: Duration) -> usize {
        (elapsed.as_secs_f64() * f64::from(self.fps)).floor() as usize
    }
}

/// Hand-built volumes.
pub mod fixtures {
    use super::{Grid3D, TileId, Volume};

    const AIR: u16 = 0;
    const DIRT: u16 = 1;
    const STONE: u16 = 3;
    const GLASS: u16 = 8;

    /// `cells[layer][x][y]`, layer 0 at the bottom.
    fn build<const L: usize, const W: usize, const H: usize>(cells: [[[u16; H]; W]; L]) -> Volume {
        Grid3D::from_fn(L, W, H, |layer, x, y| TileId(cells[layer][x][y]))
    }

    /// Two 2x2 layers: a dirt floor under `[[air, glass], [dirt, dirt]]`.
    #[must_use]
    pub fn scenario_2x2() -> Volume {
        build([[[DIRT, DIRT], [DIRT, DIRT]], [[AIR, GLASS], [DIRT, DIRT]]])
    }

    /// Three 2x1 layers. Column x=0 reads `air, glass, stone` from the top
    /// down; column x=1 is stone all the way.
    #[must_use]
    pub fn transparent_stack() -> Volume {
        build([[[STONE], [STONE]], [[GLASS], [STONE]], [[AIR], [STONE]]])
    }

    /// Every cell set to `tile`.
    #[must_use]
    pub fn flat(layers: usize, width: usize, height: usize, tile: TileId) -> Volume {
        Grid3D::new(layers, width, height, tile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_tone_to_volume() {
        let frame = Grid2D::from_vec(2, 1, vec![true, false]).unwrap();
        let volume = two_tone_to_volume(&frame, TileId(3), TileId(1));
        assert_eq!(volume.dimensions(), (2, 1, 1));
        assert_eq!(volume.get(0, 0, 0), Some(&TileId(3)));
        assert_eq!(volume.get(0, 1, 0), Some(&TileId(1)));
    }

    #[test]
    fn test_random_volume_deterministic() {
        let params = RandomVolume {
            layers: 4,
            width: 8,
            height: 8,
            palette: vec![TileId(1), TileId(3), TileId(8)],
            air_ratio: 0.3,
        };
        assert_eq!(params.generate(7), params.generate(7));
        assert_ne!(params.generate(7), params.generate(8));
        assert!(params
            .generate(7)
            .cells()
            .iter()
            .all(|id| id.is_air() || params.palette.contains(id)));
    }

    #[test]
    fn test_random_volume_all_air() {
        let params = RandomVolume {
            layers: 2,
            width: 3,
            height: 3,
            palette: vec![TileId(1)],
            air_ratio: 1.0,
        };
        assert!(params.generate(1).cells().iter().all(|id| id.is_air()));
    }

    #[test]
    fn test_frame_pacer() {
        let pacer = FramePacer::new(10.0);
        assert_eq!(pacer.frame_index(Duration::from_millis(0)), 0);
        assert_eq!(pacer.frame_index(Duration::from_millis(250)), 2);
        assert_eq!(pacer.frame_duration(), Duration::from_millis(100));
        assert!((FramePacer::new(0.0).fps() - 30.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_scenario_fixture_layout() {
        let volume = fixtures::scenario_2x2();
        assert_eq!(volume.dimensions(), (2, 2, 2));
        assert_eq!(volume.get(1, 0, 0), Some(&TileId::AIR));
        assert_eq!(volume.get(1, 0, 1), Some(&TileId(8)));
        assert_eq!(volume.get(1, 1, 0), Some(&TileId(1)));
    }
}
