//! 2D orthographic camera looking straight down the layer stack.
//!
//! World space: `x` grows right, `y` grows down the grid rows, `z` is the
//! batch draw position. Larger `z` maps to smaller clip depth so that
//! upper layers win the depth test.

/// Orthographic camera over the tile grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// World-space point at the centre of the screen.
    pub position: [f32; 2],
    /// Half the visible height in world units at zoom 1.
    pub half_height: f32,
    /// Magnification; 2.0 shows half as much.
    pub zoom: f32,
    /// Largest draw position that stays inside the depth range.
    pub depth_far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0],
            half_height: 1.0,
            zoom: 1.0,
            depth_far: 1024.0,
        }
    }
}

impl Camera {
    /// A camera framing a `width x height` grid of `tile_size` tiles.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn framing(width: usize, height: usize, tile_size: f32, aspect: f32) -> Self {
        let world_w = width as f32 * tile_size;
        let world_h = height as f32 * tile_size;
        let aspect = if aspect > 0.0 { aspect } else { 1.0 };
        Self {
            position: [world_w * 0.5, world_h * 0.5],
            half_height: (world_h * 0.5).max(world_w * 0.5 / aspect).max(f32::EPSILON),
            ..Self::default()
        }
    }

    /// Column-major view-projection matrix for a viewport of `aspect`
    /// (width / height).
    #[must_use]
    pub fn view_proj(&self, aspect: f32) -> [[f32; 4]; 4] {
        let half_h = self.half_height / self.zoom.max(f32::EPSILON);
        let half_w = half_h * if aspect > 0.0 { aspect } else { 1.0 };
        let sx = 1.0 / half_w;
        // Rows grow downward on screen
        let sy = -1.0 / half_h;
        let sz = -1.0 / self.depth_far.max(f32::EPSILON);
        [
            [sx, 0.0, 0.0, 0.0],
            [0.0, sy, 0.0, 0.0],
            [0.0, 0.0, sz, 0.0],
            [-sx * self.position[0], -sy * self.position[1], 1.0, 1.0],
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transform(m: &[[f32; 4]; 4], p: [f32; 3]) -> [f32; 3] {
        let mut out = [0.0; 3];
        for (row, value) in out.iter_mut().enumerate() {
            *value = m[0][row] * p[0] + m[1][row] * p[1] + m[2][row] * p[2] + m[3][row];
        }
        out
    }

    #[test]
    fn test_framing_centres_grid() {
        let camera = Camera::framing(4, 2, 1.0, 1.0);
        let m = camera.view_proj(1.0);

        let centre = transform(&m, [2.0, 1.0, 0.0]);
        assert!(centre[0].abs() < 1e-6 && centre[1].abs() < 1e-6);

        // Wider than tall: x fills the viewport
        let corner = transform(&m, [0.0, 0.0, 0.0]);
        assert!((corner[0] + 1.0).abs() < 1e-6);
        assert!((corner[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_higher_positions_are_nearer() {
        let m = Camera::default().view_proj(1.0);
        let low = transform(&m, [0.0, 0.0, 0.0])[2];
        let high = transform(&m, [0.0, 0.0, 4.15])[2];
        assert!((low - 1.0).abs() < 1e-6);
        assert!(high < low && high > 0.0);
    }

    #[test]
    fn test_zoom_shrinks_view() {
        let camera = Camera { zoom: 2.0, ..Camera::default() };
        let p = transform(&camera.view_proj(1.0), [0.5, 0.0, 0.0]);
        assert!((p[0] - 1.0).abs() < 1e-6);
    }
}
