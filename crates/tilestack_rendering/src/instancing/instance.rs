//! Per-instance data and the quad template.

use bytemuck::{Pod, Zeroable};

/// Per-instance record consumed by the vertex stage.
///
/// One record per grid cell. Hidden cells keep their record with
/// `visible = 0.0` so a cell's index never moves.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct TileInstance {
    /// Cell position `(x, y)` in tiles.
    pub grid_offset: [f32; 2],
    /// Texture index inside the batch's atlas resource.
    pub atlas_depth: f32,
    /// 1.0 when drawn, 0.0 when hidden.
    pub visible: f32,
}

impl TileInstance {
    /// Size in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Creates a record for cell `(x, y)`.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn new(x: usize, y: usize, atlas_depth: u32, visible: bool) -> Self {
        Self {
            grid_offset: [x as f32, y as f32],
            atlas_depth: atlas_depth as f32,
            visible: if visible { 1.0 } else { 0.0 },
        }
    }

    /// A hidden record for cell `(x, y)`.
    #[inline]
    #[must_use]
    pub fn hidden(x: usize, y: usize) -> Self {
        Self::new(x, y, 0, false)
    }

    /// True if the record is drawn.
    #[inline]
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.visible > 0.5
    }

    /// The same record with the visibility flag cleared.
    #[inline]
    #[must_use]
    pub const fn with_hidden(mut self) -> Self {
        self.atlas_depth = 0.0;
        self.visible = 0.0;
        self
    }
}

/// One corner of the unit quad.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct QuadVertex {
    /// Corner offset within the cell, 0..1.
    pub corner: [f32; 2],
    /// Texture coordinate.
    pub uv: [f32; 2],
}

/// Unit quad corners, clockwise from the top-left.
pub const QUAD_VERTICES: [QuadVertex; 4] = [
    QuadVertex { corner: [0.0, 0.0], uv: [0.0, 0.0] },
    QuadVertex { corner: [1.0, 0.0], uv: [1.0, 0.0] },
    QuadVertex { corner: [1.0, 1.0], uv: [1.0, 1.0] },
    QuadVertex { corner: [0.0, 1.0], uv: [0.0, 1.0] },
];

/// Two triangles over [`QUAD_VERTICES`].
pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];
