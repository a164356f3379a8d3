//! Top-down visibility walk.
//!
//! Starting at the cursor layer, every column stays "open" while the tiles
//! above it are see-through. Each visited layer yields a grid of
//! [`VisibleCell`]s: open columns copy the volume's tile, closed columns
//! become hidden air. The walk stops at the first layer after which no
//! column is open, so an opaque floor bounds the work to one layer.
//!
//! Layers whose volume cells are all air are dropped, and the survivors
//! are returned bottom-first with dense indices.

use tilestack_shared::{Grid2D, TileId, TileRegistry, Volume};

/// Resolved state of one `(x, y)` cell in one visible layer.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VisibleCell {
    /// Tile shown here; air when hidden.
    pub tile_id: TileId,
    /// Position in the visible stack: 0 at the cursor, growing downward.
    pub depth: f32,
    /// False for air and for cells under an opaque tile.
    pub is_visible: bool,
}

impl VisibleCell {
    /// A visible tile (air is never visible).
    #[inline]
    #[must_use]
    pub fn shown(tile_id: TileId, depth: f32) -> Self {
        Self { tile_id, depth, is_visible: !tile_id.is_air() }
    }

    /// A cell blocked from view.
    #[inline]
    #[must_use]
    pub const fn hidden(depth: f32) -> Self {
        Self { tile_id: TileId::AIR, depth, is_visible: false }
    }
}

/// One resolved 2D layer.
pub type VisibleGrid = Grid2D<VisibleCell>;

/// A retained layer and the volume layer it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLayer {
    /// Volume layer index.
    pub source_layer: usize,
    /// Per-cell visibility.
    pub grid: VisibleGrid,
}

/// Resolves what is visible looking down from `current_layer`.
///
/// The result is ordered bottom-first; its indices are the dense layer
/// indices used by the batch managers. A cursor above the volume is
/// clamped to the top layer.
#[must_use]
pub fn resolve_visible_layers(volume: &Volume, current_layer: usize, tiles: &TileRegistry) -> Vec<ResolvedLayer> {
    let Some(top) = volume.depth().checked_sub(1) else {
        return Vec::new();
    };
    let current = current_layer.min(top);
    let (width, height) = (volume.width(), volume.height());
    let cell_count = width * height;

    let mut open = vec![true; cell_count];
    let mut retained = Vec::new();

    for layer in (0..=current).rev() {
        let Some(source) = volume.layer_cells(layer) else {
            break;
        };
        #[allow(clippy::cast_precision_loss)]
        let depth = (current - layer) as f32;

        let mut air_count = 0;
        let mut still_open = false;
        let mut cells = Vec::with_capacity(cell_count);

        for (column, &tile) in open.iter_mut().zip(source) {
            if tile.is_air() {
                air_count += 1;
            }
            if *column {
                *column = !tiles.is_opaque(tile);
                still_open |= *column;
                cells.push(VisibleCell::shown(tile, depth));
            } else {
                cells.push(VisibleCell::hidden(depth));
            }
        }

        if air_count < cell_count {
            if let Ok(grid) = Grid2D::from_vec(width, height, cells) {
                retained.push(ResolvedLayer { source_layer: layer, grid });
            }
        } else {
            tracing::trace!(layer, "Dropping all-air layer");
        }

        if !still_open {
            break;
        }
    }

    retained.reverse();
    retained
}

#[cfg(test)]
mod tests {
    use super::*;
    use tilestack_shared::volume::fixtures;
    use tilestack_shared::Grid3D;

    const DIRT: TileId = TileId(1);
    const STONE: TileId = TileId(3);
    const GLASS: TileId = TileId(8);

    fn cell(layer: &ResolvedLayer, x: usize, y: usize) -> VisibleCell {
        *layer.grid.get(x, y).unwrap()
    }

    #[test]
    fn test_opaque_top_yields_one_layer() {
        let volume = fixtures::flat(6, 4, 4, STONE);
        let layers = resolve_visible_layers(&volume, 5, &TileRegistry::builtin());
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].source_layer, 5);
        assert!(layers[0].grid.cells().iter().all(|c| c.is_visible && c.depth == 0.0));
    }

    #[test]
    fn test_transparent_stack_depths() {
        let volume = fixtures::transparent_stack();
        let layers = resolve_visible_layers(&volume, 2, &TileRegistry::builtin());
        assert_eq!(layers.len(), 3);

        // Bottom-first: index 0 is volume layer 0
        assert_eq!(cell(&layers[2], 0, 0), VisibleCell { tile_id: TileId::AIR, depth: 0.0, is_visible: false });
        assert_eq!(cell(&layers[1], 0, 0), VisibleCell { tile_id: GLASS, depth: 1.0, is_visible: true });
        assert_eq!(cell(&layers[0], 0, 0), VisibleCell { tile_id: STONE, depth: 2.0, is_visible: true });

        // The all-stone column stops at the top
        assert!(cell(&layers[2], 1, 0).is_visible);
        assert!(!cell(&layers[1], 1, 0).is_visible);
        assert!(!cell(&layers[0], 1, 0).is_visible);
    }

    #[test]
    fn test_scenario_2x2() {
        let volume = fixtures::scenario_2x2();
        let layers = resolve_visible_layers(&volume, 1, &TileRegistry::builtin());
        assert_eq!(layers.len(), 2);
        let (bottom, top) = (&layers[0], &layers[1]);

        // Air at the top is not drawn
        assert!(!cell(top, 0, 0).is_visible);
        // Glass is drawn, and so is the dirt beneath it
        assert_eq!(cell(top, 0, 1), VisibleCell { tile_id: GLASS, depth: 0.0, is_visible: true });
        assert_eq!(cell(bottom, 0, 1), VisibleCell { tile_id: DIRT, depth: 1.0, is_visible: true });
        // Opaque dirt at the top hides the floor
        for y in 0..2 {
            assert!(cell(top, 1, y).is_visible);
            assert_eq!(cell(bottom, 1, y), VisibleCell::hidden(1.0));
        }
    }

    #[test]
    fn test_all_air_layer_elided_mid_walk() {
        // layer 2: glass, layer 1: air, layer 0: stone
        let mut volume = Grid3D::new(3, 2, 2, TileId::AIR);
        for y in 0..2 {
            for x in 0..2 {
                volume.set(2, x, y, GLASS).unwrap();
                volume.set(0, x, y, STONE).unwrap();
            }
        }
        let layers = resolve_visible_layers(&volume, 2, &TileRegistry::builtin());
        assert_eq!(layers.len(), 2);
        assert_eq!(layers[0].source_layer, 0);
        assert_eq!(layers[1].source_layer, 2);
        // Depth keeps the distance to the cursor
        assert_eq!(cell(&layers[0], 0, 0).depth, 2.0);
    }

    #[test]
    fn test_see_through_column_walks_to_bottom() {
        let mut volume = fixtures::flat(5, 1, 1, GLASS);
        volume.set(0, 0, 0, TileId::AIR).unwrap();
        let layers = resolve_visible_layers(&volume, 4, &TileRegistry::builtin());
        // layer 0 is all air and dropped; 1..=4 are glass
        assert_eq!(layers.len(), 4);
        assert_eq!(layers[0].source_layer, 1);
    }

    #[test]
    fn test_cursor_is_clamped() {
        let volume = fixtures::flat(2, 1, 1, STONE);
        let layers = resolve_visible_layers(&volume, 10, &TileRegistry::builtin());
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].source_layer, 1);
    }

    #[test]
    fn test_cursor_below_lets_upper_layers_vanish() {
        let volume = fixtures::transparent_stack();
        let layers = resolve_visible_layers(&volume, 1, &TileRegistry::builtin());
        assert_eq!(layers.len(), 2);
        assert_eq!(cell(&layers[1], 0, 0).depth, 0.0);
        assert_eq!(cell(&layers[1], 0, 0).tile_id, GLASS);
    }
}
