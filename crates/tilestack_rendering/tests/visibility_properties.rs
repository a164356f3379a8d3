//! # Visibility Resolver Properties
//!
//! Whole-volume checks of the top-down walk, using fixtures and seeded
//! random volumes.

use tilestack_rendering::visibility::resolve_visible_layers;
use tilestack_shared::volume::fixtures;
use tilestack_shared::{Grid3D, RandomVolume, TileId, TileRegistry, TileTypeDescriptor};

const AIR: TileId = TileId::AIR;
const DIRT: TileId = TileId(1);
const SAND: TileId = TileId(2);
const STONE: TileId = TileId(3);
const GLASS: TileId = TileId(8);

fn random(layers: usize, palette: Vec<TileId>, air_ratio: f64, seed: u64) -> Grid3D<TileId> {
    RandomVolume { layers, width: 6, height: 5, palette, air_ratio }.generate(seed)
}

#[test]
fn test_opaque_below_cursor_yields_one_layer() {
    let tiles = TileRegistry::builtin();
    for seed in 0..20 {
        let volume = random(8, vec![DIRT, SAND, STONE], 0.0, seed);
        for cursor in 0..8 {
            let layers = resolve_visible_layers(&volume, cursor, &tiles);
            assert_eq!(layers.len(), 1, "seed {seed} cursor {cursor}");
            assert_eq!(layers[0].source_layer, cursor);
        }
    }
}

#[test]
fn test_transparent_stacking() {
    let layers = resolve_visible_layers(&fixtures::transparent_stack(), 2, &TileRegistry::builtin());
    assert_eq!(layers.len(), 3);

    // Column x=0: air, glass, stone from the top
    let column: Vec<_> = layers.iter().rev().map(|layer| *layer.grid.get(0, 0).unwrap()).collect();
    assert_eq!(column.iter().map(|cell| cell.depth).collect::<Vec<_>>(), vec![0.0, 1.0, 2.0]);
    assert_eq!(column[1].tile_id, GLASS);
    assert_eq!(column[2].tile_id, STONE);
    assert!(column[2].is_visible);

    // Column x=1: stone only shows at the cursor
    let stone: Vec<_> = layers.iter().rev().map(|layer| layer.grid.get(1, 0).unwrap().is_visible).collect();
    assert_eq!(stone, vec![true, false, false]);
}

#[test]
fn test_all_air_layer_elided_between_populated_layers() {
    let mut volume = Grid3D::new(3, 2, 2, AIR);
    for y in 0..2 {
        for x in 0..2 {
            volume.set(2, x, y, GLASS).unwrap();
            volume.set(0, x, y, STONE).unwrap();
        }
    }
    let layers = resolve_visible_layers(&volume, 2, &TileRegistry::builtin());
    let sources: Vec<usize> = layers.iter().map(|layer| layer.source_layer).collect();
    assert_eq!(sources, vec![0, 2]);
    // Depth still counts the skipped layer
    assert!(layers[0].grid.cells().iter().all(|cell| cell.depth == 2.0 && cell.is_visible));
}

#[test]
fn test_scenario_2x2() {
    let layers = resolve_visible_layers(&fixtures::scenario_2x2(), 1, &TileRegistry::builtin());
    assert_eq!(layers.len(), 2);
    let (bottom, top) = (&layers[0].grid, &layers[1].grid);

    let air = top.get(0, 0).unwrap();
    assert_eq!(air.tile_id, AIR);
    assert!(!air.is_visible);

    let glass = top.get(0, 1).unwrap();
    assert_eq!((glass.tile_id, glass.depth, glass.is_visible), (GLASS, 0.0, true));

    let under_glass = bottom.get(0, 1).unwrap();
    assert_eq!((under_glass.tile_id, under_glass.depth, under_glass.is_visible), (DIRT, 1.0, true));

    for y in 0..2 {
        assert!(top.get(1, y).unwrap().is_visible);
        assert!(!bottom.get(1, y).unwrap().is_visible);
    }
}

#[test]
fn test_random_volumes_hold_walk_invariants() {
    let tiles = TileRegistry::builtin();
    for seed in 0..50 {
        let volume = random(6, vec![DIRT, STONE, GLASS], 0.4, seed);
        let cursor = (seed as usize) % 6;
        let layers = resolve_visible_layers(&volume, cursor, &tiles);

        // Bottom-first, strictly ascending, never above the cursor
        assert!(layers.windows(2).all(|pair| pair[0].source_layer < pair[1].source_layer));
        assert!(layers.iter().all(|layer| layer.source_layer <= cursor));

        for layer in &layers {
            let source = volume.layer_cells(layer.source_layer).unwrap();
            assert!(source.iter().any(|tile| !tile.is_air()), "seed {seed}: all-air layer kept");

            #[allow(clippy::cast_precision_loss)]
            let depth = (cursor - layer.source_layer) as f32;
            for cell in layer.grid.cells() {
                assert_eq!(cell.depth, depth);
                assert!(!(cell.is_visible && cell.tile_id.is_air()));
            }
        }
    }
}

#[test]
fn test_visible_cells_have_see_through_tiles_above() {
    let tiles = TileRegistry::builtin();
    for seed in 100..130 {
        let volume = random(5, vec![DIRT, GLASS], 0.5, seed);
        let layers = resolve_visible_layers(&volume, 4, &tiles);
        for layer in &layers {
            for (x, y, cell) in layer.grid.iter_cells() {
                if !cell.is_visible {
                    continue;
                }
                for above in layer.source_layer + 1..=4 {
                    let tile = *volume.get(above, x, y).unwrap();
                    assert!(!tiles.is_opaque(tile), "seed {seed}: ({x}, {y}) visible under {tile}");
                }
            }
        }
    }
}

#[test]
fn test_opacity_follows_descriptor_flag() {
    let mut descriptors: Vec<TileTypeDescriptor> = TileRegistry::builtin().iter().map(|(_, desc)| desc.clone()).collect();
    descriptors[STONE.index()].opaque = false;
    let clear_stone = TileRegistry::from_descriptors(descriptors).unwrap();

    let volume = fixtures::flat(3, 2, 2, STONE);
    assert_eq!(resolve_visible_layers(&volume, 2, &TileRegistry::builtin()).len(), 1);
    assert_eq!(resolve_visible_layers(&volume, 2, &clear_stone).len(), 3);
}
