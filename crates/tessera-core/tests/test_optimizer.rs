use approx::assert_abs_diff_eq;

use tessera_core::align::{optimize, OptimizeParams, Tile, TileGraph};
use tessera_core::model::{AffineModel2D, ModelKind, Point, PointMatch};
use tessera_core::raster::Rect;

/// Matches of an overlap strip between two tiles whose true world offsets
/// are `ta` and `tb`. `p1` is local to the first tile.
fn strip_matches(ta: [f64; 2], tb: [f64; 2], n: usize) -> Vec<PointMatch> {
    (0..n)
        .map(|i| {
            let p = [
                (tb[0] - ta[0]).max(0.0) + 2.0 + (i % 4) as f64 * 4.0,
                5.0 + (i / 4) as f64 * 20.0,
            ];
            let q = [p[0] + ta[0] - tb[0], p[1] + ta[1] - tb[1]];
            PointMatch::new(Point::new(p), Point::new(q))
        })
        .collect()
}

fn tile_at(x: f64, y: f64) -> Tile {
    Tile::new(100.0, 100.0, AffineModel2D::translation(x, y))
}

fn offset(graph: &TileGraph, t: usize) -> [f64; 2] {
    let m = &graph.tile(t).model;
    [m.m02, m.m12]
}

// ---------------------------------------------------------------------------
// Tile graph
// ---------------------------------------------------------------------------

#[test]
fn test_connect_stores_both_directions() {
    let mut graph = TileGraph::new();
    graph.add_tile(tile_at(0.0, 0.0));
    graph.add_tile(tile_at(80.0, 0.0));
    graph.connect(0, 1, strip_matches([0.0, 0.0], [80.0, 0.0], 8));

    let forward = graph.tile(0).matches_with(1).unwrap();
    let backward = graph.tile(1).matches_with(0).unwrap();
    assert_eq!(forward.len(), 8);
    assert_eq!(backward.len(), 8);
    assert_eq!(forward[0].p1.l, backward[0].p2.l);
    assert_eq!(forward[0].p2.l, backward[0].p1.l);
}

#[test]
fn test_real_connection_clears_virtual_matches() {
    let mut graph = TileGraph::new();
    graph.add_tile(tile_at(0.0, 0.0));
    graph.add_tile(tile_at(80.0, 0.0));
    graph.connect_virtual(0, 1, strip_matches([0.0, 0.0], [80.0, 0.0], 4));
    assert_eq!(graph.tile(0).virtual_connections().count(), 1);
    assert_eq!(graph.tile(1).num_connections(), 0);

    graph.connect(0, 1, strip_matches([0.0, 0.0], [80.0, 0.0], 4));
    assert_eq!(graph.tile(0).virtual_connections().count(), 0);
    assert_eq!(graph.tile(1).virtual_connections().count(), 0);
    assert_eq!(graph.tile(1).num_connections(), 1);
}

#[test]
fn test_overlapping_pairs_and_components() {
    let mut graph = TileGraph::new();
    graph.add_tile(tile_at(0.0, 0.0));
    graph.add_tile(tile_at(90.0, 0.0));
    graph.add_tile(tile_at(500.0, 500.0));
    graph.add_tile(tile_at(590.0, 500.0));
    assert_eq!(graph.overlapping_pairs(), vec![(0, 1), (2, 3)]);

    graph.connect(2, 3, strip_matches([500.0, 500.0], [590.0, 500.0], 4));
    assert_eq!(
        graph.connected_components(),
        vec![vec![0], vec![1], vec![2, 3]]
    );

    graph.isolate(3);
    assert_eq!(graph.connected_components().len(), 4);
}

#[test]
fn test_world_bounds_cover_all_tiles() {
    let mut graph = TileGraph::new();
    graph.add_tile(tile_at(-10.5, 0.0));
    graph.add_tile(tile_at(80.0, 20.0));
    assert_eq!(graph.world_bounds().to_rect(), Rect::new(-11, 0, 191, 120));
}

// ---------------------------------------------------------------------------
// Optimization
// ---------------------------------------------------------------------------

#[test]
fn test_row_of_tiles_converges_to_truth() {
    let truth = [[0.0, 0.0], [80.0, 0.0], [160.0, 0.0]];
    let mut graph = TileGraph::new();
    graph.add_tile(tile_at(0.0, 0.0));
    graph.add_tile(tile_at(85.0, 5.0));
    graph.add_tile(tile_at(150.0, -4.0));
    graph.connect(0, 1, strip_matches(truth[0], truth[1], 12));
    graph.connect(1, 2, strip_matches(truth[1], truth[2], 12));

    let params = OptimizeParams {
        max_allowed_error: 0.01,
        ..OptimizeParams::default()
    };
    let summaries = optimize(&mut graph, ModelKind::Translation, &params).unwrap();
    assert_eq!(summaries.len(), 1);
    let summary = &summaries[0];
    assert_eq!(summary.tiles, vec![0, 1, 2]);
    assert!(summary.iterations > 1);
    assert!(summary.max_error < 0.01, "max error {}", summary.max_error);
    assert!(summary.disconnected.is_empty());

    for (t, expected) in truth.iter().enumerate() {
        let got = offset(&graph, t);
        assert_abs_diff_eq!(got[0], expected[0], epsilon = 1e-2);
        assert_abs_diff_eq!(got[1], expected[1], epsilon = 1e-2);
    }
}

#[test]
fn test_fixed_tile_grounds_its_component() {
    let mut graph = TileGraph::new();
    graph.add_tile(tile_at(3.0, 3.0));
    let mut anchor = tile_at(80.0, 0.0);
    anchor.fixed = true;
    graph.add_tile(anchor);
    graph.connect(0, 1, strip_matches([0.0, 0.0], [80.0, 0.0], 8));

    optimize(&mut graph, ModelKind::Translation, &OptimizeParams::default()).unwrap();
    assert_eq!(offset(&graph, 1), [80.0, 0.0]);
    let moved = offset(&graph, 0);
    assert_abs_diff_eq!(moved[0], 0.0, epsilon = 1e-9);
    assert_abs_diff_eq!(moved[1], 0.0, epsilon = 1e-9);
}

#[test]
fn test_unfittable_tile_is_disconnected() {
    let mut graph = TileGraph::new();
    graph.add_tile(tile_at(0.0, 0.0));
    graph.add_tile(tile_at(80.0, 0.0));
    graph.connect(0, 1, strip_matches([0.0, 0.0], [80.0, 0.0], 2));

    let summaries = optimize(&mut graph, ModelKind::Affine, &OptimizeParams::default()).unwrap();
    assert_eq!(summaries[0].disconnected, vec![1]);
    assert_eq!(graph.tile(0).num_connections(), 0);
    assert_eq!(graph.tile(1).num_connections(), 0);
    // The model is left where it was.
    assert_eq!(offset(&graph, 1), [80.0, 0.0]);
}

#[test]
fn test_components_are_optimized_independently() {
    let mut graph = TileGraph::new();
    graph.add_tile(tile_at(0.0, 0.0));
    graph.add_tile(tile_at(82.0, 1.0));
    graph.add_tile(tile_at(1000.0, 0.0));
    graph.connect(0, 1, strip_matches([0.0, 0.0], [80.0, 0.0], 8));

    let summaries =
        optimize(&mut graph, ModelKind::Translation, &OptimizeParams::default()).unwrap();
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[1].tiles, vec![2]);
    assert_eq!(summaries[1].iterations, 0);
    assert_eq!(offset(&graph, 2), [1000.0, 0.0]);

    let moved = offset(&graph, 1);
    assert_abs_diff_eq!(moved[0], 80.0, epsilon = 1e-9);
    assert_abs_diff_eq!(moved[1], 0.0, epsilon = 1e-9);
}
