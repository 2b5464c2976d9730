use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::align::{
    connect_tiles, extract_features, match_pairs, optimize, DogExtractor, Tile, TileGraph,
};
use crate::blockmatch::{
    BlockMatchJob, BlockMatchParams, BlockMatchResults, MosaicRenderer, TilePair,
};
use crate::error::{Result, TesseraError};
use crate::model::{AffineModel2D, Point, PointMatch};
use crate::parallel::{progressive, CancellationToken, CountingTaskFactory, ExecutorProvider};
use crate::raster::Raster;
use crate::transform::{CoordinateTransform, ThinPlateSplineTransform, Transform, TransformMesh};

use super::config::{ElasticConfig, MontageConfig};
use super::types::{MontageOutput, NoOpReporter, PipelineStage, ProgressReporter};

/// Initial placement of one tile.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TilePlacement {
    /// World position of the tile's top-left corner.
    pub offset: [f64; 2],
    /// Pinned tiles are never moved.
    pub fixed: bool,
}

/// Run the montage with a fresh executor and no progress reporting.
pub fn run_montage(
    rasters: &[Raster],
    placements: &[TilePlacement],
    config: &MontageConfig,
) -> Result<MontageOutput> {
    let provider = ExecutorProvider::new();
    let output = run_montage_reported(
        rasters,
        placements,
        config,
        &provider,
        Arc::new(NoOpReporter),
        &CancellationToken::new(),
    );
    provider.shutdown();
    output
}

/// Align, refine and elastically deform a set of tiles.
///
/// Feature matching connects overlapping tiles, the optimizer places them,
/// optional block matching refines the correspondences of every overlapping
/// pair in parallel, and a second optimization plus per-tile thin-plate
/// splines produce the final transforms. Failed block-matching jobs are
/// logged and skipped; cancellation aborts the run.
pub fn run_montage_reported(
    rasters: &[Raster],
    placements: &[TilePlacement],
    config: &MontageConfig,
    provider: &ExecutorProvider,
    reporter: Arc<dyn ProgressReporter>,
    cancel: &CancellationToken,
) -> Result<MontageOutput> {
    if rasters.is_empty() {
        return Err(TesseraError::EmptyInput("montage tiles"));
    }
    if rasters.len() != placements.len() {
        return Err(TesseraError::Pipeline(format!(
            "{} rasters but {} placements",
            rasters.len(),
            placements.len()
        )));
    }
    config.validate()?;

    let mut graph = TileGraph::new();
    for (raster, placement) in rasters.iter().zip(placements) {
        let mut tile = Tile::new(
            raster.width() as f64,
            raster.height() as f64,
            AffineModel2D::translation(placement.offset[0], placement.offset[1]),
        );
        tile.fixed = placement.fixed;
        graph.add_tile(tile);
    }

    let pool = provider.pool(config.threads)?;
    info!(tiles = graph.len(), threads = pool.current_num_threads(), "Starting montage");

    reporter.begin_stage(PipelineStage::ExtractingFeatures, Some(rasters.len()));
    let extractor = DogExtractor::new(config.features.clone());
    let features = extract_features(rasters, &extractor, &pool, cancel)?;
    reporter.finish_stage();

    let pairs = graph.overlapping_pairs();
    reporter.begin_stage(PipelineStage::MatchingFeatures, Some(pairs.len()));
    let models = match_pairs(&features, &pairs, &config.align, &pool, cancel)?;
    let connected_pairs = connect_tiles(&mut graph, models);
    info!(pairs = pairs.len(), connected = connected_pairs, "Feature matching complete");
    reporter.finish_stage();

    reporter.begin_stage(PipelineStage::Optimizing, None);
    let mut summaries = optimize(&mut graph, config.align.desired_model, &config.optimize)?;
    reporter.finish_stage();

    let mut failed_pairs = Vec::new();
    let refined = match &config.block_match {
        Some(params) => {
            let results =
                block_match(&graph, rasters, params, &pool, reporter.as_ref(), cancel)?;
            reporter.begin_stage(PipelineStage::Refining, None);
            for result in results {
                match result {
                    Ok(r) => merge_results(&mut graph, r, config)?,
                    Err((pair, e)) => {
                        warn!(pair = ?pair, error = %e, "block matching failed, pair skipped");
                        failed_pairs.push(pair);
                    }
                }
            }
            summaries = optimize(&mut graph, config.align.desired_model, &config.optimize)?;
            reporter.finish_stage();
            true
        }
        None => false,
    };

    let transforms = if refined && config.elastic.enabled {
        reporter.begin_stage(PipelineStage::Elastic, Some(graph.len()));
        let transforms = (0..graph.len())
            .map(|t| {
                let transform = elastic_transform(&graph, t, &config.elastic);
                reporter.advance(t + 1);
                transform
            })
            .collect();
        reporter.finish_stage();
        transforms
    } else {
        graph
            .tiles()
            .iter()
            .map(|t| Transform::Affine(t.model))
            .collect()
    };

    info!(
        tiles = graph.len(),
        connected = connected_pairs,
        failed = failed_pairs.len(),
        "Montage complete"
    );
    Ok(MontageOutput {
        transforms,
        graph,
        connected_pairs,
        failed_pairs,
        summaries,
    })
}

type PairOutcome = std::result::Result<BlockMatchResults, ((usize, usize), TesseraError)>;

/// Block match every overlapping pair on `pool`, in pair order.
fn block_match(
    graph: &TileGraph,
    rasters: &[Raster],
    params: &BlockMatchParams,
    pool: &rayon::ThreadPool,
    reporter: &dyn ProgressReporter,
    cancel: &CancellationToken,
) -> Result<Vec<PairOutcome>> {
    let pairs: Vec<TilePair> = graph
        .overlapping_pairs()
        .into_iter()
        .map(|(a, b)| TilePair::new(a, b))
        .collect();
    reporter.begin_stage(PipelineStage::BlockMatching, Some(pairs.len()));

    let levels = (1.0 / params.layer_scale).log2().floor().max(0.0) as usize;
    let renderer = MosaicRenderer::from_graph(graph, rasters, 2)?.with_pyramid(levels);
    let job = BlockMatchJob::new(graph, &renderer, params, cancel);
    let done = AtomicUsize::new(0);
    let factory = CountingTaskFactory::new(|pair: TilePair, index: usize| {
        let ids = (pair.a, pair.b);
        debug!(job = index, pair = ?ids, "block matching pair");
        let outcome = job.run(pair).map_err(|e| (ids, e));
        reporter.advance(done.fetch_add(1, Ordering::SeqCst) + 1);
        outcome
    });

    let outcomes = progressive(pairs, &factory, pool, cancel)?;
    reporter.finish_stage();

    // A job that saw the cancellation aborts the whole run.
    for outcome in &outcomes {
        if let Err((_, TesseraError::Interrupted(what))) = outcome {
            return Err(TesseraError::Interrupted(*what));
        }
    }
    Ok(outcomes)
}

/// Replace the connection of a pair by its block-matching correspondences
/// when there are more of them than the desired model needs.
fn merge_results(
    graph: &mut TileGraph,
    results: BlockMatchResults,
    config: &MontageConfig,
) -> Result<()> {
    let (a, b) = (results.pair.a, results.pair.b);
    let inv_a = graph.tile(a).model.create_inverse()?;
    let inv_b = graph.tile(b).model.create_inverse()?;
    let localize = |m: &PointMatch, on_a: &AffineModel2D, on_b: &AffineModel2D| {
        PointMatch::weighted(
            Point::new(on_a.apply(m.p1.l)),
            Point::new(on_b.apply(m.p2.l)),
            m.weight,
        )
    };

    let mut matches: Vec<PointMatch> = results
        .pm12
        .iter()
        .map(|m| localize(m, &inv_a, &inv_b))
        .collect();
    matches.extend(
        results
            .pm21
            .iter()
            .map(|m| localize(m, &inv_b, &inv_a).flip()),
    );

    let required = config.align.desired_model.min_num_matches();
    if matches.len() > required {
        info!(pair = ?(a, b), matches = matches.len(), "connecting refined pair");
        graph.connect(a, b, matches);
    } else {
        debug!(
            pair = ?(a, b),
            matches = matches.len(),
            "too few refined matches, keeping features"
        );
    }
    Ok(())
}

/// Thin-plate spline moving every landmark of `tile` to the midpoint of
/// its current world position and its partner's. Falls back to the affine
/// placement when no spline can be fit.
fn elastic_transform(graph: &TileGraph, tile: usize, config: &ElasticConfig) -> Transform {
    let t = graph.tile(tile);
    let mut landmarks: Vec<PointMatch> = Vec::new();
    for (neighbour, matches) in t.connections() {
        let other = &graph.tile(neighbour).model;
        for m in matches {
            let here = t.model.apply(m.p1.l);
            let there = other.apply(m.p2.l);
            let mut target = Point::new(m.p1.l);
            target.w = [0.5 * (here[0] + there[0]), 0.5 * (here[1] + there[1])];
            landmarks.push(PointMatch::new(Point::new(m.p1.l), target));
        }
    }
    landmarks.sort_by(|x, y| {
        x.p1.l[0]
            .total_cmp(&y.p1.l[0])
            .then(x.p1.l[1].total_cmp(&y.p1.l[1]))
    });
    landmarks.dedup_by(|x, y| x.p1.l == y.p1.l);

    if landmarks.len() > config.max_landmarks.max(1) {
        let stride = landmarks.len() as f64 / config.max_landmarks.max(1) as f64;
        landmarks = (0..config.max_landmarks)
            .map(|i| landmarks[(i as f64 * stride) as usize])
            .collect();
    }
    if landmarks.len() < 3 {
        return Transform::Affine(t.model);
    }

    for corner in [[0.0, 0.0], [t.width, 0.0], [0.0, t.height], [t.width, t.height]] {
        if landmarks.iter().all(|m| m.p1.l != corner) {
            let mut target = Point::new(corner);
            target.w = t.model.apply(corner);
            landmarks.push(PointMatch::new(Point::new(corner), target));
        }
    }

    match ThinPlateSplineTransform::fit(&landmarks) {
        Ok(spline) if preserves_orientation(&spline, t, config) => {
            Transform::ThinPlateSpline(spline)
        }
        Ok(_) => {
            warn!(tile, "elastic transform folds the tile, keeping affine");
            Transform::Affine(t.model)
        }
        Err(e) => {
            warn!(tile, error = %e, "elastic fit failed, keeping affine");
            Transform::Affine(t.model)
        }
    }
}

/// Every triangle of the spline's mesh keeps the orientation of the affine
/// placement.
fn preserves_orientation(
    spline: &ThinPlateSplineTransform,
    tile: &Tile,
    config: &ElasticConfig,
) -> bool {
    let Ok(mesh) = TransformMesh::new(
        spline,
        config.mesh_resolution.max(2),
        tile.width,
        tile.height,
    ) else {
        return false;
    };
    let orientation = tile.model.determinant().signum();
    (0..mesh.num_triangles()).all(|i| mesh.affine(i).determinant() * orientation > 0.0)
}
