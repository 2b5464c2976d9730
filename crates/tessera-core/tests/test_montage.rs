#[allow(dead_code)]
mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tessera_core::blockmatch::BlockMatchParams;
use tessera_core::error::TesseraError;
use tessera_core::parallel::{CancellationToken, ExecutorProvider, PoolSize};
use tessera_core::pipeline::config::MontageConfig;
use tessera_core::pipeline::{
    run_montage, run_montage_reported, PipelineStage, ProgressReporter, TilePlacement,
};
use tessera_core::raster::Raster;
use tessera_core::transform::{CoordinateTransform, Transform};

const TILE: usize = 160;
const STEP: usize = 120;

/// Two tiles of one texture, side by side with a 40 px overlap.
fn tile_pair() -> (Vec<Raster>, Vec<TilePlacement>) {
    let image = common::textured_image(TILE + STEP, TILE, 120, 99);
    let rasters = vec![
        common::crop(&image, 0, 0, TILE, TILE),
        common::crop(&image, STEP, 0, TILE, TILE),
    ];
    let placements = vec![
        TilePlacement {
            offset: [0.0, 0.0],
            fixed: true,
        },
        TilePlacement {
            offset: [STEP as f64, 0.0],
            fixed: false,
        },
    ];
    (rasters, placements)
}

fn small_config() -> MontageConfig {
    let mut config = MontageConfig::default();
    config.threads = PoolSize::Threads(2);
    config.align.seed = Some(11);
    config.block_match = None;
    config.elastic.enabled = false;
    config
}

fn centre_of(transform: &Transform) -> [f64; 2] {
    let c = TILE as f64 / 2.0;
    transform.apply([c, c])
}

#[derive(Default)]
struct RecordingReporter {
    stages: Mutex<Vec<PipelineStage>>,
    advanced: AtomicUsize,
}

impl ProgressReporter for RecordingReporter {
    fn begin_stage(&self, stage: PipelineStage, _total_items: Option<usize>) {
        self.stages.lock().unwrap().push(stage);
    }

    fn advance(&self, _items_done: usize) {
        self.advanced.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Input validation
// ---------------------------------------------------------------------------

#[test]
fn test_empty_input_is_rejected() {
    let err = run_montage(&[], &[], &small_config()).unwrap_err();
    assert!(matches!(err, TesseraError::EmptyInput(_)));
}

#[test]
fn test_placement_count_must_match() {
    let (rasters, placements) = tile_pair();
    let err = run_montage(&rasters, &placements[..1], &small_config()).unwrap_err();
    assert!(matches!(err, TesseraError::Pipeline(_)));
}

#[test]
fn test_zero_layer_scale_is_rejected_before_work() {
    let (rasters, placements) = tile_pair();
    let mut config = small_config();
    config.block_match = Some(BlockMatchParams {
        layer_scale: 0.0,
        ..BlockMatchParams::default()
    });
    let err = run_montage(&rasters, &placements, &config).unwrap_err();
    assert!(matches!(
        err,
        TesseraError::InvalidParameter {
            name: "layer_scale",
            ..
        }
    ));
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

#[test]
fn test_correct_placements_stay_put() {
    let (rasters, placements) = tile_pair();
    let output = run_montage(&rasters, &placements, &small_config()).unwrap();

    assert_eq!(output.transforms.len(), 2);
    assert!(output.failed_pairs.is_empty());
    assert!(!output.summaries.is_empty());
    assert!(output.transforms.iter().all(|t| matches!(t, Transform::Affine(_))));

    // Tile 0 is pinned; tile 1 either keeps its placement or is pulled onto
    // the true offset by the feature matches.
    assert_eq!(output.graph.tile(0).model.m02, 0.0);
    let centre = centre_of(&output.transforms[1]);
    let truth = [STEP as f64 + TILE as f64 / 2.0, TILE as f64 / 2.0];
    assert!((centre[0] - truth[0]).abs() < 2.0, "{centre:?}");
    assert!((centre[1] - truth[1]).abs() < 2.0, "{centre:?}");
}

#[test]
fn test_refined_run_reports_every_stage() {
    let (rasters, placements) = tile_pair();
    let mut config = small_config();
    config.block_match = Some(BlockMatchParams {
        layer_scale: 1.0,
        search_radius: 8.0,
        block_radius: 16.0,
        mesh_resolution: 6,
        ..BlockMatchParams::default()
    });
    config.elastic.enabled = true;

    let provider = ExecutorProvider::new();
    let reporter = Arc::new(RecordingReporter::default());
    let output = run_montage_reported(
        &rasters,
        &placements,
        &config,
        &provider,
        reporter.clone(),
        &CancellationToken::new(),
    )
    .unwrap();
    provider.shutdown();

    assert_eq!(output.transforms.len(), 2);
    assert!(output.failed_pairs.is_empty());
    let stages = reporter.stages.lock().unwrap().clone();
    assert_eq!(
        stages,
        vec![
            PipelineStage::ExtractingFeatures,
            PipelineStage::MatchingFeatures,
            PipelineStage::Optimizing,
            PipelineStage::BlockMatching,
            PipelineStage::Refining,
            PipelineStage::Elastic,
        ]
    );
    // One block-matching job and one elastic fit per tile.
    assert_eq!(reporter.advanced.load(Ordering::SeqCst), 3);

    for (t, transform) in output.transforms.iter().enumerate() {
        let centre = centre_of(transform);
        let truth = [(t * STEP) as f64 + TILE as f64 / 2.0, TILE as f64 / 2.0];
        assert!((centre[0] - truth[0]).abs() < 3.0, "tile {t}: {centre:?}");
        assert!((centre[1] - truth[1]).abs() < 3.0, "tile {t}: {centre:?}");
    }
}

#[test]
fn test_cancelled_run_is_interrupted() {
    let (rasters, placements) = tile_pair();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let provider = ExecutorProvider::new();
    let err = run_montage_reported(
        &rasters,
        &placements,
        &small_config(),
        &provider,
        Arc::new(tessera_core::pipeline::NoOpReporter),
        &cancel,
    )
    .unwrap_err();
    assert!(matches!(err, TesseraError::Interrupted(_)));
}
