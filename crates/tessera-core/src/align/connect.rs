//! Pairwise tile alignment: feature extraction for every tile, ratio-test
//! matching of overlapping pairs, RANSAC model fits and graph connection.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::consts::{DEFAULT_MAX_TRUST, DEFAULT_RANSAC_ITERATIONS, RANSAC_CANDIDATE_FACTOR};
use crate::error::{Result, TesseraError};
use crate::model::{filter_ransac, ModelKind, RansacOutcome, RansacParams};
use crate::parallel::CancellationToken;
use crate::raster::Raster;

use super::features::{Feature, FeatureExtractor};
use super::matching::match_features;
use super::tile::TileGraph;

/// Pairwise alignment parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignParams {
    /// Closest/next-closest descriptor distance ratio (default: 0.92).
    pub rod: f64,
    /// Largest alignment error in pixels accepted by RANSAC (default: 100).
    pub max_epsilon: f64,
    /// Minimum fraction of candidates that must be inliers (default: 0.2).
    pub min_inlier_ratio: f64,
    /// Model family fit between tile pairs (default: Rigid).
    pub expected_model: ModelKind,
    /// Model family of each tile during optimization (default: Rigid).
    pub desired_model: ModelKind,
    /// RANSAC iteration cap (default: 1000).
    pub ransac_iterations: usize,
    /// Robust refit trust multiplier (default: 3).
    pub max_trust: f64,
    /// Seed for reproducible RANSAC; random when unset (default: none).
    pub seed: Option<u64>,
}

impl Default for AlignParams {
    fn default() -> Self {
        Self {
            rod: 0.92,
            max_epsilon: 100.0,
            min_inlier_ratio: 0.2,
            expected_model: ModelKind::Rigid,
            desired_model: ModelKind::Rigid,
            ransac_iterations: DEFAULT_RANSAC_ITERATIONS,
            max_trust: DEFAULT_MAX_TRUST,
            seed: None,
        }
    }
}

impl AlignParams {
    /// Candidates (and inliers) a pair needs before a fit is attempted.
    pub fn min_candidates(&self) -> usize {
        RANSAC_CANDIDATE_FACTOR * self.expected_model.min_num_matches()
    }

    pub fn ransac_params(&self, seed: Option<u64>) -> RansacParams {
        RansacParams {
            iterations: self.ransac_iterations,
            max_epsilon: self.max_epsilon,
            min_inlier_ratio: self.min_inlier_ratio,
            min_num_inliers: self.min_candidates(),
            max_trust: self.max_trust,
            seed,
        }
    }
}

/// Outcome of aligning one overlapping tile pair.
#[derive(Clone, Debug)]
pub struct PairModel {
    pub a: usize,
    pub b: usize,
    pub candidates: usize,
    /// Model mapping local coordinates of `a` onto local coordinates of `b`
    /// with its inliers, or `None` if the pair stays unconnected.
    pub outcome: Option<RansacOutcome>,
}

/// Run `job` for indices `0..n` on every worker of `pool`, each worker
/// pulling the next index from a shared counter until the range is
/// exhausted or `cancel` is set.
fn pull_indexed<O, F>(
    n: usize,
    pool: &ThreadPool,
    cancel: &CancellationToken,
    what: &'static str,
    job: F,
) -> Result<Vec<O>>
where
    O: Send + Sync,
    F: Fn(usize) -> O + Sync,
{
    let next = AtomicUsize::new(0);
    let slots: Vec<OnceLock<O>> = (0..n).map(|_| OnceLock::new()).collect();
    let workers = pool.current_num_threads().min(n);

    pool.in_place_scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|_| loop {
                if cancel.is_cancelled() {
                    break;
                }
                let i = next.fetch_add(1, Ordering::SeqCst);
                if i >= n {
                    break;
                }
                let _ = slots[i].set(job(i));
            });
        }
    });

    cancel.check(what)?;
    slots
        .into_iter()
        .map(|s| {
            s.into_inner()
                .ok_or_else(|| TesseraError::Pipeline(format!("{what}: missing result")))
        })
        .collect()
}

/// Extract features of every raster on `pool`.
pub fn extract_features(
    rasters: &[Raster],
    extractor: &dyn FeatureExtractor,
    pool: &ThreadPool,
    cancel: &CancellationToken,
) -> Result<Vec<Vec<Feature>>> {
    pull_indexed(rasters.len(), pool, cancel, "Feature extraction", |i| {
        let features = extractor.extract(&rasters[i]);
        info!(tile = i, features = features.len(), "extracted features");
        features
    })
}

/// Match the features of two tiles and fit the expected model.
///
/// Pairs with fewer candidates than [`AlignParams::min_candidates`], or
/// whose RANSAC finds no acceptable consensus, yield `None`.
pub fn fit_pair(
    features_a: &[Feature],
    features_b: &[Feature],
    params: &AlignParams,
    seed: Option<u64>,
) -> (usize, Option<RansacOutcome>) {
    let candidates = match_features(features_a, features_b, params.rod);
    if candidates.len() < params.min_candidates() {
        return (candidates.len(), None);
    }
    let outcome = match filter_ransac(
        params.expected_model,
        &candidates,
        &params.ransac_params(seed),
    ) {
        Ok(outcome) => outcome,
        Err(TesseraError::NotEnoughDataPoints { .. }) => None,
        Err(e) => {
            debug!(error = %e, "model fit failed");
            None
        }
    };
    (candidates.len(), outcome)
}

/// Fit models for every pair in `pairs` on `pool`.
pub fn match_pairs(
    features: &[Vec<Feature>],
    pairs: &[(usize, usize)],
    params: &AlignParams,
    pool: &ThreadPool,
    cancel: &CancellationToken,
) -> Result<Vec<PairModel>> {
    pull_indexed(pairs.len(), pool, cancel, "Feature matching", |k| {
        let (a, b) = pairs[k];
        let seed = params.seed.map(|s| s.wrapping_add(k as u64));
        let (candidates, outcome) = fit_pair(&features[a], &features[b], params, seed);
        match &outcome {
            Some(o) => info!(
                pair = ?(a, b),
                inliers = o.inliers.len(),
                candidates,
                cost = o.model.cost,
                "model found"
            ),
            None => info!(pair = ?(a, b), candidates, "no model found"),
        }
        PairModel {
            a,
            b,
            candidates,
            outcome,
        }
    })
}

/// Turn successful pair fits into graph connections. Returns the number of
/// pairs connected.
pub fn connect_tiles(graph: &mut TileGraph, models: Vec<PairModel>) -> usize {
    let mut connected = 0;
    for pair in models {
        match pair.outcome {
            Some(outcome) => {
                graph.connect(pair.a, pair.b, outcome.inliers);
                connected += 1;
            }
            None => warn!(pair = ?(pair.a, pair.b), "tile pair left unconnected"),
        }
    }
    connected
}

/// Extract, match and connect all tiles whose world bounds overlap.
pub fn align_tiles(
    graph: &mut TileGraph,
    rasters: &[Raster],
    extractor: &dyn FeatureExtractor,
    params: &AlignParams,
    pool: &ThreadPool,
    cancel: &CancellationToken,
) -> Result<usize> {
    if graph.len() != rasters.len() {
        return Err(TesseraError::Pipeline(format!(
            "{} tiles but {} rasters",
            graph.len(),
            rasters.len()
        )));
    }
    let features = extract_features(rasters, extractor, pool, cancel)?;
    let pairs = graph.overlapping_pairs();
    info!(tiles = graph.len(), pairs = pairs.len(), "matching overlapping tiles");
    let models = match_pairs(&features, &pairs, params, pool, cancel)?;
    Ok(connect_tiles(graph, models))
}
