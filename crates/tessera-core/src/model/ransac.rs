//! Robust model estimation: random sample consensus followed by an
//! iterative trust filter that discards matches whose residual exceeds a
//! multiple of the median residual.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use crate::consts::{DEFAULT_MAX_TRUST, DEFAULT_RANSAC_ITERATIONS};
use crate::error::{Result, TesseraError};

use super::affine::AffineModel2D;
use super::kind::ModelKind;
use super::point::PointMatch;

/// Residual threshold floor of the trust filter. Exact synthetic data has a
/// median residual of zero.
const MIN_TRUST_THRESHOLD: f64 = 1e-6;

/// RANSAC configuration.
#[derive(Debug, Clone)]
pub struct RansacParams {
    /// Maximum iterations.
    pub iterations: usize,
    /// Inlier distance threshold in pixels.
    pub max_epsilon: f64,
    /// Minimum inlier ratio to accept model.
    pub min_inlier_ratio: f64,
    /// Minimum absolute inlier count to accept model.
    pub min_num_inliers: usize,
    /// Residuals above `max_trust * median` are dropped by the refit.
    pub max_trust: f64,
    /// Random seed for reproducibility (None for random).
    pub seed: Option<u64>,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_RANSAC_ITERATIONS,
            max_epsilon: 100.0,
            min_inlier_ratio: 0.2,
            min_num_inliers: 7,
            max_trust: DEFAULT_MAX_TRUST,
            seed: None,
        }
    }
}

/// Accepted model and the matches consistent with it.
#[derive(Debug, Clone)]
pub struct RansacOutcome {
    pub model: AffineModel2D,
    pub inliers: Vec<PointMatch>,
}

/// Run RANSAC and the trust filter over `candidates`.
///
/// Returns `Ok(None)` when no hypothesis clears the inlier bars, and
/// `NotEnoughDataPoints` when there are fewer candidates than the model needs.
pub fn filter_ransac(
    kind: ModelKind,
    candidates: &[PointMatch],
    params: &RansacParams,
) -> Result<Option<RansacOutcome>> {
    let mut rng: ChaCha8Rng = match params.seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_os_rng(),
    };

    let Some(indices) = ransac(kind, candidates, params, &mut rng)? else {
        return Ok(None);
    };
    let consensus: Vec<PointMatch> = indices.iter().map(|&i| candidates[i]).collect();

    let (model, kept) = filter(kind, &consensus, params.max_trust)?;
    if kept.len() < params.min_num_inliers {
        return Ok(None);
    }
    let inliers = kept.into_iter().map(|i| consensus[i]).collect();
    Ok(Some(RansacOutcome { model, inliers }))
}

/// Plain RANSAC; returns indices of the best consensus set.
pub fn ransac(
    kind: ModelKind,
    candidates: &[PointMatch],
    params: &RansacParams,
    rng: &mut ChaCha8Rng,
) -> Result<Option<Vec<usize>>> {
    let n = candidates.len();
    let min_samples = kind.min_num_matches();
    if n < min_samples {
        return Err(TesseraError::NotEnoughDataPoints {
            required: min_samples,
            found: n,
        });
    }

    let mut best: Vec<usize> = Vec::new();
    let mut best_cost = f64::MAX;
    let mut sample: Vec<PointMatch> = Vec::with_capacity(min_samples);
    let mut inliers: Vec<usize> = Vec::with_capacity(n);

    for _ in 0..params.iterations {
        sample.clear();
        sample.extend(
            rand::seq::index::sample(rng, n, min_samples)
                .iter()
                .map(|i| candidates[i]),
        );
        let model = match kind.fit(&sample) {
            Ok(model) => model,
            Err(_) => continue,
        };

        inliers.clear();
        let mut cost = 0.0;
        for (i, candidate) in candidates.iter().enumerate() {
            let mut m = *candidate;
            m.apply(&model);
            let d = m.distance();
            if d < params.max_epsilon {
                inliers.push(i);
                cost += d;
            }
        }
        if inliers.is_empty() {
            continue;
        }
        cost /= inliers.len() as f64;

        if inliers.len() > best.len() || (inliers.len() == best.len() && cost < best_cost) {
            best.clone_from(&inliers);
            best_cost = cost;
            if best.len() == n {
                break;
            }
        }
    }

    let ratio = best.len() as f64 / n as f64;
    if best.len() < params.min_num_inliers || ratio < params.min_inlier_ratio {
        return Ok(None);
    }
    Ok(Some(best))
}

/// Iteratively refit `kind` and drop matches whose residual exceeds
/// `max_trust` times the median residual, until the set is stable.
///
/// Returns the final model and the indices of the surviving matches.
pub fn filter(
    kind: ModelKind,
    matches: &[PointMatch],
    max_trust: f64,
) -> Result<(AffineModel2D, Vec<usize>)> {
    let mut kept: Vec<usize> = (0..matches.len()).collect();
    loop {
        let subset: Vec<PointMatch> = kept.iter().map(|&i| matches[i]).collect();
        let model = kind.fit(&subset)?;

        let residuals: Vec<f64> = subset
            .iter()
            .map(|m| {
                let mut m = *m;
                m.apply(&model);
                m.distance()
            })
            .collect();
        let threshold = (median(&residuals) * max_trust).max(MIN_TRUST_THRESHOLD);

        let before = kept.len();
        kept = kept
            .into_iter()
            .zip(&residuals)
            .filter(|(_, r)| **r <= threshold)
            .map(|(i, _)| i)
            .collect();

        if kept.len() == before {
            return Ok((model, kept));
        }
    }
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        0.5 * (sorted[mid - 1] + sorted[mid])
    } else {
        sorted[mid]
    }
}
