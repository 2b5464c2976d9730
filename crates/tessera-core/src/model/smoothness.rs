use rayon::prelude::*;
use tracing::debug;

use super::kind::ModelKind;
use super::point::PointMatch;
use super::ransac::filter;

/// Local smoothness filter parameters.
#[derive(Debug, Clone, Copy)]
pub struct SmoothnessParams {
    /// Model family fit to the neighbourhood of each candidate.
    pub model: ModelKind,
    /// Gaussian radius of the neighbourhood weighting.
    pub sigma: f64,
    /// Largest accepted deviation from the local model, in pixels.
    pub max_epsilon: f64,
    /// Trust multiplier for the neighbourhood refit.
    pub max_trust: f64,
}

/// Reject matches whose displacement disagrees with the Gaussian-weighted
/// local model of their neighbours.
///
/// For every candidate the other matches are re-weighted by
/// `exp(-d² / 2σ²)` of their source distance, a trust-filtered model is fit
/// to them, and the candidate survives if that model predicts it within
/// `max_epsilon`. Candidates whose neighbourhood cannot be fit are dropped.
pub fn local_smoothness_filter(
    candidates: &[PointMatch],
    params: &SmoothnessParams,
) -> Vec<PointMatch> {
    let s2 = 2.0 * params.sigma * params.sigma;

    let keep: Vec<bool> = candidates
        .par_iter()
        .enumerate()
        .map(|(i, candidate)| {
            let neighbours: Vec<PointMatch> = candidates
                .iter()
                .enumerate()
                // The candidate does not vote for its own neighbourhood model.
                .filter(|&(j, _)| j != i)
                .map(|(_, m)| {
                    let dx = m.p1.l[0] - candidate.p1.l[0];
                    let dy = m.p1.l[1] - candidate.p1.l[1];
                    let mut m = *m;
                    m.weight *= (-(dx * dx + dy * dy) / s2).exp();
                    m
                })
                .collect();

            match filter(params.model, &neighbours, params.max_trust) {
                Ok((model, _)) => {
                    let mut c = *candidate;
                    c.apply(&model);
                    c.distance() <= params.max_epsilon
                }
                Err(_) => false,
            }
        })
        .collect();

    let survivors: Vec<PointMatch> = candidates
        .iter()
        .zip(keep)
        .filter(|(_, k)| *k)
        .map(|(m, _)| *m)
        .collect();

    debug!(
        candidates = candidates.len(),
        kept = survivors.len(),
        "local smoothness filter"
    );
    survivors
}
