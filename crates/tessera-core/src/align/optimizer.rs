//! Global relaxation of the tile spring graph.
//!
//! Each connected component is grounded by one fixed tile. Free tiles are
//! refit in turn (Gauss-Seidel) against the current world positions of their
//! neighbours until the worst tile error stops improving or the iteration
//! budget runs out.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::consts::PLATEAU_SLOPE;
use crate::error::{Result, TesseraError};
use crate::model::{mean_distance, ModelKind, PointMatch};
use crate::transform::CoordinateTransform;

use super::tile::TileGraph;

/// Optimizer stopping rules.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizeParams {
    /// Iteration cap per component (default: 2000).
    pub max_iterations: usize,
    /// Consecutive non-improving iterations before stopping (default: 200).
    pub max_plateau_width: usize,
    /// Worst tile error considered converged, in pixels (default: 100).
    pub max_allowed_error: f64,
}

impl Default for OptimizeParams {
    fn default() -> Self {
        Self {
            max_iterations: 2000,
            max_plateau_width: 200,
            max_allowed_error: 100.0,
        }
    }
}

/// Per-component optimization report.
#[derive(Clone, Debug, PartialEq)]
pub struct OptimizeSummary {
    pub tiles: Vec<usize>,
    pub iterations: usize,
    pub mean_error: f64,
    pub min_error: f64,
    pub max_error: f64,
    /// Tiles whose connections were removed because they could not be fit.
    pub disconnected: Vec<usize>,
}

/// Matches of `tile` with both ends in world space under the current models.
fn world_matches(graph: &TileGraph, tile: usize) -> Vec<PointMatch> {
    let t = graph.tile(tile);
    let mut out = Vec::new();
    for (neighbour, matches) in t.connections() {
        let other = &graph.tile(neighbour).model;
        for m in matches {
            let mut m = *m;
            m.p1.w = t.model.apply(m.p1.l);
            m.p2.w = other.apply(m.p2.l);
            out.push(m);
        }
    }
    out
}

/// Weighted mean residual of a tile's connections; zero without any.
fn tile_error(graph: &TileGraph, tile: usize) -> f64 {
    mean_distance(&world_matches(graph, tile))
}

/// Optimize every connected component of `graph` independently.
///
/// A component already containing a fixed tile is grounded by it; otherwise
/// its first tile is held fixed for the run.
pub fn optimize(
    graph: &mut TileGraph,
    kind: ModelKind,
    params: &OptimizeParams,
) -> Result<Vec<OptimizeSummary>> {
    let components = graph.connected_components();
    info!(
        tiles = graph.len(),
        components = components.len(),
        model = %kind,
        "optimizing tile configuration"
    );
    let mut summaries = Vec::with_capacity(components.len());
    for component in components {
        summaries.push(optimize_component(graph, &component, kind, params)?);
    }
    Ok(summaries)
}

fn optimize_component(
    graph: &mut TileGraph,
    component: &[usize],
    kind: ModelKind,
    params: &OptimizeParams,
) -> Result<OptimizeSummary> {
    let grounded = component.iter().any(|&t| graph.tile(t).fixed);
    let free: Vec<usize> = component
        .iter()
        .copied()
        .enumerate()
        .filter(|&(k, t)| !graph.tile(t).fixed && (grounded || k > 0))
        .map(|(_, t)| t)
        .collect();

    let mut disconnected = Vec::new();
    let mut best = f64::MAX;
    let mut plateau = 0;
    let mut iterations = 0;

    if !free.is_empty() {
        while iterations < params.max_iterations {
            iterations += 1;
            for &t in &free {
                if graph.tile(t).num_connections() == 0 {
                    continue;
                }
                let matches = world_matches(graph, t);
                match kind.fit(&matches) {
                    Ok(model) => graph.tile_mut(t).model = model,
                    Err(TesseraError::NotEnoughDataPoints { required, found }) => {
                        warn!(tile = t, required, found, "not enough matches, disconnecting tile");
                        graph.isolate(t);
                        disconnected.push(t);
                    }
                    Err(TesseraError::IllDefinedDataPoints(reason)) => {
                        warn!(tile = t, %reason, "ill-defined matches, keeping previous model");
                    }
                    Err(e) => return Err(e),
                }
            }

            let worst = component
                .iter()
                .map(|&t| tile_error(graph, t))
                .fold(0.0, f64::max);
            if best - worst > PLATEAU_SLOPE {
                best = worst;
                plateau = 0;
            } else {
                plateau += 1;
            }
            if (worst <= params.max_allowed_error && plateau > 0)
                || plateau >= params.max_plateau_width
            {
                break;
            }
        }
    }

    let errors: Vec<f64> = component.iter().map(|&t| tile_error(graph, t)).collect();
    let summary = OptimizeSummary {
        tiles: component.to_vec(),
        iterations,
        mean_error: errors.iter().sum::<f64>() / errors.len().max(1) as f64,
        min_error: errors.iter().copied().fold(f64::INFINITY, f64::min),
        max_error: errors.iter().copied().fold(0.0, f64::max),
        disconnected,
    };
    info!(
        tiles = component.len(),
        iterations = summary.iterations,
        mean_error = summary.mean_error,
        min_error = summary.min_error,
        max_error = summary.max_error,
        "optimization finished"
    );
    if summary.max_error > params.max_allowed_error {
        warn!(
            max_error = summary.max_error,
            max_allowed_error = params.max_allowed_error,
            "component did not converge below the allowed error"
        );
    }
    Ok(summary)
}
