//! Correlation-based refinement of tile correspondences.

pub mod correlation;
pub mod pair_job;
pub mod render;

use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_MAX_TRUST, MIN_BLOCK_RADIUS};
use crate::error::{Result, TesseraError};
use crate::model::{ModelKind, SmoothnessParams};

pub use correlation::{match_by_maximal_pmcc, PmccParams};
pub use pair_job::{BlockMatchJob, BlockMatchResults, TilePair};
pub use render::{plan_render, MosaicRenderer, RenderPlan, TileRenderer};

/// Block matching parameters. Distances are in full-resolution pixels and
/// are scaled to the working scale by the job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockMatchParams {
    /// Working scale of the rendered rasters (default: 0.1).
    pub layer_scale: f64,
    /// Search radius around the predicted location (default: 200).
    pub search_radius: f64,
    /// Block radius; never below 16 working-scale pixels (default: 200).
    pub block_radius: f64,
    /// Minimum correlation of an accepted match (default: 0.6).
    pub min_r: f64,
    /// Largest ratio of best to second-best peak distinctness (default: 0.9).
    pub rod_r: f64,
    /// Largest principal curvature ratio at the peak (default: 10).
    pub max_curvature_r: f64,
    /// Apply the local smoothness filter (default: true).
    pub use_local_smoothness_filter: bool,
    /// Model fit to the neighbourhood of each match (default: Rigid).
    pub local_model: ModelKind,
    /// Gaussian radius of the neighbourhood (default: 200).
    pub local_region_sigma: f64,
    /// Largest deviation from the neighbourhood model (default: 100).
    pub max_local_epsilon: f64,
    /// Trust multiplier of the neighbourhood fit (default: 3).
    pub max_local_trust: f64,
    /// Grid points per tile row used as block centres (default: 16).
    pub mesh_resolution: usize,
}

impl Default for BlockMatchParams {
    fn default() -> Self {
        Self {
            layer_scale: 0.1,
            search_radius: 200.0,
            block_radius: 200.0,
            min_r: 0.6,
            rod_r: 0.9,
            max_curvature_r: 10.0,
            use_local_smoothness_filter: true,
            local_model: ModelKind::Rigid,
            local_region_sigma: 200.0,
            max_local_epsilon: 100.0,
            max_local_trust: DEFAULT_MAX_TRUST,
            mesh_resolution: 16,
        }
    }
}

impl BlockMatchParams {
    /// Reject scales and radii that cannot size a rendered raster.
    pub fn validate(&self) -> Result<()> {
        positive("layer_scale", self.layer_scale)?;
        positive("search_radius", self.search_radius)?;
        positive("block_radius", self.block_radius)?;
        Ok(())
    }

    /// Correlation search parameters at `scale`.
    pub fn pmcc_params(&self, scale: f64) -> PmccParams {
        PmccParams {
            block_radius: ((scale * self.block_radius).round() as usize).max(MIN_BLOCK_RADIUS),
            search_radius: ((scale * self.search_radius).round() as usize).max(1),
            min_r: self.min_r,
            rod_r: self.rod_r,
            max_curvature_r: self.max_curvature_r,
        }
    }

    /// Smoothness filter parameters at `scale`.
    pub fn smoothness_params(&self, scale: f64) -> SmoothnessParams {
        SmoothnessParams {
            model: self.local_model,
            sigma: self.local_region_sigma * scale,
            max_epsilon: self.max_local_epsilon * scale,
            max_trust: self.max_local_trust,
        }
    }
}

/// `value` must be finite and strictly positive.
pub(crate) fn positive(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(TesseraError::invalid(
            name,
            format!("{value} is not a positive number"),
        ))
    }
}
