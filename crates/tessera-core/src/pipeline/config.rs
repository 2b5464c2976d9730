use serde::{Deserialize, Serialize};

use crate::align::{AlignParams, FeatureParams, OptimizeParams};
use crate::blockmatch::BlockMatchParams;
use crate::error::Result;
use crate::parallel::PoolSize;

/// Everything a montage run can be tuned by.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MontageConfig {
    /// Worker pool size (default: all cores).
    #[serde(default)]
    pub threads: PoolSize,
    #[serde(default)]
    pub features: FeatureParams,
    #[serde(default)]
    pub align: AlignParams,
    #[serde(default)]
    pub optimize: OptimizeParams,
    /// Correlation refinement after the feature-based alignment; skipped
    /// when absent.
    pub block_match: Option<BlockMatchParams>,
    #[serde(default)]
    pub elastic: ElasticConfig,
}

impl Default for MontageConfig {
    fn default() -> Self {
        Self {
            threads: PoolSize::default(),
            features: FeatureParams::default(),
            align: AlignParams::default(),
            optimize: OptimizeParams::default(),
            block_match: Some(BlockMatchParams::default()),
            elastic: ElasticConfig::default(),
        }
    }
}

impl MontageConfig {
    /// Check the values serde cannot, such as a block-matching scale that
    /// could never size a raster.
    pub fn validate(&self) -> Result<()> {
        match &self.block_match {
            Some(params) => params.validate(),
            None => Ok(()),
        }
    }
}

/// Per-tile elastic transforms derived from the refined correspondences.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElasticConfig {
    /// Replace affine placements by thin-plate splines (default: true).
    pub enabled: bool,
    /// Most landmarks kept per tile (default: 256).
    pub max_landmarks: usize,
    /// Vertices per row of the export mesh (default: 32).
    pub mesh_resolution: usize,
}

impl Default for ElasticConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_landmarks: 256,
            mesh_resolution: 32,
        }
    }
}
