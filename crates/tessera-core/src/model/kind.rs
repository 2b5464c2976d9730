use serde::{Deserialize, Serialize};

use crate::consts::EPSILON;
use crate::error::{Result, TesseraError};

use super::affine::{weighted_centroids, AffineModel2D};
use super::point::PointMatch;

/// Model family fit between two tiles. Every family yields an
/// [`AffineModel2D`], so results can be composed freely.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelKind {
    Translation,
    #[default]
    Rigid,
    Similarity,
    Affine,
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Translation => write!(f, "Translation"),
            Self::Rigid => write!(f, "Rigid"),
            Self::Similarity => write!(f, "Similarity"),
            Self::Affine => write!(f, "Affine"),
        }
    }
}

impl ModelKind {
    /// Minimum number of matches a fit of this family needs.
    pub fn min_num_matches(&self) -> usize {
        match self {
            Self::Translation => 1,
            Self::Rigid | Self::Similarity => 2,
            Self::Affine => 3,
        }
    }

    /// Weighted least-squares fit mapping `p1.l` onto `p2.w`.
    pub fn fit(&self, matches: &[PointMatch]) -> Result<AffineModel2D> {
        let required = self.min_num_matches();
        if matches.len() < required {
            return Err(TesseraError::NotEnoughDataPoints {
                required,
                found: matches.len(),
            });
        }

        let mut model = match self {
            Self::Affine => {
                let mut model = AffineModel2D::identity();
                model.fit(matches)?;
                return Ok(model);
            }
            Self::Translation => {
                let (pc, qc, _) = weighted_centroids(matches)?;
                AffineModel2D::translation(qc[0] - pc[0], qc[1] - pc[1])
            }
            Self::Rigid => fit_rotation(matches, false)?,
            Self::Similarity => fit_rotation(matches, true)?,
        };
        model.update_cost(matches);
        Ok(model)
    }
}

/// Closed-form rotation (and optionally isotropic scale) about the weighted
/// centroids.
fn fit_rotation(matches: &[PointMatch], with_scale: bool) -> Result<AffineModel2D> {
    let (pc, qc, _) = weighted_centroids(matches)?;

    let mut dot = 0.0;
    let mut cross = 0.0;
    let mut norm = 0.0;
    for m in matches {
        let px = m.p1.l[0] - pc[0];
        let py = m.p1.l[1] - pc[1];
        let qx = m.p2.w[0] - qc[0];
        let qy = m.p2.w[1] - qc[1];
        dot += m.weight * (px * qx + py * qy);
        cross += m.weight * (px * qy - py * qx);
        norm += m.weight * (px * px + py * py);
    }

    if norm <= EPSILON {
        return Err(TesseraError::IllDefinedDataPoints(
            "all source points coincide".to_string(),
        ));
    }

    let (cos, sin) = if with_scale {
        (dot / norm, cross / norm)
    } else {
        let len = (dot * dot + cross * cross).sqrt();
        if len <= EPSILON {
            return Err(TesseraError::IllDefinedDataPoints(
                "rotation is undetermined".to_string(),
            ));
        }
        (dot / len, cross / len)
    };

    Ok(AffineModel2D::new(
        cos,
        -sin,
        qc[0] - cos * pc[0] + sin * pc[1],
        sin,
        cos,
        qc[1] - sin * pc[0] - cos * pc[1],
    ))
}
