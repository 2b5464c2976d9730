use nalgebra::{DMatrix, Matrix3, Vector3};

use crate::consts::{EPSILON, HOMOGRAPHY_TOKENS};
use crate::error::{Result, TesseraError};
use crate::model::PointMatch;

use super::codec::{join_decimals, parse_decimal};
use super::{CoordinateTransform, InvertibleTransform};

const VARIANT: &str = "homography";

/// Planar projective transform, stored row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct HomographyModel2D {
    m: Matrix3<f64>,
}

impl Default for HomographyModel2D {
    fn default() -> Self {
        Self {
            m: Matrix3::identity(),
        }
    }
}

impl HomographyModel2D {
    pub fn new(m: Matrix3<f64>) -> Self {
        Self { m }
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.m
    }

    /// Parse `m00 m01 m02 m10 m11 m12 m20 m21 m22`.
    pub fn init(data: &str) -> Result<Self> {
        let tokens: Vec<&str> = data.split_whitespace().collect();
        if tokens.len() != HOMOGRAPHY_TOKENS {
            return Err(TesseraError::format(
                VARIANT,
                format!("expected {HOMOGRAPHY_TOKENS} tokens, found {}", tokens.len()),
            ));
        }
        let values = tokens
            .iter()
            .map(|t| parse_decimal(t, VARIANT))
            .collect::<Result<Vec<f64>>>()?;
        Ok(Self {
            m: Matrix3::from_row_slice(&values),
        })
    }

    pub fn to_data_string(&self) -> String {
        let m = &self.m;
        join_decimals(&[
            m[(0, 0)],
            m[(0, 1)],
            m[(0, 2)],
            m[(1, 0)],
            m[(1, 1)],
            m[(1, 2)],
            m[(2, 0)],
            m[(2, 1)],
            m[(2, 2)],
        ])
    }

    pub fn create_inverse(&self) -> Result<Self> {
        self.m
            .try_inverse()
            .map(|m| Self { m })
            .ok_or_else(|| TesseraError::NoninvertibleModel("singular homography".to_string()))
    }

    /// Direct linear transform fit of `p1.l` onto `p2.w` from at least four
    /// matches, with both point sets normalized for conditioning.
    pub fn fit(&mut self, matches: &[PointMatch]) -> Result<()> {
        if matches.len() < 4 {
            return Err(TesseraError::NotEnoughDataPoints {
                required: 4,
                found: matches.len(),
            });
        }
        let src: Vec<[f64; 2]> = matches.iter().map(|m| m.p1.l).collect();
        let dst: Vec<[f64; 2]> = matches.iter().map(|m| m.p2.w).collect();
        let ts = normalization(&src);
        let td = normalization(&dst);

        let n = matches.len();
        let mut a = DMatrix::<f64>::zeros(2 * n, 9);
        for (i, m) in matches.iter().enumerate() {
            let s = ts * Vector3::new(src[i][0], src[i][1], 1.0);
            let d = td * Vector3::new(dst[i][0], dst[i][1], 1.0);
            let w = m.weight.sqrt();
            let (x, y, u, v) = (s[0], s[1], d[0], d[1]);
            let r0 = [-x, -y, -1.0, 0.0, 0.0, 0.0, x * u, y * u, u];
            let r1 = [0.0, 0.0, 0.0, -x, -y, -1.0, x * v, y * v, v];
            for c in 0..9 {
                a[(2 * i, c)] = w * r0[c];
                a[(2 * i + 1, c)] = w * r1[c];
            }
        }

        // Null vector of A is the eigenvector of AᵀA with the smallest eigenvalue.
        let ata = a.transpose() * &a;
        let eigen = ata.symmetric_eigen();
        let (min_idx, _) = eigen
            .eigenvalues
            .iter()
            .enumerate()
            .fold((0, f64::INFINITY), |best, (i, &v)| {
                if v < best.1 {
                    (i, v)
                } else {
                    best
                }
            });
        let h: Vec<f64> = eigen.eigenvectors.column(min_idx).iter().copied().collect();
        let hn = Matrix3::from_row_slice(&h);

        let td_inv = td.try_inverse().ok_or_else(|| {
            TesseraError::IllDefinedDataPoints("degenerate target points".to_string())
        })?;
        let mut m = td_inv * hn * ts;
        let scale = m[(2, 2)];
        if scale.abs() < EPSILON {
            return Err(TesseraError::IllDefinedDataPoints(
                "homography maps the origin to infinity".to_string(),
            ));
        }
        m /= scale;
        self.m = m;
        Ok(())
    }
}

/// Similarity moving the centroid to the origin with mean distance √2.
fn normalization(points: &[[f64; 2]]) -> Matrix3<f64> {
    let n = points.len() as f64;
    let cx = points.iter().map(|p| p[0]).sum::<f64>() / n;
    let cy = points.iter().map(|p| p[1]).sum::<f64>() / n;
    let mean_dist = points
        .iter()
        .map(|p| ((p[0] - cx).powi(2) + (p[1] - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    let s = if mean_dist > EPSILON {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };
    Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
}

impl CoordinateTransform for HomographyModel2D {
    fn apply(&self, p: [f64; 2]) -> [f64; 2] {
        let m = &self.m;
        let w = m[(2, 0)] * p[0] + m[(2, 1)] * p[1] + m[(2, 2)];
        [
            (m[(0, 0)] * p[0] + m[(0, 1)] * p[1] + m[(0, 2)]) / w,
            (m[(1, 0)] * p[0] + m[(1, 1)] * p[1] + m[(1, 2)]) / w,
        ]
    }
}

impl InvertibleTransform for HomographyModel2D {
    fn apply_inverse(&self, p: [f64; 2]) -> Result<[f64; 2]> {
        Ok(self.create_inverse()?.apply(p))
    }
}
