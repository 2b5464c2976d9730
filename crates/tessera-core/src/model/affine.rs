use crate::consts::{AFFINE_TOKENS, EPSILON};
use crate::error::{Result, TesseraError};
use crate::transform::codec::{join_decimals, parse_decimal};
use crate::transform::{CoordinateTransform, InvertibleTransform};

use super::point::{mean_distance, PointMatch};

const VARIANT: &str = "affine";

/// 2D affine map
///
/// ```text
/// x' = m00 * x + m01 * y + m02
/// y' = m10 * x + m11 * y + m12
/// ```
///
/// plus the mean residual (`cost`) of the last fit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AffineModel2D {
    pub m00: f64,
    pub m01: f64,
    pub m02: f64,
    pub m10: f64,
    pub m11: f64,
    pub m12: f64,
    pub cost: f64,
}

impl Default for AffineModel2D {
    fn default() -> Self {
        Self::identity()
    }
}

impl AffineModel2D {
    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0)
    }

    /// Build from row-major coefficients.
    pub fn new(m00: f64, m01: f64, m02: f64, m10: f64, m11: f64, m12: f64) -> Self {
        Self {
            m00,
            m01,
            m02,
            m10,
            m11,
            m12,
            cost: f64::MAX,
        }
    }

    pub fn translation(tx: f64, ty: f64) -> Self {
        Self::new(1.0, 0.0, tx, 0.0, 1.0, ty)
    }

    pub fn determinant(&self) -> f64 {
        self.m00 * self.m11 - self.m01 * self.m10
    }

    pub fn is_invertible(&self) -> bool {
        self.determinant().abs() > EPSILON
    }

    pub fn create_inverse(&self) -> Result<Self> {
        let det = self.determinant();
        if det.abs() <= EPSILON {
            return Err(TesseraError::NoninvertibleModel(format!(
                "affine determinant {det}"
            )));
        }
        let i00 = self.m11 / det;
        let i01 = -self.m01 / det;
        let i10 = -self.m10 / det;
        let i11 = self.m00 / det;
        let mut inverse = Self::new(
            i00,
            i01,
            -i00 * self.m02 - i01 * self.m12,
            i10,
            i11,
            -i10 * self.m02 - i11 * self.m12,
        );
        inverse.cost = self.cost;
        Ok(inverse)
    }

    /// `self = self ∘ other`: `other` is applied first.
    pub fn concatenate(&mut self, other: &AffineModel2D) {
        let a = *self;
        self.m00 = a.m00 * other.m00 + a.m01 * other.m10;
        self.m01 = a.m00 * other.m01 + a.m01 * other.m11;
        self.m02 = a.m00 * other.m02 + a.m01 * other.m12 + a.m02;
        self.m10 = a.m10 * other.m00 + a.m11 * other.m10;
        self.m11 = a.m10 * other.m01 + a.m11 * other.m11;
        self.m12 = a.m10 * other.m02 + a.m11 * other.m12 + a.m12;
    }

    /// `self = other ∘ self`: `self` is applied first.
    pub fn pre_concatenate(&mut self, other: &AffineModel2D) {
        let mut result = *other;
        result.concatenate(self);
        result.cost = self.cost;
        *self = result;
    }

    /// Weighted least-squares fit of a general affine mapping `p1.l` onto
    /// `p2.w`. Needs at least three non-collinear matches.
    pub fn fit(&mut self, matches: &[PointMatch]) -> Result<()> {
        if matches.len() < 3 {
            return Err(TesseraError::NotEnoughDataPoints {
                required: 3,
                found: matches.len(),
            });
        }
        let (pc, qc, _) = weighted_centroids(matches)?;

        let (mut a00, mut a01, mut a11) = (0.0, 0.0, 0.0);
        let (mut b00, mut b01, mut b10, mut b11) = (0.0, 0.0, 0.0, 0.0);
        for m in matches {
            let px = m.p1.l[0] - pc[0];
            let py = m.p1.l[1] - pc[1];
            let qx = m.p2.w[0] - qc[0];
            let qy = m.p2.w[1] - qc[1];
            let w = m.weight;
            a00 += w * px * px;
            a01 += w * px * py;
            a11 += w * py * py;
            b00 += w * px * qx;
            b01 += w * py * qx;
            b10 += w * px * qy;
            b11 += w * py * qy;
        }

        let det = a00 * a11 - a01 * a01;
        if a00 * a11 <= 0.0 || det.abs() <= EPSILON * a00 * a11 {
            return Err(TesseraError::IllDefinedDataPoints(
                "affine fit from collinear points".to_string(),
            ));
        }
        let i00 = a11 / det;
        let i01 = -a01 / det;
        let i11 = a00 / det;

        self.m00 = i00 * b00 + i01 * b01;
        self.m01 = i01 * b00 + i11 * b01;
        self.m10 = i00 * b10 + i01 * b11;
        self.m11 = i01 * b10 + i11 * b11;
        self.m02 = qc[0] - self.m00 * pc[0] - self.m01 * pc[1];
        self.m12 = qc[1] - self.m10 * pc[0] - self.m11 * pc[1];
        self.update_cost(matches);
        Ok(())
    }

    /// Recompute `cost` as the weighted mean residual over `matches`.
    pub fn update_cost(&mut self, matches: &[PointMatch]) {
        let mut applied: Vec<PointMatch> = matches.to_vec();
        for m in &mut applied {
            m.apply(self);
        }
        self.cost = mean_distance(&applied);
    }

    /// Parse `m00 m10 m01 m11 m02 m12`.
    pub fn init(data: &str) -> Result<Self> {
        let tokens: Vec<&str> = data.split_whitespace().collect();
        if tokens.len() != AFFINE_TOKENS {
            return Err(TesseraError::format(
                VARIANT,
                format!("expected {AFFINE_TOKENS} tokens, found {}", tokens.len()),
            ));
        }
        let mut v = [0.0; AFFINE_TOKENS];
        for (slot, token) in v.iter_mut().zip(&tokens) {
            *slot = parse_decimal(token, VARIANT)?;
        }
        Ok(Self::new(v[0], v[2], v[4], v[1], v[3], v[5]))
    }

    pub fn to_data_string(&self) -> String {
        join_decimals(&[self.m00, self.m10, self.m01, self.m11, self.m02, self.m12])
    }
}

impl CoordinateTransform for AffineModel2D {
    fn apply(&self, p: [f64; 2]) -> [f64; 2] {
        [
            self.m00 * p[0] + self.m01 * p[1] + self.m02,
            self.m10 * p[0] + self.m11 * p[1] + self.m12,
        ]
    }
}

impl InvertibleTransform for AffineModel2D {
    fn apply_inverse(&self, p: [f64; 2]) -> Result<[f64; 2]> {
        Ok(self.create_inverse()?.apply(p))
    }
}

/// Weighted centroids of `p1.l` and `p2.w` and the weight sum.
pub(crate) fn weighted_centroids(matches: &[PointMatch]) -> Result<([f64; 2], [f64; 2], f64)> {
    let mut pc = [0.0; 2];
    let mut qc = [0.0; 2];
    let mut ws = 0.0;
    for m in matches {
        pc[0] += m.weight * m.p1.l[0];
        pc[1] += m.weight * m.p1.l[1];
        qc[0] += m.weight * m.p2.w[0];
        qc[1] += m.weight * m.p2.w[1];
        ws += m.weight;
    }
    if ws <= 0.0 {
        return Err(TesseraError::IllDefinedDataPoints(
            "all match weights are zero".to_string(),
        ));
    }
    Ok((
        [pc[0] / ws, pc[1] / ws],
        [qc[0] / ws, qc[1] / ws],
        ws,
    ))
}
