use nalgebra::DMatrix;

use crate::consts::{EPSILON, TPS_TAG};
use crate::error::{Result, TesseraError};
use crate::model::PointMatch;

use super::codec::{decode_doubles, encode_doubles, parse_count};
use super::CoordinateTransform;

const VARIANT: &str = "thin-plate spline";
const DIMS: usize = 2;

/// Affine part of a thin-plate spline: `A` (row-major) and `b`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SplineAffine {
    pub a: [[f64; DIMS]; DIMS],
    pub b: [f64; DIMS],
}

/// Thin-plate spline with kernel `r² log r`, expressed as a displacement:
///
/// ```text
/// p' = p + A·p + b + Σ w_l · U(|p - s_l|)
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct ThinPlateSplineTransform {
    sources: Vec<[f64; DIMS]>,
    weights: Vec<[f64; DIMS]>,
    affine: Option<SplineAffine>,
}

fn kernel(r2: f64) -> f64 {
    if r2 < EPSILON {
        0.0
    } else {
        0.5 * r2 * r2.ln()
    }
}

impl ThinPlateSplineTransform {
    pub fn new(
        sources: Vec<[f64; DIMS]>,
        weights: Vec<[f64; DIMS]>,
        affine: Option<SplineAffine>,
    ) -> Result<Self> {
        if sources.len() != weights.len() {
            return Err(TesseraError::format(
                VARIANT,
                format!(
                    "{} landmarks but {} weights",
                    sources.len(),
                    weights.len()
                ),
            ));
        }
        Ok(Self {
            sources,
            weights,
            affine,
        })
    }

    pub fn num_landmarks(&self) -> usize {
        self.sources.len()
    }

    pub fn affine(&self) -> Option<&SplineAffine> {
        self.affine.as_ref()
    }

    /// Interpolating spline through `p1.l → p2.w` of every match.
    pub fn fit(matches: &[PointMatch]) -> Result<Self> {
        let n = matches.len();
        if n < 3 {
            return Err(TesseraError::NotEnoughDataPoints {
                required: 3,
                found: n,
            });
        }
        let size = n + 3;
        let mut l = DMatrix::<f64>::zeros(size, size);
        let mut rhs = DMatrix::<f64>::zeros(size, DIMS);
        for (i, mi) in matches.iter().enumerate() {
            let si = mi.p1.l;
            for (j, mj) in matches.iter().enumerate().skip(i + 1) {
                let sj = mj.p1.l;
                let k = kernel((si[0] - sj[0]).powi(2) + (si[1] - sj[1]).powi(2));
                l[(i, j)] = k;
                l[(j, i)] = k;
            }
            l[(i, n)] = 1.0;
            l[(i, n + 1)] = si[0];
            l[(i, n + 2)] = si[1];
            l[(n, i)] = 1.0;
            l[(n + 1, i)] = si[0];
            l[(n + 2, i)] = si[1];
            rhs[(i, 0)] = mi.p2.w[0] - si[0];
            rhs[(i, 1)] = mi.p2.w[1] - si[1];
        }

        let solution = l.lu().solve(&rhs).ok_or_else(|| {
            TesseraError::IllDefinedDataPoints("singular thin-plate spline system".to_string())
        })?;

        let sources = matches.iter().map(|m| m.p1.l).collect();
        let weights = (0..n)
            .map(|i| [solution[(i, 0)], solution[(i, 1)]])
            .collect();
        let affine = SplineAffine {
            a: [
                [solution[(n + 1, 0)], solution[(n + 2, 0)]],
                [solution[(n + 1, 1)], solution[(n + 2, 1)]],
            ],
            b: [solution[(n, 0)], solution[(n, 1)]],
        };
        Self::new(sources, weights, Some(affine))
    }

    pub fn init(data: &str) -> Result<Self> {
        let tokens: Vec<&str> = data.split_whitespace().collect();
        if tokens.len() != 5 {
            return Err(TesseraError::format(
                VARIANT,
                format!("expected 5 fields, found {}", tokens.len()),
            ));
        }
        if tokens[0] != TPS_TAG {
            return Err(TesseraError::format(
                VARIANT,
                format!("unexpected tag '{}'", tokens[0]),
            ));
        }
        let ndims = parse_count(tokens[1], VARIANT)?;
        if ndims != DIMS {
            return Err(TesseraError::format(
                VARIANT,
                format!("only {DIMS}D splines are supported, found {ndims}D"),
            ));
        }
        let n = parse_count(tokens[2], VARIANT)?;

        let affine = if tokens[3] == "null" {
            None
        } else {
            let v = decode_doubles(tokens[3], DIMS * DIMS + DIMS, VARIANT)?;
            Some(SplineAffine {
                a: [[v[0], v[1]], [v[2], v[3]]],
                b: [v[4], v[5]],
            })
        };

        let v = decode_doubles(tokens[4], 2 * n * DIMS, VARIANT)?;
        let (src, wts) = v.split_at(n * DIMS);
        let sources = src.chunks_exact(DIMS).map(|c| [c[0], c[1]]).collect();
        let weights = wts.chunks_exact(DIMS).map(|c| [c[0], c[1]]).collect();
        Self::new(sources, weights, affine)
    }

    pub fn to_data_string(&self) -> String {
        let affine = match &self.affine {
            None => "null".to_string(),
            Some(aff) => encode_doubles(&[
                aff.a[0][0],
                aff.a[0][1],
                aff.a[1][0],
                aff.a[1][1],
                aff.b[0],
                aff.b[1],
            ]),
        };
        let mut block = Vec::with_capacity(2 * self.sources.len() * DIMS);
        block.extend(self.sources.iter().flatten());
        block.extend(self.weights.iter().flatten());
        format!(
            "{TPS_TAG} {DIMS} {} {affine} {}",
            self.sources.len(),
            encode_doubles(&block)
        )
    }
}

impl CoordinateTransform for ThinPlateSplineTransform {
    fn apply(&self, p: [f64; 2]) -> [f64; 2] {
        let mut out = p;
        if let Some(aff) = &self.affine {
            out[0] += aff.a[0][0] * p[0] + aff.a[0][1] * p[1] + aff.b[0];
            out[1] += aff.a[1][0] * p[0] + aff.a[1][1] * p[1] + aff.b[1];
        }
        for (s, w) in self.sources.iter().zip(&self.weights) {
            let u = kernel((p[0] - s[0]).powi(2) + (p[1] - s[1]).powi(2));
            out[0] += w[0] * u;
            out[1] += w[1] * u;
        }
        out
    }
}
