use crate::error::{Result, TesseraError};

use super::codec::{join_decimals, parse_count, parse_decimal};
use super::CoordinateTransform;

const VARIANT: &str = "cubic B-spline";

/// Deformation given by two grids of cubic B-spline coefficients spanning a
/// `width` x `height` image with `intervals` spline intervals per side.
/// Each grid holds `(intervals + 3)²` coefficients, row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct CubicBSplineTransform {
    width: usize,
    height: usize,
    intervals: usize,
    cx: Vec<f64>,
    cy: Vec<f64>,
}

/// Centered cubic B-spline basis.
fn bspline3(t: f64) -> f64 {
    let t = t.abs();
    if t < 1.0 {
        2.0 / 3.0 - t * t + 0.5 * t * t * t
    } else if t < 2.0 {
        let u = 2.0 - t;
        u * u * u / 6.0
    } else {
        0.0
    }
}

/// Mirror an index into `0..size`.
fn mirror(mut i: i64, size: i64) -> usize {
    if size == 1 {
        return 0;
    }
    let period = 2 * (size - 1);
    i = i.rem_euclid(period);
    if i >= size {
        i = period - i;
    }
    i as usize
}

impl CubicBSplineTransform {
    pub fn new(
        width: usize,
        height: usize,
        intervals: usize,
        cx: Vec<f64>,
        cy: Vec<f64>,
    ) -> Result<Self> {
        let size = intervals + 3;
        if cx.len() != size * size || cy.len() != size * size {
            return Err(TesseraError::format(
                VARIANT,
                format!(
                    "{intervals} intervals need {} coefficients per grid",
                    size * size
                ),
            ));
        }
        if width < 2 || height < 2 || intervals == 0 {
            return Err(TesseraError::format(
                VARIANT,
                format!("degenerate grid {width}x{height} with {intervals} intervals"),
            ));
        }
        Ok(Self {
            width,
            height,
            intervals,
            cx,
            cy,
        })
    }

    /// Parse `width height intervals cx[size²] cy[size²]`; the token count
    /// must match the declared grid exactly.
    pub fn init(data: &str) -> Result<Self> {
        let tokens: Vec<&str> = data.split_whitespace().collect();
        if tokens.len() < 3 {
            return Err(TesseraError::format(VARIANT, "missing grid header"));
        }
        let width = parse_count(tokens[0], VARIANT)?;
        let height = parse_count(tokens[1], VARIANT)?;
        let intervals = parse_count(tokens[2], VARIANT)?;
        let size2 = (intervals + 3) * (intervals + 3);
        if tokens.len() != 3 + 2 * size2 {
            return Err(TesseraError::format(
                VARIANT,
                format!(
                    "declared {intervals} intervals need {} tokens, found {}",
                    3 + 2 * size2,
                    tokens.len()
                ),
            ));
        }
        let values = tokens[3..]
            .iter()
            .map(|t| parse_decimal(t, VARIANT))
            .collect::<Result<Vec<f64>>>()?;
        let (cx, cy) = values.split_at(size2);
        Self::new(width, height, intervals, cx.to_vec(), cy.to_vec())
    }

    pub fn to_data_string(&self) -> String {
        format!(
            "{} {} {} {} {}",
            self.width,
            self.height,
            self.intervals,
            join_decimals(&self.cx),
            join_decimals(&self.cy)
        )
    }

    fn interpolate(&self, grid: &[f64], tu: f64, tv: f64) -> f64 {
        let size = (self.intervals + 3) as i64;
        let iu = tu.floor() as i64;
        let iv = tv.floor() as i64;
        let mut sum = 0.0;
        for dv in -1..=2 {
            let wv = bspline3(tv - (iv + dv) as f64);
            let row = mirror(iv + dv, size) * size as usize;
            for du in -1..=2 {
                let wu = bspline3(tu - (iu + du) as f64);
                sum += wu * wv * grid[row + mirror(iu + du, size)];
            }
        }
        sum
    }
}

impl CoordinateTransform for CubicBSplineTransform {
    fn apply(&self, p: [f64; 2]) -> [f64; 2] {
        let k = self.intervals as f64;
        let tu = p[0] * k / (self.width - 1) as f64 + 1.0;
        let tv = p[1] * k / (self.height - 1) as f64 + 1.0;
        [
            self.interpolate(&self.cx, tu, tv),
            self.interpolate(&self.cy, tu, tv),
        ]
    }
}
