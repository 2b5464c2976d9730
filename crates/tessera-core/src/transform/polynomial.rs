use nalgebra::{DMatrix, DVector};

use crate::error::{Result, TesseraError};
use crate::model::PointMatch;

use super::codec::{join_decimals, parse_decimal};
use super::CoordinateTransform;

const VARIANT: &str = "polynomial";

/// Bivariate polynomial of arbitrary order.
///
/// Coefficients for `x'` come first, then those for `y'`. Within each block
/// the terms run by ascending order `k`, and within an order as
/// `x^(k-j) * y^j` for `j = 0..=k`, i.e. `1, x, y, x², xy, y², ...`.
#[derive(Clone, Debug, PartialEq)]
pub struct PolynomialTransform2D {
    order: usize,
    a: Vec<f64>,
}

/// Number of terms per coordinate of a polynomial of `order`.
fn num_terms(order: usize) -> usize {
    (order + 1) * (order + 2) / 2
}

impl PolynomialTransform2D {
    pub fn new(coefficients: Vec<f64>) -> Result<Self> {
        let order = order_for(coefficients.len())?;
        Ok(Self {
            order,
            a: coefficients,
        })
    }

    /// Identity of the given order.
    pub fn identity(order: usize) -> Self {
        let n = num_terms(order);
        let mut a = vec![0.0; 2 * n];
        if order >= 1 {
            a[1] = 1.0;
            a[n + 2] = 1.0;
        }
        Self { order, a }
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.a
    }

    pub fn min_num_matches(&self) -> usize {
        num_terms(self.order)
    }

    pub fn init(data: &str) -> Result<Self> {
        let coefficients = data
            .split_whitespace()
            .map(|t| parse_decimal(t, VARIANT))
            .collect::<Result<Vec<f64>>>()?;
        Self::new(coefficients)
    }

    pub fn to_data_string(&self) -> String {
        join_decimals(&self.a)
    }

    /// Least-squares fit of `p1.l` onto `p2.w`, keeping the current order.
    pub fn fit(&mut self, matches: &[PointMatch]) -> Result<()> {
        let n = num_terms(self.order);
        if matches.len() < n {
            return Err(TesseraError::NotEnoughDataPoints {
                required: n,
                found: matches.len(),
            });
        }
        let mut design = DMatrix::<f64>::zeros(matches.len(), n);
        let mut bx = DVector::<f64>::zeros(matches.len());
        let mut by = DVector::<f64>::zeros(matches.len());
        let mut terms = vec![0.0; n];
        for (row, m) in matches.iter().enumerate() {
            let w = m.weight.sqrt();
            self.expand(m.p1.l, &mut terms);
            for (col, t) in terms.iter().enumerate() {
                design[(row, col)] = w * t;
            }
            bx[row] = w * m.p2.w[0];
            by[row] = w * m.p2.w[1];
        }

        let svd = design.svd(true, true);
        let solve = |b: &DVector<f64>| {
            svd.solve(b, 1e-12).map_err(|e| {
                TesseraError::IllDefinedDataPoints(format!("polynomial fit: {e}"))
            })
        };
        let cx = solve(&bx)?;
        let cy = solve(&by)?;
        self.a[..n].copy_from_slice(cx.as_slice());
        self.a[n..].copy_from_slice(cy.as_slice());
        Ok(())
    }

    fn expand(&self, p: [f64; 2], terms: &mut [f64]) {
        let mut idx = 0;
        for k in 0..=self.order {
            for j in 0..=k {
                terms[idx] = p[0].powi((k - j) as i32) * p[1].powi(j as i32);
                idx += 1;
            }
        }
    }
}

/// Order implied by a coefficient count; only `(o + 1)(o + 2)` is valid.
fn order_for(count: usize) -> Result<usize> {
    let mut order = 0;
    while 2 * num_terms(order) < count {
        order += 1;
    }
    if count == 0 || 2 * num_terms(order) != count {
        return Err(TesseraError::format(
            VARIANT,
            format!("{count} coefficients do not describe a complete polynomial"),
        ));
    }
    Ok(order)
}

impl CoordinateTransform for PolynomialTransform2D {
    fn apply(&self, p: [f64; 2]) -> [f64; 2] {
        let n = num_terms(self.order);
        let mut x = 0.0;
        let mut y = 0.0;
        let mut idx = 0;
        for k in 0..=self.order {
            for j in 0..=k {
                let t = p[0].powi((k - j) as i32) * p[1].powi(j as i32);
                x += self.a[idx] * t;
                y += self.a[n + idx] * t;
                idx += 1;
            }
        }
        [x, y]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_for_valid_counts() {
        assert_eq!(order_for(2).unwrap(), 0);
        assert_eq!(order_for(6).unwrap(), 1);
        assert_eq!(order_for(12).unwrap(), 2);
        assert_eq!(order_for(20).unwrap(), 3);
    }

    #[test]
    fn test_order_for_fractional_order_rejected() {
        for count in [0, 1, 5, 7, 13] {
            assert!(order_for(count).is_err(), "count {count}");
        }
    }
}
