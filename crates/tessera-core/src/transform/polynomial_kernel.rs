use crate::consts::KERNEL_CONSTANT_TERM;
use crate::error::{Result, TesseraError};

use super::codec::{format_decimal, parse_count, parse_decimal};
use super::CoordinateTransform;

const VARIANT: &str = "polynomial kernel";

/// Non-linear correction in a normalized polynomial feature space.
///
/// A location is expanded into all monomials `x^j * y^(i-j)` for
/// `i = 1..=dimension`, each standardized by its mean and variance, plus a
/// constant term; the output is the feature vector times a `length x 2`
/// coefficient matrix.
#[derive(Clone, Debug, PartialEq)]
pub struct PolynomialKernelTransform {
    dimension: usize,
    beta: Vec<[f64; 2]>,
    norm_mean: Vec<f64>,
    norm_var: Vec<f64>,
    width: usize,
    height: usize,
}

/// Number of features for a kernel of `dimension`, constant term included.
fn feature_count(dimension: usize) -> usize {
    dimension * (dimension + 3) / 2 + 1
}

impl PolynomialKernelTransform {
    pub fn new(
        dimension: usize,
        beta: Vec<[f64; 2]>,
        norm_mean: Vec<f64>,
        norm_var: Vec<f64>,
        width: usize,
        height: usize,
    ) -> Result<Self> {
        let length = feature_count(dimension);
        if beta.len() != length || norm_mean.len() != length || norm_var.len() != length {
            return Err(TesseraError::format(
                VARIANT,
                format!("dimension {dimension} needs {length} features"),
            ));
        }
        Ok(Self {
            dimension,
            beta,
            norm_mean,
            norm_var,
            width,
            height,
        })
    }

    /// Parse `dimension length beta[2*length] mean[length] var[length] width height`.
    pub fn init(data: &str) -> Result<Self> {
        let tokens: Vec<&str> = data.split_whitespace().collect();
        if tokens.len() < 2 {
            return Err(TesseraError::format(VARIANT, "missing header"));
        }
        let dimension = parse_count(tokens[0], VARIANT)?;
        let length = parse_count(tokens[1], VARIANT)?;
        if tokens.len() != 4 + 4 * length {
            return Err(TesseraError::format(
                VARIANT,
                format!(
                    "length {length} needs {} tokens, found {}",
                    4 + 4 * length,
                    tokens.len()
                ),
            ));
        }
        let values = tokens[2..2 + 4 * length]
            .iter()
            .map(|t| parse_decimal(t, VARIANT))
            .collect::<Result<Vec<f64>>>()?;
        let beta = values[..2 * length]
            .chunks_exact(2)
            .map(|c| [c[0], c[1]])
            .collect();
        let norm_mean = values[2 * length..3 * length].to_vec();
        let norm_var = values[3 * length..].to_vec();
        let width = parse_count(tokens[2 + 4 * length], VARIANT)?;
        let height = parse_count(tokens[3 + 4 * length], VARIANT)?;
        Self::new(dimension, beta, norm_mean, norm_var, width, height)
    }

    pub fn to_data_string(&self) -> String {
        let mut fields = vec![self.dimension.to_string(), self.beta.len().to_string()];
        fields.extend(self.beta.iter().flatten().map(|&v| format_decimal(v)));
        fields.extend(self.norm_mean.iter().map(|&v| format_decimal(v)));
        fields.extend(self.norm_var.iter().map(|&v| format_decimal(v)));
        fields.push(self.width.to_string());
        fields.push(self.height.to_string());
        fields.join(" ")
    }

    fn kernel_expand(&self, p: [f64; 2]) -> Vec<f64> {
        let length = self.beta.len();
        let mut expanded = Vec::with_capacity(length);
        for i in 1..=self.dimension {
            for j in (0..=i).rev() {
                expanded.push(p[0].powi(j as i32) * p[1].powi((i - j) as i32));
            }
        }
        expanded.push(KERNEL_CONSTANT_TERM);
        for (k, v) in expanded.iter_mut().enumerate().take(length - 1) {
            *v = (*v - self.norm_mean[k]) / self.norm_var[k];
        }
        expanded
    }
}

impl CoordinateTransform for PolynomialKernelTransform {
    fn apply(&self, p: [f64; 2]) -> [f64; 2] {
        self.kernel_expand(p)
            .iter()
            .zip(&self.beta)
            .fold([0.0, 0.0], |acc, (f, b)| [acc[0] + f * b[0], acc[1] + f * b[1]])
    }
}
