//! Coordinate transforms and their persisted text form.
//!
//! Every variant serializes to a whitespace-separated data string and is
//! identified in host documents by a `class` attribute. [`Transform`] is the
//! closed set of variants the crate can read and write.

pub mod bspline;
pub mod codec;
pub mod homography;
pub mod mapping;
pub mod mesh;
pub mod polynomial;
pub mod polynomial_kernel;
pub mod thin_plate_spline;

use crate::error::{Result, TesseraError};
use crate::model::AffineModel2D;

pub use bspline::CubicBSplineTransform;
pub use homography::HomographyModel2D;
pub use mesh::{Inverse, TransformMesh};
pub use polynomial::PolynomialTransform2D;
pub use polynomial_kernel::PolynomialKernelTransform;
pub use thin_plate_spline::ThinPlateSplineTransform;

/// A mapping of 2D locations.
pub trait CoordinateTransform {
    fn apply(&self, p: [f64; 2]) -> [f64; 2];

    fn apply_in_place(&self, p: &mut [f64; 2]) {
        *p = self.apply(*p);
    }
}

/// A transform with an exact inverse.
pub trait InvertibleTransform: CoordinateTransform {
    fn apply_inverse(&self, p: [f64; 2]) -> Result<[f64; 2]>;

    fn apply_inverse_in_place(&self, p: &mut [f64; 2]) -> Result<()> {
        *p = self.apply_inverse(*p)?;
        Ok(())
    }
}

/// Class names used in the `class` attribute of persisted transforms.
pub mod class_name {
    pub const AFFINE: &str = "mpicbg.trakem2.transform.AffineModel2D";
    pub const POLYNOMIAL: &str = "mpicbg.trakem2.transform.PolynomialTransform2D";
    pub const HOMOGRAPHY: &str = "mpicbg.trakem2.transform.HomographyModel2D";
    pub const THIN_PLATE_SPLINE: &str = "mpicbg.trakem2.transform.ThinPlateSplineTransform";
    pub const BSPLINE: &str = "bunwarpj.trakem2.transform.CubicBSplineTransform";
    pub const POLYNOMIAL_KERNEL: &str = "mpicbg.trakem2.transform.NonLinearCoordinateTransform";
}

/// Every persisted transform variant.
#[derive(Clone, Debug, PartialEq)]
pub enum Transform {
    Affine(AffineModel2D),
    Polynomial(PolynomialTransform2D),
    Homography(HomographyModel2D),
    ThinPlateSpline(ThinPlateSplineTransform),
    BSpline(CubicBSplineTransform),
    PolynomialKernel(PolynomialKernelTransform),
}

impl Transform {
    /// Parse a data string for the variant named by `class`.
    pub fn from_class_and_data(class: &str, data: &str) -> Result<Self> {
        Ok(match class {
            class_name::AFFINE => Self::Affine(AffineModel2D::init(data)?),
            class_name::POLYNOMIAL => Self::Polynomial(PolynomialTransform2D::init(data)?),
            class_name::HOMOGRAPHY => Self::Homography(HomographyModel2D::init(data)?),
            class_name::THIN_PLATE_SPLINE => {
                Self::ThinPlateSpline(ThinPlateSplineTransform::init(data)?)
            }
            class_name::BSPLINE => Self::BSpline(CubicBSplineTransform::init(data)?),
            class_name::POLYNOMIAL_KERNEL => {
                Self::PolynomialKernel(PolynomialKernelTransform::init(data)?)
            }
            other => {
                return Err(TesseraError::format(
                    "transform",
                    format!("unknown transform class '{other}'"),
                ))
            }
        })
    }

    /// Re-parse a data string into the same variant as `self`.
    pub fn reinit(&self, data: &str) -> Result<Self> {
        Self::from_class_and_data(self.class_name(), data)
    }

    pub fn class_name(&self) -> &'static str {
        match self {
            Self::Affine(_) => class_name::AFFINE,
            Self::Polynomial(_) => class_name::POLYNOMIAL,
            Self::Homography(_) => class_name::HOMOGRAPHY,
            Self::ThinPlateSpline(_) => class_name::THIN_PLATE_SPLINE,
            Self::BSpline(_) => class_name::BSPLINE,
            Self::PolynomialKernel(_) => class_name::POLYNOMIAL_KERNEL,
        }
    }

    pub fn to_data_string(&self) -> String {
        match self {
            Self::Affine(t) => t.to_data_string(),
            Self::Polynomial(t) => t.to_data_string(),
            Self::Homography(t) => t.to_data_string(),
            Self::ThinPlateSpline(t) => t.to_data_string(),
            Self::BSpline(t) => t.to_data_string(),
            Self::PolynomialKernel(t) => t.to_data_string(),
        }
    }

    /// Minimum number of point matches needed to fit this variant; zero for
    /// variants that are only ever read, never fit.
    pub fn min_num_matches(&self) -> usize {
        match self {
            Self::Affine(_) => 3,
            Self::Polynomial(t) => t.min_num_matches(),
            Self::Homography(_) => 4,
            Self::ThinPlateSpline(_) => 3,
            Self::BSpline(_) | Self::PolynomialKernel(_) => 0,
        }
    }

    pub fn is_invertible(&self) -> bool {
        matches!(self, Self::Affine(_) | Self::Homography(_))
    }

    /// Exact inverse for the variants that have one.
    pub fn apply_inverse(&self, p: [f64; 2]) -> Result<[f64; 2]> {
        match self {
            Self::Affine(t) => t.apply_inverse(p),
            Self::Homography(t) => t.apply_inverse(p),
            _ => Err(TesseraError::NoninvertibleModel(format!(
                "{} has no closed-form inverse",
                self.class_name()
            ))),
        }
    }

    /// Single element carrying `class` and `data` attributes. Invertible
    /// variants use the `iict_transform` element name.
    pub fn to_xml(&self, indent: &str) -> String {
        let element = if self.is_invertible() {
            "iict_transform"
        } else {
            "ict_transform"
        };
        format!(
            "{indent}<{element} class=\"{}\" data=\"{}\"/>",
            self.class_name(),
            self.to_data_string()
        )
    }
}

impl CoordinateTransform for Transform {
    fn apply(&self, p: [f64; 2]) -> [f64; 2] {
        match self {
            Self::Affine(t) => t.apply(p),
            Self::Polynomial(t) => t.apply(p),
            Self::Homography(t) => t.apply(p),
            Self::ThinPlateSpline(t) => t.apply(p),
            Self::BSpline(t) => t.apply(p),
            Self::PolynomialKernel(t) => t.apply(p),
        }
    }
}

/// Transforms applied in sequence, first to last.
#[derive(Clone, Debug, Default)]
pub struct TransformChain {
    transforms: Vec<Transform>,
}

impl TransformChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, transform: Transform) {
        self.transforms.push(transform);
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transform> {
        self.transforms.iter()
    }
}

impl CoordinateTransform for TransformChain {
    fn apply(&self, p: [f64; 2]) -> [f64; 2] {
        self.transforms.iter().fold(p, |q, t| t.apply(q))
    }
}
