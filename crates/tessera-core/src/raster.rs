use ndarray::Array2;

use crate::error::{Result, TesseraError};

/// A single grayscale tile image.
/// Pixel values are f32 in [0.0, 1.0].
#[derive(Clone, Debug)]
pub struct Raster {
    /// Pixel data, row-major, shape = (height, width)
    pub data: Array2<f32>,
    /// Optional validity mask in [0.0, 1.0], same shape as `data`
    pub alpha: Option<Array2<f32>>,
}

impl Raster {
    pub fn new(data: Array2<f32>) -> Self {
        Self { data, alpha: None }
    }

    pub fn with_alpha(data: Array2<f32>, alpha: Array2<f32>) -> Result<Self> {
        if data.dim() != alpha.dim() {
            return Err(TesseraError::InvalidDimensions {
                width: alpha.ncols(),
                height: alpha.nrows(),
            });
        }
        Ok(Self {
            data,
            alpha: Some(alpha),
        })
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    /// Alpha at an integer pixel; fully opaque when the raster has no mask.
    pub fn alpha_at(&self, row: usize, col: usize) -> f32 {
        self.alpha.as_ref().map_or(1.0, |a| a[[row, col]])
    }
}

/// Flattened grayscale raster plus its alpha, as consumed by block matching.
#[derive(Clone, Debug)]
pub struct FlatRaster {
    pub image: Array2<f32>,
    pub alpha: Array2<f32>,
}

impl FlatRaster {
    pub fn zeros(width: usize, height: usize) -> Self {
        Self {
            image: Array2::zeros((height, width)),
            alpha: Array2::zeros((height, width)),
        }
    }

    pub fn width(&self) -> usize {
        self.image.ncols()
    }

    pub fn height(&self) -> usize {
        self.image.nrows()
    }
}

/// Integer pixel rectangle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rect {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl Rect {
    pub fn new(x: i64, y: i64, width: i64, height: i64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn area(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            self.width * self.height
        }
    }

    pub fn intersection(&self, other: &Rect) -> Rect {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = (self.x + self.width).min(other.x + other.width);
        let y1 = (self.y + self.height).min(other.y + other.height);
        Rect::new(x0, y0, x1 - x0, y1 - y0)
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        !self.intersection(other).is_empty()
    }

    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x0 = self.x.min(other.x);
        let y0 = self.y.min(other.y);
        let x1 = (self.x + self.width).max(other.x + other.width);
        let y1 = (self.y + self.height).max(other.y + other.height);
        Rect::new(x0, y0, x1 - x0, y1 - y0)
    }
}

/// Real-valued axis-aligned bounds accumulated from transformed points.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        }
    }
}

impl BoundingBox {
    pub fn include(&mut self, x: f64, y: f64) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    /// Smallest integer rectangle covering the bounds. The origin is floored,
    /// the extent rounded up.
    pub fn to_rect(&self) -> Rect {
        if self.min_x > self.max_x || self.min_y > self.max_y {
            return Rect::default();
        }
        let x = self.min_x.floor();
        let y = self.min_y.floor();
        Rect::new(
            x as i64,
            y as i64,
            (self.max_x - x).ceil() as i64,
            (self.max_y - y).ceil() as i64,
        )
    }
}

/// Sample a 2D array at fractional coordinates with bilinear interpolation.
/// Pixels outside the array contribute zero.
pub fn bilinear_sample(data: &Array2<f32>, y: f64, x: f64) -> f32 {
    let (h, w) = data.dim();

    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let x1 = x0 + 1;
    let y1 = y0 + 1;

    let fx = (x - x0 as f64) as f32;
    let fy = (y - y0 as f64) as f32;

    let sample = |r: i64, c: i64| -> f32 {
        if r >= 0 && r < h as i64 && c >= 0 && c < w as i64 {
            data[[r as usize, c as usize]]
        } else {
            0.0
        }
    };

    sample(y0, x0) * (1.0 - fx) * (1.0 - fy)
        + sample(y0, x1) * fx * (1.0 - fy)
        + sample(y1, x0) * (1.0 - fx) * fy
        + sample(y1, x1) * fx * fy
}
