//! Triangulated piecewise-affine approximation of a coordinate transform.
//!
//! A regular grid is laid over the `width` x `height` source rectangle and
//! every quad cell is split into two triangles. Each vertex is pushed through
//! the base transform, the result is shifted so that its integer bounding box
//! starts at the origin, and one affine is fit per triangle from its three
//! vertex correspondences.

use crate::error::{Result, TesseraError};
use crate::model::{AffineModel2D, Point, PointMatch};
use crate::raster::{BoundingBox, Rect};

use super::CoordinateTransform;

/// Relative tolerance of the inclusive point-in-triangle test.
const INSIDE_TOLERANCE: f64 = 1e-9;

#[derive(Clone, Debug)]
struct Triangle {
    vertices: [usize; 3],
    affine: AffineModel2D,
    inverse: Option<AffineModel2D>,
}

/// Result of inverting a mesh location.
#[must_use]
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Inverse {
    /// The location fell inside triangle `triangle` of the target mesh.
    Exact { location: [f64; 2], triangle: usize },
    /// The location was outside every target triangle and was inverted
    /// through the nearest one.
    Approximate { location: [f64; 2], triangle: usize },
}

impl Inverse {
    pub fn location(&self) -> [f64; 2] {
        match *self {
            Self::Exact { location, .. } | Self::Approximate { location, .. } => location,
        }
    }

    pub fn triangle(&self) -> usize {
        match *self {
            Self::Exact { triangle, .. } | Self::Approximate { triangle, .. } => triangle,
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, Self::Exact { .. })
    }

    /// Accept only exact inverses.
    pub fn into_strict(self) -> Result<[f64; 2]> {
        match self {
            Self::Exact { location, .. } => Ok(location),
            Self::Approximate { location, triangle } => {
                Err(TesseraError::NoninvertibleModel(format!(
                    "location outside the mesh, approximated to ({}, {}) by triangle {triangle}",
                    location[0], location[1]
                )))
            }
        }
    }
}

/// Piecewise-affine mesh over a transformed source rectangle.
///
/// Triangle searches scan triangles in index order and stop at the first hit;
/// equal nearest-triangle distances resolve to the lowest index.
#[derive(Clone, Debug)]
pub struct TransformMesh {
    vertices: Vec<Point>,
    triangles: Vec<Triangle>,
    bounding_box: Rect,
    num_x: usize,
    num_y: usize,
    width: f64,
    height: f64,
}

/// Vertex rows for `num_x` vertices per row, keeping triangles close to
/// equilateral for the given aspect ratio.
pub fn num_y(num_x: usize, width: f64, height: f64) -> usize {
    let cells_x = num_x.saturating_sub(1).max(1) as f64;
    let dy = width / cells_x * 3f64.sqrt() / 2.0;
    let cells_y = (height / dy).round().max(1.0);
    cells_y as usize + 1
}

impl TransformMesh {
    /// Build a mesh of `num_x` vertices per row over `width` x `height`,
    /// pushed through `transform`.
    pub fn new<T: CoordinateTransform + ?Sized>(
        transform: &T,
        num_x: usize,
        width: f64,
        height: f64,
    ) -> Result<Self> {
        if num_x < 2 || !(width > 0.0) || !(height > 0.0) {
            return Err(TesseraError::InvalidDimensions {
                width: width.max(0.0) as usize,
                height: height.max(0.0) as usize,
            });
        }
        let num_y = num_y(num_x, width, height);
        let dx = width / (num_x - 1) as f64;
        let dy = height / (num_y - 1) as f64;

        let mut vertices = Vec::with_capacity(num_x * num_y);
        let mut bounds = BoundingBox::default();
        for j in 0..num_y {
            for i in 0..num_x {
                let mut p = Point::new([i as f64 * dx, j as f64 * dy]);
                p.apply(transform);
                bounds.include(p.w[0], p.w[1]);
                vertices.push(p);
            }
        }

        let bounding_box = bounds.to_rect();
        for p in &mut vertices {
            p.w[0] -= bounding_box.x as f64;
            p.w[1] -= bounding_box.y as f64;
        }

        let mut triangles = Vec::with_capacity(2 * (num_x - 1) * (num_y - 1));
        for j in 0..num_y - 1 {
            for i in 0..num_x - 1 {
                let tl = j * num_x + i;
                let tr = tl + 1;
                let bl = tl + num_x;
                let br = bl + 1;
                // Alternate the diagonal in a checkerboard.
                let pair = if (i + j) % 2 == 0 {
                    [[tl, tr, bl], [tr, br, bl]]
                } else {
                    [[tl, tr, br], [tl, br, bl]]
                };
                for idx in pair {
                    triangles.push(Triangle {
                        vertices: idx,
                        affine: AffineModel2D::identity(),
                        inverse: None,
                    });
                }
            }
        }

        let mut mesh = Self {
            vertices,
            triangles,
            bounding_box,
            num_x,
            num_y,
            width,
            height,
        };
        mesh.update_affines()?;
        Ok(mesh)
    }

    /// Refit every triangle's affine from its current vertex positions.
    pub fn update_affines(&mut self) -> Result<()> {
        for t in &mut self.triangles {
            let matches: Vec<PointMatch> = t
                .vertices
                .iter()
                .map(|&v| PointMatch::new(Point::new(self.vertices[v].l), self.vertices[v]))
                .collect();
            t.affine.fit(&matches)?;
            t.inverse = t.affine.create_inverse().ok();
        }
        Ok(())
    }

    /// Integer bounds of the transformed rectangle before the shift to the
    /// origin.
    pub fn bounding_box(&self) -> Rect {
        self.bounding_box
    }

    pub fn num_x(&self) -> usize {
        self.num_x
    }

    pub fn num_y(&self) -> usize {
        self.num_y
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    pub fn num_triangles(&self) -> usize {
        self.triangles.len()
    }

    pub fn affine(&self, triangle: usize) -> &AffineModel2D {
        &self.triangles[triangle].affine
    }

    /// Source-space corners of a triangle.
    pub fn source_triangle(&self, triangle: usize) -> [[f64; 2]; 3] {
        self.triangles[triangle].vertices.map(|v| self.vertices[v].l)
    }

    /// Target-space corners of a triangle, relative to the bounding box.
    pub fn target_triangle(&self, triangle: usize) -> [[f64; 2]; 3] {
        self.triangles[triangle].vertices.map(|v| self.vertices[v].w)
    }

    pub(crate) fn inverse_affine(&self, triangle: usize) -> Option<&AffineModel2D> {
        self.triangles[triangle].inverse.as_ref()
    }

    /// Invert a target location, falling back to the nearest triangle when
    /// no triangle contains it.
    pub fn apply_inverse(&self, location: [f64; 2]) -> Result<Inverse> {
        for (i, t) in self.triangles.iter().enumerate() {
            if let Some(inverse) = &t.inverse {
                if contains(&self.target_triangle(i), location) {
                    return Ok(Inverse::Exact {
                        location: inverse.apply(location),
                        triangle: i,
                    });
                }
            }
        }

        let nearest = self
            .nearest(location, |i| self.target_triangle(i), true)
            .ok_or_else(|| {
                TesseraError::NoninvertibleModel("every mesh triangle is degenerate".to_string())
            })?;
        let inverse = self.triangles[nearest]
            .inverse
            .as_ref()
            .ok_or_else(|| TesseraError::NoninvertibleModel("degenerate triangle".to_string()))?;
        Ok(Inverse::Approximate {
            location: inverse.apply(location),
            triangle: nearest,
        })
    }

    pub fn apply_inverse_in_place(&self, location: &mut [f64; 2]) -> Result<Inverse> {
        let result = self.apply_inverse(*location)?;
        *location = result.location();
        Ok(result)
    }

    /// Index of the triangle whose source polygon contains `location`, or the
    /// nearest one.
    pub fn closest_source_triangle(&self, location: [f64; 2]) -> usize {
        debug_assert!(!self.triangles.is_empty(), "meshes have at least two triangles");
        (0..self.triangles.len())
            .find(|&i| contains(&self.source_triangle(i), location))
            .or_else(|| self.nearest(location, |i| self.source_triangle(i), false))
            .unwrap_or(0)
    }

    /// Index of the triangle whose target polygon contains `location`, or the
    /// nearest one.
    pub fn closest_target_triangle(&self, location: [f64; 2]) -> usize {
        debug_assert!(!self.triangles.is_empty(), "meshes have at least two triangles");
        (0..self.triangles.len())
            .find(|&i| contains(&self.target_triangle(i), location))
            .or_else(|| self.nearest(location, |i| self.target_triangle(i), false))
            .unwrap_or(0)
    }

    pub fn closest_source_affine(&self, location: [f64; 2]) -> &AffineModel2D {
        self.affine(self.closest_source_triangle(location))
    }

    pub fn closest_target_affine(&self, location: [f64; 2]) -> &AffineModel2D {
        self.affine(self.closest_target_triangle(location))
    }

    /// Triangle with the smallest summed vertex distance to `location`.
    fn nearest<F>(&self, location: [f64; 2], corners: F, invertible_only: bool) -> Option<usize>
    where
        F: Fn(usize) -> [[f64; 2]; 3],
    {
        let mut best = None;
        let mut d_min = f64::MAX;
        for i in 0..self.triangles.len() {
            if invertible_only && self.triangles[i].inverse.is_none() {
                continue;
            }
            let d: f64 = corners(i)
                .iter()
                .map(|c| ((c[0] - location[0]).powi(2) + (c[1] - location[1]).powi(2)).sqrt())
                .sum();
            if d < d_min {
                d_min = d;
                best = Some(i);
            }
        }
        best
    }
}

impl CoordinateTransform for TransformMesh {
    /// Piecewise-affine forward map through the source triangle under `p`.
    fn apply(&self, p: [f64; 2]) -> [f64; 2] {
        self.closest_source_affine(p).apply(p)
    }
}

fn cross(o: [f64; 2], a: [f64; 2], b: [f64; 2]) -> f64 {
    (a[0] - o[0]) * (b[1] - o[1]) - (a[1] - o[1]) * (b[0] - o[0])
}

/// Inclusive point-in-triangle test, independent of winding.
pub(crate) fn contains(t: &[[f64; 2]; 3], p: [f64; 2]) -> bool {
    let area = cross(t[0], t[1], t[2]);
    if area == 0.0 {
        return false;
    }
    let tol = INSIDE_TOLERANCE * area.abs();
    let d0 = cross(t[0], t[1], p) * area.signum();
    let d1 = cross(t[1], t[2], p) * area.signum();
    let d2 = cross(t[2], t[0], p) * area.signum();
    d0 >= -tol && d1 >= -tol && d2 >= -tol
}

/// Signed area of a triangle.
pub fn triangle_area(t: &[[f64; 2]; 3]) -> f64 {
    0.5 * cross(t[0], t[1], t[2])
}
