use crate::transform::CoordinateTransform;

/// A location with its tile-local coordinates `l` and the world coordinates
/// `w` it currently maps to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    pub l: [f64; 2],
    pub w: [f64; 2],
}

impl Point {
    /// A fresh point whose world position equals its local position.
    pub fn new(l: [f64; 2]) -> Self {
        Self { l, w: l }
    }

    /// Recompute the world position from the local one.
    pub fn apply<T: CoordinateTransform + ?Sized>(&mut self, transform: &T) {
        self.w = transform.apply(self.l);
    }

    /// Euclidean distance between the world positions of two points.
    pub fn distance(a: &Point, b: &Point) -> f64 {
        distance(a.w, b.w)
    }
}

pub fn distance(a: [f64; 2], b: [f64; 2]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    (dx * dx + dy * dy).sqrt()
}

/// A correspondence between a point on one tile and a point on another.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointMatch {
    pub p1: Point,
    pub p2: Point,
    pub weight: f64,
}

impl PointMatch {
    pub fn new(p1: Point, p2: Point) -> Self {
        Self::weighted(p1, p2, 1.0)
    }

    pub fn weighted(p1: Point, p2: Point, weight: f64) -> Self {
        Self { p1, p2, weight }
    }

    /// Move `p1` into world space through `transform`.
    pub fn apply<T: CoordinateTransform + ?Sized>(&mut self, transform: &T) {
        self.p1.apply(transform);
    }

    /// Current residual: distance between the world positions of both ends.
    pub fn distance(&self) -> f64 {
        Point::distance(&self.p1, &self.p2)
    }

    /// The same correspondence seen from the other tile.
    pub fn flip(&self) -> Self {
        Self {
            p1: self.p2,
            p2: self.p1,
            weight: self.weight,
        }
    }
}

/// Apply `transform` to `p1` of every match.
pub fn apply_all<T: CoordinateTransform + ?Sized>(matches: &mut [PointMatch], transform: &T) {
    for m in matches {
        m.apply(transform);
    }
}

/// Weighted mean residual of a set of matches.
pub fn mean_distance(matches: &[PointMatch]) -> f64 {
    let mut sum = 0.0;
    let mut weights = 0.0;
    for m in matches {
        sum += m.distance() * m.weight;
        weights += m.weight;
    }
    if weights > 0.0 {
        sum / weights
    } else {
        0.0
    }
}
