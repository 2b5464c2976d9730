use ndarray::Array2;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use tessera_core::align::Feature;
use tessera_core::model::{AffineModel2D, Point, PointMatch};
use tessera_core::raster::Raster;
use tessera_core::transform::CoordinateTransform;

/// Smooth random texture: a sum of Gaussian blobs with random centres,
/// radii and signs, normalized to `[0, 1]`.
pub fn textured_image(width: usize, height: usize, blobs: usize, seed: u64) -> Array2<f32> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let specs: Vec<(f64, f64, f64, f64)> = (0..blobs)
        .map(|_| {
            (
                rng.random_range(0.0..width as f64),
                rng.random_range(0.0..height as f64),
                rng.random_range(3.0..9.0),
                if rng.random_bool(0.5) { 1.0 } else { -1.0 },
            )
        })
        .collect();

    let mut data = Array2::<f32>::zeros((height, width));
    for ((row, col), v) in data.indexed_iter_mut() {
        let mut sum = 0.0;
        for &(cx, cy, r, sign) in &specs {
            let d2 = (col as f64 - cx).powi(2) + (row as f64 - cy).powi(2);
            sum += sign * (-d2 / (2.0 * r * r)).exp();
        }
        *v = sum as f32;
    }

    let min = data.iter().copied().fold(f32::INFINITY, f32::min);
    let max = data.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = (max - min).max(1e-6);
    data.mapv_inplace(|v| (v - min) / range);
    data
}

/// Window `[x, x + width) x [y, y + height)` of `image` as an opaque raster.
pub fn crop(image: &Array2<f32>, x: usize, y: usize, width: usize, height: usize) -> Raster {
    let data = image
        .slice(ndarray::s![y..y + height, x..x + width])
        .to_owned();
    Raster::new(data)
}

/// Random unit descriptor of `len` entries.
fn random_descriptor(rng: &mut ChaCha8Rng, len: usize) -> Vec<f32> {
    let v: Vec<f32> = (0..len).map(|_| rng.random_range(-1.0..1.0)).collect();
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
    v.into_iter().map(|x| x / norm).collect()
}

/// Two feature sets related by `model`: `inliers` features of `a` reappear
/// at their mapped location in `b` with identical descriptors, and
/// `outliers` further features reappear at least 200 px away from where
/// `model` puts them.
pub fn synthetic_feature_pair(
    model: &AffineModel2D,
    inliers: usize,
    outliers: usize,
    seed: u64,
) -> (Vec<Feature>, Vec<Feature>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut a = Vec::new();
    let mut b = Vec::new();
    for i in 0..inliers + outliers {
        let location = [rng.random_range(0.0..500.0), rng.random_range(0.0..500.0)];
        let descriptor = random_descriptor(&mut rng, 16);
        let mut mapped = model.apply(location);
        if i >= inliers {
            mapped[0] += rng.random_range(200.0..400.0);
            mapped[1] -= rng.random_range(200.0..400.0);
        }
        a.push(Feature {
            location,
            scale: 1.6,
            orientation: 0.0,
            descriptor: descriptor.clone(),
        });
        b.push(Feature {
            location: mapped,
            scale: 1.6,
            orientation: 0.0,
            descriptor,
        });
    }
    (a, b)
}

/// `n` exact correspondences `l -> model(l)` over a 1000 x 1000 square.
pub fn synthetic_matches(model: &AffineModel2D, n: usize, seed: u64) -> Vec<PointMatch> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let l = [rng.random_range(0.0..1000.0), rng.random_range(0.0..1000.0)];
            PointMatch::new(Point::new(l), Point::new(model.apply(l)))
        })
        .collect()
}

/// Rotation by `angle` followed by a translation.
pub fn rigid(angle: f64, tx: f64, ty: f64) -> AffineModel2D {
    let (s, c) = angle.sin_cos();
    AffineModel2D::new(c, -s, tx, s, c, ty)
}
