//! Scale and rotation invariant local features.
//!
//! The default extractor builds a difference-of-Gaussian scale space per
//! octave, keeps contrast-stable extrema that are not on edges, assigns each
//! one its dominant gradient orientation and describes it by a rotated grid
//! of gradient orientation histograms.

use std::f64::consts::{PI, TAU};

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::filters::gaussian_blur::{downsample_array, gaussian_blur_array};
use crate::raster::{bilinear_sample, Raster};

/// Blur assumed to be present in the input image.
const INPUT_SIGMA: f64 = 0.5;

/// Largest accepted ratio of principal curvatures of an extremum.
const EDGE_RATIO: f64 = 10.0;

/// Number of bins of the orientation histogram.
const ORIENTATION_BINS: usize = 36;

/// Descriptor entries are clamped to this value before renormalization.
const DESCRIPTOR_CLAMP: f32 = 0.2;

/// Samples per descriptor cell along each axis.
const SAMPLES_PER_CELL: usize = 4;

/// Tiles pixels with an alpha below this are not used as feature locations.
const MIN_FEATURE_ALPHA: f32 = 0.5;

/// Parameters of the difference-of-Gaussian extractor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureParams {
    /// Blur of the first level of every octave (default: 1.6).
    pub initial_sigma: f64,
    /// Scale steps per octave (default: 3).
    pub steps: usize,
    /// Octaves whose shorter side drops below this are skipped (default: 64).
    pub min_octave_size: usize,
    /// Tiles are downscaled until their longer side fits (default: 1024).
    pub max_octave_size: usize,
    /// Descriptor cells per axis (default: 8).
    pub fd_size: usize,
    /// Orientation bins per descriptor cell (default: 8).
    pub fd_bins: usize,
    /// Minimum absolute difference-of-Gaussian response (default: 0.01).
    pub contrast_threshold: f64,
}

impl Default for FeatureParams {
    fn default() -> Self {
        Self {
            initial_sigma: 1.6,
            steps: 3,
            min_octave_size: 64,
            max_octave_size: 1024,
            fd_size: 8,
            fd_bins: 8,
            contrast_threshold: 0.01,
        }
    }
}

/// A located, oriented and described image feature in tile-local pixels.
#[derive(Clone, Debug)]
pub struct Feature {
    pub location: [f64; 2],
    pub scale: f64,
    pub orientation: f64,
    pub descriptor: Vec<f32>,
}

impl Feature {
    /// Squared Euclidean distance between two descriptors.
    pub fn descriptor_distance(&self, other: &Feature) -> f32 {
        self.descriptor
            .iter()
            .zip(&other.descriptor)
            .map(|(a, b)| (a - b) * (a - b))
            .sum()
    }
}

/// Anything that turns a tile raster into features.
pub trait FeatureExtractor: Send + Sync {
    fn extract(&self, raster: &Raster) -> Vec<Feature>;
}

/// Difference-of-Gaussian extractor with histogram descriptors.
#[derive(Clone, Debug, Default)]
pub struct DogExtractor {
    params: FeatureParams,
}

impl DogExtractor {
    pub fn new(params: FeatureParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &FeatureParams {
        &self.params
    }
}

impl FeatureExtractor for DogExtractor {
    fn extract(&self, raster: &Raster) -> Vec<Feature> {
        let p = &self.params;
        let steps = p.steps.max(1);
        let longest = raster.width().max(raster.height()) as f64;
        let fit = if longest > p.max_octave_size as f64 && p.max_octave_size > 0 {
            longest / p.max_octave_size as f64
        } else {
            1.0
        };

        let mut base = downsample_array(&raster.data, fit);
        let presmooth = (p.initial_sigma * p.initial_sigma - INPUT_SIGMA * INPUT_SIGMA)
            .max(0.0)
            .sqrt();
        base = gaussian_blur_array(&base, presmooth as f32);

        let sigmas: Vec<f64> = (0..steps + 3)
            .map(|k| p.initial_sigma * 2f64.powf(k as f64 / steps as f64))
            .collect();

        let mut features = Vec::new();
        let mut octave_scale = fit;
        loop {
            let (h, w) = base.dim();
            if h.min(w) < p.min_octave_size.max(8) {
                break;
            }

            let mut levels = Vec::with_capacity(sigmas.len());
            levels.push(base);
            for k in 1..sigmas.len() {
                let increment = (sigmas[k] * sigmas[k] - sigmas[k - 1] * sigmas[k - 1]).sqrt();
                let next = gaussian_blur_array(&levels[k - 1], increment as f32);
                levels.push(next);
            }
            let dogs: Vec<Array2<f32>> = levels.windows(2).map(|l| &l[1] - &l[0]).collect();

            for k in 1..=steps {
                for (row, col) in extrema(&dogs, k, p.contrast_threshold as f32) {
                    let location = [col as f64 * octave_scale, row as f64 * octave_scale];
                    if !opaque_at(raster, location) {
                        continue;
                    }
                    let level = &levels[k];
                    let sigma = sigmas[k];
                    let orientation = dominant_orientation(level, row, col, sigma);
                    let descriptor =
                        describe(level, row, col, sigma, orientation, p.fd_size, p.fd_bins);
                    features.push(Feature {
                        location,
                        scale: sigma * octave_scale,
                        orientation,
                        descriptor,
                    });
                }
            }

            let next = &levels[steps];
            base = Array2::from_shape_fn((h / 2, w / 2), |(r, c)| next[[2 * r, 2 * c]]);
            octave_scale *= 2.0;
        }
        features
    }
}

fn opaque_at(raster: &Raster, location: [f64; 2]) -> bool {
    let col = location[0].round() as usize;
    let row = location[1].round() as usize;
    row < raster.height() && col < raster.width() && raster.alpha_at(row, col) >= MIN_FEATURE_ALPHA
}

/// Pixels of `dogs[k]` that are strict extrema among their 26 scale-space
/// neighbours, stronger than `threshold` and not lying on an edge.
fn extrema(dogs: &[Array2<f32>], k: usize, threshold: f32) -> Vec<(usize, usize)> {
    let d = &dogs[k];
    let (h, w) = d.dim();
    let mut found = Vec::new();
    for row in 1..h.saturating_sub(1) {
        for col in 1..w.saturating_sub(1) {
            let v = d[[row, col]];
            if v.abs() < threshold {
                continue;
            }
            let is_max = v > 0.0;
            let mut extremal = true;
            'search: for layer in &dogs[k - 1..=k + 1] {
                for r in row - 1..=row + 1 {
                    for c in col - 1..=col + 1 {
                        if std::ptr::eq(layer, d) && r == row && c == col {
                            continue;
                        }
                        let n = layer[[r, c]];
                        if (is_max && n >= v) || (!is_max && n <= v) {
                            extremal = false;
                            break 'search;
                        }
                    }
                }
            }
            if extremal && !on_edge(d, row, col) {
                found.push((row, col));
            }
        }
    }
    found
}

fn on_edge(d: &Array2<f32>, row: usize, col: usize) -> bool {
    let v = d[[row, col]] as f64;
    let dxx = d[[row, col + 1]] as f64 + d[[row, col - 1]] as f64 - 2.0 * v;
    let dyy = d[[row + 1, col]] as f64 + d[[row - 1, col]] as f64 - 2.0 * v;
    let dxy = 0.25
        * (d[[row + 1, col + 1]] as f64 - d[[row + 1, col - 1]] as f64
            - d[[row - 1, col + 1]] as f64
            + d[[row - 1, col - 1]] as f64);
    let trace = dxx + dyy;
    let det = dxx * dyy - dxy * dxy;
    det <= 0.0 || trace * trace / det >= (EDGE_RATIO + 1.0).powi(2) / EDGE_RATIO
}

fn gradient(level: &Array2<f32>, y: f64, x: f64) -> (f64, f64) {
    let gx = bilinear_sample(level, y, x + 1.0) - bilinear_sample(level, y, x - 1.0);
    let gy = bilinear_sample(level, y + 1.0, x) - bilinear_sample(level, y - 1.0, x);
    (0.5 * gx as f64, 0.5 * gy as f64)
}

fn dominant_orientation(level: &Array2<f32>, row: usize, col: usize, sigma: f64) -> f64 {
    let window = 1.5 * sigma;
    let radius = (3.0 * window).ceil() as i64;
    let s2 = 2.0 * window * window;
    let mut histogram = [0.0f64; ORIENTATION_BINS];

    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let (gx, gy) = gradient(level, (row as i64 + dy) as f64, (col as i64 + dx) as f64);
            let magnitude = (gx * gx + gy * gy).sqrt();
            if magnitude == 0.0 {
                continue;
            }
            let weight = (-((dx * dx + dy * dy) as f64) / s2).exp();
            let angle = gy.atan2(gx).rem_euclid(TAU);
            let bin = ((angle / TAU * ORIENTATION_BINS as f64) as usize) % ORIENTATION_BINS;
            histogram[bin] += magnitude * weight;
        }
    }

    let (peak, _) = histogram
        .iter()
        .enumerate()
        .fold((0, f64::MIN), |best, (i, &v)| if v > best.1 { (i, v) } else { best });
    let prev = histogram[(peak + ORIENTATION_BINS - 1) % ORIENTATION_BINS];
    let next = histogram[(peak + 1) % ORIENTATION_BINS];
    let curr = histogram[peak];
    let denom = prev - 2.0 * curr + next;
    let offset = if denom.abs() > 1e-12 {
        ((prev - next) / (2.0 * denom)).clamp(-0.5, 0.5)
    } else {
        0.0
    };
    let bin_width = TAU / ORIENTATION_BINS as f64;
    let angle = (peak as f64 + 0.5 + offset) * bin_width;
    if angle > PI {
        angle - TAU
    } else {
        angle
    }
}

/// Grid of `fd_size` x `fd_size` orientation histograms sampled in the
/// feature's rotated frame, normalized, clamped and renormalized.
fn describe(
    level: &Array2<f32>,
    row: usize,
    col: usize,
    sigma: f64,
    orientation: f64,
    fd_size: usize,
    fd_bins: usize,
) -> Vec<f32> {
    let fd_size = fd_size.max(1);
    let fd_bins = fd_bins.max(1);
    let samples = fd_size * SAMPLES_PER_CELL;
    let spacing = sigma / SAMPLES_PER_CELL as f64 * 3.0 / 2.0;
    let half = samples as f64 / 2.0;
    let s2 = 2.0 * half * half;
    let (sin, cos) = orientation.sin_cos();

    let mut descriptor = vec![0.0f32; fd_size * fd_size * fd_bins];
    for v in 0..samples {
        for u in 0..samples {
            let su = u as f64 + 0.5 - half;
            let sv = v as f64 + 0.5 - half;
            let x = col as f64 + (cos * su - sin * sv) * spacing;
            let y = row as f64 + (sin * su + cos * sv) * spacing;
            let (gx, gy) = gradient(level, y, x);
            let magnitude = (gx * gx + gy * gy).sqrt();
            if magnitude == 0.0 {
                continue;
            }
            let weight = (-(su * su + sv * sv) / s2).exp();
            let angle = (gy.atan2(gx) - orientation).rem_euclid(TAU);
            let bin = ((angle / TAU * fd_bins as f64) as usize) % fd_bins;
            let cell = (v / SAMPLES_PER_CELL) * fd_size + u / SAMPLES_PER_CELL;
            descriptor[cell * fd_bins + bin] += (magnitude * weight) as f32;
        }
    }

    normalize(&mut descriptor);
    for d in &mut descriptor {
        *d = d.min(DESCRIPTOR_CLAMP);
    }
    normalize(&mut descriptor);
    descriptor
}

fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v {
            *x /= norm;
        }
    }
}
