//! Block matching by maximal Pearson product-moment correlation.

use ndarray::Array2;
use rayon::prelude::*;

use crate::model::{AffineModel2D, Point, PointMatch};
use crate::raster::FlatRaster;
use crate::transform::CoordinateTransform;

/// Pixels with alpha at or below this do not take part in a correlation.
const MIN_ALPHA: f32 = 0.5;

/// Parameters of one correlation search, in working-scale pixels.
#[derive(Clone, Copy, Debug)]
pub struct PmccParams {
    pub block_radius: usize,
    pub search_radius: usize,
    /// Minimum correlation of an accepted peak.
    pub min_r: f64,
    /// Largest accepted `(1 - r1) / (1 - r2)` of the best two peaks.
    pub rod_r: f64,
    /// Largest accepted ratio of principal curvatures at the peak.
    pub max_curvature_r: f64,
}

/// Opaque pixels of `source` within the block around `(row, col)` as
/// `(dy, dx, value)`.
fn block(source: &FlatRaster, row: i64, col: i64, radius: i64) -> Vec<(i64, i64, f64)> {
    let (h, w) = source.image.dim();
    let mut out = Vec::with_capacity(((2 * radius + 1) * (2 * radius + 1)) as usize);
    for dy in -radius..=radius {
        let r = row + dy;
        if r < 0 || r >= h as i64 {
            continue;
        }
        for dx in -radius..=radius {
            let c = col + dx;
            if c < 0 || c >= w as i64 {
                continue;
            }
            let (r, c) = (r as usize, c as usize);
            if source.alpha[[r, c]] > MIN_ALPHA {
                out.push((dy, dx, source.image[[r, c]] as f64));
            }
        }
    }
    out
}

/// Correlation of `block` against `target` centred at `(row, col)`, or
/// `None` when too few pixels overlap or either side is flat.
fn pmcc(
    block: &[(i64, i64, f64)],
    target: &FlatRaster,
    row: i64,
    col: i64,
    min_pixels: usize,
) -> Option<f64> {
    let (h, w) = target.image.dim();
    let (mut n, mut sa, mut sb, mut saa, mut sbb, mut sab) = (0usize, 0.0, 0.0, 0.0, 0.0, 0.0);
    for &(dy, dx, a) in block {
        let r = row + dy;
        let c = col + dx;
        if r < 0 || c < 0 || r >= h as i64 || c >= w as i64 {
            continue;
        }
        let (r, c) = (r as usize, c as usize);
        if target.alpha[[r, c]] <= MIN_ALPHA {
            continue;
        }
        let b = target.image[[r, c]] as f64;
        n += 1;
        sa += a;
        sb += b;
        saa += a * a;
        sbb += b * b;
        sab += a * b;
    }
    if n < min_pixels.max(2) {
        return None;
    }
    let nf = n as f64;
    let cov = sab - sa * sb / nf;
    let va = saa - sa * sa / nf;
    let vb = sbb - sb * sb / nf;
    if va <= f64::EPSILON || vb <= f64::EPSILON {
        return None;
    }
    Some(cov / (va * vb).sqrt())
}

/// Search one point. Returns the refined target location.
fn search(
    source: &FlatRaster,
    target: &FlatRaster,
    p: [i64; 2],
    q: [i64; 2],
    params: &PmccParams,
) -> Option<[f64; 2]> {
    let b = params.block_radius as i64;
    let s = params.search_radius as i64;
    let full = ((2 * b + 1) * (2 * b + 1)) as usize;
    let pixels = block(source, p[1], p[0], b);
    if pixels.len() < full / 2 {
        return None;
    }

    let size = (2 * s + 1) as usize;
    let mut r = Array2::<f64>::from_elem((size, size), f64::NEG_INFINITY);
    for oy in -s..=s {
        for ox in -s..=s {
            if let Some(v) = pmcc(&pixels, target, q[1] + oy, q[0] + ox, full / 2) {
                r[[(oy + s) as usize, (ox + s) as usize]] = v;
            }
        }
    }

    let ((py, px), r1) = r
        .indexed_iter()
        .fold(((0, 0), f64::NEG_INFINITY), |best, (i, &v)| {
            if v > best.1 {
                (i, v)
            } else {
                best
            }
        });
    if r1 < params.min_r {
        return None;
    }
    if py == 0 || px == 0 || py + 1 == size || px + 1 == size {
        return None;
    }

    let r2 = second_peak(&r, (py, px));
    if r2.is_finite() && r2 < 1.0 && (1.0 - r1) / (1.0 - r2) > params.rod_r {
        return None;
    }

    let at = |dy: isize, dx: isize| r[[(py as isize + dy) as usize, (px as isize + dx) as usize]];
    let finite = (-1..=1).all(|dy| (-1..=1).all(|dx| at(dy, dx).is_finite()));
    if !finite {
        return None;
    }
    let dxx = at(0, 1) + at(0, -1) - 2.0 * r1;
    let dyy = at(1, 0) + at(-1, 0) - 2.0 * r1;
    let dxy = 0.25 * (at(1, 1) - at(1, -1) - at(-1, 1) + at(-1, -1));
    let det = dxx * dyy - dxy * dxy;
    let trace = dxx + dyy;
    let c = params.max_curvature_r;
    if det <= 0.0 || trace * trace / det >= (c + 1.0) * (c + 1.0) / c {
        return None;
    }

    let gx = 0.5 * (at(0, 1) - at(0, -1));
    let gy = 0.5 * (at(1, 0) - at(-1, 0));
    let sub_x = (-(dyy * gx - dxy * gy) / det).clamp(-0.5, 0.5);
    let sub_y = (-(dxx * gy - dxy * gx) / det).clamp(-0.5, 0.5);

    Some([
        (q[0] + px as i64 - s) as f64 + sub_x,
        (q[1] + py as i64 - s) as f64 + sub_y,
    ])
}

/// Highest local maximum of `r` other than `peak`.
fn second_peak(r: &Array2<f64>, peak: (usize, usize)) -> f64 {
    let (h, w) = r.dim();
    let mut best = f64::NEG_INFINITY;
    for y in 1..h.saturating_sub(1) {
        for x in 1..w.saturating_sub(1) {
            if (y, x) == peak {
                continue;
            }
            let v = r[[y, x]];
            if v <= best {
                continue;
            }
            let is_max = (y - 1..=y + 1)
                .all(|yy| (x - 1..=x + 1).all(|xx| (yy, xx) == (y, x) || r[[yy, xx]] < v));
            if is_max {
                best = v;
            }
        }
    }
    best
}

/// For each of `points` in `source` pixels, find the location in `target`
/// around `predict(point)` whose block correlates best.
///
/// Blocks are compared unwarped, so `predict` should be close to a
/// translation at working scale. Points whose peak is too weak, ambiguous,
/// edge-like or on the border of the search window yield no match.
pub fn match_by_maximal_pmcc(
    source: &FlatRaster,
    target: &FlatRaster,
    points: &[[f64; 2]],
    predict: &AffineModel2D,
    params: &PmccParams,
) -> Vec<PointMatch> {
    points
        .par_iter()
        .filter_map(|&point| {
            let p = [point[0].round() as i64, point[1].round() as i64];
            let predicted = predict.apply([p[0] as f64, p[1] as f64]);
            let q = [predicted[0].round() as i64, predicted[1].round() as i64];
            search(source, target, p, q, params).map(|found| {
                PointMatch::new(Point::new([p[0] as f64, p[1] as f64]), Point::new(found))
            })
        })
        .collect()
}
