use ndarray::{Array2, Zip};

use crate::raster::{bilinear_sample, FlatRaster, Raster};

use super::mesh::{contains, TransformMesh};
use super::CoordinateTransform;

/// Alpha of a raster at fractional coordinates. Rasters without a mask are
/// opaque over their pixel extent and transparent outside it.
pub fn sample_alpha(raster: &Raster, y: f64, x: f64) -> f32 {
    match &raster.alpha {
        Some(alpha) => bilinear_sample(alpha, y, x),
        None => {
            let inside = y >= -0.5
                && x >= -0.5
                && y <= raster.height() as f64 - 0.5
                && x <= raster.width() as f64 - 0.5;
            if inside {
                1.0
            } else {
                0.0
            }
        }
    }
}

fn clamped_sample(data: &Array2<f32>, y: f64, x: f64) -> f32 {
    let (h, w) = data.dim();
    bilinear_sample(
        data,
        y.clamp(0.0, (h.max(1) - 1) as f64),
        x.clamp(0.0, (w.max(1) - 1) as f64),
    )
}

/// Render `source` deformed by `mesh` into `target`.
///
/// Target pixel `(row, col)` sits at world location
/// `origin + (col, row) / scale`. Each target triangle is rasterized and
/// sampled through its inverse affine; pixels covered by the tile replace
/// what was there before, weighted by the tile's alpha.
pub fn map_into(
    mesh: &TransformMesh,
    source: &Raster,
    target: &mut FlatRaster,
    origin: [f64; 2],
    scale: f64,
) {
    let bbox = mesh.bounding_box();
    let offset = [bbox.x as f64, bbox.y as f64];

    // Target triangles in output pixel space with their row ranges.
    let triangles: Vec<(usize, [[f64; 2]; 3], f64, f64)> = (0..mesh.num_triangles())
        .filter(|&i| mesh.inverse_affine(i).is_some())
        .map(|i| {
            let t = mesh.target_triangle(i).map(|c| {
                [
                    (c[0] + offset[0] - origin[0]) * scale,
                    (c[1] + offset[1] - origin[1]) * scale,
                ]
            });
            let y_min = t.iter().map(|c| c[1]).fold(f64::INFINITY, f64::min);
            let y_max = t.iter().map(|c| c[1]).fold(f64::NEG_INFINITY, f64::max);
            (i, t, y_min, y_max)
        })
        .collect();

    let width = target.width();
    Zip::indexed(target.image.rows_mut())
        .and(target.alpha.rows_mut())
        .par_for_each(|row, mut image_row, mut alpha_row| {
            let y = row as f64;
            let mut covered = vec![false; width];
            for (i, t, y_min, y_max) in &triangles {
                if y < *y_min || y > *y_max {
                    continue;
                }
                let x_min = t.iter().map(|c| c[0]).fold(f64::INFINITY, f64::min);
                let x_max = t.iter().map(|c| c[0]).fold(f64::NEG_INFINITY, f64::max);
                let c0 = x_min.ceil().max(0.0) as usize;
                let c1 = (x_max.floor().max(-1.0) + 1.0).min(width as f64) as usize;
                for col in c0..c1 {
                    let p = [col as f64, y];
                    if covered[col] || !contains(t, p) {
                        continue;
                    }
                    let Some(inverse) = mesh.inverse_affine(*i) else {
                        continue;
                    };
                    let world = [
                        p[0] / scale + origin[0] - offset[0],
                        p[1] / scale + origin[1] - offset[1],
                    ];
                    let s = inverse.apply(world);
                    covered[col] = true;
                    let a = sample_alpha(source, s[1], s[0]);
                    if a <= 0.0 {
                        continue;
                    }
                    let v = clamped_sample(&source.data, s[1], s[0]);
                    image_row[col] = image_row[col] * (1.0 - a) + v * a;
                    alpha_row[col] = (alpha_row[col] * (1.0 - a) + a).min(1.0);
                }
            }
        });
}

/// Render a tile through its mesh at unit scale into a raster the size of
/// the mesh bounding box.
pub fn map_tile(mesh: &TransformMesh, source: &Raster) -> FlatRaster {
    let bbox = mesh.bounding_box();
    let mut target = FlatRaster::zeros(bbox.width.max(0) as usize, bbox.height.max(0) as usize);
    map_into(
        mesh,
        source,
        &mut target,
        [bbox.x as f64, bbox.y as f64],
        1.0,
    );
    target
}
