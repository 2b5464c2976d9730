//! Flattening tile sets into gray + alpha rasters.

use tracing::{debug, warn};

use crate::align::TileGraph;
use crate::blockmatch::positive;
use crate::consts::{DIRECT_RENDER_BYTES, MAX_RASTER_PIXELS};
use crate::error::{Result, TesseraError};
use crate::filters::gaussian_blur::gaussian_downsample;
use crate::model::AffineModel2D;
use crate::raster::{FlatRaster, Raster, Rect};
use crate::transform::mapping::map_into;
use crate::transform::{Transform, TransformChain, TransformMesh};

/// Bytes per pixel of a full-resolution composite.
const BYTES_PER_PIXEL: f64 = 4.0;

/// Source of flattened rasters for block matching.
pub trait TileRenderer: Sync {
    /// Composite `tiles` over the world rectangle `roi` at `scale`. Output
    /// pixel `(row, col)` covers world location `roi.origin + (col, row) / scale`.
    fn render(&self, tiles: &[usize], roi: Rect, scale: f64) -> Result<FlatRaster>;

    /// Number of pre-downsampled levels available beyond full resolution.
    fn pyramid_levels(&self) -> usize {
        0
    }
}

/// How a request is rendered before the final downsampling to its scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RenderPlan {
    /// Render from full-resolution sources at `render_scale`.
    Direct { render_scale: f64 },
    /// Render from pyramid `level` (sources reduced by `2^level`).
    Pyramid { level: usize, render_scale: f64 },
    /// Render from full-resolution sources at the largest scale that fits.
    Downsampled { render_scale: f64 },
}

impl RenderPlan {
    pub fn render_scale(&self) -> f64 {
        match *self {
            Self::Direct { render_scale }
            | Self::Pyramid { render_scale, .. }
            | Self::Downsampled { render_scale } => render_scale,
        }
    }

    pub fn level(&self) -> usize {
        match *self {
            Self::Pyramid { level, .. } => level,
            _ => 0,
        }
    }
}

/// Choose the cheapest way to render `roi` at `scale`.
///
/// Small requests are rendered supersampled from full resolution. Larger
/// ones use the pyramid level just above `scale` when there is one, and
/// otherwise the largest render scale whose raster stays within the direct
/// render budget. A final raster beyond the pixel ceiling and a scale that
/// is not positive are errors.
pub fn plan_render(roi: Rect, scale: f64, pyramid_levels: usize) -> Result<RenderPlan> {
    positive("scale", scale)?;
    let w = roi.width.max(0) as f64;
    let h = roi.height.max(0) as f64;
    let out_w = (w * scale).ceil();
    let out_h = (h * scale).ceil();
    if out_w * out_h > MAX_RASTER_PIXELS {
        return Err(TesseraError::RasterTooLarge {
            width: out_w as u64,
            height: out_h as u64,
        });
    }

    let plan = if scale >= 1.0 {
        RenderPlan::Direct {
            render_scale: scale,
        }
    } else if w * h * BYTES_PER_PIXEL < DIRECT_RENDER_BYTES {
        RenderPlan::Direct { render_scale: 1.0 }
    } else if pyramid_levels > 0 {
        let level = ((1.0 / scale).log2().floor() as usize).min(pyramid_levels);
        RenderPlan::Pyramid {
            level,
            render_scale: 0.5f64.powi(level as i32),
        }
    } else {
        let budget = DIRECT_RENDER_BYTES / BYTES_PER_PIXEL;
        let fits = (budget / (w * h).max(1.0)).sqrt().min(1.0);
        let render_scale = (fits - (1.0 / w.max(1.0)).max(1.0 / h.max(1.0))).max(scale);
        if scale > fits {
            warn!(
                scale,
                width = roi.width,
                height = roi.height,
                "Rendering above the direct render budget"
            );
        }
        RenderPlan::Downsampled { render_scale }
    };
    debug!(?plan, width = roi.width, height = roi.height, scale, "render strategy");
    Ok(plan)
}

struct RenderTile {
    transform: Transform,
    levels: Vec<Raster>,
}

/// Renders tiles through their transform meshes.
pub struct MosaicRenderer {
    tiles: Vec<RenderTile>,
    mesh_resolution: usize,
}

impl MosaicRenderer {
    /// One tile per raster, each placed by the matching transform.
    pub fn new(
        rasters: &[Raster],
        transforms: Vec<Transform>,
        mesh_resolution: usize,
    ) -> Result<Self> {
        if rasters.len() != transforms.len() {
            return Err(TesseraError::Pipeline(format!(
                "{} rasters but {} transforms",
                rasters.len(),
                transforms.len()
            )));
        }
        let tiles = rasters
            .iter()
            .zip(transforms)
            .map(|(raster, transform)| RenderTile {
                transform,
                levels: vec![raster.clone()],
            })
            .collect();
        Ok(Self {
            tiles,
            mesh_resolution: mesh_resolution.max(2),
        })
    }

    /// Tiles placed by the current models of `graph`.
    pub fn from_graph(
        graph: &TileGraph,
        rasters: &[Raster],
        mesh_resolution: usize,
    ) -> Result<Self> {
        let transforms = graph
            .tiles()
            .iter()
            .map(|t| Transform::Affine(t.model))
            .collect();
        Self::new(rasters, transforms, mesh_resolution)
    }

    /// Precompute `levels` successive 2x reductions of every tile.
    pub fn with_pyramid(mut self, levels: usize) -> Self {
        for tile in &mut self.tiles {
            while tile.levels.len() <= levels {
                let Some(last) = tile.levels.last() else {
                    break;
                };
                if last.width() < 2 || last.height() < 2 {
                    break;
                }
                let next = reduce(last);
                tile.levels.push(next);
            }
        }
        self
    }

    pub fn num_tiles(&self) -> usize {
        self.tiles.len()
    }

    /// Composite `tiles` in order, later tiles covering earlier ones.
    pub fn render_at(
        &self,
        tiles: &[usize],
        roi: Rect,
        render_scale: f64,
        level: usize,
    ) -> Result<FlatRaster> {
        positive("render_scale", render_scale)?;
        let out_w = (roi.width.max(0) as f64 * render_scale).ceil() as usize;
        let out_h = (roi.height.max(0) as f64 * render_scale).ceil() as usize;
        let mut out = FlatRaster::zeros(out_w, out_h);
        let origin = [roi.x as f64, roi.y as f64];

        for &index in tiles {
            let tile = self.tiles.get(index).ok_or_else(|| {
                TesseraError::Pipeline(format!("tile {index} is not known to the renderer"))
            })?;
            let level = level.min(tile.levels.len() - 1);
            let source = &tile.levels[level];
            if source.width() == 0 || source.height() == 0 {
                continue;
            }
            let factor = (1u64 << level) as f64;
            let mut chain = TransformChain::new();
            chain.push(Transform::Affine(AffineModel2D::new(
                factor, 0.0, 0.0, 0.0, factor, 0.0,
            )));
            chain.push(tile.transform.clone());
            let mesh = TransformMesh::new(
                &chain,
                self.mesh_resolution,
                source.width() as f64,
                source.height() as f64,
            )?;
            map_into(&mesh, source, &mut out, origin, render_scale);
        }
        Ok(out)
    }
}

fn reduce(raster: &Raster) -> Raster {
    let flat = FlatRaster {
        image: raster.data.clone(),
        alpha: match &raster.alpha {
            Some(a) => a.clone(),
            None => ndarray::Array2::ones(raster.data.dim()),
        },
    };
    let small = gaussian_downsample(&flat, 2.0);
    Raster {
        data: small.image,
        alpha: Some(small.alpha),
    }
}

impl TileRenderer for MosaicRenderer {
    fn render(&self, tiles: &[usize], roi: Rect, scale: f64) -> Result<FlatRaster> {
        let plan = plan_render(roi, scale, self.pyramid_levels())?;
        let rendered = self.render_at(tiles, roi, plan.render_scale(), plan.level())?;
        let factor = plan.render_scale() / scale;
        if factor > 1.0 {
            Ok(gaussian_downsample(&rendered, factor))
        } else {
            Ok(rendered)
        }
    }

    fn pyramid_levels(&self) -> usize {
        self.tiles
            .iter()
            .map(|t| t.levels.len() - 1)
            .min()
            .unwrap_or(0)
    }
}
