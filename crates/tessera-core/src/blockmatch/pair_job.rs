//! One block-matching job per overlapping tile pair.

use tracing::debug;

use crate::align::{Tile, TileGraph};
use crate::error::Result;
use crate::model::{local_smoothness_filter, AffineModel2D, Point, PointMatch};
use crate::parallel::{CancellationToken, TaskFactory};
use crate::raster::{FlatRaster, Rect};
use crate::transform::CoordinateTransform;

use super::correlation::match_by_maximal_pmcc;
use super::render::TileRenderer;
use super::BlockMatchParams;

/// Two tiles and the model relating their world placements at submission
/// time. `model` maps world positions as placed by `a` onto world positions
/// as placed by `b`; after optimization it is the identity.
#[derive(Clone, Debug, PartialEq)]
pub struct TilePair {
    pub a: usize,
    pub b: usize,
    pub model: AffineModel2D,
}

impl TilePair {
    pub fn new(a: usize, b: usize) -> Self {
        Self {
            a,
            b,
            model: AffineModel2D::identity(),
        }
    }
}

/// Output of one job. Locations are in world space.
#[derive(Clone, Debug)]
pub struct BlockMatchResults {
    /// Block centres on `a` that were searched in `b`.
    pub v1: Vec<[f64; 2]>,
    /// Block centres on `b` that were searched in `a`.
    pub v2: Vec<[f64; 2]>,
    /// Matches from `a` into `b`; empty when `a` is fixed.
    pub pm12: Vec<PointMatch>,
    /// Matches from `b` into `a`; empty when `b` is fixed.
    pub pm21: Vec<PointMatch>,
    pub a_fixed: bool,
    pub b_fixed: bool,
    pub pair: TilePair,
}

/// Task factory running block matching for [`TilePair`]s of a graph.
pub struct BlockMatchJob<'a, R: TileRenderer + ?Sized> {
    graph: &'a TileGraph,
    renderer: &'a R,
    params: &'a BlockMatchParams,
    cancel: &'a CancellationToken,
}

impl<'a, R: TileRenderer + ?Sized> BlockMatchJob<'a, R> {
    pub fn new(
        graph: &'a TileGraph,
        renderer: &'a R,
        params: &'a BlockMatchParams,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            graph,
            renderer,
            params,
            cancel,
        }
    }

    /// Match both directions of `pair`.
    ///
    /// Cancellation is checked after each directional pass and turns the
    /// whole job into `Interrupted`.
    pub fn run(&self, pair: TilePair) -> Result<BlockMatchResults> {
        self.params.validate()?;
        let ta = self.graph.tile(pair.a);
        let tb = self.graph.tile(pair.b);
        let overlap = ta.world_rect().intersection(&tb.world_rect());
        let mut results = BlockMatchResults {
            v1: Vec::new(),
            v2: Vec::new(),
            pm12: Vec::new(),
            pm21: Vec::new(),
            a_fixed: ta.fixed,
            b_fixed: tb.fixed,
            pair,
        };
        if overlap.is_empty() {
            return Ok(results);
        }

        let scale = self.params.layer_scale;
        let margin = self.params.search_radius.ceil() as i64;
        let roi = Rect::new(
            overlap.x - margin,
            overlap.y - margin,
            overlap.width + 2 * margin,
            overlap.height + 2 * margin,
        );
        results.v1 = grid_points(ta, self.params.mesh_resolution, &overlap);
        results.v2 = grid_points(tb, self.params.mesh_resolution, &overlap);

        let ra = self.renderer.render(&[results.pair.a], roi, scale)?;
        let rb = self.renderer.render(&[results.pair.b], roi, scale)?;

        // World to working-scale pixels of the region of interest.
        let to_px = AffineModel2D::new(
            scale,
            0.0,
            -roi.x as f64 * scale,
            0.0,
            scale,
            -roi.y as f64 * scale,
        );
        let from_px = to_px.create_inverse()?;
        let mut forward = to_px;
        forward.concatenate(&results.pair.model);
        forward.concatenate(&from_px);
        let backward = forward.create_inverse()?;

        let pair_ids = (results.pair.a, results.pair.b);
        if !results.a_fixed {
            results.pm12 =
                self.match_direction(&ra, &rb, &results.v1, &forward, (&to_px, &from_px));
            debug!(pair = ?pair_ids, matches = results.pm12.len(), "block matched a into b");
        }
        self.cancel.check("Block matching")?;

        if !results.b_fixed {
            results.pm21 =
                self.match_direction(&rb, &ra, &results.v2, &backward, (&to_px, &from_px));
            debug!(pair = ?pair_ids, matches = results.pm21.len(), "block matched b into a");
        }
        self.cancel.check("Block matching")?;

        Ok(results)
    }

    fn match_direction(
        &self,
        source: &FlatRaster,
        target: &FlatRaster,
        points: &[[f64; 2]],
        predict: &AffineModel2D,
        (to_px, from_px): (&AffineModel2D, &AffineModel2D),
    ) -> Vec<PointMatch> {
        let scale = self.params.layer_scale;
        let px: Vec<[f64; 2]> = points.iter().map(|&p| to_px.apply(p)).collect();
        let mut matches =
            match_by_maximal_pmcc(source, target, &px, predict, &self.params.pmcc_params(scale));
        let candidates = matches.len();
        if self.params.use_local_smoothness_filter && !matches.is_empty() {
            matches = local_smoothness_filter(&matches, &self.params.smoothness_params(scale));
        }
        debug!(candidates, filtered = matches.len(), "block match direction");
        matches
            .into_iter()
            .map(|m| {
                PointMatch::weighted(
                    Point::new(from_px.apply(m.p1.l)),
                    Point::new(from_px.apply(m.p2.l)),
                    m.weight,
                )
            })
            .collect()
    }
}

impl<R: TileRenderer + ?Sized> TaskFactory<TilePair, Result<BlockMatchResults>>
    for BlockMatchJob<'_, R>
{
    fn process(&self, pair: TilePair) -> Result<BlockMatchResults> {
        self.run(pair)
    }
}

/// World positions of a regular grid over `tile` that fall inside `region`.
fn grid_points(tile: &Tile, resolution: usize, region: &Rect) -> Vec<[f64; 2]> {
    let n = resolution.max(2);
    let spacing = tile.width / (n - 1) as f64;
    if !(spacing > 0.0) {
        return Vec::new();
    }
    let rows = (tile.height / spacing).floor() as usize + 1;
    let (x0, y0) = (region.x as f64, region.y as f64);
    let (x1, y1) = (x0 + region.width as f64, y0 + region.height as f64);
    let mut points = Vec::new();
    for r in 0..rows {
        for c in 0..n {
            let w = tile.model.apply([c as f64 * spacing, r as f64 * spacing]);
            if w[0] >= x0 && w[0] <= x1 && w[1] >= y0 && w[1] <= y1 {
                points.push(w);
            }
        }
    }
    points
}
