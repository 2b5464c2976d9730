//! Tiles and the spring graph connecting them.

use std::collections::{BTreeMap, VecDeque};

use crate::model::{AffineModel2D, PointMatch};
use crate::raster::{BoundingBox, Rect};
use crate::transform::CoordinateTransform;

/// One source image: its size, current placement and connections.
///
/// Connection matches are stored from this tile's point of view: `p1` lies
/// on this tile, `p2` on the neighbour.
#[derive(Clone, Debug)]
pub struct Tile {
    pub width: f64,
    pub height: f64,
    pub model: AffineModel2D,
    pub fixed: bool,
    connections: BTreeMap<usize, Vec<PointMatch>>,
    virtual_connections: BTreeMap<usize, Vec<PointMatch>>,
}

impl Tile {
    pub fn new(width: f64, height: f64, model: AffineModel2D) -> Self {
        Self {
            width,
            height,
            model,
            fixed: false,
            connections: BTreeMap::new(),
            virtual_connections: BTreeMap::new(),
        }
    }

    /// Neighbours with their matches, in ascending neighbour order.
    pub fn connections(&self) -> impl Iterator<Item = (usize, &[PointMatch])> {
        self.connections.iter().map(|(&k, v)| (k, v.as_slice()))
    }

    pub fn virtual_connections(&self) -> impl Iterator<Item = (usize, &[PointMatch])> {
        self.virtual_connections.iter().map(|(&k, v)| (k, v.as_slice()))
    }

    pub fn num_connections(&self) -> usize {
        self.connections.len()
    }

    pub fn matches_with(&self, other: usize) -> Option<&[PointMatch]> {
        self.connections.get(&other).map(Vec::as_slice)
    }

    /// World-space bounding box of the tile rectangle under its model.
    pub fn world_bounds(&self) -> BoundingBox {
        let mut bb = BoundingBox::default();
        for corner in [
            [0.0, 0.0],
            [self.width, 0.0],
            [0.0, self.height],
            [self.width, self.height],
        ] {
            let w = self.model.apply(corner);
            bb.include(w[0], w[1]);
        }
        bb
    }

    pub fn world_rect(&self) -> Rect {
        self.world_bounds().to_rect()
    }
}

/// Arena of tiles addressed by index.
#[derive(Clone, Debug, Default)]
pub struct TileGraph {
    tiles: Vec<Tile>,
}

impl TileGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tile(&mut self, tile: Tile) -> usize {
        self.tiles.push(tile);
        self.tiles.len() - 1
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn tile(&self, index: usize) -> &Tile {
        &self.tiles[index]
    }

    pub fn tile_mut(&mut self, index: usize) -> &mut Tile {
        &mut self.tiles[index]
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    /// Connect `a` and `b` by `matches` (with `p1` on `a`), replacing any
    /// earlier connection between them and clearing their virtual matches.
    pub fn connect(&mut self, a: usize, b: usize, matches: Vec<PointMatch>) {
        let flipped: Vec<PointMatch> = matches.iter().map(PointMatch::flip).collect();
        self.tiles[a].connections.insert(b, matches);
        self.tiles[b].connections.insert(a, flipped);
        self.clear_virtual_matches(a, b);
    }

    /// Record provisional matches between `a` and `b`. They do not take part
    /// in optimization.
    pub fn connect_virtual(&mut self, a: usize, b: usize, matches: Vec<PointMatch>) {
        let flipped: Vec<PointMatch> = matches.iter().map(PointMatch::flip).collect();
        self.tiles[a].virtual_connections.insert(b, matches);
        self.tiles[b].virtual_connections.insert(a, flipped);
    }

    pub fn clear_virtual_matches(&mut self, a: usize, b: usize) {
        self.tiles[a].virtual_connections.remove(&b);
        self.tiles[b].virtual_connections.remove(&a);
    }

    pub fn disconnect(&mut self, a: usize, b: usize) {
        self.tiles[a].connections.remove(&b);
        self.tiles[b].connections.remove(&a);
    }

    /// Remove every connection of `index` on both ends.
    pub fn isolate(&mut self, index: usize) {
        let neighbours: Vec<usize> = self.tiles[index].connections.keys().copied().collect();
        for n in neighbours {
            self.disconnect(index, n);
        }
    }

    /// Connected components, each listed in breadth-first order from its
    /// lowest tile index. Components are ordered by their lowest index.
    pub fn connected_components(&self) -> Vec<Vec<usize>> {
        let mut seen = vec![false; self.tiles.len()];
        let mut components = Vec::new();
        for start in 0..self.tiles.len() {
            if seen[start] {
                continue;
            }
            seen[start] = true;
            let mut component = Vec::new();
            let mut queue = VecDeque::from([start]);
            while let Some(i) = queue.pop_front() {
                component.push(i);
                for &n in self.tiles[i].connections.keys() {
                    if !seen[n] {
                        seen[n] = true;
                        queue.push_back(n);
                    }
                }
            }
            components.push(component);
        }
        components
    }

    /// Pairs `(a, b)` with `a < b` whose world bounding boxes intersect.
    pub fn overlapping_pairs(&self) -> Vec<(usize, usize)> {
        let rects: Vec<Rect> = self.tiles.iter().map(Tile::world_rect).collect();
        let mut pairs = Vec::new();
        for a in 0..rects.len() {
            for b in a + 1..rects.len() {
                if rects[a].intersects(&rects[b]) {
                    pairs.push((a, b));
                }
            }
        }
        pairs
    }

    /// Bounding box of every tile in world space.
    pub fn world_bounds(&self) -> BoundingBox {
        let mut bb = BoundingBox::default();
        for tile in &self.tiles {
            let t = tile.world_bounds();
            bb.include(t.min_x, t.min_y);
            bb.include(t.max_x, t.max_y);
        }
        bb
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Point;

    fn square(x: f64, y: f64) -> Tile {
        Tile::new(100.0, 100.0, AffineModel2D::translation(x, y))
    }

    #[test]
    fn test_connect_clears_virtual_matches() {
        let mut graph = TileGraph::new();
        let a = graph.add_tile(square(0.0, 0.0));
        let b = graph.add_tile(square(90.0, 0.0));
        let m = PointMatch::new(Point::new([95.0, 10.0]), Point::new([5.0, 10.0]));
        graph.connect_virtual(a, b, vec![m]);
        assert_eq!(graph.tile(b).virtual_connections().count(), 1);

        graph.connect(a, b, vec![m]);
        assert_eq!(graph.tile(a).virtual_connections().count(), 0);
        assert_eq!(graph.tile(b).virtual_connections().count(), 0);
        assert_eq!(graph.tile(b).matches_with(a).map(|m| m[0].p1.l), Some([5.0, 10.0]));
    }

    #[test]
    fn test_components_and_overlaps() {
        let mut graph = TileGraph::new();
        for x in [0.0, 90.0, 500.0] {
            graph.add_tile(square(x, 0.0));
        }
        assert_eq!(graph.overlapping_pairs(), vec![(0, 1)]);
        graph.connect(0, 1, Vec::new());
        assert_eq!(graph.connected_components(), vec![vec![0, 1], vec![2]]);
        graph.isolate(1);
        assert_eq!(graph.connected_components().len(), 3);
    }
}
