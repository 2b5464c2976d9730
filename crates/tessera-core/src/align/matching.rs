use std::collections::HashMap;

use rayon::prelude::*;

use crate::model::{Point, PointMatch};

use super::features::Feature;

/// Match two feature sets by the closest/next-closest descriptor distance
/// ratio.
///
/// A feature of `source` is matched to its nearest neighbour in `target` when
/// that neighbour is closer than `rod` times the second nearest. Targets
/// claimed by more than one source feature are ambiguous and every match to
/// them is dropped.
pub fn match_features(source: &[Feature], target: &[Feature], rod: f64) -> Vec<PointMatch> {
    if target.len() < 2 {
        return Vec::new();
    }
    // Descriptor distances are squared.
    let rod2 = (rod * rod) as f32;

    let candidates: Vec<(usize, usize)> = source
        .par_iter()
        .enumerate()
        .filter_map(|(i, f)| {
            let mut best = (usize::MAX, f32::MAX);
            let mut second = f32::MAX;
            for (j, g) in target.iter().enumerate() {
                let d = f.descriptor_distance(g);
                if d < best.1 {
                    second = best.1;
                    best = (j, d);
                } else if d < second {
                    second = d;
                }
            }
            (best.1 < rod2 * second).then_some((i, best.0))
        })
        .collect();

    let mut claims: HashMap<usize, usize> = HashMap::new();
    for &(_, j) in &candidates {
        *claims.entry(j).or_default() += 1;
    }

    candidates
        .into_iter()
        .filter(|(_, j)| claims.get(j) == Some(&1))
        .map(|(i, j)| {
            PointMatch::new(
                Point::new(source[i].location),
                Point::new(target[j].location),
            )
        })
        .collect()
}
