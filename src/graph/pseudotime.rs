//! Geodesic pseudotime for datasets shipped without one.

use crate::graph::adjacency::symmetrize_min;
use crate::utils::error::{LagError, Result};
use nalgebra_sparse::CsrMatrix;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Debug, PartialEq)]
struct Frontier {
    dist: f64,
    node: usize,
}

impl Eq for Frontier {}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        // min-heap on distance
        other
            .dist
            .total_cmp(&self.dist)
            .then_with(|| self.node.cmp(&other.node))
    }
}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Shortest-path distance from `root` over the symmetrized kNN distance
/// graph, scaled to `[0, 1]`. Cells not connected to the root get NaN.
pub fn geodesic_pseudotime(distances: &CsrMatrix<f32>, root: usize) -> Result<Vec<f64>> {
    let n = distances.nrows();
    if root >= n {
        return Err(LagError::InvalidConfigValueError {
            field: "root_cell".to_string(),
            value: root.to_string(),
            reason: format!("dataset has {} cells", n),
        });
    }

    let graph = symmetrize_min(distances)?;
    let mut dist = vec![f64::INFINITY; n];
    let mut heap = BinaryHeap::new();
    dist[root] = 0.0;
    heap.push(Frontier { dist: 0.0, node: root });

    while let Some(Frontier { dist: d, node }) = heap.pop() {
        if d > dist[node] {
            continue;
        }
        let row = graph.row(node);
        for (&next, &w) in row.col_indices().iter().zip(row.values()) {
            let candidate = d + w as f64;
            if candidate < dist[next] {
                dist[next] = candidate;
                heap.push(Frontier {
                    dist: candidate,
                    node: next,
                });
            }
        }
    }

    let max = dist
        .iter()
        .copied()
        .filter(|d| d.is_finite())
        .fold(0.0_f64, f64::max);
    let unreachable = dist.iter().filter(|d| !d.is_finite()).count();
    if unreachable > 0 {
        tracing::warn!(
            "{} of {} cells are not connected to root cell {}; they get no time ordering",
            unreachable,
            n,
            root
        );
    }

    Ok(dist
        .into_iter()
        .map(|d| {
            if !d.is_finite() {
                f64::NAN
            } else if max > 0.0 {
                d / max
            } else {
                0.0
            }
        })
        .collect())
}
