//! Velocity kernel: transition probabilities from RNA velocity and the kNN graph.

use crate::graph::adjacency::{from_triplets, knn_indicator, symmetrize_min};
use crate::utils::error::{LagError, Result};
use nalgebra_sparse::CsrMatrix;
use ndarray::{Array2, ArrayView1};
use rayon::prelude::*;

/// Sharpness of the softmax over cosine correlations.
pub const DEFAULT_SOFTMAX_SCALE: f32 = 10.0;

fn cosine(a: ArrayView1<'_, f32>, b: &[f32]) -> f32 {
    let mut dot = 0.0;
    let mut na = 0.0;
    let mut nb = 0.0;
    for (&x, &y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na.sqrt() * nb.sqrt())
    }
}

/// Row-stochastic transition matrix over kNN neighbours.
///
/// For cell `i` and neighbour `j`, the correlation between `v_i` and the
/// displacement `x_j - x_i` is passed through a softmax with `scale`.
/// Cells with a zero velocity spread uniformly over their neighbours.
pub fn velocity_transition_matrix(
    expression: &Array2<f32>,
    velocity: &Array2<f32>,
    distances: &CsrMatrix<f32>,
    scale: f32,
) -> Result<CsrMatrix<f32>> {
    let n = expression.nrows();
    if velocity.dim() != expression.dim() {
        return Err(LagError::shape(expression.dim(), velocity.dim()));
    }
    if distances.nrows() != n || distances.ncols() != n {
        return Err(LagError::shape((n, n), (distances.nrows(), distances.ncols())));
    }

    let neighbours = symmetrize_min(&knn_indicator(distances)?)?;

    let rows: Vec<Vec<(usize, f32)>> = (0..n)
        .into_par_iter()
        .map(|i| {
            let row = neighbours.row(i);
            let cols = row.col_indices();
            if cols.is_empty() {
                return Vec::new();
            }
            let v = velocity.row(i);
            if v.iter().all(|&x| x == 0.0) {
                let w = 1.0 / cols.len() as f32;
                return cols.iter().map(|&j| (j, w)).collect();
            }

            let x_i = expression.row(i);
            let scores: Vec<f32> = cols
                .iter()
                .map(|&j| {
                    let dx: Vec<f32> = expression
                        .row(j)
                        .iter()
                        .zip(x_i.iter())
                        .map(|(a, b)| a - b)
                        .collect();
                    scale * cosine(v, &dx)
                })
                .collect();
            let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let exp: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
            let total: f32 = exp.iter().sum();
            cols.iter()
                .zip(exp)
                .map(|(&j, e)| (j, e / total))
                .collect()
        })
        .collect();

    from_triplets(
        n,
        n,
        rows.into_iter()
            .enumerate()
            .flat_map(|(i, row)| row.into_iter().map(move |(j, w)| (i, j, w))),
    )
}
