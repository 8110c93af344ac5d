//! Cell-cell adjacency construction: kNN indicator graphs, pseudotime
//! orientation, row normalization and median binarization.

use crate::utils::error::{LagError, Result};
use nalgebra_sparse::{CooMatrix, CsrMatrix};

/// Builds a CSR matrix from `(row, col, value)` triplets. Duplicates are summed.
pub fn from_triplets(
    nrows: usize,
    ncols: usize,
    triplets: impl IntoIterator<Item = (usize, usize, f32)>,
) -> Result<CsrMatrix<f32>> {
    let mut coo = CooMatrix::new(nrows, ncols);
    for (i, j, v) in triplets {
        if i >= nrows || j >= ncols {
            return Err(LagError::shape((nrows, ncols), (i, j)));
        }
        coo.push(i, j, v);
    }
    Ok(CsrMatrix::from(&coo))
}

/// Cast a kNN distance graph to an unweighted 0/1 graph without self loops.
pub fn knn_indicator(distances: &CsrMatrix<f32>) -> Result<CsrMatrix<f32>> {
    let triplets = distances
        .triplet_iter()
        .filter(|&(i, j, &d)| i != j && d != 0.0)
        .map(|(i, j, _)| (i, j, 1.0));
    from_triplets(distances.nrows(), distances.ncols(), triplets)
}

/// Orient kNN edges along pseudotime.
///
/// The graph is symmetrized first, then an edge `i → j` is kept only when
/// `pt[i] < pt[j]`. Ties and NaN pseudotimes yield no edge, so the result
/// is acyclic.
pub fn dag_orient_edges(graph: &CsrMatrix<f32>, pseudotime: &[f64]) -> Result<CsrMatrix<f32>> {
    let n = graph.nrows();
    if graph.ncols() != n {
        return Err(LagError::shape((n, n), (graph.nrows(), graph.ncols())));
    }
    if pseudotime.len() != n {
        return Err(LagError::shape(n, pseudotime.len()));
    }

    let mut edges: Vec<(usize, usize)> = Vec::with_capacity(graph.nnz() * 2);
    for (i, j, &w) in graph.triplet_iter() {
        if i == j || w == 0.0 {
            continue;
        }
        let (a, b) = (pseudotime[i], pseudotime[j]);
        if a < b {
            edges.push((i, j));
        } else if b < a {
            edges.push((j, i));
        }
    }
    edges.sort_unstable();
    edges.dedup();

    from_triplets(n, n, edges.into_iter().map(|(i, j)| (i, j, 1.0)))
}

/// Row-normalize so each row sums to one; empty rows stay empty.
pub fn normalize_adjacency(a: &CsrMatrix<f32>) -> Result<CsrMatrix<f32>> {
    let mut triplets = Vec::with_capacity(a.nnz());
    for (i, row) in a.row_iter().enumerate() {
        let sum: f32 = row.values().iter().sum();
        if sum == 0.0 {
            continue;
        }
        for (&j, &v) in row.col_indices().iter().zip(row.values()) {
            if v != 0.0 {
                triplets.push((i, j, v / sum));
            }
        }
    }
    from_triplets(a.nrows(), a.ncols(), triplets)
}

/// Median of a non-empty slice; the mean of the middle pair for even lengths.
pub fn median(values: &mut [f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Per row, keep the entries at or above the median of that row's positive
/// entries as 1 and drop the rest.
pub fn binarize_by_row_median(a: &CsrMatrix<f32>) -> Result<CsrMatrix<f32>> {
    let mut triplets = Vec::with_capacity(a.nnz());
    for (i, row) in a.row_iter().enumerate() {
        let mut positive: Vec<f32> = row.values().iter().copied().filter(|&v| v > 0.0).collect();
        let Some(m) = median(&mut positive) else {
            continue;
        };
        for (&j, &v) in row.col_indices().iter().zip(row.values()) {
            if v > 0.0 && v >= m {
                triplets.push((i, j, 1.0));
            }
        }
    }
    from_triplets(a.nrows(), a.ncols(), triplets)
}

/// Symmetric version of a graph's sparsity pattern carrying the smaller
/// positive weight of each pair.
pub fn symmetrize_min(a: &CsrMatrix<f32>) -> Result<CsrMatrix<f32>> {
    let n = a.nrows();
    let mut entries: Vec<(usize, usize, f32)> = Vec::with_capacity(a.nnz() * 2);
    for (i, j, &w) in a.triplet_iter() {
        if i == j || w <= 0.0 {
            continue;
        }
        entries.push((i, j, w));
        entries.push((j, i, w));
    }
    entries.sort_by(|x, y| (x.0, x.1).cmp(&(y.0, y.1)).then(x.2.total_cmp(&y.2)));
    entries.dedup_by(|later, earlier| later.0 == earlier.0 && later.1 == earlier.1);
    from_triplets(n, a.ncols(), entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dense(a: &CsrMatrix<f32>) -> Vec<Vec<f32>> {
        let mut out = vec![vec![0.0; a.ncols()]; a.nrows()];
        for (i, j, &v) in a.triplet_iter() {
            out[i][j] = v;
        }
        out
    }

    #[test]
    fn test_knn_indicator_drops_self_loops() {
        let d = from_triplets(3, 3, vec![(0, 0, 0.5), (0, 1, 2.5), (1, 2, 0.1), (2, 0, 0.0)]).unwrap();
        let a = knn_indicator(&d).unwrap();
        assert_eq!(
            dense(&a),
            vec![vec![0.0, 1.0, 0.0], vec![0.0, 0.0, 1.0], vec![0.0, 0.0, 0.0]]
        );
    }

    #[test]
    fn test_dag_orient_edges_follows_pseudotime() {
        // 0 - 1 - 2 chain stored in one direction only, pseudotime reversed for the pair (1, 2).
        let g = from_triplets(3, 3, vec![(0, 1, 1.0), (2, 1, 1.0)]).unwrap();
        let a = dag_orient_edges(&g, &[0.0, 0.5, 0.9]).unwrap();
        assert_eq!(
            dense(&a),
            vec![vec![0.0, 1.0, 0.0], vec![0.0, 0.0, 1.0], vec![0.0, 0.0, 0.0]]
        );
    }

    #[test]
    fn test_dag_orient_edges_ties_and_nan() {
        let g = from_triplets(3, 3, vec![(0, 1, 1.0), (1, 2, 1.0)]).unwrap();
        let a = dag_orient_edges(&g, &[0.2, 0.2, f64::NAN]).unwrap();
        assert_eq!(a.nnz(), 0);
    }

    #[test]
    fn test_dag_orient_edges_length_mismatch() {
        let g = from_triplets(2, 2, vec![(0, 1, 1.0)]).unwrap();
        assert!(dag_orient_edges(&g, &[0.0]).is_err());
    }

    #[test]
    fn test_normalize_adjacency_rows_sum_to_one() {
        let a = from_triplets(3, 3, vec![(0, 1, 1.0), (0, 2, 3.0), (1, 2, 2.0)]).unwrap();
        let n = dense(&normalize_adjacency(&a).unwrap());
        assert_eq!(n[0], vec![0.0, 0.25, 0.75]);
        assert_eq!(n[1], vec![0.0, 0.0, 1.0]);
        assert_eq!(n[2], vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&mut [4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&mut []), None);
    }

    #[test]
    fn test_binarize_by_row_median() {
        let a = from_triplets(
            2,
            4,
            vec![(0, 0, 0.1), (0, 1, 0.2), (0, 2, 0.3), (0, 3, 0.4)],
        )
        .unwrap();
        let b = dense(&binarize_by_row_median(&a).unwrap());
        // median of 0.1..0.4 is 0.25
        assert_eq!(b[0], vec![0.0, 0.0, 1.0, 1.0]);
        assert_eq!(b[1], vec![0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_symmetrize_min() {
        let a = from_triplets(2, 2, vec![(0, 1, 3.0), (1, 0, 2.0)]).unwrap();
        let s = dense(&symmetrize_min(&a).unwrap());
        assert_eq!(s, vec![vec![0.0, 2.0], vec![2.0, 0.0]]);
    }

    #[test]
    fn test_from_triplets_out_of_range() {
        assert!(from_triplets(2, 2, vec![(2, 0, 1.0)]).is_err());
    }
}
