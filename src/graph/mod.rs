//! Cell-cell transition graphs and backward diffusion along them.

pub mod adjacency;
pub mod diffusion;
pub mod pseudotime;
pub mod velocity;

use crate::domain::model::{Dataset, Dynamics};
use crate::utils::error::{LagError, Result};
use nalgebra_sparse::CsrMatrix;

/// Options for turning a dataset into a lookback operator.
#[derive(Debug, Clone, Copy)]
pub struct GraphOptions {
    pub dynamics: Dynamics,
    pub proba: bool,
    pub root_cell: Option<usize>,
}

/// Lookback operator `B` with `B[j, i] > 0` iff cell `i` precedes cell `j`.
/// Rows of cells without predecessors are empty. Rows are stochastic except
/// for probabilistic velocity, where row `j` holds the normalized transition
/// probabilities of its predecessors into `j`.
pub fn build_lookback_operator(dataset: &Dataset, options: GraphOptions) -> Result<CsrMatrix<f32>> {
    match options.dynamics {
        Dynamics::Pseudotime => pseudotime_operator(dataset, options.root_cell),
        Dynamics::RnaVelocity => velocity_operator(dataset, options.proba),
    }
}

fn pseudotime_operator(dataset: &Dataset, root_cell: Option<usize>) -> Result<CsrMatrix<f32>> {
    let inferred;
    let pt = match &dataset.pseudotime {
        Some(pt) => pt,
        None => {
            let root = root_cell.or(dataset.root_cell).unwrap_or(0);
            tracing::info!("Inferring pseudotime from root cell {}...", root);
            inferred = pseudotime::geodesic_pseudotime(&dataset.knn_distances, root)?;
            &inferred
        }
    };

    let knn = adjacency::knn_indicator(&dataset.knn_distances)?;
    let dag = adjacency::dag_orient_edges(&knn, pt)?;
    tracing::debug!("Oriented {} of {} kNN edges along pseudotime", dag.nnz(), knn.nnz());
    adjacency::normalize_adjacency(&dag.transpose())
}

fn velocity_operator(dataset: &Dataset, proba: bool) -> Result<CsrMatrix<f32>> {
    let inferred;
    let transition = match (&dataset.velocity_transition, &dataset.velocity) {
        (Some(t), _) => t,
        (None, Some(v)) => {
            tracing::info!("Inferring RNA velocity transition matrix...");
            inferred = velocity::velocity_transition_matrix(
                &dataset.expression,
                v,
                &dataset.knn_distances,
                velocity::DEFAULT_SOFTMAX_SCALE,
            )?;
            &inferred
        }
        (None, None) => {
            return Err(LagError::dataset(
                "velocity_transition.csv",
                "rna_velocity dynamics need a transition matrix or a velocity.csv layer",
            ))
        }
    };

    // normalize forward probabilities, then transpose to look backward in time
    let backward = adjacency::normalize_adjacency(transition)?.transpose();
    if proba {
        Ok(backward)
    } else {
        adjacency::normalize_adjacency(&adjacency::binarize_by_row_median(&backward)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adjacency::from_triplets;
    use ndarray::Array2;

    fn dataset(n: usize) -> Dataset {
        Dataset {
            name: "toy".into(),
            cell_names: (0..n).map(|i| format!("c{}", i)).collect(),
            gene_names: vec!["g".into()],
            expression: Array2::zeros((n, 1)),
            is_reg: vec![true],
            is_target: vec![true],
            pseudotime: None,
            knn_distances: from_triplets(n, n, vec![(0, 1, 1.0), (1, 2, 1.0), (0, 2, 2.0)]).unwrap(),
            velocity_transition: None,
            velocity: None,
            root_cell: None,
        }
    }

    fn row(b: &CsrMatrix<f32>, i: usize) -> Vec<(usize, f32)> {
        let r = b.row(i);
        r.col_indices().iter().copied().zip(r.values().iter().copied()).collect()
    }

    fn assert_close(actual: &[(usize, f32)], expected: &[(usize, f32)]) {
        assert_eq!(actual.len(), expected.len(), "{:?} vs {:?}", actual, expected);
        for (a, e) in actual.iter().zip(expected) {
            assert_eq!(a.0, e.0);
            assert!((a.1 - e.1).abs() < 1e-6, "{:?} vs {:?}", actual, expected);
        }
    }

    #[test]
    fn test_pseudotime_operator_looks_at_predecessors() {
        let mut ds = dataset(3);
        ds.pseudotime = Some(vec![0.0, 0.5, 1.0]);
        let b = build_lookback_operator(
            &ds,
            GraphOptions {
                dynamics: Dynamics::Pseudotime,
                proba: false,
                root_cell: None,
            },
        )
        .unwrap();
        assert!(row(&b, 0).is_empty());
        assert_eq!(row(&b, 1), vec![(0, 1.0)]);
        assert_eq!(row(&b, 2), vec![(0, 0.5), (1, 0.5)]);
    }

    #[test]
    fn test_pseudotime_inferred_when_missing() {
        let ds = dataset(3);
        let b = build_lookback_operator(
            &ds,
            GraphOptions {
                dynamics: Dynamics::Pseudotime,
                proba: false,
                root_cell: Some(2),
            },
        )
        .unwrap();
        // root 2 comes first, so it has no predecessors and cell 0 sees both others
        assert!(row(&b, 2).is_empty());
        assert_eq!(row(&b, 0), vec![(1, 0.5), (2, 0.5)]);
    }

    #[test]
    fn test_velocity_operator_binarized() {
        let mut ds = dataset(3);
        // cell 0 transitions to 1 (0.8) and 2 (0.2); cell 1 to 2
        ds.velocity_transition =
            Some(from_triplets(3, 3, vec![(0, 1, 0.8), (0, 2, 0.2), (1, 2, 1.0)]).unwrap());

        let binarized = build_lookback_operator(
            &ds,
            GraphOptions {
                dynamics: Dynamics::RnaVelocity,
                proba: false,
                root_cell: None,
            },
        )
        .unwrap();
        // column 2 of T is [0.2, 1.0]; median 0.6 keeps only cell 1
        assert_eq!(row(&binarized, 2), vec![(1, 1.0)]);
        assert_eq!(row(&binarized, 1), vec![(0, 1.0)]);

        let proba = build_lookback_operator(
            &ds,
            GraphOptions {
                dynamics: Dynamics::RnaVelocity,
                proba: true,
                root_cell: None,
            },
        )
        .unwrap();
        // transposed transition probabilities, not renormalized
        assert_close(&row(&proba, 2), &[(0, 0.2), (1, 1.0)]);
        assert_close(&row(&proba, 1), &[(0, 0.8)]);
    }

    #[test]
    fn test_velocity_operator_normalizes_raw_transition_weights() {
        let mut ds = dataset(3);
        ds.velocity_transition =
            Some(from_triplets(3, 3, vec![(0, 1, 8.0), (0, 2, 2.0), (1, 2, 1.0)]).unwrap());
        let options = |proba| GraphOptions {
            dynamics: Dynamics::RnaVelocity,
            proba,
            root_cell: None,
        };

        let proba = build_lookback_operator(&ds, options(true)).unwrap();
        assert_close(&row(&proba, 2), &[(0, 0.2), (1, 1.0)]);
        assert_close(&row(&proba, 1), &[(0, 0.8)]);

        let binarized = build_lookback_operator(&ds, options(false)).unwrap();
        assert_eq!(row(&binarized, 2), vec![(1, 1.0)]);
        assert_eq!(row(&binarized, 1), vec![(0, 1.0)]);
        assert!(row(&binarized, 0).is_empty());
    }

    #[test]
    fn test_velocity_operator_requires_inputs() {
        let ds = dataset(3);
        let result = build_lookback_operator(
            &ds,
            GraphOptions {
                dynamics: Dynamics::RnaVelocity,
                proba: true,
                root_cell: None,
            },
        );
        assert!(result.is_err());
    }
}
