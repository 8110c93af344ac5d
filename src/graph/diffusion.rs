use crate::domain::model::LaggedFeatures;
use crate::utils::error::{LagError, Result};
use nalgebra_sparse::CsrMatrix;
use ndarray::parallel::prelude::*;
use ndarray::{s, Array2, ArrayView2, Axis};

/// Sparse × dense product `B · X`, rows in parallel.
pub fn sparse_dense_product(b: &CsrMatrix<f32>, x: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
    if b.ncols() != x.nrows() {
        return Err(LagError::shape(
            format!("{} rows", b.ncols()),
            format!("{} rows", x.nrows()),
        ));
    }
    let mut out = Array2::<f32>::zeros((b.nrows(), x.ncols()));
    out.axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(i, mut row)| {
            let b_row = b.row(i);
            for (&j, &w) in b_row.col_indices().iter().zip(b_row.values()) {
                row.scaled_add(w, &x.row(j));
            }
        });
    Ok(out)
}

/// Diffuse regulator expression backward in time: block `l` of the result is
/// `B^{l+1} X`.
pub fn calculate_ax(b: &CsrMatrix<f32>, x: &Array2<f32>, lag: usize) -> Result<LaggedFeatures> {
    if lag == 0 {
        return Err(LagError::InvalidConfigValueError {
            field: "lag".to_string(),
            value: "0".to_string(),
            reason: "at least one lag is required".to_string(),
        });
    }
    if b.nrows() != b.ncols() {
        return Err(LagError::shape((b.nrows(), b.nrows()), (b.nrows(), b.ncols())));
    }

    let (n_cells, n_regs) = x.dim();
    let mut design = Array2::<f32>::zeros((n_cells, lag * n_regs));
    let mut current = sparse_dense_product(b, x.view())?;
    for l in 0..lag {
        if l > 0 {
            current = sparse_dense_product(b, current.view())?;
        }
        design
            .slice_mut(s![.., l * n_regs..(l + 1) * n_regs])
            .assign(&current);
        tracing::debug!("Diffused lag {}/{}", l + 1, lag);
    }

    Ok(LaggedFeatures {
        lag,
        n_regs,
        design,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::adjacency::from_triplets;
    use ndarray::array;

    #[test]
    fn test_chain_diffusion_shifts_back_in_time() {
        // lookback operator of a 3-cell chain: each cell looks at its predecessor
        let b = from_triplets(3, 3, vec![(1, 0, 1.0), (2, 1, 1.0)]).unwrap();
        let x = array![[1.0, 10.0], [2.0, 20.0], [3.0, 30.0]];
        let ax = calculate_ax(&b, &x, 2).unwrap();

        assert_eq!(ax.lag, 2);
        assert_eq!(ax.n_regs, 2);
        assert_eq!(ax.design.dim(), (3, 4));
        assert_eq!(ax.lag_block(0), array![[0.0, 0.0], [1.0, 10.0], [2.0, 20.0]]);
        assert_eq!(ax.lag_block(1), array![[0.0, 0.0], [0.0, 0.0], [1.0, 10.0]]);
    }

    #[test]
    fn test_averaging_over_predecessors() {
        let b = from_triplets(3, 3, vec![(2, 0, 0.5), (2, 1, 0.5)]).unwrap();
        let x = array![[2.0], [4.0], [100.0]];
        let ax = calculate_ax(&b, &x, 1).unwrap();
        assert_eq!(ax.design, array![[0.0], [0.0], [3.0]]);
    }

    #[test]
    fn test_zero_lag_rejected() {
        let b = from_triplets(1, 1, vec![]).unwrap();
        let x = array![[1.0]];
        assert!(calculate_ax(&b, &x, 0).is_err());
    }

    #[test]
    fn test_shape_mismatch() {
        let b = from_triplets(2, 2, vec![(0, 1, 1.0)]).unwrap();
        let x = array![[1.0], [2.0], [3.0]];
        assert!(calculate_ax(&b, &x, 1).is_err());
    }
}
