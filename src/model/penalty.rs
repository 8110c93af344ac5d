//! Group-sparsity penalties on input-layer weights and their proximal operators.
//!
//! A weight block belongs to one target: rows are laid out as
//! `l·n_regs + r` (lag `l`, regulator `r`), columns are hidden units.
//! A regulator's group is the set of its rows over some range of lags,
//! across all columns.

use crate::domain::model::Penalty;
use ndarray::{ArrayView2, ArrayViewMut2};

fn group_norm(block: &ArrayView2<'_, f32>, n_regs: usize, r: usize, lags: std::ops::Range<usize>) -> f64 {
    let mut ss = 0.0_f64;
    for l in lags {
        for &w in block.row(l * n_regs + r) {
            ss += (w as f64) * (w as f64);
        }
    }
    ss.sqrt()
}

fn shrink_group(
    block: &mut ArrayViewMut2<'_, f32>,
    n_regs: usize,
    r: usize,
    lags: std::ops::Range<usize>,
    threshold: f64,
) {
    let norm = group_norm(&block.view(), n_regs, r, lags.clone());
    let scale = if norm > threshold {
        (1.0 - threshold / norm) as f32
    } else {
        0.0
    };
    for l in lags {
        block.row_mut(l * n_regs + r).mapv_inplace(|w| w * scale);
    }
}

/// Proximal step for `lam · penalty(W)` with step size `lr`.
pub fn prox_update(
    block: &mut ArrayViewMut2<'_, f32>,
    n_regs: usize,
    lag: usize,
    lam: f64,
    lr: f64,
    penalty: Penalty,
) {
    let threshold = lam * lr;
    if threshold <= 0.0 {
        return;
    }
    match penalty {
        Penalty::GroupLasso => {
            for r in 0..n_regs {
                shrink_group(block, n_regs, r, 0..lag, threshold);
            }
        }
        Penalty::GroupSparseGroupLasso => {
            for r in 0..n_regs {
                for l in 0..lag {
                    shrink_group(block, n_regs, r, l..l + 1, threshold);
                }
                shrink_group(block, n_regs, r, 0..lag, threshold);
            }
        }
        Penalty::Hierarchical => {
            // farthest lag alone first, then ever larger suffixes
            for r in 0..n_regs {
                for k in (0..lag).rev() {
                    shrink_group(block, n_regs, r, k..lag, threshold);
                }
            }
        }
    }
}

/// Value of the (unscaled) penalty for one target's block.
pub fn penalty_value(block: &ArrayView2<'_, f32>, n_regs: usize, lag: usize, penalty: Penalty) -> f64 {
    let mut total = 0.0;
    for r in 0..n_regs {
        match penalty {
            Penalty::GroupLasso => total += group_norm(block, n_regs, r, 0..lag),
            Penalty::GroupSparseGroupLasso => {
                total += group_norm(block, n_regs, r, 0..lag);
                for l in 0..lag {
                    total += group_norm(block, n_regs, r, l..l + 1);
                }
            }
            Penalty::Hierarchical => {
                for k in 0..lag {
                    total += group_norm(block, n_regs, r, k..lag);
                }
            }
        }
    }
    total
}

/// Granger score of each regulator: norm of its weights over all lags.
pub fn regulator_scores(block: &ArrayView2<'_, f32>, n_regs: usize, lag: usize) -> Vec<f32> {
    (0..n_regs)
        .map(|r| group_norm(block, n_regs, r, 0..lag) as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    // 2 regulators, 2 lags, width 1: rows are (l0,r0), (l0,r1), (l1,r0), (l1,r1)
    fn block() -> Array2<f32> {
        array![[3.0], [0.1], [4.0], [0.1]]
    }

    #[test]
    fn test_group_lasso_zeroes_weak_regulator() {
        let mut w = block();
        prox_update(&mut w.view_mut(), 2, 2, 1.0, 1.0, Penalty::GroupLasso);
        // regulator 0 has norm 5 -> scaled by 0.8
        assert!((w[[0, 0]] - 2.4).abs() < 1e-6);
        assert!((w[[2, 0]] - 3.2).abs() < 1e-6);
        // regulator 1 has norm ~0.14 < 1 -> zeroed
        assert_eq!(w[[1, 0]], 0.0);
        assert_eq!(w[[3, 0]], 0.0);
    }

    #[test]
    fn test_sparse_group_lasso_shrinks_lags_then_group() {
        let mut w = block();
        prox_update(&mut w.view_mut(), 2, 2, 0.5, 2.0, Penalty::GroupSparseGroupLasso);

        // per-lag pass: 3 -> 2 and 4 -> 3; the group [2, 3] then has norm √13
        let group_scale = 1.0 - 1.0 / 13.0_f32.sqrt();
        assert!((w[[0, 0]] - 2.0 * group_scale).abs() < 1e-5);
        assert!((w[[2, 0]] - 3.0 * group_scale).abs() < 1e-5);
        assert!((w[[0, 0]] - 1.4453).abs() < 1e-3);
        assert!((w[[2, 0]] - 2.1680).abs() < 1e-3);
        // each 0.1 entry falls below the threshold in the per-lag pass
        assert_eq!(w[[1, 0]], 0.0);
        assert_eq!(w[[3, 0]], 0.0);

        // group norms plus per-lag norms: (5 + 3 + 4) + (√0.02 + 0.1 + 0.1)
        let value = penalty_value(&block().view(), 2, 2, Penalty::GroupSparseGroupLasso);
        assert!((value - (12.0 + 0.02_f64.sqrt() + 0.2)).abs() < 1e-5);
    }

    #[test]
    fn test_hierarchical_shrinks_far_lags_harder() {
        let mut w = array![[1.0], [0.0], [1.0], [0.0]];
        prox_update(&mut w.view_mut(), 2, 2, 0.5, 1.0, Penalty::Hierarchical);
        // lag 1 shrunk twice, lag 0 once
        assert!(w[[2, 0]] < w[[0, 0]]);
        assert!(w[[0, 0]] > 0.0);
    }

    #[test]
    fn test_zero_threshold_is_identity() {
        let mut w = block();
        for penalty in [Penalty::GroupLasso, Penalty::GroupSparseGroupLasso, Penalty::Hierarchical] {
            prox_update(&mut w.view_mut(), 2, 2, 0.0, 1.0, penalty);
        }
        assert_eq!(w, block());
    }

    #[test]
    fn test_penalty_value_and_scores() {
        let w = block();
        let gl = penalty_value(&w.view(), 2, 2, Penalty::GroupLasso);
        let expected = 5.0 + (0.02_f64).sqrt();
        assert!((gl - expected).abs() < 1e-5);

        let h = penalty_value(&w.view(), 2, 2, Penalty::Hierarchical);
        // adds the lag-1-only groups: 4.0 and 0.1
        assert!((h - (expected + 4.1)).abs() < 1e-5);

        let scores = regulator_scores(&w.view(), 2, 2);
        assert!((scores[0] - 5.0).abs() < 1e-6);
        assert!(scores[1] < 0.2);
    }
}
