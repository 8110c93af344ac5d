//! Per-target lagged networks, stored side by side so that all targets share
//! one matrix product per pass. Each target draws its initial weights from
//! its own seed, and the per-target stages run on the rayon pool.

use crate::domain::model::{Method, Penalty};
use crate::model::penalty;
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis, Zip};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

/// Weights of every target's network.
///
/// `w_in` is `p × (n_targets·width)` with `p = lag·n_regs`; columns
/// `t·width..(t+1)·width` belong to target `t`. The baseline model has
/// `width == 1` and no output layer.
#[derive(Debug, Clone)]
pub struct LaggedModel {
    pub method: Method,
    pub lag: usize,
    pub n_regs: usize,
    pub n_targets: usize,
    pub width: usize,
    pub w_in: Array2<f32>,
    pub b_in: Array1<f32>,
    /// `n_targets × width`, MLP only.
    pub w_out: Option<Array2<f32>>,
    pub b_out: Array1<f32>,
}

/// Intermediate values of a forward pass.
pub struct Forward {
    pub pre: Array2<f32>,
    pub pred: Array2<f32>,
}

pub struct Gradients {
    pub w_in: Array2<f32>,
    pub b_in: Array1<f32>,
    pub w_out: Option<Array2<f32>>,
    pub b_out: Array1<f32>,
}

fn uniform(rng: &mut StdRng, shape: (usize, usize), fan_in: usize) -> Array2<f32> {
    let bound = 1.0 / (fan_in.max(1) as f32).sqrt();
    Array2::from_shape_simple_fn(shape, || rng.gen_range(-bound..=bound))
}

/// Seed of target `t` within a trial seeded by `seed`.
pub fn target_seed(seed: u64, t: usize) -> u64 {
    seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ t as u64
}

impl LaggedModel {
    pub fn new(
        method: Method,
        lag: usize,
        n_regs: usize,
        n_targets: usize,
        hidden: usize,
        seed: u64,
    ) -> Self {
        let p = lag * n_regs;
        let width = match method {
            Method::Baseline => 1,
            Method::Mlp => hidden.max(1),
        };
        let mut w_in = Array2::<f32>::zeros((p, n_targets * width));
        let mut b_in = Array1::<f32>::zeros(n_targets * width);
        let mut w_out = match method {
            Method::Baseline => None,
            Method::Mlp => Some(Array2::<f32>::zeros((n_targets, width))),
        };
        let mut b_out = Array1::<f32>::zeros(n_targets);

        for t in 0..n_targets {
            let mut rng = StdRng::seed_from_u64(target_seed(seed, t));
            let cols = t * width..(t + 1) * width;
            w_in.slice_mut(s![.., cols.clone()])
                .assign(&uniform(&mut rng, (p, width), p));
            b_in.slice_mut(s![cols])
                .assign(&uniform(&mut rng, (1, width), p).remove_axis(Axis(0)));
            if let Some(w_out) = w_out.as_mut() {
                w_out
                    .row_mut(t)
                    .assign(&uniform(&mut rng, (1, width), width).remove_axis(Axis(0)));
                b_out[t] = uniform(&mut rng, (1, 1), width)[[0, 0]];
            }
        }

        Self {
            method,
            lag,
            n_regs,
            n_targets,
            width,
            w_in,
            b_in,
            w_out,
            b_out,
        }
    }

    fn target_columns(&self, t: usize) -> std::ops::Range<usize> {
        t * self.width..(t + 1) * self.width
    }

    pub fn forward(&self, z: ArrayView2<'_, f32>) -> Forward {
        let pre = z.dot(&self.w_in) + &self.b_in;
        let pred = match &self.w_out {
            None => pre.clone(),
            Some(w_out) => {
                let outputs: Vec<Array1<f32>> = (0..self.n_targets)
                    .into_par_iter()
                    .map(|t| {
                        let h = pre.slice(s![.., self.target_columns(t)]).mapv(|v| v.max(0.0));
                        h.dot(&w_out.row(t)) + self.b_out[t]
                    })
                    .collect();
                let mut pred = Array2::<f32>::zeros((z.nrows(), self.n_targets));
                for (t, out) in outputs.into_iter().enumerate() {
                    pred.column_mut(t).assign(&out);
                }
                pred
            }
        };
        Forward { pre, pred }
    }

    /// Mean squared error of each target.
    pub fn target_mse(pred: ArrayView2<'_, f32>, y: ArrayView2<'_, f32>) -> Array1<f64> {
        let n = pred.nrows().max(1) as f64;
        let mut mse = Array1::<f64>::zeros(pred.ncols());
        Zip::from(&mut mse)
            .and(pred.columns())
            .and(y.columns())
            .for_each(|m, p, yt| {
                *m = p
                    .iter()
                    .zip(yt.iter())
                    .map(|(&a, &b)| {
                        let d = (a - b) as f64;
                        d * d
                    })
                    .sum::<f64>()
                    / n;
            });
        mse
    }

    /// Ridge term of each target (output layer only).
    pub fn ridge(&self, lam_ridge: f64) -> Array1<f64> {
        match &self.w_out {
            Some(w_out) if lam_ridge > 0.0 => w_out
                .rows()
                .into_iter()
                .map(|row| lam_ridge * row.iter().map(|&w| (w as f64) * (w as f64)).sum::<f64>())
                .collect(),
            _ => Array1::zeros(self.n_targets),
        }
    }

    /// Non-smooth penalty of each target.
    pub fn penalty(&self, penalty: Penalty) -> Array1<f64> {
        (0..self.n_targets)
            .map(|t| {
                let block = self.w_in.slice(s![.., self.target_columns(t)]);
                penalty::penalty_value(&block, self.n_regs, self.lag, penalty)
            })
            .collect()
    }

    /// Gradients of `Σ_t (mse_t + ridge_t)`.
    pub fn gradients(
        &self,
        z: ArrayView2<'_, f32>,
        y: ArrayView2<'_, f32>,
        forward: &Forward,
        lam_ridge: f64,
    ) -> Gradients {
        let n = z.nrows().max(1) as f32;
        let dpred = (&forward.pred - &y) * (2.0 / n);

        let (dpre, w_out_grad, b_out_grad) = match &self.w_out {
            None => (dpred, None, Array1::zeros(self.n_targets)),
            Some(w_out) => {
                let per_target: Vec<(Array2<f32>, Array1<f32>)> = (0..self.n_targets)
                    .into_par_iter()
                    .map(|t| {
                        let pre_t = forward.pre.slice(s![.., self.target_columns(t)]);
                        let h = pre_t.mapv(|v| v.max(0.0));
                        let d = dpred.column(t);
                        let w = w_out.row(t);

                        let mut dpre_t = Array2::<f32>::zeros(pre_t.dim());
                        Zip::from(dpre_t.rows_mut())
                            .and(pre_t.rows())
                            .and(&d)
                            .for_each(|mut out, pre_row, &di| {
                                Zip::from(&mut out).and(&pre_row).and(&w).for_each(|o, &p, &wk| {
                                    *o = if p > 0.0 { di * wk } else { 0.0 };
                                });
                            });
                        (dpre_t, h.t().dot(&d))
                    })
                    .collect();

                let mut dpre = Array2::<f32>::zeros(forward.pre.dim());
                let mut g_out = Array2::<f32>::zeros(w_out.dim());
                for (t, (dpre_t, g)) in per_target.into_iter().enumerate() {
                    dpre.slice_mut(s![.., self.target_columns(t)]).assign(&dpre_t);
                    g_out.row_mut(t).assign(&g);
                }
                if lam_ridge > 0.0 {
                    g_out.scaled_add(2.0 * lam_ridge as f32, w_out);
                }
                (dpre, Some(g_out), dpred.sum_axis(Axis(0)))
            }
        };

        Gradients {
            w_in: z.t().dot(&dpre),
            b_in: dpre.sum_axis(Axis(0)),
            w_out: w_out_grad,
            b_out: b_out_grad,
        }
    }

    pub fn apply_gradients(&mut self, grads: &Gradients, lr: f32) {
        self.w_in.scaled_add(-lr, &grads.w_in);
        self.b_in.scaled_add(-lr, &grads.b_in);
        self.b_out.scaled_add(-lr, &grads.b_out);
        if let (Some(w_out), Some(g)) = (self.w_out.as_mut(), grads.w_out.as_ref()) {
            w_out.scaled_add(-lr, g);
        }
    }

    /// Proximal step on every target's first-layer block in parallel.
    pub fn prox(&mut self, lam: f64, lr: f64, penalty: Penalty) {
        let (n_regs, lag) = (self.n_regs, self.lag);
        self.w_in
            .axis_chunks_iter_mut(Axis(1), self.width)
            .into_par_iter()
            .for_each(|mut block| penalty::prox_update(&mut block, n_regs, lag, lam, lr, penalty));
    }

    /// `n_regs × n_targets` Granger scores.
    pub fn granger_scores(&self) -> Array2<f32> {
        let mut gc = Array2::<f32>::zeros((self.n_regs, self.n_targets));
        for t in 0..self.n_targets {
            let block = self.w_in.slice(s![.., self.target_columns(t)]);
            let scores = penalty::regulator_scores(&block, self.n_regs, self.lag);
            gc.column_mut(t).assign(&ArrayView1::from(&scores[..]));
        }
        gc
    }
}
