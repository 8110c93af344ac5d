use crate::domain::model::{DiffusedInputs, TrialConfig};
use crate::model::network::LaggedModel;
use crate::utils::error::{LagError, Result};
use ndarray::Array2;

/// Result of fitting one lambda.
#[derive(Debug, Clone)]
pub struct TrialOutcome {
    /// regulators × targets
    pub gc: Array2<f32>,
    /// `(iteration, objective)` at every check.
    pub loss_trace: Vec<(usize, f64)>,
    pub iterations: usize,
    pub best_loss: f64,
    pub early_stopped: bool,
}

fn objective(model: &LaggedModel, inputs: &DiffusedInputs, config: &TrialConfig) -> f64 {
    let forward = model.forward(inputs.features.design.view());
    let per_target = LaggedModel::target_mse(forward.pred.view(), inputs.targets.view())
        + model.ridge(config.lam_ridge)
        + model.penalty(config.penalty) * config.lam;
    per_target.mean().unwrap_or(0.0)
}

/// Fit every target network with proximal gradient descent (ISTA).
///
/// The objective is checked every `check_every` iterations; the best weights
/// seen are kept, and training stops once `lookback` checks pass without a
/// relative improvement of at least `tolerance`.
pub fn train_model(config: &TrialConfig, inputs: &DiffusedInputs) -> Result<TrialOutcome> {
    let z = inputs.features.design.view();
    let y = inputs.targets.view();
    if z.nrows() != y.nrows() {
        return Err(LagError::shape(
            format!("{} target rows", z.nrows()),
            format!("{} target rows", y.nrows()),
        ));
    }
    if config.check_every == 0 {
        return Err(LagError::InvalidConfigValueError {
            field: "check_every".to_string(),
            value: "0".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }

    let mut model = LaggedModel::new(
        config.method,
        inputs.features.lag,
        inputs.features.n_regs,
        y.ncols(),
        config.hidden,
        config.seed,
    );
    let lr = config.learning_rate;

    let mut best_model = model.clone();
    let mut best_loss = f64::INFINITY;
    let mut reference_loss = f64::INFINITY;
    let mut best_it = 0;
    let mut loss_trace = Vec::new();
    let mut iterations = 0;
    let mut early_stopped = false;

    for it in 0..config.max_iter {
        let forward = model.forward(z);
        let grads = model.gradients(z, y, &forward, config.lam_ridge);
        model.apply_gradients(&grads, lr as f32);
        model.prox(config.lam, lr, config.penalty);
        iterations = it + 1;

        if (it + 1) % config.check_every != 0 {
            continue;
        }

        let loss = objective(&model, inputs, config);
        if !loss.is_finite() {
            return Err(LagError::training(format!(
                "objective diverged at iteration {} (lam = {})",
                it + 1,
                config.lam
            )));
        }
        loss_trace.push((it + 1, loss));
        tracing::debug!("lam {}: iteration {} loss {:.6}", config.lam, it + 1, loss);

        if loss < best_loss {
            best_loss = loss;
            best_model = model.clone();
        }
        if !reference_loss.is_finite() || loss < reference_loss * (1.0 - config.tolerance) {
            reference_loss = loss;
            best_it = it;
        } else if it - best_it >= config.lookback * config.check_every {
            tracing::debug!("lam {}: stopping early at iteration {}", config.lam, it + 1);
            early_stopped = true;
            break;
        }
    }

    if !best_loss.is_finite() {
        // fewer iterations than one check interval
        best_loss = objective(&model, inputs, config);
        if !best_loss.is_finite() {
            return Err(LagError::training(format!(
                "objective is not finite (lam = {})",
                config.lam
            )));
        }
        loss_trace.push((iterations, best_loss));
        best_model = model;
    }

    Ok(TrialOutcome {
        gc: best_model.granger_scores(),
        loss_trace,
        iterations,
        best_loss,
        early_stopped,
    })
}
