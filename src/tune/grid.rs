use crate::utils::error::{LagError, Result};
use serde::{Deserialize, Serialize};

/// Regularization strengths to sweep: `round(logspace(min_exp, max_exp, num), decimals)`
/// unless an explicit list is given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LamGrid {
    pub min_exp: f64,
    pub max_exp: f64,
    pub num: usize,
    pub decimals: u32,
    #[serde(default)]
    pub explicit: Option<Vec<f64>>,
}

impl Default for LamGrid {
    fn default() -> Self {
        Self {
            min_exp: -1.0,
            max_exp: 1.0,
            num: 19,
            decimals: 4,
            explicit: None,
        }
    }
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Base-10 log spaced values with both endpoints included.
pub fn logspace(min_exp: f64, max_exp: f64, num: usize) -> Vec<f64> {
    match num {
        0 => Vec::new(),
        1 => vec![10f64.powf(min_exp)],
        _ => {
            let step = (max_exp - min_exp) / (num - 1) as f64;
            (0..num)
                .map(|i| 10f64.powf(min_exp + step * i as f64))
                .collect()
        }
    }
}

impl LamGrid {
    pub fn values(&self) -> Vec<f64> {
        match &self.explicit {
            Some(values) => values.clone(),
            None => logspace(self.min_exp, self.max_exp, self.num)
                .into_iter()
                .map(|v| round_to(v, self.decimals))
                .collect(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let values = self.values();
        if values.is_empty() {
            return Err(LagError::ConfigValidationError {
                field: "sweep".to_string(),
                message: "lambda grid is empty".to_string(),
            });
        }
        if let Some(bad) = values.iter().find(|v| !v.is_finite() || **v < 0.0) {
            return Err(LagError::InvalidConfigValueError {
                field: "sweep.lams".to_string(),
                value: bad.to_string(),
                reason: "lambdas must be finite and non-negative".to_string(),
            });
        }
        let mut sorted = values.clone();
        sorted.sort_by(f64::total_cmp);
        sorted.dedup();
        if sorted.len() != values.len() {
            return Err(LagError::ConfigValidationError {
                field: "sweep".to_string(),
                message: "lambda grid contains duplicates".to_string(),
            });
        }
        Ok(())
    }
}
