use super::{validate_resources, validate_training};
use crate::core::ConfigProvider;
use crate::domain::model::{Dynamics, Method, Penalty, TrainingSettings};
use crate::tune::resources::GIB;
use crate::tune::{LamGrid, Resources};
use crate::utils::error::{LagError, Result};
use crate::utils::validation::{validate_identifier, validate_path, Validate};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    pub run: RunConfig,
    pub dynamics: DynamicsConfig,
    pub model: ModelConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    pub sweep: Option<SweepConfig>,
    pub resources: Option<ResourcesConfig>,
    pub monitoring: Option<MonitoringConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub dataset: String,
    pub root_dir: PathBuf,
    pub archive: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicsConfig {
    pub kind: Dynamics,
    pub proba: Option<bool>,
    pub root_cell: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub method: Method,
    pub penalty: Option<Penalty>,
    pub lag: Option<usize>,
    pub hidden: Option<usize>,
    pub trial_no: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub max_iter: Option<usize>,
    pub learning_rate: Option<f64>,
    pub tolerance: Option<f64>,
    pub check_every: Option<usize>,
    pub lookback: Option<usize>,
    pub lam_ridge: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    pub lam_min_exp: Option<f64>,
    pub lam_max_exp: Option<f64>,
    pub num: Option<usize>,
    pub decimals: Option<u32>,
    pub lams: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcesConfig {
    pub cpus_per_trial: Option<f64>,
    pub memory_per_trial_gb: Option<f64>,
    pub max_concurrent_trials: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub json_logs: Option<bool>,
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(LagError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;
        Ok(toml::from_str(&processed_content)?)
    }

    /// 替換環境變數 (例如 ${PROJECT_ROOT})；未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}")
            .map_err(|e| LagError::config(format!("env pattern: {}", e)))?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enabled).unwrap_or(false)
    }

    pub fn json_logs(&self) -> bool {
        self.monitoring
            .as_ref()
            .and_then(|m| m.json_logs)
            .unwrap_or(false)
    }
}

impl ConfigProvider for TomlConfig {
    fn dataset(&self) -> &str {
        &self.run.dataset
    }

    fn root_dir(&self) -> &Path {
        &self.run.root_dir
    }

    fn dynamics(&self) -> Dynamics {
        self.dynamics.kind
    }

    fn proba(&self) -> bool {
        self.dynamics.proba.unwrap_or(false)
    }

    fn root_cell(&self) -> Option<usize> {
        self.dynamics.root_cell
    }

    fn training(&self) -> TrainingSettings {
        let defaults = TrainingSettings::default();
        let training = &self.training;
        TrainingSettings {
            method: self.model.method,
            penalty: self.model.penalty.unwrap_or(defaults.penalty),
            trial_no: self.model.trial_no.unwrap_or(defaults.trial_no),
            lam_ridge: training.lam_ridge.unwrap_or(defaults.lam_ridge),
            lag: self.model.lag.unwrap_or(defaults.lag),
            hidden: self.model.hidden.unwrap_or(defaults.hidden),
            max_iter: training.max_iter.unwrap_or(defaults.max_iter),
            learning_rate: training.learning_rate.unwrap_or(defaults.learning_rate),
            tolerance: training.tolerance.unwrap_or(defaults.tolerance),
            check_every: training.check_every.unwrap_or(defaults.check_every),
            lookback: training.lookback.unwrap_or(defaults.lookback),
        }
    }

    fn lam_grid(&self) -> LamGrid {
        let defaults = LamGrid::default();
        match &self.sweep {
            Some(sweep) => LamGrid {
                min_exp: sweep.lam_min_exp.unwrap_or(defaults.min_exp),
                max_exp: sweep.lam_max_exp.unwrap_or(defaults.max_exp),
                num: sweep.num.unwrap_or(defaults.num),
                decimals: sweep.decimals.unwrap_or(defaults.decimals),
                explicit: sweep.lams.clone(),
            },
            None => defaults,
        }
    }

    fn resources(&self) -> Resources {
        let defaults = Resources::default();
        match &self.resources {
            Some(r) => Resources {
                cpu: r.cpus_per_trial.unwrap_or(defaults.cpu),
                memory_bytes: r
                    .memory_per_trial_gb
                    .map(|gb| (gb.max(0.0) * GIB as f64) as u64)
                    .unwrap_or(defaults.memory_bytes),
            },
            None => defaults,
        }
    }

    fn max_concurrent_trials(&self) -> Option<usize> {
        self.resources.as_ref().and_then(|r| r.max_concurrent_trials)
    }

    fn archive(&self) -> bool {
        self.run.archive.unwrap_or(false)
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        validate_identifier("run.dataset", &self.run.dataset)?;
        validate_path("run.root_dir", &self.run.root_dir.to_string_lossy())?;
        validate_training(&self.training())?;
        validate_resources(&self.resources(), self.max_concurrent_trials())?;
        self.lam_grid().validate()
    }
}
