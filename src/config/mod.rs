pub mod toml_config;

use crate::domain::model::TrainingSettings;
use crate::tune::Resources;
use crate::utils::error::{LagError, Result};
use crate::utils::validation::{
    validate_non_negative, validate_positive_number, validate_range,
};

#[cfg(feature = "cli")]
pub use cli::CliConfig;

/// Checks shared by every configuration source.
pub fn validate_training(settings: &TrainingSettings) -> Result<()> {
    validate_positive_number("lag", settings.lag, 1)?;
    validate_positive_number("hidden", settings.hidden, 1)?;
    validate_positive_number("max_iter", settings.max_iter, 1)?;
    validate_positive_number("check_every", settings.check_every, 1)?;
    validate_positive_number("lookback", settings.lookback, 1)?;
    validate_non_negative("lam_ridge", settings.lam_ridge)?;
    validate_non_negative("learning_rate", settings.learning_rate)?;
    if settings.learning_rate == 0.0 {
        return Err(LagError::InvalidConfigValueError {
            field: "learning_rate".to_string(),
            value: "0".to_string(),
            reason: "Value must be greater than 0".to_string(),
        });
    }
    validate_range("tolerance", settings.tolerance, 0.0, 1.0)?;
    Ok(())
}

/// Per-trial resources and the optional concurrency cap.
pub fn validate_resources(resources: &Resources, max_concurrent_trials: Option<usize>) -> Result<()> {
    if !resources.cpu.is_finite() || resources.cpu <= 0.0 {
        return Err(LagError::InvalidConfigValueError {
            field: "cpus_per_trial".to_string(),
            value: resources.cpu.to_string(),
            reason: "Value must be greater than 0".to_string(),
        });
    }
    if resources.memory_bytes == 0 {
        return Err(LagError::InvalidConfigValueError {
            field: "memory_per_trial".to_string(),
            value: "0".to_string(),
            reason: "Value must be greater than 0".to_string(),
        });
    }
    if let Some(0) = max_concurrent_trials {
        return Err(LagError::InvalidConfigValueError {
            field: "max_concurrent_trials".to_string(),
            value: "0".to_string(),
            reason: "Value must be at least 1".to_string(),
        });
    }
    Ok(())
}

#[cfg(feature = "cli")]
mod cli {
    use super::{validate_resources, validate_training};
    use crate::core::ConfigProvider;
    use crate::domain::model::{Dynamics, Method, Penalty, TrainingSettings};
    use crate::tune::resources::GIB;
    use crate::tune::{LamGrid, Resources};
    use crate::utils::error::Result;
    use crate::utils::validation::{validate_identifier, validate_path, Validate};
    use clap::Parser;
    use serde::{Deserialize, Serialize};
    use std::path::{Path, PathBuf};

    #[derive(Debug, Clone, Serialize, Deserialize, Parser)]
    #[command(name = "tf-lag")]
    #[command(about = "Granger causal regulator inference over single-cell transition graphs")]
    pub struct CliConfig {
        /// Model family: baseline (lagged linear) or mlp
        #[arg(short, long, default_value = "baseline")]
        pub method: Method,

        /// Dataset name under <root_dir>/datasets/preprocessed
        #[arg(short, long)]
        pub dataset: String,

        /// Cell ordering: pseudotime or rna_velocity
        #[arg(long, alias = "dyn", default_value = "pseudotime")]
        pub dynamics: Dynamics,

        #[arg(short, long, default_value = "0")]
        pub trial_no: u64,

        #[arg(long, default_value = "0")]
        pub lam_ridge: f64,

        /// GL, GSGL or H
        #[arg(short, long, default_value = "H")]
        pub penalty: Penalty,

        #[arg(short, long, default_value = "5")]
        pub lag: usize,

        #[arg(long, default_value = "16")]
        pub hidden: usize,

        #[arg(long, default_value = "500")]
        pub max_iter: usize,

        #[arg(long, default_value = "0.0001")]
        pub learning_rate: f64,

        /// Keep velocity transition probabilities instead of median-binarizing them
        #[arg(long)]
        pub proba: bool,

        #[arg(long, default_value = "0.01")]
        pub tolerance: f64,

        #[arg(long, default_value = "100")]
        pub check_every: usize,

        #[arg(long, default_value = "5")]
        pub lookback: usize,

        #[arg(short, long)]
        pub root_dir: PathBuf,

        /// Root cell for pseudotime inference when the dataset has none
        #[arg(long)]
        pub root_cell: Option<usize>,

        #[arg(long, default_value = "1")]
        pub cpus_per_trial: f64,

        #[arg(long, default_value = "2")]
        pub memory_per_trial_gb: f64,

        #[arg(long)]
        pub max_concurrent_trials: Option<usize>,

        /// Bundle the trial directory into a zip after the sweep
        #[arg(long)]
        pub archive: bool,

        #[arg(long, help = "Log CPU and memory usage per phase")]
        pub monitor: bool,

        #[arg(short, long, help = "Enable verbose output")]
        pub verbose: bool,
    }

    impl ConfigProvider for CliConfig {
        fn dataset(&self) -> &str {
            &self.dataset
        }

        fn root_dir(&self) -> &Path {
            &self.root_dir
        }

        fn dynamics(&self) -> Dynamics {
            self.dynamics
        }

        fn proba(&self) -> bool {
            self.proba
        }

        fn root_cell(&self) -> Option<usize> {
            self.root_cell
        }

        fn training(&self) -> TrainingSettings {
            TrainingSettings {
                method: self.method,
                penalty: self.penalty,
                trial_no: self.trial_no,
                lam_ridge: self.lam_ridge,
                lag: self.lag,
                hidden: self.hidden,
                max_iter: self.max_iter,
                learning_rate: self.learning_rate,
                tolerance: self.tolerance,
                check_every: self.check_every,
                lookback: self.lookback,
            }
        }

        fn lam_grid(&self) -> LamGrid {
            LamGrid::default()
        }

        fn resources(&self) -> Resources {
            Resources {
                cpu: self.cpus_per_trial,
                memory_bytes: (self.memory_per_trial_gb.max(0.0) * GIB as f64) as u64,
            }
        }

        fn max_concurrent_trials(&self) -> Option<usize> {
            self.max_concurrent_trials
        }

        fn archive(&self) -> bool {
            self.archive
        }
    }

    impl Validate for CliConfig {
        fn validate(&self) -> Result<()> {
            validate_identifier("dataset", &self.dataset)?;
            validate_path("root_dir", &self.root_dir.to_string_lossy())?;
            validate_training(&self.training())?;
            validate_resources(&self.resources(), self.max_concurrent_trials)?;
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::utils::error::LagError;

        #[test]
        fn test_defaults() {
            let config = CliConfig::try_parse_from(["tf-lag", "-d", "pbmc", "-r", "/proj"]).unwrap();
            assert_eq!(config.method, Method::Baseline);
            assert_eq!(config.dynamics, Dynamics::Pseudotime);
            assert_eq!(config.penalty, Penalty::Hierarchical);
            assert_eq!(config.lag, 5);
            assert_eq!(config.hidden, 16);
            assert_eq!(config.max_iter, 500);
            assert_eq!(config.learning_rate, 0.0001);
            assert_eq!(config.check_every, 100);
            assert!(!config.proba);
            assert_eq!(config.resources(), Resources::default());
            assert!(config.validate().is_ok());
        }

        #[test]
        fn test_flags() {
            let config = CliConfig::try_parse_from([
                "tf-lag",
                "-m",
                "mlp",
                "-d",
                "pbmc",
                "--dynamics",
                "rna_velocity",
                "-p",
                "GSGL",
                "--proba",
                "-l",
                "3",
                "-r",
                "/proj",
            ])
            .unwrap();
            assert_eq!(config.method, Method::Mlp);
            assert_eq!(config.dynamics, Dynamics::RnaVelocity);
            assert_eq!(config.penalty, Penalty::GroupSparseGroupLasso);
            assert!(config.proba);
            assert_eq!(
                config.training().dir_name(config.dynamics()),
                "mlp.trial0.h16.GSGL.lag3.rna_velocity"
            );
        }

        #[test]
        fn test_invalid_values() {
            assert!(CliConfig::try_parse_from(["tf-lag", "-d", "x", "-r", "/p", "--dynamics", "velocity"]).is_err());

            let zero_lag = CliConfig::try_parse_from(["tf-lag", "-d", "x", "-r", "/p", "-l", "0"]).unwrap();
            assert!(zero_lag.validate().is_err());

            let bad_dataset = CliConfig::try_parse_from(["tf-lag", "-d", "../x", "-r", "/p"]).unwrap();
            assert!(bad_dataset.validate().is_err());
        }

        #[test]
        fn test_zero_concurrent_trials_rejected() {
            let config = CliConfig::try_parse_from([
                "tf-lag",
                "-d",
                "x",
                "-r",
                "/p",
                "--max-concurrent-trials",
                "0",
            ])
            .unwrap();
            match config.validate() {
                Err(LagError::InvalidConfigValueError { field, .. }) => {
                    assert_eq!(field, "max_concurrent_trials")
                }
                other => panic!("expected a rejected value, got {:?}", other),
            }

            let capped = CliConfig::try_parse_from([
                "tf-lag",
                "-d",
                "x",
                "-r",
                "/p",
                "--max-concurrent-trials",
                "2",
            ])
            .unwrap();
            assert!(capped.validate().is_ok());
        }
    }
}
