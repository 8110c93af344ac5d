use chrono::{DateTime, Utc};
use nalgebra_sparse::CsrMatrix;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Which cell-cell dynamics model orders cells in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dynamics {
    Pseudotime,
    RnaVelocity,
}

impl fmt::Display for Dynamics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dynamics::Pseudotime => write!(f, "pseudotime"),
            Dynamics::RnaVelocity => write!(f, "rna_velocity"),
        }
    }
}

impl FromStr for Dynamics {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pseudotime" => Ok(Dynamics::Pseudotime),
            "rna_velocity" => Ok(Dynamics::RnaVelocity),
            other => Err(format!(
                "unknown dynamics '{}', expected pseudotime or rna_velocity",
                other
            )),
        }
    }
}

/// Model family fitted per target gene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    /// Lagged linear regression.
    Baseline,
    /// One hidden ReLU layer.
    Mlp,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Baseline => write!(f, "baseline"),
            Method::Mlp => write!(f, "mlp"),
        }
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "baseline" | "linear" => Ok(Method::Baseline),
            "mlp" => Ok(Method::Mlp),
            other => Err(format!("unknown method '{}', expected baseline or mlp", other)),
        }
    }
}

/// Sparsity structure imposed on the input-layer weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Penalty {
    /// Group lasso over all lags of a regulator.
    #[serde(rename = "GL")]
    GroupLasso,
    /// Group lasso plus a per-lag group lasso.
    #[serde(rename = "GSGL")]
    GroupSparseGroupLasso,
    /// Nested groups over lags `k..lag`, shrinking long lags hardest.
    #[serde(rename = "H")]
    Hierarchical,
}

impl fmt::Display for Penalty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Penalty::GroupLasso => write!(f, "GL"),
            Penalty::GroupSparseGroupLasso => write!(f, "GSGL"),
            Penalty::Hierarchical => write!(f, "H"),
        }
    }
}

impl FromStr for Penalty {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "GL" => Ok(Penalty::GroupLasso),
            "GSGL" => Ok(Penalty::GroupSparseGroupLasso),
            "H" => Ok(Penalty::Hierarchical),
            other => Err(format!("unknown penalty '{}', expected GL, GSGL or H", other)),
        }
    }
}

/// Hyperparameters shared by every trial of a sweep; only `lam` varies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSettings {
    pub method: Method,
    pub penalty: Penalty,
    pub trial_no: u64,
    pub lam_ridge: f64,
    pub lag: usize,
    pub hidden: usize,
    pub max_iter: usize,
    pub learning_rate: f64,
    pub tolerance: f64,
    pub check_every: usize,
    pub lookback: usize,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            method: Method::Baseline,
            penalty: Penalty::Hierarchical,
            trial_no: 0,
            lam_ridge: 0.0,
            lag: 5,
            hidden: 16,
            max_iter: 500,
            learning_rate: 0.0001,
            tolerance: 0.01,
            check_every: 100,
            lookback: 5,
        }
    }
}

impl TrainingSettings {
    /// `{method}.trial{n}.h{hidden}.{penalty}.lag{lag}.{dynamics}`
    pub fn dir_name(&self, dynamics: Dynamics) -> String {
        format!(
            "{}.trial{}.h{}.{}.lag{}.{}",
            self.method, self.trial_no, self.hidden, self.penalty, self.lag, dynamics
        )
    }

    pub fn trial_config(&self, lam: f64) -> TrialConfig {
        TrialConfig {
            method: self.method,
            penalty: self.penalty,
            lam,
            lam_ridge: self.lam_ridge,
            hidden: self.hidden,
            max_iter: self.max_iter,
            learning_rate: self.learning_rate,
            tolerance: self.tolerance,
            check_every: self.check_every,
            lookback: self.lookback,
            seed: self.trial_no,
        }
    }
}

/// Everything one trial needs besides the shared tensors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialConfig {
    pub method: Method,
    pub penalty: Penalty,
    pub lam: f64,
    pub lam_ridge: f64,
    pub hidden: usize,
    pub max_iter: usize,
    pub learning_rate: f64,
    pub tolerance: f64,
    pub check_every: usize,
    pub lookback: usize,
    pub seed: u64,
}

/// Directory layout of one run under the project root.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPaths {
    pub data_dir: PathBuf,
    pub dataset_results_dir: PathBuf,
    pub gc_dir: PathBuf,
    pub dir_name: String,
    pub trial_dir: PathBuf,
    pub time_file: PathBuf,
    pub analysis_dir: PathBuf,
}

impl RunPaths {
    pub fn new(root_dir: &Path, dataset: &str, dir_name: String) -> Self {
        let results = root_dir.join("results");
        let dataset_results_dir = results.join(dataset);
        let gc_dir = dataset_results_dir.join("gc");
        Self {
            data_dir: root_dir.join("datasets").join("preprocessed").join(dataset),
            trial_dir: gc_dir.join(&dir_name),
            time_file: gc_dir.join(format!("{}.time.txt", dir_name)),
            analysis_dir: results.join(&dir_name),
            dataset_results_dir,
            gc_dir,
            dir_name,
        }
    }
}

/// Expression data plus the graph annotations the dynamics models need.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub name: String,
    pub cell_names: Vec<String>,
    pub gene_names: Vec<String>,
    /// cells × genes
    pub expression: Array2<f32>,
    pub is_reg: Vec<bool>,
    pub is_target: Vec<bool>,
    pub pseudotime: Option<Vec<f64>>,
    /// kNN distances, cells × cells.
    pub knn_distances: CsrMatrix<f32>,
    pub velocity_transition: Option<CsrMatrix<f32>>,
    /// cells × genes
    pub velocity: Option<Array2<f32>>,
    pub root_cell: Option<usize>,
}

/// A named column subset of the expression matrix.
#[derive(Debug, Clone)]
pub struct GeneBlock {
    pub names: Vec<String>,
    pub values: Array2<f32>,
}

impl Dataset {
    pub fn n_cells(&self) -> usize {
        self.expression.nrows()
    }

    pub fn n_genes(&self) -> usize {
        self.expression.ncols()
    }

    pub fn regulators(&self) -> GeneBlock {
        self.select_genes(&self.is_reg)
    }

    pub fn targets(&self) -> GeneBlock {
        self.select_genes(&self.is_target)
    }

    fn select_genes(&self, mask: &[bool]) -> GeneBlock {
        let columns: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(j, &keep)| keep.then_some(j))
            .collect();
        GeneBlock {
            names: columns.iter().map(|&j| self.gene_names[j].clone()).collect(),
            values: self.expression.select(ndarray::Axis(1), &columns),
        }
    }
}

/// Lagged, graph-diffused regulator expression.
///
/// Stored as one `n_cells × (lag·n_regs)` design matrix; column `l·n_regs + r`
/// holds regulator `r` diffused `l + 1` steps back in time.
#[derive(Debug, Clone)]
pub struct LaggedFeatures {
    pub lag: usize,
    pub n_regs: usize,
    pub design: Array2<f32>,
}

impl LaggedFeatures {
    pub fn n_cells(&self) -> usize {
        self.design.nrows()
    }

    /// `B^{l+1} X` as a view.
    pub fn lag_block(&self, l: usize) -> ndarray::ArrayView2<'_, f32> {
        self.design
            .slice(ndarray::s![.., l * self.n_regs..(l + 1) * self.n_regs])
    }
}

/// The fixed inputs every trial of the sweep shares.
#[derive(Debug, Clone)]
pub struct DiffusedInputs {
    pub regulator_names: Vec<String>,
    pub target_names: Vec<String>,
    pub features: LaggedFeatures,
    /// cells × targets
    pub targets: Array2<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialStatus {
    Completed,
    Errored,
}

/// Summary row for one lambda of the sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialRecord {
    pub lam: f64,
    pub status: TrialStatus,
    pub iterations: usize,
    pub final_loss: Option<f64>,
    pub early_stopped: bool,
    pub elapsed_secs: f64,
    pub finished_at: DateTime<Utc>,
    pub error: Option<String>,
}

/// What `load` reports back to the engine.
#[derive(Debug, Clone)]
pub struct SweepReport {
    pub trial_dir: PathBuf,
    pub records: Vec<TrialRecord>,
    pub total_secs: f64,
}

impl SweepReport {
    pub fn failed(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.status == TrialStatus::Errored)
            .count()
    }
}
