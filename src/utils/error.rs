use thiserror::Error;

#[derive(Error, Debug)]
pub enum LagError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Archive error: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Trial task failed to join: {0}")]
    JoinError(#[from] tokio::task::JoinError),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Dataset error in {file}: {message}")]
    DatasetError { file: String, message: String },

    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },

    #[error("Training failed: {message}")]
    TrainingError { message: String },

    #[error("{failed} of {total} trials failed")]
    TrialsFailed { failed: usize, total: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Io,
    Configuration,
    Data,
    Numeric,
    Execution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl LagError {
    pub fn config(message: impl Into<String>) -> Self {
        LagError::ConfigError {
            message: message.into(),
        }
    }

    pub fn dataset(file: impl Into<String>, message: impl Into<String>) -> Self {
        LagError::DatasetError {
            file: file.into(),
            message: message.into(),
        }
    }

    pub fn shape(expected: impl std::fmt::Debug, actual: impl std::fmt::Debug) -> Self {
        LagError::ShapeError {
            expected: format!("{:?}", expected),
            actual: format!("{:?}", actual),
        }
    }

    pub fn processing(message: impl Into<String>) -> Self {
        LagError::ProcessingError {
            message: message.into(),
        }
    }

    pub fn training(message: impl Into<String>) -> Self {
        LagError::TrainingError {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            LagError::IoError(_) | LagError::ZipError(_) => ErrorCategory::Io,
            LagError::ConfigError { .. }
            | LagError::InvalidConfigValueError { .. }
            | LagError::ConfigValidationError { .. }
            | LagError::TomlError(_) => ErrorCategory::Configuration,
            LagError::CsvError(_)
            | LagError::SerializationError(_)
            | LagError::DatasetError { .. }
            | LagError::ShapeError { .. } => ErrorCategory::Data,
            LagError::ProcessingError { .. } | LagError::TrainingError { .. } => {
                ErrorCategory::Numeric
            }
            LagError::JoinError(_) | LagError::TrialsFailed { .. } => ErrorCategory::Execution,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            LagError::TrialsFailed { failed, total } if failed < total => ErrorSeverity::Medium,
            LagError::TrialsFailed { .. } => ErrorSeverity::High,
            LagError::TrainingError { .. } => ErrorSeverity::Medium,
            LagError::JoinError(_) => ErrorSeverity::Critical,
            _ => match self.category() {
                ErrorCategory::Io => ErrorSeverity::Critical,
                _ => ErrorSeverity::High,
            },
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Io => "Check that the root directory exists and is writable",
            ErrorCategory::Configuration => "Review the command line flags or TOML configuration",
            ErrorCategory::Data => {
                "Check the dataset files (X.csv, var.csv, distances.csv) for consistent shapes"
            }
            ErrorCategory::Numeric => "Try a smaller learning rate or a larger regularization",
            ErrorCategory::Execution => "Inspect the per-trial logs in the results directory",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            LagError::DatasetError { file, message } => {
                format!("Could not read dataset file '{}': {}", file, message)
            }
            LagError::TrialsFailed { failed, total } => {
                format!("Sweep finished but {} of {} trials failed", failed, total)
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LagError>;
