use std::path::PathBuf;
use thiserror::Error;

/// Top-level error for a pipeline run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Load failed: {0}")]
    Load(#[from] LoadError),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Join changed row count: {expected} transactions in, {actual} rows out")]
    JoinIntegrity { expected: usize, actual: usize },

    #[error("Computation produced an invalid value: {0}")]
    Computation(#[from] ComputationError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Aggregation task failed: {0}")]
    Aggregation(String),

    #[error("Export error: {0}")]
    Export(String),
}

impl PipelineError {
    /// Short label used for metrics and failure logs.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Load(_) => "load",
            PipelineError::Validation(_) => "validation",
            PipelineError::JoinIntegrity { .. } => "join_integrity",
            PipelineError::Computation(_) => "computation",
            PipelineError::Csv(_) => "csv",
            PipelineError::Json(_) => "json",
            PipelineError::Toml(_) => "toml",
            PipelineError::Io(_) => "io",
            PipelineError::Config(_) => "config",
            PipelineError::Aggregation(_) => "aggregation",
            PipelineError::Export(_) => "export",
        }
    }
}

/// A source table could not be read into memory.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("{table} file not found: {}", path.display())]
    MissingFile { table: &'static str, path: PathBuf },

    #[error("{table} file {} is unreadable: {source}", path.display())]
    Unreadable {
        table: &'static str,
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{table} is missing required columns: {}", columns.join(", "))]
    MissingColumns {
        table: &'static str,
        columns: Vec<String>,
    },
}

/// Row-level problems that the configured policy escalated to a fatal error.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("{table} contains no data rows")]
    EmptyInput { table: &'static str },

    #[error("all {total} {table} rows were excluded by validation")]
    NothingLeft { table: &'static str, total: usize },

    #[error("{excluded} of {total} rows excluded, above the allowed ratio {max_ratio}")]
    TooManyExcluded {
        excluded: usize,
        total: usize,
        max_ratio: f64,
    },

    #[error("{violations} violations found and policy is to abort")]
    Rejected { violations: usize },
}

/// A non-finite number reached a result table.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{table} row {row} column '{column}' holds {value}")]
pub struct ComputationError {
    pub table: String,
    pub row: usize,
    pub column: String,
    pub value: f64,
}

pub type Result<T> = std::result::Result<T, PipelineError>;
