use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("corruption detected: {0}")]
    Corruption(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("matrix dimension mismatch: {0}")]
    DimensionMismatch(String),
    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        expected: &'static str,
        got: &'static str,
    },
    #[error("{0} must be a non-negative integer")]
    ExpectedNonNegativeInt(&'static str),
    #[error("invalid CSV path: {0}")]
    InvalidCsvPath(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("compile error: {0}")]
    Compile(String),
    #[error("query cancelled")]
    Cancelled,
    #[error("query timed out")]
    Timeout,
}

impl GraphError {
    /// True for errors raised while a query is running, as opposed to
    /// errors rejecting a query before execution.
    pub fn is_runtime(&self) -> bool {
        !matches!(self, GraphError::Compile(_))
    }
}
