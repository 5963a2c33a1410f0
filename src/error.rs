#[cfg(feature = "python")]
use pyo3::exceptions::{PyRuntimeError, PyValueError, PyZeroDivisionError};
#[cfg(feature = "python")]
use pyo3::PyErr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TargetsError {
    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Unknown metric type: {0:?}")]
    UnknownMetric(String),

    #[error("Length mismatch: {targets} targets but {filters} filters")]
    LengthMismatch { targets: usize, filters: usize },

    #[error("Invalid filter {filter:?}: {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("Invalid expression {expr:?}: {reason}")]
    InvalidExpression { expr: String, reason: String },

    #[error("Capacity requires either a capacity column or a capacity expression")]
    MissingCapacity,

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Column {0:?} has no values to aggregate")]
    EmptyColumn(String),

    #[error("Cannot scale column {column:?}: current {metric} is zero")]
    ZeroAggregate { column: String, metric: String },

    #[error("Rows are assigned to non-existent containers: {0:?}")]
    UnassignedContainer(Vec<String>),

    #[error("No rows to synthesize or remove")]
    NoRowsToSynthesize,

    #[error("InvalidData: {0}")]
    InvalidData(String),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(feature = "python")]
impl From<TargetsError> for PyErr {
    fn from(err: TargetsError) -> PyErr {
        match err {
            TargetsError::MissingColumn(_)
            | TargetsError::UnknownMetric(_)
            | TargetsError::LengthMismatch { .. }
            | TargetsError::InvalidFilter { .. }
            | TargetsError::InvalidExpression { .. }
            | TargetsError::MissingCapacity
            | TargetsError::InvalidTarget(_) => PyValueError::new_err(err.to_string()),
            TargetsError::ZeroAggregate { .. } => PyZeroDivisionError::new_err(err.to_string()),
            _ => PyRuntimeError::new_err(err.to_string()),
        }
    }
}
