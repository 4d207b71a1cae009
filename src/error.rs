//! Error types for the embedml training orchestrator

use thiserror::Error;

/// Result type alias for embedml operations
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("Data error: {0}")]
    DataError(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Model not implemented: {0}")]
    UnknownModel(String),

    #[error("Unknown search method: {0}")]
    UnknownSearchMethod(String),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Search error: {0}")]
    SearchError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Computation error: {0}")]
    ComputationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<polars::error::PolarsError> for EmbedError {
    fn from(err: polars::error::PolarsError) -> Self {
        EmbedError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for EmbedError {
    fn from(err: serde_json::Error) -> Self {
        EmbedError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for EmbedError {
    fn from(err: ndarray::ShapeError) -> Self {
        EmbedError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

impl From<ndarray_npy::ReadNpyError> for EmbedError {
    fn from(err: ndarray_npy::ReadNpyError) -> Self {
        EmbedError::DataError(err.to_string())
    }
}

impl From<ndarray_npy::WriteNpyError> for EmbedError {
    fn from(err: ndarray_npy::WriteNpyError) -> Self {
        EmbedError::DataError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EmbedError::UnknownModel("not_a_model".to_string());
        assert_eq!(err.to_string(), "Model not implemented: not_a_model");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: EmbedError = io_err.into();
        assert!(matches!(err, EmbedError::IoError(_)));
    }
}
