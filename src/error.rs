//! Error types for the segmentation search space

use thiserror::Error;

/// Result type alias for search space operations
pub type Result<T> = std::result::Result<T, SegNasError>;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum SegNasError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Structural error: {0}")]
    StructuralError(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl SegNasError {
    /// Whether a randomized operator may retry after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SegNasError::StructuralError(_) | SegNasError::ShapeError { .. }
        )
    }
}

impl From<serde_json::Error> for SegNasError {
    fn from(err: serde_json::Error) -> Self {
        SegNasError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for SegNasError {
    fn from(err: ndarray::ShapeError) -> Self {
        SegNasError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SegNasError::ConfigError("min_layers > max_layers".to_string());
        assert_eq!(err.to_string(), "Configuration error: min_layers > max_layers");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: SegNasError = io_err.into();
        assert!(matches!(err, SegNasError::IoError(_)));
    }

    #[test]
    fn test_error_from_ndarray_shape() {
        let a = ndarray::Array2::<f32>::zeros((3, 2));
        let b = ndarray::Array2::<f32>::zeros((4, 1));
        let err: SegNasError = ndarray::concatenate(ndarray::Axis(1), &[a.view(), b.view()])
            .unwrap_err()
            .into();
        assert!(matches!(err, SegNasError::ShapeError { .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(SegNasError::StructuralError("bad".into()).is_recoverable());
        assert!(!SegNasError::ConfigError("bad".into()).is_recoverable());
    }
}
