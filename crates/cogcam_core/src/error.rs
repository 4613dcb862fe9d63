//! Error types for cogcam_core.

use thiserror::Error;

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors shared by every stage of the pipeline.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Invalid tensor or image shape provided.
    #[error("Invalid shape: expected {expected}, got {got}")]
    InvalidShape {
        /// Expected shape description.
        expected: String,
        /// Actual shape description.
        got: String,
    },

    /// Shape mismatch between two tensors that must agree.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A layer produced an output with the wrong rank for the request.
    #[error("Layer '{layer}' yields a {got}-D output per example, expected {expected}-D")]
    DimensionError {
        /// Layer that was queried.
        layer: String,
        /// Expected number of dimensions per example.
        expected: usize,
        /// Actual number of dimensions per example.
        got: usize,
    },

    /// The requested layer does not exist in the model.
    #[error("Layer '{0}' not found")]
    LayerNotFound(String),

    /// Target class index outside the model's class range.
    #[error("Target class {target} out of range for {n_classes} classes")]
    InvalidTarget {
        /// Requested class index.
        target: usize,
        /// Number of classes the model predicts.
        n_classes: usize,
    },

    /// Gradient for a tracked tensor was not produced by the backward pass.
    #[error("No gradient recorded for layer '{0}'")]
    MissingGradient(String),

    /// Invalid experiment configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Tensor data could not be read back to host memory.
    #[error("Tensor data error: {0}")]
    TensorData(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}
