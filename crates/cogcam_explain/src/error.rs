//! Error types for cogcam_explain.

use thiserror::Error;

/// Result type alias using [`ExplainError`].
pub type Result<T> = std::result::Result<T, ExplainError>;

/// Errors raised while attributing or rendering an explanation.
#[derive(Error, Debug)]
pub enum ExplainError {
    /// The requested layer does not exist in the model.
    #[error("Layer '{layer}' not found; available layers: {}", available.join(", "))]
    LayerNotFound {
        /// Requested layer name.
        layer: String,
        /// Names the model accepts.
        available: Vec<String>,
    },

    /// The layer exists but its output has no spatial axes.
    #[error("Layer '{layer}' output has rank {rank} per example; Grad-CAM needs a (channels, height, width) feature map")]
    ShapeMismatch {
        /// Layer name.
        layer: String,
        /// Rank of the layer output without the batch axis.
        rank: usize,
    },

    /// Class index outside the model's outputs.
    #[error("Target class {target} out of range for {n_classes} classes")]
    InvalidTarget {
        /// Requested class index.
        target: usize,
        /// Number of classes.
        n_classes: usize,
    },

    /// Malformed input tensor, surface or image.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A tensor could not be read back to the host.
    #[error("Tensor readback failed: {0}")]
    Readback(String),

    /// Image encoding or decoding error.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Core error.
    #[error("Core error: {0}")]
    Core(cogcam_core::CoreError),

    /// Data error.
    #[error("Data error: {0}")]
    Data(#[from] cogcam_data::DataError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<cogcam_core::CoreError> for ExplainError {
    fn from(err: cogcam_core::CoreError) -> Self {
        use cogcam_core::CoreError;
        match err {
            CoreError::DimensionError { layer, got, .. } => ExplainError::ShapeMismatch { layer, rank: got },
            CoreError::InvalidTarget { target, n_classes } => {
                ExplainError::InvalidTarget { target, n_classes }
            }
            CoreError::InvalidShape { expected, got } => {
                ExplainError::InvalidInput(format!("expected image {expected}, got {got}"))
            }
            CoreError::LayerNotFound(layer) => ExplainError::LayerNotFound {
                layer,
                available: Vec::new(),
            },
            other => ExplainError::Core(other),
        }
    }
}
