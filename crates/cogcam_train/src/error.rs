//! Error types for training.

use thiserror::Error;

/// Result type alias for training operations.
pub type Result<T> = std::result::Result<T, TrainError>;

/// Errors that can occur during training and evaluation.
#[derive(Error, Debug)]
pub enum TrainError {
    /// Invalid learning rate.
    #[error("Invalid learning rate: {0}")]
    InvalidLearningRate(String),

    /// Invalid trainer configuration.
    #[error("Invalid trainer configuration: {0}")]
    InvalidConfig(String),

    /// Predictions and dataset disagree on the class count.
    #[error("Model predicts {model} classes but the data declares {data}")]
    ClassCountMismatch {
        /// Classes the model predicts.
        model: usize,
        /// Classes the dataset declares.
        data: usize,
    },

    /// A tensor could not be read back to the host.
    #[error("Tensor readback failed: {0}")]
    Readback(String),

    /// Data error.
    #[error("Data error: {0}")]
    DataError(#[from] cogcam_data::DataError),

    /// Core error.
    #[error("Core error: {0}")]
    CoreError(#[from] cogcam_core::CoreError),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
