//! Error types for cogcam_analysis.

use thiserror::Error;

/// Result type alias using [`AnalysisError`].
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Errors raised while building reports or plots.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Inconsistent predictions, targets or labels.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Plot rendering failed.
    #[error("Plot error: {0}")]
    Plot(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
