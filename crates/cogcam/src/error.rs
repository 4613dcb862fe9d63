//! Errors of the end-to-end pipeline.

use thiserror::Error;

/// Result type alias using [`PipelineError`].
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Any failure of an experiment stage.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Invalid experiment or model configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Core error.
    #[error(transparent)]
    Core(#[from] cogcam_core::CoreError),

    /// Dataset scanning, loading or splitting failed.
    #[error(transparent)]
    Data(#[from] cogcam_data::DataError),

    /// Model construction or persistence failed.
    #[error(transparent)]
    Model(#[from] cogcam_models::ModelError),

    /// Training or evaluation failed.
    #[error(transparent)]
    Train(#[from] cogcam_train::TrainError),

    /// Attribution or rendering failed.
    #[error(transparent)]
    Explain(#[from] cogcam_explain::ExplainError),

    /// Report or plot generation failed.
    #[error(transparent)]
    Analysis(#[from] cogcam_analysis::AnalysisError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
