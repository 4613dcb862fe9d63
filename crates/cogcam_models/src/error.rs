//! Error types for cogcam_models.

use thiserror::Error;

/// Result type alias using [`ModelError`].
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors raised while building, persisting or restoring models.
#[derive(Error, Debug)]
pub enum ModelError {
    /// Error saving a record or its metadata.
    #[error("Failed to save checkpoint: {0}")]
    Save(String),

    /// Error loading a record or its metadata.
    #[error("Failed to load checkpoint: {0}")]
    Load(String),

    /// Metadata describes a model this crate cannot rebuild.
    #[error("Invalid checkpoint metadata: {0}")]
    InvalidMetadata(String),

    /// A layer name that does not parse as a feature layer.
    #[error("Unknown layer '{0}' (expected 'stage<N>' or 'global_pool')")]
    UnknownLayer(String),

    /// Invalid model configuration.
    #[error("Invalid model configuration: {0}")]
    InvalidConfig(String),

    /// Core error.
    #[error("Core error: {0}")]
    Core(#[from] cogcam_core::CoreError),
}
