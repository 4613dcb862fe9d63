//! # cogcam_core
//!
//! Core types and traits shared by the cogcam crates.
//!
//! This crate provides:
//! - [`ExperimentConfig`] passed explicitly into every pipeline stage
//! - [`Seed`] for deterministic splitting, shuffling and initialisation
//! - [`ImageClassifier`], [`FeatureIntrospection`] and
//!   [`GradientIntrospection`], the contract between models and the
//!   Grad-CAM engine
//! - [`LayerCapture`], a feature map and its gradient from one forward pass
//! - Error types and common utilities
//!
//! ## Shape Convention
//!
//! Images follow the convention `(B, C, H, W)`:
//! - `B`: Batch size
//! - `C`: Channels (3 for RGB input, feature channels inside the backbone)
//! - `H`, `W`: Spatial height and width
//!
//! ## Example
//!
//! ```rust,ignore
//! use cogcam_core::{ExperimentConfig, GradientIntrospection, ScoreKind};
//!
//! let config = ExperimentConfig::from_file("experiment.json")?;
//! let layer = model.layer(&config.explain.layer).expect("known layer");
//! let capture = model.forward_with_gradient(image, 2, layer, ScoreKind::Probability)?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod capture;
mod config;
mod error;
mod model_trait;
mod seed;
mod split;

pub use capture::LayerCapture;
pub use config::{ExperimentConfig, ExplainSettings, DEFAULT_CLASS_NAMES};
pub use error::{CoreError, Result};
pub use model_trait::{
    FeatureIntrospection, GradientIntrospection, ImageClassifier, LayerOutput, ScoreKind,
};
pub use seed::Seed;
pub use split::Split;

/// Backend type aliases for convenience
pub mod backend {
    #[cfg(feature = "backend-ndarray")]
    pub use burn_ndarray::NdArray;
}
