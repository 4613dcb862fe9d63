//! # cogcam_models
//!
//! The severity classifier and its convolutional backbone.
//!
//! - [`Backbone`] - VGG-style feature extractor with named stages
//! - [`SeverityClassifier`] - backbone, global average pooling and a dense head;
//!   implements [`cogcam_core::FeatureIntrospection`] over [`FeatureLayer`]
//! - [`checkpoint`] - weight records plus JSON metadata, and
//!   [`load_classifier`] to rebuild a trained model from its directory

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod backbone;
pub mod checkpoint;
mod classifier;
mod error;
mod layer;

pub use backbone::{Backbone, BackboneConfig, ConvStage};
pub use checkpoint::{
    load_classifier, load_model, model_paths, record_path, save_classifier, save_model,
    ModelCheckpoint, ModelMetadata, METADATA_FILE, MODEL_FILE,
};
pub use classifier::{ClassifierConfig, SeverityClassifier, ARCH_NAME};
pub use error::{ModelError, Result};
pub use layer::{FeatureLayer, GLOBAL_POOL};
