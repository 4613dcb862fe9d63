//! # cogcam
//!
//! Severity classification of brain scans with Grad-CAM explanations.
//!
//! cogcam provides:
//!
//! - **Data handling**: class-per-directory image folders, stratified splits,
//!   batch loading
//! - **Models**: a staged convolutional backbone with a dense head whose
//!   stages can be addressed by name
//! - **Training**: Adam with cross-entropy, best-epoch selection, history
//! - **Analysis**: classification report, confusion matrix, plots
//! - **Explainability**: Grad-CAM surfaces rendered as heatmap overlays
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cogcam::prelude::*;
//!
//! let config = ExperimentConfig::from_file("experiment.json")?;
//! let summary = Experiment::new(config).run::<Autodiff<NdArray>>(&device)?;
//! println!("{}", summary.report.to_string_table());
//! ```
//!
//! ## Feature Flags
//!
//! - `backend-ndarray` (default): CPU backend using ndarray

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
pub mod pipeline;

pub use error::{PipelineError, Result};

// Re-export all crates
pub use cogcam_analysis as analysis;
pub use cogcam_core as core;
pub use cogcam_data as data;
pub use cogcam_explain as explain;
pub use cogcam_models as models;
pub use cogcam_train as train;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use cogcam::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use cogcam_core::{
        ExperimentConfig, ExplainSettings, FeatureIntrospection, GradientIntrospection,
        ImageClassifier, ScoreKind, Seed, Split,
    };

    // Data
    pub use cogcam_data::{
        train_valid_test_split, ImageDataLoader, ImageDataLoaders, ImageDataset, ImageFolder,
    };

    // Models
    pub use cogcam_models::{
        load_classifier, save_classifier, BackboneConfig, ClassifierConfig, FeatureLayer,
        ModelMetadata, SeverityClassifier,
    };

    // Training
    pub use cogcam_train::{
        evaluate_classification, ClassificationTrainer, ClassificationTrainerConfig, StopSignal,
        TrainingHistory,
    };

    // Analysis
    pub use cogcam_analysis::{classification_report, ClassificationReport, ConfusionMatrix};

    // Explain
    pub use cogcam_explain::{attribute, render, Colormap, Explainer, Explanation, RenderConfig};

    // Pipeline
    pub use crate::error::PipelineError;
    pub use crate::pipeline::{evaluate_saved, explain_saved, Experiment, ExperimentSummary};
}
