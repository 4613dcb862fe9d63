//! # cogcam_analysis
//!
//! Analysis utilities for cogcam: confusion matrix, classification report,
//! and plots.
//!
//! This crate provides tools for analyzing model performance:
//! - Confusion matrix with per-class and balanced metrics
//! - Per-class precision, recall, F1 and support with macro/weighted averages
//! - Training curve and confusion matrix PNGs

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod confusion;
mod error;
mod plots;
mod report;

pub use confusion::ConfusionMatrix;
pub use error::{AnalysisError, Result};
pub use plots::{plot_confusion_matrix, plot_training_curves, CurvePair};
pub use report::{classification_report, ClassMetrics, ClassificationReport};
