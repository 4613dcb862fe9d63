//! # cogcam_train
//!
//! Training loop and evaluation for cogcam classifiers.
//!
//! This crate provides:
//! - [`ClassificationTrainer`] fitting a classifier with Adam and cross-entropy,
//!   keeping the best epoch by validation accuracy
//! - [`TrainingHistory`] with per-epoch losses and accuracies
//! - [`StopSignal`] for cooperative cancellation between batches and epochs
//! - [`evaluate_classification`] collecting predictions and probabilities
//!
//! ## Example
//!
//! ```rust,ignore
//! use cogcam_train::{ClassificationTrainer, ClassificationTrainerConfig};
//!
//! let trainer = ClassificationTrainer::<Autodiff<NdArray>>::new(
//!     ClassificationTrainerConfig::from_experiment(&config),
//!     device,
//! );
//! let output = trainer.fit(model, &dls)?;
//! output.history.save("runs/history.json")?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod evaluation;
pub mod history;
mod stop;
pub mod training;

pub use error::{Result, TrainError};
pub use evaluation::{evaluate_classification, evaluate_loader, EvaluationResult};
pub use history::{EpochMetrics, TrainingHistory};
pub use stop::StopSignal;
pub use training::{ClassificationTrainer, ClassificationTrainerConfig, TrainingOutput};
