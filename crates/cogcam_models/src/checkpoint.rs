//! Model checkpointing and serialization utilities.
//!
//! Weights are stored with Burn's named MessagePack recorder at full
//! precision. A trained classifier is persisted as a directory holding the
//! record (`model.mpk`) next to a JSON description (`model.json`) that is
//! sufficient to rebuild the architecture before the weights are loaded.
//!
//! # Example
//!
//! ```rust,ignore
//! use cogcam_models::checkpoint::{load_classifier, save_classifier, ModelMetadata};
//!
//! let metadata = ModelMetadata::new(config.clone(), class_names, 128).with_val_acc(0.91);
//! save_classifier(&model, &metadata, "runs/exp1")?;
//!
//! let (model, metadata) = load_classifier::<NdArray>("runs/exp1", &device)?;
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::prelude::*;
use burn::record::{FileRecorder, FullPrecisionSettings, NamedMpkFileRecorder};
use serde::{Deserialize, Serialize};

use crate::classifier::{ClassifierConfig, SeverityClassifier, ARCH_NAME};
use crate::error::{ModelError, Result};

/// File name of the weight record inside a model directory.
pub const MODEL_FILE: &str = "model.mpk";

/// File name of the metadata inside a model directory.
pub const METADATA_FILE: &str = "model.json";

type Recorder = NamedMpkFileRecorder<FullPrecisionSettings>;

/// File the recorder actually reads or writes for `path`.
///
/// The recorder replaces any extension with `mpk`, so `weights`,
/// `weights.bin` and `weights.mpk` all name `weights.mpk`.
pub fn record_path<B: Backend>(path: impl AsRef<Path>) -> PathBuf {
    path.as_ref()
        .with_extension(<Recorder as FileRecorder<B>>::file_extension())
}

/// Save a module's weights to a record file.
pub fn save_model<B, M>(model: &M, path: impl AsRef<Path>) -> Result<()>
where
    B: Backend,
    M: Module<B>,
{
    let path = path.as_ref();
    model
        .clone()
        .save_file(path.to_path_buf(), &Recorder::new())
        .map_err(|e| ModelError::Save(format!("{}: {}", path.display(), e)))
}

/// Load weights from a record file into `model`.
pub fn load_model<B, M>(model: M, path: impl AsRef<Path>, device: &B::Device) -> Result<M>
where
    B: Backend,
    M: Module<B>,
{
    let path = record_path::<B>(path);
    if !path.exists() {
        return Err(ModelError::Load(format!("{} does not exist", path.display())));
    }
    model
        .load_file(path.clone(), &Recorder::new(), device)
        .map_err(|e| ModelError::Load(format!("{}: {}", path.display(), e)))
}

/// Extension trait for models to add checkpoint methods.
pub trait ModelCheckpoint<B: Backend>: Module<B> {
    /// Save the model to a checkpoint file.
    fn save_checkpoint(&self, path: impl AsRef<Path>) -> Result<()> {
        save_model::<B, Self>(self, path)
    }

    /// Load weights from a checkpoint into this model.
    fn load_checkpoint(self, path: impl AsRef<Path>, device: &B::Device) -> Result<Self>
    where
        Self: Sized,
    {
        load_model::<B, Self>(self, path, device)
    }
}

// Implement for all modules
impl<B: Backend, M: Module<B>> ModelCheckpoint<B> for M {}

/// Description of a persisted classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Model architecture name.
    pub arch: String,
    /// Architecture configuration.
    pub config: ClassifierConfig,
    /// Class names in output order.
    pub class_names: Vec<String>,
    /// Square input resolution the model was trained on.
    pub image_size: usize,
    /// Epoch of the retained weights (1-based).
    pub epoch: Option<usize>,
    /// Validation loss of the retained weights.
    pub val_loss: Option<f32>,
    /// Validation accuracy of the retained weights.
    pub val_acc: Option<f32>,
    /// Additional metadata.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl ModelMetadata {
    /// Create new metadata for a [`SeverityClassifier`].
    pub fn new(config: ClassifierConfig, class_names: Vec<String>, image_size: usize) -> Self {
        Self {
            arch: ARCH_NAME.to_string(),
            config,
            class_names,
            image_size,
            epoch: None,
            val_loss: None,
            val_acc: None,
            extra: BTreeMap::new(),
        }
    }

    /// Set the training epoch.
    #[must_use]
    pub fn with_epoch(mut self, epoch: usize) -> Self {
        self.epoch = Some(epoch);
        self
    }

    /// Set the validation loss.
    #[must_use]
    pub fn with_val_loss(mut self, loss: f32) -> Self {
        self.val_loss = Some(loss);
        self
    }

    /// Set the validation accuracy.
    #[must_use]
    pub fn with_val_acc(mut self, acc: f32) -> Self {
        self.val_acc = Some(acc);
        self
    }

    /// Add extra metadata.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Check that the metadata describes a model this crate can rebuild.
    pub fn validate(&self) -> Result<()> {
        if self.arch != ARCH_NAME {
            return Err(ModelError::InvalidMetadata(format!(
                "architecture '{}' is not '{}'",
                self.arch, ARCH_NAME
            )));
        }
        if self.class_names.len() != self.config.n_classes {
            return Err(ModelError::InvalidMetadata(format!(
                "{} class names for a {}-class model",
                self.class_names.len(),
                self.config.n_classes
            )));
        }
        if self.image_size < self.config.backbone.min_input_size() {
            return Err(ModelError::InvalidMetadata(format!(
                "image_size {} is smaller than the backbone minimum {}",
                self.image_size,
                self.config.backbone.min_input_size()
            )));
        }
        self.config.validate()
    }

    /// Save metadata to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ModelError::Save(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| ModelError::Save(e.to_string()))?;
        Ok(())
    }

    /// Load metadata from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ModelError::Load(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&json)
            .map_err(|e| ModelError::Load(format!("{}: {}", path.display(), e)))
    }
}

/// Paths of the record and metadata files inside a model directory.
#[must_use]
pub fn model_paths(dir: impl AsRef<Path>) -> (PathBuf, PathBuf) {
    let dir = dir.as_ref();
    (dir.join(MODEL_FILE), dir.join(METADATA_FILE))
}

/// Persist a classifier and its metadata into `dir`, creating it if needed.
pub fn save_classifier<B: Backend>(
    model: &SeverityClassifier<B>,
    metadata: &ModelMetadata,
    dir: impl AsRef<Path>,
) -> Result<()> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)
        .map_err(|e| ModelError::Save(format!("{}: {}", dir.display(), e)))?;

    let (model_path, metadata_path) = model_paths(dir);
    model.save_checkpoint(&model_path)?;
    metadata.save(&metadata_path)?;
    tracing::info!("Saved {} to {}", metadata.arch, dir.display());
    Ok(())
}

/// Rebuild a classifier from a directory written by [`save_classifier`].
///
/// The architecture comes from `model.json` and the weights from
/// `model.mpk`; nothing else is needed.
pub fn load_classifier<B: Backend>(
    dir: impl AsRef<Path>,
    device: &B::Device,
) -> Result<(SeverityClassifier<B>, ModelMetadata)> {
    let (model_path, metadata_path) = model_paths(dir);
    let metadata = ModelMetadata::load(&metadata_path)?;
    metadata.validate()?;

    let model = metadata
        .config
        .init::<B>(device)?
        .load_checkpoint(&model_path, device)?;
    Ok((model, metadata))
}
