//! Experiment configuration.
//!
//! A single [`ExperimentConfig`] is passed into every stage (scanning,
//! splitting, training, evaluation, explanation) instead of module-level
//! constants. It is loaded from JSON and any field may be omitted, in which
//! case the default applies.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::model_trait::ScoreKind;
use crate::seed::Seed;

/// Severity classes of the reference dataset, in label order.
pub const DEFAULT_CLASS_NAMES: [&str; 4] = [
    "MildDemented",
    "ModerateDemented",
    "NonDemented",
    "VeryMildDemented",
];

/// Configuration for one end-to-end experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Directory with one sub-directory of images per class.
    pub dataset_dir: PathBuf,
    /// Directory receiving the model, reports, plots and explanations.
    pub output_dir: PathBuf,
    /// Declared class list; must match the number of class directories.
    pub class_names: Vec<String>,
    /// Square input resolution fed to the model.
    pub image_size: usize,
    /// Mini-batch size.
    pub batch_size: usize,
    /// Number of training epochs.
    pub epochs: usize,
    /// Master seed for splitting, shuffling and initialisation.
    pub seed: Seed,
    /// Fraction of every class held out for the final test report.
    pub test_ratio: f32,
    /// Fraction of every class used to monitor training.
    pub valid_ratio: f32,
    /// Adam learning rate.
    pub learning_rate: f64,
    /// Optional record file with pretrained backbone weights.
    pub backbone_weights: Option<PathBuf>,
    /// Keep pretrained backbone parameters out of the optimiser; ignored
    /// when `backbone_weights` is unset.
    pub freeze_backbone: bool,
    /// Grad-CAM settings.
    pub explain: ExplainSettings,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            dataset_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("runs"),
            class_names: DEFAULT_CLASS_NAMES.iter().map(|s| s.to_string()).collect(),
            image_size: 128,
            batch_size: 32,
            epochs: 10,
            seed: Seed::default(),
            test_ratio: 0.2,
            valid_ratio: 0.1,
            learning_rate: 1e-3,
            backbone_weights: None,
            freeze_backbone: true,
            explain: ExplainSettings::default(),
        }
    }
}

impl ExperimentConfig {
    /// Load a configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&json)?;
        Ok(config)
    }

    /// Write the configuration as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Number of declared classes.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.class_names.len()
    }

    /// Check value ranges before any stage runs.
    pub fn validate(&self) -> Result<()> {
        if self.class_names.len() < 2 {
            return Err(CoreError::Configuration(format!(
                "at least two classes are required, got {}",
                self.class_names.len()
            )));
        }
        if self.image_size < 8 {
            return Err(CoreError::Configuration(format!(
                "image_size must be at least 8, got {}",
                self.image_size
            )));
        }
        if self.batch_size == 0 {
            return Err(CoreError::Configuration("batch_size must be > 0".to_string()));
        }
        if self.epochs == 0 {
            return Err(CoreError::Configuration("epochs must be > 0".to_string()));
        }
        let held_out = self.test_ratio + self.valid_ratio;
        if self.test_ratio <= 0.0 || self.valid_ratio <= 0.0 || held_out >= 1.0 {
            return Err(CoreError::Configuration(format!(
                "test_ratio and valid_ratio must be > 0 and their sum < 1 (got {} + {})",
                self.test_ratio, self.valid_ratio
            )));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(CoreError::Configuration(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        self.explain.validate()
    }
}

/// Grad-CAM and rendering settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplainSettings {
    /// Name of the backbone layer to attribute.
    pub layer: String,
    /// Blend weight of the base image.
    pub image_weight: f32,
    /// Blend weight of the colorised heatmap.
    pub heatmap_weight: f32,
    /// Colormap name (`jet` or `hot`).
    pub colormap: String,
    /// Which class score is differentiated.
    pub score: ScoreKind,
    /// Number of test images explained after training.
    pub samples: usize,
}

impl Default for ExplainSettings {
    fn default() -> Self {
        Self {
            layer: "stage4".to_string(),
            image_weight: 0.6,
            heatmap_weight: 0.4,
            colormap: "jet".to_string(),
            score: ScoreKind::Probability,
            samples: 4,
        }
    }
}

impl ExplainSettings {
    fn validate(&self) -> Result<()> {
        let ok = |w: f32| w.is_finite() && w >= 0.0;
        if !ok(self.image_weight) || !ok(self.heatmap_weight) {
            return Err(CoreError::Configuration(format!(
                "blend weights must be finite and non-negative, got ({}, {})",
                self.image_weight, self.heatmap_weight
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ExperimentConfig::default();
        assert_eq!(config.n_classes(), 4);
        assert_eq!(config.image_size, 128);
        assert_eq!(config.explain.layer, "stage4");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "epochs": 3, "explain": { "colormap": "hot" } }"#;
        let config: ExperimentConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.epochs, 3);
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.explain.colormap, "hot");
        assert!((config.explain.image_weight - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_ratios_rejected() {
        let config = ExperimentConfig {
            test_ratio: 0.6,
            valid_ratio: 0.4,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(CoreError::Configuration(_))));
    }

    #[test]
    fn test_single_class_rejected() {
        let config = ExperimentConfig {
            class_names: vec!["only".to_string()],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = ExperimentConfig {
            epochs: 7,
            ..Default::default()
        };
        config.save(&path).unwrap();
        let loaded = ExperimentConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
