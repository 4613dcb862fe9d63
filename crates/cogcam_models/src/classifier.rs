//! Severity classifier: frozen backbone plus a trainable dense head.

use std::path::Path;

use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::relu;
use serde::{Deserialize, Serialize};

use cogcam_core::{CoreError, FeatureIntrospection, ImageClassifier, LayerOutput};

use crate::backbone::{Backbone, BackboneConfig};
use crate::checkpoint::ModelCheckpoint;
use crate::error::{ModelError, Result};
use crate::layer::FeatureLayer;

/// Architecture name written to checkpoint metadata.
pub const ARCH_NAME: &str = "SeverityClassifier";

/// Configuration for the [`SeverityClassifier`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Number of output classes.
    pub n_classes: usize,
    /// Feature extractor layout.
    pub backbone: BackboneConfig,
    /// Width of the hidden dense layer.
    pub hidden: usize,
    /// Dropout probability before the output layer during training.
    pub dropout: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            n_classes: 4,
            backbone: BackboneConfig::default(),
            hidden: 128,
            dropout: 0.3,
        }
    }
}

impl ClassifierConfig {
    /// Create a new config for `n_classes` outputs.
    pub fn new(n_classes: usize) -> Self {
        Self {
            n_classes,
            ..Default::default()
        }
    }

    /// Set the backbone layout.
    #[must_use]
    pub fn with_backbone(mut self, backbone: BackboneConfig) -> Self {
        self.backbone = backbone;
        self
    }

    /// Set the hidden width.
    #[must_use]
    pub fn with_hidden(mut self, hidden: usize) -> Self {
        self.hidden = hidden;
        self
    }

    /// Set the dropout probability.
    #[must_use]
    pub fn with_dropout(mut self, dropout: f64) -> Self {
        self.dropout = dropout;
        self
    }

    /// Check the configuration.
    pub fn validate(&self) -> Result<()> {
        self.backbone.validate()?;
        if self.n_classes < 2 {
            return Err(ModelError::InvalidConfig(format!(
                "n_classes must be at least 2, got {}",
                self.n_classes
            )));
        }
        if self.hidden == 0 {
            return Err(ModelError::InvalidConfig("hidden must be > 0".to_string()));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ModelError::InvalidConfig(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        Ok(())
    }

    /// Initialize the model with fresh weights.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<SeverityClassifier<B>> {
        self.validate()?;
        Ok(SeverityClassifier::new(self, Backbone::new(&self.backbone, device), device))
    }

    /// Initialize the model around a backbone whose weights are read from
    /// `path` (a record of [`Backbone`]; see [`crate::record_path`] for how the
    /// extension is resolved).
    pub fn init_pretrained<B: Backend>(
        &self,
        path: impl AsRef<Path>,
        device: &B::Device,
    ) -> Result<SeverityClassifier<B>> {
        self.validate()?;
        let path = path.as_ref();
        let backbone = Backbone::new(&self.backbone, device).load_checkpoint(path, device)?;
        tracing::info!("Loaded backbone weights from {}", path.display());
        Ok(SeverityClassifier::new(self, backbone, device))
    }
}

/// Image classifier predicting a severity class from a brain scan.
///
/// Architecture:
/// - [`Backbone`] (stages `stage1`..`stageN`)
/// - Global average pooling (`global_pool`)
/// - Linear(out_channels, hidden) -> ReLU -> Dropout
/// - Linear(hidden, n_classes)
///
/// The dropout is applied by [`ImageClassifier::forward`] only; the
/// introspection path used for explanations runs the head without it, so
/// attributions are deterministic.
///
/// # Example
///
/// ```rust,ignore
/// use cogcam_models::ClassifierConfig;
///
/// let model = ClassifierConfig::new(4).init::<NdArray>(&device)?.freeze_backbone();
/// let logits = model.forward(images); // [batch, 4]
/// ```
#[derive(Module, Debug)]
pub struct SeverityClassifier<B: Backend> {
    backbone: Backbone<B>,
    pool: AdaptiveAvgPool2d,
    hidden: Linear<B>,
    dropout: Dropout,
    fc: Linear<B>,
}

impl<B: Backend> SeverityClassifier<B> {
    fn new(config: &ClassifierConfig, backbone: Backbone<B>, device: &B::Device) -> Self {
        Self {
            backbone,
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            hidden: LinearConfig::new(config.backbone.out_channels(), config.hidden).init(device),
            dropout: DropoutConfig::new(config.dropout).init(),
            fc: LinearConfig::new(config.hidden, config.n_classes).init(device),
        }
    }

    /// The feature extractor.
    pub fn backbone(&self) -> &Backbone<B> {
        &self.backbone
    }

    /// Exclude the backbone parameters from gradient tracking.
    ///
    /// The optimizer then only updates the head. Gradients still flow
    /// through the backbone to its inputs and intermediate outputs.
    #[must_use]
    pub fn freeze_backbone(mut self) -> Self {
        self.backbone = self.backbone.no_grad();
        self
    }

    fn global_pool(&self, features: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch, channels, _, _] = features.dims();
        self.pool.forward(features).reshape([batch, channels])
    }

    fn head(&self, pooled: Tensor<B, 2>, train: bool) -> Tensor<B, 2> {
        let x = relu(self.hidden.forward(pooled));
        let x = if train { self.dropout.forward(x) } else { x };
        self.fc.forward(x)
    }

    fn stage_index(&self, layer: FeatureLayer) -> cogcam_core::Result<usize> {
        match layer {
            FeatureLayer::Stage(n) if (1..=self.backbone.n_stages()).contains(&n) => Ok(n),
            other => Err(CoreError::LayerNotFound(other.to_string())),
        }
    }
}

impl<B: Backend> ImageClassifier<B> for SeverityClassifier<B> {
    fn n_classes(&self) -> usize {
        self.fc.weight.val().dims()[1]
    }

    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let features = self.backbone.forward(images);
        self.head(self.global_pool(features), true)
    }
}

impl<B: Backend> FeatureIntrospection<B> for SeverityClassifier<B> {
    type Layer = FeatureLayer;

    fn layers(&self) -> Vec<FeatureLayer> {
        (1..=self.backbone.n_stages())
            .map(FeatureLayer::Stage)
            .chain(std::iter::once(FeatureLayer::GlobalPool))
            .collect()
    }

    fn intermediate_output(
        &self,
        images: Tensor<B, 4>,
        layer: FeatureLayer,
    ) -> cogcam_core::Result<LayerOutput<B>> {
        match layer {
            FeatureLayer::GlobalPool => Ok(LayerOutput::Pooled(
                self.global_pool(self.backbone.forward(images)),
            )),
            stage => {
                let n = self.stage_index(stage)?;
                Ok(LayerOutput::Spatial(self.backbone.forward_stages(images, 0..n)))
            }
        }
    }

    fn forward_from(
        &self,
        layer: FeatureLayer,
        features: Tensor<B, 4>,
    ) -> cogcam_core::Result<Tensor<B, 2>> {
        if layer == FeatureLayer::GlobalPool {
            return Err(CoreError::DimensionError {
                layer: layer.to_string(),
                expected: 3,
                got: 1,
            });
        }
        let n = self.stage_index(layer)?;
        let last = self
            .backbone
            .forward_stages(features, n..self.backbone.n_stages());
        Ok(self.head(self.global_pool(last), false))
    }
}
