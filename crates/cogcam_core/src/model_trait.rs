//! Model traits for classification and layer introspection.
//!
//! [`ImageClassifier`] is what the trainer needs. [`FeatureIntrospection`]
//! exposes the backbone's stages through a typed layer identifier, and
//! [`GradientIntrospection`] builds on it to produce the feature map and the
//! class-score gradient of one stage from a single forward pass.

use std::fmt;

use burn::prelude::*;
use burn::tensor::activation::softmax;
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

use crate::capture::LayerCapture;
use crate::error::{CoreError, Result};

/// Image classification model producing one logit per class.
pub trait ImageClassifier<B: Backend>: Module<B> {
    /// Number of classes predicted.
    fn n_classes(&self) -> usize;

    /// Forward pass returning logits.
    ///
    /// # Arguments
    ///
    /// * `images` - Input tensor of shape (batch, channels, height, width)
    ///
    /// # Returns
    ///
    /// Logits tensor of shape (batch, n_classes)
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2>;

    /// Forward pass returning class probabilities.
    fn forward_probs(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(images), 1)
    }
}

/// Output of one named layer for a batch of images.
#[derive(Debug, Clone)]
pub enum LayerOutput<B: Backend> {
    /// Spatially resolved feature map (batch, channels, height, width).
    Spatial(Tensor<B, 4>),
    /// Spatially pooled vector (batch, channels).
    Pooled(Tensor<B, 2>),
}

impl<B: Backend> LayerOutput<B> {
    /// Number of dimensions per example (3 for spatial maps, 1 for pooled).
    #[must_use]
    pub fn rank_per_example(&self) -> usize {
        match self {
            LayerOutput::Spatial(_) => 3,
            LayerOutput::Pooled(_) => 1,
        }
    }
}

/// Which scalar is differentiated when attributing a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreKind {
    /// Softmax probability of the class (the classifier's output).
    #[default]
    Probability,
    /// Pre-softmax logit of the class.
    Logit,
}

/// Classifier whose internal layers can be addressed by a typed identifier.
pub trait FeatureIntrospection<B: Backend>: ImageClassifier<B> {
    /// Layer identifier; `Display` yields the canonical layer name.
    type Layer: Copy + fmt::Debug + fmt::Display + PartialEq;

    /// All layers that can be queried, input side first.
    fn layers(&self) -> Vec<Self::Layer>;

    /// Resolve a layer by its canonical name.
    fn layer(&self, name: &str) -> Option<Self::Layer> {
        self.layers()
            .into_iter()
            .find(|layer| layer.to_string() == name)
    }

    /// Run the model up to and including `layer`.
    fn intermediate_output(&self, images: Tensor<B, 4>, layer: Self::Layer)
        -> Result<LayerOutput<B>>;

    /// Continue a forward pass from the spatial output of `layer` to logits.
    fn forward_from(&self, layer: Self::Layer, features: Tensor<B, 4>) -> Result<Tensor<B, 2>>;
}

/// Gradient of a class score with respect to an intermediate feature map.
///
/// Implemented for every [`FeatureIntrospection`] model on an autodiff
/// backend.
pub trait GradientIntrospection<B: AutodiffBackend>: FeatureIntrospection<B> {
    /// Run one forward pass from `image` through `layer` to the class scores,
    /// back-propagate the score of `target`, and return the layer's feature
    /// map together with its gradient, both without the batch axis.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidShape`] if `image` is not a batch of one
    /// - [`CoreError::InvalidTarget`] if `target >= n_classes`
    /// - [`CoreError::DimensionError`] if `layer` is not spatial
    /// - [`CoreError::LayerNotFound`] if the model rejects `layer`
    fn forward_with_gradient(
        &self,
        image: Tensor<B, 4>,
        target: usize,
        layer: Self::Layer,
        score: ScoreKind,
    ) -> Result<LayerCapture<B::InnerBackend>>;
}

impl<B, M> GradientIntrospection<B> for M
where
    B: AutodiffBackend,
    M: FeatureIntrospection<B>,
{
    fn forward_with_gradient(
        &self,
        image: Tensor<B, 4>,
        target: usize,
        layer: Self::Layer,
        score: ScoreKind,
    ) -> Result<LayerCapture<B::InnerBackend>> {
        let [batch, channels, height, width] = image.dims();
        if batch != 1 {
            return Err(CoreError::InvalidShape {
                expected: "(1, channels, height, width)".to_string(),
                got: format!("({batch}, {channels}, {height}, {width})"),
            });
        }
        let n_classes = self.n_classes();
        if target >= n_classes {
            return Err(CoreError::InvalidTarget { target, n_classes });
        }

        let features = match self.intermediate_output(image, layer)? {
            LayerOutput::Spatial(features) => features,
            pooled @ LayerOutput::Pooled(_) => {
                return Err(CoreError::DimensionError {
                    layer: layer.to_string(),
                    expected: 3,
                    got: pooled.rank_per_example(),
                })
            }
        };

        // The stage output becomes a leaf so its gradient is retained; the
        // rest of the pass runs from this exact tensor.
        let features = features.detach().require_grad();
        let logits = self.forward_from(layer, features.clone())?;
        let scores = match score {
            ScoreKind::Logit => logits,
            ScoreKind::Probability => softmax(logits, 1),
        };

        let class_score = scores.clone().slice([0..1, target..target + 1]).sum();
        let grads = class_score.backward();
        let gradient = features
            .grad(&grads)
            .ok_or_else(|| CoreError::MissingGradient(layer.to_string()))?;

        LayerCapture::new(
            layer.to_string(),
            target,
            features.inner().squeeze::<3>(0),
            gradient.squeeze::<3>(0),
            scores.inner().squeeze::<1>(0),
        )
    }
}
