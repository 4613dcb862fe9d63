//! Gradient-weighted class activation mapping.
//!
//! The engine never computes gradients itself: the model produces a
//! [`LayerCapture`] (feature map plus the gradient of one class score from a
//! single forward pass) and the functions here reduce it to a 2-D importance
//! surface:
//!
//! ```text
//! weights[c]  = mean over (h, w) of gradient[c, h, w]
//! surface     = sum over c of weights[c] * feature_map[c, :, :]
//! ```
//!
//! The surface is returned raw: negative values (evidence against the class)
//! are kept and removed later by [`rectify`](crate::heatmap::rectify).

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use ndarray::Array2;

use crate::error::{ExplainError, Result};
use cogcam_core::{FeatureIntrospection, GradientIntrospection, LayerCapture, ScoreKind};

/// Spatial mean of the gradient per channel.
///
/// `(channels, height, width) -> (channels,)`
pub fn channel_weights<B: Backend>(gradient: Tensor<B, 3>) -> Tensor<B, 1> {
    let [channels, _, _] = gradient.dims();
    gradient.mean_dim(2).mean_dim(1).reshape([channels])
}

/// Channel-weighted sum of a feature map.
///
/// `(channels, height, width) x (channels,) -> (height, width)`
///
/// # Errors
///
/// Returns [`ExplainError::InvalidInput`] if the weight count differs from
/// the channel count.
pub fn weighted_fusion<B: Backend>(
    feature_map: Tensor<B, 3>,
    weights: Tensor<B, 1>,
) -> Result<Tensor<B, 2>> {
    let [channels, height, width] = feature_map.dims();
    let [n_weights] = weights.dims();
    if n_weights != channels {
        return Err(ExplainError::InvalidInput(format!(
            "{n_weights} channel weights for a feature map with {channels} channels"
        )));
    }
    let weighted = feature_map * weights.reshape([channels, 1, 1]);
    Ok(weighted.sum_dim(0).reshape([height, width]))
}

/// Raw Grad-CAM surface of a capture, at the feature map's resolution.
pub fn grad_cam<B: Backend>(capture: &LayerCapture<B>) -> Result<Tensor<B, 2>> {
    let weights = channel_weights(capture.gradient().clone());
    weighted_fusion(capture.feature_map().clone(), weights)
}

/// Copy a 2-D tensor into a host array.
pub fn surface_to_array<B: Backend>(surface: Tensor<B, 2>) -> Result<Array2<f32>> {
    let [height, width] = surface.dims();
    let values = surface
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| ExplainError::Readback(format!("{e:?}")))?;
    Array2::from_shape_vec((height, width), values)
        .map_err(|e| ExplainError::InvalidInput(e.to_string()))
}

/// Raw importance surface for one image, class and layer.
#[derive(Debug, Clone)]
pub struct Attribution {
    /// Canonical name of the attributed layer.
    pub layer: String,
    /// Class whose score was differentiated.
    pub target_class: usize,
    /// Raw surface `(height, width)` at the layer's resolution.
    pub surface: Array2<f32>,
    /// Class scores of the same forward pass.
    pub scores: Vec<f32>,
}

impl Attribution {
    /// Class with the highest score.
    #[must_use]
    pub fn predicted_class(&self) -> usize {
        self.scores
            .iter()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (i, &s)| if s > best.1 { (i, s) } else { best })
            .0
    }
}

/// Look up a layer by name.
///
/// # Errors
///
/// Returns [`ExplainError::LayerNotFound`] listing the valid names.
pub fn resolve_layer<B, M>(model: &M, name: &str) -> Result<M::Layer>
where
    B: Backend,
    M: FeatureIntrospection<B>,
{
    model.layer(name).ok_or_else(|| ExplainError::LayerNotFound {
        layer: name.to_string(),
        available: model.layers().iter().map(ToString::to_string).collect(),
    })
}

/// Grad-CAM of `target` at a typed layer.
///
/// # Errors
///
/// Same as [`attribute`]; a layer the model does not list is
/// [`ExplainError::LayerNotFound`].
pub fn attribute_layer<B, M>(
    model: &M,
    image: Tensor<B, 4>,
    target: usize,
    layer: M::Layer,
    score: ScoreKind,
) -> Result<Attribution>
where
    B: AutodiffBackend,
    M: GradientIntrospection<B>,
{
    let layers = model.layers();
    if !layers.contains(&layer) {
        return Err(ExplainError::LayerNotFound {
            layer: layer.to_string(),
            available: layers.iter().map(ToString::to_string).collect(),
        });
    }
    let capture = model.forward_with_gradient(image, target, layer, score)?;
    tracing::debug!(
        "Captured {} feature map {:?} for class {}",
        capture.layer(),
        capture.feature_map().dims(),
        target
    );

    let surface = surface_to_array(grad_cam(&capture)?)?;
    let scores = capture
        .scores()
        .clone()
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| ExplainError::Readback(format!("{e:?}")))?;

    Ok(Attribution {
        layer: capture.layer().to_string(),
        target_class: capture.target_class(),
        surface,
        scores,
    })
}

/// Grad-CAM of `target` at the layer called `layer`.
///
/// `image` must be a preprocessed batch of one `(1, C, H, W)`. The model is
/// only borrowed; no state survives the call.
///
/// # Errors
///
/// - [`ExplainError::LayerNotFound`] if no layer has that name
/// - [`ExplainError::ShapeMismatch`] if the layer output is not spatial
/// - [`ExplainError::InvalidTarget`] if `target` is not a class index
/// - [`ExplainError::InvalidInput`] if the batch size is not 1
pub fn attribute<B, M>(
    model: &M,
    image: Tensor<B, 4>,
    target: usize,
    layer: &str,
    score: ScoreKind,
) -> Result<Attribution>
where
    B: AutodiffBackend,
    M: GradientIntrospection<B>,
{
    let layer = resolve_layer(model, layer)?;
    attribute_layer(model, image, target, layer, score)
}
