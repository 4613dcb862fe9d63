//! Feature map and gradient captured from a single forward pass.

use burn::prelude::*;

use crate::error::{CoreError, Result};

/// Feature map of one layer plus the gradient of one class score with
/// respect to it, for a single image.
///
/// Only [`GradientIntrospection::forward_with_gradient`] constructs a
/// capture, so the feature map, the gradient and the scores always come
/// from the same forward pass.
///
/// Tensors are laid out `(channels, height, width)`.
///
/// [`GradientIntrospection::forward_with_gradient`]: crate::GradientIntrospection::forward_with_gradient
#[derive(Debug, Clone)]
pub struct LayerCapture<B: Backend> {
    layer: String,
    target_class: usize,
    feature_map: Tensor<B, 3>,
    gradient: Tensor<B, 3>,
    scores: Tensor<B, 1>,
}

impl<B: Backend> LayerCapture<B> {
    pub(crate) fn new(
        layer: String,
        target_class: usize,
        feature_map: Tensor<B, 3>,
        gradient: Tensor<B, 3>,
        scores: Tensor<B, 1>,
    ) -> Result<Self> {
        if feature_map.dims() != gradient.dims() {
            return Err(CoreError::ShapeMismatch(format!(
                "feature map {:?} and gradient {:?} of layer '{}'",
                feature_map.dims(),
                gradient.dims(),
                layer
            )));
        }
        Ok(Self {
            layer,
            target_class,
            feature_map,
            gradient,
            scores,
        })
    }

    /// Name of the captured layer.
    #[must_use]
    pub fn layer(&self) -> &str {
        &self.layer
    }

    /// Class whose score was differentiated.
    #[must_use]
    pub fn target_class(&self) -> usize {
        self.target_class
    }

    /// Feature map `(channels, height, width)`.
    #[must_use]
    pub fn feature_map(&self) -> &Tensor<B, 3> {
        &self.feature_map
    }

    /// Gradient of the target score, same shape as the feature map.
    #[must_use]
    pub fn gradient(&self) -> &Tensor<B, 3> {
        &self.gradient
    }

    /// Class score vector of the pass (probabilities or logits).
    #[must_use]
    pub fn scores(&self) -> &Tensor<B, 1> {
        &self.scores
    }

    /// Spatial size `(height, width)` of the feature map.
    #[must_use]
    pub fn spatial_dims(&self) -> (usize, usize) {
        let [_, height, width] = self.feature_map.dims();
        (height, width)
    }

    /// Consume the capture, returning `(feature_map, gradient)`.
    #[must_use]
    pub fn into_parts(self) -> (Tensor<B, 3>, Tensor<B, 3>) {
        (self.feature_map, self.gradient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NdArray;

    #[test]
    fn test_mismatched_gradient_rejected() {
        let device = Default::default();
        let features = Tensor::<NdArray, 3>::zeros([4, 8, 8], &device);
        let gradient = Tensor::<NdArray, 3>::zeros([4, 4, 4], &device);
        let scores = Tensor::<NdArray, 1>::zeros([2], &device);

        let result = LayerCapture::new("stage2".to_string(), 0, features, gradient, scores);
        assert!(matches!(result, Err(CoreError::ShapeMismatch(_))));
    }

    #[test]
    fn test_capture_accessors() {
        let device = Default::default();
        let features = Tensor::<NdArray, 3>::ones([4, 6, 5], &device);
        let gradient = Tensor::<NdArray, 3>::ones([4, 6, 5], &device);
        let scores = Tensor::<NdArray, 1>::zeros([3], &device);

        let capture =
            LayerCapture::new("stage3".to_string(), 2, features, gradient, scores).unwrap();
        assert_eq!(capture.layer(), "stage3");
        assert_eq!(capture.target_class(), 2);
        assert_eq!(capture.spatial_dims(), (6, 5));
    }
}
