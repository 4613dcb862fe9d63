//! Explaining single images end to end.

use std::path::{Path, PathBuf};

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use image::RgbImage;

use crate::attribution::{attribute_layer, resolve_layer, Attribution};
use crate::error::{ExplainError, Result};
use crate::heatmap::{render, save_explanation, Composite, RenderConfig};
use cogcam_core::{ExplainSettings, GradientIntrospection, LayerOutput, ScoreKind};
use cogcam_data::{image_tensor, load_rgb, preprocess};

/// Grad-CAM explanation of one image.
#[derive(Debug, Clone)]
pub struct Explanation {
    /// Source file, if the image came from disk.
    pub source: Option<PathBuf>,
    /// Class the model predicts.
    pub predicted_class: usize,
    /// Raw attribution for the explained class.
    pub attribution: Attribution,
    /// Rendered overlay at the image's native resolution.
    pub composite: Composite,
}

impl Explanation {
    /// Class whose evidence is shown.
    #[must_use]
    pub fn target_class(&self) -> usize {
        self.attribution.target_class
    }

    /// Write the overlay and heatmap PNGs into `dir`.
    pub fn save(&self, dir: impl AsRef<Path>, stem: &str) -> Result<(PathBuf, PathBuf)> {
        save_explanation(&self.composite, dir, stem)
    }
}

/// Produces Grad-CAM overlays from one model and layer.
///
/// The layer is resolved once; every call then borrows the model
/// read-only.
pub struct Explainer<'a, B: AutodiffBackend, M: GradientIntrospection<B>> {
    model: &'a M,
    layer: M::Layer,
    score: ScoreKind,
    render: RenderConfig,
    image_size: usize,
    device: B::Device,
}

impl<'a, B, M> Explainer<'a, B, M>
where
    B: AutodiffBackend,
    M: GradientIntrospection<B>,
{
    /// Create an explainer for the layer named in `settings`.
    ///
    /// # Errors
    ///
    /// Fails with [`ExplainError::LayerNotFound`] for an unknown layer, or
    /// [`ExplainError::InvalidInput`] for an unknown colormap.
    pub fn new(
        model: &'a M,
        settings: &ExplainSettings,
        image_size: usize,
        device: &B::Device,
    ) -> Result<Self> {
        if image_size == 0 {
            return Err(ExplainError::InvalidInput("image size must be > 0".to_string()));
        }
        Ok(Self {
            model,
            layer: resolve_layer(model, &settings.layer)?,
            score: settings.score,
            render: RenderConfig::from_settings(settings)?,
            image_size,
            device: device.clone(),
        })
    }

    /// Name of the attributed layer.
    #[must_use]
    pub fn layer_name(&self) -> String {
        self.layer.to_string()
    }

    /// Predicted class of a preprocessed batch of one.
    ///
    /// Runs through the attributed layer so the result agrees with the
    /// scores of [`Explainer::explain_rgb`].
    pub fn predict(&self, image: Tensor<B, 4>) -> Result<usize> {
        let logits = match self.model.intermediate_output(image, self.layer)? {
            LayerOutput::Spatial(features) => self.model.forward_from(self.layer, features)?,
            LayerOutput::Pooled(_) => {
                return Err(ExplainError::ShapeMismatch {
                    layer: self.layer.to_string(),
                    rank: 1,
                })
            }
        };
        let predicted: Vec<i64> = logits
            .argmax(1)
            .into_data()
            .to_vec()
            .map_err(|e| ExplainError::Readback(format!("{e:?}")))?;
        predicted
            .first()
            .map(|&p| p as usize)
            .ok_or_else(|| ExplainError::InvalidInput("empty batch".to_string()))
    }

    /// Explain an RGB image at its native resolution.
    ///
    /// Without a `target` the predicted class is explained.
    pub fn explain_rgb(&self, image: &RgbImage, target: Option<usize>) -> Result<Explanation> {
        let input = image_tensor::<B>(&preprocess(image, self.image_size), &self.device);
        let predicted_class = self.predict(input.clone())?;
        let target = target.unwrap_or(predicted_class);

        let attribution = attribute_layer(self.model, input, target, self.layer, self.score)?;
        let composite = render(&attribution.surface, image, &self.render)?;

        Ok(Explanation {
            source: None,
            predicted_class,
            attribution,
            composite,
        })
    }

    /// Load an image file and explain it.
    pub fn explain_path(&self, path: impl AsRef<Path>, target: Option<usize>) -> Result<Explanation> {
        let path = path.as_ref();
        let image = load_rgb(path)?;
        let mut explanation = self.explain_rgb(&image, target)?;
        explanation.source = Some(path.to_path_buf());
        tracing::info!(
            "Explained {} at {}: predicted {}, target {}{}",
            path.display(),
            explanation.attribution.layer,
            explanation.predicted_class,
            explanation.target_class(),
            if explanation.composite.degenerate { " (no positive evidence)" } else { "" }
        );
        Ok(explanation)
    }
}

/// Explain one image file with a fresh [`Explainer`].
pub fn explain_image<B, M>(
    model: &M,
    path: impl AsRef<Path>,
    target: Option<usize>,
    settings: &ExplainSettings,
    image_size: usize,
    device: &B::Device,
) -> Result<Explanation>
where
    B: AutodiffBackend,
    M: GradientIntrospection<B>,
{
    Explainer::new(model, settings, image_size, device)?.explain_path(path, target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_autodiff::Autodiff;
    use cogcam_core::backend::NdArray;
    use cogcam_models::{BackboneConfig, ClassifierConfig, SeverityClassifier};
    use image::Rgb;

    type AdBackend = Autodiff<NdArray>;

    fn tiny_model(device: &<AdBackend as Backend>::Device) -> SeverityClassifier<AdBackend> {
        ClassifierConfig::new(4)
            .with_backbone(BackboneConfig::new(vec![4, 8]).with_convs_per_stage(1))
            .with_hidden(8)
            .init(device)
            .unwrap()
            .freeze_backbone()
    }

    fn settings(layer: &str) -> ExplainSettings {
        ExplainSettings {
            layer: layer.to_string(),
            ..ExplainSettings::default()
        }
    }

    fn scene() -> RgbImage {
        RgbImage::from_fn(40, 30, |x, y| {
            if (10..20).contains(&x) && (10..20).contains(&y) {
                Rgb([250, 240, 230])
            } else {
                Rgb([20, 30, (x * 3) as u8])
            }
        })
    }

    #[test]
    fn test_explain_rgb_native_resolution() {
        let device = Default::default();
        let model = tiny_model(&device);
        let explainer = Explainer::new(&model, &settings("stage2"), 16, &device).unwrap();
        assert_eq!(explainer.layer_name(), "stage2");

        let explanation = explainer.explain_rgb(&scene(), None).unwrap();
        assert_eq!(explanation.target_class(), explanation.predicted_class);
        assert_eq!(explanation.attribution.predicted_class(), explanation.predicted_class);
        assert_eq!(explanation.attribution.surface.dim(), (8, 8));
        assert_eq!(explanation.composite.image.dimensions(), (40, 30));
        assert_eq!(explanation.composite.normalized.dim(), (30, 40));

        let forced = explainer.explain_rgb(&scene(), Some(3)).unwrap();
        assert_eq!(forced.target_class(), 3);
        assert_eq!(forced.predicted_class, explanation.predicted_class);
    }

    #[test]
    fn test_explain_path_and_save() {
        let device = Default::default();
        let model = tiny_model(&device);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.png");
        scene().save(&path).unwrap();

        let explanation = explain_image(&model, &path, Some(1), &settings("stage1"), 16, &device).unwrap();
        assert_eq!(explanation.source.as_deref(), Some(path.as_path()));
        assert_eq!(explanation.attribution.surface.dim(), (16, 16));

        let (overlay, heatmap) = explanation.save(dir.path().join("out"), "scan").unwrap();
        assert!(overlay.exists() && heatmap.exists());
    }

    #[test]
    fn test_explainer_rejects_bad_settings() {
        let device = Default::default();
        let model = tiny_model(&device);
        assert!(matches!(
            Explainer::new(&model, &settings("stage9"), 16, &device),
            Err(ExplainError::LayerNotFound { .. })
        ));

        let bad_colormap = ExplainSettings {
            colormap: "plasma".to_string(),
            ..settings("stage1")
        };
        assert!(Explainer::new(&model, &bad_colormap, 16, &device).is_err());

        let explainer = Explainer::new(&model, &settings("stage2"), 16, &device).unwrap();
        assert!(matches!(
            explainer.explain_rgb(&scene(), Some(7)),
            Err(ExplainError::InvalidTarget { target: 7, .. })
        ));
        assert!(matches!(
            explainer.explain_path("/nonexistent/scan.png", None),
            Err(ExplainError::Data(_))
        ));
    }
}
