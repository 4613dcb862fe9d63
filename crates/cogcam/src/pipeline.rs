//! End-to-end experiment: scan, split, train, report, save, explain.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use burn::module::AutodiffModule;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

use crate::error::{PipelineError, Result};
use cogcam_analysis::{
    classification_report, plot_confusion_matrix, plot_training_curves, ClassificationReport,
    CurvePair,
};
use cogcam_core::{ExperimentConfig, ExplainSettings};
use cogcam_data::{train_valid_test_split, ImageDataLoaders, ImageDataset, ImageFolder};
use cogcam_explain::{explain_image, Explainer, Explanation};
use cogcam_models::{load_classifier, save_classifier, ClassifierConfig, ModelMetadata};
use cogcam_train::{
    evaluate_classification, ClassificationTrainer, ClassificationTrainerConfig, StopSignal,
    TrainingHistory,
};

/// Experiment configuration as run.
pub const CONFIG_FILE: &str = "config.json";
/// Per-epoch metrics.
pub const HISTORY_FILE: &str = "history.json";
/// Test report as JSON.
pub const REPORT_JSON_FILE: &str = "report.json";
/// Test report as a text table.
pub const REPORT_TEXT_FILE: &str = "report.txt";
/// Accuracy and loss curves.
pub const CURVES_FILE: &str = "training_curves.png";
/// Confusion matrix heatmap.
pub const CONFUSION_FILE: &str = "confusion_matrix.png";
/// Sub-directory of the Grad-CAM overlays.
pub const EXPLANATIONS_DIR: &str = "explanations";

/// What an experiment produced.
#[derive(Debug, Clone)]
pub struct ExperimentSummary {
    /// Directory holding every artefact.
    pub output_dir: PathBuf,
    /// Partition sizes `(train, valid, test)`.
    pub split_sizes: (usize, usize, usize),
    /// Per-epoch metrics.
    pub history: TrainingHistory,
    /// Epoch of the retained weights (1-based).
    pub best_epoch: Option<usize>,
    /// Validation accuracy of the retained weights.
    pub best_valid_acc: f32,
    /// Training stopped on request.
    pub interrupted: bool,
    /// Backbone parameters were kept out of the optimiser.
    pub backbone_frozen: bool,
    /// Report on the test partition.
    pub report: ClassificationReport,
    /// Overlay PNGs written for test images.
    pub explanations: Vec<PathBuf>,
}

/// Pick up to `count` indices, cycling through the classes so each class
/// is represented before any repeats.
#[must_use]
pub fn select_samples(labels: &[usize], n_classes: usize, count: usize) -> Vec<usize> {
    let mut per_class: Vec<VecDeque<usize>> = vec![VecDeque::new(); n_classes];
    for (index, &label) in labels.iter().enumerate() {
        if let Some(queue) = per_class.get_mut(label) {
            queue.push_back(index);
        }
    }

    let mut selected = Vec::with_capacity(count);
    while selected.len() < count {
        let before = selected.len();
        for queue in &mut per_class {
            if selected.len() == count {
                break;
            }
            if let Some(index) = queue.pop_front() {
                selected.push(index);
            }
        }
        if selected.len() == before {
            break;
        }
    }
    selected
}

/// One full training run configured by an [`ExperimentConfig`].
///
/// # Example
///
/// ```rust,ignore
/// use cogcam::pipeline::Experiment;
///
/// let summary = Experiment::new(config).run::<Autodiff<NdArray>>(&device)?;
/// println!("{}", summary.report.to_string_table());
/// ```
#[derive(Debug, Clone)]
pub struct Experiment {
    config: ExperimentConfig,
    model_config: ClassifierConfig,
    stop: StopSignal,
}

impl Experiment {
    /// Experiment with the default classifier for the configured classes.
    #[must_use]
    pub fn new(config: ExperimentConfig) -> Self {
        let model_config = ClassifierConfig::new(config.n_classes());
        Self {
            config,
            model_config,
            stop: StopSignal::new(),
        }
    }

    /// Use a different classifier architecture.
    #[must_use]
    pub fn with_model_config(mut self, model_config: ClassifierConfig) -> Self {
        self.model_config = model_config;
        self
    }

    /// Stop training early when `stop` is raised.
    #[must_use]
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// The experiment configuration.
    #[must_use]
    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Whether the backbone stays frozen during training.
    ///
    /// Freezing only applies to pretrained weights; a freshly initialised
    /// backbone is always trained.
    #[must_use]
    pub fn freezes_backbone(&self) -> bool {
        self.config.freeze_backbone && self.config.backbone_weights.is_some()
    }

    fn validate(&self) -> Result<()> {
        self.config.validate()?;
        self.model_config.validate()?;
        if self.model_config.n_classes != self.config.n_classes() {
            return Err(PipelineError::Configuration(format!(
                "classifier predicts {} classes but {} class names are declared",
                self.model_config.n_classes,
                self.config.n_classes()
            )));
        }
        let min_size = self.model_config.backbone.min_input_size();
        if self.config.image_size < min_size {
            return Err(PipelineError::Configuration(format!(
                "image_size {} is below the backbone minimum of {}",
                self.config.image_size, min_size
            )));
        }
        Ok(())
    }

    /// Run every stage and write the artefacts into the output directory.
    pub fn run<B: AutodiffBackend>(&self, device: &B::Device) -> Result<ExperimentSummary> {
        self.validate()?;
        let config = &self.config;
        let out = config.output_dir.as_path();
        std::fs::create_dir_all(out)?;
        config.save(out.join(CONFIG_FILE))?;
        B::seed(config.seed.value());

        let folder = ImageFolder::scan(&config.dataset_dir, &config.class_names)?;
        tracing::info!(
            "Found {} images in {} ({:?} per class)",
            folder.len(),
            folder.root().display(),
            folder.class_counts()
        );
        let dataset = ImageDataset::load(&folder, config.image_size)?;
        let splits = train_valid_test_split(&dataset, config.test_ratio, config.valid_ratio, config.seed)?;
        let split_sizes = splits.sizes();

        let dls = ImageDataLoaders::builder(splits.train, splits.valid)
            .batch_size(config.batch_size)
            .shuffle_train(true)
            .seed(config.seed)
            .build()?;

        let mut model = match &config.backbone_weights {
            Some(path) => self.model_config.init_pretrained::<B>(path, device)?,
            None => self.model_config.init::<B>(device)?,
        };
        let backbone_frozen = self.freezes_backbone();
        if backbone_frozen {
            model = model.freeze_backbone();
        } else if config.freeze_backbone {
            tracing::warn!(
                "freeze_backbone is set but no backbone_weights are configured; training the randomly initialised backbone"
            );
        }

        let trainer = ClassificationTrainer::<B>::new(
            ClassificationTrainerConfig::from_experiment(config),
            device.clone(),
        )
        .with_stop_signal(self.stop.clone());
        let output = trainer.fit(model, &dls)?;
        if output.interrupted {
            tracing::warn!("Training interrupted; continuing with the best weights so far");
        }
        output.history.save(out.join(HISTORY_FILE))?;

        let model = output.model;
        let inference = model.valid();
        let evaluation = evaluate_classification(&inference, &splits.test, config.batch_size, device)?;
        let report = classification_report(&evaluation.predictions, &evaluation.targets, &config.class_names)?;
        report.save_json(out.join(REPORT_JSON_FILE))?;
        report.save_text(out.join(REPORT_TEXT_FILE))?;
        tracing::info!(
            "Test accuracy {:.2}%, balanced accuracy {:.2}%",
            report.accuracy * 100.0,
            report.balanced_accuracy * 100.0
        );

        plot_confusion_matrix(out.join(CONFUSION_FILE), &report.confusion)?;
        if output.history.is_empty() {
            tracing::warn!("No completed epochs; skipping {}", CURVES_FILE);
        } else {
            let (train_accs, valid_accs) = (output.history.train_accs(), output.history.valid_accs());
            let (train_losses, valid_losses) =
                (output.history.train_losses(), output.history.valid_losses());
            plot_training_curves(
                out.join(CURVES_FILE),
                CurvePair { train: &train_accs, valid: &valid_accs },
                CurvePair { train: &train_losses, valid: &valid_losses },
            )?;
        }

        let mut metadata = ModelMetadata::new(
            self.model_config.clone(),
            config.class_names.clone(),
            config.image_size,
        )
        .with_extra("seed", config.seed.value().to_string());
        if let Some(epoch) = output.best_epoch {
            metadata = metadata
                .with_epoch(epoch)
                .with_val_acc(output.best_valid_acc)
                .with_val_loss(output.best_valid_loss);
        }
        save_classifier(&inference, &metadata, out)?;

        let explanations = self.explain_test_images(&model, &splits.test, device)?;

        Ok(ExperimentSummary {
            output_dir: out.to_path_buf(),
            split_sizes,
            history: output.history,
            best_epoch: output.best_epoch,
            best_valid_acc: output.best_valid_acc,
            interrupted: output.interrupted,
            backbone_frozen,
            report,
            explanations,
        })
    }

    fn explain_test_images<B, M>(
        &self,
        model: &M,
        test: &ImageDataset,
        device: &B::Device,
    ) -> Result<Vec<PathBuf>>
    where
        B: AutodiffBackend,
        M: cogcam_core::GradientIntrospection<B>,
    {
        let settings = &self.config.explain;
        if settings.samples == 0 {
            return Ok(Vec::new());
        }
        let explainer = Explainer::new(model, settings, self.config.image_size, device)?;
        let dir = self.config.output_dir.join(EXPLANATIONS_DIR);

        let mut written = Vec::new();
        for (rank, index) in select_samples(test.labels(), test.n_classes(), settings.samples)
            .into_iter()
            .enumerate()
        {
            let path = &test.paths()[index];
            let explanation = explainer.explain_path(path, None)?;
            let stem = sample_stem(rank, &self.config.class_names[test.labels()[index]], path);
            let (overlay, _) = explanation.save(&dir, &stem)?;
            written.push(overlay);
        }
        tracing::info!("Wrote {} explanations to {}", written.len(), dir.display());
        Ok(written)
    }
}

fn sample_stem(rank: usize, class_name: &str, path: &Path) -> String {
    let file = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    format!("{rank:02}_{class_name}_{file}")
}

/// Reload a saved classifier and report on every image of a directory.
pub fn evaluate_saved<B: Backend>(
    model_dir: impl AsRef<Path>,
    dataset_dir: impl AsRef<Path>,
    batch_size: usize,
    device: &B::Device,
) -> Result<ClassificationReport> {
    let (model, metadata) = load_classifier::<B>(model_dir, device)?;
    let folder = ImageFolder::scan(dataset_dir, &metadata.class_names)?;
    let dataset = ImageDataset::load(&folder, metadata.image_size)?;
    let result = evaluate_classification(&model, &dataset, batch_size, device)?;
    Ok(classification_report(&result.predictions, &result.targets, &metadata.class_names)?)
}

/// Reload a saved classifier and explain one image file.
///
/// Returns the explanation with the class names of the model.
pub fn explain_saved<B: AutodiffBackend>(
    model_dir: impl AsRef<Path>,
    image: impl AsRef<Path>,
    target: Option<usize>,
    settings: &ExplainSettings,
    device: &B::Device,
) -> Result<(Explanation, Vec<String>)> {
    let (model, metadata) = load_classifier::<B>(model_dir, device)?;
    let explanation = explain_image(&model, image, target, settings, metadata.image_size, device)?;
    Ok((explanation, metadata.class_names))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_samples_cycles_classes() {
        let labels = vec![0, 0, 0, 1, 2, 2];
        assert_eq!(select_samples(&labels, 3, 4), vec![0, 3, 4, 1]);
        assert_eq!(select_samples(&labels, 3, 10).len(), 6);
        assert!(select_samples(&labels, 3, 0).is_empty());
    }

    #[test]
    fn test_sample_stem() {
        let stem = sample_stem(3, "MildDemented", Path::new("/data/mild/scan_17.jpg"));
        assert_eq!(stem, "03_MildDemented_scan_17");
    }

    #[test]
    fn test_backbone_frozen_only_with_pretrained_weights() {
        let random = Experiment::new(ExperimentConfig::default());
        assert!(random.config().freeze_backbone);
        assert!(!random.freezes_backbone());

        let pretrained = Experiment::new(ExperimentConfig {
            backbone_weights: Some(PathBuf::from("weights/backbone.mpk")),
            ..ExperimentConfig::default()
        });
        assert!(pretrained.freezes_backbone());

        let unfrozen = Experiment::new(ExperimentConfig {
            backbone_weights: Some(PathBuf::from("weights/backbone.mpk")),
            freeze_backbone: false,
            ..ExperimentConfig::default()
        });
        assert!(!unfrozen.freezes_backbone());
    }

    #[test]
    fn test_class_count_must_match_model() {
        let experiment = Experiment::new(ExperimentConfig::default())
            .with_model_config(ClassifierConfig::new(3));
        assert!(matches!(experiment.validate(), Err(PipelineError::Configuration(_))));
    }
}
