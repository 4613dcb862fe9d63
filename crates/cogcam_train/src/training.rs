//! Training loop implementation.
//!
//! Fits a classifier with Adam and cross-entropy at a constant learning
//! rate, validates after every epoch and keeps the weights of the epoch with
//! the best validation accuracy.

use std::time::Instant;

use burn::module::AutodiffModule;
use burn::nn::loss::CrossEntropyLossConfig;
use burn::optim::decay::WeightDecayConfig;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainError};
use crate::evaluation::{count_correct, evaluate_loader};
use crate::history::{EpochMetrics, TrainingHistory};
use crate::stop::StopSignal;
use cogcam_core::{ExperimentConfig, ImageClassifier};
use cogcam_data::{ImageDataLoader, ImageDataLoaders};

/// Training output with metrics and final model.
#[derive(Debug)]
pub struct TrainingOutput<M> {
    /// Weights of the best epoch (the initial model if no epoch completed).
    pub model: M,
    /// Metrics of every completed epoch.
    pub history: TrainingHistory,
    /// Best epoch (1-based), if any epoch completed.
    pub best_epoch: Option<usize>,
    /// Validation accuracy of the best epoch.
    pub best_valid_acc: f32,
    /// Validation loss of the best epoch.
    pub best_valid_loss: f32,
    /// Whether a [`StopSignal`] ended training early.
    pub interrupted: bool,
    /// Total training time in seconds.
    pub training_time_secs: f64,
}

/// Configuration for classification training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationTrainerConfig {
    /// Number of epochs.
    pub n_epochs: usize,
    /// Learning rate.
    pub lr: f64,
    /// Weight decay (0 = disabled).
    pub weight_decay: f32,
}

impl Default for ClassificationTrainerConfig {
    fn default() -> Self {
        Self {
            n_epochs: 10,
            lr: 1e-3,
            weight_decay: 0.0,
        }
    }
}

impl ClassificationTrainerConfig {
    /// Take epochs and learning rate from an experiment.
    #[must_use]
    pub fn from_experiment(config: &ExperimentConfig) -> Self {
        Self {
            n_epochs: config.epochs,
            lr: config.learning_rate,
            ..Default::default()
        }
    }

    /// Check the configuration.
    pub fn validate(&self) -> Result<()> {
        if !(self.lr > 0.0 && self.lr.is_finite()) {
            return Err(TrainError::InvalidLearningRate(format!(
                "learning rate must be positive and finite, got {}",
                self.lr
            )));
        }
        if self.n_epochs == 0 {
            return Err(TrainError::InvalidConfig("n_epochs must be > 0".to_string()));
        }
        if self.weight_decay < 0.0 {
            return Err(TrainError::InvalidConfig(format!(
                "weight_decay must be >= 0, got {}",
                self.weight_decay
            )));
        }
        Ok(())
    }
}

/// Trainer for classification models.
///
/// # Example
///
/// ```rust,ignore
/// use cogcam_train::{ClassificationTrainer, ClassificationTrainerConfig, StopSignal};
///
/// let stop = StopSignal::new();
/// let trainer = ClassificationTrainer::<Autodiff<NdArray>>::new(config, device)
///     .with_stop_signal(stop.clone());
/// let output = trainer.fit(model, &dls)?;
/// println!("best epoch: {:?}", output.best_epoch);
/// ```
pub struct ClassificationTrainer<B: AutodiffBackend> {
    config: ClassificationTrainerConfig,
    device: B::Device,
    stop: StopSignal,
}

impl<B: AutodiffBackend> ClassificationTrainer<B> {
    /// Create a new trainer.
    pub fn new(config: ClassificationTrainerConfig, device: B::Device) -> Self {
        Self {
            config,
            device,
            stop: StopSignal::new(),
        }
    }

    /// Use `stop` to end training early.
    #[must_use]
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Train `model` on the training loader, validating after every epoch.
    ///
    /// Returns the weights of the epoch with the highest validation
    /// accuracy. When the stop signal is raised the current epoch is
    /// abandoned and the best model so far is returned with
    /// `interrupted = true`.
    pub fn fit<M>(&self, model: M, dls: &ImageDataLoaders) -> Result<TrainingOutput<M>>
    where
        M: ImageClassifier<B> + AutodiffModule<B>,
        M::InnerModule: ImageClassifier<B::InnerBackend>,
    {
        self.config.validate()?;
        if model.n_classes() != dls.n_classes() {
            return Err(TrainError::ClassCountMismatch {
                model: model.n_classes(),
                data: dls.n_classes(),
            });
        }

        let start_time = Instant::now();

        let mut optimizer_config = AdamConfig::new();
        if self.config.weight_decay > 0.0 {
            optimizer_config = optimizer_config
                .with_weight_decay(Some(WeightDecayConfig::new(self.config.weight_decay)));
        }
        let mut optim = optimizer_config.init::<B, M>();

        let mut best_model = model.clone();
        let mut best: Option<EpochMetrics> = None;
        let mut history = TrainingHistory::new();
        let mut current_model = model;
        let mut interrupted = false;

        tracing::info!(
            "Training for {} epochs: {} train / {} valid images, {} batches per epoch",
            self.config.n_epochs,
            dls.train().len(),
            dls.valid().len(),
            dls.train().n_batches()
        );

        for epoch in 0..self.config.n_epochs {
            if self.stop.is_raised() {
                interrupted = true;
                break;
            }

            let Some((train_loss, train_acc)) =
                self.train_epoch(&mut current_model, &mut optim, dls.train(), epoch)?
            else {
                interrupted = true;
                break;
            };

            let inner_model = current_model.valid();
            let inner_device: <B::InnerBackend as Backend>::Device = self.device.clone().into();
            let valid = evaluate_loader(&inner_model, dls.valid(), &inner_device)?;

            let metrics = EpochMetrics {
                epoch: epoch + 1,
                train_loss,
                train_acc,
                valid_loss: valid.loss,
                valid_acc: valid.accuracy,
            };
            history.push(metrics);

            let improved = best.map_or(true, |b| metrics.valid_acc > b.valid_acc);
            if improved {
                best = Some(metrics);
                best_model = current_model.clone();
            }

            tracing::info!(
                "Epoch {:3}/{}: train_loss={:.4}, train_acc={:.2}%, valid_loss={:.4}, valid_acc={:.2}%{}",
                epoch + 1,
                self.config.n_epochs,
                train_loss,
                train_acc * 100.0,
                valid.loss,
                valid.accuracy * 100.0,
                if improved { " *" } else { "" }
            );
        }

        let training_time_secs = start_time.elapsed().as_secs_f64();
        if interrupted {
            tracing::warn!(
                "Training stopped after {} completed epochs",
                history.len()
            );
        }
        match best {
            Some(b) => tracing::info!(
                "Training finished in {:.1}s; best validation accuracy {:.2}% at epoch {}",
                training_time_secs,
                b.valid_acc * 100.0,
                b.epoch
            ),
            None => tracing::warn!("No epoch completed; returning the initial model"),
        }

        Ok(TrainingOutput {
            model: best_model,
            history,
            best_epoch: best.map(|b| b.epoch),
            best_valid_acc: best.map_or(0.0, |b| b.valid_acc),
            best_valid_loss: best.map_or(f32::NAN, |b| b.valid_loss),
            interrupted,
            training_time_secs,
        })
    }

    /// One pass over the training loader. Returns `None` if stopped.
    fn train_epoch<M, O>(
        &self,
        model: &mut M,
        optim: &mut O,
        loader: &ImageDataLoader,
        epoch: usize,
    ) -> Result<Option<(f32, f32)>>
    where
        M: ImageClassifier<B> + AutodiffModule<B>,
        O: Optimizer<M, B>,
    {
        let loss_fn = CrossEntropyLossConfig::new().init(&self.device);
        let mut total_loss = 0.0f32;
        let mut correct = 0usize;
        let mut total = 0usize;

        for batch_result in loader.iter_epoch::<B>(epoch, &self.device) {
            if self.stop.is_raised() {
                return Ok(None);
            }
            let batch = batch_result?;
            let batch_size = batch.len();

            let logits = model.forward(batch.images);
            let loss = loss_fn.forward(logits.clone(), batch.targets.clone());
            total_loss += loss.clone().into_scalar().elem::<f32>() * batch_size as f32;
            correct += count_correct(logits.detach(), batch.targets);
            total += batch_size;

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, model);
            *model = optim.step(self.config.lr, model.clone(), grads);
        }

        if total == 0 {
            return Ok(Some((0.0, 0.0)));
        }
        Ok(Some((total_loss / total as f32, correct as f32 / total as f32)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::nn::{Linear, LinearConfig};
    use burn_autodiff::Autodiff;
    use cogcam_core::backend::NdArray;
    use cogcam_core::Seed;
    use cogcam_data::ImageDataset;
    use ndarray::Array4;

    type TestBackend = Autodiff<NdArray>;

    /// Mean intensity per channel followed by a linear layer.
    #[derive(Module, Debug)]
    struct ChannelMeans<B: Backend> {
        fc: Linear<B>,
    }

    impl<B: Backend> ChannelMeans<B> {
        fn new(device: &B::Device) -> Self {
            Self {
                fc: LinearConfig::new(3, 3).init(device),
            }
        }
    }

    impl<B: Backend> ImageClassifier<B> for ChannelMeans<B> {
        fn n_classes(&self) -> usize {
            3
        }

        fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
            let [batch, channels, _, _] = images.dims();
            self.fc
                .forward(images.mean_dim(3).mean_dim(2).reshape([batch, channels]))
        }
    }

    /// Every sample lights the channel matching its label.
    fn separable(n: usize) -> ImageDataset {
        let images = Array4::<f32>::from_shape_fn((n, 3, 2, 2), |(i, c, _, _)| {
            if c == i % 3 { 1.0 } else { 0.0 }
        });
        let labels = (0..n).map(|i| i % 3).collect();
        let names = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        ImageDataset::from_arrays(images, labels, names).unwrap()
    }

    fn loaders() -> ImageDataLoaders {
        ImageDataLoaders::builder(separable(30), separable(9))
            .batch_size(8)
            .seed(Seed::new(1))
            .build()
            .unwrap()
    }

    #[test]
    fn test_fit_learns_separable_data() {
        let device: <TestBackend as Backend>::Device = Default::default();
        let config = ClassificationTrainerConfig {
            n_epochs: 40,
            lr: 0.1,
            weight_decay: 0.0,
        };
        let trainer = ClassificationTrainer::<TestBackend>::new(config, device);
        let output = trainer.fit(ChannelMeans::new(&device), &loaders()).unwrap();

        assert_eq!(output.history.len(), 40);
        assert!(!output.interrupted);
        assert!(output.best_valid_acc > 0.99);

        let losses = output.history.train_losses();
        assert!(losses[losses.len() - 1] < losses[0]);
        assert_eq!(
            output.best_epoch,
            output.history.best().map(|m| m.epoch)
        );
    }

    #[test]
    fn test_raised_signal_returns_initial_model() {
        let device: <TestBackend as Backend>::Device = Default::default();
        let stop = StopSignal::new();
        stop.raise();

        let trainer =
            ClassificationTrainer::<TestBackend>::new(ClassificationTrainerConfig::default(), device)
                .with_stop_signal(stop);
        let output = trainer.fit(ChannelMeans::new(&device), &loaders()).unwrap();

        assert!(output.interrupted);
        assert!(output.history.is_empty());
        assert_eq!(output.best_epoch, None);
    }

    #[test]
    fn test_invalid_configuration() {
        let device: <TestBackend as Backend>::Device = Default::default();
        let config = ClassificationTrainerConfig {
            lr: 0.0,
            ..Default::default()
        };
        let trainer = ClassificationTrainer::<TestBackend>::new(config, device);
        assert!(matches!(
            trainer.fit(ChannelMeans::new(&device), &loaders()),
            Err(TrainError::InvalidLearningRate(_))
        ));
    }

    #[test]
    fn test_config_from_experiment() {
        let experiment = ExperimentConfig {
            epochs: 3,
            learning_rate: 5e-4,
            ..Default::default()
        };
        let config = ClassificationTrainerConfig::from_experiment(&experiment);
        assert_eq!(config.n_epochs, 3);
        assert!((config.lr - 5e-4).abs() < 1e-12);
    }
}
