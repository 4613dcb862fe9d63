//! Model evaluation utilities.
//!
//! Runs a classifier over a dataset without gradient tracking and collects
//! predictions, probabilities and the mean cross-entropy loss.

use burn::nn::loss::CrossEntropyLossConfig;
use burn::prelude::*;
use burn::tensor::activation::softmax;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainError};
use cogcam_core::{ImageClassifier, Split};
use cogcam_data::{ImageDataLoader, ImageDataset};

/// Evaluation results with predictions and metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Predicted class indices.
    pub predictions: Vec<usize>,
    /// True class indices.
    pub targets: Vec<usize>,
    /// Prediction probabilities (n_samples, n_classes).
    pub probabilities: Vec<Vec<f32>>,
    /// Mean cross-entropy loss per sample.
    pub loss: f32,
    /// Accuracy.
    pub accuracy: f32,
    /// Number of correct predictions.
    pub correct: usize,
    /// Total number of samples.
    pub total: usize,
}

impl EvaluationResult {
    /// Probability assigned to the predicted class of sample `index`.
    #[must_use]
    pub fn confidence(&self, index: usize) -> Option<f32> {
        let predicted = *self.predictions.get(index)?;
        self.probabilities.get(index)?.get(predicted).copied()
    }

    /// Indices of misclassified samples.
    #[must_use]
    pub fn errors(&self) -> Vec<usize> {
        self.predictions
            .iter()
            .zip(&self.targets)
            .enumerate()
            .filter(|(_, (p, t))| p != t)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Read a float tensor back to the host.
pub(crate) fn to_vec_f32<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| TrainError::Readback(format!("{e:?}")))
}

/// Number of rows whose arg-max equals the target.
pub(crate) fn count_correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let predictions = logits.argmax(1).squeeze::<1>(1);
    let correct: i64 = predictions.equal(targets).int().sum().into_scalar().elem();
    correct as usize
}

/// Evaluate a classifier over every batch of `loader`.
pub fn evaluate_loader<B, M>(
    model: &M,
    loader: &ImageDataLoader,
    device: &B::Device,
) -> Result<EvaluationResult>
where
    B: Backend,
    M: ImageClassifier<B>,
{
    let n_classes = model.n_classes();
    let data_classes = loader.dataset().n_classes();
    if n_classes != data_classes {
        return Err(TrainError::ClassCountMismatch {
            model: n_classes,
            data: data_classes,
        });
    }

    let loss_fn = CrossEntropyLossConfig::new().init(device);
    let mut predictions = Vec::with_capacity(loader.len());
    let mut targets = Vec::with_capacity(loader.len());
    let mut probabilities = Vec::with_capacity(loader.len());
    let mut total_loss = 0.0f32;

    for batch_result in loader.iter::<B>(device) {
        let batch = batch_result?;
        let batch_size = batch.len();

        let logits = model.forward(batch.images);
        let loss = loss_fn.forward(logits.clone(), batch.targets.clone());
        total_loss += loss.into_scalar().elem::<f32>() * batch_size as f32;

        let probs = to_vec_f32(softmax(logits, 1))?;
        for row in probs.chunks(n_classes) {
            let predicted = row
                .iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |best, (i, &p)| if p > best.1 { (i, p) } else { best })
                .0;
            predictions.push(predicted);
            probabilities.push(row.to_vec());
        }

        let labels: Vec<i64> = batch
            .targets
            .into_data()
            .to_vec()
            .map_err(|e| TrainError::Readback(format!("{e:?}")))?;
        targets.extend(labels.into_iter().map(|t| t as usize));
    }

    let total = targets.len();
    let correct = predictions
        .iter()
        .zip(&targets)
        .filter(|(p, t)| p == t)
        .count();
    let (loss, accuracy) = if total > 0 {
        (total_loss / total as f32, correct as f32 / total as f32)
    } else {
        (0.0, 0.0)
    };

    Ok(EvaluationResult {
        predictions,
        targets,
        probabilities,
        loss,
        accuracy,
        correct,
        total,
    })
}

/// Evaluate a classifier on a whole dataset, in dataset order.
pub fn evaluate_classification<B, M>(
    model: &M,
    dataset: &ImageDataset,
    batch_size: usize,
    device: &B::Device,
) -> Result<EvaluationResult>
where
    B: Backend,
    M: ImageClassifier<B>,
{
    let loader = ImageDataLoader::builder(dataset.clone())
        .batch_size(batch_size)
        .shuffle(false)
        .split(Split::Test)
        .build()?;
    let result = evaluate_loader(model, &loader, device)?;
    tracing::info!(
        "Evaluated {} images: loss={:.4}, accuracy={:.2}%",
        result.total,
        result.loss,
        result.accuracy * 100.0
    );
    Ok(result)
}
