//! Per-epoch training history.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Metrics recorded at the end of one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// Epoch number (1-based).
    pub epoch: usize,
    /// Mean training loss over the epoch's batches.
    pub train_loss: f32,
    /// Training accuracy accumulated during the epoch.
    pub train_acc: f32,
    /// Mean validation loss.
    pub valid_loss: f32,
    /// Validation accuracy.
    pub valid_acc: f32,
}

/// Metrics of every completed epoch, in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    /// Completed epochs.
    pub epochs: Vec<EpochMetrics>,
}

impl TrainingHistory {
    /// Create an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one epoch.
    pub fn push(&mut self, metrics: EpochMetrics) {
        self.epochs.push(metrics);
    }

    /// Number of completed epochs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    /// Check if no epoch completed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    /// Epoch with the highest validation accuracy (earliest on ties).
    #[must_use]
    pub fn best(&self) -> Option<&EpochMetrics> {
        self.epochs.iter().fold(None, |best: Option<&EpochMetrics>, m| match best {
            Some(b) if b.valid_acc >= m.valid_acc => Some(b),
            _ => Some(m),
        })
    }

    /// Training losses per epoch.
    #[must_use]
    pub fn train_losses(&self) -> Vec<f32> {
        self.epochs.iter().map(|m| m.train_loss).collect()
    }

    /// Validation losses per epoch.
    #[must_use]
    pub fn valid_losses(&self) -> Vec<f32> {
        self.epochs.iter().map(|m| m.valid_loss).collect()
    }

    /// Training accuracies per epoch.
    #[must_use]
    pub fn train_accs(&self) -> Vec<f32> {
        self.epochs.iter().map(|m| m.train_acc).collect()
    }

    /// Validation accuracies per epoch.
    #[must_use]
    pub fn valid_accs(&self) -> Vec<f32> {
        self.epochs.iter().map(|m| m.valid_acc).collect()
    }

    /// Write the history as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Read a history written by [`TrainingHistory::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(epoch: usize, valid_acc: f32) -> EpochMetrics {
        EpochMetrics {
            epoch,
            train_loss: 1.0 / epoch as f32,
            train_acc: 0.5,
            valid_loss: 0.8,
            valid_acc,
        }
    }

    #[test]
    fn test_best_prefers_earliest_tie() {
        let mut history = TrainingHistory::new();
        assert!(history.best().is_none());

        history.push(metrics(1, 0.4));
        history.push(metrics(2, 0.7));
        history.push(metrics(3, 0.7));
        history.push(metrics(4, 0.6));
        assert_eq!(history.best().map(|m| m.epoch), Some(2));
        assert_eq!(history.valid_accs(), vec![0.4, 0.7, 0.7, 0.6]);
    }

    #[test]
    fn test_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        let mut history = TrainingHistory::new();
        history.push(metrics(1, 0.25));
        history.save(&path).unwrap();

        assert_eq!(TrainingHistory::load(&path).unwrap(), history);
    }
}
