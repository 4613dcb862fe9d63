//! Confusion matrix computation.

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};

/// Confusion matrix for classification evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// The matrix values (row = true, col = pred).
    pub matrix: Vec<Vec<usize>>,
    /// Class labels, one per row.
    pub labels: Vec<String>,
}

impl ConfusionMatrix {
    /// Create an empty matrix over `labels`.
    #[must_use]
    pub fn new(labels: Vec<String>) -> Self {
        let n = labels.len();
        Self {
            matrix: vec![vec![0; n]; n],
            labels,
        }
    }

    /// Count predictions against targets.
    ///
    /// # Errors
    ///
    /// Fails if the slices differ in length or hold an index outside the
    /// label list.
    pub fn from_predictions(
        predictions: &[usize],
        targets: &[usize],
        labels: Vec<String>,
    ) -> Result<Self> {
        if predictions.len() != targets.len() {
            return Err(AnalysisError::InvalidInput(format!(
                "{} predictions for {} targets",
                predictions.len(),
                targets.len()
            )));
        }
        let mut cm = Self::new(labels);
        for (&pred, &target) in predictions.iter().zip(targets) {
            cm.add(target, pred)?;
        }
        Ok(cm)
    }

    /// Number of classes.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.labels.len()
    }

    /// Add a prediction.
    pub fn add(&mut self, true_class: usize, pred_class: usize) -> Result<()> {
        let n = self.n_classes();
        if true_class >= n || pred_class >= n {
            return Err(AnalysisError::InvalidInput(format!(
                "class pair ({true_class}, {pred_class}) outside {n} classes"
            )));
        }
        self.matrix[true_class][pred_class] += 1;
        Ok(())
    }

    /// Total number of counted samples.
    #[must_use]
    pub fn total(&self) -> usize {
        self.matrix.iter().flatten().sum()
    }

    /// Number of true instances of `class`.
    #[must_use]
    pub fn support(&self, class: usize) -> usize {
        self.matrix[class].iter().sum()
    }

    /// Get accuracy.
    #[must_use]
    pub fn accuracy(&self) -> f32 {
        let correct: usize = (0..self.n_classes()).map(|i| self.matrix[i][i]).sum();
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            correct as f32 / total as f32
        }
    }

    /// Get precision for a class.
    #[must_use]
    pub fn precision(&self, class: usize) -> f32 {
        let tp = self.matrix[class][class];
        let predicted: usize = self.matrix.iter().map(|row| row[class]).sum();
        if predicted == 0 {
            0.0
        } else {
            tp as f32 / predicted as f32
        }
    }

    /// Get recall for a class.
    #[must_use]
    pub fn recall(&self, class: usize) -> f32 {
        let tp = self.matrix[class][class];
        let support = self.support(class);
        if support == 0 {
            0.0
        } else {
            tp as f32 / support as f32
        }
    }

    /// Get F1 score for a class.
    #[must_use]
    pub fn f1(&self, class: usize) -> f32 {
        let p = self.precision(class);
        let r = self.recall(class);
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }

    /// Mean recall over the classes present in the targets.
    #[must_use]
    pub fn balanced_accuracy(&self) -> f32 {
        let present: Vec<usize> = (0..self.n_classes()).filter(|&c| self.support(c) > 0).collect();
        if present.is_empty() {
            return 0.0;
        }
        present.iter().map(|&c| self.recall(c)).sum::<f32>() / present.len() as f32
    }

    /// Normalize the matrix (row-wise, shows recall).
    #[must_use]
    pub fn normalize(&self) -> Vec<Vec<f32>> {
        self.matrix
            .iter()
            .map(|row| {
                let sum: usize = row.iter().sum();
                if sum == 0 {
                    vec![0.0; row.len()]
                } else {
                    row.iter().map(|&v| v as f32 / sum as f32).collect()
                }
            })
            .collect()
    }

    /// Get a text representation.
    #[must_use]
    pub fn to_string_table(&self) -> String {
        let width = self.labels.iter().map(String::len).max().unwrap_or(0).clamp(6, 20);
        let mut s = format!("{:>width$} ", "true\\pred");
        for label in &self.labels {
            s.push_str(&format!(" {:>width$}", truncate(label, width)));
        }
        s.push('\n');

        for (label, row) in self.labels.iter().zip(&self.matrix) {
            s.push_str(&format!("{:>width$} ", truncate(label, width)));
            for count in row {
                s.push_str(&format!(" {count:>width$}"));
            }
            s.push('\n');
        }
        s
    }
}

fn truncate(label: &str, width: usize) -> String {
    label.chars().take(width).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("c{i}")).collect()
    }

    #[test]
    fn test_confusion_matrix() {
        let preds = vec![0, 0, 1, 1, 2, 2];
        let targets = vec![0, 1, 1, 1, 2, 0];

        let cm = ConfusionMatrix::from_predictions(&preds, &targets, labels(3)).unwrap();

        assert_eq!(cm.matrix[0][0], 1);
        assert_eq!(cm.matrix[1][0], 1);
        assert_eq!(cm.matrix[1][1], 2);
        assert_eq!(cm.total(), 6);
        assert_eq!(cm.support(1), 3);
    }

    #[test]
    fn test_metrics() {
        let preds = vec![0, 0, 1, 1];
        let targets = vec![0, 1, 0, 1];
        let cm = ConfusionMatrix::from_predictions(&preds, &targets, labels(2)).unwrap();

        assert!((cm.accuracy() - 0.5).abs() < 1e-6);
        assert!((cm.precision(0) - 0.5).abs() < 1e-6);
        assert!((cm.recall(0) - 0.5).abs() < 1e-6);
        assert!((cm.f1(1) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_balanced_accuracy_is_mean_recall() {
        // Imbalanced: class 0 dominates and is always right, class 1 half right.
        let targets = vec![0, 0, 0, 0, 0, 0, 1, 1];
        let preds = vec![0, 0, 0, 0, 0, 0, 1, 0];
        let cm = ConfusionMatrix::from_predictions(&preds, &targets, labels(4)).unwrap();

        assert!((cm.accuracy() - 7.0 / 8.0).abs() < 1e-6);
        let mean_recall = (cm.recall(0) + cm.recall(1)) / 2.0;
        assert!((cm.balanced_accuracy() - mean_recall).abs() < 1e-6);
        assert!((cm.balanced_accuracy() - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(ConfusionMatrix::from_predictions(&[0, 1], &[0], labels(2)).is_err());
        assert!(ConfusionMatrix::from_predictions(&[0, 2], &[0, 1], labels(2)).is_err());
    }

    #[test]
    fn test_normalize_and_table() {
        let cm = ConfusionMatrix::from_predictions(&[0, 1, 1], &[0, 0, 1], labels(3)).unwrap();
        let norm = cm.normalize();
        assert_eq!(norm[0], vec![0.5, 0.5, 0.0]);
        assert_eq!(norm[2], vec![0.0, 0.0, 0.0]);

        let table = cm.to_string_table();
        assert_eq!(table.lines().count(), 4);
        assert!(table.contains("c2"));
    }
}
