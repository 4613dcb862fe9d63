//! Classification report with per-class metrics.
//!
//! Provides precision, recall, F1-score and support for each declared class,
//! along with macro and weighted averages, accuracy, balanced accuracy and
//! the underlying confusion matrix.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::confusion::ConfusionMatrix;
use crate::error::Result;

/// Per-class classification metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    /// Class index.
    pub class: usize,
    /// Class name.
    pub name: String,
    /// Precision: TP / (TP + FP)
    pub precision: f32,
    /// Recall: TP / (TP + FN)
    pub recall: f32,
    /// F1-Score: 2 * (precision * recall) / (precision + recall)
    pub f1_score: f32,
    /// Support: number of true instances of this class
    pub support: usize,
}

/// Classification report with per-class and aggregate metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    /// Per-class metrics, in class order.
    pub classes: Vec<ClassMetrics>,
    /// Overall accuracy.
    pub accuracy: f32,
    /// Mean recall over classes with support.
    pub balanced_accuracy: f32,
    /// Macro-averaged precision (unweighted mean over classes with support).
    pub macro_precision: f32,
    /// Macro-averaged recall.
    pub macro_recall: f32,
    /// Macro-averaged F1.
    pub macro_f1: f32,
    /// Weighted-averaged precision (weighted by support).
    pub weighted_precision: f32,
    /// Weighted-averaged recall.
    pub weighted_recall: f32,
    /// Weighted-averaged F1.
    pub weighted_f1: f32,
    /// Total number of samples.
    pub total_samples: usize,
    /// Confusion matrix the metrics were derived from.
    pub confusion: ConfusionMatrix,
}

impl ClassificationReport {
    /// Build a report from a confusion matrix.
    #[must_use]
    pub fn from_confusion(confusion: ConfusionMatrix) -> Self {
        let classes: Vec<ClassMetrics> = confusion
            .labels
            .iter()
            .enumerate()
            .map(|(class, name)| ClassMetrics {
                class,
                name: name.clone(),
                precision: confusion.precision(class),
                recall: confusion.recall(class),
                f1_score: confusion.f1(class),
                support: confusion.support(class),
            })
            .collect();

        let present: Vec<&ClassMetrics> = classes.iter().filter(|c| c.support > 0).collect();
        let macro_avg = |f: fn(&ClassMetrics) -> f32| {
            if present.is_empty() {
                0.0
            } else {
                present.iter().map(|c| f(c)).sum::<f32>() / present.len() as f32
            }
        };

        let total_samples = confusion.total();
        let weighted_avg = |f: fn(&ClassMetrics) -> f32| {
            if total_samples == 0 {
                0.0
            } else {
                classes.iter().map(|c| f(c) * c.support as f32).sum::<f32>() / total_samples as f32
            }
        };

        Self {
            accuracy: confusion.accuracy(),
            balanced_accuracy: confusion.balanced_accuracy(),
            macro_precision: macro_avg(|c| c.precision),
            macro_recall: macro_avg(|c| c.recall),
            macro_f1: macro_avg(|c| c.f1_score),
            weighted_precision: weighted_avg(|c| c.precision),
            weighted_recall: weighted_avg(|c| c.recall),
            weighted_f1: weighted_avg(|c| c.f1_score),
            total_samples,
            classes,
            confusion,
        }
    }

    /// Display the report as a formatted string.
    #[must_use]
    pub fn to_string_table(&self) -> String {
        let width = self
            .classes
            .iter()
            .map(|c| c.name.len())
            .max()
            .unwrap_or(0)
            .max("balanced accuracy".len());
        let mut output = format!(
            "{:>width$}  precision    recall  f1-score   support\n\n",
            ""
        );

        for class in &self.classes {
            output.push_str(&format!(
                "{:>width$}  {:>9.2} {:>9.2} {:>9.2} {:>9}\n",
                class.name, class.precision, class.recall, class.f1_score, class.support
            ));
        }

        output.push('\n');
        output.push_str(&format!(
            "{:>width$}  {:>9} {:>9} {:>9.2} {:>9}\n",
            "accuracy", "", "", self.accuracy, self.total_samples
        ));
        output.push_str(&format!(
            "{:>width$}  {:>9} {:>9} {:>9.2} {:>9}\n",
            "balanced accuracy", "", "", self.balanced_accuracy, self.total_samples
        ));
        output.push_str(&format!(
            "{:>width$}  {:>9.2} {:>9.2} {:>9.2} {:>9}\n",
            "macro avg", self.macro_precision, self.macro_recall, self.macro_f1, self.total_samples
        ));
        output.push_str(&format!(
            "{:>width$}  {:>9.2} {:>9.2} {:>9.2} {:>9}\n",
            "weighted avg",
            self.weighted_precision,
            self.weighted_recall,
            self.weighted_f1,
            self.total_samples
        ));

        output
    }

    /// Get the class with lowest F1-score among classes with support.
    #[must_use]
    pub fn worst_class(&self) -> Option<&ClassMetrics> {
        self.classes
            .iter()
            .filter(|c| c.support > 0)
            .min_by(|a, b| a.f1_score.total_cmp(&b.f1_score))
    }

    /// Write the report as pretty-printed JSON.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Write the text table followed by the confusion matrix.
    pub fn save_text(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = format!(
            "{}\nConfusion matrix (rows = true, columns = predicted)\n\n{}",
            self.to_string_table(),
            self.confusion.to_string_table()
        );
        std::fs::write(path, text)?;
        Ok(())
    }
}

/// Compute a classification report from predictions and targets.
///
/// Every class in `class_names` appears in the report, including classes
/// that never occur.
///
/// # Example
///
/// ```rust,ignore
/// use cogcam_analysis::classification_report;
///
/// let report = classification_report(&predictions, &targets, &class_names)?;
/// println!("{}", report.to_string_table());
/// ```
pub fn classification_report(
    predictions: &[usize],
    targets: &[usize],
    class_names: &[String],
) -> Result<ClassificationReport> {
    let confusion = ConfusionMatrix::from_predictions(predictions, targets, class_names.to_vec())?;
    Ok(ClassificationReport::from_confusion(confusion))
}
