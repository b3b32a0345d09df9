//! Training-run evaluation
//!
//! Computes the confusion matrix and ratio metrics at a fixed threshold.
//! Metrics are computed once per training run over the full training set;
//! this is a resubstitution estimate, not a held-out generalization
//! measure. Per-epoch validation figures in the fit log carry the held-out
//! signal for callers who want it.

use crate::types::{ConfusionMatrix, EvalReport};

/// Default binarization threshold.
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Evaluator for binary predictions.
pub struct Evaluator;

impl Evaluator {
    /// Binarize predictions at `threshold` and compute metrics. Every ratio
    /// metric is 0 when its denominator is 0.
    pub fn evaluate(predictions: &[f64], labels: &[u8], threshold: f64) -> EvalReport {
        let mut confusion = ConfusionMatrix::default();

        for (p, label) in predictions.iter().zip(labels.iter()) {
            let predicted_positive = *p >= threshold;
            match (predicted_positive, *label == 1) {
                (true, true) => confusion.true_positives += 1,
                (true, false) => confusion.false_positives += 1,
                (false, false) => confusion.true_negatives += 1,
                (false, true) => confusion.false_negatives += 1,
            }
        }

        let precision = ratio(
            confusion.true_positives,
            confusion.true_positives + confusion.false_positives,
        );
        let recall = ratio(
            confusion.true_positives,
            confusion.true_positives + confusion.false_negatives,
        );
        let f1_score = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        let accuracy = ratio(
            confusion.true_positives + confusion.true_negatives,
            confusion.total(),
        );

        EvalReport {
            precision,
            recall,
            f1_score,
            accuracy,
            confusion_matrix: confusion,
        }
    }
}

fn ratio(numerator: u32, denominator: u32) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        f64::from(numerator) / f64::from(denominator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_confusion_matrix() {
        let predictions = vec![0.9, 0.8, 0.3, 0.2, 0.6, 0.1];
        let labels = vec![1, 0, 1, 0, 1, 0];

        let report = Evaluator::evaluate(&predictions, &labels, DEFAULT_THRESHOLD);
        let m = report.confusion_matrix;
        assert_eq!(m.true_positives, 2);
        assert_eq!(m.false_positives, 1);
        assert_eq!(m.false_negatives, 1);
        assert_eq!(m.true_negatives, 2);
        assert_eq!(m.total(), 6);

        assert!((report.precision - 2.0 / 3.0).abs() < 1e-9);
        assert!((report.recall - 2.0 / 3.0).abs() < 1e-9);
        assert!((report.f1_score - 2.0 / 3.0).abs() < 1e-9);
        assert!((report.accuracy - 4.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_denominators_yield_zero() {
        // Nothing predicted positive and no positive labels.
        let report = Evaluator::evaluate(&[0.1, 0.2], &[0, 0], DEFAULT_THRESHOLD);
        assert_eq!(report.precision, 0.0);
        assert_eq!(report.recall, 0.0);
        assert_eq!(report.f1_score, 0.0);
        assert_eq!(report.accuracy, 1.0);

        let report = Evaluator::evaluate(&[], &[], DEFAULT_THRESHOLD);
        assert_eq!(report.accuracy, 0.0);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let report = Evaluator::evaluate(&[0.5], &[1], DEFAULT_THRESHOLD);
        assert_eq!(report.confusion_matrix.true_positives, 1);
    }

    #[test]
    fn test_custom_threshold() {
        let predictions = vec![0.6, 0.6];
        let labels = vec![1, 0];

        let strict = Evaluator::evaluate(&predictions, &labels, 0.7);
        assert_eq!(strict.confusion_matrix.true_positives, 0);
        assert_eq!(strict.confusion_matrix.false_negatives, 1);
    }
}
