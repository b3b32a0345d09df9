//! Predictor selection
//!
//! The model path and the heuristic fallback are two variants of one
//! predictor, chosen by a single readiness check rather than scattered
//! booleans. A freshly constructed untrained model shell never counts as
//! ready; only a completed training run with a positive sample count does.

use crate::heuristic::HeuristicPredictor;
use crate::model::Classifier;
use crate::normalizer::{NormalizationStats, Normalizer};
use crate::types::{
    FeatureVector, RiskAssessment, RiskFactors, RiskPatterns, TrainingHistory,
};

/// Benefit entries required before the model path is meaningful.
pub const MIN_PREDICTION_ENTRIES: usize = 2;

/// Saturation point for the sample-count term of model confidence.
const CONFIDENCE_SAMPLE_SCALE: f64 = 100.0;

/// One of the two prediction strategies.
pub enum Predictor<'a> {
    Heuristic {
        cap: u8,
    },
    Model {
        classifier: &'a Classifier,
        stats: &'a NormalizationStats,
        history: &'a TrainingHistory,
        confidence_cap: f64,
    },
}

impl<'a> Predictor<'a> {
    /// Choose the strategy. The model path requires a real training history
    /// with samples, fitted normalization stats, a restored classifier and
    /// enough recent entries; anything less routes to the heuristic.
    #[allow(clippy::too_many_arguments)]
    pub fn select(
        classifier: Option<&'a Classifier>,
        stats: Option<&'a NormalizationStats>,
        history: Option<&'a TrainingHistory>,
        benefit_entries: usize,
        heuristic_cap: u8,
        confidence_cap: f64,
    ) -> Predictor<'a> {
        match (classifier, stats, history) {
            (Some(classifier), Some(stats), Some(history))
                if history.samples > 0 && benefit_entries >= MIN_PREDICTION_ENTRIES =>
            {
                Predictor::Model {
                    classifier,
                    stats,
                    history,
                    confidence_cap,
                }
            }
            _ => Predictor::Heuristic { cap: heuristic_cap },
        }
    }

    /// Produce an assessment for the raw feature vector, with factors and
    /// patterns already derived by the caller.
    pub fn assess(
        &self,
        raw: &FeatureVector,
        factors: RiskFactors,
        patterns: RiskPatterns,
    ) -> RiskAssessment {
        match self {
            Predictor::Heuristic { cap } => {
                HeuristicPredictor::assess(&factors, &patterns, *cap)
            }
            Predictor::Model {
                classifier,
                stats,
                history,
                confidence_cap,
            } => {
                let normalized = Normalizer::apply(stats, raw);
                let probability = classifier.predict(&normalized);
                let risk_score = (probability * 100.0).round().clamp(0.0, 100.0) as u8;

                RiskAssessment {
                    risk_score,
                    confidence: model_confidence(history, *confidence_cap),
                    factors,
                    patterns,
                    used_ml: true,
                }
            }
        }
    }
}

/// Capped weighted blend of sample count, training accuracy and F1.
fn model_confidence(history: &TrainingHistory, cap: f64) -> f64 {
    let sample_term = (history.samples as f64 / CONFIDENCE_SAMPLE_SCALE).min(1.0);
    let f1 = history.metrics.map_or(0.0, |m| m.f1_score);
    let blended = 0.4 * sample_term + 0.4 * history.final_accuracy + 0.2 * f1;
    blended.min(cap).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClassWeights, ConfusionMatrix, EvalReport, FEATURE_COUNT};
    use chrono::Utc;

    fn history(samples: usize, accuracy: f64, f1: f64) -> TrainingHistory {
        TrainingHistory {
            last_trained: Utc::now(),
            samples,
            final_loss: 0.3,
            final_accuracy: accuracy,
            metrics: Some(EvalReport {
                precision: f1,
                recall: f1,
                f1_score: f1,
                accuracy,
                confusion_matrix: ConfusionMatrix::default(),
            }),
            class_weights: ClassWeights { weight0: 1.0, weight1: 1.0 },
            feedback_samples_used: 0,
        }
    }

    fn inert_stats() -> NormalizationStats {
        NormalizationStats {
            means: [0.0; FEATURE_COUNT],
            stds: [1.0; FEATURE_COUNT],
        }
    }

    #[test]
    fn test_select_requires_every_readiness_input() {
        let classifier = Classifier::new(Some(1));
        let stats = inert_stats();
        let trained = history(19, 0.9, 0.8);

        let predictor = Predictor::select(
            Some(&classifier),
            Some(&stats),
            Some(&trained),
            5,
            85,
            0.9,
        );
        assert!(matches!(predictor, Predictor::Model { .. }));

        // No history at all.
        let predictor = Predictor::select(Some(&classifier), Some(&stats), None, 5, 85, 0.9);
        assert!(matches!(predictor, Predictor::Heuristic { .. }));

        // History exists but records zero samples: an untrained shell.
        let empty = history(0, 0.0, 0.0);
        let predictor =
            Predictor::select(Some(&classifier), Some(&stats), Some(&empty), 5, 85, 0.9);
        assert!(matches!(predictor, Predictor::Heuristic { .. }));

        // Missing stats.
        let predictor = Predictor::select(Some(&classifier), None, Some(&trained), 5, 85, 0.9);
        assert!(matches!(predictor, Predictor::Heuristic { .. }));

        // Too few benefit entries.
        let predictor = Predictor::select(
            Some(&classifier),
            Some(&stats),
            Some(&trained),
            1,
            85,
            0.9,
        );
        assert!(matches!(predictor, Predictor::Heuristic { .. }));
    }

    #[test]
    fn test_model_assessment_bounds() {
        let classifier = Classifier::new(Some(2));
        let stats = inert_stats();
        let trained = history(19, 0.9, 0.8);
        let predictor = Predictor::select(
            Some(&classifier),
            Some(&stats),
            Some(&trained),
            5,
            85,
            0.9,
        );

        let raw = [5.0; FEATURE_COUNT];
        let assessment =
            predictor.assess(&raw, RiskFactors::default(), RiskPatterns::default());
        assert!(assessment.used_ml);
        assert!(assessment.risk_score <= 100);
        assert!(assessment.confidence <= 0.9);
    }

    #[test]
    fn test_confidence_blend_capped() {
        // Saturated inputs would blend to 1.0 without the cap.
        let c = model_confidence(&history(500, 1.0, 1.0), 0.9);
        assert!((c - 0.9).abs() < 1e-9);

        // Small runs score lower.
        let c = model_confidence(&history(19, 0.8, 0.5), 0.9);
        let expected = 0.4 * 0.19 + 0.4 * 0.8 + 0.2 * 0.5;
        assert!((c - expected).abs() < 1e-9);
    }

    #[test]
    fn test_heuristic_assessment_flagged() {
        let predictor = Predictor::Heuristic { cap: 85 };
        let raw = [5.0; FEATURE_COUNT];
        let assessment =
            predictor.assess(&raw, RiskFactors::default(), RiskPatterns::default());
        assert!(!assessment.used_ml);
        assert!(assessment.risk_score <= 85);
    }
}
