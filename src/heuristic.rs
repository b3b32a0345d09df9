//! Heuristic fallback predictor
//!
//! Additive factor scoring used whenever the model path is not ready: no
//! completed training run, too little recent data, or missing normalization
//! statistics. Scores are capped below the model range so a fallback alert
//! never claims model-grade certainty, and confidence stays low.

use crate::types::{RiskAssessment, RiskFactors, RiskPatterns};

/// Baseline risk before any factor contributes.
const BASE_SCORE: u32 = 15;
/// Fixed confidence floor for heuristic results.
const BASE_CONFIDENCE: f64 = 0.3;
/// Confidence added per active factor.
const CONFIDENCE_PER_FACTOR: f64 = 0.04;
/// Upper bound on heuristic confidence.
const MAX_CONFIDENCE: f64 = 0.5;

/// Heuristic scorer over factors and patterns.
pub struct HeuristicPredictor;

impl HeuristicPredictor {
    /// Score the current situation. `cap` bounds the result (85 by
    /// default): a fallback estimate deliberately cannot saturate the risk
    /// scale.
    pub fn assess(factors: &RiskFactors, patterns: &RiskPatterns, cap: u8) -> RiskAssessment {
        let mut score = BASE_SCORE;
        if factors.purge_phase {
            score += 20;
        }
        if factors.late_night {
            score += 15;
        }
        if factors.weekend {
            score += 8;
        }
        if factors.high_anxiety {
            score += 12;
        }
        if factors.low_energy {
            score += 10;
        }
        if factors.energy_drop {
            score += 10;
        }
        if factors.low_focus {
            score += 6;
        }
        if factors.low_mood_stability {
            score += 8;
        }
        if patterns.near_typical_relapse_length {
            score += 18;
        }
        if patterns.benefit_decline {
            score += 10;
        }

        let risk_score = score.min(u32::from(cap)) as u8;
        let confidence = (BASE_CONFIDENCE
            + CONFIDENCE_PER_FACTOR * f64::from(factors.active_count()))
        .min(MAX_CONFIDENCE);

        RiskAssessment {
            risk_score,
            confidence,
            factors: *factors,
            patterns: patterns.clone(),
            used_ml: false,
        }
    }
}
