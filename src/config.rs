//! Engine configuration
//!
//! Every tunable the pipeline uses lives here with its default, so domain
//! thresholds and training hyperparameters stay auditable in one place.

use serde::{Deserialize, Serialize};

/// Configuration for a [`crate::engine::RiskEngine`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum distinct benefit days required before training
    pub min_benefit_days: usize,
    /// Minimum historical relapses required before training
    pub min_relapses: usize,
    /// Minimum derivable samples required before training
    pub min_samples: usize,

    /// Training epochs per run
    pub epochs: usize,
    /// Adam learning rate
    pub learning_rate: f64,
    /// Dropout rate after the first hidden layer
    pub dropout: f64,
    /// Held-out validation fraction of the shuffled sample set
    pub validation_split: f64,
    /// Upper bound on the batch size (actual batch = min(this, N/2))
    pub max_batch_size: usize,

    /// Cap applied to each inverse-frequency class weight
    pub class_weight_cap: f64,
    /// Multiplier applied to samples near a mispredicted intervention
    pub feedback_boost: f64,
    /// Window around an intervention's creation for feedback matching
    pub feedback_window_hours: i64,
    /// Window after an intervention's creation for outcome resolution
    pub outcome_window_hours: i64,

    /// Risk score at or above which the notification sink is invoked
    pub alert_threshold: u8,
    /// Upper bound on heuristic-fallback risk scores
    pub heuristic_cap: u8,
    /// Upper bound on model-path confidence
    pub confidence_cap: f64,
    /// Days after which a trained model is considered stale
    pub retrain_after_days: i64,

    /// Whether to forward anonymized aggregates after training
    pub submit_aggregates: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_benefit_days: 14,
            min_relapses: 2,
            min_samples: 10,
            epochs: 50,
            learning_rate: 0.001,
            dropout: 0.3,
            validation_split: 0.2,
            max_batch_size: 32,
            class_weight_cap: 10.0,
            feedback_boost: 1.5,
            feedback_window_hours: 24,
            outcome_window_hours: 48,
            alert_threshold: 70,
            heuristic_cap: 85,
            confidence_cap: 0.9,
            retrain_after_days: 7,
            submit_aggregates: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_policy() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.min_benefit_days, 14);
        assert_eq!(cfg.min_relapses, 2);
        assert_eq!(cfg.min_samples, 10);
        assert_eq!(cfg.epochs, 50);
        assert_eq!(cfg.alert_threshold, 70);
        assert_eq!(cfg.heuristic_cap, 85);
        assert_eq!(cfg.outcome_window_hours, 48);
    }

    #[test]
    fn test_partial_config_deserialization() {
        let cfg: EngineConfig = serde_json::from_str(r#"{"epochs": 10}"#).unwrap();
        assert_eq!(cfg.epochs, 10);
        assert_eq!(cfg.min_benefit_days, 14);
    }
}
