//! Core types for the relapse-sentinel pipeline
//!
//! This module defines the data structures that flow through each stage of
//! the pipeline: tracked user data, derived training samples, training
//! artifacts and risk assessments.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Number of elements in a feature vector.
pub const FEATURE_COUNT: usize = 12;

/// Derived 12-element feature vector. Layout, in order: energy, focus,
/// confidence, energy_drop, hour_of_day, is_weekend, streak_day_count,
/// in_purge_window, anxiety, mood_stability, mental_clarity,
/// emotional_processing. Not persisted.
pub type FeatureVector = [f64; FEATURE_COUNT];

/// One day's self-reported benefit metrics, each on a 0-10 scale.
///
/// One entry per calendar day; same-day edits overwrite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenefitEntry {
    /// Calendar day the entry describes
    pub date: NaiveDate,
    pub energy: f64,
    pub focus: f64,
    pub confidence: f64,
    pub aura: f64,
    pub sleep_quality: f64,
    pub workout_quality: f64,
}

/// Sparser emotional check-in metrics, each on a 1-10 scale.
///
/// Matched to a target date by exact match, else the nearest entry within a
/// 3-day lookback, else the domain default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionalEntry {
    /// Calendar day the check-in describes
    pub date: NaiveDate,
    pub anxiety: f64,
    pub mood_stability: f64,
    pub mental_clarity: f64,
    pub emotional_processing: f64,
}

/// Why a streak ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreakEndReason {
    /// The labeled negative event
    Relapse,
    /// Manual reset without a relapse
    Reset,
}

/// One streak of consecutive tracked days.
///
/// Invariant: exactly one record has `end = None` (the active streak) at any
/// time. `reason = Relapse` marks the labeled negative event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreakRecord {
    pub start: NaiveDate,
    /// End date, `None` for the active streak
    pub end: Option<NaiveDate>,
    /// Length in days as the tracker counted it
    pub days: u32,
    pub reason: Option<StreakEndReason>,
    /// Free-form trigger note attached when the streak ended
    pub trigger: Option<String>,
}

impl StreakRecord {
    /// Whether this record is a completed streak that ended in a relapse.
    pub fn is_relapse(&self) -> bool {
        self.end.is_some() && self.reason == Some(StreakEndReason::Relapse)
    }
}

/// Read-only snapshot of a user's tracked history, as handed over by the
/// data provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserData {
    pub benefit_entries: Vec<BenefitEntry>,
    pub emotional_entries: Vec<EmotionalEntry>,
    pub streak_records: Vec<StreakRecord>,
    /// Live streak counter as shown to the user
    pub current_streak_days: u32,
}

impl UserData {
    /// Completed streaks that ended in a relapse.
    pub fn relapse_records(&self) -> impl Iterator<Item = &StreakRecord> {
        self.streak_records.iter().filter(|s| s.is_relapse())
    }
}

/// One training sample derived from a consecutive benefit-day pair.
///
/// The date is a required field: label derivation and feedback-weight
/// matching both key on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSample {
    pub features: FeatureVector,
    /// 1 when a relapse ended on this sample's date
    pub label: u8,
    pub date: NaiveDate,
}

/// Inverse-frequency class weights applied during training.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassWeights {
    pub weight0: f64,
    pub weight1: f64,
}

/// Binary confusion matrix at a fixed threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_positives: u32,
    pub false_positives: u32,
    pub true_negatives: u32,
    pub false_negatives: u32,
}

impl ConfusionMatrix {
    /// Total number of classified samples.
    pub fn total(&self) -> u32 {
        self.true_positives + self.false_positives + self.true_negatives + self.false_negatives
    }
}

/// Evaluation metrics computed over the training set after each run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvalReport {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub accuracy: f64,
    pub confusion_matrix: ConfusionMatrix,
}

/// Record of the most recent completed training run.
///
/// Replaced wholesale on each retrain; a history with `samples > 0` is what
/// marks the model as genuinely trained (a freshly constructed model shell
/// does not count).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub last_trained: DateTime<Utc>,
    pub samples: usize,
    pub final_loss: f64,
    pub final_accuracy: f64,
    pub metrics: Option<EvalReport>,
    pub class_weights: ClassWeights,
    /// Ledger feedback records that boosted at least one sample weight
    pub feedback_samples_used: usize,
}

/// Human-interpretable factors attached to every assessment, thresholded on
/// raw (un-normalized) feature values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskFactors {
    pub low_energy: bool,
    pub energy_drop: bool,
    pub low_focus: bool,
    pub late_night: bool,
    pub weekend: bool,
    pub purge_phase: bool,
    pub high_anxiety: bool,
    pub low_mood_stability: bool,
}

impl RiskFactors {
    /// Number of active factors.
    pub fn active_count(&self) -> u32 {
        [
            self.low_energy,
            self.energy_drop,
            self.low_focus,
            self.late_night,
            self.weekend,
            self.purge_phase,
            self.high_anxiety,
            self.low_mood_stability,
        ]
        .iter()
        .filter(|f| **f)
        .count() as u32
    }
}

/// Coarse historical patterns used to justify a score to callers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskPatterns {
    /// Distance in days between the current streak length and the nearest
    /// historical relapse streak length
    pub days_to_typical_relapse: Option<i64>,
    /// Current streak is within 3 days of a historical relapse length
    pub near_typical_relapse_length: bool,
    /// Share of resolved relapse outcomes determined in the evening (18-23h)
    pub evening_relapse_pct: Option<f64>,
    /// How many of energy/focus/confidence declined over the trailing 3 days
    pub declining_metrics: u32,
    /// Two or more metrics declined over the trailing 3 days
    pub benefit_decline: bool,
}

/// Result of a prediction, from either the model or the heuristic fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Near-term relapse risk, 0-100
    pub risk_score: u8,
    /// Confidence in the score, 0-1
    pub confidence: f64,
    pub factors: RiskFactors,
    pub patterns: RiskPatterns,
    /// Whether the trained model produced the score
    pub used_ml: bool,
}

/// Snapshot of model readiness and quality for callers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub is_ready: bool,
    pub accuracy: Option<f64>,
    pub precision: Option<f64>,
    pub recall: Option<f64>,
    pub f1_score: Option<f64>,
    pub needs_retraining: bool,
}

/// Midnight UTC on the given calendar day.
pub fn date_at_midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}
