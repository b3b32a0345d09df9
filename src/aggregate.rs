//! Anonymized aggregates and sink interfaces
//!
//! After an opted-in training run the engine forwards a summary to an
//! external sink. The payload is anonymous by construction: it carries no
//! per-day dates and no identifiers, only rounded aggregates and bucketed
//! counts. Submission is fire-and-forget; a failing sink is logged and can
//! never affect the training result.
//!
//! The notification sink is the other collaborator boundary: it is invoked
//! only when an assessment crosses the alert threshold. Delivery mechanics
//! are out of scope.

use std::collections::BTreeMap;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::features::in_purge_window;
use crate::ledger::InterventionLedger;
use crate::types::{EvalReport, RiskAssessment, TrainingHistory, UserData};

/// Receives alert-worthy assessments. Invoked only at or above the
/// configured alert threshold.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, assessment: &RiskAssessment);
}

/// Receives anonymized post-training summaries when the user opted in.
pub trait AggregateSink: Send + Sync {
    fn submit(&self, summary: &AnonymizedSummary) -> Result<(), EngineError>;
}

/// Rounded, bucketed post-training summary. No dates, no identifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnonymizedSummary {
    pub schema_version: u32,
    /// Relapse streak lengths, bucketed by duration
    pub relapse_streak_histogram: BTreeMap<String, u32>,
    /// Mean energy drop over the 3 days leading into a relapse, rounded
    pub avg_energy_delta_before_relapse: Option<f64>,
    /// Share of relapses whose streak length fell in the purge window
    pub purge_window_relapse_ratio: Option<f64>,
    /// Share of attributed relapses resolved in the evening
    pub evening_relapse_ratio: Option<f64>,
    /// Training-set size, bucketed
    pub sample_count_bucket: String,
    /// Model metrics from the run, rounded
    pub metrics: Option<EvalReport>,
}

/// Version stamp on the summary payload.
pub const SUMMARY_SCHEMA_VERSION: u32 = 1;

/// Build the post-training summary from history and the ledger.
pub fn build_summary(
    user: &UserData,
    ledger: &InterventionLedger,
    history: &TrainingHistory,
) -> AnonymizedSummary {
    let mut histogram = BTreeMap::new();
    for record in user.relapse_records() {
        *histogram.entry(streak_bucket(record.days)).or_insert(0) += 1;
    }

    let purge_window_relapse_ratio = {
        let lengths: Vec<u32> = user.relapse_records().map(|r| r.days).collect();
        if lengths.is_empty() {
            None
        } else {
            let inside = lengths.iter().filter(|d| in_purge_window(**d)).count();
            Some(round_to(inside as f64 / lengths.len() as f64, 100.0))
        }
    };

    AnonymizedSummary {
        schema_version: SUMMARY_SCHEMA_VERSION,
        relapse_streak_histogram: histogram,
        avg_energy_delta_before_relapse: energy_delta_before_relapse(user),
        purge_window_relapse_ratio,
        evening_relapse_ratio: ledger
            .evening_relapse_pct()
            .map(|pct| round_to(pct, 100.0)),
        sample_count_bucket: sample_bucket(history.samples).to_string(),
        metrics: history.metrics.map(round_metrics),
    }
}

fn streak_bucket(days: u32) -> String {
    match days {
        0..=7 => "1-7",
        8..=14 => "8-14",
        15..=30 => "15-30",
        31..=60 => "31-60",
        _ => "61+",
    }
    .to_string()
}

fn sample_bucket(samples: usize) -> &'static str {
    match samples {
        0 => "0",
        1..=9 => "1-9",
        10..=49 => "10-49",
        50..=199 => "50-199",
        _ => "200+",
    }
}

/// Mean of (energy three days before a relapse − energy on the relapse
/// day), over relapses where both entries exist. Rounded to one decimal.
fn energy_delta_before_relapse(user: &UserData) -> Option<f64> {
    let mut deltas = Vec::new();
    for record in user.relapse_records() {
        let Some(end) = record.end else { continue };
        let on_end = user.benefit_entries.iter().find(|e| e.date == end);
        let before = user
            .benefit_entries
            .iter()
            .find(|e| e.date == end - Duration::days(3));
        if let (Some(on_end), Some(before)) = (on_end, before) {
            deltas.push(before.energy - on_end.energy);
        }
    }
    if deltas.is_empty() {
        return None;
    }
    Some(round_to(
        deltas.iter().sum::<f64>() / deltas.len() as f64,
        10.0,
    ))
}

fn round_metrics(metrics: EvalReport) -> EvalReport {
    EvalReport {
        precision: round_to(metrics.precision, 1000.0),
        recall: round_to(metrics.recall, 1000.0),
        f1_score: round_to(metrics.f1_score, 1000.0),
        accuracy: round_to(metrics.accuracy, 1000.0),
        confusion_matrix: metrics.confusion_matrix,
    }
}

fn round_to(value: f64, scale: f64) -> f64 {
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BenefitEntry, ClassWeights, StreakEndReason, StreakRecord};
    use chrono::{NaiveDate, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn relapse(days: u32, end: NaiveDate) -> StreakRecord {
        StreakRecord {
            start: end - Duration::days(i64::from(days) - 1),
            end: Some(end),
            days,
            reason: Some(StreakEndReason::Relapse),
            trigger: None,
        }
    }

    fn benefit(date: NaiveDate, energy: f64) -> BenefitEntry {
        BenefitEntry {
            date,
            energy,
            focus: 5.0,
            confidence: 5.0,
            aura: 5.0,
            sleep_quality: 5.0,
            workout_quality: 5.0,
        }
    }

    fn history(samples: usize) -> TrainingHistory {
        TrainingHistory {
            last_trained: Utc.with_ymd_and_hms(2024, 3, 20, 8, 0, 0).unwrap(),
            samples,
            final_loss: 0.31234,
            final_accuracy: 0.894561,
            metrics: Some(EvalReport {
                precision: 0.666666,
                recall: 0.5,
                f1_score: 0.571428,
                accuracy: 0.894561,
                confusion_matrix: Default::default(),
            }),
            class_weights: ClassWeights { weight0: 0.55, weight1: 4.75 },
            feedback_samples_used: 1,
        }
    }

    fn sample_user() -> UserData {
        UserData {
            benefit_entries: vec![
                benefit(d(2024, 3, 5), 8.0),
                benefit(d(2024, 3, 8), 5.0),
            ],
            emotional_entries: Vec::new(),
            streak_records: vec![
                relapse(18, d(2024, 3, 8)),
                relapse(6, d(2024, 2, 10)),
                relapse(20, d(2024, 1, 20)),
            ],
            current_streak_days: 4,
        }
    }

    #[test]
    fn test_histogram_buckets() {
        let summary = build_summary(
            &sample_user(),
            &InterventionLedger::default(),
            &history(19),
        );
        assert_eq!(summary.relapse_streak_histogram["15-30"], 2);
        assert_eq!(summary.relapse_streak_histogram["1-7"], 1);
        assert_eq!(summary.sample_count_bucket, "10-49");
    }

    #[test]
    fn test_energy_delta_rounded() {
        let summary = build_summary(
            &sample_user(),
            &InterventionLedger::default(),
            &history(19),
        );
        // Only the 2024-03-08 relapse has entries on the day and 3 days
        // prior: 8.0 - 5.0 = 3.0.
        assert_eq!(summary.avg_energy_delta_before_relapse, Some(3.0));
    }

    #[test]
    fn test_purge_window_ratio() {
        let summary = build_summary(
            &sample_user(),
            &InterventionLedger::default(),
            &history(19),
        );
        // Lengths 18 and 20 sit inside the purge window; 6 does not.
        assert_eq!(summary.purge_window_relapse_ratio, Some(0.67));
    }

    #[test]
    fn test_metrics_rounded() {
        let summary = build_summary(
            &sample_user(),
            &InterventionLedger::default(),
            &history(19),
        );
        let metrics = summary.metrics.unwrap();
        assert_eq!(metrics.precision, 0.667);
        assert_eq!(metrics.f1_score, 0.571);
    }

    #[test]
    fn test_payload_carries_no_dates_or_ids() {
        let mut ledger = InterventionLedger::default();
        let at = Utc.with_ymd_and_hms(2024, 3, 10, 20, 0, 0).unwrap();
        ledger.create(at, None);
        ledger.on_relapse(at + Duration::hours(1), Some("relapse-uuid"));

        let summary = build_summary(&sample_user(), &ledger, &history(19));
        let json = serde_json::to_string(&summary).unwrap();

        for needle in ["date", "_id", "uuid", "2024"] {
            assert!(!json.contains(needle), "payload leaked {needle:?}: {json}");
        }
    }

    #[test]
    fn test_empty_history_degrades_gracefully() {
        let user = UserData::default();
        let summary = build_summary(
            &user,
            &InterventionLedger::default(),
            &TrainingHistory {
                metrics: None,
                samples: 0,
                ..history(0)
            },
        );
        assert!(summary.relapse_streak_histogram.is_empty());
        assert_eq!(summary.avg_energy_delta_before_relapse, None);
        assert_eq!(summary.purge_window_relapse_ratio, None);
        assert_eq!(summary.sample_count_bucket, "0");
        assert!(summary.metrics.is_none());
    }
}
