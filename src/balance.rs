//! Class balancing and outcome feedback
//!
//! Relapse days are rare, so training uses inverse-frequency class weights.
//! On top of those, resolved intervention outcomes from the ledger boost the
//! weight of samples recorded near a mispredicted alert, increasing learning
//! emphasis on the situations the model got wrong without altering labels or
//! removing samples.

use chrono::NaiveDate;

use crate::ledger::{FeedbackRecord, OutcomeStatus};
use crate::types::{date_at_midnight, ClassWeights};

/// Predicted-risk threshold separating "alerted" from "not alerted" when
/// classifying a past prediction as a false positive or false negative.
pub const FEEDBACK_RISK_THRESHOLD: u8 = 50;

/// Balancer computing class and per-sample weights.
pub struct ClassBalancer;

impl ClassBalancer {
    /// Inverse class frequency weights: `weight_c = N / (2 * count_c)`,
    /// each capped. An absent class gets the cap, though the minimum-data
    /// policy keeps that from occurring in practice.
    pub fn class_weights(labels: &[u8], cap: f64) -> ClassWeights {
        let n = labels.len() as f64;
        let positives = labels.iter().filter(|l| **l == 1).count() as f64;
        let negatives = n - positives;

        let weight_for = |count: f64| {
            if count <= 0.0 {
                cap
            } else {
                (n / (2.0 * count)).min(cap)
            }
        };

        ClassWeights {
            weight0: weight_for(negatives),
            weight1: weight_for(positives),
        }
    }

    /// Map each label to its class weight.
    pub fn sample_weights(labels: &[u8], class_weights: &ClassWeights) -> Vec<f64> {
        labels
            .iter()
            .map(|label| {
                if *label == 1 {
                    class_weights.weight1
                } else {
                    class_weights.weight0
                }
            })
            .collect()
    }

    /// Apply outcome feedback: every sample dated within `window_hours` of a
    /// mispredicted intervention's creation has its weight multiplied by
    /// `boost`. Returns how many feedback records boosted at least one
    /// sample.
    pub fn apply_feedback(
        weights: &mut [f64],
        sample_dates: &[NaiveDate],
        feedback: &[FeedbackRecord],
        boost: f64,
        window_hours: i64,
    ) -> usize {
        debug_assert_eq!(weights.len(), sample_dates.len());

        let mut used = 0;
        for record in feedback.iter().filter(|r| is_misprediction(r)) {
            let mut matched = false;
            for (weight, date) in weights.iter_mut().zip(sample_dates.iter()) {
                let gap = date_at_midnight(*date) - record.created_at;
                if gap.num_hours().abs() <= window_hours {
                    *weight *= boost;
                    matched = true;
                }
            }
            if matched {
                used += 1;
            }
        }
        used
    }
}

/// A resolved intervention whose prediction disagreed with its outcome:
/// alerted but no relapse followed (false positive), or not alerted and a
/// relapse followed (false negative).
fn is_misprediction(record: &FeedbackRecord) -> bool {
    let Some(risk) = record.predicted_risk else {
        return false;
    };
    match record.outcome {
        OutcomeStatus::Success => risk >= FEEDBACK_RISK_THRESHOLD,
        OutcomeStatus::Relapse => risk < FEEDBACK_RISK_THRESHOLD,
        OutcomeStatus::Pending => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn record(risk: Option<u8>, outcome: OutcomeStatus, y: i32, m: u32, day: u32) -> FeedbackRecord {
        FeedbackRecord {
            created_at: Utc.with_ymd_and_hms(y, m, day, 12, 0, 0).unwrap(),
            predicted_risk: risk,
            outcome,
        }
    }

    #[test]
    fn test_inverse_frequency_ratio() {
        // 2 relapses out of 20
        let mut labels = vec![0u8; 18];
        labels.extend([1, 1]);

        let cw = ClassBalancer::class_weights(&labels, 10.0);
        // weight1/weight0 == negatives/positives == 18/2
        assert!((cw.weight1 / cw.weight0 - 9.0).abs() < 1e-9);
        assert!((cw.weight0 - 20.0 / 36.0).abs() < 1e-9);
        assert!((cw.weight1 - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_weights_capped() {
        // 1 relapse out of 50: uncapped weight1 would be 25
        let mut labels = vec![0u8; 49];
        labels.push(1);

        let cw = ClassBalancer::class_weights(&labels, 10.0);
        assert_eq!(cw.weight1, 10.0);
        assert!(cw.weight0 <= 10.0);
    }

    #[test]
    fn test_absent_class_gets_cap() {
        let labels = vec![0u8; 10];
        let cw = ClassBalancer::class_weights(&labels, 10.0);
        assert_eq!(cw.weight1, 10.0);
    }

    #[test]
    fn test_sample_weight_mapping() {
        let labels = vec![0, 1, 0, 1];
        let cw = ClassWeights { weight0: 0.5, weight1: 2.0 };
        let weights = ClassBalancer::sample_weights(&labels, &cw);
        assert_eq!(weights, vec![0.5, 2.0, 0.5, 2.0]);
    }

    #[test]
    fn test_false_positive_boosts_nearby_samples() {
        let dates = vec![d(2024, 3, 9), d(2024, 3, 10), d(2024, 3, 20)];
        let mut weights = vec![1.0, 1.0, 1.0];
        // Alerted at risk 80 on March 9 noon; no relapse followed.
        let feedback = vec![record(Some(80), OutcomeStatus::Success, 2024, 3, 9)];

        let used = ClassBalancer::apply_feedback(&mut weights, &dates, &feedback, 1.5, 24);
        assert_eq!(used, 1);
        // March 9 midnight is 12h before creation, March 10 midnight 12h after.
        assert_eq!(weights, vec![1.5, 1.5, 1.0]);
    }

    #[test]
    fn test_false_negative_boosts_nearby_samples() {
        let dates = vec![d(2024, 3, 9)];
        let mut weights = vec![2.0];
        let feedback = vec![record(Some(20), OutcomeStatus::Relapse, 2024, 3, 9)];

        let used = ClassBalancer::apply_feedback(&mut weights, &dates, &feedback, 1.5, 24);
        assert_eq!(used, 1);
        assert!((weights[0] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_correct_predictions_do_not_boost() {
        let dates = vec![d(2024, 3, 9)];
        let mut weights = vec![1.0];
        let feedback = vec![
            // High risk, relapse happened: correct call.
            record(Some(80), OutcomeStatus::Relapse, 2024, 3, 9),
            // Low risk, no relapse: correct call.
            record(Some(20), OutcomeStatus::Success, 2024, 3, 9),
            // Unresolved and unscored records never count.
            record(Some(80), OutcomeStatus::Pending, 2024, 3, 9),
            record(None, OutcomeStatus::Relapse, 2024, 3, 9),
        ];

        let used = ClassBalancer::apply_feedback(&mut weights, &dates, &feedback, 1.5, 24);
        assert_eq!(used, 0);
        assert_eq!(weights, vec![1.0]);
    }

    #[test]
    fn test_feedback_outside_window_ignored() {
        let dates = vec![d(2024, 3, 12)];
        let mut weights = vec![1.0];
        let feedback = vec![record(Some(90), OutcomeStatus::Success, 2024, 3, 9)];

        let used = ClassBalancer::apply_feedback(&mut weights, &dates, &feedback, 1.5, 24);
        assert_eq!(used, 0);
        assert_eq!(weights, vec![1.0]);
    }
}
