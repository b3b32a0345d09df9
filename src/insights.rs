//! Risk factors and historical patterns
//!
//! Both predictor variants attach the same human-interpretable context to a
//! score: factors thresholded on raw (un-normalized) feature values, and
//! coarse patterns mined from streak history, the intervention ledger and
//! the trailing benefit window.

use crate::ledger::InterventionLedger;
use crate::types::{BenefitEntry, FeatureVector, RiskFactors, RiskPatterns, UserData};

/// Energy at or below this reads as depleted.
pub const LOW_ENERGY_MAX: f64 = 3.0;
/// Day-over-day energy drop at or above this is flagged.
pub const ENERGY_DROP_MIN: f64 = 3.0;
/// Focus at or below this reads as scattered.
pub const LOW_FOCUS_MAX: f64 = 3.0;
/// Anxiety at or above this is flagged.
pub const HIGH_ANXIETY_MIN: f64 = 7.0;
/// Mood stability at or below this is flagged.
pub const LOW_MOOD_STABILITY_MAX: f64 = 4.0;
/// Streak lengths within this many days of a historical relapse length
/// count as "near".
pub const NEAR_RELAPSE_DAYS: i64 = 3;
/// Trailing window for benefit-decline detection.
pub const DECLINE_WINDOW_DAYS: usize = 3;
/// Per-metric drop that counts as a decline over the trailing window.
pub const DECLINE_DELTA: f64 = 1.0;

/// Threshold raw feature values into interpretable factors.
pub fn derive_factors(raw: &FeatureVector) -> RiskFactors {
    let hour = raw[4];
    RiskFactors {
        low_energy: raw[0] <= LOW_ENERGY_MAX,
        energy_drop: raw[3] >= ENERGY_DROP_MIN,
        low_focus: raw[1] <= LOW_FOCUS_MAX,
        late_night: hour >= 22.0 || hour < 4.0,
        weekend: raw[5] >= 1.0,
        purge_phase: raw[7] >= 1.0,
        high_anxiety: raw[8] >= HIGH_ANXIETY_MIN,
        low_mood_stability: raw[9] <= LOW_MOOD_STABILITY_MAX,
    }
}

/// Mine coarse patterns from history used to justify the score.
pub fn derive_patterns(user: &UserData, ledger: &InterventionLedger) -> RiskPatterns {
    let days_to_typical_relapse = nearest_relapse_distance(user);
    let declining_metrics = declining_metric_count(&user.benefit_entries);

    RiskPatterns {
        days_to_typical_relapse,
        near_typical_relapse_length: days_to_typical_relapse
            .map_or(false, |d| d <= NEAR_RELAPSE_DAYS),
        evening_relapse_pct: ledger.evening_relapse_pct(),
        declining_metrics,
        benefit_decline: declining_metrics >= 2,
    }
}

/// Distance in days between the current streak length and the nearest
/// historical relapse streak length.
fn nearest_relapse_distance(user: &UserData) -> Option<i64> {
    user.relapse_records()
        .map(|s| (i64::from(user.current_streak_days) - i64::from(s.days)).abs())
        .min()
}

/// How many of energy/focus/confidence fell over the trailing window.
fn declining_metric_count(entries: &[BenefitEntry]) -> u32 {
    let mut sorted: Vec<&BenefitEntry> = entries.iter().collect();
    sorted.sort_by_key(|e| e.date);
    if sorted.len() < DECLINE_WINDOW_DAYS {
        return 0;
    }

    let window = &sorted[sorted.len() - DECLINE_WINDOW_DAYS..];
    let oldest = window[0];
    let newest = window[window.len() - 1];

    [
        (oldest.energy, newest.energy),
        (oldest.focus, newest.focus),
        (oldest.confidence, newest.confidence),
    ]
    .iter()
    .filter(|(before, after)| before - after >= DECLINE_DELTA)
    .count() as u32
}
