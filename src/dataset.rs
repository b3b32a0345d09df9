//! Training-set construction
//!
//! Walks the benefit-day history into (features, label, date) samples, one
//! per consecutive benefit-day pair, and enforces the minimum viable dataset
//! policy before any training state is touched.

use std::collections::BTreeSet;

use chrono::NaiveDate;

use crate::config::EngineConfig;
use crate::error::{DataShortfall, EngineError};
use crate::features::FeatureExtractor;
use crate::types::{date_at_midnight, BenefitEntry, StreakRecord, TrainingSample, UserData};

/// Builder producing labeled training samples from a user-data snapshot.
pub struct TrainingSetBuilder;

impl TrainingSetBuilder {
    /// Build one sample per consecutive benefit-day pair (count = days − 1).
    ///
    /// The sample is dated on the later day of the pair; its label is 1 iff
    /// a relapse streak ended on exactly that calendar date.
    pub fn build(user: &UserData) -> Vec<TrainingSample> {
        let mut entries: Vec<&BenefitEntry> = user.benefit_entries.iter().collect();
        entries.sort_by_key(|e| e.date);

        let relapse_dates = relapse_dates(&user.streak_records);

        entries
            .windows(2)
            .map(|pair| {
                let (previous, current) = (pair[0], pair[1]);
                let streak_days = streak_days_on(&user.streak_records, current.date);
                let features = FeatureExtractor::extract(
                    current,
                    Some(previous),
                    date_at_midnight(current.date),
                    streak_days,
                    &user.emotional_entries,
                );
                TrainingSample {
                    features,
                    label: u8::from(relapse_dates.contains(&current.date)),
                    date: current.date,
                }
            })
            .collect()
    }

    /// Enforce the minimum viable dataset policy. Returns the typed
    /// shortfall on refusal; mutates nothing.
    pub fn check_minimums(
        user: &UserData,
        samples: &[TrainingSample],
        config: &EngineConfig,
    ) -> Result<(), EngineError> {
        let benefit_days: BTreeSet<NaiveDate> =
            user.benefit_entries.iter().map(|e| e.date).collect();
        if benefit_days.len() < config.min_benefit_days {
            return Err(EngineError::InsufficientData(DataShortfall::BenefitDays {
                have: benefit_days.len(),
                need: config.min_benefit_days,
            }));
        }

        let relapses = user.relapse_records().count();
        if relapses < config.min_relapses {
            return Err(EngineError::InsufficientData(DataShortfall::Relapses {
                have: relapses,
                need: config.min_relapses,
            }));
        }

        if samples.len() < config.min_samples {
            return Err(EngineError::InsufficientData(DataShortfall::Samples {
                have: samples.len(),
                need: config.min_samples,
            }));
        }

        Ok(())
    }
}

/// Calendar dates on which a relapse streak ended. A set, so a date can
/// never be double-counted.
fn relapse_dates(streaks: &[StreakRecord]) -> BTreeSet<NaiveDate> {
    streaks
        .iter()
        .filter(|s| s.is_relapse())
        .filter_map(|s| s.end)
        .collect()
}

/// Streak day count on a historical date, derived from the record covering
/// it. The live counter only describes today, so past sample dates fall back
/// to their covering record; dates no record covers count as day 0.
fn streak_days_on(streaks: &[StreakRecord], date: NaiveDate) -> u32 {
    streaks
        .iter()
        .find(|s| s.start <= date && s.end.map_or(true, |end| date <= end))
        .map(|s| ((date - s.start).num_days() + 1).max(0) as u32)
        .unwrap_or(0)
}
