//! Feature extraction
//!
//! Converts one day's tracking context (benefit entry, prior-day entry,
//! emotional check-ins, streak position) into the fixed 12-element feature
//! vector. Extraction is pure and never fails: invalid scalars resolve
//! through the defaults table instead of aborting.

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc, Weekday};

use crate::defaults::{self, BENEFIT, EMOTIONAL};
use crate::types::{BenefitEntry, EmotionalEntry, FeatureVector, UserData};

/// First streak day (inclusive) of the elevated-risk purge window.
pub const PURGE_WINDOW_START: u32 = 15;
/// Last streak day (inclusive) of the elevated-risk purge window.
pub const PURGE_WINDOW_END: u32 = 45;

/// Maximum lookback when matching an emotional check-in to a target date.
pub const EMOTIONAL_LOOKBACK_DAYS: i64 = 3;

/// Whether a streak day count falls inside the purge window.
pub fn in_purge_window(streak_days: u32) -> bool {
    (PURGE_WINDOW_START..=PURGE_WINDOW_END).contains(&streak_days)
}

/// Emotional metrics resolved for a target date, in vector order:
/// anxiety, mood stability, mental clarity, emotional processing.
fn emotional_for_date(entries: &[EmotionalEntry], target: NaiveDate) -> [f64; 4] {
    let matched = entries
        .iter()
        .filter(|e| {
            let gap = (target - e.date).num_days();
            (0..=EMOTIONAL_LOOKBACK_DAYS).contains(&gap)
        })
        .max_by_key(|e| e.date);

    match matched {
        Some(e) => [
            EMOTIONAL.resolve(e.anxiety),
            EMOTIONAL.resolve(e.mood_stability),
            EMOTIONAL.resolve(e.mental_clarity),
            EMOTIONAL.resolve(e.emotional_processing),
        ],
        None => [EMOTIONAL.default; 4],
    }
}

/// Extractor producing the 12-element vector consumed by the classifier.
pub struct FeatureExtractor;

impl FeatureExtractor {
    /// Extract features for one day.
    ///
    /// `streak_days` is supplied by the caller: the live counter at
    /// prediction time, the per-date count derived from streak records when
    /// building historical samples.
    pub fn extract(
        current: &BenefitEntry,
        previous: Option<&BenefitEntry>,
        as_of: DateTime<Utc>,
        streak_days: u32,
        emotional: &[EmotionalEntry],
    ) -> FeatureVector {
        let energy = BENEFIT.resolve(current.energy);
        let energy_drop = match previous {
            Some(prev) => BENEFIT.resolve(prev.energy) - energy,
            None => 0.0,
        };
        let [anxiety, mood_stability, mental_clarity, emotional_processing] =
            emotional_for_date(emotional, current.date);

        let mut vector: FeatureVector = [
            energy,
            BENEFIT.resolve(current.focus),
            BENEFIT.resolve(current.confidence),
            energy_drop,
            f64::from(as_of.hour()),
            if is_weekend(as_of) { 1.0 } else { 0.0 },
            f64::from(streak_days),
            if in_purge_window(streak_days) { 1.0 } else { 0.0 },
            anxiety,
            mood_stability,
            mental_clarity,
            emotional_processing,
        ];
        defaults::sanitize(&mut vector);
        vector
    }

    /// Extract features for the most recent tracked day in `user`, for
    /// prediction. With fewer than two entries the missing slots resolve to
    /// their defaults; with none, the whole vector is default-valued apart
    /// from the time and streak slots.
    pub fn extract_latest(user: &UserData, as_of: DateTime<Utc>) -> FeatureVector {
        let mut entries: Vec<&BenefitEntry> = user.benefit_entries.iter().collect();
        entries.sort_by_key(|e| e.date);

        match entries.as_slice() {
            [] => {
                let mut vector: FeatureVector = [
                    BENEFIT.default,
                    BENEFIT.default,
                    BENEFIT.default,
                    0.0,
                    f64::from(as_of.hour()),
                    if is_weekend(as_of) { 1.0 } else { 0.0 },
                    f64::from(user.current_streak_days),
                    if in_purge_window(user.current_streak_days) { 1.0 } else { 0.0 },
                    EMOTIONAL.default,
                    EMOTIONAL.default,
                    EMOTIONAL.default,
                    EMOTIONAL.default,
                ];
                defaults::sanitize(&mut vector);
                vector
            }
            [only] => Self::extract(
                only,
                None,
                as_of,
                user.current_streak_days,
                &user.emotional_entries,
            ),
            [.., prev, last] => Self::extract(
                last,
                Some(*prev),
                as_of,
                user.current_streak_days,
                &user.emotional_entries,
            ),
        }
    }
}

fn is_weekend(at: DateTime<Utc>) -> bool {
    matches!(at.weekday(), Weekday::Sat | Weekday::Sun)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::FEATURE_DOMAINS;
    use chrono::TimeZone;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn benefit(date: NaiveDate, energy: f64) -> BenefitEntry {
        BenefitEntry {
            date,
            energy,
            focus: 6.0,
            confidence: 7.0,
            aura: 5.0,
            sleep_quality: 6.0,
            workout_quality: 5.0,
        }
    }

    fn emotional(date: NaiveDate, anxiety: f64) -> EmotionalEntry {
        EmotionalEntry {
            date,
            anxiety,
            mood_stability: 6.0,
            mental_clarity: 7.0,
            emotional_processing: 5.0,
        }
    }

    #[test]
    fn test_vector_layout_and_energy_drop() {
        // 2024-01-16 is a Tuesday
        let as_of = Utc.with_ymd_and_hms(2024, 1, 16, 22, 30, 0).unwrap();
        let prev = benefit(d(2024, 1, 15), 8.0);
        let cur = benefit(d(2024, 1, 16), 5.0);
        let emo = vec![emotional(d(2024, 1, 16), 7.0)];

        let v = FeatureExtractor::extract(&cur, Some(&prev), as_of, 20, &emo);
        assert_eq!(v.len(), FEATURE_DOMAINS.len());
        assert_eq!(v[0], 5.0); // energy
        assert_eq!(v[1], 6.0); // focus
        assert_eq!(v[2], 7.0); // confidence
        assert_eq!(v[3], 3.0); // energy drop: 8 - 5
        assert_eq!(v[4], 22.0); // hour
        assert_eq!(v[5], 0.0); // Tuesday
        assert_eq!(v[6], 20.0); // streak days
        assert_eq!(v[7], 1.0); // day 20 inside purge window
        assert_eq!(v[8], 7.0); // anxiety
    }

    #[test]
    fn test_no_previous_day_zero_drop() {
        let as_of = Utc.with_ymd_and_hms(2024, 1, 16, 9, 0, 0).unwrap();
        let cur = benefit(d(2024, 1, 16), 4.0);
        let v = FeatureExtractor::extract(&cur, None, as_of, 3, &[]);
        assert_eq!(v[3], 0.0);
    }

    #[test]
    fn test_invalid_scalars_default_without_panic() {
        let as_of = Utc.with_ymd_and_hms(2024, 1, 20, 12, 0, 0).unwrap();
        let mut cur = benefit(d(2024, 1, 20), f64::NAN);
        cur.focus = f64::INFINITY;
        cur.confidence = -4.0;

        let v = FeatureExtractor::extract(&cur, None, as_of, 1, &[]);
        assert_eq!(v[0], 5.0);
        assert_eq!(v[1], 5.0);
        assert_eq!(v[2], 0.0);
        assert!(v.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn test_purge_window_bounds() {
        assert!(!in_purge_window(14));
        assert!(in_purge_window(15));
        assert!(in_purge_window(45));
        assert!(!in_purge_window(46));
    }

    #[test]
    fn test_weekend_flag() {
        // 2024-01-20 is a Saturday
        let sat = Utc.with_ymd_and_hms(2024, 1, 20, 12, 0, 0).unwrap();
        let cur = benefit(d(2024, 1, 20), 6.0);
        let v = FeatureExtractor::extract(&cur, None, sat, 1, &[]);
        assert_eq!(v[5], 1.0);
    }

    #[test]
    fn test_emotional_exact_match_wins() {
        let as_of = Utc.with_ymd_and_hms(2024, 1, 16, 12, 0, 0).unwrap();
        let cur = benefit(d(2024, 1, 16), 6.0);
        let emo = vec![
            emotional(d(2024, 1, 14), 3.0),
            emotional(d(2024, 1, 16), 9.0),
        ];
        let v = FeatureExtractor::extract(&cur, None, as_of, 1, &emo);
        assert_eq!(v[8], 9.0);
    }

    #[test]
    fn test_emotional_nearest_within_lookback() {
        let as_of = Utc.with_ymd_and_hms(2024, 1, 16, 12, 0, 0).unwrap();
        let cur = benefit(d(2024, 1, 16), 6.0);
        let emo = vec![
            emotional(d(2024, 1, 13), 3.0),
            emotional(d(2024, 1, 14), 8.0),
        ];
        let v = FeatureExtractor::extract(&cur, None, as_of, 1, &emo);
        assert_eq!(v[8], 8.0);
    }

    #[test]
    fn test_emotional_outside_lookback_defaults() {
        let as_of = Utc.with_ymd_and_hms(2024, 1, 16, 12, 0, 0).unwrap();
        let cur = benefit(d(2024, 1, 16), 6.0);
        // 4 days back, and one in the future: neither qualifies
        let emo = vec![
            emotional(d(2024, 1, 12), 3.0),
            emotional(d(2024, 1, 17), 9.0),
        ];
        let v = FeatureExtractor::extract(&cur, None, as_of, 1, &emo);
        assert_eq!(v[8], 5.0);
    }

    #[test]
    fn test_extract_latest_handles_sparse_histories() {
        let as_of = Utc.with_ymd_and_hms(2024, 1, 16, 12, 0, 0).unwrap();

        let empty = UserData::default();
        let v = FeatureExtractor::extract_latest(&empty, as_of);
        assert_eq!(v[0], 5.0);
        assert_eq!(v[3], 0.0);

        let mut one = UserData::default();
        one.benefit_entries.push(benefit(d(2024, 1, 15), 7.0));
        let v = FeatureExtractor::extract_latest(&one, as_of);
        assert_eq!(v[0], 7.0);
        assert_eq!(v[3], 0.0);

        let mut two = one.clone();
        two.benefit_entries.push(benefit(d(2024, 1, 16), 4.0));
        let v = FeatureExtractor::extract_latest(&two, as_of);
        assert_eq!(v[0], 4.0);
        assert_eq!(v[3], 3.0);
    }
}
