//! Feature domains and defaulting
//!
//! Every scalar that enters the feature pipeline has its domain bounds and
//! fallback default declared here, in one auditable table. Invalid or missing
//! values never abort extraction; they resolve through this table instead.

/// Domain bounds and fallback default for one feature slot.
#[derive(Debug, Clone, Copy)]
pub struct FeatureDomain {
    /// Feature name as it appears in the vector layout
    pub name: &'static str,
    /// Inclusive lower bound
    pub min: f64,
    /// Inclusive upper bound
    pub max: f64,
    /// Value substituted for missing or non-finite input
    pub default: f64,
}

impl FeatureDomain {
    /// Resolve a raw value against this domain: non-finite input falls back
    /// to the default, everything else is clamped into bounds.
    pub fn resolve(&self, value: f64) -> f64 {
        if !value.is_finite() {
            return self.default;
        }
        value.clamp(self.min, self.max)
    }

    /// Resolve an optional value, defaulting when absent.
    pub fn resolve_opt(&self, value: Option<f64>) -> f64 {
        match value {
            Some(v) => self.resolve(v),
            None => self.default,
        }
    }
}

/// Self-reported benefit metrics (energy, focus, confidence, aura, sleep
/// quality, workout quality): 0-10, default 5.
pub const BENEFIT: FeatureDomain = FeatureDomain {
    name: "benefit",
    min: 0.0,
    max: 10.0,
    default: 5.0,
};

/// Emotional check-in metrics (anxiety, mood stability, mental clarity,
/// emotional processing): 1-10, default 5.
pub const EMOTIONAL: FeatureDomain = FeatureDomain {
    name: "emotional",
    min: 1.0,
    max: 10.0,
    default: 5.0,
};

/// Domains for the 12 feature-vector slots, in vector order.
pub const FEATURE_DOMAINS: [FeatureDomain; 12] = [
    FeatureDomain { name: "energy", min: 0.0, max: 10.0, default: 5.0 },
    FeatureDomain { name: "focus", min: 0.0, max: 10.0, default: 5.0 },
    FeatureDomain { name: "confidence", min: 0.0, max: 10.0, default: 5.0 },
    FeatureDomain { name: "energy_drop", min: -10.0, max: 10.0, default: 0.0 },
    FeatureDomain { name: "hour_of_day", min: 0.0, max: 23.0, default: 0.0 },
    FeatureDomain { name: "is_weekend", min: 0.0, max: 1.0, default: 0.0 },
    FeatureDomain { name: "streak_day_count", min: 0.0, max: 10_000.0, default: 0.0 },
    FeatureDomain { name: "in_purge_window", min: 0.0, max: 1.0, default: 0.0 },
    FeatureDomain { name: "anxiety", min: 1.0, max: 10.0, default: 5.0 },
    FeatureDomain { name: "mood_stability", min: 1.0, max: 10.0, default: 5.0 },
    FeatureDomain { name: "mental_clarity", min: 1.0, max: 10.0, default: 5.0 },
    FeatureDomain { name: "emotional_processing", min: 1.0, max: 10.0, default: 5.0 },
];

/// Sanitize a full feature vector against the slot domains.
pub fn sanitize(vector: &mut [f64; 12]) {
    for (value, domain) in vector.iter_mut().zip(FEATURE_DOMAINS.iter()) {
        *value = domain.resolve(*value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_clamps_and_defaults() {
        assert_eq!(BENEFIT.resolve(7.0), 7.0);
        assert_eq!(BENEFIT.resolve(-3.0), 0.0);
        assert_eq!(BENEFIT.resolve(42.0), 10.0);
        assert_eq!(BENEFIT.resolve(f64::NAN), 5.0);
        assert_eq!(BENEFIT.resolve(f64::INFINITY), 5.0);
        assert_eq!(BENEFIT.resolve_opt(None), 5.0);
    }

    #[test]
    fn test_emotional_lower_bound() {
        assert_eq!(EMOTIONAL.resolve(0.0), 1.0);
        assert_eq!(EMOTIONAL.resolve_opt(None), 5.0);
    }

    #[test]
    fn test_sanitize_full_vector() {
        let mut v = [
            f64::NAN,
            11.0,
            5.0,
            -20.0,
            30.0,
            2.0,
            -1.0,
            0.5,
            0.0,
            5.0,
            5.0,
            f64::NEG_INFINITY,
        ];
        sanitize(&mut v);
        assert_eq!(v[0], 5.0); // energy NaN -> default
        assert_eq!(v[1], 10.0); // focus clamped
        assert_eq!(v[3], -10.0); // energy_drop clamped
        assert_eq!(v[4], 23.0); // hour clamped
        assert_eq!(v[5], 1.0); // weekend flag clamped
        assert_eq!(v[6], 0.0); // streak days clamped
        assert_eq!(v[8], 1.0); // anxiety raised to domain floor
        assert_eq!(v[11], 5.0); // emotional_processing -inf -> default
        assert!(v.iter().all(|x| x.is_finite()));
    }
}
