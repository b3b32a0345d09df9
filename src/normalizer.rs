//! Feature normalization
//!
//! Fits per-column z-score statistics over the training matrix and applies
//! them elementwise. Statistics are a training-time artifact: they are
//! persisted with the model and reused verbatim at inference until the next
//! retrain overwrites them. Inference with no statistics never errors; the
//! engine routes that case to the heuristic predictor.

use serde::{Deserialize, Serialize};

use crate::types::{FeatureVector, FEATURE_COUNT};

/// Floor applied to per-column standard deviations to avoid division by
/// zero on constant columns.
pub const STD_FLOOR: f64 = 1e-6;

/// Per-column population mean and standard deviation over the training
/// matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationStats {
    pub means: [f64; FEATURE_COUNT],
    pub stds: [f64; FEATURE_COUNT],
}

/// Normalizer fitting and applying z-score statistics.
pub struct Normalizer;

impl Normalizer {
    /// Fit population statistics over the full training matrix.
    pub fn fit(rows: &[FeatureVector]) -> NormalizationStats {
        let mut means = [0.0; FEATURE_COUNT];
        let mut stds = [STD_FLOOR; FEATURE_COUNT];
        if rows.is_empty() {
            return NormalizationStats { means, stds };
        }

        let n = rows.len() as f64;
        for row in rows {
            for (mean, value) in means.iter_mut().zip(row.iter()) {
                *mean += value;
            }
        }
        for mean in means.iter_mut() {
            *mean /= n;
        }

        for (col, std) in stds.iter_mut().enumerate() {
            let variance = rows
                .iter()
                .map(|row| {
                    let delta = row[col] - means[col];
                    delta * delta
                })
                .sum::<f64>()
                / n;
            *std = variance.sqrt().max(STD_FLOOR);
        }

        NormalizationStats { means, stds }
    }

    /// Apply fitted statistics to a single vector.
    pub fn apply(stats: &NormalizationStats, vector: &FeatureVector) -> FeatureVector {
        let mut out = [0.0; FEATURE_COUNT];
        for col in 0..FEATURE_COUNT {
            out[col] = (vector[col] - stats.means[col]) / stats.stds[col];
        }
        out
    }

    /// Apply fitted statistics to every row of a matrix.
    pub fn apply_all(stats: &NormalizationStats, rows: &[FeatureVector]) -> Vec<FeatureVector> {
        rows.iter().map(|row| Self::apply(stats, row)).collect()
    }
}
