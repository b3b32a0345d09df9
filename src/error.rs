//! Error types for the relapse-sentinel engine

use thiserror::Error;

/// Errors that can occur during training, persistence or ledger updates.
///
/// Prediction never returns an error: a missing model or missing
/// normalization statistics routes to the heuristic predictor instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("insufficient training data: {0}")]
    InsufficientData(DataShortfall),

    #[error("normalization statistics are missing")]
    MissingNormalizationStats,

    #[error("persisted state is corrupt: {0}")]
    CorruptState(String),

    #[error("training failed: {0}")]
    Training(String),

    #[error("a training run is already in progress")]
    TrainingBusy,

    #[error("training run was cancelled")]
    TrainingCancelled,

    #[error("invalid model blob: {0}")]
    InvalidModel(String),

    #[error("unknown intervention: {0}")]
    UnknownIntervention(uuid::Uuid),

    #[error("ledger operation rejected: {0}")]
    Ledger(String),

    #[error("invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    StorageError(#[from] std::io::Error),
}

/// Which minimum-data requirement a refused training run failed to meet.
///
/// Training requires all three minimums at once; the first unmet one is
/// reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataShortfall {
    BenefitDays { have: usize, need: usize },
    Relapses { have: usize, need: usize },
    Samples { have: usize, need: usize },
}

impl std::fmt::Display for DataShortfall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataShortfall::BenefitDays { have, need } => {
                write!(f, "{have} benefit days logged, {need} required")
            }
            DataShortfall::Relapses { have, need } => {
                write!(f, "{have} historical relapses, {need} required")
            }
            DataShortfall::Samples { have, need } => {
                write!(f, "{have} derivable samples, {need} required")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shortfall_display() {
        let err = EngineError::InsufficientData(DataShortfall::BenefitDays { have: 5, need: 14 });
        let msg = err.to_string();
        assert!(msg.contains("5 benefit days"));
        assert!(msg.contains("14 required"));
    }

    #[test]
    fn test_json_error_conversion() {
        let parse_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: EngineError = parse_err.into();
        assert!(matches!(err, EngineError::JsonError(_)));
    }
}
