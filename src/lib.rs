//! Relapse Sentinel - On-device predictive-risk engine for behavioral
//! relapse prevention
//!
//! Sentinel learns a user's personal patterns from self-reported tracking
//! data and produces a calibrated near-term relapse risk through a
//! deterministic pipeline: feature extraction → normalization → training-set
//! construction → class balancing → classification → evaluation. A closed
//! feedback loop records whether alert-triggered interventions succeeded or
//! failed and feeds those outcomes back into the next training run as
//! sample-weight adjustments.
//!
//! ## Modules
//!
//! - **Pipeline**: feature extraction, normalization, dataset construction,
//!   class balancing, the feed-forward classifier and its evaluation
//! - **Ledger**: append-only intervention outcomes with a fixed-window
//!   state machine and derived analytics
//! - **Engine**: the orchestrating façade with persistence, fallback
//!   prediction and sink boundaries

pub mod aggregate;
pub mod balance;
pub mod config;
pub mod dataset;
pub mod defaults;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod features;
pub mod heuristic;
pub mod insights;
pub mod ledger;
pub mod model;
pub mod normalizer;
pub mod predictor;
pub mod store;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use aggregate::{AggregateSink, AnonymizedSummary, NotificationSink};
pub use config::EngineConfig;
pub use engine::{RiskEngine, TrainSettings, TrainingReport};
pub use error::{DataShortfall, EngineError};
pub use ledger::{InterventionLedger, PredictionSnapshot, ResponseKind};
pub use model::{CancelToken, Classifier, EpochLog};
pub use store::{FileStore, MemoryStore, StateStore};
pub use types::{ModelInfo, RiskAssessment, UserData, FEATURE_COUNT};

/// Engine version embedded in exported payloads
pub const SENTINEL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for exported payloads
pub const PRODUCER_NAME: &str = "relapse-sentinel";
