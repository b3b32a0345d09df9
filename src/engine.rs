//! Engine orchestration
//!
//! `RiskEngine` is the façade over the full pipeline: initialization from
//! persisted state, training, inference with heuristic fallback, ledger
//! updates and persistence. One engine owns one user's model and ledger
//! state; tests instantiate isolated engines with an in-memory store.
//!
//! Training is serialized by an in-flight guard and runs without holding
//! the state lock, so prediction stays available on the previous model
//! while a run is in progress. State is committed wholesale and persisted
//! write-then-swap only after a run succeeds; a failed or cancelled run
//! leaves the previous model intact.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::{self, AggregateSink, NotificationSink};
use crate::balance::ClassBalancer;
use crate::config::EngineConfig;
use crate::dataset::TrainingSetBuilder;
use crate::error::EngineError;
use crate::evaluator::{Evaluator, DEFAULT_THRESHOLD};
use crate::features::FeatureExtractor;
use crate::insights;
use crate::ledger::{
    InterventionLedger, PredictionSnapshot, ResponseComparison, ResponseKind, ToolStats,
};
use crate::model::{CancelToken, Classifier, EpochLog, FitOptions};
use crate::normalizer::{NormalizationStats, Normalizer};
use crate::predictor::Predictor;
use crate::store::{PersistedState, StateStore};
use crate::types::{
    ClassWeights, EvalReport, FeatureVector, ModelInfo, RiskAssessment, TrainingHistory, UserData,
};

/// Result of a successful training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub samples: usize,
    pub final_loss: f64,
    pub final_accuracy: f64,
    pub metrics: EvalReport,
    pub class_weights: ClassWeights,
    pub feedback_samples_used: usize,
}

/// Per-call knobs for a training run.
///
/// `progress` is best-effort and may be absent ("silent" background
/// training); `cancel` aborts at the next epoch boundary.
#[derive(Default)]
pub struct TrainSettings<'a> {
    pub progress: Option<&'a dyn Fn(&EpochLog)>,
    pub cancel: Option<&'a CancelToken>,
    /// Fixed RNG seed for reproducible runs
    pub seed: Option<u64>,
}

struct EngineState {
    model: Option<Classifier>,
    stats: Option<NormalizationStats>,
    history: Option<TrainingHistory>,
    ledger: InterventionLedger,
}

/// The prediction orchestrator.
pub struct RiskEngine {
    config: EngineConfig,
    store: Box<dyn StateStore>,
    state: Mutex<EngineState>,
    training: AtomicBool,
    initialized: AtomicBool,
    notifier: Option<Box<dyn NotificationSink>>,
    aggregates: Option<Box<dyn AggregateSink>>,
}

/// Resets the in-flight training flag on every exit path.
struct TrainGuard<'a>(&'a AtomicBool);

impl Drop for TrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl RiskEngine {
    /// Construct an engine over a store. Call [`RiskEngine::initialize`]
    /// before use; the constructor touches no storage.
    pub fn new(config: EngineConfig, store: Box<dyn StateStore>) -> Self {
        Self {
            config,
            store,
            state: Mutex::new(EngineState {
                model: None,
                stats: None,
                history: None,
                ledger: InterventionLedger::default(),
            }),
            training: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            notifier: None,
            aggregates: None,
        }
    }

    /// Attach a notification sink, invoked at or above the alert threshold.
    pub fn with_notification_sink(mut self, sink: Box<dyn NotificationSink>) -> Self {
        self.notifier = Some(sink);
        self
    }

    /// Attach an aggregate sink, used only when `submit_aggregates` is set.
    pub fn with_aggregate_sink(mut self, sink: Box<dyn AggregateSink>) -> Self {
        self.aggregates = Some(sink);
        self
    }

    /// Load persisted state if present, else start from an untrained shell.
    /// Idempotent; never fails startup: a corrupt blob is discarded with a
    /// warning. Also resolves any interventions whose outcome window
    /// elapsed while the engine was down.
    pub fn initialize(&self) -> Result<(), EngineError> {
        if self
            .initialized
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }

        let loaded = match self.store.load() {
            Ok(blob) => blob,
            Err(e) => {
                log::warn!("state load failed, starting fresh: {e}");
                None
            }
        };

        if let Some(blob) = loaded {
            match PersistedState::from_json(&blob) {
                Ok(persisted) => {
                    let model = match persisted.model {
                        Some(state) => match Classifier::from_state(state) {
                            Ok(model) => Some(model),
                            Err(e) => {
                                log::warn!("discarding persisted model: {e}");
                                None
                            }
                        },
                        None => None,
                    };
                    let mut state = self.state_guard();
                    state.model = model;
                    state.stats = persisted.stats;
                    state.history = persisted.history;
                    state.ledger = persisted.ledger;
                }
                Err(e) => {
                    log::warn!("persisted state is corrupt, starting fresh: {e}");
                }
            }
        }

        let resolved = {
            let mut state = self.state_guard();
            let resolved = state.ledger.check_successful_interventions(Utc::now());
            if resolved > 0 {
                self.persist(&state);
            }
            resolved
        };
        if resolved > 0 {
            log::info!("{resolved} interventions resolved to success on load");
        }
        Ok(())
    }

    /// Persist current state and mark the engine uninitialized.
    pub fn teardown(&self) -> Result<(), EngineError> {
        {
            let state = self.state_guard();
            let blob = self.serialize_state(&state)?;
            self.store.save(&blob)?;
        }
        self.initialized.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Train on the user's history, replacing the model wholesale.
    ///
    /// Refuses with a typed error when the minimum-data policy is unmet or
    /// another run is in flight; both refusals leave all state untouched.
    pub fn train(
        &self,
        user: &UserData,
        settings: TrainSettings<'_>,
    ) -> Result<TrainingReport, EngineError> {
        self.initialize()?;

        if self
            .training
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(EngineError::TrainingBusy);
        }
        let _guard = TrainGuard(&self.training);

        let samples = TrainingSetBuilder::build(user);
        TrainingSetBuilder::check_minimums(user, &samples, &self.config)?;
        log::info!("training on {} samples", samples.len());

        // Snapshot ledger feedback, then release the lock for the fit.
        let feedback = self.state_guard().ledger.feedback_records();

        let features: Vec<FeatureVector> = samples.iter().map(|s| s.features).collect();
        let labels: Vec<u8> = samples.iter().map(|s| s.label).collect();
        let dates: Vec<_> = samples.iter().map(|s| s.date).collect();

        let stats = Normalizer::fit(&features);
        let normalized = Normalizer::apply_all(&stats, &features);

        let class_weights = ClassBalancer::class_weights(&labels, self.config.class_weight_cap);
        let mut sample_weights = ClassBalancer::sample_weights(&labels, &class_weights);
        let feedback_samples_used = ClassBalancer::apply_feedback(
            &mut sample_weights,
            &dates,
            &feedback,
            self.config.feedback_boost,
            self.config.feedback_window_hours,
        );
        if feedback_samples_used > 0 {
            log::info!("{feedback_samples_used} outcome feedback records boosted sample weights");
        }

        let fallback_cancel = CancelToken::new();
        let cancel = settings.cancel.unwrap_or(&fallback_cancel);
        let options = FitOptions::from_config(&self.config, settings.seed);

        let mut classifier = Classifier::new(settings.seed);
        let fit = classifier.fit(
            &normalized,
            &labels,
            &sample_weights,
            &options,
            settings.progress,
            cancel,
        )?;

        let predictions: Vec<f64> = normalized.iter().map(|v| classifier.predict(v)).collect();
        let metrics = Evaluator::evaluate(&predictions, &labels, DEFAULT_THRESHOLD);

        let history = TrainingHistory {
            last_trained: Utc::now(),
            samples: samples.len(),
            final_loss: fit.final_loss,
            final_accuracy: fit.final_accuracy,
            metrics: Some(metrics),
            class_weights,
            feedback_samples_used,
        };

        // Commit wholesale, then persist write-then-swap.
        {
            let mut state = self.state_guard();
            state.model = Some(classifier);
            state.stats = Some(stats);
            state.history = Some(history.clone());
            self.persist(&state);
        }
        log::info!(
            "training complete: loss {:.4}, accuracy {:.3}",
            fit.final_loss,
            fit.final_accuracy
        );

        if self.config.submit_aggregates {
            if let Some(sink) = &self.aggregates {
                let summary =
                    aggregate::build_summary(user, &self.state_guard().ledger, &history);
                if let Err(e) = sink.submit(&summary) {
                    log::warn!("aggregate submission failed: {e}");
                }
            }
        }

        Ok(TrainingReport {
            samples: history.samples,
            final_loss: history.final_loss,
            final_accuracy: history.final_accuracy,
            metrics,
            class_weights,
            feedback_samples_used,
        })
    }

    /// Assess current risk. Never errors: whenever the model path is not
    /// ready this returns the heuristic fallback result instead.
    pub fn predict(&self, user: &UserData) -> RiskAssessment {
        self.predict_at(user, Utc::now())
    }

    /// [`RiskEngine::predict`] with an explicit clock, for callers and
    /// tests that control time.
    pub fn predict_at(&self, user: &UserData, as_of: DateTime<Utc>) -> RiskAssessment {
        let raw = FeatureExtractor::extract_latest(user, as_of);

        let state = self.state_guard();
        let factors = insights::derive_factors(&raw);
        let patterns = insights::derive_patterns(user, &state.ledger);

        let predictor = Predictor::select(
            state.model.as_ref(),
            state.stats.as_ref(),
            state.history.as_ref(),
            user.benefit_entries.len(),
            self.config.heuristic_cap,
            self.config.confidence_cap,
        );
        if matches!(predictor, Predictor::Heuristic { .. }) {
            log::debug!("model path not ready, using heuristic fallback");
        }
        let assessment = predictor.assess(&raw, factors, patterns);
        drop(state);

        if assessment.risk_score >= self.config.alert_threshold {
            if let Some(notifier) = &self.notifier {
                notifier.notify(&assessment);
            }
        }
        assessment
    }

    /// Model readiness and quality snapshot.
    pub fn get_model_info(&self) -> ModelInfo {
        let state = self.state_guard();
        let history = state.history.as_ref();
        let is_ready = state.model.is_some()
            && state.stats.is_some()
            && history.map_or(false, |h| h.samples > 0);

        let metrics = history.and_then(|h| h.metrics);
        let needs_retraining = is_ready
            && history.map_or(false, |h| {
                let stale = Utc::now() - h.last_trained
                    > Duration::days(self.config.retrain_after_days);
                let new_feedback = state
                    .ledger
                    .latest_resolution()
                    .map_or(false, |at| at > h.last_trained);
                stale || new_feedback
            });

        ModelInfo {
            is_ready,
            accuracy: history.map(|h| h.final_accuracy),
            precision: metrics.map(|m| m.precision),
            recall: metrics.map(|m| m.recall),
            f1_score: metrics.map(|m| m.f1_score),
            needs_retraining,
        }
    }

    // ------------------------------------------------------------------
    // Ledger mutators. Each appends or resolves, then persists.
    // ------------------------------------------------------------------

    /// Record that an alert was shown; returns the intervention id.
    pub fn create_intervention(&self, prediction: Option<PredictionSnapshot>) -> Uuid {
        let mut state = self.state_guard();
        let id = state.ledger.create(Utc::now(), prediction);
        self.persist(&state);
        id
    }

    /// Record the user's reaction to an alert.
    pub fn record_response(&self, id: Uuid, kind: ResponseKind) -> Result<(), EngineError> {
        let mut state = self.state_guard();
        state.ledger.record_response(id, kind, Utc::now())?;
        self.persist(&state);
        Ok(())
    }

    /// Record that a self-help session was opened.
    pub fn start_session(&self, id: Uuid, tool: &str) -> Result<(), EngineError> {
        let mut state = self.state_guard();
        state.ledger.start_session(id, tool, Utc::now())?;
        self.persist(&state);
        Ok(())
    }

    /// Record that the open session finished.
    pub fn complete_session(&self, id: Uuid, duration_minutes: f64) -> Result<(), EngineError> {
        let mut state = self.state_guard();
        state.ledger.complete_session(id, duration_minutes, Utc::now())?;
        self.persist(&state);
        Ok(())
    }

    /// A relapse was logged: attribute it to recent pending interventions.
    pub fn on_relapse(&self, at: DateTime<Utc>, relapse_id: Option<&str>) -> usize {
        let mut state = self.state_guard();
        let resolved = state.ledger.on_relapse(at, relapse_id);
        if resolved > 0 {
            self.persist(&state);
        }
        resolved
    }

    /// Resolve pending interventions whose outcome window elapsed.
    pub fn check_successful_interventions(&self) -> usize {
        let mut state = self.state_guard();
        let resolved = state.ledger.check_successful_interventions(Utc::now());
        if resolved > 0 {
            self.persist(&state);
        }
        resolved
    }

    /// Per-tool success rates over completed sessions.
    pub fn tool_success_rates(&self) -> BTreeMap<String, ToolStats> {
        self.state_guard().ledger.tool_success_rates()
    }

    /// Responded-vs-ignored outcome comparison.
    pub fn response_comparison(&self) -> ResponseComparison {
        self.state_guard().ledger.response_comparison()
    }

    fn state_guard(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn serialize_state(&self, state: &EngineState) -> Result<String, EngineError> {
        PersistedState {
            version: crate::store::STATE_SCHEMA_VERSION,
            model: state.model.as_ref().map(Classifier::to_state),
            stats: state.stats.clone(),
            history: state.history.clone(),
            ledger: state.ledger.clone(),
        }
        .to_json()
    }

    /// Best-effort persistence: a failing store is logged, never fatal to
    /// the in-memory state that was already committed.
    fn persist(&self, state: &EngineState) {
        let result = self
            .serialize_state(state)
            .and_then(|blob| self.store.save(&blob));
        if let Err(e) = result {
            log::error!("state persistence failed: {e}");
        }
    }
}
