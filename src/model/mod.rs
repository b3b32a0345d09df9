//! Binary relapse classifier
//!
//! Fixed-architecture feed-forward model: input(12) → dense(24, relu) →
//! dropout(0.3) → dense(12, relu) → dense(1, sigmoid), trained with
//! sample-weighted binary cross-entropy and Adam. Serialization captures
//! architecture and weights; optimizer state is rebuilt on load with the
//! same hyperparameters, so a restored model trains identically to a fresh
//! one.

pub mod network;
pub mod optimizer;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::model::network::{Activation, DenseLayer, Network};
use crate::model::optimizer::Adam;
use crate::types::{FeatureVector, FEATURE_COUNT};

/// Architecture identifier embedded in serialized model state.
pub const ARCHITECTURE_ID: &str = "mlp-12x24x12x1";

/// Hidden layer widths of the fixed architecture.
const HIDDEN1: usize = 24;
const HIDDEN2: usize = 12;

/// Clamp applied to predicted probabilities inside the loss.
const PROB_EPSILON: f64 = 1e-7;

/// Cooperative cancellation handle for an in-progress training run.
///
/// Cloning shares the flag; cancelling aborts the run at the next epoch
/// boundary, leaving previously committed model state untouched.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Hyperparameters for one training run.
#[derive(Debug, Clone)]
pub struct FitOptions {
    pub epochs: usize,
    pub learning_rate: f64,
    pub dropout: f64,
    pub validation_split: f64,
    pub max_batch_size: usize,
    /// Fixed RNG seed for reproducible runs; random when absent
    pub seed: Option<u64>,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default(), None)
    }
}

impl FitOptions {
    pub fn from_config(config: &EngineConfig, seed: Option<u64>) -> Self {
        Self {
            epochs: config.epochs,
            learning_rate: config.learning_rate,
            dropout: config.dropout,
            validation_split: config.validation_split,
            max_batch_size: config.max_batch_size,
            seed,
        }
    }
}

/// Per-epoch training log entry, also handed to the progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochLog {
    pub epoch: usize,
    pub loss: f64,
    pub accuracy: f64,
    pub val_loss: Option<f64>,
    pub val_accuracy: Option<f64>,
}

/// Result of a completed training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitReport {
    pub final_loss: f64,
    pub final_accuracy: f64,
    pub epochs: Vec<EpochLog>,
}

/// Serialized classifier: architecture id plus layer weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelState {
    pub architecture: String,
    pub layers: Vec<DenseLayer>,
}

/// The on-device relapse classifier.
#[derive(Debug, Clone)]
pub struct Classifier {
    network: Network,
}

impl Classifier {
    /// Construct an untrained classifier with Glorot-initialized weights.
    pub fn new(seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::seed_from_u64(rand::random()),
        };
        let network = Network {
            layers: vec![
                DenseLayer::glorot(FEATURE_COUNT, HIDDEN1, Activation::Relu, &mut rng),
                DenseLayer::glorot(HIDDEN1, HIDDEN2, Activation::Relu, &mut rng),
                DenseLayer::glorot(HIDDEN2, 1, Activation::Sigmoid, &mut rng),
            ],
        };
        Self { network }
    }

    /// Predicted relapse probability in [0, 1]. Dropout disabled; a
    /// non-finite output collapses to 0.5 rather than escaping.
    pub fn predict(&self, vector: &FeatureVector) -> f64 {
        let p = self.network.infer(vector);
        if p.is_finite() {
            p.clamp(0.0, 1.0)
        } else {
            0.5
        }
    }

    /// Train on normalized features with per-sample weights.
    ///
    /// Fixed epoch count, batch size `min(max_batch_size, N/2)`, shuffled
    /// 80/20 train/validation split, sample-weighted binary cross-entropy.
    /// The progress callback is best-effort and may be absent; the cancel
    /// token is checked once per epoch.
    pub fn fit(
        &mut self,
        features: &[FeatureVector],
        labels: &[u8],
        sample_weights: &[f64],
        options: &FitOptions,
        progress: Option<&dyn Fn(&EpochLog)>,
        cancel: &CancelToken,
    ) -> Result<FitReport, EngineError> {
        let n = features.len();
        if n == 0 {
            return Err(EngineError::Training("empty training set".to_string()));
        }
        if labels.len() != n || sample_weights.len() != n {
            return Err(EngineError::Training(format!(
                "shape mismatch: {} features, {} labels, {} weights",
                n,
                labels.len(),
                sample_weights.len()
            )));
        }

        let mut rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::seed_from_u64(rand::random()),
        };

        // Shuffled train/validation split over the full sample set.
        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(&mut rng);
        let mut val_count = (n as f64 * options.validation_split) as usize;
        if val_count >= n {
            val_count = 0;
        }
        let (train_idx, val_idx) = indices.split_at(n - val_count);
        let mut train_idx: Vec<usize> = train_idx.to_vec();
        let val_idx: Vec<usize> = val_idx.to_vec();

        let batch_size = options.max_batch_size.min(n / 2).max(1);
        let keep_rate = 1.0 - options.dropout.clamp(0.0, 0.95);

        let mut adam = Adam::new(options.learning_rate, &self.network);
        let mut epoch_logs = Vec::with_capacity(options.epochs);

        for epoch in 0..options.epochs {
            if cancel.is_cancelled() {
                return Err(EngineError::TrainingCancelled);
            }

            train_idx.shuffle(&mut rng);
            let mut epoch_loss = 0.0;

            for batch in train_idx.chunks(batch_size) {
                let mut grads = self.network.zero_grads();
                for &i in batch {
                    let mask = dropout_mask(HIDDEN1, keep_rate, &mut rng);
                    let cache = self.network.forward_cached(&features[i], mask.as_deref());
                    let p = cache.output().clamp(PROB_EPSILON, 1.0 - PROB_EPSILON);
                    let y = f64::from(labels[i]);
                    let w = sample_weights[i];

                    epoch_loss += w * -(y * p.ln() + (1.0 - y) * (1.0 - p).ln());
                    self.network
                        .backward(&cache, w * (p - y), mask.as_deref(), &mut grads);
                }
                grads.scale(1.0 / batch.len() as f64);
                adam.step(&mut self.network, &grads);
            }

            let train_loss = epoch_loss / train_idx.len() as f64;
            if !train_loss.is_finite() {
                return Err(EngineError::Training(format!(
                    "loss diverged at epoch {epoch}"
                )));
            }

            let train_accuracy = self.accuracy(features, labels, &train_idx);
            let (val_loss, val_accuracy) = if val_idx.is_empty() {
                (None, None)
            } else {
                (
                    Some(self.unweighted_loss(features, labels, &val_idx)),
                    Some(self.accuracy(features, labels, &val_idx)),
                )
            };

            let log = EpochLog {
                epoch,
                loss: train_loss,
                accuracy: train_accuracy,
                val_loss,
                val_accuracy,
            };
            if let Some(callback) = progress {
                callback(&log);
            }
            epoch_logs.push(log);
        }

        let last = epoch_logs.last().copied().unwrap_or(EpochLog {
            epoch: 0,
            loss: 0.0,
            accuracy: 0.0,
            val_loss: None,
            val_accuracy: None,
        });
        Ok(FitReport {
            final_loss: last.loss,
            final_accuracy: last.accuracy,
            epochs: epoch_logs,
        })
    }

    fn accuracy(&self, features: &[FeatureVector], labels: &[u8], indices: &[usize]) -> f64 {
        if indices.is_empty() {
            return 0.0;
        }
        let correct = indices
            .iter()
            .filter(|&&i| u8::from(self.predict(&features[i]) >= 0.5) == labels[i])
            .count();
        correct as f64 / indices.len() as f64
    }

    fn unweighted_loss(&self, features: &[FeatureVector], labels: &[u8], indices: &[usize]) -> f64 {
        let total: f64 = indices
            .iter()
            .map(|&i| {
                let p = self.predict(&features[i]).clamp(PROB_EPSILON, 1.0 - PROB_EPSILON);
                let y = f64::from(labels[i]);
                -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
            })
            .sum();
        total / indices.len() as f64
    }

    /// Serialize architecture and weights.
    pub fn to_state(&self) -> ModelState {
        ModelState {
            architecture: ARCHITECTURE_ID.to_string(),
            layers: self.network.layers.clone(),
        }
    }

    /// Restore a classifier from serialized state, validating architecture
    /// and layer shapes.
    pub fn from_state(state: ModelState) -> Result<Self, EngineError> {
        if state.architecture != ARCHITECTURE_ID {
            return Err(EngineError::InvalidModel(format!(
                "unknown architecture {:?}",
                state.architecture
            )));
        }

        let expected = [
            (FEATURE_COUNT, HIDDEN1, Activation::Relu),
            (HIDDEN1, HIDDEN2, Activation::Relu),
            (HIDDEN2, 1, Activation::Sigmoid),
        ];
        if state.layers.len() != expected.len() {
            return Err(EngineError::InvalidModel(format!(
                "expected {} layers, found {}",
                expected.len(),
                state.layers.len()
            )));
        }
        for (layer, (input, output, activation)) in state.layers.iter().zip(expected.iter()) {
            if layer.input_dim() != *input
                || layer.output_dim() != *output
                || layer.activation != *activation
                || layer.biases.len() != *output
                || layer.weights.iter().any(|row| row.len() != *input)
            {
                return Err(EngineError::InvalidModel(
                    "layer shape does not match architecture".to_string(),
                ));
            }
        }

        Ok(Self {
            network: Network { layers: state.layers },
        })
    }
}

fn dropout_mask<R: Rng>(width: usize, keep_rate: f64, rng: &mut R) -> Option<Vec<f64>> {
    if keep_rate >= 1.0 {
        return None;
    }
    Some(
        (0..width)
            .map(|_| {
                if rng.gen::<f64>() < keep_rate {
                    1.0 / keep_rate
                } else {
                    0.0
                }
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Linearly separable set: positives at +2, negatives at -2 on the
    /// first three features.
    fn separable_data(count: usize) -> (Vec<FeatureVector>, Vec<u8>, Vec<f64>) {
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for i in 0..count {
            let label = (i % 2) as u8;
            let sign = if label == 1 { 2.0 } else { -2.0 };
            let mut v = [0.0; FEATURE_COUNT];
            v[0] = sign;
            v[1] = sign;
            v[2] = sign;
            features.push(v);
            labels.push(label);
        }
        let weights = vec![1.0; count];
        (features, labels, weights)
    }

    fn strong_options() -> FitOptions {
        FitOptions {
            epochs: 80,
            learning_rate: 0.05,
            dropout: 0.3,
            validation_split: 0.2,
            max_batch_size: 8,
            seed: Some(42),
        }
    }

    #[test]
    fn test_fit_learns_separable_data() {
        let (features, labels, weights) = separable_data(40);
        let mut model = Classifier::new(Some(1));
        let report = model
            .fit(&features, &labels, &weights, &strong_options(), None, &CancelToken::new())
            .unwrap();

        assert_eq!(report.epochs.len(), 80);
        assert!(report.final_loss.is_finite());
        assert!(report.final_loss < report.epochs[0].loss);

        let mean_pos: f64 = features
            .iter()
            .zip(labels.iter())
            .filter(|(_, l)| **l == 1)
            .map(|(f, _)| model.predict(f))
            .sum::<f64>()
            / 20.0;
        let mean_neg: f64 = features
            .iter()
            .zip(labels.iter())
            .filter(|(_, l)| **l == 0)
            .map(|(f, _)| model.predict(f))
            .sum::<f64>()
            / 20.0;
        assert!(mean_pos > mean_neg);
    }

    #[test]
    fn test_validation_split_reported() {
        let (features, labels, weights) = separable_data(20);
        let mut model = Classifier::new(Some(2));
        let report = model
            .fit(&features, &labels, &weights, &strong_options(), None, &CancelToken::new())
            .unwrap();

        // 20 samples at 0.2 split: 4 held out each epoch.
        assert!(report.epochs.iter().all(|e| e.val_loss.is_some()));
        assert!(report.epochs.iter().all(|e| e.val_accuracy.is_some()));
    }

    #[test]
    fn test_progress_callback_invoked_every_epoch() {
        let (features, labels, weights) = separable_data(12);
        let mut model = Classifier::new(Some(3));
        let seen = std::cell::RefCell::new(Vec::new());

        let mut options = strong_options();
        options.epochs = 5;
        model
            .fit(
                &features,
                &labels,
                &weights,
                &options,
                Some(&|log: &EpochLog| seen.borrow_mut().push(log.epoch)),
                &CancelToken::new(),
            )
            .unwrap();

        assert_eq!(*seen.borrow(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_cancelled_token_aborts() {
        let (features, labels, weights) = separable_data(12);
        let mut model = Classifier::new(Some(4));
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = model
            .fit(&features, &labels, &weights, &strong_options(), None, &cancel)
            .unwrap_err();
        assert!(matches!(err, EngineError::TrainingCancelled));
    }

    #[test]
    fn test_predict_bounded_without_training() {
        let model = Classifier::new(Some(5));
        let p = model.predict(&[0.0; FEATURE_COUNT]);
        assert!((0.0..=1.0).contains(&p));

        let p = model.predict(&[1e6; FEATURE_COUNT]);
        assert!((0.0..=1.0).contains(&p));
    }

    #[test]
    fn test_state_roundtrip_preserves_predictions() {
        let (features, labels, weights) = separable_data(20);
        let mut model = Classifier::new(Some(6));
        let mut options = strong_options();
        options.epochs = 10;
        model
            .fit(&features, &labels, &weights, &options, None, &CancelToken::new())
            .unwrap();

        let json = serde_json::to_string(&model.to_state()).unwrap();
        let state: ModelState = serde_json::from_str(&json).unwrap();
        let restored = Classifier::from_state(state).unwrap();

        for f in &features {
            assert_eq!(model.predict(f), restored.predict(f));
        }
    }

    #[test]
    fn test_from_state_rejects_wrong_architecture() {
        let model = Classifier::new(Some(7));
        let mut state = model.to_state();
        state.architecture = "mlp-2x2".to_string();
        assert!(matches!(
            Classifier::from_state(state),
            Err(EngineError::InvalidModel(_))
        ));

        let mut state = model.to_state();
        state.layers.pop();
        assert!(matches!(
            Classifier::from_state(state),
            Err(EngineError::InvalidModel(_))
        ));
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let (features, labels, _) = separable_data(10);
        let mut model = Classifier::new(Some(8));
        let err = model
            .fit(&features, &labels, &[1.0; 3], &FitOptions::default(), None, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, EngineError::Training(_)));
    }
}
