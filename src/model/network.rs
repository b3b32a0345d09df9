//! Dense feed-forward network
//!
//! Minimal fully-connected network with manual backpropagation. Weight
//! matrices are row-major `[output][input]`; serde derives make layer
//! weights the serialized model representation.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Activation applied to a layer's pre-activations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Relu,
    Sigmoid,
}

impl Activation {
    pub fn apply(self, x: f64) -> f64 {
        match self {
            Activation::Relu => x.max(0.0),
            Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
        }
    }

    /// Derivative with respect to the pre-activation.
    pub fn derivative(self, pre: f64) -> f64 {
        match self {
            Activation::Relu => {
                if pre > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Sigmoid => {
                let s = Activation::Sigmoid.apply(pre);
                s * (1.0 - s)
            }
        }
    }
}

/// One fully-connected layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseLayer {
    /// Weights indexed `[output][input]`
    pub weights: Vec<Vec<f64>>,
    pub biases: Vec<f64>,
    pub activation: Activation,
}

impl DenseLayer {
    /// Glorot-uniform initialization.
    pub fn glorot<R: Rng>(input: usize, output: usize, activation: Activation, rng: &mut R) -> Self {
        let limit = (6.0 / (input + output) as f64).sqrt();
        let weights = (0..output)
            .map(|_| (0..input).map(|_| rng.gen_range(-limit..limit)).collect())
            .collect();
        Self {
            weights,
            biases: vec![0.0; output],
            activation,
        }
    }

    pub fn input_dim(&self) -> usize {
        self.weights.first().map_or(0, Vec::len)
    }

    pub fn output_dim(&self) -> usize {
        self.weights.len()
    }

    /// Pre- and post-activation values for an input.
    fn forward(&self, input: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let pre: Vec<f64> = self
            .weights
            .iter()
            .zip(self.biases.iter())
            .map(|(row, bias)| row.iter().zip(input.iter()).map(|(w, x)| w * x).sum::<f64>() + bias)
            .collect();
        let post = pre.iter().map(|p| self.activation.apply(*p)).collect();
        (pre, post)
    }
}

/// Per-layer gradient accumulators, shaped like the layer they mirror.
#[derive(Debug, Clone)]
pub struct LayerGrads {
    pub d_weights: Vec<Vec<f64>>,
    pub d_biases: Vec<f64>,
}

/// Gradients for every layer of a network.
#[derive(Debug, Clone)]
pub struct NetworkGrads {
    pub layers: Vec<LayerGrads>,
}

impl NetworkGrads {
    /// Scale all accumulated gradients, used for batch averaging.
    pub fn scale(&mut self, factor: f64) {
        for layer in &mut self.layers {
            for row in &mut layer.d_weights {
                for g in row.iter_mut() {
                    *g *= factor;
                }
            }
            for g in &mut layer.d_biases {
                *g *= factor;
            }
        }
    }
}

/// Cached activations from one forward pass, kept for backpropagation.
#[derive(Debug)]
pub struct ForwardCache {
    pub input: Vec<f64>,
    /// Pre-activations per layer
    pub pre: Vec<Vec<f64>>,
    /// Post-activations per layer; the first layer's entry already has the
    /// dropout mask applied when one was supplied
    pub post: Vec<Vec<f64>>,
}

impl ForwardCache {
    pub fn output(&self) -> f64 {
        self.post.last().and_then(|p| p.first()).copied().unwrap_or(0.5)
    }
}

/// Stack of dense layers with an optional dropout slot after the first
/// hidden layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    pub layers: Vec<DenseLayer>,
}

impl Network {
    /// Inference pass, dropout disabled.
    pub fn infer(&self, input: &[f64]) -> f64 {
        let mut current: Vec<f64> = input.to_vec();
        for layer in &self.layers {
            let (_, post) = layer.forward(&current);
            current = post;
        }
        current.first().copied().unwrap_or(0.5)
    }

    /// Training-time forward pass caching activations. The dropout mask,
    /// when present, is applied to the first layer's post-activations and
    /// already carries the inverted-dropout scaling.
    pub fn forward_cached(&self, input: &[f64], dropout_mask: Option<&[f64]>) -> ForwardCache {
        let mut cache = ForwardCache {
            input: input.to_vec(),
            pre: Vec::with_capacity(self.layers.len()),
            post: Vec::with_capacity(self.layers.len()),
        };

        let mut current: Vec<f64> = input.to_vec();
        for (index, layer) in self.layers.iter().enumerate() {
            let (pre, mut post) = layer.forward(&current);
            if index == 0 {
                if let Some(mask) = dropout_mask {
                    for (p, m) in post.iter_mut().zip(mask.iter()) {
                        *p *= m;
                    }
                }
            }
            current = post.clone();
            cache.pre.push(pre);
            cache.post.push(post);
        }
        cache
    }

    /// Accumulate gradients for one sample into `grads`.
    ///
    /// `delta_out` is the loss derivative with respect to the output
    /// pre-activation (for sigmoid + binary cross-entropy that is simply
    /// `weight * (p - y)`).
    pub fn backward(
        &self,
        cache: &ForwardCache,
        delta_out: f64,
        dropout_mask: Option<&[f64]>,
        grads: &mut NetworkGrads,
    ) {
        let mut deltas = vec![delta_out];

        for index in (0..self.layers.len()).rev() {
            let layer = &self.layers[index];
            let layer_input: &[f64] = if index == 0 {
                &cache.input
            } else {
                &cache.post[index - 1]
            };

            let grad = &mut grads.layers[index];
            for (out, delta) in deltas.iter().enumerate() {
                grad.d_biases[out] += delta;
                for (inp, x) in layer_input.iter().enumerate() {
                    grad.d_weights[out][inp] += delta * x;
                }
            }

            if index == 0 {
                break;
            }

            // Propagate to the previous layer's pre-activations.
            let prev = &self.layers[index - 1];
            let mut prev_deltas = vec![0.0; prev.output_dim()];
            for (out, delta) in deltas.iter().enumerate() {
                for (inp, prev_delta) in prev_deltas.iter_mut().enumerate() {
                    *prev_delta += layer.weights[out][inp] * delta;
                }
            }
            if index == 1 {
                if let Some(mask) = dropout_mask {
                    for (delta, m) in prev_deltas.iter_mut().zip(mask.iter()) {
                        *delta *= m;
                    }
                }
            }
            for (delta, pre) in prev_deltas.iter_mut().zip(cache.pre[index - 1].iter()) {
                *delta *= prev.activation.derivative(*pre);
            }
            deltas = prev_deltas;
        }
    }

    /// Zeroed gradient accumulators matching this network's shape.
    pub fn zero_grads(&self) -> NetworkGrads {
        NetworkGrads {
            layers: self
                .layers
                .iter()
                .map(|layer| LayerGrads {
                    d_weights: vec![vec![0.0; layer.input_dim()]; layer.output_dim()],
                    d_biases: vec![0.0; layer.output_dim()],
                })
                .collect(),
        }
    }
}
