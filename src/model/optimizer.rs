//! Adam optimizer
//!
//! Standard Adam with bias-corrected first and second moment estimates.
//! Moment state mirrors the network shape and is rebuilt whenever a model is
//! loaded, so a deserialized classifier trains exactly like a fresh one.

use crate::model::network::{Network, NetworkGrads};

/// Default exponential decay for the first moment estimate.
pub const BETA1: f64 = 0.9;
/// Default exponential decay for the second moment estimate.
pub const BETA2: f64 = 0.999;
/// Numerical stabilizer.
pub const EPSILON: f64 = 1e-8;

struct LayerMoments {
    m_weights: Vec<Vec<f64>>,
    v_weights: Vec<Vec<f64>>,
    m_biases: Vec<f64>,
    v_biases: Vec<f64>,
}

/// Adam optimizer state for one network.
pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    step_count: u64,
    layers: Vec<LayerMoments>,
}

impl Adam {
    /// Fresh optimizer state shaped to `network`.
    pub fn new(learning_rate: f64, network: &Network) -> Self {
        let layers = network
            .layers
            .iter()
            .map(|layer| LayerMoments {
                m_weights: vec![vec![0.0; layer.input_dim()]; layer.output_dim()],
                v_weights: vec![vec![0.0; layer.input_dim()]; layer.output_dim()],
                m_biases: vec![0.0; layer.output_dim()],
                v_biases: vec![0.0; layer.output_dim()],
            })
            .collect();
        Self {
            learning_rate,
            beta1: BETA1,
            beta2: BETA2,
            epsilon: EPSILON,
            step_count: 0,
            layers,
        }
    }

    /// Apply one update step from averaged batch gradients.
    pub fn step(&mut self, network: &mut Network, grads: &NetworkGrads) {
        self.step_count += 1;
        let t = self.step_count as i32;
        let bias1 = 1.0 - self.beta1.powi(t);
        let bias2 = 1.0 - self.beta2.powi(t);

        for (layer_index, layer) in network.layers.iter_mut().enumerate() {
            let moments = &mut self.layers[layer_index];
            let grad = &grads.layers[layer_index];

            for out in 0..layer.weights.len() {
                for inp in 0..layer.weights[out].len() {
                    let g = grad.d_weights[out][inp];
                    let m = &mut moments.m_weights[out][inp];
                    let v = &mut moments.v_weights[out][inp];
                    *m = self.beta1 * *m + (1.0 - self.beta1) * g;
                    *v = self.beta2 * *v + (1.0 - self.beta2) * g * g;
                    let m_hat = *m / bias1;
                    let v_hat = *v / bias2;
                    layer.weights[out][inp] -=
                        self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
                }

                let g = grad.d_biases[out];
                let m = &mut moments.m_biases[out];
                let v = &mut moments.v_biases[out];
                *m = self.beta1 * *m + (1.0 - self.beta1) * g;
                *v = self.beta2 * *v + (1.0 - self.beta2) * g * g;
                let m_hat = *m / bias1;
                let v_hat = *v / bias2;
                layer.biases[out] -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::network::{Activation, DenseLayer};

    fn scalar_network(weight: f64) -> Network {
        Network {
            layers: vec![DenseLayer {
                weights: vec![vec![weight]],
                biases: vec![0.0],
                activation: Activation::Sigmoid,
            }],
        }
    }

    #[test]
    fn test_step_moves_against_gradient() {
        let mut net = scalar_network(0.5);
        let mut adam = Adam::new(0.01, &net);

        let mut grads = net.zero_grads();
        grads.layers[0].d_weights[0][0] = 1.0;
        adam.step(&mut net, &grads);

        // First step with bias correction moves by exactly lr.
        assert!((net.layers[0].weights[0][0] - (0.5 - 0.01)).abs() < 1e-6);
    }

    #[test]
    fn test_zero_gradient_leaves_weights() {
        let mut net = scalar_network(0.25);
        let mut adam = Adam::new(0.01, &net);
        let grads = net.zero_grads();
        adam.step(&mut net, &grads);
        assert!((net.layers[0].weights[0][0] - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_repeated_steps_converge_toward_minimum() {
        // Minimize (w - 2)^2 via its gradient 2(w - 2).
        let mut net = scalar_network(0.0);
        let mut adam = Adam::new(0.05, &net);

        for _ in 0..2000 {
            let w = net.layers[0].weights[0][0];
            let mut grads = net.zero_grads();
            grads.layers[0].d_weights[0][0] = 2.0 * (w - 2.0);
            adam.step(&mut net, &grads);
        }

        assert!((net.layers[0].weights[0][0] - 2.0).abs() < 0.05);
    }
}
