use std::fs;
use std::path::Path;

use serde::{Serialize, Deserialize};

use crate::config::{OptimizerKind, SolverConfig};
use crate::error::Result;
use crate::network::NeuralNetwork;
use super::{Adam, GradientClipper, Optimizer, OptimizerWrapper, SGD};

/// Owns the optimizer state for one network and applies accumulated gradients.
///
/// A solver step consumes whatever gradients the network has accumulated since
/// the previous step, so several backward passes (one per timestep of an
/// episode, say) may precede a single step.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Solver {
    optimizer: OptimizerWrapper,
    learning_rate: f32,
    clipper: GradientClipper,
    iter: usize,
}

impl Solver {
    pub fn new(optimizer: OptimizerWrapper, learning_rate: f32, clipper: GradientClipper) -> Self {
        Solver {
            optimizer,
            learning_rate,
            clipper,
            iter: 0,
        }
    }

    pub fn from_config(config: &SolverConfig) -> Self {
        let optimizer = match config.optimizer {
            OptimizerKind::Sgd => OptimizerWrapper::SGD(SGD::new()),
            OptimizerKind::Adam { beta1, beta2, epsilon } => OptimizerWrapper::Adam(Adam::new(beta1, beta2, epsilon)),
        };
        Solver::new(optimizer, config.learning_rate, config.clipper)
    }

    pub fn iter(&self) -> usize {
        self.iter
    }

    pub fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    pub fn set_learning_rate(&mut self, learning_rate: f32) {
        self.learning_rate = learning_rate;
    }

    /// Apply one update from the accumulated gradients, then zero them.
    pub fn step(&mut self, network: &mut NeuralNetwork) {
        {
            let mut grads = network
                .layers
                .iter_mut()
                .map(|l| l.gradients_mut())
                .collect::<Vec<_>>();
            self.clipper.clip(&mut grads);
        }

        self.optimizer.begin_step();
        for (index, layer) in network.layers.iter_mut().enumerate() {
            let params = layer.params();
            let mut params = params.write();
            let (weight_grads, bias_grads) = layer.gradients();
            self.optimizer.update_layer(index, &mut params, weight_grads, bias_grads, self.learning_rate);
        }
        network.zero_grad();
        self.iter += 1;
    }

    /// Persist optimizer state and iteration count.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, bincode::serialize(self)?)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = fs::read(path)?;
        Ok(bincode::deserialize(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activations::Activation;
    use crate::layers::{DenseLayer, LayerParams};
    use ndarray::array;

    fn single_weight_net(w: f32) -> NeuralNetwork {
        NeuralNetwork::with_layers(vec![DenseLayer::from_params(
            "critic_ip1".to_string(),
            LayerParams { weights: array![[w]], biases: array![0.0] },
            Activation::Linear,
        )])
    }

    #[test]
    fn test_sgd_step_consumes_gradients() {
        let mut net = single_weight_net(1.0);
        let mut solver = Solver::new(OptimizerWrapper::SGD(SGD::new()), 0.1, GradientClipper::None);
        net.forward_batch(array![[2.0]].view());
        net.backward_batch(array![[1.0]].view()).unwrap();
        solver.step(&mut net);

        let p = net.layers[0].params_snapshot();
        assert!((p.weights[[0, 0]] - 0.8).abs() < 1e-6);
        assert!((p.biases[0] + 0.1).abs() < 1e-6);
        assert_eq!(solver.iter(), 1);
        assert!(net.layers[0].gradients().0.iter().all(|&g| g == 0.0));
    }

    #[test]
    fn test_adam_first_step_moves_by_learning_rate() {
        let mut net = single_weight_net(1.0);
        let mut solver = Solver::new(OptimizerWrapper::Adam(Adam::default()), 0.01, GradientClipper::None);
        net.forward_batch(array![[1.0]].view());
        net.backward_batch(array![[3.0]].view()).unwrap();
        solver.step(&mut net);
        let w = net.layers[0].params_snapshot().weights[[0, 0]];
        assert!((w - 0.99).abs() < 1e-4);
    }
}
