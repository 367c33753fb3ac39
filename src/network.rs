use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::Rng;
use serde::{Serialize, Deserialize};
use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use bincode::{serialize, deserialize};

use crate::activations::Activation;
use crate::error::{HermesError, Result};
use crate::layers::{DenseLayer, WeightInit};

/// A feed-forward network of named dense layers.
///
/// `forward_batch` caches the activations needed by `backward_batch`;
/// `predict_batch` is a pure evaluation that leaves those caches alone, which is
/// what target networks and value queries use. Cloning is structural: the clone
/// has the same shapes and values but its own parameter storage.
#[derive(Serialize, Deserialize, Clone)]
pub struct NeuralNetwork {
    pub layers: Vec<DenseLayer>,
}

impl NeuralNetwork {
    /// Create a new network with the given layer sizes. Layers are named
    /// `{prefix}_ip1`, `{prefix}_ip2`, ... Every layer but the last uses
    /// `hidden_activation`; the last uses `output_activation`.
    pub fn new<R: Rng + ?Sized>(
        prefix: &str,
        layer_sizes: &[usize],
        hidden_activation: Activation,
        output_activation: Activation,
        init: WeightInit,
        rng: &mut R,
    ) -> Self {
        assert!(layer_sizes.len() >= 2, "a network needs an input and an output size");
        let num_layers = layer_sizes.len() - 1;

        let layers = layer_sizes
            .windows(2)
            .enumerate()
            .map(|(i, window)| {
                let activation = if i + 1 == num_layers { output_activation } else { hidden_activation };
                DenseLayer::new(format!("{}_ip{}", prefix, i + 1), window[0], window[1], activation, init, rng)
            })
            .collect::<Vec<_>>();

        NeuralNetwork { layers }
    }

    pub fn with_layers(layers: Vec<DenseLayer>) -> Self {
        NeuralNetwork { layers }
    }

    pub fn input_size(&self) -> usize {
        self.layers.first().map(|l| l.input_size()).unwrap_or(0)
    }

    pub fn output_size(&self) -> usize {
        self.layers.last().map(|l| l.output_size()).unwrap_or(0)
    }

    pub fn num_params(&self) -> usize {
        self.layers
            .iter()
            .map(|l| l.input_size() * l.output_size() + l.output_size())
            .sum()
    }

    pub fn layer(&self, name: &str) -> Option<&DenseLayer> {
        self.layers.iter().find(|l| l.name() == name)
    }

    pub fn layer_mut(&mut self, name: &str) -> Option<&mut DenseLayer> {
        self.layers.iter_mut().find(|l| l.name() == name)
    }

    /// Perform a forward pass for a single input vector.
    pub fn forward(&mut self, input: ArrayView1<f32>) -> Array1<f32> {
        let input = input.insert_axis(Axis(0));
        self.forward_batch(input).index_axis_move(Axis(0), 0)
    }

    /// Perform a forward pass for a batch of input vectors, caching activations.
    pub fn forward_batch(&mut self, inputs: ArrayView2<f32>) -> Array2<f32> {
        let mut current_output = inputs.to_owned();
        for layer in &mut self.layers {
            current_output = layer.forward_batch(current_output.view());
        }
        current_output
    }

    /// Evaluate a single input without touching any cache.
    pub fn predict(&self, input: ArrayView1<f32>) -> Array1<f32> {
        let input = input.insert_axis(Axis(0));
        self.predict_batch(input).index_axis_move(Axis(0), 0)
    }

    /// Evaluate a batch without touching any cache.
    pub fn predict_batch(&self, inputs: ArrayView2<f32>) -> Array2<f32> {
        let mut current_output = inputs.to_owned();
        for layer in &self.layers {
            current_output = layer.predict_batch(current_output.view());
        }
        current_output
    }

    /// Backpropagate dL/d output through the network. Parameter gradients are
    /// accumulated in every layer; the return value is dL/d input.
    pub fn backward_batch(&mut self, output_errors: ArrayView2<f32>) -> Result<Array2<f32>> {
        let mut current_error = output_errors.to_owned();
        for layer in self.layers.iter_mut().rev() {
            current_error = layer.backward_batch(current_error.view())?;
        }
        Ok(current_error)
    }

    /// dL/d input for the cached forward pass without accumulating any
    /// parameter gradient. Used when a network only relays a gradient.
    pub fn input_gradient(&self, output_errors: ArrayView2<f32>) -> Result<Array2<f32>> {
        let mut current_error = output_errors.to_owned();
        for layer in self.layers.iter().rev() {
            current_error = layer.input_gradient(current_error.view())?;
        }
        Ok(current_error)
    }

    pub fn zero_grad(&mut self) {
        for layer in &mut self.layers {
            layer.zero_grad();
        }
    }

    /// Blend this (target) network toward `online`:
    /// `self ← tau·online + (1 − tau)·self`.
    pub fn soft_update_from(&mut self, online: &NeuralNetwork, tau: f32) -> Result<()> {
        self.check_same_structure(online)?;
        for (target, source) in self.layers.iter_mut().zip(online.layers.iter()) {
            target.soft_update_from(source, tau);
        }
        Ok(())
    }

    /// Overwrite parameter values with `other`'s, keeping storage identity.
    pub fn copy_from(&mut self, other: &NeuralNetwork) -> Result<()> {
        self.check_same_structure(other)?;
        for (dst, src) in self.layers.iter_mut().zip(other.layers.iter()) {
            dst.set_params(src.params_snapshot())?;
        }
        Ok(())
    }

    pub fn check_same_structure(&self, other: &NeuralNetwork) -> Result<()> {
        let shapes = |net: &NeuralNetwork| {
            net.layers
                .iter()
                .map(|l| (l.input_size(), l.output_size()))
                .collect::<Vec<_>>()
        };
        let (mine, theirs) = (shapes(self), shapes(other));
        if mine != theirs {
            return Err(HermesError::dimension_mismatch(format!("{:?}", mine), format!("{:?}", theirs)));
        }
        Ok(())
    }

    /// Save the network's parameters to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let serialized = serialize(self)?;
        let mut file = fs::File::create(path)?;
        file.write_all(&serialized)?;
        file.sync_all()?;
        Ok(())
    }

    /// Load a network from a file written by [`NeuralNetwork::save`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = fs::File::open(path)?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;
        let deserialized: Self = deserialize(&buffer)?;
        Ok(deserialized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn net(seed: u64) -> NeuralNetwork {
        let mut rng = StdRng::seed_from_u64(seed);
        NeuralNetwork::new(
            "actor",
            &[3, 8, 2],
            Activation::LeakyRelu { alpha: 0.01 },
            Activation::Linear,
            WeightInit::XavierUniform,
            &mut rng,
        )
    }

    #[test]
    fn test_layer_names() {
        let n = net(0);
        assert!(n.layer("actor_ip1").is_some());
        assert!(n.layer("actor_ip2").is_some());
        assert!(n.layer("actor_ip3").is_none());
        assert_eq!(n.input_size(), 3);
        assert_eq!(n.output_size(), 2);
    }

    #[test]
    fn test_predict_matches_forward() {
        let mut n = net(1);
        let x = array![[0.1, -0.2, 0.3], [1.0, 0.0, -1.0]];
        let p = n.predict_batch(x.view());
        let f = n.forward_batch(x.view());
        assert_eq!(p, f);
    }

    #[test]
    fn test_input_gradient_matches_finite_difference() {
        let mut n = net(2);
        let x = array![0.3f32, -0.4, 0.7];
        n.forward_batch(x.view().insert_axis(Axis(0)));
        let grad = n.backward_batch(array![[1.0, 0.0]].view()).unwrap();

        let h = 1e-3;
        for i in 0..3 {
            let mut plus = x.clone();
            plus[i] += h;
            let mut minus = x.clone();
            minus[i] -= h;
            let numeric = (n.predict(plus.view())[0] - n.predict(minus.view())[0]) / (2.0 * h);
            assert!((numeric - grad[[0, i]]).abs() < 1e-2, "dim {}: {} vs {}", i, numeric, grad[[0, i]]);
        }
    }

    #[test]
    fn test_input_gradient_leaves_parameter_gradients() {
        let mut n = net(4);
        let x = array![[0.2f32, 0.1, -0.5]];
        n.forward_batch(x.view());
        let relayed = n.input_gradient(array![[0.0, 1.0]].view()).unwrap();
        assert!(n.layers.iter().all(|l| l.gradients().0.iter().all(|&g| g == 0.0)));
        let accumulated = n.backward_batch(array![[0.0, 1.0]].view()).unwrap();
        assert_eq!(relayed, accumulated);
    }

    #[test]
    fn test_save_and_load() {
        let n = net(3);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("net.weights");
        n.save(&path).unwrap();
        let loaded = NeuralNetwork::load(&path).unwrap();
        let x = array![0.5, 0.5, 0.5];
        assert_eq!(n.predict(x.view()), loaded.predict(x.view()));
    }
}
