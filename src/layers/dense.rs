use std::sync::Arc;

use ndarray::{Array1, Array2, ArrayView2, Axis};
use parking_lot::RwLock;
use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::activations::Activation;
use crate::error::{HermesError, Result};
use super::initialization::WeightInit;

/// Trainable parameters of a dense layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerParams {
    pub weights: Array2<f32>,
    pub biases: Array1<f32>,
}

impl LayerParams {
    pub fn shape(&self) -> (usize, usize) {
        self.weights.dim()
    }
}

/// Parameter storage that several layers (possibly owned by different agents
/// on different threads) can hold at once.
pub type SharedParams = Arc<RwLock<LayerParams>>;

/// A fully connected (dense) layer.
///
/// Parameters live behind a [`SharedParams`] handle so a layer can adopt
/// another layer's storage by reference (see [`DenseLayer::share_params`]).
/// Gradients accumulate across `backward_batch` calls until [`DenseLayer::zero_grad`].
#[derive(Serialize, Deserialize)]
#[serde(from = "LayerRecord", into = "LayerRecord")]
pub struct DenseLayer {
    name: String,
    params: SharedParams,
    activation: Activation,
    weight_grads: Array2<f32>,
    bias_grads: Array1<f32>,
    pre_activation_output: Option<Array2<f32>>,
    inputs: Option<Array2<f32>>,
}

/// On-disk form of a layer: name, activation and a copy of the parameters.
#[derive(Serialize, Deserialize)]
struct LayerRecord {
    name: String,
    activation: Activation,
    params: LayerParams,
}

impl From<LayerRecord> for DenseLayer {
    fn from(record: LayerRecord) -> Self {
        DenseLayer::from_params(record.name, record.params, record.activation)
    }
}

impl From<DenseLayer> for LayerRecord {
    fn from(layer: DenseLayer) -> Self {
        LayerRecord {
            params: layer.params_snapshot(),
            name: layer.name,
            activation: layer.activation,
        }
    }
}

/// Structural clone: same shapes and values, independent storage.
impl Clone for DenseLayer {
    fn clone(&self) -> Self {
        DenseLayer::from_params(self.name.clone(), self.params_snapshot(), self.activation)
    }
}

impl DenseLayer {
    /// Create a new layer with the given input size, output size, and activation function.
    /// Weights are drawn according to `init`, biases start at zero.
    pub fn new<R: Rng + ?Sized>(
        name: impl Into<String>,
        input_size: usize,
        output_size: usize,
        activation: Activation,
        init: WeightInit,
        rng: &mut R,
    ) -> Self {
        let params = LayerParams {
            weights: init.initialize_weights((input_size, output_size), rng),
            biases: Array1::zeros(output_size),
        };
        DenseLayer::from_params(name.into(), params, activation)
    }

    pub fn from_params(name: String, params: LayerParams, activation: Activation) -> Self {
        let (input_size, output_size) = params.shape();
        DenseLayer {
            name,
            params: Arc::new(RwLock::new(params)),
            activation,
            weight_grads: Array2::zeros((input_size, output_size)),
            bias_grads: Array1::zeros(output_size),
            pre_activation_output: None,
            inputs: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn input_size(&self) -> usize {
        self.weight_grads.shape()[0]
    }

    pub fn output_size(&self) -> usize {
        self.weight_grads.shape()[1]
    }

    /// Handle to this layer's parameter storage.
    pub fn params(&self) -> SharedParams {
        Arc::clone(&self.params)
    }

    /// Copy of the current parameter values.
    pub fn params_snapshot(&self) -> LayerParams {
        self.params.read().clone()
    }

    /// Overwrite parameter values in place, keeping the storage (and any sharing) intact.
    pub fn set_params(&mut self, params: LayerParams) -> Result<()> {
        let mut current = self.params.write();
        if current.shape() != params.shape() {
            return Err(HermesError::dimension_mismatch(
                format!("{:?}", current.shape()),
                format!("{:?}", params.shape()),
            ));
        }
        *current = params;
        Ok(())
    }

    /// Adopt `params` as this layer's storage. The previous storage is dropped
    /// once no other layer refers to it.
    pub fn share_params(&mut self, params: SharedParams) -> Result<()> {
        let shape = params.read().shape();
        if shape != (self.input_size(), self.output_size()) {
            return Err(HermesError::layer_mismatch(
                self.name.clone(),
                format!("owner shape {:?} differs from {:?}", shape, (self.input_size(), self.output_size())),
            ));
        }
        self.params = params;
        Ok(())
    }

    pub fn shares_params_with(&self, other: &DenseLayer) -> bool {
        Arc::ptr_eq(&self.params, &other.params)
    }

    /// Forward pass that caches what the backward pass needs.
    pub fn forward_batch(&mut self, inputs: ArrayView2<f32>) -> Array2<f32> {
        let pre_activation = {
            let params = self.params.read();
            inputs.dot(&params.weights) + &params.biases.view().insert_axis(Axis(0))
        };
        let mut outputs = pre_activation.clone();
        self.activation.apply_batch(&mut outputs);
        self.inputs = Some(inputs.to_owned());
        self.pre_activation_output = Some(pre_activation);
        outputs
    }

    /// Forward pass without touching the caches.
    pub fn predict_batch(&self, inputs: ArrayView2<f32>) -> Array2<f32> {
        let params = self.params.read();
        let mut outputs = inputs.dot(&params.weights) + &params.biases.view().insert_axis(Axis(0));
        self.activation.apply_batch(&mut outputs);
        outputs
    }

    /// Backpropagate `output_errors` (dL/d output), accumulating parameter
    /// gradients, and return dL/d input.
    pub fn backward_batch(&mut self, output_errors: ArrayView2<f32>) -> Result<Array2<f32>> {
        let adjusted_error = self.adjusted_error(output_errors)?;
        if let Some(inputs) = &self.inputs {
            self.weight_grads += &inputs.t().dot(&adjusted_error);
        }
        self.bias_grads += &adjusted_error.sum_axis(Axis(0));

        let params = self.params.read();
        Ok(adjusted_error.dot(&params.weights.t()))
    }

    /// dL/d input for the cached forward pass, leaving parameter gradients alone.
    pub fn input_gradient(&self, output_errors: ArrayView2<f32>) -> Result<Array2<f32>> {
        let adjusted_error = self.adjusted_error(output_errors)?;
        let params = self.params.read();
        Ok(adjusted_error.dot(&params.weights.t()))
    }

    fn adjusted_error(&self, output_errors: ArrayView2<f32>) -> Result<Array2<f32>> {
        let pre_activation = match (&self.inputs, &self.pre_activation_output) {
            (Some(_), Some(pre)) => pre,
            _ => {
                return Err(HermesError::invalid_parameter(
                    self.name.clone(),
                    "forward_batch() must be called before backward_batch()".to_string(),
                ))
            }
        };
        if output_errors.dim() != pre_activation.dim() {
            return Err(HermesError::dimension_mismatch(
                format!("{:?}", pre_activation.dim()),
                format!("{:?}", output_errors.dim()),
            ));
        }
        let activation_deriv = self.activation.derivative_batch(pre_activation.view());
        Ok(&output_errors * &activation_deriv)
    }

    pub fn zero_grad(&mut self) {
        self.weight_grads.fill(0.0);
        self.bias_grads.fill(0.0);
    }

    pub fn gradients(&self) -> (&Array2<f32>, &Array1<f32>) {
        (&self.weight_grads, &self.bias_grads)
    }

    pub fn gradients_mut(&mut self) -> (&mut Array2<f32>, &mut Array1<f32>) {
        (&mut self.weight_grads, &mut self.bias_grads)
    }

    /// `self ← tau·source + (1 − tau)·self`, elementwise.
    pub fn soft_update_from(&mut self, source: &DenseLayer, tau: f32) {
        if self.shares_params_with(source) {
            return;
        }
        let source = source.params.read();
        let mut target = self.params.write();
        target.weights.zip_mut_with(&source.weights, |t, &s| *t = tau * s + (1.0 - tau) * *t);
        target.biases.zip_mut_with(&source.biases, |t, &s| *t = tau * s + (1.0 - tau) * *t);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn layer(activation: Activation) -> DenseLayer {
        DenseLayer::from_params(
            "ip1".to_string(),
            LayerParams {
                weights: array![[1.0, -1.0], [0.5, 2.0]],
                biases: array![0.0, 1.0],
            },
            activation,
        )
    }

    #[test]
    fn test_forward_linear() {
        let mut l = layer(Activation::Linear);
        let out = l.forward_batch(array![[1.0, 2.0]].view());
        assert_eq!(out, array![[2.0, 4.0]]);
    }

    #[test]
    fn test_backward_accumulates() {
        let mut l = layer(Activation::Linear);
        l.forward_batch(array![[1.0, 2.0]].view());
        let input_grad = l.backward_batch(array![[1.0, 0.0]].view()).unwrap();
        assert_eq!(input_grad, array![[1.0, 0.5]]);
        l.backward_batch(array![[1.0, 0.0]].view()).unwrap();
        let (wg, bg) = l.gradients();
        assert_eq!(wg, &array![[2.0, 0.0], [4.0, 0.0]]);
        assert_eq!(bg, &array![2.0, 0.0]);
        l.zero_grad();
        assert!(l.gradients().0.iter().all(|&g| g == 0.0));
    }

    #[test]
    fn test_backward_without_forward_fails() {
        let mut l = layer(Activation::Relu);
        assert!(l.backward_batch(array![[1.0, 1.0]].view()).is_err());
    }

    #[test]
    fn test_clone_is_independent() {
        let l = layer(Activation::Linear);
        let c = l.clone();
        assert!(!c.shares_params_with(&l));
        assert_eq!(c.params_snapshot(), l.params_snapshot());
    }

    #[test]
    fn test_share_params_rejects_shape_mismatch() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut a = DenseLayer::new("ip1", 2, 2, Activation::Relu, WeightInit::XavierUniform, &mut rng);
        let b = DenseLayer::new("ip1", 3, 2, Activation::Relu, WeightInit::XavierUniform, &mut rng);
        assert!(a.share_params(b.params()).is_err());
    }
}
