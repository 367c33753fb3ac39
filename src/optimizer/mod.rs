pub mod gradient_clipper;
pub mod solver;

use ndarray::{Array1, Array2};
use serde::{Serialize, Deserialize};

use crate::layers::LayerParams;

pub use gradient_clipper::GradientClipper;
pub use solver::Solver;

/// A first-order update rule applied layer by layer.
pub trait Optimizer {
    /// Called once before the layers of one solver step are updated.
    fn begin_step(&mut self) {}

    /// Apply one update to the parameters of layer `index`.
    fn update_layer(
        &mut self,
        index: usize,
        params: &mut LayerParams,
        weight_grads: &Array2<f32>,
        bias_grads: &Array1<f32>,
        learning_rate: f32,
    );
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub enum OptimizerWrapper {
    SGD(SGD),
    Adam(Adam),
}

impl Optimizer for OptimizerWrapper {
    fn begin_step(&mut self) {
        match self {
            OptimizerWrapper::SGD(optimizer) => optimizer.begin_step(),
            OptimizerWrapper::Adam(optimizer) => optimizer.begin_step(),
        }
    }

    fn update_layer(
        &mut self,
        index: usize,
        params: &mut LayerParams,
        weight_grads: &Array2<f32>,
        bias_grads: &Array1<f32>,
        learning_rate: f32,
    ) {
        match self {
            OptimizerWrapper::SGD(optimizer) => optimizer.update_layer(index, params, weight_grads, bias_grads, learning_rate),
            OptimizerWrapper::Adam(optimizer) => optimizer.update_layer(index, params, weight_grads, bias_grads, learning_rate),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct SGD;

impl SGD {
    pub fn new() -> SGD {
        SGD
    }
}

impl Optimizer for SGD {
    fn update_layer(
        &mut self,
        _index: usize,
        params: &mut LayerParams,
        weight_grads: &Array2<f32>,
        bias_grads: &Array1<f32>,
        learning_rate: f32,
    ) {
        params.weights.zip_mut_with(weight_grads, |w, &g| *w -= learning_rate * g);
        params.biases.zip_mut_with(bias_grads, |b, &g| *b -= learning_rate * g);
    }
}

/// First and second moment estimates for one layer.
#[derive(Serialize, Deserialize, Clone, Debug)]
struct AdamMoments {
    m_weights: Array2<f32>,
    v_weights: Array2<f32>,
    m_biases: Array1<f32>,
    v_biases: Array1<f32>,
}

impl AdamMoments {
    fn zeros(weights: (usize, usize), biases: usize) -> Self {
        AdamMoments {
            m_weights: Array2::zeros(weights),
            v_weights: Array2::zeros(weights),
            m_biases: Array1::zeros(biases),
            v_biases: Array1::zeros(biases),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Adam {
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
    moments: Vec<Option<AdamMoments>>,
    pub t: usize,
}

impl Adam {
    pub fn new(beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Adam {
            beta1,
            beta2,
            epsilon,
            moments: Vec::new(),
            t: 0,
        }
    }

    fn moments_for(&mut self, index: usize, params: &LayerParams) -> &mut AdamMoments {
        if self.moments.len() <= index {
            self.moments.resize(index + 1, None);
        }
        let shape = params.shape();
        let slot = &mut self.moments[index];
        let stale = slot.as_ref().map(|m| m.m_weights.dim() != shape).unwrap_or(true);
        if stale {
            *slot = Some(AdamMoments::zeros(shape, params.biases.len()));
        }
        slot.get_or_insert_with(|| AdamMoments::zeros(shape, params.biases.len()))
    }
}

impl Default for Adam {
    fn default() -> Self {
        Self::new(0.9, 0.999, 1e-8)
    }
}

impl Optimizer for Adam {
    fn begin_step(&mut self) {
        self.t += 1;
    }

    fn update_layer(
        &mut self,
        index: usize,
        params: &mut LayerParams,
        weight_grads: &Array2<f32>,
        bias_grads: &Array1<f32>,
        learning_rate: f32,
    ) {
        let (beta1, beta2, epsilon) = (self.beta1, self.beta2, self.epsilon);
        let t = self.t.max(1) as i32;
        let correction1 = 1.0 - beta1.powi(t);
        let correction2 = 1.0 - beta2.powi(t);
        let moments = self.moments_for(index, params);

        moments.m_weights.zip_mut_with(weight_grads, |m, &g| *m = beta1 * *m + (1.0 - beta1) * g);
        moments.v_weights.zip_mut_with(weight_grads, |v, &g| *v = beta2 * *v + (1.0 - beta2) * g * g);
        moments.m_biases.zip_mut_with(bias_grads, |m, &g| *m = beta1 * *m + (1.0 - beta1) * g);
        moments.v_biases.zip_mut_with(bias_grads, |v, &g| *v = beta2 * *v + (1.0 - beta2) * g * g);

        ndarray::Zip::from(&mut params.weights)
            .and(&moments.m_weights)
            .and(&moments.v_weights)
            .for_each(|w, &m, &v| {
                *w -= learning_rate * (m / correction1) / ((v / correction2).sqrt() + epsilon);
            });
        ndarray::Zip::from(&mut params.biases)
            .and(&moments.m_biases)
            .and(&moments.v_biases)
            .for_each(|b, &m, &v| {
                *b -= learning_rate * (m / correction1) / ((v / correction2).sqrt() + epsilon);
            });
    }
}
