use ndarray::{Array1, Array2};
use serde::{Serialize, Deserialize};

/// Gradient clipping methods
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum GradientClipper {
    /// Clip gradients by value
    ClipByValue { min: f32, max: f32 },

    /// Clip gradients by global norm (across all parameters of a network)
    ClipByGlobalNorm { max_norm: f32 },

    /// No clipping
    None,
}

impl Default for GradientClipper {
    fn default() -> Self {
        GradientClipper::None
    }
}

impl GradientClipper {
    /// Clip the gradients of every layer of a network in place.
    pub fn clip(&self, gradients: &mut [(&mut Array2<f32>, &mut Array1<f32>)]) {
        match self {
            GradientClipper::ClipByValue { min, max } => {
                for (weights, biases) in gradients.iter_mut() {
                    weights.mapv_inplace(|g| g.max(*min).min(*max));
                    biases.mapv_inplace(|g| g.max(*min).min(*max));
                }
            }

            GradientClipper::ClipByGlobalNorm { max_norm } => {
                let norm = Self::compute_global_norm(gradients);
                if norm > *max_norm && norm > 0.0 {
                    let scale = max_norm / norm;
                    for (weights, biases) in gradients.iter_mut() {
                        weights.mapv_inplace(|g| g * scale);
                        biases.mapv_inplace(|g| g * scale);
                    }
                }
            }

            GradientClipper::None => {}
        }
    }

    /// Compute global norm of all gradients
    pub fn compute_global_norm(gradients: &[(&mut Array2<f32>, &mut Array1<f32>)]) -> f32 {
        gradients
            .iter()
            .map(|(w, b)| w.iter().map(|&x| x * x).sum::<f32>() + b.iter().map(|&x| x * x).sum::<f32>())
            .sum::<f32>()
            .sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_clip_by_value() {
        let mut w = array![[5.0, -5.0]];
        let mut b = array![0.5];
        GradientClipper::ClipByValue { min: -1.0, max: 1.0 }.clip(&mut [(&mut w, &mut b)]);
        assert_eq!(w, array![[1.0, -1.0]]);
        assert_eq!(b, array![0.5]);
    }

    #[test]
    fn test_clip_by_global_norm() {
        let mut w = array![[3.0]];
        let mut b = array![4.0];
        GradientClipper::ClipByGlobalNorm { max_norm: 1.0 }.clip(&mut [(&mut w, &mut b)]);
        assert!((w[[0, 0]] - 0.6).abs() < 1e-6);
        assert!((b[0] - 0.8).abs() < 1e-6);
    }
}
