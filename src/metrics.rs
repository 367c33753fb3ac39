use serde::{Serialize, Deserialize};

/// Exponentially smoothed scalar, used for the loss counters reported during training.
///
/// The first observation initializes the value; after that
/// `value ← decay·value + (1 − decay)·observation`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SmoothedValue {
    value: f32,
    decay: f32,
    observed: bool,
}

impl SmoothedValue {
    pub fn new(decay: f32) -> Self {
        SmoothedValue { value: 0.0, decay, observed: false }
    }

    pub fn update(&mut self, observation: f32) -> f32 {
        if !observation.is_finite() {
            return self.value;
        }
        if self.observed {
            self.value = self.decay * self.value + (1.0 - self.decay) * observation;
        } else {
            self.value = observation;
            self.observed = true;
        }
        self.value
    }

    pub fn value(&self) -> f32 {
        self.value
    }
}

/// Smoothed losses of one agent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LossTracker {
    pub critic: SmoothedValue,
    pub actor: SmoothedValue,
    pub semantic: SmoothedValue,
}

impl LossTracker {
    pub fn new(decay: f32) -> Self {
        LossTracker {
            critic: SmoothedValue::new(decay),
            actor: SmoothedValue::new(decay),
            semantic: SmoothedValue::new(decay),
        }
    }
}
