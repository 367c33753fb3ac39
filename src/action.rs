//! Hybrid discrete/continuous action space and ActorOutput decoding.
//!
//! An [`ActorOutput`] is laid out as
//! `[discrete scores | continuous parameters | message]`. Each discrete action
//! owns zero, one or two continuous parameters, stored contiguously in action
//! order.

use std::fmt::Write as _;
use std::ops::Range;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::error::{HermesError, Result};
use crate::transition::ActorOutput;

/// Valid interval of one bounded output.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParamRange {
    pub min: f32,
    pub max: f32,
}

impl ParamRange {
    pub const fn new(min: f32, max: f32) -> Self {
        ParamRange { min, max }
    }

    pub fn width(&self) -> f32 {
        self.max - self.min
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        rng.gen_range(self.min..=self.max)
    }
}

/// Range shared by discrete scores and message values.
pub const UNIT_RANGE: ParamRange = ParamRange::new(-1.0, 1.0);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiscreteAction {
    pub name: String,
    pub params: Vec<ParamRange>,
}

impl DiscreteAction {
    pub fn new(name: impl Into<String>, params: Vec<ParamRange>) -> Self {
        DiscreteAction { name: name.into(), params }
    }
}

/// A decoded runtime action: the chosen discrete action and its parameters.
/// Parameters the action does not use are zero.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Action {
    pub choice: usize,
    pub arg1: f32,
    pub arg2: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionSpace {
    actions: Vec<DiscreteAction>,
    message_size: usize,
}

impl ActionSpace {
    pub fn new(actions: Vec<DiscreteAction>, message_size: usize) -> Self {
        ActionSpace { actions, message_size }
    }

    /// Dash, Turn, Tackle and Kick with their HFO parameter ranges.
    pub fn hfo(message_size: usize) -> Self {
        let power = ParamRange::new(-100.0, 100.0);
        let direction = ParamRange::new(-180.0, 180.0);
        ActionSpace::new(
            vec![
                DiscreteAction::new("Dash", vec![power, direction]),
                DiscreteAction::new("Turn", vec![direction]),
                DiscreteAction::new("Tackle", vec![direction]),
                DiscreteAction::new("Kick", vec![ParamRange::new(0.0, 100.0), direction]),
            ],
            message_size,
        )
    }

    pub fn validate(&self) -> Result<()> {
        for action in &self.actions {
            if action.params.len() > 2 {
                return Err(HermesError::invalid_parameter(
                    format!("action_space.{}", action.name),
                    "an action takes at most two parameters".to_string(),
                ));
            }
            if action.params.iter().any(|r| !(r.min < r.max)) {
                return Err(HermesError::invalid_parameter(
                    format!("action_space.{}", action.name),
                    "parameter ranges need min < max".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn actions(&self) -> &[DiscreteAction] {
        &self.actions
    }

    pub fn num_discrete(&self) -> usize {
        self.actions.len()
    }

    pub fn num_params(&self) -> usize {
        self.actions.iter().map(|a| a.params.len()).sum()
    }

    pub fn message_size(&self) -> usize {
        self.message_size
    }

    pub fn output_size(&self) -> usize {
        self.num_discrete() + self.num_params() + self.message_size
    }

    pub fn scores_range(&self) -> Range<usize> {
        0..self.num_discrete()
    }

    pub fn params_range(&self) -> Range<usize> {
        self.num_discrete()..self.num_discrete() + self.num_params()
    }

    pub fn message_range(&self) -> Range<usize> {
        let start = self.num_discrete() + self.num_params();
        start..start + self.message_size
    }

    /// Index in the output of the first parameter of `choice`.
    pub fn param_offset(&self, choice: usize) -> usize {
        self.num_discrete() + self.actions[..choice].iter().map(|a| a.params.len()).sum::<usize>()
    }

    /// Valid range of every output element, in output order.
    pub fn output_bounds(&self) -> Vec<ParamRange> {
        let mut bounds = vec![UNIT_RANGE; self.num_discrete()];
        bounds.extend(self.actions.iter().flat_map(|a| a.params.iter().copied()));
        bounds.extend(std::iter::repeat(UNIT_RANGE).take(self.message_size));
        bounds
    }

    pub fn scores<'a>(&self, output: &'a ActorOutput) -> ArrayView1<'a, f32> {
        output.slice(ndarray::s![self.scores_range()])
    }

    pub fn message<'a>(&self, output: &'a ActorOutput) -> ArrayView1<'a, f32> {
        output.slice(ndarray::s![self.message_range()])
    }

    /// Fails unless `output` has exactly [`ActionSpace::output_size`] elements.
    pub fn check_output(&self, output: &ActorOutput) -> Result<()> {
        if output.len() != self.output_size() {
            return Err(HermesError::dimension_mismatch(
                format!("actor output of length {}", self.output_size()),
                format!("actor output of length {}", output.len()),
            ));
        }
        Ok(())
    }

    fn decode(&self, output: &ActorOutput, choice: usize) -> Action {
        let offset = self.param_offset(choice);
        let params = &self.actions[choice].params;
        let arg = |i: usize| if i < params.len() { output[offset + i] } else { 0.0 };
        Action { choice, arg1: arg(0), arg2: arg(1) }
    }

    fn greedy_choice(&self, output: &ActorOutput) -> usize {
        let mut best = 0;
        for (i, &score) in self.scores(output).iter().enumerate() {
            if score > output[best] {
                best = i;
            }
        }
        best
    }

    /// Decode by taking the maximal discrete score. Ties go to the first occurrence.
    pub fn get_action(&self, output: &ActorOutput) -> Result<Action> {
        self.check_output(output)?;
        Ok(self.decode(output, self.greedy_choice(output)))
    }

    /// Decode by drawing the discrete choice from a softmax over the scores.
    pub fn sample_action<R: Rng + ?Sized>(&self, output: &ActorOutput, rng: &mut R) -> Result<Action> {
        self.check_output(output)?;
        let probs = softmax(self.scores(output));
        let choice = match WeightedIndex::new(probs.iter()) {
            Ok(dist) => dist.sample(rng),
            // Non-finite scores: fall back to the greedy choice.
            Err(_) => self.greedy_choice(output),
        };
        Ok(self.decode(output, choice))
    }

    /// A uniformly random output: scores in [-1, 1], parameters in their ranges,
    /// message in [-1, 1].
    pub fn random_actor_output<R: Rng + ?Sized>(&self, rng: &mut R) -> ActorOutput {
        self.output_bounds().iter().map(|r| r.sample(rng)).collect()
    }

    /// Randomize scores and parameters, leaving the message untouched.
    pub fn randomize_non_comm<R: Rng + ?Sized>(&self, output: &mut ActorOutput, rng: &mut R) {
        let bounds = self.output_bounds();
        for i in self.scores_range().chain(self.params_range()) {
            output[i] = bounds[i].sample(rng);
        }
    }

    /// Scale an ascent direction on the outputs so bounded outputs slow down as
    /// they approach their limits and reverse past them.
    ///
    /// `ascent` holds dQ/d output for a batch of `outputs`.
    pub fn invert_gradients(&self, outputs: ArrayView2<f32>, ascent: &mut Array2<f32>) {
        let bounds = self.output_bounds();
        for (row, mut grads) in outputs.outer_iter().zip(ascent.outer_iter_mut()) {
            for (i, g) in grads.iter_mut().enumerate() {
                let range = bounds[i];
                let p = row[i];
                let scale = if *g > 0.0 {
                    (range.max - p) / range.width()
                } else {
                    (p - range.min) / range.width()
                };
                *g *= scale;
            }
        }
    }

    /// Human readable rendering of an output, for logs.
    pub fn describe(&self, output: &ActorOutput) -> String {
        if let Err(e) = self.check_output(output) {
            return e.to_string();
        }
        let mut s = String::new();
        for (i, action) in self.actions.iter().enumerate() {
            let _ = write!(s, "{} = {:.3}", action.name, output[i]);
            let offset = self.param_offset(i);
            let params = (0..action.params.len())
                .map(|j| format!("{:.2}", output[offset + j]))
                .collect::<Vec<_>>();
            if !params.is_empty() {
                let _ = write!(s, " ({})", params.join(", "));
            }
            s.push_str("; ");
        }
        if self.message_size > 0 {
            let msg = self
                .message(output)
                .iter()
                .map(|v| format!("{:.2}", v))
                .collect::<Vec<_>>();
            let _ = write!(s, "Message = [{}]", msg.join(", "));
        }
        s.trim_end_matches("; ").to_string()
    }

    /// Encode the message segment for an in-game say channel: each value is
    /// clamped to [-1, 1] and written as a signed hundredth, e.g. `+042-100`.
    /// A malformed output says nothing.
    pub fn say_message(&self, output: &ActorOutput) -> String {
        let mut s = String::with_capacity(4 * self.message_size);
        if self.check_output(output).is_err() {
            return s;
        }
        for &v in self.message(output).iter() {
            let q = (v.clamp(-1.0, 1.0) * 100.0).round() as i32;
            let _ = write!(s, "{}{:03}", if q < 0 { '-' } else { '+' }, q.abs());
        }
        s
    }

    /// Inverse of [`ActionSpace::say_message`]. Missing or malformed input
    /// yields zeros so an unheard teammate reads as silence.
    pub fn hear_message(&self, said: &str) -> Array1<f32> {
        let mut heard = Array1::zeros(self.message_size);
        let bytes = said.as_bytes();
        for (i, chunk) in bytes.chunks(4).take(self.message_size).enumerate() {
            let parsed = std::str::from_utf8(chunk).ok().and_then(|c| c.parse::<i32>().ok());
            if let Some(q) = parsed {
                heard[i] = q as f32 / 100.0;
            }
        }
        heard
    }
}

/// Numerically stable softmax.
pub fn softmax(scores: ArrayView1<f32>) -> Array1<f32> {
    let max = scores.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exp = scores.mapv(|s| (s - max).exp());
    let sum = exp.sum();
    exp / sum
}
