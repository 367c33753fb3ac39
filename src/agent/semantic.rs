use ndarray::{s, Array1, Array2, Axis};
use rand::Rng;

use crate::error::{HermesError, Result};
use crate::replay_memory::ReplayMemory;
use crate::transition::StateData;
use super::Agent;

impl Agent {
    /// The semantic network's prediction of what a teammate would say given
    /// this agent's own observation. `None` when there is no message channel.
    pub fn semantic_message(&self, states: &[StateData], task: usize) -> Result<Option<Array1<f32>>> {
        let semantic = match &self.semantic {
            Some(semantic) => semantic,
            None => return Ok(None),
        };
        let input = self.encode_input(states, task)?;
        Ok(Some(semantic.net.predict(input.view())))
    }

    /// Regress the semantic network onto the messages a teammate actually sent.
    ///
    /// Both memories are assumed time-aligned: index `i` in each refers to the
    /// same environment step. Returns the mean squared error of the batch.
    pub fn update_semantic_net(&mut self, teammate_memory: &ReplayMemory) -> Result<f32> {
        if self.semantic.is_none() {
            return Err(HermesError::invalid_parameter(
                "semantic",
                "the action space has no message channel",
            ));
        }
        let len = self.memory.len().min(teammate_memory.len());
        if len == 0 {
            return Err(HermesError::EmptyBuffer("no aligned transitions for the semantic net".to_string()));
        }
        let indices = (0..self.config.minibatch_size)
            .map(|_| self.rng.gen_range(0..len))
            .collect::<Vec<_>>();
        let own = self.memory.gather(&indices);
        let heard = teammate_memory.gather(&indices);
        let rows = own.len().min(heard.len());
        if rows == 0 {
            return Err(HermesError::EmptyBuffer("no aligned transitions for the semantic net".to_string()));
        }

        let windows = own[..rows].iter().map(|t| t.states.as_slice()).collect::<Vec<_>>();
        let tasks = own[..rows].iter().map(|t| t.task_id).collect::<Vec<_>>();
        let inputs = self.encode_inputs(&windows, &tasks)?;

        let message_range = self.config.action_space.message_range();
        let mut targets = Array2::zeros((rows, message_range.len()));
        for (mut row, t) in targets.axis_iter_mut(Axis(0)).zip(&heard[..rows]) {
            if t.action.len() < message_range.end {
                return Err(HermesError::dimension_mismatch(
                    format!("teammate action of length {}", message_range.end),
                    format!("teammate action of length {}", t.action.len()),
                ));
            }
            row.assign(&t.action.slice(s![message_range.clone()]));
        }

        let semantic = match self.semantic.as_mut() {
            Some(semantic) => semantic,
            None => return Ok(0.0),
        };
        let predicted = semantic.net.forward_batch(inputs.view());
        let diff = &predicted - &targets;
        let loss = diff.mapv(|d| d * d).mean().unwrap_or(0.0);
        let count = diff.len().max(1) as f32;
        let output_errors = diff * (2.0 / count);
        semantic.net.backward_batch(output_errors.view())?;
        semantic.solver.step(&mut semantic.net);

        let iter = semantic.solver.iter();
        let smoothed = self.losses.semantic.update(loss);
        let interval = self.config.log_interval;
        if interval > 0 && iter % interval == 0 {
            log::info!("[Agent {}] Semantic Iteration {}, smoothed loss = {:.5}", self.id, iter, smoothed);
        }
        Ok(loss)
    }

    /// Greedy message for `states` encoded for an in-game say channel.
    pub fn say_message(&self, states: &[StateData], task: usize) -> Result<String> {
        let output = self.greedy_action(states, task)?;
        Ok(self.config.action_space.say_message(&output))
    }

    /// Decode messages heard from teammates into the critic's teammate block,
    /// in ascending teammate order. Teammates not heard from read as silence.
    pub fn hear_features(&self, heard: &[Option<&str>]) -> Result<Array1<f32>> {
        if heard.len() != self.config.num_teammates {
            return Err(HermesError::dimension_mismatch(
                format!("{} teammates", self.config.num_teammates),
                format!("{} teammates", heard.len()),
            ));
        }
        let space = &self.config.action_space;
        let mut features = Array1::zeros(self.config.teammate_features_size());
        for (k, said) in heard.iter().enumerate() {
            if let Some(said) = said {
                let block = k * space.message_size()..(k + 1) * space.message_size();
                features.slice_mut(s![block]).assign(&space.hear_message(said));
            }
        }
        Ok(features)
    }
}
