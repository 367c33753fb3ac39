use std::time::Instant;

use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::config::TargetStrategy;
use crate::error::{HermesError, Result};
use crate::transition::{InputStates, StateData, Transition};
use super::Agent;

/// A minibatch laid out as network-ready matrices.
pub(crate) struct Batch {
    pub actor_inputs: Array2<f32>,
    pub actions: Array2<f32>,
    pub rewards: Array1<f32>,
    pub on_policy_targets: Array1<f32>,
    /// Inputs at the next step; rows of terminal transitions repeat the
    /// current window and are masked out by `non_terminal`.
    pub next_actor_inputs: Array2<f32>,
    pub non_terminal: Array1<f32>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    /// The single-row batch of sample `t`.
    pub fn select(&self, t: usize) -> Batch {
        Batch {
            actor_inputs: self.actor_inputs.slice(s![t..t + 1, ..]).to_owned(),
            actions: self.actions.slice(s![t..t + 1, ..]).to_owned(),
            rewards: self.rewards.slice(s![t..t + 1]).to_owned(),
            on_policy_targets: self.on_policy_targets.slice(s![t..t + 1]).to_owned(),
            next_actor_inputs: self.next_actor_inputs.slice(s![t..t + 1, ..]).to_owned(),
            non_terminal: self.non_terminal.slice(s![t..t + 1]).to_owned(),
        }
    }
}

/// Result of evaluating the critic at the actor's own output.
pub(crate) struct PolicyAscent {
    pub q_mean: f32,
    /// Actor outputs of the forward pass the actor cached.
    pub actions: Array2<f32>,
    /// Scaled dQ/d action, one row per sample.
    pub ascent: Array2<f32>,
    /// Scaled dQ/d teammate message blocks.
    pub teammate_ascent: Array2<f32>,
}

impl Agent {
    pub(crate) fn assemble_batch(&self, transitions: &[Transition]) -> Result<Batch> {
        if transitions.is_empty() {
            return Err(HermesError::EmptyBuffer("no transitions to train on".to_string()));
        }
        let output_size = self.action_space().output_size();
        if let Some(bad) = transitions.iter().find(|t| t.action.len() != output_size) {
            return Err(HermesError::dimension_mismatch(
                format!("action of length {}", output_size),
                format!("action of length {}", bad.action.len()),
            ));
        }

        let tasks = transitions.iter().map(|t| t.task_id).collect::<Vec<_>>();
        let windows = transitions.iter().map(|t| t.states.as_slice()).collect::<Vec<&[StateData]>>();
        let next_windows = transitions
            .iter()
            .map(|t| t.next_states().unwrap_or_else(|| t.states.clone()))
            .collect::<Vec<InputStates>>();
        let next_refs = next_windows.iter().map(|w| w.as_slice()).collect::<Vec<_>>();

        let mut actions = Array2::zeros((transitions.len(), output_size));
        for (mut row, t) in actions.outer_iter_mut().zip(transitions) {
            row.assign(&t.action);
        }

        Ok(Batch {
            actor_inputs: self.encode_inputs(&windows, &tasks)?,
            next_actor_inputs: self.encode_inputs(&next_refs, &tasks)?,
            actions,
            rewards: transitions.iter().map(|t| t.reward).collect(),
            on_policy_targets: transitions.iter().map(|t| t.on_policy_target).collect(),
            non_terminal: transitions.iter().map(|t| if t.is_terminal() { 0.0 } else { 1.0 }).collect(),
        })
    }

    /// `r + γ·Q'(s', μ'(s'))`, or `r` for terminal rows.
    fn bootstrap_targets(&self, batch: &Batch, teammate_target: Option<ArrayView2<f32>>) -> Result<Array1<f32>> {
        let next_actions = self.actor_target.predict_batch(batch.next_actor_inputs.view());
        let inputs = self.critic_inputs(batch.next_actor_inputs.view(), next_actions.view(), teammate_target)?;
        let q_next = self.critic_target.predict_batch(inputs.view()).index_axis_move(Axis(1), 0);
        let discounted = (&batch.non_terminal * &q_next) * self.config().gamma;
        Ok(&batch.rewards + &discounted)
    }

    pub(crate) fn critic_targets(&self, batch: &Batch, teammate_target: Option<ArrayView2<f32>>) -> Result<Array1<f32>> {
        match self.target_strategy() {
            TargetStrategy::Bootstrap => self.bootstrap_targets(batch, teammate_target),
            TargetStrategy::OnPolicy => Ok(batch.on_policy_targets.clone()),
            TargetStrategy::Mixed { beta } => {
                let bootstrap = self.bootstrap_targets(batch, teammate_target)?;
                Ok(&batch.on_policy_targets * beta + &(bootstrap * (1.0 - beta)))
            }
        }
    }

    /// Accumulate the gradient of `scale · Σ (Q(s, a) − y)²` into the online
    /// critic. Returns the mean squared error of the rows.
    pub(crate) fn critic_regression(
        &mut self,
        actor_inputs: ArrayView2<f32>,
        actions: ArrayView2<f32>,
        teammate: Option<ArrayView2<f32>>,
        targets: ArrayView1<f32>,
        scale: f32,
    ) -> Result<f32> {
        let inputs = self.critic_inputs(actor_inputs, actions, teammate)?;
        let q = self.critic.forward_batch(inputs.view());
        let diff = &q.column(0) - &targets;
        let loss = diff.mapv(|d| d * d).mean().unwrap_or(0.0);
        let output_errors = (diff * (2.0 * scale)).insert_axis(Axis(1));
        self.critic.backward_batch(output_errors.view())?;
        Ok(loss)
    }

    /// Run the actor on `actor_inputs` (caching the pass) and differentiate the
    /// critic at the result. The critic's parameter gradients are untouched.
    pub(crate) fn policy_ascent(
        &mut self,
        actor_inputs: ArrayView2<f32>,
        teammate: Option<ArrayView2<f32>>,
        scale: f32,
    ) -> Result<PolicyAscent> {
        let actions = self.actor.forward_batch(actor_inputs);
        let inputs = self.critic_inputs(actor_inputs, actions.view(), teammate)?;
        let q = self.critic.forward_batch(inputs.view());
        let q_mean = q.mean().unwrap_or(0.0);
        let seed = Array2::from_elem((q.nrows(), 1), scale);
        let input_grads = self.critic.input_gradient(seed.view())?;
        Ok(PolicyAscent {
            q_mean,
            ascent: input_grads.slice(s![.., self.action_columns()]).to_owned(),
            teammate_ascent: input_grads.slice(s![.., self.teammate_columns()]).to_owned(),
            actions,
        })
    }

    /// Push an ascent direction on the actor outputs back through the actor's
    /// cached forward pass, accumulating parameter gradients.
    pub(crate) fn apply_actor_ascent(&mut self, actions: ArrayView2<f32>, mut ascent: Array2<f32>) -> Result<()> {
        if self.config().invert_gradients {
            self.config().action_space.invert_gradients(actions, &mut ascent);
        }
        ascent.mapv_inplace(|g| -g);
        self.actor.backward_batch(ascent.view())?;
        Ok(())
    }

    /// One actor-critic step on the transitions at `indices`. Returns
    /// `(critic_loss, actor_loss)` where the actor loss is `−mean Q`.
    pub fn update_actor_critic(&mut self, indices: &[usize]) -> Result<(f32, f32)> {
        let transitions = self.memory.gather(indices);
        let batch = self.assemble_batch(&transitions)?;
        let scale = 1.0 / batch.len() as f32;

        let targets = self.critic_targets(&batch, None)?;
        let critic_loss = self.critic_regression(
            batch.actor_inputs.view(),
            batch.actions.view(),
            None,
            targets.view(),
            scale,
        )?;
        self.critic_solver.step(&mut self.critic);

        let PolicyAscent { q_mean, actions, ascent, .. } = self.policy_ascent(batch.actor_inputs.view(), None, scale)?;
        self.apply_actor_ascent(actions.view(), ascent)?;
        self.actor_solver.step(&mut self.actor);

        self.soft_update_targets()?;
        Ok((critic_loss, -q_mean))
    }

    /// Sample a minibatch and train on it, keeping the smoothed loss counters.
    pub fn update(&mut self) -> Result<(f32, f32)> {
        if self.memory.is_empty() {
            return Err(HermesError::EmptyBuffer("replay memory is empty".to_string()));
        }
        let indices = self
            .memory
            .sample_transition_indices(self.config.minibatch_size, &mut self.rng);
        let (critic_loss, actor_loss) = self.update_actor_critic(&indices)?;
        self.record_losses(critic_loss, actor_loss);
        Ok((critic_loss, actor_loss))
    }

    pub(crate) fn record_losses(&mut self, critic_loss: f32, actor_loss: f32) {
        self.losses.critic.update(critic_loss);
        self.losses.actor.update(actor_loss);
        let interval = self.config().log_interval;
        if interval > 0 && self.critic_iter() % interval == 0 {
            log::info!(
                "[Agent {}] Critic Iteration {}, smoothed critic loss = {:.5}, smoothed actor loss = {:.5}",
                self.id(),
                self.critic_iter(),
                self.losses.critic.value(),
                self.losses.actor.value()
            );
        }
    }

    /// Time `iterations` calls to [`Agent::update`]. Returns updates per second.
    pub fn benchmark(&mut self, iterations: usize) -> Result<f64> {
        let start = Instant::now();
        for _ in 0..iterations {
            self.update()?;
        }
        let elapsed = start.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 { iterations as f64 / elapsed } else { f64::INFINITY };
        log::info!(
            "[Agent {}] {} updates in {:.3}s ({:.1} updates/s)",
            self.id(),
            iterations,
            elapsed,
            rate
        );
        Ok(rate)
    }
}
