use ndarray::{Array1, Axis};
use rand::Rng;

use crate::action::Action;
use crate::error::Result;
use crate::transition::{ActorOutput, InputStates, StateData};
use super::Agent;

impl Agent {
    /// Epsilon-greedy action for one state window.
    ///
    /// With probability `epsilon` the output is random; when `randomize_comm`
    /// is off the greedy message is kept and only scores and parameters are
    /// randomized.
    pub fn select_action(&mut self, states: &[StateData], task: usize, epsilon: f32) -> Result<ActorOutput> {
        let input = self.encode_input(states, task)?;
        let greedy = self.actor.predict(input.view());
        Ok(self.explore(greedy, epsilon))
    }

    /// Batched [`Agent::select_action`]: one forward pass, epsilon applied per sample.
    pub fn select_actions(&mut self, batch: &[InputStates], tasks: &[usize], epsilon: f32) -> Result<Vec<ActorOutput>> {
        let windows = batch.iter().map(|w| w.as_slice()).collect::<Vec<_>>();
        let inputs = self.encode_inputs(&windows, tasks)?;
        let outputs = self.actor.predict_batch(inputs.view());
        Ok(outputs
            .axis_iter(Axis(0))
            .map(|row| self.explore(row.to_owned(), epsilon))
            .collect())
    }

    /// The online actor's output without exploration.
    pub fn greedy_action(&self, states: &[StateData], task: usize) -> Result<ActorOutput> {
        let input = self.encode_input(states, task)?;
        Ok(self.actor.predict(input.view()))
    }

    fn explore(&mut self, greedy: ActorOutput, epsilon: f32) -> ActorOutput {
        if self.rng.gen::<f32>() >= epsilon {
            return greedy;
        }
        if self.config().randomize_comm {
            self.config.action_space.random_actor_output(&mut self.rng)
        } else {
            let mut output = greedy;
            self.randomize_non_comm_actions(&mut output);
            output
        }
    }

    pub fn random_actor_output(&mut self) -> ActorOutput {
        self.config.action_space.random_actor_output(&mut self.rng)
    }

    /// Randomize scores and parameters in place, keeping the message.
    pub fn randomize_non_comm_actions(&mut self, output: &mut ActorOutput) {
        self.config.action_space.randomize_non_comm(output, &mut self.rng);
    }

    /// Draw a runtime action from the softmax over the output's scores.
    pub fn sample_action(&mut self, output: &ActorOutput) -> Result<Action> {
        self.config.action_space.sample_action(output, &mut self.rng)
    }

    /// The online critic's value of `action` in `states`. Teammate messages
    /// are treated as silence. Nothing training reads is modified.
    pub fn evaluate_action(&self, states: &[StateData], task: usize, action: &ActorOutput) -> Result<f32> {
        self.config().action_space.check_output(action)?;
        let input = self.encode_input(states, task)?.insert_axis(Axis(0));
        let action = action.view().insert_axis(Axis(0));
        let critic_input = self.critic_inputs(input.view(), action, None)?;
        let value: Array1<f32> = self.critic.predict_batch(critic_input.view()).index_axis_move(Axis(1), 0);
        Ok(value[0])
    }

    /// Log the decoded greedy output for `states`.
    pub fn print_actor_output(&self, states: &[StateData], task: usize) -> Result<()> {
        let output = self.greedy_action(states, task)?;
        log::info!("[Agent {}] {}", self.id(), self.config().action_space.describe(&output));
        Ok(())
    }
}
