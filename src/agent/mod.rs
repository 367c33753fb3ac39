//! # Communicating actor-critic agent
//!
//! An [`Agent`] owns three network roles, each with its own solver:
//!
//! - **actor** μ(s, task) → `[scores | parameters | message]`, with a target copy
//! - **critic** Q(s, task, a, teammate messages) → scalar, with a target copy
//! - **semantic** (only when the action space carries a message): predicts a
//!   teammate's message from this agent's own observation
//!
//! Target networks never receive solver steps; they follow their online
//! networks through [`NeuralNetwork::soft_update_from`] after every update.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use hermes::agent::AgentBuilder;
//! use hermes::action::ActionSpace;
//! use hermes::transition::Transition;
//! use ndarray::Array1;
//!
//! let mut agent = AgentBuilder::new()
//!     .state_size(8)
//!     .action_space(ActionSpace::hfo(0))
//!     .hidden_sizes(&[64, 32], &[64, 32])
//!     .seed(7)
//!     .build()
//!     .unwrap();
//!
//! let states = vec![Array1::zeros(8)];
//! let output = agent.select_action(&states, 0, 0.1).unwrap();
//! agent.memory().add_transition(Transition::new(states, 0, output, 1.0, None));
//! let (critic_loss, actor_loss) = agent.update().unwrap();
//! ```

mod persistence;
mod selection;
mod semantic;
mod sharing;
mod update;

pub use persistence::ResumeOutcome;
pub use sharing::share_layer;
pub(crate) use update::{Batch, PolicyAscent};

use std::ops::Range;

use ndarray::{s, Array1, Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::action::ActionSpace;
use crate::activations::Activation;
use crate::config::{AgentConfig, SolverConfig, TargetStrategy};
use crate::error::{HermesError, Result};
use crate::metrics::LossTracker;
use crate::network::NeuralNetwork;
use crate::optimizer::Solver;
use crate::replay_memory::ReplayMemory;
use crate::transition::{flatten_states, stack_states, StateData};

/// The optional third network role.
pub(crate) struct SemanticNet {
    pub(crate) net: NeuralNetwork,
    pub(crate) solver: Solver,
}

pub struct Agent {
    id: usize,
    config: AgentConfig,
    pub(crate) actor: NeuralNetwork,
    pub(crate) actor_target: NeuralNetwork,
    pub(crate) actor_solver: Solver,
    pub(crate) critic: NeuralNetwork,
    pub(crate) critic_target: NeuralNetwork,
    pub(crate) critic_solver: Solver,
    pub(crate) semantic: Option<SemanticNet>,
    pub(crate) memory: ReplayMemory,
    pub(crate) rng: StdRng,
    pub(crate) losses: LossTracker,
    /// Teammate features of the previous synchronized round.
    pub(crate) teammate_cache: Option<crate::multi_agent::TeammateFeatures>,
}

fn layer_sizes(input: usize, hidden: &[usize], output: usize) -> Vec<usize> {
    let mut sizes = Vec::with_capacity(hidden.len() + 2);
    sizes.push(input);
    sizes.extend_from_slice(hidden);
    sizes.push(output);
    sizes
}

impl Agent {
    pub fn new(config: AgentConfig) -> Result<Self> {
        Agent::with_id(config, 0)
    }

    /// Create agent `id` of a team. The id only seeds the generator (so agents
    /// built from one seeded config still differ) and tags log lines.
    pub fn with_id(config: AgentConfig, id: usize) -> Result<Self> {
        config.validate()?;
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(id as u64)),
            None => StdRng::from_entropy(),
        };

        let space = &config.action_space;
        let actor = NeuralNetwork::new(
            "actor",
            &layer_sizes(config.actor_input_size(), &config.actor_hidden, space.output_size()),
            config.hidden_activation,
            Activation::Linear,
            config.weight_init,
            &mut rng,
        );
        let critic = NeuralNetwork::new(
            "critic",
            &layer_sizes(config.critic_input_size(), &config.critic_hidden, 1),
            config.hidden_activation,
            Activation::Linear,
            config.weight_init,
            &mut rng,
        );
        let semantic = if space.message_size() > 0 {
            Some(SemanticNet {
                net: NeuralNetwork::new(
                    "semantic",
                    &layer_sizes(config.actor_input_size(), &config.semantic_hidden, space.message_size()),
                    config.hidden_activation,
                    Activation::Linear,
                    config.weight_init,
                    &mut rng,
                ),
                solver: Solver::from_config(&config.semantic_solver),
            })
        } else {
            None
        };

        log::debug!(
            "[Agent {}] actor {} params, critic {} params",
            id,
            actor.num_params(),
            critic.num_params()
        );

        Ok(Agent {
            id,
            actor_target: actor.clone(),
            actor_solver: Solver::from_config(&config.actor_solver),
            critic_target: critic.clone(),
            critic_solver: Solver::from_config(&config.critic_solver),
            memory: ReplayMemory::new(config.memory_capacity),
            losses: LossTracker::new(config.loss_smoothing),
            actor,
            critic,
            semantic,
            rng,
            teammate_cache: None,
            config,
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn action_space(&self) -> &ActionSpace {
        &self.config.action_space
    }

    pub fn memory(&self) -> &ReplayMemory {
        &self.memory
    }

    pub fn actor(&self) -> &NeuralNetwork {
        &self.actor
    }

    pub fn actor_target(&self) -> &NeuralNetwork {
        &self.actor_target
    }

    pub fn critic(&self) -> &NeuralNetwork {
        &self.critic
    }

    pub fn critic_target(&self) -> &NeuralNetwork {
        &self.critic_target
    }

    pub fn semantic(&self) -> Option<&NeuralNetwork> {
        self.semantic.as_ref().map(|s| &s.net)
    }

    pub fn losses(&self) -> &LossTracker {
        &self.losses
    }

    pub fn actor_iter(&self) -> usize {
        self.actor_solver.iter()
    }

    pub fn critic_iter(&self) -> usize {
        self.critic_solver.iter()
    }

    pub fn semantic_iter(&self) -> usize {
        self.semantic.as_ref().map(|s| s.solver.iter()).unwrap_or(0)
    }

    /// Training iteration used to name snapshots.
    pub fn iteration(&self) -> usize {
        self.actor_iter().max(self.critic_iter())
    }

    pub fn min_iter(&self) -> usize {
        self.actor_iter().min(self.critic_iter())
    }

    pub fn max_iter(&self) -> usize {
        self.iteration()
    }

    /// Copy both online networks into their targets.
    pub fn sync_targets(&mut self) -> Result<()> {
        self.actor_target.copy_from(&self.actor)?;
        self.critic_target.copy_from(&self.critic)
    }

    pub(crate) fn soft_update_targets(&mut self) -> Result<()> {
        let tau = self.config.tau;
        self.actor_target.soft_update_from(&self.actor, tau)?;
        self.critic_target.soft_update_from(&self.critic, tau)
    }

    fn check_window(&self, window: &[StateData], task: usize) -> Result<()> {
        if window.len() != self.config.state_input_count {
            return Err(HermesError::dimension_mismatch(
                format!("{} stacked states", self.config.state_input_count),
                format!("{} stacked states", window.len()),
            ));
        }
        if let Some(bad) = window.iter().find(|s| s.len() != self.config.state_size) {
            return Err(HermesError::dimension_mismatch(
                format!("state of length {}", self.config.state_size),
                format!("state of length {}", bad.len()),
            ));
        }
        if task >= self.config.num_tasks {
            return Err(HermesError::invalid_parameter(
                "task".to_string(),
                format!("task {} out of range for {} tasks", task, self.config.num_tasks),
            ));
        }
        Ok(())
    }

    /// Actor input for one window: the flattened states followed by a one-hot task.
    pub(crate) fn encode_input(&self, window: &[StateData], task: usize) -> Result<Array1<f32>> {
        self.check_window(window, task)?;
        let mut task_code = Array1::zeros(self.config.num_tasks);
        task_code[task] = 1.0;
        Ok(ndarray::concatenate(Axis(0), &[flatten_states(window).view(), task_code.view()])?)
    }

    /// Batched form of [`Agent::encode_input`].
    pub(crate) fn encode_inputs(&self, windows: &[&[StateData]], tasks: &[usize]) -> Result<Array2<f32>> {
        if windows.len() != tasks.len() {
            return Err(HermesError::dimension_mismatch(
                format!("{} task ids", windows.len()),
                format!("{} task ids", tasks.len()),
            ));
        }
        for (window, &task) in windows.iter().zip(tasks) {
            self.check_window(window, task)?;
        }
        let state_width = self.config.state_input_size();
        let mut inputs = Array2::zeros((windows.len(), self.config.actor_input_size()));
        inputs
            .slice_mut(s![.., ..state_width])
            .assign(&stack_states(windows, state_width));
        for (i, &task) in tasks.iter().enumerate() {
            inputs[[i, state_width + task]] = 1.0;
        }
        Ok(inputs)
    }

    /// Columns of the critic input holding the actor output.
    pub(crate) fn action_columns(&self) -> Range<usize> {
        let start = self.config.actor_input_size();
        start..start + self.config.action_space.output_size()
    }

    /// Columns of the critic input holding teammates' messages, one block per
    /// teammate in ascending id order.
    pub(crate) fn teammate_columns(&self) -> Range<usize> {
        let start = self.action_columns().end;
        start..start + self.config.teammate_features_size()
    }

    /// `[actor input | action | teammate messages]`; missing teammate
    /// messages read as silence (zeros).
    pub(crate) fn critic_inputs(
        &self,
        actor_inputs: ArrayView2<f32>,
        actions: ArrayView2<f32>,
        teammate: Option<ArrayView2<f32>>,
    ) -> Result<Array2<f32>> {
        let rows = actor_inputs.nrows();
        let width = self.config.teammate_features_size();
        let silence;
        let teammate = match &teammate {
            Some(t) => t.view(),
            None => {
                silence = Array2::zeros((rows, width));
                silence.view()
            }
        };
        if actions.dim() != (rows, self.config.action_space.output_size()) || teammate.dim() != (rows, width) {
            return Err(HermesError::dimension_mismatch(
                format!("{} rows of {} actions and {} teammate features", rows, self.config.action_space.output_size(), width),
                format!("actions {:?}, teammate features {:?}", actions.dim(), teammate.dim()),
            ));
        }
        Ok(ndarray::concatenate(Axis(1), &[actor_inputs.view(), actions.view(), teammate])?)
    }

    pub(crate) fn target_strategy(&self) -> TargetStrategy {
        self.config.target_strategy
    }
}

/// Builder for [`Agent`], in the style of the other builders in this crate.
pub struct AgentBuilder {
    config: AgentConfig,
    id: usize,
}

impl AgentBuilder {
    pub fn new() -> Self {
        AgentBuilder { config: AgentConfig::default(), id: 0 }
    }

    pub fn from_config(config: AgentConfig) -> Self {
        AgentBuilder { config, id: 0 }
    }

    pub fn id(mut self, id: usize) -> Self {
        self.id = id;
        self
    }

    pub fn state_size(mut self, state_size: usize) -> Self {
        self.config.state_size = state_size;
        self
    }

    pub fn state_input_count(mut self, count: usize) -> Self {
        self.config.state_input_count = count;
        self
    }

    pub fn num_tasks(mut self, num_tasks: usize) -> Self {
        self.config.num_tasks = num_tasks;
        self
    }

    pub fn action_space(mut self, action_space: ActionSpace) -> Self {
        self.config.action_space = action_space;
        self
    }

    pub fn num_teammates(mut self, num_teammates: usize) -> Self {
        self.config.num_teammates = num_teammates;
        self
    }

    pub fn hidden_sizes(mut self, actor: &[usize], critic: &[usize]) -> Self {
        self.config.actor_hidden = actor.to_vec();
        self.config.critic_hidden = critic.to_vec();
        self
    }

    pub fn semantic_hidden(mut self, sizes: &[usize]) -> Self {
        self.config.semantic_hidden = sizes.to_vec();
        self
    }

    pub fn actor_solver(mut self, solver: SolverConfig) -> Self {
        self.config.actor_solver = solver;
        self
    }

    pub fn critic_solver(mut self, solver: SolverConfig) -> Self {
        self.config.critic_solver = solver;
        self
    }

    pub fn gamma(mut self, gamma: f32) -> Self {
        self.config.gamma = gamma;
        self
    }

    pub fn tau(mut self, tau: f32) -> Self {
        self.config.tau = tau;
        self
    }

    pub fn minibatch_size(mut self, size: usize) -> Self {
        self.config.minibatch_size = size;
        self
    }

    pub fn memory_capacity(mut self, capacity: usize) -> Self {
        self.config.memory_capacity = capacity;
        self
    }

    pub fn target_strategy(mut self, strategy: TargetStrategy) -> Self {
        self.config.target_strategy = strategy;
        self
    }

    pub fn invert_gradients(mut self, invert: bool) -> Self {
        self.config.invert_gradients = invert;
        self
    }

    pub fn randomize_comm(mut self, randomize: bool) -> Self {
        self.config.randomize_comm = randomize;
        self
    }

    pub fn log_interval(mut self, interval: usize) -> Self {
        self.config.log_interval = interval;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<Agent> {
        Agent::with_id(self.config, self.id)
    }
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}
