//! Agent and solver configuration.
//!
//! Configurations are plain `serde` structs with defaults matching the HFO
//! setup, loadable from and writable to JSON.

use std::fs;
use std::path::Path;

use serde::{Serialize, Deserialize};

use crate::action::ActionSpace;
use crate::activations::Activation;
use crate::error::{HermesError, Result};
use crate::layers::WeightInit;
use crate::optimizer::GradientClipper;

/// Which update rule a solver runs.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum OptimizerKind {
    Sgd,
    Adam { beta1: f32, beta2: f32, epsilon: f32 },
}

impl Default for OptimizerKind {
    fn default() -> Self {
        OptimizerKind::Adam { beta1: 0.95, beta2: 0.999, epsilon: 1e-8 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    pub optimizer: OptimizerKind,
    pub learning_rate: f32,
    pub clipper: GradientClipper,
}

impl SolverConfig {
    pub fn adam(learning_rate: f32) -> Self {
        SolverConfig {
            optimizer: OptimizerKind::default(),
            learning_rate,
            clipper: GradientClipper::ClipByGlobalNorm { max_norm: 10.0 },
        }
    }

    pub fn sgd(learning_rate: f32) -> Self {
        SolverConfig {
            optimizer: OptimizerKind::Sgd,
            learning_rate,
            clipper: GradientClipper::None,
        }
    }
}

/// How critic regression targets are produced.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum TargetStrategy {
    /// `r + γ·Q'(s', μ'(s'))` from the target networks, `r` at episode end.
    Bootstrap,
    /// The tabular on-policy target stored in each transition.
    OnPolicy,
    /// `β·on_policy + (1 − β)·bootstrap`.
    Mixed { beta: f32 },
}

impl Default for TargetStrategy {
    fn default() -> Self {
        TargetStrategy::Bootstrap
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Number of features in one state snapshot.
    pub state_size: usize,
    /// Length of the state window fed to the networks.
    pub state_input_count: usize,
    pub num_tasks: usize,
    pub action_space: ActionSpace,
    /// Teammates whose messages the critic receives as extra input.
    pub num_teammates: usize,
    pub actor_hidden: Vec<usize>,
    pub critic_hidden: Vec<usize>,
    pub semantic_hidden: Vec<usize>,
    pub hidden_activation: Activation,
    pub weight_init: WeightInit,
    pub actor_solver: SolverConfig,
    pub critic_solver: SolverConfig,
    pub semantic_solver: SolverConfig,
    pub gamma: f32,
    pub tau: f32,
    pub minibatch_size: usize,
    pub memory_capacity: usize,
    pub target_strategy: TargetStrategy,
    /// Bound continuous parameters by scaling the critic's action gradient.
    pub invert_gradients: bool,
    /// Whether exploration also randomizes the message segment.
    pub randomize_comm: bool,
    /// Decay of the exponentially smoothed loss counters.
    pub loss_smoothing: f32,
    /// Critic iterations between loss reports.
    pub log_interval: usize,
    pub seed: Option<u64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            state_size: 58,
            state_input_count: 1,
            num_tasks: 1,
            action_space: ActionSpace::hfo(0),
            num_teammates: 0,
            actor_hidden: vec![1024, 512, 256, 128],
            critic_hidden: vec![1024, 512, 256, 128],
            semantic_hidden: vec![256, 128],
            hidden_activation: Activation::LeakyRelu { alpha: 0.01 },
            weight_init: WeightInit::XavierUniform,
            actor_solver: SolverConfig::adam(1e-5),
            critic_solver: SolverConfig::adam(1e-3),
            semantic_solver: SolverConfig::adam(1e-4),
            gamma: 0.99,
            tau: 0.001,
            minibatch_size: 32,
            memory_capacity: 500_000,
            target_strategy: TargetStrategy::Bootstrap,
            invert_gradients: true,
            randomize_comm: true,
            loss_smoothing: 0.99,
            log_interval: 1000,
            seed: None,
        }
    }
}

impl AgentConfig {
    /// Width of the state part of every network input.
    pub fn state_input_size(&self) -> usize {
        self.state_size * self.state_input_count
    }

    /// Width of the teammate message block fed to the critic.
    pub fn teammate_features_size(&self) -> usize {
        self.num_teammates * self.action_space.message_size()
    }

    pub fn actor_input_size(&self) -> usize {
        self.state_input_size() + self.num_tasks
    }

    pub fn critic_input_size(&self) -> usize {
        self.actor_input_size() + self.action_space.output_size() + self.teammate_features_size()
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("state_size", self.state_size),
            ("state_input_count", self.state_input_count),
            ("num_tasks", self.num_tasks),
            ("minibatch_size", self.minibatch_size),
            ("memory_capacity", self.memory_capacity),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(HermesError::invalid_parameter(name, "must be greater than 0"));
            }
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(HermesError::invalid_parameter("gamma", "must lie in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.tau) {
            return Err(HermesError::invalid_parameter("tau", "must lie in [0, 1]"));
        }
        if !(0.0..1.0).contains(&self.loss_smoothing) {
            return Err(HermesError::invalid_parameter("loss_smoothing", "must lie in [0, 1)"));
        }
        if let TargetStrategy::Mixed { beta } = self.target_strategy {
            if !(0.0..=1.0).contains(&beta) {
                return Err(HermesError::invalid_parameter("target_strategy.beta", "must lie in [0, 1]"));
            }
        }
        if self.action_space.num_discrete() == 0 {
            return Err(HermesError::invalid_parameter("action_space", "needs at least one discrete action"));
        }
        self.action_space.validate()
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: AgentConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)?;
        Ok(())
    }
}
