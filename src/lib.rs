//! # Hermes - Communicating Actor-Critic Learning Core
//!
//! Hermes trains teams of agents that act in a hybrid discrete/continuous
//! action space and talk to each other through a learned message channel.
//! Each agent owns an actor and a critic (with slowly tracking target copies),
//! a replay memory, and optionally a semantic network that learns what a
//! teammate would say.
//!
//! ## Key Features
//!
//! - **Parameterized actions**: discrete choices with bounded continuous
//!   parameters, kept in range by inverting gradients
//! - **Deep deterministic policy gradient** with bootstrap, on-policy or mixed
//!   critic targets
//! - **Multi-agent training**: teammates exchange messages and message
//!   gradients each update, either per minibatch or replaying whole episodes
//! - **Sharing**: layers and replay memories can be shared between agents
//! - **Snapshots**: atomic, prefix-named snapshots with resume
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hermes::agent::AgentBuilder;
//! use hermes::action::ActionSpace;
//! use hermes::transition::Transition;
//! use ndarray::Array1;
//!
//! let mut agent = AgentBuilder::new()
//!     .state_size(58)
//!     .action_space(ActionSpace::hfo(0))
//!     .build()
//!     .unwrap();
//!
//! let states = vec![Array1::zeros(58)];
//! let output = agent.select_action(&states, 0, 0.1).unwrap();
//! let action = agent.action_space().get_action(&output).unwrap();
//! agent.memory().add_transition(Transition::new(states, 0, output, 0.0, None));
//! agent.update().unwrap();
//! ```
//!
//! ## Module Organization
//!
//! - [`action`] - Action space layout and actor-output decoding
//! - [`activations`] - Activation functions
//! - [`agent`] - The agent: selection, updates, sharing, persistence
//! - [`checkpoint`] - Snapshot naming, discovery and the replay-memory codec
//! - [`config`] - Agent and solver configuration
//! - [`error`] - Error types and result handling
//! - [`layers`] - Dense layers with shareable parameters
//! - [`metrics`] - Smoothed loss tracking
//! - [`multi_agent`] - Team exchange and synchronized updates
//! - [`network`] - Feed-forward networks
//! - [`optimizer`] - SGD, Adam, gradient clipping and solvers
//! - [`replay_memory`] - Bounded shared experience buffer
//! - [`transition`] - Recorded experience

pub mod action;
pub mod activations;
pub mod agent;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod layers;
pub mod metrics;
pub mod multi_agent;
pub mod network;
pub mod optimizer;
pub mod replay_memory;
pub mod transition;

#[cfg(test)]
mod tests;
