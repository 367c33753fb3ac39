//! # Multi-Agent Training Module
//!
//! Agents of one team train on their own threads and meet in an in-process
//! exchange once per update. Each round has two phases:
//!
//! 1. **Features**: every agent publishes the messages relevant to the sampled
//!    transitions (stored, online and target).
//! 2. **Gradients**: every agent updates its critic with the teammates'
//!    messages as extra input, then sends each teammate the critic's gradient
//!    with respect to that teammate's message, and adds what it receives to
//!    the gradient on its own message outputs before the actor step.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::thread;
//! use hermes::agent::AgentBuilder;
//! use hermes::action::ActionSpace;
//! use hermes::multi_agent::{CommExchange, SyncStrategy};
//!
//! let ports = CommExchange::new(2).into_ports();
//! let handles = ports
//!     .into_iter()
//!     .map(|mut port| {
//!         thread::spawn(move || {
//!             let mut agent = AgentBuilder::new()
//!                 .id(port.id())
//!                 .state_size(8)
//!                 .action_space(ActionSpace::hfo(2))
//!                 .num_teammates(1)
//!                 .build()
//!                 .unwrap();
//!             // ... fill agent.memory() from the environment ...
//!             let indices = vec![0, 1, 2];
//!             agent.synchronized_update(&mut port, &indices, SyncStrategy::Exact)
//!         })
//!     })
//!     .collect::<Vec<_>>();
//! for handle in handles {
//!     handle.join().unwrap().unwrap();
//! }
//! ```

mod exchange;
mod sync_update;

pub use exchange::{CommExchange, CommFeatures, ExchangePort, Phase};
pub use sync_update::TeammateFeatures;

/// How phase 2 obtains teammates' features.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncStrategy {
    /// Wait for the current round's features.
    Exact,
    /// Use the previous round's features and collect the current ones
    /// afterwards. The first round is exact.
    Approximate,
}

impl Default for SyncStrategy {
    fn default() -> Self {
        SyncStrategy::Exact
    }
}
