// Test modules for all components
pub mod test_agent;
pub mod test_persistence;
pub mod test_update;

use ndarray::Array1;

use crate::action::ActionSpace;
use crate::agent::{Agent, AgentBuilder};
use crate::transition::{InputStates, Transition};

/// Small agent over 4-feature states, fast enough for unit tests.
pub fn small_agent(message_size: usize, seed: u64) -> Agent {
    AgentBuilder::new()
        .state_size(4)
        .action_space(ActionSpace::hfo(message_size))
        .hidden_sizes(&[8], &[8])
        .semantic_hidden(&[8])
        .minibatch_size(4)
        .memory_capacity(64)
        .log_interval(0)
        .seed(seed)
        .build()
        .unwrap()
}

pub fn window(value: f32) -> InputStates {
    vec![Array1::from_elem(4, value)]
}

/// Fill `agent`'s memory with `count` transitions from its own actor.
pub fn fill_memory(agent: &mut Agent, count: usize) {
    for i in 0..count {
        let states = window(i as f32 * 0.1);
        let action = agent.select_action(&states, 0, 0.5).unwrap();
        let next = if i % 5 == 4 { None } else { Some(Array1::from_elem(4, (i + 1) as f32 * 0.1)) };
        agent
            .memory()
            .add_transition(Transition::new(states, 0, action, (i % 3) as f32 - 1.0, next));
    }
}
