use ndarray::Array1;
use crate::action::ActionSpace;
use crate::agent::AgentBuilder;
use crate::config::{SolverConfig, TargetStrategy};
use crate::error::HermesError;
use crate::replay_memory::label_transitions;
use crate::transition::Transition;
use super::{fill_memory, small_agent, window};

fn sample_input() -> Array1<f32> {
    Array1::from_vec(vec![0.3, -0.2, 0.1, 0.9, 1.0])
}

#[test]
fn test_update_on_empty_memory_fails() {
    let mut agent = small_agent(0, 1);
    assert!(matches!(agent.update(), Err(HermesError::EmptyBuffer(_))));
    assert_eq!(agent.iteration(), 0);
}

#[test]
fn test_update_advances_iterations() {
    let mut agent = small_agent(1, 2);
    fill_memory(&mut agent, 12);
    for _ in 0..3 {
        let (critic_loss, actor_loss) = agent.update().unwrap();
        assert!(critic_loss.is_finite());
        assert!(actor_loss.is_finite());
    }
    assert_eq!(agent.actor_iter(), 3);
    assert_eq!(agent.critic_iter(), 3);
    assert_eq!(agent.iteration(), 3);
    assert_eq!(agent.min_iter(), 3);
    assert!(agent.losses().critic.value().is_finite());
}

#[test]
fn test_update_changes_online_networks() {
    let mut agent = small_agent(0, 3);
    fill_memory(&mut agent, 8);
    let before = agent.actor().predict(sample_input().view());
    let critic_before = agent.critic().num_params();
    agent.update().unwrap();
    assert_ne!(agent.actor().predict(sample_input().view()), before);
    assert_eq!(agent.critic().num_params(), critic_before);
}

#[test]
fn test_zero_tau_freezes_targets() {
    let mut agent = AgentBuilder::from_config(small_agent(0, 4).config().clone())
        .tau(0.0)
        .build()
        .unwrap();
    fill_memory(&mut agent, 8);
    let target_before = agent.actor_target().predict(sample_input().view());
    agent.update().unwrap();
    agent.update().unwrap();
    assert_eq!(agent.actor_target().predict(sample_input().view()), target_before);
}

#[test]
fn test_unit_tau_copies_online() {
    let mut agent = AgentBuilder::from_config(small_agent(0, 5).config().clone())
        .tau(1.0)
        .build()
        .unwrap();
    fill_memory(&mut agent, 8);
    agent.update().unwrap();
    let online = agent.critic().layers[0].params_snapshot();
    let target = agent.critic_target().layers[0].params_snapshot();
    for (a, b) in online.weights.iter().zip(target.weights.iter()) {
        assert!((a - b).abs() < 1e-6);
    }
}

#[test]
fn test_soft_update_blends() {
    let agent = small_agent(0, 6);
    let other = small_agent(0, 60);
    let mut target = agent.actor().clone();
    let online = other.actor();
    let before = target.layers[0].params_snapshot();
    target.soft_update_from(online, 0.25).unwrap();
    let after = target.layers[0].params_snapshot();
    let source = online.layers[0].params_snapshot();
    for ((t, o), a) in before.weights.iter().zip(source.weights.iter()).zip(after.weights.iter()) {
        assert!((a - (0.25 * o + 0.75 * t)).abs() < 1e-6);
    }
}

#[test]
fn test_update_actor_critic_with_explicit_indices() {
    let mut agent = small_agent(0, 7);
    fill_memory(&mut agent, 10);
    let (critic_loss, _) = agent.update_actor_critic(&[0, 1, 2, 3]).unwrap();
    assert!(critic_loss >= 0.0);
    assert!(matches!(agent.update_actor_critic(&[]), Err(HermesError::EmptyBuffer(_))));
}

#[test]
fn test_on_policy_targets_are_learned() {
    let mut agent = AgentBuilder::new()
        .state_size(4)
        .action_space(ActionSpace::hfo(0))
        .hidden_sizes(&[8], &[16])
        .critic_solver(SolverConfig::adam(1e-2))
        .target_strategy(TargetStrategy::OnPolicy)
        .minibatch_size(3)
        .seed(8)
        .build()
        .unwrap();

    let mut episode = Vec::new();
    for t in 0..3 {
        let states = window(t as f32 * 0.2);
        let action = agent.select_action(&states, 0, 0.0).unwrap();
        let next = if t == 2 { None } else { Some(Array1::from_elem(4, (t + 1) as f32 * 0.2)) };
        episode.push(Transition::new(states, 0, action, 1.0, next));
    }
    label_transitions(&mut episode, 0.5).unwrap();
    assert!((episode[0].on_policy_target - 1.75).abs() < 1e-6);
    agent.memory().add_transitions(episode);

    let (first, _) = agent.update_actor_critic(&[0, 1, 2]).unwrap();
    let mut last = first;
    for _ in 0..200 {
        last = agent.update_actor_critic(&[0, 1, 2]).unwrap().0;
    }
    assert!(last < first);
}

#[test]
fn test_mixed_targets_accept_unit_beta() {
    let mut agent = AgentBuilder::from_config(small_agent(0, 9).config().clone())
        .target_strategy(TargetStrategy::Mixed { beta: 1.0 })
        .build()
        .unwrap();
    fill_memory(&mut agent, 6);
    assert!(agent.update().is_ok());
}

#[test]
fn test_semantic_net_learns_teammate_messages() {
    let mut agent = small_agent(2, 10);
    let mut teammate = small_agent(2, 11);
    fill_memory(&mut agent, 8);
    fill_memory(&mut teammate, 8);

    let loss = agent.update_semantic_net(teammate.memory()).unwrap();
    assert!(loss.is_finite());
    assert_eq!(agent.semantic_iter(), 1);
}

#[test]
fn test_semantic_update_needs_message_channel() {
    let mut agent = small_agent(0, 12);
    let teammate = small_agent(0, 13);
    assert!(agent.update_semantic_net(teammate.memory()).is_err());
}

#[test]
fn test_benchmark_reports_rate() {
    let mut agent = small_agent(0, 14);
    fill_memory(&mut agent, 8);
    let rate = agent.benchmark(3).unwrap();
    assert!(rate > 0.0);
    assert_eq!(agent.critic_iter(), 3);
}
