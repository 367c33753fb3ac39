use ndarray::{s, Array1, Array2};
use crate::action::ActionSpace;
use crate::agent::AgentBuilder;
use crate::config::AgentConfig;
use crate::error::HermesError;
use super::{small_agent, window};

#[test]
fn test_builder_sizes() {
    let agent = small_agent(2, 1);
    let space = agent.action_space();
    assert_eq!(space.output_size(), 4 + 6 + 2);

    // 4 state features + 1 task
    assert_eq!(agent.actor().input_size(), 5);
    assert_eq!(agent.actor().output_size(), 12);
    assert_eq!(agent.critic().input_size(), 5 + 12);
    assert_eq!(agent.critic().output_size(), 1);
    assert!(agent.semantic().is_some());
    assert_eq!(agent.memory().capacity(), 64);
    assert_eq!(agent.iteration(), 0);
}

#[test]
fn test_no_semantic_without_message() {
    let agent = small_agent(0, 1);
    assert!(agent.semantic().is_none());
    assert!(agent.semantic_message(&window(0.0), 0).unwrap().is_none());
}

#[test]
fn test_teammates_widen_critic_input() {
    let agent = AgentBuilder::new()
        .state_size(4)
        .action_space(ActionSpace::hfo(3))
        .num_teammates(2)
        .hidden_sizes(&[8], &[8])
        .seed(3)
        .build()
        .unwrap();
    assert_eq!(agent.critic().input_size(), 5 + 13 + 6);
}

#[test]
fn test_invalid_config_rejected() {
    let result = AgentBuilder::new().state_size(0).build();
    assert!(matches!(result, Err(HermesError::InvalidParameter { .. })));

    let result = AgentBuilder::new().state_size(4).tau(1.5).build();
    assert!(matches!(result, Err(HermesError::InvalidParameter { .. })));
}

#[test]
fn test_targets_start_equal_to_online() {
    let agent = small_agent(1, 2);
    let input = Array1::from_vec(vec![0.1, 0.2, 0.3, 0.4, 1.0]);
    assert_eq!(agent.actor().predict(input.view()), agent.actor_target().predict(input.view()));
}

#[test]
fn test_same_seed_same_networks() {
    let a = small_agent(1, 9);
    let b = small_agent(1, 9);
    let input = Array1::from_vec(vec![0.5, -0.5, 0.25, 0.0, 1.0]);
    assert_eq!(a.actor().predict(input.view()), b.actor().predict(input.view()));

    // Team members built from one config differ.
    let c = AgentBuilder::from_config(a.config().clone()).id(1).build().unwrap();
    assert_ne!(a.actor().predict(input.view()), c.actor().predict(input.view()));
}

#[test]
fn test_select_action_greedy_matches_actor() {
    let mut agent = small_agent(2, 4);
    let states = window(0.3);
    let greedy = agent.greedy_action(&states, 0).unwrap();
    for _ in 0..5 {
        assert_eq!(agent.select_action(&states, 0, 0.0).unwrap(), greedy);
    }
}

#[test]
fn test_select_action_explores_within_bounds() {
    let mut agent = small_agent(2, 5);
    let bounds = agent.action_space().output_bounds();
    for _ in 0..20 {
        let output = agent.select_action(&window(0.1), 0, 1.0).unwrap();
        assert_eq!(output.len(), bounds.len());
        for (value, range) in output.iter().zip(&bounds) {
            assert!(*value >= range.min && *value <= range.max);
        }
    }
}

#[test]
fn test_exploration_keeps_message_when_comm_not_randomized() {
    let mut agent = AgentBuilder::new()
        .state_size(4)
        .action_space(ActionSpace::hfo(3))
        .hidden_sizes(&[8], &[8])
        .randomize_comm(false)
        .seed(6)
        .build()
        .unwrap();
    let states = window(0.7);
    let greedy = agent.greedy_action(&states, 0).unwrap();
    let range = agent.action_space().message_range();
    for _ in 0..10 {
        let explored = agent.select_action(&states, 0, 1.0).unwrap();
        assert_eq!(explored.slice(ndarray::s![range.clone()]), greedy.slice(ndarray::s![range.clone()]));
    }
}

#[test]
fn test_select_actions_batch() {
    let mut agent = small_agent(1, 7);
    let batch = vec![window(0.0), window(0.5), window(1.0)];
    let outputs = agent.select_actions(&batch, &[0, 0, 0], 0.0).unwrap();
    assert_eq!(outputs.len(), 3);
    for (output, states) in outputs.iter().zip(&batch) {
        let single = agent.greedy_action(states, 0).unwrap();
        for (a, b) in output.iter().zip(single.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }
}

#[test]
fn test_wrong_window_rejected() {
    let mut agent = small_agent(0, 8);
    let short = vec![Array1::zeros(3)];
    assert!(matches!(
        agent.select_action(&short, 0, 0.0),
        Err(HermesError::DimensionMismatch { .. })
    ));
    assert!(matches!(
        agent.select_action(&window(0.0), 1, 0.0),
        Err(HermesError::InvalidParameter { .. })
    ));
}

#[test]
fn test_evaluate_action_is_pure() {
    let mut agent = small_agent(1, 10);
    let states = window(0.2);
    let action = agent.select_action(&states, 0, 0.0).unwrap();
    let first = agent.evaluate_action(&states, 0, &action).unwrap();
    let second = agent.evaluate_action(&states, 0, &action).unwrap();
    assert_eq!(first, second);
    assert_eq!(agent.critic_iter(), 0);

    let short = Array1::zeros(3);
    assert!(agent.evaluate_action(&states, 0, &short).is_err());
}

#[test]
fn test_sample_action_stays_in_range() {
    let mut agent = small_agent(0, 11);
    let output = agent.random_actor_output();
    for _ in 0..20 {
        let action = agent.sample_action(&output).unwrap();
        assert!(action.choice < agent.action_space().num_discrete());
    }
}

#[test]
fn test_say_and_hear_message() {
    let agent = AgentBuilder::from_config(small_agent(2, 12).config().clone())
        .num_teammates(1)
        .build()
        .unwrap();
    let said = agent.say_message(&window(0.4), 0).unwrap();
    let heard = agent.hear_features(&[Some(said.as_str())]).unwrap();
    assert_eq!(heard.len(), 2);

    let silent = agent.hear_features(&[None]).unwrap();
    assert!(silent.iter().all(|&v| v == 0.0));

    assert!(agent.hear_features(&[None, None]).is_err());
}

#[test]
fn test_config_json_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("agent.json");
    let config = small_agent(2, 13).config().clone();
    config.to_json_file(&path).unwrap();
    let loaded = AgentConfig::from_json_file(&path).unwrap();
    assert_eq!(loaded.action_space, config.action_space);
    assert_eq!(loaded.seed, Some(13));
}

#[test]
fn test_critic_inputs_pad_missing_teammates_with_silence() {
    let agent = AgentBuilder::new()
        .state_size(4)
        .action_space(ActionSpace::hfo(2))
        .num_teammates(1)
        .hidden_sizes(&[8], &[8])
        .log_interval(0)
        .seed(12)
        .build()
        .unwrap();
    let config = agent.config();
    let (inputs, outputs, heard) =
        (config.actor_input_size(), config.action_space.output_size(), config.teammate_features_size());
    assert_eq!(heard, 2);

    let actor_inputs = Array2::from_elem((3, inputs), 0.5);
    let actions = Array2::from_elem((3, outputs), -0.25);
    let silent = agent.critic_inputs(actor_inputs.view(), actions.view(), None).unwrap();
    assert_eq!(silent.dim(), (3, inputs + outputs + heard));
    assert!(silent.slice(s![.., ..inputs]).iter().all(|&v| v == 0.5));
    assert!(silent.slice(s![.., inputs..inputs + outputs]).iter().all(|&v| v == -0.25));
    assert!(silent.slice(s![.., inputs + outputs..]).iter().all(|&v| v == 0.0));

    let teammate = Array2::from_shape_fn((3, heard), |(r, c)| (r * heard + c) as f32);
    let joined = agent.critic_inputs(actor_inputs.view(), actions.view(), Some(teammate.view())).unwrap();
    assert_eq!(joined.slice(s![.., inputs + outputs..]), teammate);

    let wrong = Array2::zeros((3, heard + 1));
    assert!(matches!(
        agent.critic_inputs(actor_inputs.view(), actions.view(), Some(wrong.view())),
        Err(HermesError::DimensionMismatch { .. })
    ));
}
