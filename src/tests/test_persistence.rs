use std::fs;
use crate::agent::ResumeOutcome;
use crate::checkpoint::{find_hiscore, list_artifacts};
use crate::error::HermesError;
use super::{fill_memory, small_agent, window};

fn prefix_in(dir: &tempfile::TempDir, stem: &str) -> String {
    dir.path().join(stem).to_string_lossy().into_owned()
}

#[test]
fn test_snapshot_writes_every_role() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = prefix_in(&dir, "agent0");
    let mut agent = small_agent(1, 1);
    fill_memory(&mut agent, 6);
    agent.update().unwrap();

    let written = agent.snapshot(&prefix, false, true).unwrap();
    // actor, critic and semantic weights and solvers, plus the memory
    assert_eq!(written.len(), 7);
    assert!(dir.path().join("agent0_actor_iter_1.weights").exists());
    assert!(dir.path().join("agent0_critic_iter_1.solverstate").exists());
    assert!(dir.path().join("agent0_semantic_iter_1.weights").exists());
    assert!(dir.path().join("agent0_iter_1.replaymemory").exists());

    let leftovers = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .count();
    assert_eq!(leftovers, 0);
}

#[test]
fn test_snapshot_remove_old_keeps_latest() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = prefix_in(&dir, "agent");
    let mut agent = small_agent(0, 2);
    fill_memory(&mut agent, 8);

    for _ in 0..10 {
        agent.update().unwrap();
    }
    agent.snapshot(&prefix, true, false).unwrap();
    for _ in 0..10 {
        agent.update().unwrap();
    }
    agent.snapshot(&prefix, true, false).unwrap();

    let artifacts = list_artifacts(&prefix).unwrap();
    assert_eq!(artifacts.len(), 4);
    assert!(artifacts.iter().all(|(_, iter, _)| *iter == 20));
}

#[test]
fn test_restore_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = prefix_in(&dir, "agent");
    let mut trained = small_agent(2, 3);
    fill_memory(&mut trained, 10);
    for _ in 0..4 {
        trained.update().unwrap();
    }
    trained.snapshot(&prefix, false, true).unwrap();

    let mut fresh = small_agent(2, 30);
    let iter = fresh.restore(&prefix, true).unwrap();
    assert_eq!(iter, 4);
    assert_eq!(fresh.actor_iter(), 4);
    assert_eq!(fresh.critic_iter(), 4);
    assert_eq!(fresh.memory().len(), 10);

    let states = window(0.25);
    assert_eq!(fresh.greedy_action(&states, 0).unwrap(), trained.greedy_action(&states, 0).unwrap());
    assert_eq!(
        fresh.semantic_message(&states, 0).unwrap(),
        trained.semantic_message(&states, 0).unwrap()
    );
    // Targets follow the restored weights.
    let input = ndarray::Array1::from_vec(vec![0.25, 0.25, 0.25, 0.25, 1.0]);
    assert_eq!(fresh.actor_target().predict(input.view()), fresh.actor().predict(input.view()));
}

#[test]
fn test_restore_without_solver_keeps_fresh_counters() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = prefix_in(&dir, "agent");
    let mut trained = small_agent(0, 4);
    fill_memory(&mut trained, 6);
    trained.update().unwrap();
    trained.snapshot(&prefix, false, false).unwrap();

    let mut fresh = small_agent(0, 40);
    assert_eq!(fresh.restore(&prefix, false).unwrap(), 1);
    assert_eq!(fresh.critic_iter(), 0);
    assert!(fresh.memory().is_empty());

    // No replay memory was saved, so a full restore finds nothing.
    assert!(matches!(fresh.restore(&prefix, true), Err(HermesError::SnapshotNotFound(_))));
}

#[test]
fn test_restore_rejects_other_architecture() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = prefix_in(&dir, "agent");
    let mut trained = small_agent(0, 5);
    fill_memory(&mut trained, 6);
    trained.snapshot(&prefix, false, false).unwrap();

    let mut other = small_agent(2, 50);
    let states = window(0.1);
    let before = other.greedy_action(&states, 0).unwrap();
    assert!(other.restore(&prefix, false).is_err());
    assert_eq!(other.greedy_action(&states, 0).unwrap(), before);
    assert_eq!(other.resume(&prefix, false).unwrap(), ResumeOutcome::Fresh);
}

#[test]
fn test_resume_on_empty_directory_is_fresh() {
    let dir = tempfile::tempdir().unwrap();
    let mut agent = small_agent(0, 6);
    let outcome = agent.resume(&prefix_in(&dir, "nothing"), true).unwrap();
    assert_eq!(outcome, ResumeOutcome::Fresh);
    assert_eq!(agent.iteration(), 0);
}

#[test]
fn test_resume_after_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = prefix_in(&dir, "agent");
    let mut agent = small_agent(0, 7);
    fill_memory(&mut agent, 6);
    agent.update().unwrap();
    agent.update().unwrap();
    agent.snapshot(&prefix, false, true).unwrap();

    let mut resumed = small_agent(0, 70);
    assert_eq!(resumed.resume(&prefix, true).unwrap(), ResumeOutcome::Resumed(2));
}

#[test]
fn test_hiscore_snapshots_keep_best() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = prefix_in(&dir, "agent");
    let agent = small_agent(0, 8);

    agent.snapshot_hiscore(&prefix, 3).unwrap();
    agent.snapshot_hiscore(&prefix, 7).unwrap();
    assert_eq!(find_hiscore(&prefix).unwrap(), Some(7));
    assert!(dir.path().join("agent_HiScore7_actor_iter_0.weights").exists());
    assert!(!dir.path().join("agent_HiScore3_actor_iter_0.weights").exists());
}

#[test]
fn test_load_weights_into_online_and_target() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("actor.weights");
    let source = small_agent(0, 9);
    source.actor().save(&path).unwrap();

    let mut agent = small_agent(0, 90);
    agent.load_actor_weights(&path).unwrap();
    let states = window(0.6);
    assert_eq!(agent.greedy_action(&states, 0).unwrap(), source.greedy_action(&states, 0).unwrap());
    let input = ndarray::Array1::from_vec(vec![0.6, 0.6, 0.6, 0.6, 1.0]);
    assert_eq!(agent.actor_target().predict(input.view()), agent.actor().predict(input.view()));

    assert!(agent.load_semantic_weights(&path).is_err());
}
