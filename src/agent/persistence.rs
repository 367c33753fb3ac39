use std::path::{Path, PathBuf};

use crate::checkpoint::{
    artifact_path, ensure_prefix_dir, find_latest_snapshot, hiscore_prefix, read_replay_memory,
    remove_hiscores_below, remove_snapshots, write_replay_memory, Artifact, Role, SnapshotSet, StagedWrite,
};
use crate::error::{HermesError, Result};
use crate::network::NeuralNetwork;
use crate::optimizer::Solver;
use crate::transition::Transition;
use super::Agent;

/// What [`Agent::resume`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// Networks, and possibly solvers and memory, were restored at this iteration.
    Resumed(usize),
    /// Nothing usable was found; the agent keeps its fresh state.
    Fresh,
}

/// Everything read from a snapshot, before any of it is applied.
struct LoadedSnapshot {
    actor: NeuralNetwork,
    critic: NeuralNetwork,
    semantic: Option<NeuralNetwork>,
    solvers: Option<LoadedSolvers>,
}

struct LoadedSolvers {
    actor: Solver,
    critic: Solver,
    semantic: Option<Solver>,
    memory: Vec<Transition>,
}

impl Agent {
    fn roles(&self) -> Vec<(Role, &NeuralNetwork, &Solver)> {
        let mut roles = vec![
            (Role::Actor, &self.actor, &self.actor_solver),
            (Role::Critic, &self.critic, &self.critic_solver),
        ];
        if let Some(semantic) = &self.semantic {
            roles.push((Role::Semantic, &semantic.net, &semantic.solver));
        }
        roles
    }

    /// Write weights and solver states of every role (and the replay memory
    /// when `snapshot_memory`) for the current iteration.
    ///
    /// Files appear only once all of them were written; on failure nothing
    /// new is left behind. With `remove_old`, files of this prefix from
    /// earlier iterations are deleted afterwards.
    pub fn snapshot(&self, prefix: &str, remove_old: bool, snapshot_memory: bool) -> Result<Vec<PathBuf>> {
        let iter = self.iteration();
        ensure_prefix_dir(prefix)?;

        let mut staged = StagedWrite::new();
        for (role, net, solver) in self.roles() {
            staged.stage(artifact_path(prefix, Artifact::Weights(role), iter), |p| net.save(p))?;
            staged.stage(artifact_path(prefix, Artifact::SolverState(role), iter), |p| solver.save(p))?;
        }
        if snapshot_memory {
            let transitions = self.memory.snapshot();
            staged.stage(artifact_path(prefix, Artifact::ReplayMemory, iter), |p| {
                write_replay_memory(p, &transitions)
            })?;
        }
        let written = staged.commit()?;
        log::info!("[Agent {}] snapshot {} at iteration {} ({} files)", self.id(), prefix, iter, written.len());

        if remove_old {
            remove_snapshots(prefix, iter)?;
        }
        Ok(written)
    }

    /// Save weights under `{prefix}_HiScore{score}` and drop lower-scoring
    /// high-score snapshots of the same prefix.
    pub fn snapshot_hiscore(&self, prefix: &str, score: i64) -> Result<Vec<PathBuf>> {
        let iter = self.iteration();
        let best = hiscore_prefix(prefix, score);
        ensure_prefix_dir(&best)?;

        let mut staged = StagedWrite::new();
        for (role, net, _) in self.roles() {
            staged.stage(artifact_path(&best, Artifact::Weights(role), iter), |p| net.save(p))?;
        }
        let written = staged.commit()?;
        remove_hiscores_below(prefix, score)?;
        log::info!("[Agent {}] new high score {} saved as {}", self.id(), score, best);
        Ok(written)
    }

    /// Load actor weights into the online actor and its target.
    pub fn load_actor_weights<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let loaded = NeuralNetwork::load(path)?;
        self.actor.copy_from(&loaded)?;
        self.actor_target.copy_from(&loaded)
    }

    /// Load critic weights into the online critic and its target.
    pub fn load_critic_weights<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let loaded = NeuralNetwork::load(path)?;
        self.critic.copy_from(&loaded)?;
        self.critic_target.copy_from(&loaded)
    }

    pub fn load_semantic_weights<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let loaded = NeuralNetwork::load(path)?;
        self.semantic_mut()?.net.copy_from(&loaded)
    }

    pub fn restore_actor_solver<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.actor_solver = Solver::load(path)?;
        Ok(())
    }

    pub fn restore_critic_solver<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.critic_solver = Solver::load(path)?;
        Ok(())
    }

    pub fn restore_semantic_solver<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let solver = Solver::load(path)?;
        self.semantic_mut()?.solver = solver;
        Ok(())
    }

    /// Replace the replay memory's contents with a saved one. Returns the
    /// number of transitions kept.
    pub fn load_replay_memory<P: AsRef<Path>>(&mut self, path: P) -> Result<usize> {
        let transitions = read_replay_memory(path)?;
        self.memory.replace_contents(transitions);
        Ok(self.memory.len())
    }

    fn semantic_mut(&mut self) -> Result<&mut super::SemanticNet> {
        self.semantic
            .as_mut()
            .ok_or_else(|| HermesError::invalid_parameter("semantic", "the action space has no message channel"))
    }

    fn read_snapshot(&self, set: &SnapshotSet, load_solver: bool) -> Result<LoadedSnapshot> {
        let actor = NeuralNetwork::load(&set.actor_weights)?;
        self.actor.check_same_structure(&actor)?;
        let critic = NeuralNetwork::load(&set.critic_weights)?;
        self.critic.check_same_structure(&critic)?;
        let semantic = match (&self.semantic, &set.semantic_weights) {
            (Some(current), Some(path)) => {
                let net = NeuralNetwork::load(path)?;
                current.net.check_same_structure(&net)?;
                Some(net)
            }
            _ => None,
        };

        let solvers = if load_solver {
            let memory = match &set.replay_memory {
                Some(path) => read_replay_memory(path)?,
                None => return Err(HermesError::SnapshotNotFound(format!("{} (replay memory)", set.iter))),
            };
            Some(LoadedSolvers {
                actor: Solver::load(&set.actor_solver)?,
                critic: Solver::load(&set.critic_solver)?,
                semantic: match (&self.semantic, &set.semantic_solver) {
                    (Some(_), Some(path)) => Some(Solver::load(path)?),
                    _ => None,
                },
                memory,
            })
        } else {
            None
        };
        Ok(LoadedSnapshot { actor, critic, semantic, solvers })
    }

    fn apply_snapshot(&mut self, loaded: LoadedSnapshot) -> Result<()> {
        self.actor.copy_from(&loaded.actor)?;
        self.critic.copy_from(&loaded.critic)?;
        if let (Some(semantic), Some(net)) = (self.semantic.as_mut(), loaded.semantic.as_ref()) {
            semantic.net.copy_from(net)?;
        }
        if let Some(solvers) = loaded.solvers {
            self.actor_solver = solvers.actor;
            self.critic_solver = solvers.critic;
            if let (Some(semantic), Some(solver)) = (self.semantic.as_mut(), solvers.semantic) {
                semantic.solver = solver;
            }
            self.memory.replace_contents(solvers.memory);
        }
        self.sync_targets()
    }

    /// Restore the latest complete snapshot of `prefix`, with solver states
    /// and replay memory when `load_solver`. Fails with `SnapshotNotFound`
    /// when there is none; the agent is left untouched on any failure.
    pub fn restore(&mut self, prefix: &str, load_solver: bool) -> Result<usize> {
        let set = find_latest_snapshot(prefix, load_solver)?
            .ok_or_else(|| HermesError::SnapshotNotFound(prefix.to_string()))?;
        let loaded = self.read_snapshot(&set, load_solver)?;
        self.apply_snapshot(loaded)?;
        log::info!("[Agent {}] restored {} at iteration {}", self.id(), prefix, set.iter);
        Ok(set.iter)
    }

    /// Like [`Agent::restore`], but a missing or unreadable snapshot means a
    /// fresh start rather than an error.
    pub fn resume(&mut self, prefix: &str, load_solver: bool) -> Result<ResumeOutcome> {
        match self.restore(prefix, load_solver) {
            Ok(iter) => Ok(ResumeOutcome::Resumed(iter)),
            Err(HermesError::SnapshotNotFound(_)) => {
                log::warn!("[Agent {}] no complete snapshot for {}; starting fresh", self.id(), prefix);
                Ok(ResumeOutcome::Fresh)
            }
            Err(err @ (HermesError::IoError(_) | HermesError::SerializationError(_) | HermesError::DimensionMismatch { .. })) => {
                log::warn!("[Agent {}] could not restore {} ({}); starting fresh", self.id(), prefix, err);
                Ok(ResumeOutcome::Fresh)
            }
            Err(err) => Err(err),
        }
    }
}
