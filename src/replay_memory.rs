use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::RwLock;
use rand::Rng;

use crate::error::{HermesError, Result};
use crate::transition::{InputStates, Transition};

/// Bounded FIFO buffer of transitions.
///
/// A `ReplayMemory` is a handle: cloning it yields another handle to the same
/// buffer, so every holder observes one logical memory. Appends, evictions and
/// reads each take the lock once, so a reader sees the buffer either before or
/// after a concurrent append/evict, never a torn record.
#[derive(Clone)]
pub struct ReplayMemory {
    buffer: Arc<RwLock<VecDeque<Transition>>>,
    capacity: usize,
}

impl ReplayMemory {
    pub fn new(capacity: usize) -> Self {
        ReplayMemory {
            buffer: Arc::new(RwLock::new(VecDeque::with_capacity(capacity.min(1 << 16)))),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.buffer.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.read().is_empty()
    }

    /// True when both handles refer to the same buffer.
    pub fn shares_storage_with(&self, other: &ReplayMemory) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
    }

    pub fn add_transition(&self, transition: Transition) {
        let mut buffer = self.buffer.write();
        buffer.push_back(transition);
        while buffer.len() > self.capacity {
            buffer.pop_front();
        }
    }

    pub fn add_transitions<I: IntoIterator<Item = Transition>>(&self, transitions: I) {
        let mut buffer = self.buffer.write();
        buffer.extend(transitions);
        while buffer.len() > self.capacity {
            buffer.pop_front();
        }
    }

    pub fn clear(&self) {
        self.buffer.write().clear();
    }

    pub fn get(&self, index: usize) -> Option<Transition> {
        self.buffer.read().get(index).cloned()
    }

    /// Copy out the transitions at `indices`, in order. Indices that fell off
    /// the end (after a concurrent clear) are skipped.
    pub fn gather(&self, indices: &[usize]) -> Vec<Transition> {
        let buffer = self.buffer.read();
        indices.iter().filter_map(|&i| buffer.get(i).cloned()).collect()
    }

    /// Draw `n` indices uniformly with replacement from `[0, len)`.
    ///
    /// Callers must not sample an empty memory; doing so yields no indices.
    pub fn sample_transition_indices<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<usize> {
        let len = self.len();
        if len == 0 {
            return Vec::new();
        }
        (0..n).map(|_| rng.gen_range(0..len)).collect()
    }

    /// State windows of `n` randomly drawn transitions.
    pub fn sample_states<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<InputStates> {
        let buffer = self.buffer.read();
        if buffer.is_empty() {
            return Vec::new();
        }
        (0..n)
            .map(|_| buffer[rng.gen_range(0..buffer.len())].states.clone())
            .collect()
    }

    /// Copy of the whole buffer, oldest first.
    pub fn snapshot(&self) -> Vec<Transition> {
        self.buffer.read().iter().cloned().collect()
    }

    /// Replace the contents, keeping at most `capacity` of the newest entries.
    pub fn replace_contents(&self, transitions: Vec<Transition>) {
        let mut buffer = self.buffer.write();
        buffer.clear();
        let skip = transitions.len().saturating_sub(self.capacity);
        buffer.extend(transitions.into_iter().skip(skip));
    }
}

/// Fill in the tabular on-policy target of a chronological episode:
/// `target_T = r_T` for the final (terminal) step and
/// `target_t = r_t + gamma · target_{t+1}` before it.
pub fn label_transitions(episode: &mut [Transition], gamma: f32) -> Result<()> {
    let last = episode
        .last_mut()
        .ok_or_else(|| HermesError::EmptyBuffer("cannot label an empty episode".to_string()))?;
    if !last.is_terminal() {
        return Err(HermesError::invalid_parameter(
            "episode",
            "the last transition of a labelled episode must be terminal",
        ));
    }
    last.on_policy_target = last.reward;

    let mut next_target = last.on_policy_target;
    for transition in episode.iter_mut().rev().skip(1) {
        transition.on_policy_target = transition.reward + gamma * next_target;
        next_target = transition.on_policy_target;
    }
    Ok(())
}
