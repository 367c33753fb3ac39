use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Serialize, Deserialize};

/// One state snapshot as produced by the environment.
pub type StateData = Array1<f32>;

/// Fixed-length window of consecutive state snapshots, oldest first.
pub type InputStates = Vec<StateData>;

/// Raw actor network output: `[discrete scores | parameters | message]`.
pub type ActorOutput = Array1<f32>;

/// One recorded step of experience.
///
/// `next_state` is `None` exactly when the episode terminated at this step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub states: InputStates,
    pub task_id: usize,
    pub action: ActorOutput,
    pub reward: f32,
    pub on_policy_target: f32,
    pub next_state: Option<StateData>,
}

impl Transition {
    pub fn new(
        states: InputStates,
        task_id: usize,
        action: ActorOutput,
        reward: f32,
        next_state: Option<StateData>,
    ) -> Self {
        Transition {
            states,
            task_id,
            action,
            reward,
            on_policy_target: 0.0,
            next_state,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.next_state.is_none()
    }

    /// The window seen at the next step: this window shifted by one with
    /// `next_state` appended. `None` for terminal transitions.
    pub fn next_states(&self) -> Option<InputStates> {
        self.next_state.as_ref().map(|next| {
            let mut window: InputStates = self.states.iter().skip(1).cloned().collect();
            window.push(next.clone());
            window
        })
    }
}

/// Concatenate a window of states into one flat feature vector.
pub fn flatten_states(states: &[StateData]) -> Array1<f32> {
    let views = states.iter().map(|s| s.view()).collect::<Vec<ArrayView1<f32>>>();
    if views.is_empty() {
        return Array1::zeros(0);
    }
    ndarray::concatenate(Axis(0), &views).unwrap_or_else(|_| Array1::zeros(0))
}

/// Stack flattened state windows into a `[batch, features]` matrix.
pub fn stack_states(batch: &[&[StateData]], width: usize) -> Array2<f32> {
    let mut result = Array2::zeros((batch.len(), width));
    for (mut row, states) in result.outer_iter_mut().zip(batch.iter()) {
        let mut offset = 0;
        for state in states.iter() {
            let end = (offset + state.len()).min(width);
            row.slice_mut(ndarray::s![offset..end])
                .assign(&state.slice(ndarray::s![..end - offset]));
            offset = end;
        }
    }
    result
}
