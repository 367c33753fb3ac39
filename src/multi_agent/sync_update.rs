use ndarray::{s, Array2, Axis};

use crate::agent::{Agent, Batch, PolicyAscent};
use crate::error::{HermesError, Result};
use crate::transition::Transition;
use super::exchange::{CommFeatures, ExchangePort, Payload, Phase, RoundGuard};
use super::SyncStrategy;

/// Teammates' features laid side by side in ascending teammate order, the
/// layout of the critic's teammate input block.
#[derive(Clone, Debug, PartialEq)]
pub struct TeammateFeatures {
    pub stored: Array2<f32>,
    pub online: Array2<f32>,
    pub target: Array2<f32>,
}

impl TeammateFeatures {
    /// Features of teammates that have said nothing.
    pub fn silence(rows: usize, width: usize) -> Self {
        TeammateFeatures {
            stored: Array2::zeros((rows, width)),
            online: Array2::zeros((rows, width)),
            target: Array2::zeros((rows, width)),
        }
    }

    pub fn rows(&self) -> usize {
        self.stored.nrows()
    }

    fn assemble(rows: usize, message_size: usize, features: &[(usize, CommFeatures)]) -> Result<Self> {
        for (from, f) in features {
            for part in [&f.stored, &f.online, &f.target] {
                if part.dim() != (rows, message_size) {
                    return Err(HermesError::ProtocolViolation(format!(
                        "agent {} sent features of shape {:?}, expected {:?}",
                        from,
                        part.dim(),
                        (rows, message_size)
                    )));
                }
            }
        }
        if features.is_empty() {
            return Ok(TeammateFeatures::silence(rows, 0));
        }
        Ok(TeammateFeatures {
            stored: side_by_side(features.iter().map(|(_, f)| &f.stored))?,
            online: side_by_side(features.iter().map(|(_, f)| &f.online))?,
            target: side_by_side(features.iter().map(|(_, f)| &f.target))?,
        })
    }
}

fn side_by_side<'a>(blocks: impl Iterator<Item = &'a Array2<f32>>) -> Result<Array2<f32>> {
    let views = blocks.map(|b| b.view()).collect::<Vec<_>>();
    Ok(ndarray::concatenate(Axis(1), &views)?)
}

fn expect_features(received: Vec<(usize, Payload)>) -> Result<Vec<(usize, CommFeatures)>> {
    received
        .into_iter()
        .map(|(from, payload)| match payload {
            Payload::Features(features) => Ok((from, features)),
            other => Err(HermesError::ProtocolViolation(format!(
                "agent {} sent {:?} where features were expected",
                from, other
            ))),
        })
        .collect()
}

fn expect_gradients(received: Vec<(usize, Payload)>, shape: (usize, usize)) -> Result<Vec<(usize, Array2<f32>)>> {
    received
        .into_iter()
        .map(|(from, payload)| match payload {
            Payload::Gradients(grads) if grads.dim() == shape => Ok((from, grads)),
            other => Err(HermesError::ProtocolViolation(format!(
                "agent {} sent {:?} where message gradients of shape {:?} were expected",
                from, other, shape
            ))),
        })
        .collect()
}

impl Agent {
    fn check_cohort(&self, num_agents: usize) -> Result<()> {
        if num_agents != self.config().num_teammates + 1 {
            return Err(HermesError::ProtocolViolation(format!(
                "agent {} is configured for {} teammates but the exchange connects {} agents",
                self.id(),
                self.config().num_teammates,
                num_agents
            )));
        }
        Ok(())
    }

    /// Message columns of the stored actions, the online actor at `s` and the
    /// target actor at `s'` (zero where the episode ended).
    fn comm_features(&self, batch: &Batch) -> CommFeatures {
        let range = self.action_space().message_range();
        let mut target = self
            .actor_target
            .predict_batch(batch.next_actor_inputs.view())
            .slice(s![.., range.clone()])
            .to_owned();
        for (mut row, &alive) in target.outer_iter_mut().zip(batch.non_terminal.iter()) {
            row *= alive;
        }
        CommFeatures {
            stored: batch.actions.slice(s![.., range.clone()]).to_owned(),
            online: self
                .actor
                .predict_batch(batch.actor_inputs.view())
                .slice(s![.., range])
                .to_owned(),
            target,
        }
    }

    fn collect_teammate_features(&self, round: &mut RoundGuard<'_>, rows: usize) -> Result<TeammateFeatures> {
        let received = expect_features(round.collect(Phase::Features)?)?;
        TeammateFeatures::assemble(rows, self.action_space().message_size(), &received)
    }

    /// Send each teammate the block of `teammate_ascent` that belongs to its message.
    fn send_message_gradients(&self, round: &mut RoundGuard<'_>, teammate_ascent: &Array2<f32>) -> Result<()> {
        let message_size = self.action_space().message_size();
        for (k, teammate) in round.teammates().into_iter().enumerate() {
            let block = teammate_ascent
                .slice(s![.., k * message_size..(k + 1) * message_size])
                .to_owned();
            round.publish(teammate, Phase::Gradients, Payload::Gradients(block))?;
        }
        Ok(())
    }

    /// Sum of the message gradients teammates sent, laid out over the full
    /// actor output.
    fn received_message_ascent(&self, round: &mut RoundGuard<'_>, rows: usize) -> Result<Array2<f32>> {
        let space = self.action_space();
        let received = expect_gradients(round.collect(Phase::Gradients)?, (rows, space.message_size()))?;
        let mut ascent = Array2::zeros((rows, space.output_size()));
        for (_, grads) in received {
            let mut message = ascent.slice_mut(s![.., space.message_range()]);
            message += &grads;
        }
        Ok(ascent)
    }

    /// One actor-critic step taken together with every teammate on the
    /// exchange. All agents must call this with minibatches of the same size;
    /// the `indices` are usually drawn once and shared.
    pub fn synchronized_update(
        &mut self,
        port: &mut ExchangePort,
        indices: &[usize],
        strategy: SyncStrategy,
    ) -> Result<(f32, f32)> {
        let mut round = port.begin_round();
        self.check_cohort(round.num_agents())?;

        let transitions = self.memory.gather(indices);
        let batch = self.assemble_batch(&transitions)?;
        let rows = batch.len();
        let scale = 1.0 / rows as f32;

        round.broadcast(Phase::Features, Payload::Features(self.comm_features(&batch)))?;

        let cached = match strategy {
            SyncStrategy::Approximate => self.teammate_cache.take().filter(|c| c.rows() == rows),
            SyncStrategy::Exact => None,
        };
        let (teammates, collected) = match cached {
            Some(previous) => (previous, false),
            None => (self.collect_teammate_features(&mut round, rows)?, true),
        };

        let targets = self.critic_targets(&batch, Some(teammates.target.view()))?;
        let critic_loss = self.critic_regression(
            batch.actor_inputs.view(),
            batch.actions.view(),
            Some(teammates.stored.view()),
            targets.view(),
            scale,
        )?;
        self.critic_solver.step(&mut self.critic);

        let PolicyAscent { q_mean, actions, ascent, teammate_ascent } =
            self.policy_ascent(batch.actor_inputs.view(), Some(teammates.online.view()), scale)?;
        self.send_message_gradients(&mut round, &teammate_ascent)?;

        if strategy == SyncStrategy::Approximate {
            let current = if collected { teammates } else { self.collect_teammate_features(&mut round, rows)? };
            self.teammate_cache = Some(current);
        }

        let ascent = ascent + &self.received_message_ascent(&mut round, rows)?;
        self.apply_actor_ascent(actions.view(), ascent)?;
        self.actor_solver.step(&mut self.actor);
        self.soft_update_targets()?;
        round.finish();

        let actor_loss = -q_mean;
        self.record_losses(critic_loss, actor_loss);
        Ok((critic_loss, actor_loss))
    }

    /// Replay one chronological episode with differentiable communication.
    ///
    /// Teammates replay their own, time-aligned, episodes of the same length.
    /// At every step the agents exchange features and message gradients; a
    /// message sent at step `t` is heard at `t + 1`, and the critic gradient
    /// with respect to it at `t + 1` is propagated back through the sender's
    /// actor at `t`. Gradients accumulate over the episode; each online network
    /// then takes a single solver step.
    pub fn dial_update(&mut self, port: &mut ExchangePort, episode: &[Transition]) -> Result<(f32, f32)> {
        let batch = {
            let mut round = port.begin_round();
            self.check_cohort(round.num_agents())?;
            let batch = self.assemble_batch(episode)?;
            round.broadcast(Phase::Features, Payload::Length(batch.len()))?;
            for (from, payload) in round.collect(Phase::Features)? {
                match payload {
                    Payload::Length(steps) if steps == batch.len() => {}
                    other => {
                        return Err(HermesError::ProtocolViolation(format!(
                            "agent {} replays {:?} while agent {} replays {} steps",
                            from,
                            other,
                            self.id(),
                            batch.len()
                        )))
                    }
                }
            }
            round.finish();
            batch
        };

        let steps = batch.len();
        let scale = 1.0 / steps as f32;
        let message_range = self.action_space().message_range();
        self.critic.zero_grad();
        self.actor.zero_grad();

        let mut heard = TeammateFeatures::silence(1, self.config().teammate_features_size());
        let mut critic_loss = 0.0;
        let mut q_total = 0.0;

        for t in 0..steps {
            let mut round = port.begin_round();
            let step = batch.select(t);

            let mut said = self.comm_features(&step);
            // Heard one step later, so the bootstrap at t + 1 sees the target
            // actor's message for s_t rather than s_{t+1}.
            said.target = self
                .actor_target
                .predict_batch(step.actor_inputs.view())
                .slice(s![.., message_range.clone()])
                .to_owned();
            round.broadcast(Phase::Features, Payload::Features(said))?;
            let now = self.collect_teammate_features(&mut round, 1)?;

            let targets = self.critic_targets(&step, Some(now.target.view()))?;
            critic_loss += self.critic_regression(
                step.actor_inputs.view(),
                step.actions.view(),
                Some(heard.stored.view()),
                targets.view(),
                scale,
            )?;

            let PolicyAscent { q_mean, actions, ascent, teammate_ascent } =
                self.policy_ascent(step.actor_inputs.view(), Some(heard.online.view()), scale)?;
            q_total += q_mean;
            self.apply_actor_ascent(actions.view(), ascent)?;

            self.send_message_gradients(&mut round, &teammate_ascent)?;
            let relayed = self.received_message_ascent(&mut round, 1)?;
            if t > 0 {
                // Gradient on what this agent said at t - 1.
                let previous = batch.actor_inputs.slice(s![t - 1..t, ..]);
                let outputs = self.actor.forward_batch(previous);
                self.apply_actor_ascent(outputs.view(), relayed)?;
            }

            heard = now;
            round.finish();
        }

        self.critic_solver.step(&mut self.critic);
        self.actor_solver.step(&mut self.actor);
        self.soft_update_targets()?;

        let critic_loss = critic_loss / steps as f32;
        let actor_loss = -q_total / steps as f32;
        self.record_losses(critic_loss, actor_loss);
        log::debug!("[Agent {}] replayed {} step episode with communication", self.id(), steps);
        Ok((critic_loss, actor_loss))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use ndarray::{Array1, Array2};

    use crate::action::ActionSpace;
    use crate::agent::AgentBuilder;
    use crate::config::SolverConfig;
    use crate::network::NeuralNetwork;
    use super::super::exchange::CommExchange;
    use super::*;

    const INDICES: [usize; 4] = [0, 1, 2, 5];
    const ROWS: usize = INDICES.len();

    /// One teammate, six remembered steps ending in a terminal one.
    fn agent() -> Agent {
        let agent = AgentBuilder::new()
            .state_size(3)
            .action_space(ActionSpace::hfo(2))
            .num_teammates(1)
            .hidden_sizes(&[8], &[8])
            .semantic_hidden(&[8])
            .actor_solver(SolverConfig::sgd(0.01))
            .memory_capacity(16)
            .log_interval(0)
            .seed(21)
            .build()
            .unwrap();
        for i in 0..6 {
            let state = Array1::from_elem(3, i as f32 * 0.1);
            let action = Array1::from_shape_fn(12, |j| ((i + j) % 5) as f32 * 0.2 - 0.4);
            let next = if i == 5 { None } else { Some(Array1::from_elem(3, (i + 1) as f32 * 0.1)) };
            agent
                .memory()
                .add_transition(Transition::new(vec![state], 0, action, i as f32 * 0.5 - 1.0, next));
        }
        agent
    }

    fn features(rows: usize, value: f32) -> CommFeatures {
        CommFeatures {
            stored: Array2::from_elem((rows, 2), value),
            online: Array2::from_elem((rows, 2), -value),
            target: Array2::from_elem((rows, 2), 0.5 * value),
        }
    }

    /// The teammate's side of one round, published ahead of the agent.
    fn teammate_round(port: &mut ExchangePort, said: CommFeatures, grads: Array2<f32>) {
        let mut round = port.begin_round();
        round.broadcast(Phase::Features, Payload::Features(said)).unwrap();
        round.broadcast(Phase::Gradients, Payload::Gradients(grads)).unwrap();
        round.finish();
    }

    fn params(network: &NeuralNetwork) -> Vec<f32> {
        network
            .layers
            .iter()
            .flat_map(|layer| {
                let p = layer.params_snapshot();
                p.weights.iter().chain(p.biases.iter()).copied().collect::<Vec<_>>()
            })
            .collect()
    }

    /// Two synchronized updates while the teammate says `said[0]`, then `said[1]`.
    fn synchronized(strategy: SyncStrategy, said: [f32; 2]) -> Agent {
        let mut ports = CommExchange::new(2).with_timeout(Duration::from_secs(5)).into_ports();
        let mut teammate = ports.pop().unwrap();
        let mut port = ports.pop().unwrap();
        for value in said {
            teammate_round(&mut teammate, features(ROWS, value), Array2::from_elem((ROWS, 2), 0.1));
        }
        let mut agent = agent();
        for _ in 0..2 {
            agent.synchronized_update(&mut port, &INDICES, strategy).unwrap();
        }
        agent
    }

    /// Replay the remembered episode while the teammate relays `relayed[t]` at step `t`.
    fn replay(relayed: &[Array2<f32>]) -> Agent {
        let mut ports = CommExchange::new(2).with_timeout(Duration::from_secs(5)).into_ports();
        let mut teammate = ports.pop().unwrap();
        let mut port = ports.pop().unwrap();
        let mut agent = agent();
        let episode = agent.memory().snapshot();

        let mut handshake = teammate.begin_round();
        handshake.broadcast(Phase::Features, Payload::Length(episode.len())).unwrap();
        handshake.finish();
        for grads in relayed {
            teammate_round(&mut teammate, features(1, 0.3), grads.clone());
        }
        agent.dial_update(&mut port, &episode).unwrap();
        agent
    }

    fn relayed_at(step: Option<usize>) -> Vec<Array2<f32>> {
        (0..6)
            .map(|t| Array2::from_elem((1, 2), if Some(t) == step { 1.0 } else { 0.0 }))
            .collect()
    }

    #[test]
    fn test_approximate_update_uses_previous_round_features() {
        let approximate = synchronized(SyncStrategy::Approximate, [0.5, -0.8]);
        let exact_stale = synchronized(SyncStrategy::Exact, [0.5, 0.5]);
        let exact_fresh = synchronized(SyncStrategy::Exact, [0.5, -0.8]);

        assert_eq!(params(&approximate.critic), params(&exact_stale.critic));
        assert_eq!(params(&approximate.actor), params(&exact_stale.actor));
        assert_ne!(params(&approximate.critic), params(&exact_fresh.critic));

        // The second round's features wait for the next update.
        let cached = approximate.teammate_cache.as_ref().unwrap();
        let latest = features(ROWS, -0.8);
        assert_eq!(cached.stored, latest.stored);
        assert_eq!(cached.online, latest.online);
        assert_eq!(cached.target, latest.target);
    }

    #[test]
    fn test_dial_relays_gradients_to_the_previous_step() {
        let silent = replay(&relayed_at(None));
        let first = replay(&relayed_at(Some(0)));
        let later = replay(&relayed_at(Some(3)));

        // Nothing was said before step 0.
        assert_eq!(params(&first.actor), params(&silent.actor));
        assert_eq!(params(&first.critic), params(&silent.critic));

        // A gradient on a message only moves the actor's message outputs.
        let message = silent.action_space().message_range();
        let last = |agent: &Agent| agent.actor.layers[agent.actor.layers.len() - 1].params_snapshot();
        let (quiet, heard) = (last(&silent), last(&later));
        for col in 0..quiet.biases.len() {
            let same = quiet.weights.column(col) == heard.weights.column(col) && quiet.biases[col] == heard.biases[col];
            assert_eq!(same, !message.contains(&col), "actor output {}", col);
        }
        assert_eq!(params(&later.critic), params(&silent.critic));
    }
}
