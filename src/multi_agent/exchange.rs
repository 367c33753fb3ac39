//! In-process rendezvous between the agents of one team.
//!
//! Every agent holds one [`ExchangePort`]. A round has two phases; in each, an
//! agent publishes its output to every teammate's inbox and then collects the
//! `N − 1` envelopes its teammates published for the same round and phase.
//! Envelopes that arrive early (a faster teammate already in the next phase)
//! are stashed until asked for.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use ndarray::Array2;

use crate::error::{HermesError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Features,
    Gradients,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Features => write!(f, "features"),
            Phase::Gradients => write!(f, "gradients"),
        }
    }
}

/// What one agent tells its teammates about its messages in a round, one row
/// per sample.
#[derive(Clone, Debug, PartialEq)]
pub struct CommFeatures {
    /// Messages recorded in the sampled transitions.
    pub stored: Array2<f32>,
    /// Messages of the current online actor.
    pub online: Array2<f32>,
    /// Messages of the target actor that teammates' bootstrap evaluation hears.
    pub target: Array2<f32>,
}

#[derive(Clone, Debug)]
pub(crate) enum Payload {
    Features(CommFeatures),
    Gradients(Array2<f32>),
    /// Number of steps an agent is about to replay.
    Length(usize),
}

#[derive(Debug)]
enum Envelope {
    Data {
        from: usize,
        round: u64,
        phase: Phase,
        payload: Payload,
    },
    Abort {
        from: usize,
        round: u64,
    },
    Leave {
        from: usize,
    },
}

/// Connects a fixed team of agents.
pub struct CommExchange {
    ports: Vec<ExchangePort>,
}

impl CommExchange {
    /// Wire up `num_agents` ports, one per agent, ids `0..num_agents`.
    pub fn new(num_agents: usize) -> Self {
        let (senders, receivers): (Vec<Sender<Envelope>>, Vec<Receiver<Envelope>>) =
            (0..num_agents).map(|_| unbounded()).unzip();

        let ports = receivers
            .into_iter()
            .enumerate()
            .map(|(id, inbox)| ExchangePort {
                id,
                num_agents,
                outboxes: senders
                    .iter()
                    .enumerate()
                    .filter(|(other, _)| *other != id)
                    .map(|(other, sender)| (other, sender.clone()))
                    .collect(),
                inbox,
                stash: Vec::new(),
                round: 0,
                timeout: None,
                failure: None,
            })
            .collect();

        CommExchange { ports }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        for port in &mut self.ports {
            port.timeout = Some(timeout);
        }
        self
    }

    pub fn into_ports(self) -> Vec<ExchangePort> {
        self.ports
    }
}

/// One agent's end of a [`CommExchange`]. Dropping it tells the teammates
/// this agent has left.
pub struct ExchangePort {
    id: usize,
    num_agents: usize,
    /// Teammates' inboxes, ascending by id.
    outboxes: Vec<(usize, Sender<Envelope>)>,
    inbox: Receiver<Envelope>,
    stash: Vec<Envelope>,
    round: u64,
    timeout: Option<Duration>,
    /// Once set, every later wait fails with this error.
    failure: Option<HermesError>,
}

impl ExchangePort {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn num_agents(&self) -> usize {
        self.num_agents
    }

    /// Teammate ids in ascending order.
    pub fn teammates(&self) -> Vec<usize> {
        self.outboxes.iter().map(|(id, _)| *id).collect()
    }

    /// Number of rounds begun so far.
    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    pub(crate) fn begin_round(&mut self) -> RoundGuard<'_> {
        self.round += 1;
        let round = self.round;
        log::debug!("[Agent {}] begin exchange round {}", self.id, round);
        RoundGuard { port: self, round, finished: false }
    }

    fn send(&self, to: usize, envelope: Envelope) -> Result<()> {
        let sender = self
            .outboxes
            .iter()
            .find(|(id, _)| *id == to)
            .map(|(_, sender)| sender)
            .ok_or_else(|| HermesError::ProtocolViolation(format!("agent {} is not a teammate of agent {}", to, self.id)))?;
        sender
            .send(envelope)
            .map_err(|_| HermesError::Disconnected(format!("agent {} left the exchange", to)))
    }

    fn next_envelope(&self, round: u64, phase: Phase) -> Result<Envelope> {
        match self.timeout {
            Some(timeout) => self.inbox.recv_timeout(timeout).map_err(|err| match err {
                RecvTimeoutError::Timeout => HermesError::Timeout { round, phase: phase.to_string() },
                RecvTimeoutError::Disconnected => HermesError::Disconnected("every teammate has left".to_string()),
            }),
            None => self
                .inbox
                .recv()
                .map_err(|_| HermesError::Disconnected("every teammate has left".to_string())),
        }
    }

    /// Collect one payload per teammate for `(round, phase)`, ascending by sender.
    fn receive(&mut self, round: u64, phase: Phase) -> Result<Vec<(usize, Payload)>> {
        let expected = self.outboxes.len();
        let mut pending = BTreeMap::new();

        let stash = std::mem::take(&mut self.stash);
        for envelope in stash {
            match envelope {
                Envelope::Data { from, round: r, phase: p, payload } if r == round && p == phase => {
                    pending.insert(from, payload);
                }
                Envelope::Data { round: r, .. } if r < round => {}
                other => self.stash.push(other),
            }
        }

        while pending.len() < expected {
            if let Some(failure) = &self.failure {
                return Err(failure.clone());
            }
            match self.next_envelope(round, phase)? {
                Envelope::Data { from, round: r, phase: p, payload } if r == round && p == phase => {
                    if pending.insert(from, payload).is_some() {
                        return Err(HermesError::ProtocolViolation(format!(
                            "agent {} published {} twice in round {}",
                            from, phase, round
                        )));
                    }
                }
                Envelope::Data { from, round: r, .. } if r < round => {
                    log::debug!("[Agent {}] dropping stale envelope from agent {} (round {})", self.id, from, r);
                }
                envelope @ Envelope::Data { .. } => self.stash.push(envelope),
                Envelope::Abort { from, round: r } => {
                    log::warn!("[Agent {}] agent {} aborted exchange round {}", self.id, from, r);
                    self.failure = Some(HermesError::TeammateAborted { agent: from, round: r });
                }
                Envelope::Leave { from } => {
                    self.failure = Some(HermesError::Disconnected(format!("agent {} left the exchange", from)));
                }
            }
        }
        Ok(pending.into_iter().collect())
    }

    fn abort(&mut self, round: u64) {
        for (_, sender) in &self.outboxes {
            let _ = sender.send(Envelope::Abort { from: self.id, round });
        }
        if self.failure.is_none() {
            self.failure = Some(HermesError::ProtocolViolation(format!(
                "agent {} abandoned exchange round {}",
                self.id, round
            )));
        }
    }
}

impl Drop for ExchangePort {
    fn drop(&mut self) {
        for (_, sender) in &self.outboxes {
            let _ = sender.send(Envelope::Leave { from: self.id });
        }
    }
}

impl fmt::Debug for ExchangePort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangePort")
            .field("id", &self.id)
            .field("num_agents", &self.num_agents)
            .field("round", &self.round)
            .finish()
    }
}

/// One round in progress. Dropping the guard before [`RoundGuard::finish`]
/// (early return, error or panic) tells every teammate the round is abandoned,
/// so nobody waits on it forever.
pub(crate) struct RoundGuard<'a> {
    port: &'a mut ExchangePort,
    round: u64,
    finished: bool,
}

impl<'a> RoundGuard<'a> {
    #[cfg(test)]
    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn num_agents(&self) -> usize {
        self.port.num_agents
    }

    pub fn teammates(&self) -> Vec<usize> {
        self.port.teammates()
    }

    pub fn publish(&mut self, to: usize, phase: Phase, payload: Payload) -> Result<()> {
        let envelope = Envelope::Data { from: self.port.id, round: self.round, phase, payload };
        self.port.send(to, envelope)
    }

    pub fn broadcast(&mut self, phase: Phase, payload: Payload) -> Result<()> {
        for to in self.teammates() {
            self.publish(to, phase, payload.clone())?;
        }
        Ok(())
    }

    pub fn collect(&mut self, phase: Phase) -> Result<Vec<(usize, Payload)>> {
        self.port.receive(self.round, phase)
    }

    pub fn finish(mut self) {
        self.finished = true;
        log::debug!("[Agent {}] finished exchange round {}", self.port.id, self.round);
    }
}

impl Drop for RoundGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            log::warn!("[Agent {}] abandoning exchange round {}", self.port.id, self.round);
            self.port.abort(self.round);
        }
    }
}
