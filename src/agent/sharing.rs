use crate::error::{HermesError, Result};
use crate::layers::DenseLayer;
use crate::network::NeuralNetwork;
use super::Agent;

/// Make `slave` use `owner`'s parameter storage. The slave's previous
/// parameters are dropped; updates through either layer are seen by both.
pub fn share_layer(owner: &DenseLayer, slave: &mut DenseLayer) -> Result<()> {
    slave.share_params(owner.params())
}

fn share_leading_layers(role: &str, owner: &NeuralNetwork, slave: &mut NeuralNetwork, count: usize) -> Result<()> {
    if count > owner.layers.len() {
        return Err(HermesError::layer_mismatch(
            format!("{}[{}]", role, count),
            format!("the {} has only {} layers", role, owner.layers.len()),
        ));
    }
    for layer in &owner.layers[..count] {
        let counterpart = slave.layer_mut(layer.name()).ok_or_else(|| {
            HermesError::layer_mismatch(layer.name().to_string(), format!("no such layer in the other {}", role))
        })?;
        share_layer(layer, counterpart)?;
        log::debug!("shared {} layer {}", role, layer.name());
    }
    Ok(())
}

impl Agent {
    /// Share the first `num_actor_layers` actor layers and `num_critic_layers`
    /// critic layers of this agent with `other`, matching layers by name.
    /// Fails on the first layer that cannot be matched.
    pub fn share_parameters(&self, other: &mut Agent, num_actor_layers: usize, num_critic_layers: usize) -> Result<()> {
        share_leading_layers("actor", &self.actor, &mut other.actor, num_actor_layers)?;
        share_leading_layers("critic", &self.critic, &mut other.critic, num_critic_layers)
    }

    /// Hand `other` a handle to this agent's replay memory. Its own buffer is
    /// dropped once no handle refers to it.
    pub fn share_replay_memory(&self, other: &mut Agent) {
        other.memory = self.memory.clone();
    }
}
