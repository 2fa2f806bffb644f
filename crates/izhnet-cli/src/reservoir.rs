//! Excitatory/inhibitory reservoir assembled from a [`RunConfig`]

use izhnet_runtime::{
    connectivity, GroupId, NetworkId, PopulationId, PopulationOptions, SimContext,
    SimulationEngine, SimulationParams, Stimulus, SynapseOptions,
};
use tracing::{debug, info};

use crate::config::RunConfig;
use crate::error::CliResult;

/// Network id used for the reservoir
pub const NETWORK_ID: &str = "reservoir";

/// Excitatory population id
pub const EXCITATORY_ID: &str = "exc";

/// Inhibitory population id
pub const INHIBITORY_ID: &str = "inh";

/// A reservoir ready to run
#[derive(Debug)]
pub struct Reservoir {
    /// Driver owning the simulation context
    pub engine: SimulationEngine,
    /// Reservoir network
    pub network: NetworkId,
    /// Excitatory population
    pub excitatory: PopulationId,
    /// Inhibitory population
    pub inhibitory: PopulationId,
    /// Synapse groups in creation order
    pub groups: Vec<(String, GroupId)>,
}

/// Build the context, network and driver described by `config`
pub fn build(config: &RunConfig) -> CliResult<Reservoir> {
    config.validate()?;
    let (exc_preset, inh_preset) = config.presets()?;

    let mut ctx = SimContext::new(config.seed);
    let network = ctx.allocate_network(NETWORK_ID, config.network)?;

    let excitatory = ctx.allocate_population(
        EXCITATORY_ID,
        config.excitatory,
        exc_preset,
        &PopulationOptions::default().with_noise(config.excitatory_noise),
    )?;
    let inhibitory = ctx.allocate_population(
        INHIBITORY_ID,
        config.inhibitory,
        inh_preset,
        &PopulationOptions::default().with_noise(config.inhibitory_noise),
    )?;
    ctx.add_population_to_network(network, excitatory)?;
    ctx.add_population_to_network(network, inhibitory)?;

    let (n_exc, n_inh, density) = (config.excitatory, config.inhibitory, config.density);
    let wiring = [
        ("exc->exc", excitatory, excitatory, connectivity::recurrent(n_exc, density, ctx.rng_mut())?),
        ("exc->inh", excitatory, inhibitory, connectivity::random(n_exc, n_inh, density, ctx.rng_mut())?),
        ("inh->exc", inhibitory, excitatory, connectivity::random(n_inh, n_exc, density, ctx.rng_mut())?),
        ("inh->inh", inhibitory, inhibitory, connectivity::recurrent(n_inh, density, ctx.rng_mut())?),
    ];

    let mut groups = Vec::with_capacity(wiring.len());
    for (id, pre, post, (pre_idx, post_idx)) in wiring {
        let synapses = pre_idx.len();
        let group = ctx.allocate_synapse_group(id, pre, post, pre_idx, post_idx, SynapseOptions::default())?;
        ctx.add_synapse_group_to_network(network, group)?;
        debug!("Wired {} with {} synapses", id, synapses);
        groups.push((id.to_string(), group));
    }

    if let Some(target) = config.homeostasis_target_hz {
        ctx.enable_homeostasis(network, excitatory, target)?;
    }

    let params = SimulationParams::new(config.ticks, config.dt_ms)?
        .with_spike_recording(config.record_spikes)
        .with_perf(config.perf);
    let mut engine = SimulationEngine::new(ctx, network, params)?;

    if config.input.rate_hz > 0.0 && config.input.amplitude > 0.0 {
        let duration = config
            .input
            .duration
            .unwrap_or_else(|| config.ticks.saturating_sub(config.input.start_tick));
        engine.add_stimulus(Stimulus::Poisson {
            population: excitatory,
            rate_hz: config.input.rate_hz,
            amplitude: config.input.amplitude,
            start_tick: config.input.start_tick,
            duration,
        })?;
    }
    for reward in &config.rewards {
        engine.add_stimulus(Stimulus::RewardPulse {
            at_tick: reward.tick,
            amount: reward.amount,
        })?;
    }

    info!(
        "Reservoir built: {} {} + {} {} neurons, {} groups",
        config.excitatory,
        exc_preset,
        config.inhibitory,
        inh_preset,
        groups.len()
    );

    Ok(Reservoir {
        engine,
        network,
        excitatory,
        inhibitory,
        groups,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RewardEvent;

    fn small() -> RunConfig {
        RunConfig {
            ticks: 20,
            excitatory: 16,
            inhibitory: 4,
            density: 0.5,
            ..Default::default()
        }
    }

    #[test]
    fn builds_four_groups_with_dale_signs() {
        let reservoir = build(&small()).unwrap();
        let ctx = reservoir.engine.context();
        assert_eq!(reservoir.groups.len(), 4);

        for (name, group) in &reservoir.groups {
            let weights = ctx.group(*group).unwrap().weights();
            if name.starts_with("exc") {
                assert!(weights.iter().all(|&w| w >= 0.0), "{}", name);
            } else {
                assert!(weights.iter().all(|&w| w <= 0.0), "{}", name);
            }
        }

        let stats = ctx.stats(reservoir.network).unwrap();
        assert_eq!(stats.populations, 2);
        assert_eq!(stats.synapse_groups, 4);
        assert_eq!(stats.neurons, 20);
    }

    #[test]
    fn homeostasis_target_regulates_excitatory_only() {
        let config = RunConfig {
            homeostasis_target_hz: Some(5.0),
            ..small()
        };
        let reservoir = build(&config).unwrap();
        let net = reservoir.engine.context().network(reservoir.network).unwrap();
        assert!(net.config().homeostasis_enabled);
        assert!(net.homeostasis(reservoir.excitatory).is_some());
        assert!(net.homeostasis(reservoir.inhibitory).is_none());
    }

    #[test]
    fn same_seed_same_run() {
        let config = RunConfig {
            rewards: vec![RewardEvent { tick: 10, amount: 1.0 }],
            record_spikes: true,
            ..small()
        };
        let a = build(&config).unwrap().engine.run().unwrap();
        let b = build(&config).unwrap().engine.run().unwrap();
        assert_eq!(a.spikes, b.spikes);
        assert_eq!(a.final_mean_weights, b.final_mean_weights);
        assert_eq!(a.steps_executed, 20);
    }

    #[test]
    fn invalid_config_is_rejected_before_allocation() {
        let config = RunConfig {
            density: -0.1,
            ..small()
        };
        assert!(build(&config).is_err());
    }
}
