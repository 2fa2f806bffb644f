//! Simulation engine for sparse spiking networks
//!
//! Populations of Izhikevich neurons are connected by sparse synapse groups
//! that learn through a three-factor rule: STDP proposes weight changes,
//! eligibility buffers hold them, and a delayed reward (a scalar, or a
//! neuromodulation system's plasticity gate) decides whether they land.
//! A network steps its populations and groups through a fixed per-tick
//! pipeline and can regulate firing rates through homeostatic scaling.
//!
//! All state lives in a [`SimContext`]; objects are addressed through
//! generational handles that fail loudly once their slot is released.
//!
//! ```rust
//! use izhnet_runtime::{connectivity, NetworkConfig, NeuronPreset, PopulationOptions, SimContext, SynapseOptions};
//!
//! # fn main() -> izhnet_runtime::Result<()> {
//! let mut ctx = SimContext::new(42);
//! let net = ctx.allocate_network("net", NetworkConfig::default())?;
//! let exc = ctx.allocate_population("exc", 80, NeuronPreset::RegularSpiking, &PopulationOptions::default())?;
//! let inh = ctx.allocate_population("inh", 20, NeuronPreset::FastSpiking, &PopulationOptions::default())?;
//!
//! let (pre, post) = connectivity::random(80, 20, 0.1, ctx.rng_mut())?;
//! let ei = ctx.allocate_synapse_group("e->i", exc, inh, pre, post, SynapseOptions::default())?;
//!
//! ctx.add_population_to_network(net, exc)?;
//! ctx.add_population_to_network(net, inh)?;
//! ctx.add_synapse_group_to_network(net, ei)?;
//!
//! for _ in 0..100 {
//!     ctx.inject_current(exc, &[0, 1, 2], &[8.0, 8.0, 8.0])?;
//!     ctx.step(net, 1.0)?;
//! }
//! ctx.set_reward(net, 1.0)?;
//! let report = ctx.step(net, 1.0)?;
//! assert_eq!(report.timestep, 100);
//! assert_eq!(report.reward_applied, Some(1.0));
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

// Core modules
pub mod connectivity;
pub mod context;
pub mod error;
pub mod network;
pub mod neuromodulation;
pub mod neuron;
pub mod plasticity;
pub mod queue;
pub mod registry;
pub mod simulation;
pub mod synapse;

// Re-export essential types
pub use context::{ContextConfig, SimContext};
pub use error::{Result, RuntimeError};
pub use network::{HomeostasisState, Network, NetworkConfig, NetworkStats, StepReport};
pub use neuromodulation::{Modulator, NeuromodulationStats, NeuromodulationSystem};
pub use neuron::{IzhikevichParams, NeuronPreset, Population, PopulationOptions};
pub use plasticity::{StdpParams, SynapseKind};
pub use queue::DeferredOp;
pub use registry::{Arena, GroupId, NetworkId, PopulationId, SlotKind};
pub use simulation::{
    CancelFlag, SimulationEngine, SimulationParams, SimulationResult, Stimulus,
};
pub use synapse::{SynapseGroup, SynapseOptions};

/// Default tick length (ms)
pub const DEFAULT_DT_MS: f32 = 1.0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_integration() {
        let params = NeuronPreset::RegularSpiking.params();
        assert!(params.validate().is_ok());

        let stdp = StdpParams::default();
        assert!(stdp.a_plus > 0.0);

        let sim = SimulationParams::default();
        assert_eq!(sim.dt_ms, DEFAULT_DT_MS);
    }
}
