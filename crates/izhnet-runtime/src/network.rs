//! Network membership, reward state and homeostasis
//!
//! A [`Network`] does not own populations or synapse groups; it holds their
//! handles in insertion order together with the per-network learning state
//! (legacy scalar reward, homeostatic regulators, optional neuromodulation).
//! The per-tick pipeline that ties these together is
//! [`SimContext::step`](crate::SimContext::step).

use crate::error::{Result, RuntimeError};
use crate::neuromodulation::NeuromodulationSystem;
use crate::registry::SlotKind;
use crate::{GroupId, NetworkId, PopulationId};
use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Guard against division by zero in the homeostatic ratio
pub const HOMEOSTASIS_EPSILON: f32 = 1e-6;

/// Network configuration parameters
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct NetworkConfig {
    /// Rewards with magnitude at or below this are skipped
    pub reward_epsilon: f32,
    /// Multiplier applied to the legacy reward after it is used
    pub reward_decay: f32,
    /// Ticks between homeostatic passes
    pub homeostasis_interval: u64,
    /// Time constant (in passes) of the rate average and scale drift
    pub homeostasis_tau: f32,
    /// Lower clip of the per-pass scale
    pub homeostasis_min_scale: f32,
    /// Upper clip of the per-pass scale
    pub homeostasis_max_scale: f32,
    /// Run homeostatic passes at all
    pub homeostasis_enabled: bool,
    /// Add background noise during integration
    pub inject_noise: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            reward_epsilon: 1e-4,
            reward_decay: 0.9,
            homeostasis_interval: 100,
            homeostasis_tau: 1000.0,
            homeostasis_min_scale: 0.5,
            homeostasis_max_scale: 2.0,
            homeostasis_enabled: false,
            inject_noise: true,
        }
    }
}

impl NetworkConfig {
    /// Check every field
    pub fn validate(&self) -> Result<()> {
        if !(self.reward_epsilon.is_finite() && self.reward_epsilon >= 0.0) {
            return Err(RuntimeError::invalid_parameter(
                "reward_epsilon",
                self.reward_epsilon.to_string(),
                ">= 0.0",
            ));
        }
        if !(0.0..=1.0).contains(&self.reward_decay) {
            return Err(RuntimeError::invalid_parameter(
                "reward_decay",
                self.reward_decay.to_string(),
                "in [0.0, 1.0]",
            ));
        }
        if self.homeostasis_interval == 0 {
            return Err(RuntimeError::invalid_parameter(
                "homeostasis_interval",
                "0",
                "> 0",
            ));
        }
        if !(self.homeostasis_tau.is_finite() && self.homeostasis_tau >= 1.0) {
            return Err(RuntimeError::invalid_parameter(
                "homeostasis_tau",
                self.homeostasis_tau.to_string(),
                ">= 1.0",
            ));
        }
        let (min, max) = (self.homeostasis_min_scale, self.homeostasis_max_scale);
        if !(min.is_finite() && max.is_finite() && min > 0.0 && min <= 1.0 && max >= 1.0) {
            return Err(RuntimeError::invalid_config(format!(
                "homeostasis scale range [{}, {}] must satisfy 0 < min <= 1 <= max",
                min, max
            )));
        }
        Ok(())
    }

    /// Enable homeostatic passes
    pub fn with_homeostasis(mut self, interval: u64, tau: f32) -> Self {
        self.homeostasis_enabled = true;
        self.homeostasis_interval = interval;
        self.homeostasis_tau = tau;
        self
    }

    /// Turn background noise on or off
    pub fn with_noise(mut self, inject_noise: bool) -> Self {
        self.inject_noise = inject_noise;
        self
    }
}

/// Firing-rate regulator for one population
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HomeostasisState {
    /// Desired firing rate (Hz)
    pub target_rate_hz: f32,
    /// Running average of the measured rate (Hz)
    pub average_rate_hz: f32,
    /// Cumulative multiplier applied to incoming weights
    pub scale: f32,
    /// Whether passes update this population
    pub enabled: bool,
    neurons: usize,
    window_spikes: u64,
    window_ms: f32,
}

impl HomeostasisState {
    fn new(target_rate_hz: f32, neurons: usize) -> Self {
        Self {
            target_rate_hz,
            average_rate_hz: 0.0,
            scale: 1.0,
            enabled: true,
            neurons,
            window_spikes: 0,
            window_ms: 0.0,
        }
    }

    pub(crate) fn record(&mut self, spikes: usize, dt_ms: f32) {
        self.window_spikes += spikes as u64;
        self.window_ms += dt_ms;
    }

    /// Spikes per neuron per second since the last pass
    pub fn window_rate_hz(&self) -> f32 {
        if self.neurons == 0 || self.window_ms <= 0.0 {
            return 0.0;
        }
        self.window_spikes as f32 / self.neurons as f32 / (self.window_ms / 1000.0)
    }

    /// Fold the window into the average and drift the scale toward target
    pub(crate) fn regulate(&mut self, config: &NetworkConfig) -> f32 {
        let tau = config.homeostasis_tau;
        let rate = self.window_rate_hz();
        self.average_rate_hz += (rate - self.average_rate_hz) / tau;

        let ratio = (self.target_rate_hz / (self.average_rate_hz + HOMEOSTASIS_EPSILON))
            .clamp(config.homeostasis_min_scale, config.homeostasis_max_scale);
        self.scale = (self.scale * ratio.powf(1.0 / tau))
            .clamp(config.homeostasis_min_scale, config.homeostasis_max_scale);

        self.window_spikes = 0;
        self.window_ms = 0.0;
        self.scale
    }

    fn reset(&mut self) {
        *self = Self {
            enabled: self.enabled,
            ..Self::new(self.target_rate_hz, self.neurons)
        };
    }
}

/// Outcome of a single tick
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StepReport {
    /// Tick that was executed
    pub timestep: u64,
    /// Spikes from excitatory populations
    pub excitatory_spikes: usize,
    /// Spikes from inhibitory populations
    pub inhibitory_spikes: usize,
    /// Reward that reached the groups, if one did
    pub reward_applied: Option<f32>,
    /// Whether a homeostatic pass ran
    pub homeostasis_ran: bool,
}

impl StepReport {
    /// All spikes this tick
    pub fn total_spikes(&self) -> usize {
        self.excitatory_spikes + self.inhibitory_spikes
    }
}

/// Network-wide diagnostics
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NetworkStats {
    /// Ticks executed
    pub timestep: u64,
    /// Member populations
    pub populations: usize,
    /// Member synapse groups
    pub synapse_groups: usize,
    /// Neurons across member populations
    pub neurons: usize,
    /// Synapses across member groups
    pub synapses: usize,
    /// Excitatory spikes in the last tick
    pub excitatory_spikes: usize,
    /// Inhibitory spikes in the last tick
    pub inhibitory_spikes: usize,
    /// Spikes since creation or reset
    pub total_spikes: u64,
    /// Legacy scalar reward
    pub reward: f32,
    /// Plasticity gate of the attached neuromodulation system
    pub plasticity_gate: Option<f32>,
    /// Mean weight over every member synapse
    pub mean_weight: f32,
}

/// A set of populations and groups stepped together
#[derive(Debug, Clone, Default)]
pub struct Network {
    config: NetworkConfig,
    populations: Vec<PopulationId>,
    groups: Vec<GroupId>,
    timestep: u64,
    reward: f32,
    homeostasis: HashMap<PopulationId, HomeostasisState>,
    excitatory_spikes: usize,
    inhibitory_spikes: usize,
    neuromodulation: Option<NeuromodulationSystem>,
}

impl SlotKind for Network {
    const KIND: &'static str = "network";
    type Key = NetworkId;
}

impl Network {
    /// Create an empty network
    pub fn new(config: NetworkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::default()
        })
    }

    /// Configuration
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Member populations in insertion order
    pub fn populations(&self) -> &[PopulationId] {
        &self.populations
    }

    /// Member groups in insertion order
    pub fn groups(&self) -> &[GroupId] {
        &self.groups
    }

    /// Whether `population` is a member
    pub fn contains_population(&self, population: PopulationId) -> bool {
        self.populations.contains(&population)
    }

    /// Ticks executed
    pub fn timestep(&self) -> u64 {
        self.timestep
    }

    /// Legacy scalar reward
    pub fn reward(&self) -> f32 {
        self.reward
    }

    /// Spike tallies from the last tick
    pub fn spike_tallies(&self) -> (usize, usize) {
        (self.excitatory_spikes, self.inhibitory_spikes)
    }

    /// Homeostatic state of a member population
    pub fn homeostasis(&self, population: PopulationId) -> Option<&HomeostasisState> {
        self.homeostasis.get(&population)
    }

    /// Attached neuromodulation system
    pub fn neuromodulation(&self) -> Option<&NeuromodulationSystem> {
        self.neuromodulation.as_ref()
    }

    pub(crate) fn neuromodulation_mut(&mut self) -> Option<&mut NeuromodulationSystem> {
        self.neuromodulation.as_mut()
    }

    pub(crate) fn add_population(&mut self, population: PopulationId) -> bool {
        if self.populations.contains(&population) {
            return false;
        }
        self.populations.push(population);
        true
    }

    pub(crate) fn add_group(&mut self, group: GroupId) -> bool {
        if self.groups.contains(&group) {
            return false;
        }
        self.groups.push(group);
        true
    }

    /// Forget a population and its regulator
    pub(crate) fn remove_population(&mut self, population: PopulationId) -> bool {
        self.homeostasis.remove(&population);
        let before = self.populations.len();
        self.populations.retain(|&member| member != population);
        self.populations.len() != before
    }

    pub(crate) fn remove_group(&mut self, group: GroupId) -> bool {
        let before = self.groups.len();
        self.groups.retain(|&member| member != group);
        self.groups.len() != before
    }

    pub(crate) fn set_reward(&mut self, reward: f32) {
        self.reward = reward;
    }

    /// Reward for this tick, if it clears epsilon
    pub(crate) fn pending_reward(&self) -> Option<f32> {
        let reward = match &self.neuromodulation {
            Some(system) => system.plasticity_gate(),
            None => self.reward,
        };
        (reward.abs() > self.config.reward_epsilon).then_some(reward)
    }

    pub(crate) fn decay_reward(&mut self) {
        self.reward *= self.config.reward_decay;
    }

    pub(crate) fn set_tallies(&mut self, excitatory: usize, inhibitory: usize) {
        self.excitatory_spikes = excitatory;
        self.inhibitory_spikes = inhibitory;
    }

    pub(crate) fn record_rate(&mut self, population: PopulationId, spikes: usize, dt_ms: f32) {
        if let Some(state) = self.homeostasis.get_mut(&population) {
            if state.enabled {
                state.record(spikes, dt_ms);
            }
        }
    }

    pub(crate) fn homeostasis_due(&self) -> bool {
        self.config.homeostasis_enabled
            && (self.timestep + 1) % self.config.homeostasis_interval == 0
    }

    /// Run the regulators and return the scale for each regulated population
    pub(crate) fn regulate(&mut self) -> HashMap<PopulationId, f32> {
        let config = self.config;
        self.homeostasis
            .iter_mut()
            .filter(|(_, state)| state.enabled)
            .map(|(&population, state)| (population, state.regulate(&config)))
            .collect()
    }

    pub(crate) fn enable_homeostasis(&mut self, population: PopulationId, neurons: usize, target_rate_hz: f32) {
        self.config.homeostasis_enabled = true;
        self.homeostasis
            .entry(population)
            .and_modify(|state| {
                state.target_rate_hz = target_rate_hz;
                state.enabled = true;
            })
            .or_insert_with(|| HomeostasisState::new(target_rate_hz, neurons));
    }

    pub(crate) fn disable_homeostasis(&mut self, population: PopulationId) -> bool {
        match self.homeostasis.get_mut(&population) {
            Some(state) => {
                state.enabled = false;
                true
            }
            None => false,
        }
    }

    pub(crate) fn attach_neuromodulation(&mut self, system: NeuromodulationSystem) -> Option<NeuromodulationSystem> {
        self.neuromodulation.replace(system)
    }

    pub(crate) fn detach_neuromodulation(&mut self) -> Option<NeuromodulationSystem> {
        self.neuromodulation.take()
    }

    pub(crate) fn decay_neuromodulation(&mut self) {
        if let Some(system) = &mut self.neuromodulation {
            system.decay();
        }
    }

    pub(crate) fn advance(&mut self) {
        self.timestep += 1;
    }

    /// Zero the clock and learning bookkeeping
    pub(crate) fn reset(&mut self) {
        self.timestep = 0;
        self.reward = 0.0;
        self.excitatory_spikes = 0;
        self.inhibitory_spikes = 0;
        self.homeostasis.values_mut().for_each(HomeostasisState::reset);
        if let Some(system) = &mut self.neuromodulation {
            system.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::KeyData;

    fn handle(index: u32) -> PopulationId {
        PopulationId::from(KeyData::from_ffi((1 << 32) | u64::from(index)))
    }

    #[test]
    fn test_config_default_is_valid() {
        let config = NetworkConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.homeostasis_enabled);
        assert_eq!(config.homeostasis_interval, 100);
    }

    #[test]
    fn test_config_validation() {
        let mut config = NetworkConfig::default();
        config.homeostasis_interval = 0;
        assert!(config.validate().is_err());

        let mut config = NetworkConfig::default();
        config.reward_decay = 1.5;
        assert!(config.validate().is_err());

        let mut config = NetworkConfig::default();
        config.homeostasis_min_scale = 1.5;
        assert!(matches!(
            config.validate(),
            Err(RuntimeError::InvalidConfiguration { .. })
        ));

        assert!(Network::new(NetworkConfig {
            homeostasis_tau: 0.5,
            ..NetworkConfig::default()
        })
        .is_err());
    }

    #[test]
    fn test_membership_is_idempotent_and_ordered() {
        let mut network = Network::new(NetworkConfig::default()).unwrap();
        assert!(network.add_population(handle(2)));
        assert!(network.add_population(handle(0)));
        assert!(!network.add_population(handle(2)));
        assert_eq!(network.populations(), &[handle(2), handle(0)]);
    }

    #[test]
    fn test_reward_epsilon_gate() {
        let mut network = Network::new(NetworkConfig::default()).unwrap();
        network.set_reward(5e-5);
        assert_eq!(network.pending_reward(), None);

        network.set_reward(-0.3);
        assert_eq!(network.pending_reward(), Some(-0.3));
        network.decay_reward();
        assert!((network.reward() + 0.27).abs() < 1e-6);
    }

    #[test]
    fn test_neuromodulation_overrides_legacy_reward() {
        let mut network = Network::new(NetworkConfig::default()).unwrap();
        network.set_reward(1.0);
        network.attach_neuromodulation(NeuromodulationSystem::new());
        assert_eq!(network.pending_reward(), None);

        network.detach_neuromodulation();
        assert_eq!(network.pending_reward(), Some(1.0));
    }

    #[test]
    fn test_homeostasis_schedule() {
        let config = NetworkConfig::default().with_homeostasis(10, 10.0);
        let mut network = Network::new(config).unwrap();
        let mut due = Vec::new();
        for _ in 0..30 {
            if network.homeostasis_due() {
                due.push(network.timestep());
            }
            network.advance();
        }
        assert_eq!(due, vec![9, 19, 29]);
    }

    #[test]
    fn test_overactive_population_scales_down() {
        let config = NetworkConfig::default().with_homeostasis(100, 10.0);
        let mut network = Network::new(config).unwrap();
        let population = handle(0);
        network.enable_homeostasis(population, 10, 1.0);

        for _ in 0..100 {
            network.record_rate(population, 3, 1.0);
        }
        let state = network.homeostasis(population).unwrap();
        assert!((state.window_rate_hz() - 300.0).abs() < 1e-2);

        let scales = network.regulate();
        let scale = scales[&population];
        assert!(scale < 1.0);
        assert!(scale >= config.homeostasis_min_scale);
        assert_eq!(network.homeostasis(population).unwrap().window_rate_hz(), 0.0);
    }

    #[test]
    fn test_underactive_population_scales_up() {
        let config = NetworkConfig::default().with_homeostasis(100, 10.0);
        let mut network = Network::new(config).unwrap();
        let population = handle(0);
        network.enable_homeostasis(population, 10, 5.0);
        for _ in 0..100 {
            network.record_rate(population, 0, 1.0);
        }
        assert!(network.regulate()[&population] > 1.0);
    }

    #[test]
    fn test_disabled_population_is_not_regulated() {
        let mut network = Network::new(NetworkConfig::default()).unwrap();
        let population = handle(0);
        network.enable_homeostasis(population, 10, 5.0);
        assert!(network.disable_homeostasis(population));
        assert!(network.regulate().is_empty());
        assert!(!network.disable_homeostasis(handle(1)));
    }
}
