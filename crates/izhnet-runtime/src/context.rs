//! The simulation context
//!
//! [`SimContext`] owns every population, synapse group and network, the
//! random number generator, and the deferred-operation queue. All engine
//! operations are methods on it, so a single `&mut SimContext` is the only
//! way to mutate simulation state and two ticks can never overlap.

use crate::error::{Result, RuntimeError};
use crate::network::{Network, NetworkConfig, NetworkStats, StepReport};
use crate::neuromodulation::NeuromodulationSystem;
use crate::neuron::{NeuronPreset, Population, PopulationOptions};
use crate::queue::{DeferredOp, OpQueue, DEFAULT_MAX_PENDING_OPS};
use crate::registry::Arena;
use crate::synapse::{SynapseGroup, SynapseOptions};
use crate::{GroupId, NetworkId, PopulationId};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Context construction parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextConfig {
    /// Seed for weight initialization, noise and stimuli
    pub seed: u64,
    /// Queue length that triggers an automatic flush
    pub max_pending_ops: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            max_pending_ops: DEFAULT_MAX_PENDING_OPS,
        }
    }
}

/// Owner of all simulation state
#[derive(Debug, Clone)]
pub struct SimContext {
    populations: Arena<Population>,
    groups: Arena<SynapseGroup>,
    networks: Arena<Network>,
    rng: ChaCha8Rng,
    queue: OpQueue,
}

impl SimContext {
    /// Create an empty context seeded with `seed`
    pub fn new(seed: u64) -> Self {
        Self::with_config(ContextConfig {
            seed,
            ..ContextConfig::default()
        })
    }

    /// Create an empty context
    pub fn with_config(config: ContextConfig) -> Self {
        Self {
            populations: Arena::new(),
            groups: Arena::new(),
            networks: Arena::new(),
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            queue: OpQueue::new(config.max_pending_ops),
        }
    }

    /// The context's random number generator
    pub fn rng_mut(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    // ---------------------------------------------------------------------
    // Populations
    // ---------------------------------------------------------------------

    /// Allocate a population under `id`
    ///
    /// An id that is already allocated returns its existing handle and the
    /// arguments are ignored.
    pub fn allocate_population(
        &mut self,
        id: &str,
        size: usize,
        preset: NeuronPreset,
        options: &PopulationOptions,
    ) -> Result<PopulationId> {
        let (handle, fresh) = self
            .populations
            .insert_with(id, || Population::new(size, preset, options))?;
        if fresh {
            log::debug!("Allocated population '{}' ({} x {}) as {}", id, size, preset, handle);
        } else {
            log::debug!("Population '{}' already allocated as {}", id, handle);
        }
        Ok(handle)
    }

    /// Handle of the population registered as `id`
    pub fn population_handle(&self, id: &str) -> Option<PopulationId> {
        self.populations.handle_of(id)
    }

    /// Id of a live population
    pub fn population_name(&self, population: PopulationId) -> Option<&str> {
        self.populations.id_of(population)
    }

    /// Shared access to a population
    pub fn population(&self, population: PopulationId) -> Result<&Population> {
        self.populations.get(population)
    }

    /// Mutable access to a population
    pub fn population_mut(&mut self, population: PopulationId) -> Result<&mut Population> {
        self.populations.get_mut(population)
    }

    /// Live populations in slot order
    pub fn populations(&self) -> impl Iterator<Item = (PopulationId, &Population)> + '_ {
        self.populations.iter()
    }

    /// Release a population
    ///
    /// Every synapse group reading from or writing to it is released too,
    /// and it leaves every network it belonged to, so those networks keep
    /// stepping without it. Queued operations aimed at released objects are
    /// dropped.
    pub fn release_population(&mut self, id: &str) -> bool {
        let Some(handle) = self.populations.handle_of(id) else {
            return false;
        };

        let touching: Vec<String> = self
            .groups
            .names()
            .filter(|&(_, group)| {
                self.groups
                    .get(group)
                    .map(|g| g.pre() == handle || g.post() == handle)
                    .unwrap_or(false)
            })
            .map(|(name, _)| name.to_owned())
            .collect();
        for name in &touching {
            self.release_synapse_group(name);
        }

        for (_, net) in self.networks.iter_mut() {
            net.remove_population(handle);
        }
        self.populations.remove(id);
        self.drop_orphaned_ops();
        log::debug!(
            "Released population '{}' ({}) with {} dependent group(s)",
            id,
            handle,
            touching.len()
        );
        true
    }

    /// Add current to selected neurons
    pub fn inject_current(
        &mut self,
        population: PopulationId,
        offsets: &[usize],
        amounts: &[f32],
    ) -> Result<()> {
        self.populations
            .get_mut(population)?
            .inject_current(offsets, amounts)
    }

    /// Integrate one population by `dt` milliseconds
    pub fn integrate(&mut self, population: PopulationId, dt: f32, inject_noise: bool) -> Result<usize> {
        let rng = inject_noise.then_some(&mut self.rng);
        self.populations.get_mut(population)?.integrate(dt, rng)
    }

    /// Weight bounds for synapses a population sends
    pub fn weight_bounds(&self, population: PopulationId) -> Result<(f32, f32)> {
        Ok(self.populations.get(population)?.weight_bounds())
    }

    // ---------------------------------------------------------------------
    // Synapse groups
    // ---------------------------------------------------------------------

    /// Allocate a synapse group under `id`
    ///
    /// An id that is already allocated returns its existing handle and the
    /// arguments are ignored.
    pub fn allocate_synapse_group(
        &mut self,
        id: &str,
        pre: PopulationId,
        post: PopulationId,
        pre_indices: Vec<usize>,
        post_indices: Vec<usize>,
        options: SynapseOptions,
    ) -> Result<GroupId> {
        if let Some(handle) = self.groups.handle_of(id) {
            log::debug!("Synapse group '{}' already allocated as {}", id, handle);
            return Ok(handle);
        }

        let pre_population = self.populations.get(pre)?;
        let post_population = self.populations.get(post)?;
        let rng = &mut self.rng;
        let (handle, _) = self.groups.insert_with(id, || {
            SynapseGroup::new(
                pre,
                pre_population,
                post,
                post_population,
                pre_indices,
                post_indices,
                options,
                rng,
            )
        })?;

        let group = self.groups.get(handle)?;
        log::debug!(
            "Allocated synapse group '{}' ({} -> {}, {} synapses, {:?}) as {}",
            id,
            pre,
            post,
            group.len(),
            group.kind(),
            handle
        );
        Ok(handle)
    }

    /// Handle of the group registered as `id`
    pub fn group_handle(&self, id: &str) -> Option<GroupId> {
        self.groups.handle_of(id)
    }

    /// Id of a live group
    pub fn group_name(&self, group: GroupId) -> Option<&str> {
        self.groups.id_of(group)
    }

    /// Shared access to a group
    pub fn group(&self, group: GroupId) -> Result<&SynapseGroup> {
        self.groups.get(group)
    }

    /// Mutable access to a group
    pub fn group_mut(&mut self, group: GroupId) -> Result<&mut SynapseGroup> {
        self.groups.get_mut(group)
    }

    /// Live groups in slot order
    pub fn groups(&self) -> impl Iterator<Item = (GroupId, &SynapseGroup)> + '_ {
        self.groups.iter()
    }

    /// Release a group and remove it from every network
    pub fn release_synapse_group(&mut self, id: &str) -> bool {
        let Some(handle) = self.groups.remove(id) else {
            return false;
        };
        for (_, net) in self.networks.iter_mut() {
            net.remove_group(handle);
        }
        self.drop_orphaned_ops();
        log::debug!("Released synapse group '{}' ({})", id, handle);
        true
    }

    /// Deliver last tick's presynaptic spikes as postsynaptic current
    ///
    /// Gathering finishes before any current is written, so a recurrent
    /// group (pre == post) reads a consistent spike mask.
    pub fn transmit(&mut self, group: GroupId) -> Result<()> {
        let synapses = self.groups.get_mut(group)?;
        let (pre, post) = (synapses.pre(), synapses.post());
        synapses.gather(self.populations.get(pre)?)?;
        synapses.deliver(self.populations.get_mut(post)?)
    }

    /// Decay and bump a group's spike traces
    pub fn update_traces(&mut self, group: GroupId) -> Result<()> {
        let synapses = self.groups.get_mut(group)?;
        let pre = self.populations.get(synapses.pre())?;
        let post = self.populations.get(synapses.post())?;
        synapses.update_traces(pre, post)
    }

    /// Accumulate STDP into eligibility, and into weights with `direct_update`
    pub fn apply_stdp(&mut self, group: GroupId, direct_update: bool) -> Result<()> {
        let synapses = self.groups.get_mut(group)?;
        let pre = self.populations.get(synapses.pre())?;
        let post = self.populations.get(synapses.post())?;
        synapses.apply_stdp(pre, post, direct_update)
    }

    /// Convert a group's eligibility into weight change
    pub fn apply_reward(&mut self, group: GroupId, reward: f32) -> Result<()> {
        self.groups.get_mut(group)?.apply_reward(reward);
        Ok(())
    }

    /// Zero a group's traces and eligibility
    pub fn reset_learning(&mut self, group: GroupId) -> Result<()> {
        self.groups.get_mut(group)?.reset_learning();
        Ok(())
    }

    /// Redraw a group's weights within bounds
    pub fn reset_weights(&mut self, group: GroupId) -> Result<()> {
        self.groups.get_mut(group)?.reset_weights(&mut self.rng);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Networks
    // ---------------------------------------------------------------------

    /// Allocate a network under `id`
    pub fn allocate_network(&mut self, id: &str, config: NetworkConfig) -> Result<NetworkId> {
        let (handle, fresh) = self.networks.insert_with(id, || Network::new(config))?;
        if fresh {
            log::debug!("Allocated network '{}' as {}", id, handle);
        } else {
            log::debug!("Network '{}' already allocated as {}", id, handle);
        }
        Ok(handle)
    }

    /// Handle of the network registered as `id`
    pub fn network_handle(&self, id: &str) -> Option<NetworkId> {
        self.networks.handle_of(id)
    }

    /// Shared access to a network
    pub fn network(&self, network: NetworkId) -> Result<&Network> {
        self.networks.get(network)
    }

    /// Make a population a member of a network
    pub fn add_population_to_network(&mut self, network: NetworkId, population: PopulationId) -> Result<()> {
        self.populations.get(population)?;
        if self.networks.get_mut(network)?.add_population(population) {
            log::debug!("Added {} to {}", population, network);
        }
        Ok(())
    }

    /// Make a group a member of a network
    ///
    /// A group whose endpoints are not members is accepted: it still
    /// transmits and learns, but its populations are not integrated by this
    /// network.
    pub fn add_synapse_group_to_network(&mut self, network: NetworkId, group: GroupId) -> Result<()> {
        let synapses = self.groups.get(group)?;
        let net = self.networks.get_mut(network)?;
        if !net.add_group(group) {
            return Ok(());
        }
        for endpoint in [synapses.pre(), synapses.post()] {
            if !net.contains_population(endpoint) {
                log::warn!("{} added to {} but its endpoint {} is not a member", group, network, endpoint);
            }
        }
        log::debug!("Added {} to {}", group, network);
        Ok(())
    }

    /// Set the legacy scalar reward
    pub fn set_reward(&mut self, network: NetworkId, reward: f32) -> Result<()> {
        check_reward(reward)?;
        self.networks.get_mut(network)?.set_reward(reward);
        Ok(())
    }

    /// Legacy scalar reward
    pub fn reward(&self, network: NetworkId) -> Result<f32> {
        Ok(self.networks.get(network)?.reward())
    }

    /// Regulate a member population toward `target_rate_hz`
    pub fn enable_homeostasis(
        &mut self,
        network: NetworkId,
        population: PopulationId,
        target_rate_hz: f32,
    ) -> Result<()> {
        if !(target_rate_hz.is_finite() && target_rate_hz > 0.0) {
            return Err(RuntimeError::invalid_parameter(
                "target_rate_hz",
                target_rate_hz.to_string(),
                "> 0.0",
            ));
        }
        let neurons = self.populations.get(population)?.size();
        let net = self.networks.get_mut(network)?;
        if !net.contains_population(population) {
            return Err(RuntimeError::invalid_config(format!(
                "{} is not a member of {}",
                population, network
            )));
        }
        net.enable_homeostasis(population, neurons, target_rate_hz);
        log::debug!("Homeostasis on {} targets {} Hz", population, target_rate_hz);
        Ok(())
    }

    /// Stop regulating a population; its current scale is kept
    pub fn disable_homeostasis(&mut self, network: NetworkId, population: PopulationId) -> Result<bool> {
        Ok(self.networks.get_mut(network)?.disable_homeostasis(population))
    }

    /// Cumulative homeostatic scale of a population (1.0 when unregulated)
    pub fn homeostatic_scale(&self, network: NetworkId, population: PopulationId) -> Result<f32> {
        Ok(self
            .networks
            .get(network)?
            .homeostasis(population)
            .map_or(1.0, |state| state.scale))
    }

    /// Attach a neuromodulation system, returning any previous one
    pub fn attach_neuromodulation(
        &mut self,
        network: NetworkId,
        system: NeuromodulationSystem,
    ) -> Result<Option<NeuromodulationSystem>> {
        Ok(self.networks.get_mut(network)?.attach_neuromodulation(system))
    }

    /// Detach and return the neuromodulation system
    pub fn detach_neuromodulation(&mut self, network: NetworkId) -> Result<Option<NeuromodulationSystem>> {
        Ok(self.networks.get_mut(network)?.detach_neuromodulation())
    }

    /// Mutable access to the attached neuromodulation system
    pub fn neuromodulation_mut(&mut self, network: NetworkId) -> Result<Option<&mut NeuromodulationSystem>> {
        Ok(self.networks.get_mut(network)?.neuromodulation_mut())
    }

    /// Ticks executed by a network
    pub fn timestep(&self, network: NetworkId) -> Result<u64> {
        Ok(self.networks.get(network)?.timestep())
    }

    /// Network-wide diagnostics
    pub fn stats(&self, network: NetworkId) -> Result<NetworkStats> {
        let net = self.networks.get(network)?;
        let (excitatory_spikes, inhibitory_spikes) = net.spike_tallies();

        let mut neurons = 0;
        let mut total_spikes = 0;
        for &population in net.populations() {
            let population = self.populations.get(population)?;
            neurons += population.size();
            total_spikes += population.total_spikes();
        }

        let mut synapses = 0;
        let mut weight_sum = 0.0;
        for &group in net.groups() {
            let group = self.groups.get(group)?;
            synapses += group.len();
            weight_sum += group.weights().iter().sum::<f32>();
        }

        Ok(NetworkStats {
            timestep: net.timestep(),
            populations: net.populations().len(),
            synapse_groups: net.groups().len(),
            neurons,
            synapses,
            excitatory_spikes,
            inhibitory_spikes,
            total_spikes,
            reward: net.reward(),
            plasticity_gate: net.neuromodulation().map(NeuromodulationSystem::plasticity_gate),
            mean_weight: if synapses > 0 { weight_sum / synapses as f32 } else { 0.0 },
        })
    }

    /// Advance a network by one tick of `dt` milliseconds
    ///
    /// Pending operations are flushed on entry and nowhere else: nothing can
    /// enqueue while a step holds the context, so operations queued after a
    /// step land at the start of the next one, before transmission. Call
    /// [`flush`](Self::flush) to apply them sooner. Transmission uses the
    /// spikes of the previous tick, so a spike reaches its target one tick
    /// after it is emitted.
    pub fn step(&mut self, network: NetworkId, dt: f32) -> Result<StepReport> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(RuntimeError::invalid_parameter("dt", dt.to_string(), "> 0.0"));
        }
        self.flush()?;

        let net = self.networks.get(network)?;
        let tick = net.timestep();
        let inject_noise = net.config().inject_noise;
        let populations = net.populations().to_vec();
        let groups = net.groups().to_vec();

        for &group in &groups {
            self.transmit(group)?;
        }
        for &group in &groups {
            self.update_traces(group)?;
        }
        for &group in &groups {
            self.apply_stdp(group, false)?;
        }

        let reward_applied = self.networks.get(network)?.pending_reward();
        if let Some(reward) = reward_applied {
            for &group in &groups {
                self.apply_reward(group, reward)?;
            }
            self.networks.get_mut(network)?.decay_reward();
        }

        let mut excitatory_spikes = 0;
        let mut inhibitory_spikes = 0;
        for &population in &populations {
            let spikes = self.integrate(population, dt, inject_noise)?;
            if self.populations.get(population)?.is_excitatory() {
                excitatory_spikes += spikes;
            } else {
                inhibitory_spikes += spikes;
            }
            self.networks.get_mut(network)?.record_rate(population, spikes, dt);
        }

        let net = self.networks.get_mut(network)?;
        net.set_tallies(excitatory_spikes, inhibitory_spikes);

        let homeostasis_ran = net.homeostasis_due();
        if homeostasis_ran {
            self.run_homeostasis(network, &groups)?;
        }

        let net = self.networks.get_mut(network)?;
        net.decay_neuromodulation();
        net.advance();

        Ok(StepReport {
            timestep: tick,
            excitatory_spikes,
            inhibitory_spikes,
            reward_applied,
            homeostasis_ran,
        })
    }

    fn run_homeostasis(&mut self, network: NetworkId, groups: &[GroupId]) -> Result<()> {
        let scales = self.networks.get_mut(network)?.regulate();
        if scales.is_empty() {
            return Ok(());
        }
        for &group in groups {
            let synapses = self.groups.get_mut(group)?;
            if let Some(&scale) = scales.get(&synapses.post()) {
                synapses.scale_weights(scale);
            }
        }
        log::debug!("Homeostatic pass on {} rescaled {} population(s)", network, scales.len());
        Ok(())
    }

    /// Release a network together with its member groups and populations
    pub fn release_network(&mut self, id: &str) -> bool {
        let Some(handle) = self.networks.handle_of(id) else {
            return false;
        };
        let (groups, populations) = match self.networks.get(handle) {
            Ok(net) => (net.groups().to_vec(), net.populations().to_vec()),
            Err(_) => return false,
        };

        for group in groups {
            if let Some(name) = self.group_name(group).map(str::to_owned) {
                self.release_synapse_group(&name);
            }
        }
        for population in populations {
            if let Some(name) = self.population_name(population).map(str::to_owned) {
                self.release_population(&name);
            }
        }

        self.networks.remove(id);
        self.drop_orphaned_ops();
        log::debug!("Released network '{}' ({})", id, handle);
        true
    }

    /// Rewind a network to tick zero
    ///
    /// Population dynamics and learning state are cleared; weights are kept.
    pub fn reset_network(&mut self, network: NetworkId) -> Result<()> {
        let net = self.networks.get_mut(network)?;
        net.reset();
        let populations = net.populations().to_vec();
        let groups = net.groups().to_vec();

        for population in populations {
            self.populations.get_mut(population)?.reset_state();
        }
        for group in groups {
            self.groups.get_mut(group)?.reset_learning();
        }
        log::debug!("Reset {}", network);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Deferred operations
    // ---------------------------------------------------------------------

    /// Queue an operation for the next flush
    ///
    /// The operation is validated now, so a bad shape or stale handle is
    /// reported to the caller that produced it. Reaching the queue bound
    /// flushes immediately.
    pub fn enqueue(&mut self, op: DeferredOp) -> Result<()> {
        match &op {
            DeferredOp::InjectCurrent {
                population,
                offsets,
                amounts,
            } => self
                .populations
                .get(*population)?
                .check_injection(offsets, amounts)?,
            DeferredOp::SetReward { network, reward } => {
                check_reward(*reward)?;
                self.networks.get(*network)?;
            }
            DeferredOp::ResetLearning { group } | DeferredOp::ResetWeights { group } => {
                self.groups.get(*group)?;
            }
        }

        self.queue.push(op);
        if self.queue.is_full() {
            log::debug!("Queue reached {} operations, flushing", self.queue.len());
            self.flush()?;
        }
        Ok(())
    }

    /// Operations waiting for the next flush
    pub fn pending_ops(&self) -> usize {
        self.queue.len()
    }

    /// Apply every queued operation in FIFO order
    ///
    /// Stops at the first failure: the failing operation is dropped, later
    /// ones stay queued, and the error is returned.
    pub fn flush(&mut self) -> Result<usize> {
        let mut applied = 0;
        while let Some(op) = self.queue.pop() {
            let name = op.name();
            if let Err(err) = self.apply_op(op) {
                log::warn!("Deferred {} failed after {} applied: {}", name, applied, err);
                return Err(err);
            }
            applied += 1;
        }
        Ok(applied)
    }

    fn drop_orphaned_ops(&mut self) {
        let (populations, groups, networks) = (&self.populations, &self.groups, &self.networks);
        let dropped = self.queue.retain(|op| match op {
            DeferredOp::InjectCurrent { population, .. } => populations.is_live(*population),
            DeferredOp::SetReward { network, .. } => networks.is_live(*network),
            DeferredOp::ResetLearning { group } | DeferredOp::ResetWeights { group } => {
                groups.is_live(*group)
            }
        });
        if dropped > 0 {
            log::debug!("Dropped {} queued operation(s) aimed at released objects", dropped);
        }
    }

    fn apply_op(&mut self, op: DeferredOp) -> Result<()> {
        match op {
            DeferredOp::InjectCurrent {
                population,
                offsets,
                amounts,
            } => self.inject_current(population, &offsets, &amounts),
            DeferredOp::SetReward { network, reward } => self.set_reward(network, reward),
            DeferredOp::ResetLearning { group } => self.reset_learning(group),
            DeferredOp::ResetWeights { group } => self.reset_weights(group),
        }
    }
}

impl Default for SimContext {
    fn default() -> Self {
        Self::with_config(ContextConfig::default())
    }
}

fn check_reward(reward: f32) -> Result<()> {
    if reward.is_finite() {
        Ok(())
    } else {
        Err(RuntimeError::invalid_parameter("reward", reward.to_string(), "finite"))
    }
}
