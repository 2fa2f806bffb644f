//! Fixed-step simulation driver

use crate::context::SimContext;
use crate::error::{Result, RuntimeError};
use crate::queue::DeferredOp;
use crate::{NetworkId, PopulationId};
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Shared cancellation request, observed once per tick before the flush
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// A flag that is not set
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Simulation parameters
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SimulationParams {
    /// Ticks to execute
    pub ticks: u64,
    /// Tick length (ms)
    pub dt_ms: f32,
    /// Record individual spikes
    pub record_spikes: bool,
    /// Maximum spikes to record (prevents memory issues)
    pub max_recorded_spikes: Option<usize>,
    /// Enable performance sampling
    pub perf_enabled: bool,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            ticks: 1000,                         // 1 second at 1 ms
            dt_ms: crate::DEFAULT_DT_MS,
            record_spikes: true,
            max_recorded_spikes: Some(1_000_000), // 1M spike limit
            perf_enabled: false,
        }
    }
}

impl SimulationParams {
    /// Create new simulation parameters with validation
    pub fn new(ticks: u64, dt_ms: f32) -> Result<Self> {
        if ticks == 0 {
            return Err(RuntimeError::invalid_parameter("ticks", "0", "> 0"));
        }
        if !(dt_ms.is_finite() && dt_ms > 0.0) {
            return Err(RuntimeError::invalid_parameter(
                "dt_ms",
                dt_ms.to_string(),
                "> 0.0",
            ));
        }

        Ok(Self {
            ticks,
            dt_ms,
            ..Default::default()
        })
    }

    /// Turn spike recording on or off
    pub fn with_spike_recording(mut self, enabled: bool) -> Self {
        self.record_spikes = enabled;
        self
    }

    /// Set spike recording limit
    pub fn with_spike_limit(mut self, limit: usize) -> Self {
        self.max_recorded_spikes = Some(limit);
        self
    }

    /// Enable per-step timing
    pub fn with_perf(mut self, enabled: bool) -> Self {
        self.perf_enabled = enabled;
        self
    }

    /// Simulated duration (ms)
    pub fn duration_ms(&self) -> f32 {
        self.ticks as f32 * self.dt_ms
    }

    /// Validate parameters
    pub fn validate(&self) -> Result<()> {
        Self::new(self.ticks, self.dt_ms)?;
        Ok(())
    }
}

/// External input applied while the simulation runs
#[derive(Debug, Clone, PartialEq)]
pub enum Stimulus {
    /// Same current into every neuron of a population
    Constant {
        /// Target population
        population: PopulationId,
        /// Current per neuron per tick
        amplitude: f32,
        /// First tick
        start_tick: u64,
        /// Ticks active
        duration: u64,
    },
    /// Independent Bernoulli pulses per neuron approximating a Poisson train
    Poisson {
        /// Target population
        population: PopulationId,
        /// Pulse rate per neuron (Hz)
        rate_hz: f32,
        /// Current per pulse
        amplitude: f32,
        /// First tick
        start_tick: u64,
        /// Ticks active
        duration: u64,
    },
    /// Set the network's legacy reward at one tick
    RewardPulse {
        /// Tick at which the reward is set
        at_tick: u64,
        /// Reward value
        amount: f32,
    },
}

impl Stimulus {
    fn active(start_tick: u64, duration: u64, tick: u64) -> bool {
        tick >= start_tick && tick - start_tick < duration
    }
}

/// A spike recorded by the driver
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RecordedSpike {
    /// Tick of the integration that produced the spike
    pub tick: u64,
    /// Population id
    pub population: String,
    /// Neuron offset within the population
    pub neuron: usize,
}

/// Performance metrics collected during simulation steps
///
/// Present when `SimulationParams::with_perf(true)` is used.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PerfReport {
    /// Average step time in nanoseconds
    pub avg_step_ns: u64,
    /// Max step time in nanoseconds
    pub max_step_ns: u64,
    /// Steps sampled
    pub steps: usize,
}

/// Simulation results
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SimulationResult {
    /// Recorded spikes, in tick order
    pub spikes: Vec<RecordedSpike>,
    /// Whether recording stopped at the spike limit
    pub spikes_truncated: bool,
    /// Spikes per population over the run
    pub spike_counts: BTreeMap<String, u64>,
    /// Mean weight per synapse group at the end of the run
    pub final_mean_weights: BTreeMap<String, f32>,
    /// Simulated duration (ms)
    pub duration_ms: f32,
    /// Number of steps executed
    pub steps_executed: u64,
    /// Whether the run stopped on a cancellation request
    pub cancelled: bool,
    /// Optional performance report
    pub perf: Option<PerfReport>,
}

impl SimulationResult {
    /// Total spikes across populations
    pub fn total_spikes(&self) -> u64 {
        self.spike_counts.values().sum()
    }

    /// Mean firing rate of a population (Hz)
    pub fn firing_rate(&self, population: &str, size: usize) -> f32 {
        let spikes = self.spike_counts.get(population).copied().unwrap_or(0);
        let duration_s = self.duration_ms / 1000.0;
        if size == 0 || duration_s <= 0.0 {
            return 0.0;
        }
        spikes as f32 / size as f32 / duration_s
    }

    /// Recorded spikes of one population
    pub fn spikes_for_population<'a>(&'a self, population: &'a str) -> impl Iterator<Item = &'a RecordedSpike> + 'a {
        self.spikes.iter().filter(move |spike| spike.population == population)
    }
}

/// Simulation engine
#[derive(Debug)]
pub struct SimulationEngine {
    /// Context holding the simulated network
    context: SimContext,
    /// Network being simulated
    network: NetworkId,
    /// Simulation parameters
    params: SimulationParams,
    /// Input stimuli
    stimuli: Vec<Stimulus>,
    /// Cancellation request
    cancel: CancelFlag,
    /// Per-step timing samples (ns), captured when perf_enabled
    perf_samples: Vec<u64>,
}

impl SimulationEngine {
    /// Create a new simulation engine
    pub fn new(context: SimContext, network: NetworkId, params: SimulationParams) -> Result<Self> {
        params.validate()?;
        context.network(network)?;

        Ok(Self {
            context,
            network,
            params,
            stimuli: Vec::new(),
            cancel: CancelFlag::new(),
            perf_samples: Vec::new(),
        })
    }

    /// Add an input stimulus
    pub fn add_stimulus(&mut self, stimulus: Stimulus) -> Result<()> {
        match &stimulus {
            Stimulus::Constant { population, amplitude, .. } => {
                self.context.population(*population)?;
                check_finite("amplitude", *amplitude)?;
            }
            Stimulus::Poisson {
                population,
                rate_hz,
                amplitude,
                ..
            } => {
                self.context.population(*population)?;
                check_finite("amplitude", *amplitude)?;
                if !(rate_hz.is_finite() && *rate_hz >= 0.0) {
                    return Err(RuntimeError::invalid_parameter(
                        "rate_hz",
                        rate_hz.to_string(),
                        ">= 0.0",
                    ));
                }
            }
            Stimulus::RewardPulse { amount, .. } => check_finite("amount", *amount)?,
        }
        self.stimuli.push(stimulus);
        Ok(())
    }

    /// Use an externally owned cancellation flag
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Flag that stops the run at the next tick boundary
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Run the complete simulation
    pub fn run(&mut self) -> Result<SimulationResult> {
        log::info!(
            "Starting simulation: {} ticks ({}ms) with {}ms timestep",
            self.params.ticks,
            self.params.duration_ms(),
            self.params.dt_ms
        );

        let mut results = SimulationResult::default();
        let members = self.context.network(self.network)?.populations().to_vec();
        let names = members
            .iter()
            .map(|&population| self.population_name(population))
            .collect::<Result<Vec<_>>>()?;
        for name in &names {
            results.spike_counts.insert(name.clone(), 0);
        }

        self.perf_samples.clear();
        let ticks = self.params.ticks;
        let dt_ms = self.params.dt_ms;

        for step in 0..ticks {
            // Cancellation is only observed at the flush barrier
            if self.cancel.is_cancelled() {
                log::info!("Simulation cancelled after {} steps", step);
                results.cancelled = true;
                break;
            }

            let step_start = Instant::now();
            let tick = self.context.timestep(self.network)?;

            self.apply_stimuli(tick)?;

            let report = self
                .context
                .step(self.network, dt_ms)
                .map_err(|e| RuntimeError::simulation_step(tick, e.to_string()))?;

            for (&population, name) in members.iter().zip(&names) {
                let fired = self.context.population(population)?.fired();
                let mut spikes = 0;
                for (neuron, _) in fired.iter().enumerate().filter(|&(_, &f)| f) {
                    spikes += 1;
                    if self.params.record_spikes && !results.spikes_truncated {
                        results.spikes.push(RecordedSpike {
                            tick: report.timestep,
                            population: name.clone(),
                            neuron,
                        });
                    }
                }
                *results.spike_counts.entry(name.clone()).or_insert(0) += spikes;
            }

            // Check spike limit
            if let Some(max_spikes) = self.params.max_recorded_spikes {
                if results.spikes.len() >= max_spikes && !results.spikes_truncated {
                    log::warn!("Spike recording limit reached: {}", max_spikes);
                    results.spikes.truncate(max_spikes);
                    results.spikes_truncated = true;
                }
            }

            // Capture step timing
            if self.params.perf_enabled {
                let elapsed_ns = step_start.elapsed().as_nanos() as u64;
                self.perf_samples.push(elapsed_ns);
            }

            results.steps_executed += 1;

            // Progress logging
            if step % (ticks / 10).max(1) == 0 {
                let progress = (step as f32 / ticks as f32) * 100.0;
                log::debug!("Simulation progress: {:.1}%", progress);
            }
        }

        results.duration_ms = results.steps_executed as f32 * dt_ms;
        self.record_final_weights(&mut results)?;

        log::info!(
            "Simulation completed: {} spikes in {} steps",
            results.total_spikes(),
            results.steps_executed
        );

        // Build performance report if enabled
        if self.params.perf_enabled && !self.perf_samples.is_empty() {
            let steps = self.perf_samples.len();
            let sum: u128 = self.perf_samples.iter().map(|v| *v as u128).sum();
            let avg = (sum / steps as u128) as u64;
            let max = self.perf_samples.iter().copied().max().unwrap_or(0);
            results.perf = Some(PerfReport {
                avg_step_ns: avg,
                max_step_ns: max,
                steps,
            });
        }

        Ok(results)
    }

    /// Queue this tick's stimuli
    fn apply_stimuli(&mut self, tick: u64) -> Result<()> {
        let dt_s = self.params.dt_ms / 1000.0;

        for stimulus in &self.stimuli {
            let op = match *stimulus {
                Stimulus::Constant {
                    population,
                    amplitude,
                    start_tick,
                    duration,
                } => {
                    if !Stimulus::active(start_tick, duration, tick) {
                        continue;
                    }
                    let size = self.context.population(population)?.size();
                    DeferredOp::InjectCurrent {
                        population,
                        offsets: (0..size).collect(),
                        amounts: vec![amplitude; size],
                    }
                }
                Stimulus::Poisson {
                    population,
                    rate_hz,
                    amplitude,
                    start_tick,
                    duration,
                } => {
                    if !Stimulus::active(start_tick, duration, tick) {
                        continue;
                    }
                    let size = self.context.population(population)?.size();
                    let probability = (rate_hz * dt_s).min(1.0);
                    let rng = self.context.rng_mut();
                    let offsets: Vec<usize> = (0..size)
                        .filter(|_| rng.gen::<f32>() < probability)
                        .collect();
                    if offsets.is_empty() {
                        continue;
                    }
                    let amounts = vec![amplitude; offsets.len()];
                    DeferredOp::InjectCurrent {
                        population,
                        offsets,
                        amounts,
                    }
                }
                Stimulus::RewardPulse { at_tick, amount } => {
                    if at_tick != tick {
                        continue;
                    }
                    DeferredOp::SetReward {
                        network: self.network,
                        reward: amount,
                    }
                }
            };
            self.context.enqueue(op)?;
        }
        Ok(())
    }

    /// Record final mean weights
    fn record_final_weights(&self, results: &mut SimulationResult) -> Result<()> {
        for &group in self.context.network(self.network)?.groups() {
            let name = self
                .context
                .group_name(group)
                .ok_or_else(|| RuntimeError::stale_handle("synapse group", group))?;
            let mean = self.context.group(group)?.mean_weight();
            results.final_mean_weights.insert(name.to_owned(), mean);
        }
        Ok(())
    }

    fn population_name(&self, population: PopulationId) -> Result<String> {
        self.context
            .population_name(population)
            .map(str::to_owned)
            .ok_or_else(|| RuntimeError::stale_handle("population", population))
    }

    /// Get reference to the context
    pub fn context(&self) -> &SimContext {
        &self.context
    }

    /// Get mutable reference to the context
    pub fn context_mut(&mut self) -> &mut SimContext {
        &mut self.context
    }

    /// Give the context back
    pub fn into_context(self) -> SimContext {
        self.context
    }

    /// Network being simulated
    pub fn network(&self) -> NetworkId {
        self.network
    }

    /// Get simulation parameters
    pub fn params(&self) -> &SimulationParams {
        &self.params
    }
}

fn check_finite(parameter: &str, value: f32) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(RuntimeError::invalid_parameter(parameter, value.to_string(), "finite"))
    }
}

/// Run a fixed-step simulation of `network` without stimuli
pub fn run_fixed_step(
    context: SimContext,
    network: NetworkId,
    ticks: u64,
    dt_ms: f32,
) -> Result<(SimulationResult, SimContext)> {
    let params = SimulationParams::new(ticks, dt_ms)?;
    let mut engine = SimulationEngine::new(context, network, params)?;
    let results = engine.run()?;
    Ok((results, engine.into_context()))
}
