//! Izhikevich neuron populations
//!
//! A population is a block of neurons sharing one Dale's-Law sign, stored as
//! parallel per-neuron arrays. The model is
//!
//! ```text
//! dv/dt = 0.04·v² + 5·v + 140 − u + I
//! du/dt = a·(b·v − u)
//! if v ≥ 30 mV: v ← c, u ← u + d
//! ```
//!
//! The quadratic term makes a single Euler step at 1 ms unstable, so every
//! integration call is split into [`INTEGRATION_SUBSTEPS`] sub-steps.

use crate::error::{Result, RuntimeError};
use crate::registry::{PopulationId, SlotKind};
use rand::Rng;
use rand_distr::StandardNormal;
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Spike threshold (mV), fixed for every population
pub const SPIKE_THRESHOLD_MV: f32 = 30.0;

/// Initial membrane potential (mV)
pub const RESTING_POTENTIAL_MV: f32 = -65.0;

/// Euler sub-steps per integration call
pub const INTEGRATION_SUBSTEPS: usize = 4;

/// Populations at least this large integrate on the rayon pool
#[cfg(feature = "parallel")]
pub const PARALLEL_THRESHOLD: usize = 4096;

/// Weight bounds for synapses leaving an excitatory population
pub const EXCITATORY_WEIGHT_BOUNDS: (f32, f32) = (0.0, 0.5);

/// Weight bounds for synapses leaving an inhibitory population
pub const INHIBITORY_WEIGHT_BOUNDS: (f32, f32) = (-1.0, 0.0);

/// The four Izhikevich dynamics constants
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IzhikevichParams {
    /// Recovery time scale
    pub a: f32,
    /// Recovery sensitivity to subthreshold voltage
    pub b: f32,
    /// After-spike voltage reset (mV)
    pub c: f32,
    /// After-spike recovery increment
    pub d: f32,
}

impl IzhikevichParams {
    /// Create new parameters with validation
    pub fn new(a: f32, b: f32, c: f32, d: f32) -> Result<Self> {
        if !(a.is_finite() && a > 0.0) {
            return Err(RuntimeError::invalid_parameter("a", a.to_string(), "> 0.0"));
        }
        if !b.is_finite() {
            return Err(RuntimeError::invalid_parameter("b", b.to_string(), "finite"));
        }
        if !(c.is_finite() && c < SPIKE_THRESHOLD_MV) {
            return Err(RuntimeError::invalid_parameter(
                "c",
                c.to_string(),
                format!("< {} (spike threshold)", SPIKE_THRESHOLD_MV),
            ));
        }
        if !d.is_finite() {
            return Err(RuntimeError::invalid_parameter("d", d.to_string(), "finite"));
        }

        Ok(Self { a, b, c, d })
    }

    /// Validate parameters
    pub fn validate(&self) -> Result<()> {
        Self::new(self.a, self.b, self.c, self.d)?;
        Ok(())
    }
}

impl Default for IzhikevichParams {
    fn default() -> Self {
        NeuronPreset::RegularSpiking.params()
    }
}

/// Named neuron types
///
/// The preset decides the population's Dale's-Law sign unless the caller
/// overrides it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum NeuronPreset {
    /// Regular spiking cortical pyramidal cell
    RegularSpiking,
    /// Intrinsically bursting
    IntrinsicallyBursting,
    /// Chattering (fast rhythmic bursts)
    Chattering,
    /// Fast-spiking interneuron
    FastSpiking,
    /// Low-threshold spiking interneuron
    LowThresholdSpiking,
}

impl NeuronPreset {
    /// Every preset, excitatory first
    pub const ALL: [NeuronPreset; 5] = [
        Self::RegularSpiking,
        Self::IntrinsicallyBursting,
        Self::Chattering,
        Self::FastSpiking,
        Self::LowThresholdSpiking,
    ];

    /// Dynamics constants for this preset
    pub fn params(self) -> IzhikevichParams {
        let (a, b, c, d) = match self {
            Self::RegularSpiking => (0.02, 0.2, -65.0, 8.0),
            Self::IntrinsicallyBursting => (0.02, 0.2, -55.0, 4.0),
            Self::Chattering => (0.02, 0.2, -50.0, 2.0),
            Self::FastSpiking => (0.1, 0.2, -65.0, 2.0),
            Self::LowThresholdSpiking => (0.02, 0.25, -65.0, 2.0),
        };
        IzhikevichParams { a, b, c, d }
    }

    /// Whether the preset comes from the excitatory table
    pub fn is_excitatory(self) -> bool {
        matches!(
            self,
            Self::RegularSpiking | Self::IntrinsicallyBursting | Self::Chattering
        )
    }

    /// Short conventional name (RS, IB, ...)
    pub fn short_name(self) -> &'static str {
        match self {
            Self::RegularSpiking => "RS",
            Self::IntrinsicallyBursting => "IB",
            Self::Chattering => "CH",
            Self::FastSpiking => "FS",
            Self::LowThresholdSpiking => "LTS",
        }
    }

    /// Long snake_case name (regular_spiking, ...)
    pub fn long_name(self) -> &'static str {
        match self {
            Self::RegularSpiking => "regular_spiking",
            Self::IntrinsicallyBursting => "intrinsically_bursting",
            Self::Chattering => "chattering",
            Self::FastSpiking => "fast_spiking",
            Self::LowThresholdSpiking => "low_threshold_spiking",
        }
    }
}

impl FromStr for NeuronPreset {
    type Err = RuntimeError;

    fn from_str(name: &str) -> Result<Self> {
        let normalized = name.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .iter()
            .copied()
            .find(|preset| {
                preset.short_name().eq_ignore_ascii_case(&normalized)
                    || preset.long_name() == normalized
            })
            .ok_or_else(|| RuntimeError::UnknownPreset {
                name: name.to_owned(),
            })
    }
}

impl fmt::Display for NeuronPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Per-population overrides applied on top of a preset
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PopulationOptions {
    /// Force the Dale's-Law sign instead of deriving it from the preset
    pub excitatory: Option<bool>,
    /// Standard deviation of per-sub-step Gaussian background current
    pub noise_amplitude: f32,
    /// Override for `a`
    pub a: Option<f32>,
    /// Override for `b`
    pub b: Option<f32>,
    /// Override for `c`
    pub c: Option<f32>,
    /// Override for `d`
    pub d: Option<f32>,
}

impl PopulationOptions {
    /// Force the excitatory flag
    pub fn with_excitatory(mut self, excitatory: bool) -> Self {
        self.excitatory = Some(excitatory);
        self
    }

    /// Set the background noise amplitude
    pub fn with_noise(mut self, amplitude: f32) -> Self {
        self.noise_amplitude = amplitude;
        self
    }

    /// Override all four dynamics constants
    pub fn with_params(mut self, params: IzhikevichParams) -> Self {
        self.a = Some(params.a);
        self.b = Some(params.b);
        self.c = Some(params.c);
        self.d = Some(params.d);
        self
    }

    fn resolve(&self, preset: NeuronPreset) -> Result<(IzhikevichParams, bool)> {
        let base = preset.params();
        let params = IzhikevichParams::new(
            self.a.unwrap_or(base.a),
            self.b.unwrap_or(base.b),
            self.c.unwrap_or(base.c),
            self.d.unwrap_or(base.d),
        )?;
        let excitatory = self.excitatory.unwrap_or_else(|| preset.is_excitatory());
        Ok((params, excitatory))
    }
}

/// A block of Izhikevich neurons
#[derive(Debug, Clone, Default)]
pub struct Population {
    size: usize,
    excitatory: bool,
    preset: Option<NeuronPreset>,
    voltage: Vec<f32>,
    recovery: Vec<f32>,
    current: Vec<f32>,
    fired: Vec<bool>,
    a: Vec<f32>,
    b: Vec<f32>,
    c: Vec<f32>,
    d: Vec<f32>,
    noise_amplitude: f32,
    noise: Vec<f32>,
    total_spikes: u64,
}

impl SlotKind for Population {
    const KIND: &'static str = "population";
    type Key = PopulationId;
}

impl Population {
    /// Create a population of `size` neurons from a preset
    pub fn new(size: usize, preset: NeuronPreset, options: &PopulationOptions) -> Result<Self> {
        if size == 0 {
            return Err(RuntimeError::invalid_parameter("size", "0", "> 0"));
        }
        if !(options.noise_amplitude.is_finite() && options.noise_amplitude >= 0.0) {
            return Err(RuntimeError::invalid_parameter(
                "noise_amplitude",
                options.noise_amplitude.to_string(),
                ">= 0.0",
            ));
        }

        let (params, excitatory) = options.resolve(preset)?;

        let mut population = Self {
            size,
            excitatory,
            preset: Some(preset),
            voltage: vec![0.0; size],
            recovery: vec![0.0; size],
            current: vec![0.0; size],
            fired: vec![false; size],
            a: vec![params.a; size],
            b: vec![params.b; size],
            c: vec![params.c; size],
            d: vec![params.d; size],
            noise_amplitude: options.noise_amplitude,
            noise: Vec::new(),
            total_spikes: 0,
        };
        population.reset_state();
        Ok(population)
    }

    /// Neuron count
    pub fn size(&self) -> usize {
        self.size
    }

    /// Dale's-Law sign
    pub fn is_excitatory(&self) -> bool {
        self.excitatory
    }

    /// Preset the population was built from
    pub fn preset(&self) -> Option<NeuronPreset> {
        self.preset
    }

    /// Membrane potentials (mV)
    pub fn voltage(&self) -> &[f32] {
        &self.voltage
    }

    /// Recovery variables
    pub fn recovery(&self) -> &[f32] {
        &self.recovery
    }

    /// Pending input current for the next integration
    pub fn current(&self) -> &[f32] {
        &self.current
    }

    /// Spike mask from the most recent integration
    pub fn fired(&self) -> &[bool] {
        &self.fired
    }

    /// Dynamics constants of neuron `offset`
    pub fn params_of(&self, offset: usize) -> Option<IzhikevichParams> {
        (offset < self.size).then(|| IzhikevichParams {
            a: self.a[offset],
            b: self.b[offset],
            c: self.c[offset],
            d: self.d[offset],
        })
    }

    /// Background noise amplitude
    pub fn noise_amplitude(&self) -> f32 {
        self.noise_amplitude
    }

    /// Change the background noise amplitude
    pub fn set_noise_amplitude(&mut self, amplitude: f32) -> Result<()> {
        if !(amplitude.is_finite() && amplitude >= 0.0) {
            return Err(RuntimeError::invalid_parameter(
                "noise_amplitude",
                amplitude.to_string(),
                ">= 0.0",
            ));
        }
        self.noise_amplitude = amplitude;
        Ok(())
    }

    /// Number of neurons that fired in the most recent integration
    pub fn spike_count(&self) -> usize {
        self.fired.iter().filter(|&&fired| fired).count()
    }

    /// Spikes emitted since creation or the last state reset
    pub fn total_spikes(&self) -> u64 {
        self.total_spikes
    }

    /// Weight bounds for synapses this population sends
    pub fn weight_bounds(&self) -> (f32, f32) {
        if self.excitatory {
            EXCITATORY_WEIGHT_BOUNDS
        } else {
            INHIBITORY_WEIGHT_BOUNDS
        }
    }

    /// Add `amounts[k]` to the current of neuron `offsets[k]`
    ///
    /// Repeated offsets and repeated calls accumulate until the next
    /// integration. Validation happens before any write.
    pub fn inject_current(&mut self, offsets: &[usize], amounts: &[f32]) -> Result<()> {
        self.check_injection(offsets, amounts)?;
        for (&offset, &amount) in offsets.iter().zip(amounts) {
            self.current[offset] += amount;
        }
        Ok(())
    }

    /// Add the same current to every neuron
    pub fn inject_uniform(&mut self, amount: f32) -> Result<()> {
        check_finite_current(amount)?;
        for current in &mut self.current {
            *current += amount;
        }
        Ok(())
    }

    pub(crate) fn check_injection(&self, offsets: &[usize], amounts: &[f32]) -> Result<()> {
        if offsets.len() != amounts.len() {
            return Err(RuntimeError::shape_mismatch(
                "inject_current",
                "offsets",
                offsets.len(),
                "amounts",
                amounts.len(),
            ));
        }
        if let Some(&bad) = offsets.iter().find(|&&offset| offset >= self.size) {
            return Err(RuntimeError::out_of_bounds("inject_current", bad, self.size));
        }
        amounts.iter().try_for_each(|&amount| check_finite_current(amount))
    }

    pub(crate) fn current_mut(&mut self) -> &mut [f32] {
        &mut self.current
    }

    /// Advance every neuron by `dt` milliseconds
    ///
    /// With `noise` present and a non-zero amplitude, each sub-step adds a
    /// Gaussian sample to the neuron's current. The current is zeroed when
    /// the call returns; `fired` holds whether each neuron spiked at any
    /// sub-step. Returns the number of neurons that fired.
    pub fn integrate<R: Rng>(&mut self, dt: f32, noise: Option<&mut R>) -> Result<usize> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(RuntimeError::invalid_parameter("dt", dt.to_string(), "> 0.0"));
        }

        let substep = dt / INTEGRATION_SUBSTEPS as f32;
        let amplitude = self.noise_amplitude;
        let with_noise = match noise {
            Some(rng) if amplitude > 0.0 => {
                // Drawn up front and in neuron order so the serial and
                // parallel paths consume the RNG identically.
                self.noise.clear();
                self.noise.extend(
                    (0..self.size * INTEGRATION_SUBSTEPS)
                        .map(|_| amplitude * rng.sample::<f32, _>(StandardNormal)),
                );
                true
            }
            _ => false,
        };

        let noise = with_noise.then_some(self.noise.as_slice());
        let (a, b, c, d) = (&self.a, &self.b, &self.c, &self.d);
        let update = move |(index, (((v, u), i), fired)): (
            usize,
            (((&mut f32, &mut f32), &mut f32), &mut bool),
        )| {
            let samples = noise.map(|n| {
                &n[index * INTEGRATION_SUBSTEPS..(index + 1) * INTEGRATION_SUBSTEPS]
            });
            *fired = advance_neuron(
                v,
                u,
                i,
                (a[index], b[index], c[index], d[index]),
                samples,
                substep,
            );
        };

        #[cfg(feature = "parallel")]
        if self.size >= PARALLEL_THRESHOLD {
            self.voltage
                .par_iter_mut()
                .zip(self.recovery.par_iter_mut())
                .zip(self.current.par_iter_mut())
                .zip(self.fired.par_iter_mut())
                .enumerate()
                .for_each(update);
            return Ok(self.finish_integration());
        }

        self.voltage
            .iter_mut()
            .zip(self.recovery.iter_mut())
            .zip(self.current.iter_mut())
            .zip(self.fired.iter_mut())
            .enumerate()
            .for_each(update);

        Ok(self.finish_integration())
    }

    fn finish_integration(&mut self) -> usize {
        let spikes = self.spike_count();
        self.total_spikes += spikes as u64;
        spikes
    }

    /// Restore resting dynamics, clear current, spikes and the spike counter
    pub fn reset_state(&mut self) {
        for (index, (v, u)) in self
            .voltage
            .iter_mut()
            .zip(self.recovery.iter_mut())
            .enumerate()
        {
            *v = RESTING_POTENTIAL_MV;
            *u = self.b[index] * RESTING_POTENTIAL_MV;
        }
        self.current.iter_mut().for_each(|i| *i = 0.0);
        self.fired.iter_mut().for_each(|f| *f = false);
        self.total_spikes = 0;
    }
}

/// Run the sub-stepped Euler update for one neuron, returning whether it spiked
#[inline]
fn advance_neuron(
    v: &mut f32,
    u: &mut f32,
    current: &mut f32,
    (a, b, c, d): (f32, f32, f32, f32),
    noise: Option<&[f32]>,
    substep: f32,
) -> bool {
    let mut spiked = false;

    for s in 0..INTEGRATION_SUBSTEPS {
        if let Some(samples) = noise {
            *current += samples[s];
        }

        let dv = 0.04 * *v * *v + 5.0 * *v + 140.0 - *u + *current;
        let du = a * (b * *v - *u);
        *v += dv * substep;
        *u += du * substep;

        if *v >= SPIKE_THRESHOLD_MV {
            spiked = true;
            *v = c;
            *u += d;
        }
    }

    debug_assert!(
        v.is_finite() && u.is_finite(),
        "neuron state diverged: v={} u={}",
        v,
        u
    );

    *current = 0.0;
    spiked
}

fn check_finite_current(amount: f32) -> Result<()> {
    if amount.is_finite() {
        Ok(())
    } else {
        Err(RuntimeError::numerical_error(format!(
            "injected current {} is not finite",
            amount
        )))
    }
}
