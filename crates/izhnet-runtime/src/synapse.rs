//! Sparse synapse groups
//!
//! A group connects one presynaptic population to one postsynaptic
//! population through `S` synapses stored as three parallel arrays
//! (`pre_indices`, `post_indices`, `weights`). Transmission and learning are
//! O(S) and never materialize a dense matrix.
//!
//! Weight signs follow the presynaptic population (Dale's Law): every write
//! to `weights` clips into `[min_weight, max_weight]`, and those bounds never
//! straddle zero in the wrong direction.

use crate::error::{Result, RuntimeError};
use crate::neuron::Population;
use crate::plasticity::{
    validate_bounds, StdpParams, SynapseKind, ELIGIBILITY_DECAY,
    ELIGIBILITY_RETAINED_AFTER_REWARD, TRACE_INCREMENT,
};
use crate::registry::SlotKind;
use crate::{GroupId, PopulationId};
use rand::Rng;

/// Options for creating a synapse group
///
/// Everything left as `None` is derived from the presynaptic population.
#[derive(Debug, Clone, PartialEq)]
pub struct SynapseOptions {
    /// Selects the default STDP table; derived from the presynaptic sign
    pub kind: Option<SynapseKind>,
    /// `(min_weight, max_weight)` override; must respect the presynaptic sign
    pub bounds: Option<(f32, f32)>,
    /// Explicit initial weights (clipped into bounds)
    pub weights: Option<Vec<f32>>,
    /// STDP constants override
    pub stdp: Option<StdpParams>,
    /// Whether learning operations run
    pub plastic: bool,
}

impl Default for SynapseOptions {
    fn default() -> Self {
        Self {
            kind: None,
            bounds: None,
            weights: None,
            stdp: None,
            plastic: true,
        }
    }
}

impl SynapseOptions {
    /// Use explicit initial weights
    pub fn with_weights(mut self, weights: Vec<f32>) -> Self {
        self.weights = Some(weights);
        self
    }

    /// Override weight bounds
    pub fn with_bounds(mut self, min: f32, max: f32) -> Self {
        self.bounds = Some((min, max));
        self
    }

    /// Override STDP constants
    pub fn with_stdp(mut self, stdp: StdpParams) -> Self {
        self.stdp = Some(stdp);
        self
    }

    /// Turn learning on or off
    pub fn with_plastic(mut self, plastic: bool) -> Self {
        self.plastic = plastic;
        self
    }
}

/// Sparse connectivity, weights and learning state between two populations
#[derive(Debug, Clone, Default)]
pub struct SynapseGroup {
    pre: PopulationId,
    post: PopulationId,
    pre_size: usize,
    post_size: usize,
    kind: SynapseKind,
    pre_indices: Vec<usize>,
    post_indices: Vec<usize>,
    weights: Vec<f32>,
    min_weight: f32,
    max_weight: f32,
    pre_trace: Vec<f32>,
    post_trace: Vec<f32>,
    eligibility: Vec<f32>,
    stdp: StdpParams,
    pre_decay: f32,
    post_decay: f32,
    plastic: bool,
    contributions: Vec<f32>,
}

impl SlotKind for SynapseGroup {
    const KIND: &'static str = "synapse group";
    type Key = GroupId;
}

impl SynapseGroup {
    /// Build a group between two populations
    ///
    /// Fails with `ShapeMismatch` when the index arrays (or explicit weights)
    /// differ in length and with `IndexOutOfBounds` when an index falls
    /// outside its population.
    #[allow(clippy::too_many_arguments)]
    pub fn new<R: Rng>(
        pre: PopulationId,
        pre_population: &Population,
        post: PopulationId,
        post_population: &Population,
        pre_indices: Vec<usize>,
        post_indices: Vec<usize>,
        options: SynapseOptions,
        rng: &mut R,
    ) -> Result<Self> {
        if pre_indices.len() != post_indices.len() {
            return Err(RuntimeError::shape_mismatch(
                "synapse group",
                "pre_indices",
                pre_indices.len(),
                "post_indices",
                post_indices.len(),
            ));
        }

        let pre_size = pre_population.size();
        let post_size = post_population.size();
        if let Some(&bad) = pre_indices.iter().find(|&&i| i >= pre_size) {
            return Err(RuntimeError::out_of_bounds("synapse pre_indices", bad, pre_size));
        }
        if let Some(&bad) = post_indices.iter().find(|&&i| i >= post_size) {
            return Err(RuntimeError::out_of_bounds("synapse post_indices", bad, post_size));
        }

        let excitatory = pre_population.is_excitatory();
        let kind = options
            .kind
            .unwrap_or_else(|| SynapseKind::from_presynaptic(excitatory));

        let (min_weight, max_weight) = match options.bounds {
            Some((min, max)) => {
                validate_bounds(min, max, excitatory)?;
                (min, max)
            }
            None => pre_population.weight_bounds(),
        };

        let stdp = options.stdp.unwrap_or_else(|| kind.default_stdp());
        stdp.validate()?;
        let (pre_decay, post_decay) = stdp.decay_factors();

        let count = pre_indices.len();
        let weights = match options.weights {
            Some(weights) if weights.len() != count => {
                return Err(RuntimeError::shape_mismatch(
                    "synapse group",
                    "weights",
                    weights.len(),
                    "pre_indices",
                    count,
                ));
            }
            Some(mut weights) => {
                if let Some(bad) = weights.iter().find(|w| !w.is_finite()) {
                    return Err(RuntimeError::invalid_parameter(
                        "weights",
                        bad.to_string(),
                        "finite",
                    ));
                }
                weights
                    .iter_mut()
                    .for_each(|w| *w = w.clamp(min_weight, max_weight));
                weights
            }
            None => (0..count)
                .map(|_| rng.gen_range(min_weight..=max_weight))
                .collect(),
        };

        Ok(Self {
            pre,
            post,
            pre_size,
            post_size,
            kind,
            pre_indices,
            post_indices,
            weights,
            min_weight,
            max_weight,
            pre_trace: vec![0.0; pre_size],
            post_trace: vec![0.0; post_size],
            eligibility: vec![0.0; count],
            stdp,
            pre_decay,
            post_decay,
            plastic: options.plastic,
            contributions: vec![0.0; count],
        })
    }

    /// Presynaptic population
    pub fn pre(&self) -> PopulationId {
        self.pre
    }

    /// Postsynaptic population
    pub fn post(&self) -> PopulationId {
        self.post
    }

    /// Synapse kind
    pub fn kind(&self) -> SynapseKind {
        self.kind
    }

    /// Synapse count
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    /// Whether the group has no synapses
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Presynaptic neuron of each synapse
    pub fn pre_indices(&self) -> &[usize] {
        &self.pre_indices
    }

    /// Postsynaptic neuron of each synapse
    pub fn post_indices(&self) -> &[usize] {
        &self.post_indices
    }

    /// Current weights
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Pending credit per synapse
    pub fn eligibility(&self) -> &[f32] {
        &self.eligibility
    }

    /// Presynaptic spike trace
    pub fn pre_trace(&self) -> &[f32] {
        &self.pre_trace
    }

    /// Postsynaptic spike trace
    pub fn post_trace(&self) -> &[f32] {
        &self.post_trace
    }

    /// `(min_weight, max_weight)`
    pub fn bounds(&self) -> (f32, f32) {
        (self.min_weight, self.max_weight)
    }

    /// STDP constants
    pub fn stdp(&self) -> &StdpParams {
        &self.stdp
    }

    /// Precomputed `(pre, post)` trace decay factors
    pub fn decay_factors(&self) -> (f32, f32) {
        (self.pre_decay, self.post_decay)
    }

    /// Whether learning operations run
    pub fn is_plastic(&self) -> bool {
        self.plastic
    }

    /// Turn learning on or off
    pub fn set_plastic(&mut self, plastic: bool) {
        self.plastic = plastic;
    }

    /// Mean weight (0 for an empty group)
    pub fn mean_weight(&self) -> f32 {
        if self.weights.is_empty() {
            return 0.0;
        }
        self.weights.iter().sum::<f32>() / self.weights.len() as f32
    }

    /// Sum of absolute eligibility
    pub fn total_abs_eligibility(&self) -> f32 {
        self.eligibility.iter().map(|e| e.abs()).sum()
    }

    fn check_population(&self, population: &Population, expected: usize, role: &'static str) -> Result<()> {
        if population.size() != expected {
            return Err(RuntimeError::shape_mismatch(
                role,
                "population size",
                population.size(),
                "group size",
                expected,
            ));
        }
        Ok(())
    }

    /// Gather this tick's per-synapse contribution from the presynaptic spikes
    pub(crate) fn gather(&mut self, pre: &Population) -> Result<()> {
        self.check_population(pre, self.pre_size, "transmit (pre)")?;
        let fired = pre.fired();
        for ((contribution, &pre_index), &weight) in self
            .contributions
            .iter_mut()
            .zip(&self.pre_indices)
            .zip(&self.weights)
        {
            *contribution = if fired[pre_index] { weight } else { 0.0 };
        }
        Ok(())
    }

    /// Scatter-add the gathered contributions into the postsynaptic current
    pub(crate) fn deliver(&self, post: &mut Population) -> Result<()> {
        self.check_population(post, self.post_size, "transmit (post)")?;
        let current = post.current_mut();
        for (&post_index, &contribution) in self.post_indices.iter().zip(&self.contributions) {
            current[post_index] += contribution;
        }
        Ok(())
    }

    /// Decay both traces and bump them where a neuron fired
    pub(crate) fn update_traces(&mut self, pre: &Population, post: &Population) -> Result<()> {
        if !self.plastic {
            return Ok(());
        }
        self.check_population(pre, self.pre_size, "update_traces (pre)")?;
        self.check_population(post, self.post_size, "update_traces (post)")?;

        decay_and_bump(&mut self.pre_trace, pre.fired(), self.pre_decay);
        decay_and_bump(&mut self.post_trace, post.fired(), self.post_decay);
        Ok(())
    }

    /// Fold this tick's STDP change into the eligibility buffer
    ///
    /// With `direct_update` the change is also written straight into the
    /// weights, bypassing the reward gate.
    pub(crate) fn apply_stdp(&mut self, pre: &Population, post: &Population, direct_update: bool) -> Result<()> {
        if !self.plastic {
            return Ok(());
        }
        self.check_population(pre, self.pre_size, "apply_stdp (pre)")?;
        self.check_population(post, self.post_size, "apply_stdp (post)")?;

        let (pre_fired, post_fired) = (pre.fired(), post.fired());
        let StdpParams { a_plus, a_minus, .. } = self.stdp;
        let (min, max) = (self.min_weight, self.max_weight);

        for s in 0..self.weights.len() {
            let i = self.pre_indices[s];
            let j = self.post_indices[s];

            let ltp = if post_fired[j] { a_plus * self.pre_trace[i] } else { 0.0 };
            let ltd = if pre_fired[i] { -a_minus * self.post_trace[j] } else { 0.0 };
            let dw = ltp + ltd;

            self.eligibility[s] = self.eligibility[s] * ELIGIBILITY_DECAY + dw;
            if direct_update {
                self.weights[s] = clip(self.weights[s] + dw, min, max);
            }
        }
        Ok(())
    }

    /// Convert pending credit into weight change scaled by `reward`
    ///
    /// Half of the eligibility survives, so one pulse does not erase all
    /// pending credit.
    pub fn apply_reward(&mut self, reward: f32) {
        if !self.plastic {
            return;
        }
        let (min, max) = (self.min_weight, self.max_weight);
        for (weight, eligibility) in self.weights.iter_mut().zip(self.eligibility.iter_mut()) {
            *weight = clip(*weight + *eligibility * reward, min, max);
            *eligibility *= ELIGIBILITY_RETAINED_AFTER_REWARD;
        }
    }

    /// Zero traces and eligibility
    pub fn reset_learning(&mut self) {
        self.pre_trace.iter_mut().for_each(|t| *t = 0.0);
        self.post_trace.iter_mut().for_each(|t| *t = 0.0);
        self.eligibility.iter_mut().for_each(|e| *e = 0.0);
    }

    /// Redraw every weight uniformly within bounds
    pub fn reset_weights<R: Rng>(&mut self, rng: &mut R) {
        let (min, max) = (self.min_weight, self.max_weight);
        self.weights
            .iter_mut()
            .for_each(|w| *w = rng.gen_range(min..=max));
    }

    /// Multiply every weight by `factor`, then clip
    pub fn scale_weights(&mut self, factor: f32) {
        let (min, max) = (self.min_weight, self.max_weight);
        self.weights
            .iter_mut()
            .for_each(|w| *w = clip(*w * factor, min, max));
    }
}

fn decay_and_bump(trace: &mut [f32], fired: &[bool], decay: f32) {
    for (value, &spiked) in trace.iter_mut().zip(fired) {
        *value *= decay;
        if spiked {
            *value += TRACE_INCREMENT;
        }
    }
}

#[inline]
fn clip(weight: f32, min: f32, max: f32) -> f32 {
    debug_assert!(weight.is_finite(), "synaptic weight diverged: {}", weight);
    weight.clamp(min, max)
}
