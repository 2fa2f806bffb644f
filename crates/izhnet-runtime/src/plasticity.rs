//! Plasticity parameters for three-factor learning
//!
//! Learning is trace based: each group keeps a leaky pre- and post-synaptic
//! spike trace, turns trace/spike coincidences into a candidate weight change
//! every tick, and parks that change in a decaying eligibility buffer until a
//! reward signal scales it into the weights.

use crate::error::{Result, RuntimeError};
use crate::neuron::{EXCITATORY_WEIGHT_BOUNDS, INHIBITORY_WEIGHT_BOUNDS};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Per-tick decay of the eligibility buffer
pub const ELIGIBILITY_DECAY: f32 = 0.95;

/// Fraction of eligibility left after a reward is applied
pub const ELIGIBILITY_RETAINED_AFTER_REWARD: f32 = 0.5;

/// Trace increment for a neuron that fired this tick
pub const TRACE_INCREMENT: f32 = 1.0;

/// Synapse type, which selects the default learning constants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SynapseKind {
    /// Sent by an excitatory population
    #[default]
    Excitatory,
    /// Sent by an inhibitory population
    Inhibitory,
}

impl SynapseKind {
    /// Kind matching a presynaptic population's sign
    pub fn from_presynaptic(excitatory: bool) -> Self {
        if excitatory {
            Self::Excitatory
        } else {
            Self::Inhibitory
        }
    }

    /// Default STDP constants for this kind
    pub fn default_stdp(self) -> StdpParams {
        match self {
            Self::Excitatory => StdpParams {
                a_plus: 0.01,
                a_minus: 0.012,
                tau_plus: 20.0,
                tau_minus: 20.0,
            },
            Self::Inhibitory => StdpParams {
                a_plus: 0.005,
                a_minus: 0.006,
                tau_plus: 20.0,
                tau_minus: 20.0,
            },
        }
    }

    /// Default weight bounds for this kind
    pub fn default_bounds(self) -> (f32, f32) {
        match self {
            Self::Excitatory => EXCITATORY_WEIGHT_BOUNDS,
            Self::Inhibitory => INHIBITORY_WEIGHT_BOUNDS,
        }
    }
}

/// Parameters for the trace-based STDP rule
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StdpParams {
    /// Potentiation rate (post fires while the pre trace is high)
    pub a_plus: f32,
    /// Depression rate (pre fires while the post trace is high)
    pub a_minus: f32,
    /// Pre trace time constant (ticks)
    pub tau_plus: f32,
    /// Post trace time constant (ticks)
    pub tau_minus: f32,
}

impl Default for StdpParams {
    fn default() -> Self {
        SynapseKind::Excitatory.default_stdp()
    }
}

impl StdpParams {
    /// Create new STDP parameters with validation
    pub fn new(a_plus: f32, a_minus: f32, tau_plus: f32, tau_minus: f32) -> Result<Self> {
        if !(a_plus.is_finite() && a_plus >= 0.0) {
            return Err(RuntimeError::invalid_parameter(
                "a_plus",
                a_plus.to_string(),
                ">= 0.0",
            ));
        }
        if !(a_minus.is_finite() && a_minus >= 0.0) {
            return Err(RuntimeError::invalid_parameter(
                "a_minus",
                a_minus.to_string(),
                ">= 0.0",
            ));
        }
        if !(tau_plus.is_finite() && tau_plus > 0.0) {
            return Err(RuntimeError::invalid_parameter(
                "tau_plus",
                tau_plus.to_string(),
                "> 0.0",
            ));
        }
        if !(tau_minus.is_finite() && tau_minus > 0.0) {
            return Err(RuntimeError::invalid_parameter(
                "tau_minus",
                tau_minus.to_string(),
                "> 0.0",
            ));
        }

        Ok(Self {
            a_plus,
            a_minus,
            tau_plus,
            tau_minus,
        })
    }

    /// Validate parameters
    pub fn validate(&self) -> Result<()> {
        Self::new(self.a_plus, self.a_minus, self.tau_plus, self.tau_minus)?;
        Ok(())
    }

    /// Per-tick trace decay factors `(exp(-1/tau_plus), exp(-1/tau_minus))`
    pub fn decay_factors(&self) -> (f32, f32) {
        ((-1.0 / self.tau_plus).exp(), (-1.0 / self.tau_minus).exp())
    }
}

/// Check overridden weight bounds against the presynaptic sign
pub fn validate_bounds(min: f32, max: f32, excitatory: bool) -> Result<()> {
    if !(min.is_finite() && max.is_finite()) || min > max {
        return Err(RuntimeError::invalid_parameter(
            "weight bounds",
            format!("[{}, {}]", min, max),
            "finite with min <= max",
        ));
    }
    if excitatory && min < 0.0 {
        return Err(RuntimeError::invalid_parameter(
            "min_weight",
            min.to_string(),
            ">= 0.0 for an excitatory presynaptic population",
        ));
    }
    if !excitatory && max > 0.0 {
        return Err(RuntimeError::invalid_parameter(
            "max_weight",
            max.to_string(),
            "<= 0.0 for an inhibitory presynaptic population",
        ));
    }
    Ok(())
}
