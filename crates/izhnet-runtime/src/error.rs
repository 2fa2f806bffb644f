//! Error types for the izhnet runtime

use thiserror::Error;

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors that can occur in the izhnet runtime
///
/// Missing lookups by id are not errors: they surface as `Option` from the
/// registry. Everything here is either a caller bug (shape, bounds, stale
/// handle) or an invalid configuration, and is reported before any shared
/// array is touched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    /// Parallel arrays of unequal length
    #[error("Shape mismatch in {context}: {left_name} has {left} entries but {right_name} has {right}")]
    ShapeMismatch {
        /// Operation that detected the mismatch
        context: &'static str,
        /// Name of the first array
        left_name: &'static str,
        /// Length of the first array
        left: usize,
        /// Name of the second array
        right_name: &'static str,
        /// Length of the second array
        right: usize,
    },

    /// Neuron index outside a population
    #[error("Index {index} out of bounds for {context} (size {bound})")]
    IndexOutOfBounds {
        /// Operation that detected the bad index
        context: &'static str,
        /// Offending index
        index: usize,
        /// Exclusive upper bound
        bound: usize,
    },

    /// Handle whose slot was released (and possibly reused)
    #[error("Stale {kind} handle {handle} is no longer live")]
    StaleHandle {
        /// Object kind the handle refers to
        kind: &'static str,
        /// Slot and version carried by the handle
        handle: String,
    },

    /// Unknown neuron preset name
    #[error("Unknown neuron preset '{name}'")]
    UnknownPreset {
        /// Name that failed to parse
        name: String,
    },

    /// Invalid parameter value
    #[error("Invalid parameter {parameter}: {value} (expected {constraint})")]
    InvalidParameter {
        /// Parameter name
        parameter: String,
        /// Invalid value
        value: String,
        /// Constraint description
        constraint: String,
    },

    /// Invalid network configuration
    #[error("Invalid network configuration: {reason}")]
    InvalidConfiguration {
        /// Reason for invalid configuration
        reason: String,
    },

    /// Simulation step failed
    #[error("Simulation step failed at tick {tick}: {reason}")]
    SimulationStep {
        /// Tick at which the step failed
        tick: u64,
        /// Reason for failure
        reason: String,
    },

    /// Numerical computation error
    #[error("Numerical error: {reason}")]
    NumericalError {
        /// Reason for numerical error
        reason: String,
    },
}

impl RuntimeError {
    /// Create a shape mismatch error
    pub fn shape_mismatch(
        context: &'static str,
        left_name: &'static str,
        left: usize,
        right_name: &'static str,
        right: usize,
    ) -> Self {
        Self::ShapeMismatch {
            context,
            left_name,
            left,
            right_name,
            right,
        }
    }

    /// Create an index out of bounds error
    pub fn out_of_bounds(context: &'static str, index: usize, bound: usize) -> Self {
        Self::IndexOutOfBounds {
            context,
            index,
            bound,
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(
        parameter: impl Into<String>,
        value: impl Into<String>,
        constraint: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            value: value.into(),
            constraint: constraint.into(),
        }
    }

    /// Create a stale handle error
    pub fn stale_handle<K: slotmap::Key>(kind: &'static str, key: K) -> Self {
        Self::StaleHandle {
            kind,
            handle: format!("{:?}", key.data()),
        }
    }

    /// Create a simulation step error
    pub fn simulation_step(tick: u64, reason: impl Into<String>) -> Self {
        Self::SimulationStep {
            tick,
            reason: reason.into(),
        }
    }

    /// Create a numerical error
    pub fn numerical_error(reason: impl Into<String>) -> Self {
        Self::NumericalError {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = RuntimeError::invalid_config("empty network");
        assert!(matches!(err, RuntimeError::InvalidConfiguration { .. }));

        let err = RuntimeError::invalid_parameter("tau_plus", "0.0", "> 0.0");
        assert!(matches!(err, RuntimeError::InvalidParameter { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = RuntimeError::shape_mismatch("synapse group", "pre_indices", 3, "post_indices", 2);
        let msg = format!("{}", err);
        assert!(msg.contains("pre_indices has 3"));
        assert!(msg.contains("post_indices has 2"));

        let err = RuntimeError::StaleHandle {
            kind: "population",
            handle: "4v3".to_string(),
        };
        assert!(err.to_string().contains("population handle 4v3"));
    }
}
