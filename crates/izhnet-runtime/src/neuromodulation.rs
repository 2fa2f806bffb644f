//! Global neuromodulators
//!
//! Four diffuse signals that can be attached to a network. When attached,
//! the combined plasticity gate replaces the network's legacy scalar reward
//! as the third factor of the learning rule.
//!
//! ```rust
//! use izhnet_runtime::neuromodulation::{Modulator, NeuromodulationSystem};
//!
//! let mut system = NeuromodulationSystem::new();
//! assert_eq!(system.plasticity_gate(), 0.0);
//!
//! system.release(Modulator::Dopamine, 0.5);
//! assert!(system.plasticity_gate() > 0.0);
//!
//! for _ in 0..500 {
//!     system.decay();
//! }
//! assert!(system.plasticity_gate().abs() < 1e-3);
//! ```

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Ceiling on any modulator level
pub const MAX_LEVEL: f32 = 2.0;

/// Learning rate of the running reward prediction
pub const PREDICTION_LEARNING_RATE: f32 = 0.1;

/// Per-decay retention of the recent-release accumulator
const RECENT_RELEASE_RETENTION: f32 = 0.9;

/// Scale applied to a negative prediction error when suppressing dopamine
const SUPPRESSION_GAIN: f32 = 0.5;

/// Neuromodulator kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Modulator {
    /// Reward prediction error
    Dopamine,
    /// Arousal
    Norepinephrine,
    /// Attention, gates plasticity
    Acetylcholine,
    /// Baseline mood
    Serotonin,
}

impl Modulator {
    /// Every kind, in storage order
    pub const ALL: [Modulator; 4] = [
        Modulator::Dopamine,
        Modulator::Norepinephrine,
        Modulator::Acetylcholine,
        Modulator::Serotonin,
    ];

    /// `(baseline, decay_rate, max_release)`
    pub fn constants(self) -> (f32, f32, f32) {
        match self {
            Modulator::Dopamine => (0.5, 0.05, 1.5),
            Modulator::Norepinephrine => (0.3, 0.08, 1.2),
            Modulator::Acetylcholine => (0.5, 0.03, 1.0),
            Modulator::Serotonin => (0.7, 0.02, 0.8),
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

/// A single modulator's level and release history
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModulatorState {
    /// Current level, in `[0, MAX_LEVEL]`
    pub level: f32,
    /// Resting level
    pub baseline: f32,
    /// Fraction of the distance to baseline removed per decay
    pub decay_rate: f32,
    /// Level gained from a unit release with no saturation
    pub max_release: f32,
    recent_release: f32,
}

impl ModulatorState {
    fn new(kind: Modulator) -> Self {
        let (baseline, decay_rate, max_release) = kind.constants();
        Self {
            level: baseline,
            baseline,
            decay_rate,
            max_release,
            recent_release: 0.0,
        }
    }

    fn release(&mut self, amount: f32) {
        let amount = amount.clamp(0.0, 1.0);
        let saturation = 1.0 / (1.0 + self.recent_release);
        self.level = (self.level + amount * self.max_release * saturation).min(MAX_LEVEL);
        self.recent_release += amount;
    }

    fn decay(&mut self) {
        self.level -= (self.level - self.baseline) * self.decay_rate;
        self.recent_release *= RECENT_RELEASE_RETENTION;
    }

    /// Level relative to baseline
    pub fn normalized(&self) -> f32 {
        (self.level - self.baseline) / self.baseline
    }
}

/// Snapshot of every level
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NeuromodulationStats {
    /// Dopamine level
    pub dopamine: f32,
    /// Norepinephrine level
    pub norepinephrine: f32,
    /// Acetylcholine level
    pub acetylcholine: f32,
    /// Serotonin level
    pub serotonin: f32,
    /// Running reward prediction
    pub reward_prediction: f32,
    /// Combined plasticity gate
    pub plasticity_gate: f32,
}

/// The four modulators plus a running reward predictor
#[derive(Debug, Clone, PartialEq)]
pub struct NeuromodulationSystem {
    modulators: [ModulatorState; 4],
    reward_prediction: f32,
}

impl NeuromodulationSystem {
    /// All modulators at baseline, no reward expectation
    pub fn new() -> Self {
        Self {
            modulators: Modulator::ALL.map(ModulatorState::new),
            reward_prediction: 0.0,
        }
    }

    /// Release `amount` (clamped to `[0, 1]`) of a modulator
    ///
    /// Releases in quick succession saturate: each one is scaled by
    /// `1 / (1 + recent_release)`.
    pub fn release(&mut self, kind: Modulator, amount: f32) {
        self.modulators[kind.slot()].release(amount);
    }

    /// Feed an observed reward and return the prediction error
    ///
    /// A positive error releases dopamine; a negative one pushes dopamine
    /// below its current level (floored at zero).
    pub fn process_reward(&mut self, reward: f32) -> f32 {
        let error = reward - self.reward_prediction;
        self.reward_prediction += PREDICTION_LEARNING_RATE * error;

        if error > 0.0 {
            self.release(Modulator::Dopamine, error.min(1.0));
        } else {
            let dopamine = &mut self.modulators[Modulator::Dopamine.slot()];
            dopamine.level = (dopamine.level + error * SUPPRESSION_GAIN).max(0.0);
        }
        error
    }

    /// Novelty releases norepinephrine and acetylcholine
    pub fn process_novelty(&mut self, novelty: f32) {
        self.release(Modulator::Norepinephrine, novelty * 0.8);
        self.release(Modulator::Acetylcholine, novelty * 0.5);
    }

    /// Move every level one step toward its baseline
    pub fn decay(&mut self) {
        self.modulators.iter_mut().for_each(ModulatorState::decay);
    }

    /// Current level of a modulator
    pub fn level(&self, kind: Modulator) -> f32 {
        self.modulators[kind.slot()].level
    }

    /// Full state of a modulator
    pub fn state(&self, kind: Modulator) -> &ModulatorState {
        &self.modulators[kind.slot()]
    }

    /// Running reward prediction
    pub fn reward_prediction(&self) -> f32 {
        self.reward_prediction
    }

    /// Signed reward for the learning rule
    ///
    /// Dopamine's deviation from baseline scaled by acetylcholine relative to
    /// its baseline. Zero when dopamine rests at baseline.
    pub fn plasticity_gate(&self) -> f32 {
        let dopamine = self.state(Modulator::Dopamine);
        let acetylcholine = self.state(Modulator::Acetylcholine);
        (dopamine.level - dopamine.baseline) * (acetylcholine.level / acetylcholine.baseline)
    }

    /// Snapshot of every level
    pub fn stats(&self) -> NeuromodulationStats {
        NeuromodulationStats {
            dopamine: self.level(Modulator::Dopamine),
            norepinephrine: self.level(Modulator::Norepinephrine),
            acetylcholine: self.level(Modulator::Acetylcholine),
            serotonin: self.level(Modulator::Serotonin),
            reward_prediction: self.reward_prediction,
            plasticity_gate: self.plasticity_gate(),
        }
    }

    /// Back to baseline with no reward expectation
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for NeuromodulationSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_at_baseline() {
        let system = NeuromodulationSystem::new();
        for kind in Modulator::ALL {
            let state = system.state(kind);
            assert_eq!(state.level, state.baseline);
            assert_eq!(state.normalized(), 0.0);
        }
        assert_eq!(system.plasticity_gate(), 0.0);
    }

    #[test]
    fn test_release_saturates_and_caps() {
        let mut system = NeuromodulationSystem::new();
        system.release(Modulator::Dopamine, 0.2);
        let first_gain = system.level(Modulator::Dopamine) - 0.5;
        system.release(Modulator::Dopamine, 0.2);
        let second_gain = system.level(Modulator::Dopamine) - 0.5 - first_gain;
        assert!(second_gain < first_gain);

        for _ in 0..50 {
            system.release(Modulator::Dopamine, 5.0);
        }
        assert!(system.level(Modulator::Dopamine) <= MAX_LEVEL);
    }

    #[test]
    fn test_release_clamps_negative_amount() {
        let mut system = NeuromodulationSystem::new();
        system.release(Modulator::Serotonin, -1.0);
        assert_eq!(system.level(Modulator::Serotonin), 0.7);
    }

    #[test]
    fn test_decay_returns_to_baseline() {
        let mut system = NeuromodulationSystem::new();
        system.release(Modulator::Norepinephrine, 1.0);
        for _ in 0..500 {
            system.decay();
        }
        assert!((system.level(Modulator::Norepinephrine) - 0.3).abs() < 1e-4);
    }

    #[test]
    fn test_reward_prediction_error() {
        let mut system = NeuromodulationSystem::new();
        let error = system.process_reward(1.0);
        assert_eq!(error, 1.0);
        assert!((system.reward_prediction() - 0.1).abs() < 1e-6);
        assert!(system.plasticity_gate() > 0.0);

        system.reset();
        let error = system.process_reward(-1.0);
        assert_eq!(error, -1.0);
        assert!(system.plasticity_gate() < 0.0);
        assert!(system.level(Modulator::Dopamine) >= 0.0);
    }

    #[test]
    fn test_expected_reward_releases_less() {
        let mut system = NeuromodulationSystem::new();
        let first = system.process_reward(0.8);
        for _ in 0..30 {
            system.process_reward(0.8);
        }
        let later = system.process_reward(0.8);
        assert!(later < first);
    }

    #[test]
    fn test_acetylcholine_amplifies_gate() {
        let mut plain = NeuromodulationSystem::new();
        plain.release(Modulator::Dopamine, 0.5);

        let mut attentive = plain.clone();
        attentive.process_novelty(1.0);

        assert!(attentive.plasticity_gate() > plain.plasticity_gate());
    }
}
