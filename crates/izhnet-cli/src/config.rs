//! Run configuration for the reservoir driver

use std::path::Path;

use izhnet_runtime::{NetworkConfig, NeuronPreset};
use serde::{Deserialize, Serialize};

use crate::error::{CliError, CliResult};

/// Template written by `izhnet init-config`; parses to [`RunConfig::default`]
pub const DEFAULT_RUN_CONFIG: &str = r#"# izhnet run configuration
seed = 42
ticks = 1000            # ticks to simulate
dt_ms = 1.0             # tick length (ms)

# Reservoir shape
excitatory = 80
inhibitory = 20
excitatory_preset = "RS"  # RS, IB or CH
inhibitory_preset = "FS"  # FS or LTS
density = 0.1             # connection probability per ordered pair
excitatory_noise = 5.0    # std-dev of background current (exc)
inhibitory_noise = 2.0    # std-dev of background current (inh)

# Regulate the excitatory population toward a firing rate (Hz)
# homeostasis_target_hz = 5.0

record_spikes = false
perf = false

[input]
rate_hz = 20.0          # Poisson pulse rate per excitatory neuron
amplitude = 10.0        # current per pulse
start_tick = 0
# duration = 500        # ticks; omit to drive the whole run

[network]
reward_epsilon = 0.0001
reward_decay = 0.9
homeostasis_interval = 100
homeostasis_tau = 1000.0
homeostasis_min_scale = 0.5
homeostasis_max_scale = 2.0
homeostasis_enabled = false
inject_noise = true

# Reward pulses set the network reward at a given tick
# [[rewards]]
# tick = 500
# amount = 1.0
"#;

/// Poisson drive into the excitatory population
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputConfig {
    /// Pulse rate per neuron (Hz); zero disables the drive
    pub rate_hz: f32,
    /// Current per pulse
    pub amplitude: f32,
    /// First driven tick
    pub start_tick: u64,
    /// Ticks driven; `None` drives until the end of the run
    pub duration: Option<u64>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            rate_hz: 20.0,
            amplitude: 10.0,
            start_tick: 0,
            duration: None,
        }
    }
}

/// A reward delivered at one tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RewardEvent {
    /// Tick at which the reward is set
    pub tick: u64,
    /// Reward value
    pub amount: f32,
}

/// Everything `izhnet run` needs to build and drive a reservoir
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Seed for connectivity, initial weights and noise
    pub seed: u64,
    /// Ticks to simulate
    pub ticks: u64,
    /// Tick length (ms)
    pub dt_ms: f32,
    /// Excitatory population size
    pub excitatory: usize,
    /// Inhibitory population size
    pub inhibitory: usize,
    /// Preset name for the excitatory population
    pub excitatory_preset: String,
    /// Preset name for the inhibitory population
    pub inhibitory_preset: String,
    /// Connection probability per ordered pair
    pub density: f32,
    /// Background noise amplitude of the excitatory population
    pub excitatory_noise: f32,
    /// Background noise amplitude of the inhibitory population
    pub inhibitory_noise: f32,
    /// Homeostatic target rate for the excitatory population
    pub homeostasis_target_hz: Option<f32>,
    /// Record individual spikes
    pub record_spikes: bool,
    /// Sample per-step timing
    pub perf: bool,
    /// External drive
    pub input: InputConfig,
    /// Network-level parameters
    pub network: NetworkConfig,
    /// Scheduled reward pulses
    pub rewards: Vec<RewardEvent>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            ticks: 1000,
            dt_ms: 1.0,
            excitatory: 80,
            inhibitory: 20,
            excitatory_preset: "RS".to_string(),
            inhibitory_preset: "FS".to_string(),
            density: 0.1,
            excitatory_noise: 5.0,
            inhibitory_noise: 2.0,
            homeostasis_target_hz: None,
            record_spikes: false,
            perf: false,
            input: InputConfig::default(),
            network: NetworkConfig::default(),
            rewards: Vec::new(),
        }
    }
}

impl RunConfig {
    /// Load and validate a configuration file
    pub fn load_from_file(path: &Path) -> CliResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CliError::config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolved `(excitatory, inhibitory)` presets
    pub fn presets(&self) -> CliResult<(NeuronPreset, NeuronPreset)> {
        let excitatory: NeuronPreset = self.excitatory_preset.parse()?;
        let inhibitory: NeuronPreset = self.inhibitory_preset.parse()?;
        if !excitatory.is_excitatory() {
            return Err(CliError::config(format!(
                "excitatory_preset {} is an inhibitory preset",
                excitatory.long_name()
            )));
        }
        if inhibitory.is_excitatory() {
            return Err(CliError::config(format!(
                "inhibitory_preset {} is an excitatory preset",
                inhibitory.long_name()
            )));
        }
        Ok((excitatory, inhibitory))
    }

    /// Check the configuration before anything is allocated
    pub fn validate(&self) -> CliResult<()> {
        if self.ticks == 0 {
            return Err(CliError::config("ticks must be > 0"));
        }
        if !(self.dt_ms.is_finite() && self.dt_ms > 0.0) {
            return Err(CliError::config(format!("dt_ms must be > 0, got {}", self.dt_ms)));
        }
        if self.excitatory == 0 || self.inhibitory == 0 {
            return Err(CliError::config("population sizes must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.density) {
            return Err(CliError::config(format!(
                "density must be in [0, 1], got {}",
                self.density
            )));
        }
        for (name, value) in [
            ("excitatory_noise", self.excitatory_noise),
            ("inhibitory_noise", self.inhibitory_noise),
            ("input.rate_hz", self.input.rate_hz),
            ("input.amplitude", self.input.amplitude),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(CliError::config(format!("{} must be >= 0, got {}", name, value)));
            }
        }
        if let Some(target) = self.homeostasis_target_hz {
            if !(target.is_finite() && target > 0.0) {
                return Err(CliError::config(format!(
                    "homeostasis_target_hz must be > 0, got {}",
                    target
                )));
            }
        }
        if let Some(reward) = self.rewards.iter().find(|r| !r.amount.is_finite()) {
            return Err(CliError::config(format!(
                "reward at tick {} is not finite",
                reward.tick
            )));
        }
        self.presets()?;
        self.network.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_matches_defaults() {
        let parsed: RunConfig = toml::from_str(DEFAULT_RUN_CONFIG).unwrap();
        assert_eq!(parsed, RunConfig::default());
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn partial_file_uses_defaults() {
        let parsed: RunConfig = toml::from_str("ticks = 50\n[network]\ninject_noise = false\n").unwrap();
        assert_eq!(parsed.ticks, 50);
        assert_eq!(parsed.excitatory, 80);
        assert!(!parsed.network.inject_noise);
        assert_eq!(parsed.network.reward_decay, 0.9);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(toml::from_str::<RunConfig>("neurons = 10\n").is_err());
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("broken.toml");
        std::fs::write(&path, "ticks = [unclosed\n").unwrap();

        let err = RunConfig::load_from_file(&path).unwrap_err();
        assert!(matches!(err, CliError::Toml(_)));
        assert!(err.to_string().starts_with("Parse error"));
    }

    #[test]
    fn rewards_parse_as_array_of_tables() {
        let parsed: RunConfig =
            toml::from_str("[[rewards]]\ntick = 10\namount = 1.5\n[[rewards]]\ntick = 20\namount = -1.0\n")
                .unwrap();
        assert_eq!(
            parsed.rewards,
            vec![
                RewardEvent { tick: 10, amount: 1.5 },
                RewardEvent { tick: 20, amount: -1.0 },
            ]
        );
    }

    #[test]
    fn preset_signs_are_checked() {
        let mut config = RunConfig {
            excitatory_preset: "FS".into(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(CliError::Config(_))));

        config.excitatory_preset = "chattering".into();
        config.inhibitory_preset = "lts".into();
        assert!(config.validate().is_ok());

        config.inhibitory_preset = "XX".into();
        assert!(matches!(config.validate(), Err(CliError::Runtime(_))));
    }

    #[test]
    fn bad_values_are_rejected() {
        let cases = [
            RunConfig { ticks: 0, ..Default::default() },
            RunConfig { dt_ms: 0.0, ..Default::default() },
            RunConfig { inhibitory: 0, ..Default::default() },
            RunConfig { density: 1.5, ..Default::default() },
            RunConfig { excitatory_noise: -1.0, ..Default::default() },
            RunConfig { homeostasis_target_hz: Some(0.0), ..Default::default() },
        ];
        for config in cases {
            assert!(config.validate().is_err(), "{:?}", config);
        }
    }
}
