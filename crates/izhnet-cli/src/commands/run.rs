//! Reservoir run command

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::Args;
use izhnet_runtime::simulation::{PerfReport, RecordedSpike};
use izhnet_runtime::{NetworkStats, SimulationEngine, SimulationResult};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::RunConfig;
use crate::error::{CliError, CliResult};
use crate::reservoir::{self, Reservoir};

/// Build a reservoir and run it
#[derive(Args, Debug)]
pub struct RunCommand {
    /// Run configuration (TOML); defaults are used when omitted
    pub config: Option<PathBuf>,

    /// Override the seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Override the number of ticks
    #[arg(long)]
    pub ticks: Option<u64>,

    /// Include every recorded spike in the output
    #[arg(long)]
    pub spikes: bool,

    /// Write the JSON summary here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Per-population figures in a run summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopulationSummary {
    pub id: String,
    pub size: usize,
    pub spikes: u64,
    pub rate_hz: f32,
    pub homeostatic_scale: f32,
}

/// JSON document printed by `izhnet run`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub seed: u64,
    pub steps_executed: u64,
    pub duration_ms: f32,
    pub cancelled: bool,
    pub populations: Vec<PopulationSummary>,
    pub final_mean_weights: BTreeMap<String, f32>,
    pub stats: NetworkStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub perf: Option<PerfReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spikes: Option<Vec<RecordedSpike>>,
    pub spikes_truncated: bool,
}

impl RunCommand {
    /// Resolve the file and command-line overrides into one configuration
    pub fn resolve_config(&self) -> CliResult<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::load_from_file(path)?,
            None => RunConfig::default(),
        };
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(ticks) = self.ticks {
            config.ticks = ticks;
        }
        if self.spikes {
            config.record_spikes = true;
        }
        config.validate()?;
        Ok(config)
    }

    pub async fn execute(self) -> CliResult<()> {
        let config = self.resolve_config()?;
        let reservoir = reservoir::build(&config)?;
        info!("Running {} ticks with seed {}", config.ticks, config.seed);

        let Reservoir {
            mut engine,
            network,
            excitatory,
            inhibitory,
            ..
        } = reservoir;

        // Ctrl-C requests cancellation at the next tick boundary
        let cancel = engine.cancel_flag();
        let watcher = tokio::spawn(async move {
            debug!("Watching for interrupts");
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping at the next tick");
                cancel.cancel();
            }
        });

        let run = tokio::task::spawn_blocking(move || -> CliResult<(SimulationEngine, SimulationResult)> {
            let result = engine.run()?;
            Ok((engine, result))
        })
        .await
        .map_err(|e| anyhow::anyhow!("simulation task failed: {}", e));
        watcher.abort();
        let (engine, result) = run??;

        let summary = summarize(&config, &engine, network, &[excitatory, inhibitory], result, self.spikes)?;
        self.report(&summary)
    }

    /// Emit the summary; a cancelled run still reports, then fails
    fn report(&self, summary: &RunSummary) -> CliResult<()> {
        let json = serde_json::to_string_pretty(summary)?;
        match &self.output {
            Some(path) => {
                std::fs::write(path, json)?;
                info!("Summary written to {}", path.display());
            }
            None => println!("{}", json),
        }

        if summary.cancelled {
            warn!("Run cancelled after {} steps; partial results reported", summary.steps_executed);
            return Err(CliError::Cancelled);
        }
        Ok(())
    }
}

/// Collect the figures reported for a finished run
pub fn summarize(
    config: &RunConfig,
    engine: &SimulationEngine,
    network: izhnet_runtime::NetworkId,
    populations: &[izhnet_runtime::PopulationId],
    result: SimulationResult,
    include_spikes: bool,
) -> CliResult<RunSummary> {
    let ctx = engine.context();
    let mut rows = Vec::with_capacity(populations.len());
    for &population in populations {
        let id = ctx
            .population_name(population)
            .ok_or_else(|| CliError::config(format!("{} has no id", population)))?
            .to_string();
        let size = ctx.population(population)?.size();
        rows.push(PopulationSummary {
            spikes: result.spike_counts.get(&id).copied().unwrap_or(0),
            rate_hz: result.firing_rate(&id, size),
            homeostatic_scale: ctx.homeostatic_scale(network, population)?,
            id,
            size,
        });
    }

    Ok(RunSummary {
        seed: config.seed,
        steps_executed: result.steps_executed,
        duration_ms: result.duration_ms,
        cancelled: result.cancelled,
        populations: rows,
        stats: ctx.stats(network)?,
        perf: result.perf,
        spikes_truncated: result.spikes_truncated,
        spikes: include_spikes.then_some(result.spikes),
        final_mean_weights: result.final_mean_weights,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(config: Option<PathBuf>) -> RunCommand {
        RunCommand {
            config,
            seed: Some(7),
            ticks: Some(30),
            spikes: true,
            output: None,
        }
    }

    #[test]
    fn overrides_apply_on_top_of_defaults() {
        let config = command(None).resolve_config().unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.ticks, 30);
        assert!(config.record_spikes);
        assert_eq!(config.excitatory, 80);
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = command(Some(PathBuf::from("/nonexistent/izhnet.toml")))
            .resolve_config()
            .unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }

    #[test]
    fn cancelled_run_reports_then_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("partial.json");
        let config = RunConfig {
            ticks: 500,
            excitatory: 8,
            inhibitory: 2,
            ..Default::default()
        };
        let Reservoir {
            mut engine,
            network,
            excitatory,
            inhibitory,
            ..
        } = reservoir::build(&config).unwrap();
        engine.cancel_flag().cancel();
        let result = engine.run().unwrap();

        let summary = summarize(&config, &engine, network, &[excitatory, inhibitory], result, false).unwrap();
        let command = RunCommand {
            output: Some(out.clone()),
            ..command(None)
        };
        assert!(matches!(command.report(&summary), Err(CliError::Cancelled)));

        let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(written["cancelled"], true);
        assert_eq!(written["steps_executed"], 0);
    }

    #[test]
    fn summary_covers_both_populations() {
        let config = RunConfig {
            ticks: 25,
            excitatory: 16,
            inhibitory: 4,
            ..Default::default()
        };
        let Reservoir {
            mut engine,
            network,
            excitatory,
            inhibitory,
            ..
        } = reservoir::build(&config).unwrap();
        let result = engine.run().unwrap();
        let total = result.total_spikes();

        let summary = summarize(&config, &engine, network, &[excitatory, inhibitory], result, false).unwrap();
        assert_eq!(summary.steps_executed, 25);
        assert_eq!(summary.populations.len(), 2);
        assert_eq!(summary.populations[0].id, "exc");
        assert_eq!(summary.populations[1].size, 4);
        assert_eq!(summary.populations.iter().map(|p| p.spikes).sum::<u64>(), total);
        assert!(summary.populations.iter().all(|p| p.homeostatic_scale == 1.0));
        assert_eq!(summary.final_mean_weights.len(), 4);
        assert!(summary.spikes.is_none());
        assert_eq!(summary.stats.timestep, 25);
    }
}
