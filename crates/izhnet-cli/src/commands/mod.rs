//! CLI command implementations for izhnet

use clap::{Parser, Subcommand};

use crate::error::CliResult;

pub mod init_config;
pub mod presets;
pub mod run;

/// izhnet - spiking reservoir simulations with reward-modulated STDP
#[derive(Parser, Debug)]
#[command(
    name = "izhnet",
    version,
    about = "Spiking reservoir simulations with reward-modulated STDP",
    long_about = "izhnet builds excitatory/inhibitory Izhikevich reservoirs from a TOML \
                  description, drives them with Poisson input and reward pulses, and \
                  reports spike statistics and learned weights as JSON."
)]
pub struct IzhnetCli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build and run a reservoir
    Run(run::RunCommand),

    /// List neuron presets
    Presets(presets::PresetsCommand),

    /// Write a commented run configuration
    #[command(alias = "init")]
    InitConfig(init_config::InitConfigCommand),
}

impl IzhnetCli {
    /// Execute the CLI command
    pub async fn execute(self) -> CliResult<()> {
        match self.command {
            Commands::Run(cmd) => cmd.execute().await,
            Commands::Presets(cmd) => cmd.execute(),
            Commands::InitConfig(cmd) => cmd.execute(),
        }
    }
}
