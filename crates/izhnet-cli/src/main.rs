//! # izhnet CLI
//!
//! Runs excitatory/inhibitory reservoir simulations from a TOML
//! description and reports spike statistics and learned weights as JSON.

use clap::Parser;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use izhnet_cli::error::CliResult;
use izhnet_cli::IzhnetCli;

#[tokio::main]
async fn main() -> CliResult<()> {
    let cli = IzhnetCli::parse();

    // Logging goes to stderr so JSON on stdout stays clean
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Err(err) = cli.execute().await {
        error!("Command failed: {}", err);
        std::process::exit(1);
    }

    Ok(())
}
