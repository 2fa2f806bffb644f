//! Configuration template command

use clap::Args;
use std::path::PathBuf;
use tracing::info;

use crate::config::DEFAULT_RUN_CONFIG;
use crate::error::{CliError, CliResult};

/// Write the default run configuration
#[derive(Args, Debug)]
pub struct InitConfigCommand {
    /// Destination file
    #[arg(default_value = "izhnet.toml")]
    pub path: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

impl InitConfigCommand {
    pub fn execute(self) -> CliResult<()> {
        if self.path.exists() && !self.force {
            return Err(CliError::invalid_args(format!(
                "{} already exists (use --force to overwrite)",
                self.path.display()
            )));
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, DEFAULT_RUN_CONFIG)?;
        info!("Wrote {}", self.path.display());
        Ok(())
    }
}
