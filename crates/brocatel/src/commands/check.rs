//! `brocatel check` command implementation.

use std::path::PathBuf;

use brocatel_config::{CliSettings, Config};
use clap::Args;

use super::link_story;
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the check command.
#[derive(Args)]
pub(crate) struct CheckArgs {
    /// Entry file stem (overrides config).
    entry: Option<String>,

    /// Path to configuration file (default: auto-discover brocatel.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Story source directory (overrides config).
    #[arg(short, long)]
    source_dir: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CheckArgs {
    /// Execute the check command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails, the story cannot be compiled,
    /// or any diagnostic is reported.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = CliSettings {
            source_dir: self.source_dir,
            entry: self.entry,
            ..Default::default()
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;

        let bundle = link_story(&config).await?;
        output.diagnostics(&bundle.diagnostics);
        output.summary("Checked", bundle.files.len(), bundle.diagnostics.len());
        if !bundle.is_clean() {
            return Err(CliError::Diagnostics(bundle.diagnostics.len()));
        }
        Ok(())
    }
}
