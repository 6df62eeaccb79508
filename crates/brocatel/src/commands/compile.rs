//! `brocatel compile` command implementation.

use std::path::{Path, PathBuf};

use brocatel_config::{CliSettings, Config};
use chrono::Utc;
use clap::Args;

use super::link_story;
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the compile command.
#[derive(Args)]
pub(crate) struct CompileArgs {
    /// Entry file stem (overrides config).
    entry: Option<String>,

    /// Path to configuration file (default: auto-discover brocatel.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Story source directory (overrides config).
    #[arg(short, long)]
    source_dir: Option<PathBuf>,

    /// Bundle output path (overrides config).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Record source positions in the bundle.
    #[arg(long)]
    debug: bool,

    /// Write a translation template to this path (overrides config).
    #[arg(long)]
    gettext: Option<PathBuf>,

    /// Write a source map of the bundle to this path.
    #[arg(long)]
    source_map: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CompileArgs {
    /// Execute the compile command.
    ///
    /// Stories with problems still produce a bundle; the problems are
    /// printed as warnings.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails, the story cannot be compiled,
    /// or an output file cannot be written.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = CliSettings {
            source_dir: self.source_dir,
            entry: self.entry,
            output: self.output,
            debug: self.debug.then_some(true),
            gettext_output: self.gettext,
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;

        output.step(&format!(
            "Compiling {} from {}",
            config.story_resolved.entry,
            config.story_resolved.source_dir.display()
        ));
        let bundle = link_story(&config).await?;
        output.diagnostics(&bundle.diagnostics);

        let bundle_path = config.story_resolved.output_path();
        write_output(&bundle_path, &bundle.code).await?;
        output.written("Bundle", &bundle_path);

        if let Some(path) = &config.gettext_output {
            write_output(path, &bundle.gettext(Utc::now())).await?;
            output.written("Translation template", path);
        }
        if let Some(path) = &self.source_map {
            write_output(path, &bundle.source_map.to_json()).await?;
            output.written("Source map", path);
        }

        output.summary("Compiled", bundle.files.len(), bundle.diagnostics.len());
        Ok(())
    }
}

/// Write `content` to `path`, creating parent directories.
async fn write_output(path: &Path, content: &str) -> Result<(), CliError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content).await?;
    Ok(())
}
