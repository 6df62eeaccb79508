//! Brocatel CLI - story compiler.
//!
//! Provides commands for:
//! - `compile`: Compile a story into a Lua bundle
//! - `check`: Report problems without writing anything

mod commands;
mod error;
mod output;

use std::future::Future;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{CheckArgs, CompileArgs};
use error::CliError;
use output::Output;

/// Brocatel - interactive fiction compiler.
#[derive(Parser)]
#[command(name = "brocatel", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a story and its linked files into a bundle.
    Compile(CompileArgs),
    /// Compile a story and report problems.
    Check(CheckArgs),
}

impl Commands {
    fn verbose(&self) -> bool {
        match self {
            Self::Compile(args) => args.verbose,
            Self::Check(args) => args.verbose,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    // --verbose enables INFO level, otherwise use RUST_LOG
    let filter = if cli.command.verbose() {
        EnvFilter::new("info")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Compile(args) => block_on(args.execute()),
        Commands::Check(args) => block_on(args.execute()),
    };

    if let Err(err) = result {
        output.error(&err);
        std::process::exit(1);
    }
}

fn block_on(future: impl Future<Output = Result<(), CliError>>) -> Result<(), CliError> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(future)
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_compile() {
        let cli = Cli::try_parse_from([
            "brocatel",
            "compile",
            "intro",
            "-o",
            "out.lua",
            "--debug",
            "--gettext",
            "intro.pot",
            "-v",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Compile(_)));
        assert!(cli.command.verbose());
    }

    #[test]
    fn test_parse_check_defaults() {
        let cli = Cli::try_parse_from(["brocatel", "check"]).unwrap();
        assert!(matches!(cli.command, Commands::Check(_)));
        assert!(!cli.command.verbose());
    }
}
