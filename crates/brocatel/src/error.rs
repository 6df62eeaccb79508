//! CLI error types.

use brocatel_config::ConfigError;
use brocatel_mdc::CompileError;

/// CLI error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Compile(#[from] CompileError),

    #[error("{0} problem(s) found")]
    Diagnostics(usize),
}
