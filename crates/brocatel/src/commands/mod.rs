//! CLI command implementations.

pub(crate) mod check;
pub(crate) mod compile;

pub(crate) use check::CheckArgs;
pub(crate) use compile::CompileArgs;

use brocatel_config::Config;
use brocatel_mdc::{Bundle, Compiler, CompilerOptions, FsFetcher, Linker};
use tracing::info;

use crate::error::CliError;

/// Compiler options from the `[compiler]` section.
fn compiler_options(config: &Config) -> CompilerOptions {
    CompilerOptions {
        debug: config.compiler.debug,
        auto_new_line: config.compiler.auto_new_line,
        split_paragraphs: config.compiler.split_paragraphs,
    }
}

/// Compile and link the configured story from disk.
pub(crate) async fn link_story(config: &Config) -> Result<Bundle, CliError> {
    let story = &config.story_resolved;
    info!(
        entry = %story.entry,
        source_dir = %story.source_dir.display(),
        "linking story"
    );
    let fetcher = FsFetcher::new(story.source_dir.clone());
    let linker = Linker::new(Compiler::new(compiler_options(config)), fetcher);
    Ok(linker.compile_all(&story.entry).await?)
}
