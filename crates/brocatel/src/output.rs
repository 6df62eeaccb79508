//! Terminal reporting for `compile` and `check`.

use std::fmt::Display;
use std::path::Path;

use brocatel_md::Diagnostic;
use console::{Style, Term};

/// Writes progress, diagnostics and summaries to stderr.
pub(crate) struct Output {
    term: Term,
    location: Style,
    problem: Style,
    ok: Style,
    failure: Style,
}

impl Output {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            term: Term::stderr(),
            location: Style::new().bold(),
            problem: Style::new().yellow(),
            ok: Style::new().green(),
            failure: Style::new().red(),
        }
    }

    pub(crate) fn step(&self, msg: &str) {
        let _ = self.term.write_line(msg);
    }

    /// Announce an artifact written to disk, e.g. `Bundle: out/main.lua`.
    pub(crate) fn written(&self, kind: &str, path: &Path) {
        let _ = self.term.write_line(&format!("{kind}: {}", path.display()));
    }

    /// Print diagnostics as `file:line:column: message`, in file order.
    pub(crate) fn diagnostics(&self, diagnostics: &[Diagnostic]) {
        for diagnostic in sorted(diagnostics) {
            let line = match location(diagnostic) {
                Some(location) => format!(
                    "{} {}",
                    self.location.apply_to(location),
                    self.problem.apply_to(&diagnostic.message)
                ),
                None => self.problem.apply_to(&diagnostic.message).to_string(),
            };
            let _ = self.term.write_line(&line);
        }
    }

    /// Final line of a run: green when clean, yellow otherwise.
    pub(crate) fn summary(&self, verb: &str, files: usize, problems: usize) {
        let line = summary_line(verb, files, problems);
        let style = if problems == 0 { &self.ok } else { &self.problem };
        let _ = self.term.write_line(&style.apply_to(line).to_string());
    }

    pub(crate) fn error(&self, err: &impl Display) {
        let _ = self
            .term
            .write_line(&self.failure.apply_to(format!("Error: {err}")).to_string());
    }
}

/// `file:line:column:` prefix, when the diagnostic has one.
fn location(diagnostic: &Diagnostic) -> Option<String> {
    match (&diagnostic.file, &diagnostic.position) {
        (Some(file), Some(position)) => Some(format!(
            "{file}:{}:{}:",
            position.start.line, position.start.column
        )),
        (Some(file), None) => Some(format!("{file}:")),
        (None, Some(position)) => Some(format!("{}:{}:", position.start.line, position.start.column)),
        (None, None) => None,
    }
}

fn sorted(diagnostics: &[Diagnostic]) -> Vec<&Diagnostic> {
    let mut sorted: Vec<&Diagnostic> = diagnostics.iter().collect();
    sorted.sort_by_key(|d| (d.file.clone(), d.position.map(|p| p.start)));
    sorted
}

fn summary_line(verb: &str, files: usize, problems: usize) -> String {
    match problems {
        0 => format!("{verb} {files} file(s), no problems found"),
        n => format!("{verb} {files} file(s), {n} problem(s) found"),
    }
}
