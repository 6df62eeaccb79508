//! Compilation messages.
//!
//! User-input problems never abort a compile. Every stage reports them into a
//! [`Diagnostics`] sink owned by the compilation of one file, and callers
//! inspect the sink afterwards.

use std::fmt;

use serde::Serialize;

use crate::position::Position;

/// A message attached to a source location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub message: String,
    #[serde(rename = "place", skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Diagnostic {
    #[must_use]
    pub fn new(message: impl Into<String>, position: Option<Position>) -> Self {
        Self {
            message: message.into(),
            position,
            file: None,
        }
    }

    #[must_use]
    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(file) = &self.file {
            write!(f, "{file}:")?;
        }
        if let Some(position) = &self.position {
            write!(f, "{}:{}: ", position.start.line, position.start.column)?;
        } else if self.file.is_some() {
            f.write_str(" ")?;
        }
        f.write_str(&self.message)
    }
}

/// Message sink for one compilation.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    messages: Vec<Diagnostic>,
}

impl Diagnostics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a message at `position`.
    pub fn report(&mut self, message: impl Into<String>, position: Option<Position>) {
        let diagnostic = Diagnostic::new(message, position);
        tracing::debug!(%diagnostic, "Diagnostic reported");
        self.messages.push(diagnostic);
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.messages.push(diagnostic);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.messages.iter()
    }

    /// Tags every message with `file` and hands them over.
    #[must_use]
    pub fn into_tagged(self, file: &str) -> Vec<Diagnostic> {
        self.messages
            .into_iter()
            .map(|d| d.with_file(file))
            .collect()
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.messages
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::Point;

    #[test]
    fn test_display_with_file_and_position() {
        let position = Position::new(Point::new(3, 5), Point::new(3, 9));
        let diagnostic = Diagnostic::new("link not found: a", Some(position)).with_file("main.md");
        assert_eq!(diagnostic.to_string(), "main.md:3:5: link not found: a");
    }

    #[test]
    fn test_display_without_position() {
        let diagnostic = Diagnostic::new("cannot load file: b", None).with_file("main.md");
        assert_eq!(diagnostic.to_string(), "main.md: cannot load file: b");
        assert_eq!(Diagnostic::new("oops", None).to_string(), "oops");
    }

    #[test]
    fn test_into_tagged() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.report("a", None);
        diagnostics.report("b", None);
        let tagged = diagnostics.into_tagged("x.md");
        assert!(tagged.iter().all(|d| d.file.as_deref() == Some("x.md")));
        assert_eq!(tagged.len(), 2);
    }
}
