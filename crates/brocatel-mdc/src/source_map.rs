//! Source maps from generated Lua back to Markdown.
//!
//! Mappings are collected while writing tables and can be rendered as a
//! Source Map v3 document. [`lua_error_to_source`] uses them to point Lua
//! runtime errors at the Markdown line that produced the failing code.

use std::sync::LazyLock;

use brocatel_md::Point;
use regex::Regex;
use serde::Serialize;

static LUA_ERROR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":(\d+): (.*)$").unwrap());

const BASE64: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// A generated position and the Markdown point it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Mapping {
    /// 1-based line in the generated code.
    pub generated_line: usize,
    /// 0-based column in the generated code.
    pub generated_column: usize,
    /// 1-based Markdown point.
    pub original: Point,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    mapping: Mapping,
    source: usize,
}

/// Mappings of a whole bundle, across source files.
#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    file: String,
    sources: Vec<String>,
    entries: Vec<Entry>,
}

/// A Lua error traced back to Markdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkdownSourceError {
    pub message: String,
    pub source: String,
    pub start: Point,
}

#[derive(Serialize)]
struct SourceMapJson<'a> {
    version: u8,
    file: &'a str,
    sources: &'a [String],
    names: [&'a str; 0],
    mappings: String,
}

impl SourceMap {
    #[must_use]
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            ..Self::default()
        }
    }

    /// Adds the mappings of code that starts at `line`/`column` of the
    /// generated file. The column offset only applies to the first line.
    pub fn add_source(&mut self, source: &str, mappings: &[Mapping], line: usize, column: usize) {
        let index = match self.sources.iter().position(|s| s == source) {
            Some(index) => index,
            None => {
                self.sources.push(source.to_owned());
                self.sources.len() - 1
            }
        };
        for mapping in mappings {
            let generated_column = if mapping.generated_line == 1 {
                mapping.generated_column + column
            } else {
                mapping.generated_column
            };
            self.entries.push(Entry {
                mapping: Mapping {
                    generated_line: mapping.generated_line + line - 1,
                    generated_column,
                    original: mapping.original,
                },
                source: index,
            });
        }
    }

    fn sorted_entries(&self) -> Vec<Entry> {
        let mut entries = self.entries.clone();
        entries.sort_by_key(|e| (e.mapping.generated_line, e.mapping.generated_column));
        entries
    }

    /// Encodes the mappings field: base64 VLQ segments, `;` between lines.
    #[must_use]
    pub fn encode_mappings(&self) -> String {
        let mut out = String::new();
        let mut line = 1;
        let mut previous_column = 0i64;
        let mut previous_source = 0i64;
        let mut previous_line = 0i64;
        let mut previous_original_column = 0i64;
        let mut first_in_line = true;
        for entry in self.sorted_entries() {
            let mapping = entry.mapping;
            while line < mapping.generated_line {
                out.push(';');
                line += 1;
                previous_column = 0;
                first_in_line = true;
            }
            if !first_in_line {
                out.push(',');
            }
            first_in_line = false;
            let column = to_i64(mapping.generated_column);
            let source = to_i64(entry.source);
            let original_line = to_i64(mapping.original.line.saturating_sub(1));
            let original_column = to_i64(mapping.original.column.saturating_sub(1));
            for delta in [
                column - previous_column,
                source - previous_source,
                original_line - previous_line,
                original_column - previous_original_column,
            ] {
                encode_vlq(delta, &mut out);
            }
            previous_column = column;
            previous_source = source;
            previous_line = original_line;
            previous_original_column = original_column;
        }
        out
    }

    /// Renders the Source Map v3 JSON document.
    #[must_use]
    pub fn to_json(&self) -> String {
        let json = SourceMapJson {
            version: 3,
            file: &self.file,
            sources: &self.sources,
            names: [],
            mappings: self.encode_mappings(),
        };
        serde_json::to_string(&json).unwrap_or_default()
    }

    /// The original point of the first mapping on generated `line`, or of the
    /// closest mapping before it.
    #[must_use]
    pub fn original_for_line(&self, line: usize) -> Option<(&str, Point)> {
        let entries = self.sorted_entries();
        let entry = entries
            .iter()
            .find(|e| e.mapping.generated_line == line)
            .or_else(|| {
                entries
                    .iter()
                    .rev()
                    .find(|e| e.mapping.generated_line < line)
            })?;
        let source = self.sources.get(entry.source)?;
        Some((source.as_str(), entry.mapping.original))
    }
}

fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn encode_vlq(value: i64, out: &mut String) {
    let mut vlq = if value < 0 {
        ((-value) << 1) | 1
    } else {
        value << 1
    };
    loop {
        let mut digit = vlq & 31;
        vlq >>= 5;
        if vlq > 0 {
            digit |= 32;
        }
        out.push(char::from(BASE64[usize::try_from(digit).unwrap_or(0)]));
        if vlq == 0 {
            break;
        }
    }
}

/// Maps a Lua error such as `[string "<input>"]:12: attempt to call a nil
/// value` to the Markdown position that generated line 12.
#[must_use]
pub fn lua_error_to_source(message: &str, map: &SourceMap) -> Option<MarkdownSourceError> {
    let first_line = message.lines().next()?;
    let captures = LUA_ERROR_RE.captures(first_line)?;
    let line: usize = captures[1].parse().ok()?;
    let (source, start) = map.original_for_line(line)?;
    Some(MarkdownSourceError {
        message: captures[2].to_owned(),
        source: source.to_owned(),
        start,
    })
}
