//! Automatic paragraph breaks.
//!
//! With `auto_new_line`, every source line is its own paragraph: a separator
//! line is inserted between consecutive non-blank lines before parsing, and
//! node positions are mapped back to the original lines afterwards.

use brocatel_md::{Node, Position};
use serde::Serialize;

/// Where original lines ended up after separator insertion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LineMapping {
    /// 0-based original line numbers.
    pub original: Vec<usize>,
    /// 1-based line in the rewritten source where each original line starts.
    pub new_lines: Vec<usize>,
}

impl LineMapping {
    /// Maps a 1-based line of the rewritten source to the original line.
    #[must_use]
    pub fn original_line(&self, line: usize) -> usize {
        let index = self.new_lines.partition_point(|&start| start <= line);
        match index.checked_sub(1).and_then(|i| self.original.get(i)) {
            Some(original) => original + 1,
            None => line,
        }
    }

    /// Rewrites every position under `root` to original line numbers.
    pub fn remap(&self, root: &mut Node) {
        root.map_positions(&mut |position: &mut Position| {
            position.start.line = self.original_line(position.start.line);
            position.end.line = self.original_line(position.end.line);
        });
    }
}

fn fence_marker(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    ["```", "~~~"]
        .into_iter()
        .find(|marker| trimmed.starts_with(marker))
}

/// Leading `>` markers of a quoted line, e.g. `> >` for `> > text`.
fn quote_prefix(line: &str) -> &str {
    let end = line
        .char_indices()
        .take_while(|(_, c)| *c == '>' || c.is_whitespace())
        .last()
        .map_or(0, |(i, c)| i + c.len_utf8());
    line[..end].trim_end()
}

fn is_blank(line: &str) -> bool {
    let prefix = quote_prefix(line);
    line[prefix.len()..].trim().is_empty()
}

/// Inserts separator lines so that each non-blank line becomes a paragraph.
///
/// Fenced code and front matter are kept verbatim. Inside block quotes the
/// separator carries the quote markers so the quote is not interrupted.
#[must_use]
pub fn auto_new_line(source: &str) -> (String, LineMapping) {
    let mut out: Vec<String> = Vec::new();
    let mut mapping = LineMapping::default();
    let mut fence: Option<&str> = None;
    let mut front_matter = false;
    let mut previous_content = false;

    for (i, line) in source.lines().enumerate() {
        if i == 0 && line.trim_end() == "---" {
            front_matter = true;
        } else if front_matter {
            if line.trim_end() == "---" {
                front_matter = false;
            }
        } else if let Some(marker) = fence {
            if line.trim_start().starts_with(marker) {
                fence = None;
            }
        } else {
            let blank = is_blank(line);
            if previous_content && !blank {
                let prefix = quote_prefix(line);
                let previous_prefix = out.last().map_or("", |l| quote_prefix(l));
                if !prefix.is_empty() && !previous_prefix.is_empty() {
                    out.push(prefix.to_owned());
                } else {
                    out.push(String::new());
                }
            }
            fence = fence_marker(line);
            previous_content = !blank && fence.is_none();
        }
        mapping.original.push(i);
        mapping.new_lines.push(out.len() + 1);
        out.push(line.to_owned());
    }

    let mut text = out.join("\n");
    if source.ends_with('\n') {
        text.push('\n');
    }
    (text, mapping)
}
