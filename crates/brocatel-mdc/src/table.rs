//! Streaming Lua table writer.
//!
//! Tables are opened lazily: `{` is written when the first item arrives, so a
//! table that stays empty is written as the shared empty-table variable `_`
//! instead. Items are separated by `,\n`, which keeps generated line numbers
//! meaningful for runtime errors. Every token written with a position is
//! recorded as a source mapping.

use std::fmt::Write;

use brocatel_md::Position;

use crate::lua::is_identifier;
use crate::source_map::Mapping;

/// Expression standing for an empty table.
pub(crate) const EMPTY_TABLE: &str = "_";

#[derive(Debug)]
struct TableState {
    opened: bool,
    has_items: bool,
    position: Option<Position>,
}

#[derive(Debug)]
pub(crate) struct TableWriter {
    out: String,
    /// Current 1-based line.
    line: usize,
    /// Current 0-based column.
    column: usize,
    tables: Vec<TableState>,
    /// Whether a key was written and awaits its value.
    paired: bool,
    mappings: Vec<Mapping>,
}

impl TableWriter {
    pub(crate) fn new() -> Self {
        Self {
            out: String::new(),
            line: 1,
            column: 0,
            tables: Vec::new(),
            paired: false,
            mappings: Vec::new(),
        }
    }

    fn emit(&mut self, s: &str, position: Option<Position>) {
        if let Some(position) = position {
            self.mappings.push(Mapping {
                generated_line: self.line,
                generated_column: self.column,
                original: position.start,
            });
        }
        self.out.push_str(s);
        for c in s.chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += 1;
            }
        }
    }

    fn sep(&mut self) {
        if self.paired {
            self.paired = false;
            self.emit("=", None);
            return;
        }
        let Some(top) = self.tables.last_mut() else {
            return;
        };
        let (opened, has_items, position) = (top.opened, top.has_items, top.position);
        top.opened = true;
        top.has_items = true;
        if !opened {
            self.emit("{", position);
        } else if has_items {
            self.emit(",\n", None);
        }
    }

    pub(crate) fn start_table(&mut self, position: Option<Position>) -> &mut Self {
        self.sep();
        self.tables.push(TableState {
            opened: false,
            has_items: false,
            position,
        });
        self
    }

    pub(crate) fn end_table(&mut self) -> &mut Self {
        if let Some(table) = self.tables.pop() {
            if table.opened {
                self.emit("}", None);
            } else {
                self.emit(EMPTY_TABLE, table.position);
            }
        }
        self
    }

    /// Writes a raw Lua expression. An empty string only forces the enclosing
    /// table open, so that it is written as `{}`.
    pub(crate) fn raw(&mut self, raw: &str, position: Option<Position>) -> &mut Self {
        self.sep();
        if !raw.is_empty() {
            self.emit(raw, position);
        }
        self
    }

    pub(crate) fn value(&mut self, value: &str, position: Option<Position>) -> &mut Self {
        self.sep();
        self.emit(&quote(value), position);
        self
    }

    pub(crate) fn pair(&mut self, key: &str) -> &mut Self {
        self.sep();
        self.emit(&table_key(key), None);
        self.paired = true;
        self
    }

    pub(crate) fn finish(self) -> (String, Vec<Mapping>) {
        (self.out, self.mappings)
    }
}

/// A double-quoted Lua string literal.
pub(crate) fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{{{:X}}}", u32::from(c));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// A table key: bare when it is an identifier.
pub(crate) fn table_key(key: &str) -> String {
    if is_identifier(key) {
        key.to_owned()
    } else {
        format!("[{}]", quote(key))
    }
}
