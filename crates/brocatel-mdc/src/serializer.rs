//! Linearizes the intermediate tree into Lua table source.
//!
//! Every scope becomes `{meta, child...}` where `meta` holds the label,
//! registered labels, routine parameters and, in debug builds, child
//! positions. Embedded snippets become closures and are syntax-checked as
//! they are written.

use brocatel_md::{Diagnostics, Position};
use tracing::debug;

use crate::ir::{Array, Element, Func, IfElse, Link, PathSegment, Text};
use crate::lua::ScriptEngine;
use crate::source_map::Mapping;
use crate::table::{TableWriter, quote};

pub(crate) struct Serializer<'a> {
    engine: &'a dyn ScriptEngine,
    diagnostics: &'a mut Diagnostics,
    debug: bool,
    writer: TableWriter,
}

impl<'a> Serializer<'a> {
    pub(crate) fn new(
        engine: &'a dyn ScriptEngine,
        diagnostics: &'a mut Diagnostics,
        debug: bool,
    ) -> Self {
        Self {
            engine,
            diagnostics,
            debug,
            writer: TableWriter::new(),
        }
    }

    /// Writes `root` and returns the code with its source mappings.
    pub(crate) fn serialize(mut self, root: &Array) -> (String, Vec<Mapping>) {
        self.array(root);
        let (code, mappings) = self.writer.finish();
        debug!(bytes = code.len(), mappings = mappings.len(), "serialized");
        (code, mappings)
    }

    fn check(&mut self, closure: &str, position: Option<Position>) {
        if let Some(message) = self.engine.check_syntax(&format!("return {closure}")) {
            self.diagnostics
                .report(format!("illegal lua snippet: {message}"), position);
        }
    }

    fn array(&mut self, array: &Array) {
        self.writer.start_table(array.position);
        self.meta(array);
        for child in &array.children {
            match child {
                Element::Array(nested) => self.array(nested),
                Element::Text(text) => self.text(text),
                Element::Link(link) => self.link(link),
                Element::IfElse(if_else) => self.if_else(if_else),
                Element::Func(func) => self.func(func),
            }
        }
        self.writer.end_table();
    }

    fn meta(&mut self, array: &Array) {
        self.writer.start_table(None);
        if self.debug {
            let positions = debug_positions(array);
            self.writer
                .pair("debug")
                .start_table(None)
                .raw(&positions.join(","), None)
                .end_table();
        }
        if let Some(routine) = &array.meta.routine {
            let params: Vec<String> = routine.iter().map(|p| quote(p)).collect();
            self.writer
                .pair("routine")
                .start_table(None)
                .raw(&params.join(","), None)
                .end_table();
        }
        if let Some(label) = &array.meta.label {
            self.writer.pair("label").value(label, None);
        }
        if !array.meta.labels.is_empty() {
            self.writer.pair("labels").start_table(None);
            for (label, path) in &array.meta.labels {
                let segments: Vec<String> = path
                    .iter()
                    .map(|segment| match segment {
                        PathSegment::Index(i) => i.to_string(),
                        PathSegment::Key(key) => quote(key),
                    })
                    .collect();
                self.writer
                    .pair(label)
                    .start_table(None)
                    .raw(&segments.join(","), None)
                    .end_table();
            }
            self.writer.end_table();
        }
        self.writer.end_table();
    }

    fn text(&mut self, text: &Text) {
        if text.is_plain() {
            self.writer.value(&text.text, text.position);
            return;
        }
        self.writer.start_table(text.position);
        if let Some(plural) = &text.plural {
            self.writer.pair("plural").value(plural, None);
        }
        if !text.tags.is_empty() {
            self.writer.pair("tags").start_table(None);
            for (key, value) in &text.tags {
                self.writer.pair(key).value(value, None);
            }
            self.writer.end_table();
        }
        self.writer.pair("text").value(&text.text, None);
        if !text.values.is_empty() {
            self.writer.pair("values").start_table(None);
            for (key, value) in &text.values {
                let closure = format!("function()return(\n{value}\n)end");
                self.check(&closure, text.position);
                self.writer.pair(key).raw(&closure, text.position);
            }
            self.writer.end_table();
        }
        self.writer.end_table();
    }

    fn link(&mut self, link: &Link) {
        let labels: Vec<String> = link.labels.iter().map(|l| quote(l)).collect();
        self.writer
            .start_table(link.position)
            .pair("link")
            .start_table(None)
            .raw(&labels.join(","), None)
            .end_table();
        if link.coroutine {
            self.writer.pair("coroutine").raw("true", None);
        }
        if link.params.is_empty() {
            self.writer.pair("params").raw("true", None);
        } else {
            let closure = format!("function()\nreturn {}\nend", link.params);
            self.check(&closure, link.position);
            self.writer.pair("params").raw(&closure, link.position);
        }
        if let Some(root) = &link.root {
            self.writer.pair("root").value(root, None);
        }
        self.writer.end_table();
    }

    fn if_else(&mut self, if_else: &IfElse) {
        let condition = if_else.condition.trim();
        let closure = if condition.starts_with("--") {
            "function()end".to_owned()
        } else {
            let closure = format!("function()return(\n{condition}\n)end");
            self.check(&closure, if_else.position);
            closure
        };
        self.writer
            .start_table(if_else.position)
            .raw(&closure, if_else.position);
        self.array(&if_else.then);
        if let Some(otherwise) = &if_else.otherwise {
            self.array(otherwise);
        }
        self.writer.end_table();
    }

    fn func(&mut self, func: &Func) {
        self.writer.start_table(func.position);
        if !func.args.is_empty() {
            self.writer
                .pair("args")
                .start_table(None)
                .start_table(None)
                .end_table();
            for arg in &func.args {
                self.array(arg);
            }
            self.writer.end_table();
        }
        let closure = format!("function(args)\n{}\nend", func.code.trim());
        self.check(&closure, func.position);
        self.writer
            .pair("func")
            .raw(&closure, func.position)
            .end_table();
    }
}

/// The scope position followed by each child's, with repeats blanked.
fn debug_positions(array: &Array) -> Vec<String> {
    let format = |position: Option<Position>| match position {
        Some(position) => format!("\"{}:{}\"", position.start.line, position.start.column),
        None => "\"\"".to_owned(),
    };
    let mut positions = vec![format(array.position)];
    positions.extend(array.children.iter().map(|child| format(child.position())));
    let mut previous = 0;
    for i in 1..positions.len() {
        if positions[i] == positions[previous] {
            positions[i] = "\"\"".to_owned();
        } else {
            previous = i;
        }
    }
    positions
}
