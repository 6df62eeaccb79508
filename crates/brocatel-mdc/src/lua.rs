//! Embedded script runtime.
//!
//! Macros are written in Lua and run on an embedded Lua 5.4 state. A
//! directive node is handed to the macro as the global `arg`, shaped like an
//! mdast node, and the returned table is converted back into a [`Node`].

use std::sync::LazyLock;

use brocatel_md::{Node, NodeKind, Point, Position, to_markdown};
use mlua::{Lua, Table, Value};
use regex::Regex;

use crate::error::{ScriptError, lua_message};

/// Built-in macro library, loaded before user macros.
pub(crate) const BUILTIN_MACROS: &str = include_str!("macros/builtin.lua");

static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

const KEYWORDS: &[&str] = &[
    "and", "break", "do", "else", "elseif", "end", "false", "for", "function", "goto", "if", "in",
    "local", "nil", "not", "or", "repeat", "return", "then", "true", "until", "while",
];

/// Whether `s` is a Lua identifier and not a reserved word.
#[must_use]
pub fn is_identifier(s: &str) -> bool {
    IDENTIFIER_RE.is_match(s) && !KEYWORDS.contains(&s)
}

/// The script runtime the compiler calls out to.
pub trait ScriptEngine {
    /// Returns the syntax error of `snippet`, if any.
    fn check_syntax(&self, snippet: &str) -> Option<String>;

    /// Runs macro `name` on `node` after loading `definitions`.
    fn run_macro(&self, name: &str, node: &Node, definitions: &[String])
    -> Result<Node, ScriptError>;
}

/// Lua 5.4 engine. One instance serves one document compile.
pub struct LuaEngine {
    lua: Lua,
}

impl LuaEngine {
    pub fn new() -> Result<Self, ScriptError> {
        let lua = Lua::new();
        let to_markdown_fn = lua.create_function(|_, table: Table| {
            let node = table_to_node(&table)
                .map_err(|e| mlua::Error::RuntimeError(e.to_string()))?;
            Ok(to_markdown(&node))
        })?;
        lua.globals().set("TO_MARKDOWN", to_markdown_fn)?;
        Ok(Self { lua })
    }
}

impl ScriptEngine for LuaEngine {
    fn check_syntax(&self, snippet: &str) -> Option<String> {
        match self.lua.load(snippet).set_name("<input>").into_function() {
            Ok(_) => None,
            Err(e) => Some(lua_message(&e)),
        }
    }

    fn run_macro(
        &self,
        name: &str,
        node: &Node,
        definitions: &[String],
    ) -> Result<Node, ScriptError> {
        let arg = node_to_table(&self.lua, node)?;
        self.lua.globals().set("arg", arg)?;
        self.lua.load(BUILTIN_MACROS).set_name("builtin").exec()?;
        for (i, definition) in definitions.iter().enumerate() {
            self.lua
                .load(definition.as_str())
                .set_name(format!("macro-{}", i + 1))
                .exec()?;
        }
        let call = format!(
            "local ok, macro = pcall(function() return {name} end)\n\
             if not ok or type(macro) ~= \"function\" then error(\"unknown macro: {name}\", 0) end\n\
             return macro(arg)"
        );
        let result: Value = self.lua.load(call).set_name("call").eval()?;
        match result {
            Value::Table(table) => table_to_node(&table),
            other => Err(ScriptError::MalformedNode(format!(
                "macro {name} returned {}",
                other.type_name()
            ))),
        }
    }
}

fn point_to_table(lua: &Lua, point: Point) -> mlua::Result<Table> {
    let table = lua.create_table()?;
    table.set("line", point.line)?;
    table.set("column", point.column)?;
    Ok(table)
}

fn position_to_table(lua: &Lua, position: Position) -> mlua::Result<Table> {
    let table = lua.create_table()?;
    table.set("start", point_to_table(lua, position.start)?)?;
    table.set("end", point_to_table(lua, position.end)?)?;
    Ok(table)
}

/// Converts a node into an mdast-shaped Lua table.
pub(crate) fn node_to_table(lua: &Lua, node: &Node) -> mlua::Result<Table> {
    let table = lua.create_table()?;
    table.set("type", node.type_name())?;
    match &node.kind {
        NodeKind::Heading { depth } => table.set("depth", *depth)?,
        NodeKind::List { ordered, start } => {
            table.set("ordered", *ordered)?;
            table.set("start", *start)?;
        }
        NodeKind::Code { lang, meta, value } => {
            table.set("lang", lang.as_deref())?;
            table.set("meta", meta.as_deref())?;
            table.set("value", value.as_str())?;
        }
        NodeKind::Html { value }
        | NodeKind::Yaml { value }
        | NodeKind::Text { value }
        | NodeKind::InlineCode { value }
        | NodeKind::Expression { value } => table.set("value", value.as_str())?,
        NodeKind::Directive { name } => table.set("name", name.as_str())?,
        NodeKind::Link {
            url,
            title,
            coroutine,
        } => {
            table.set("url", url.as_str())?;
            table.set("title", title.as_deref())?;
            if *coroutine {
                table.set("coroutine", true)?;
            }
        }
        NodeKind::Image { url, title } => {
            table.set("url", url.as_str())?;
            table.set("title", title.as_deref())?;
        }
        _ => {}
    }
    if let Some(position) = node.position {
        table.set("position", position_to_table(lua, position)?)?;
    }
    let children = lua.create_table()?;
    for (i, child) in node.children.iter().enumerate() {
        children.set(i + 1, node_to_table(lua, child)?)?;
    }
    table.set("children", children)?;
    Ok(table)
}

fn malformed(message: impl Into<String>) -> ScriptError {
    ScriptError::MalformedNode(message.into())
}

fn get_string(table: &Table, key: &str) -> Result<Option<String>, ScriptError> {
    Ok(table.get::<Option<String>>(key)?)
}

fn required_string(table: &Table, key: &str, kind: &str) -> Result<String, ScriptError> {
    get_string(table, key)?.ok_or_else(|| malformed(format!("{kind} node without {key}")))
}

fn table_to_point(table: &Table) -> Result<Point, ScriptError> {
    let line: usize = table.get("line")?;
    let column: usize = table.get("column")?;
    Ok(Point::new(line, column))
}

fn table_to_position(table: &Table) -> Result<Option<Position>, ScriptError> {
    let Some(position) = table.get::<Option<Table>>("position")? else {
        return Ok(None);
    };
    let start = table_to_point(&position.get::<Table>("start")?)?;
    let end = match position.get::<Option<Table>>("end")? {
        Some(end) => table_to_point(&end)?,
        None => start,
    };
    Ok(Some(Position::new(start, end)))
}

/// Converts an mdast-shaped Lua table back into a node.
pub(crate) fn table_to_node(table: &Table) -> Result<Node, ScriptError> {
    let kind_name =
        get_string(table, "type")?.ok_or_else(|| malformed("node table without type"))?;
    let kind = match kind_name.as_str() {
        "root" => NodeKind::Root,
        "paragraph" => NodeKind::Paragraph,
        "heading" => NodeKind::Heading {
            depth: table.get::<Option<u8>>("depth")?.unwrap_or(1),
        },
        "thematicBreak" => NodeKind::ThematicBreak,
        "blockquote" => NodeKind::Blockquote,
        "list" => NodeKind::List {
            ordered: table.get::<Option<bool>>("ordered")?.unwrap_or(false),
            start: table.get::<Option<u64>>("start")?,
        },
        "listItem" => NodeKind::ListItem,
        "code" => NodeKind::Code {
            lang: get_string(table, "lang")?,
            meta: get_string(table, "meta")?,
            value: get_string(table, "value")?.unwrap_or_default(),
        },
        "html" => NodeKind::Html {
            value: required_string(table, "value", "html")?,
        },
        "yaml" => NodeKind::Yaml {
            value: required_string(table, "value", "yaml")?,
        },
        "containerDirective" => NodeKind::Directive {
            name: required_string(table, "name", "directive")?,
        },
        "containerDirectiveLabel" => NodeKind::DirectiveLabel,
        "text" => NodeKind::Text {
            value: required_string(table, "value", "text")?,
        },
        "inlineCode" => NodeKind::InlineCode {
            value: required_string(table, "value", "inlineCode")?,
        },
        "mdxTextExpression" => NodeKind::Expression {
            value: required_string(table, "value", "expression")?,
        },
        "emphasis" => NodeKind::Emphasis,
        "strong" => NodeKind::Strong,
        "delete" => NodeKind::Delete,
        "link" => NodeKind::Link {
            url: required_string(table, "url", "link")?,
            title: get_string(table, "title")?,
            coroutine: table.get::<Option<bool>>("coroutine")?.unwrap_or(false),
        },
        "image" => NodeKind::Image {
            url: required_string(table, "url", "image")?,
            title: get_string(table, "title")?,
        },
        "break" => NodeKind::Break,
        _ => NodeKind::Other { name: kind_name },
    };
    let mut children = Vec::new();
    if let Some(list) = table.get::<Option<Table>>("children")? {
        for child in list.sequence_values::<Table>() {
            children.push(table_to_node(&child?)?);
        }
    }
    Ok(Node::new(kind)
        .with_children(children)
        .with_position(table_to_position(table)?))
}
