//! Document tree to intermediate representation.
//!
//! Runs after macro expansion, so only the built-in directives remain. Each
//! block becomes an [`Array`] with headings nested as labeled sub-arrays.
//! Paragraphs become text, links or conditionals. Problems are reported and
//! a best-effort element is produced in their place.

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use brocatel_md::{Diagnostics, Node, NodeKind, Position, anchor, is_normal_link, to_markdown};
use regex::Regex;
use serde::Serialize;
use uuid::Uuid;

use crate::expander::sub_paragraph;
use crate::headings::HeadingStack;
use crate::ir::{Array, Element, Func, IfElse, Link, Text};
use crate::labels::attach_relative_links;
use crate::links::normalize_stem;
use crate::lua::{ScriptEngine, is_identifier};

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[([^\[\]=\s]+)(?:=([^\]]*))?\]").unwrap());

static TAG_SEPARATOR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*[,;]?\s*").unwrap());

static LINK_ROOT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^#|]+)\.md[#|].").unwrap());

static IFID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?:UUID|IFID)://)?([0-9A-F-]{36})/{0,2}$").unwrap()
});

/// An embedded Lua snippet, kept for editor tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeSnippet {
    pub value: String,
    pub position: Option<Position>,
    /// Whether the snippet is an expression rather than a statement block.
    pub expression: bool,
}

/// Everything the transformer extracts from one document.
#[derive(Debug, Default)]
pub(crate) struct Transformed {
    pub(crate) root: Array,
    /// `lua global` snippets, in document order.
    pub(crate) globals: Vec<String>,
    /// Story identifiers from the front matter.
    pub(crate) ifid: Vec<String>,
    /// Linked file stems, with the first link to each.
    pub(crate) dependencies: BTreeMap<String, Option<Position>>,
    pub(crate) snippets: Vec<CodeSnippet>,
}

pub(crate) struct AstTransformer<'a> {
    stem: &'a str,
    engine: &'a dyn ScriptEngine,
    diagnostics: &'a mut Diagnostics,
    output: Transformed,
}

impl<'a> AstTransformer<'a> {
    pub(crate) fn new(
        stem: &'a str,
        engine: &'a dyn ScriptEngine,
        diagnostics: &'a mut Diagnostics,
    ) -> Self {
        Self {
            stem,
            engine,
            diagnostics,
            output: Transformed::default(),
        }
    }

    pub(crate) fn transform(mut self, root: &Node) -> Transformed {
        self.parse_front_matter(root);
        let mut array = self.parse_block(root.position, &root.children);
        attach_relative_links(&mut array, self.diagnostics);
        self.output.root = array;
        self.output
    }

    fn parse_front_matter(&mut self, root: &Node) {
        let Some(front_matter) = root
            .children
            .iter()
            .find(|n| matches!(n.kind, NodeKind::Yaml { .. }))
        else {
            return;
        };
        let source = front_matter.kind.value().unwrap_or_default();
        let metadata: serde_yaml::Value = match serde_yaml::from_str(source) {
            Ok(metadata) => metadata,
            Err(e) => {
                self.diagnostics.report(e.to_string(), front_matter.position);
                return;
            }
        };
        let Some(ids) = ["IFID", "ifid", "UUID", "uuid"]
            .iter()
            .find_map(|key| metadata.get(key))
        else {
            return;
        };
        let ids = match ids {
            serde_yaml::Value::Sequence(seq) => seq.iter().collect(),
            other => vec![other],
        };
        for id in ids {
            match id.as_str().and_then(normalize_ifid) {
                Some(ifid) => self.output.ifid.push(ifid),
                None => {
                    let shown = match id.as_str() {
                        Some(s) => s.to_owned(),
                        None => serde_yaml::to_string(id)
                            .map(|s| s.trim().to_owned())
                            .unwrap_or_default(),
                    };
                    self.diagnostics
                        .report(format!("invalid IFID {shown}"), front_matter.position);
                }
            }
        }
    }

    fn parse_block(&mut self, position: Option<Position>, children: &[Node]) -> Array {
        let mut stack = HeadingStack::new(Array::new(position));
        for node in children {
            match &node.kind {
                NodeKind::Paragraph => {
                    let element = self.parse_paragraph(node);
                    stack.push_element(element);
                }
                NodeKind::Code { .. } => {
                    let element = self.parse_code_block(node);
                    stack.push_element(element);
                }
                NodeKind::Directive { .. } => {
                    let element = self.parse_directive(node);
                    stack.push_element(element);
                }
                NodeKind::Heading { depth } => {
                    let nested = self.parse_heading(node);
                    stack.push_heading(nested, *depth);
                }
                NodeKind::Html { value } => {
                    if !value.trim().starts_with("<!--") {
                        stack.push_element(as_is(node));
                    }
                }
                NodeKind::Yaml { .. } => {}
                _ => {
                    self.diagnostics.report(
                        format!("unsupported markdown type: {}", node.type_name()),
                        node.position,
                    );
                    stack.push_element(as_is(node));
                }
            }
        }
        stack.finish()
    }

    fn record_snippet(&mut self, value: &str, position: Option<Position>, expression: bool) {
        self.output.snippets.push(CodeSnippet {
            value: value.to_owned(),
            position,
            expression,
        });
    }

    fn parse_code_block(&mut self, node: &Node) -> Element {
        let NodeKind::Code { lang, meta, value } = &node.kind else {
            return as_is(node);
        };
        if lang.as_deref() != Some("lua") {
            self.diagnostics
                .report("unsupported code block type", node.position);
            return as_is(node);
        }
        let code = match meta.as_deref() {
            Some("global") => {
                if let Some(error) = self.engine.check_syntax(value) {
                    self.diagnostics
                        .report(format!("illegal lua snippet: {error}"), node.position);
                }
                self.output.globals.push(value.clone());
                String::new()
            }
            Some("macro") => String::new(),
            _ => value.clone(),
        };
        self.record_snippet(value, node.position, false);
        Element::Func(Func {
            code,
            args: Vec::new(),
            position: node.position,
        })
    }

    fn parse_directive(&mut self, node: &Node) -> Element {
        let NodeKind::Directive { name } = &node.kind else {
            return as_is(node);
        };
        if name == "nil" {
            let body: Vec<Node> = node
                .children
                .iter()
                .filter(|child| child.kind != NodeKind::DirectiveLabel)
                .cloned()
                .collect();
            let root = Node::new(NodeKind::Root)
                .with_children(body)
                .with_position(node.position);
            return as_is(&root);
        }
        let DirectiveParts { label, list, func } = self.destruct_directive(node);
        let Some(list) = list else {
            return Element::Array(Array::new(node.position));
        };
        match name.as_str() {
            "local" => {}
            "if" => {
                let condition = label.unwrap_or_else(|| {
                    self.diagnostics
                        .report("expecting condition and branches", node.position);
                    "false".to_owned()
                });
                self.record_snippet(&condition, node.position, true);
                let mut branches: Vec<Array> = list
                    .children
                    .iter()
                    .map(|item| self.parse_block(item.position, &item.children))
                    .collect();
                if (1..=2).contains(&branches.len()) {
                    let otherwise = (branches.len() == 2).then(|| branches.remove(1));
                    let then = branches.remove(0);
                    return Element::IfElse(IfElse {
                        condition,
                        then,
                        otherwise,
                        position: node.position,
                    });
                }
                self.diagnostics
                    .report("only one or two branches allowed", node.position);
            }
            "do" => {
                let code = match label {
                    None => {
                        self.diagnostics
                            .report("expecting lua code", node.position);
                        String::new()
                    }
                    Some(label) if func => label,
                    Some(label) => format!("{label}(args)"),
                };
                let args = list
                    .children
                    .iter()
                    .map(|item| self.parse_block(item.position, &item.children))
                    .collect();
                return Element::Func(Func {
                    code,
                    args,
                    position: node.position,
                });
            }
            _ => self.diagnostics.report("unknown macro", node.position),
        }
        let flattened: Vec<Node> = list
            .children
            .iter()
            .flat_map(|item| item.children.iter().cloned())
            .collect();
        Element::Array(self.parse_block(node.position, &flattened))
    }

    fn destruct_directive<'n>(&mut self, directive: &'n Node) -> DirectiveParts<'n> {
        let (label, list, func) = match directive.children.as_slice() {
            [] => {
                self.diagnostics.report("missing element", directive.position);
                (None, None, false)
            }
            [list] => (None, Some(list), false),
            [first, list] if first.is_lua_block(Some("func")) => {
                (first.kind.value().map(str::to_owned), Some(list), true)
            }
            [first, list] => (
                first.directive_label_code().map(str::to_owned).or_else(|| {
                    (first.kind == NodeKind::DirectiveLabel)
                        .then(|| first.plain_text())
                }),
                Some(list),
                false,
            ),
            _ => {
                self.diagnostics
                    .report("unexpected element inside directive", directive.position);
                (None, None, false)
            }
        };
        let list = match list {
            Some(list) if matches!(list.kind, NodeKind::List { .. }) => Some(list),
            Some(other) => {
                self.diagnostics
                    .report("unexpected element inside directive", other.position);
                None
            }
            None => None,
        };
        DirectiveParts { label, list, func }
    }

    fn parse_heading(&mut self, node: &Node) -> Array {
        if node
            .children
            .iter()
            .any(|child| matches!(child.kind, NodeKind::Expression { .. }))
        {
            return self.parse_function_heading(node);
        }
        let label = match node.children.as_slice() {
            [] => {
                self.diagnostics
                    .report("unexpected empty heading", node.position);
                None
            }
            [Node {
                kind: NodeKind::Text { value },
                ..
            }] => Some(anchor(value)),
            _ => {
                self.diagnostics
                    .report("unexpected complex heading", node.position);
                None
            }
        };
        Array::labeled(node.position, label)
    }

    /// `# name {a, b}` declares a function scope with parameters `a` and `b`.
    fn parse_function_heading(&mut self, node: &Node) -> Array {
        let [
            Node {
                kind: NodeKind::Text { value: name },
                ..
            },
            Node {
                kind: NodeKind::Expression { value: params },
                ..
            },
        ] = node.children.as_slice()
        else {
            self.diagnostics
                .report("unexpected complex heading", node.position);
            return Array::new(node.position);
        };
        let params: Vec<String> = params
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect();
        let invalid: Vec<&str> = params
            .iter()
            .map(String::as_str)
            .filter(|p| !is_identifier(p))
            .collect();
        if !invalid.is_empty() {
            self.diagnostics.report(
                format!("not valid identifier: {}", invalid.join(", ")),
                node.position,
            );
        }
        let mut array = Array::labeled(node.position, Some(anchor(name.trim())));
        array.meta.routine = Some(params);
        array
    }

    fn parse_paragraph(&mut self, para: &Node) -> Element {
        match para.children.as_slice() {
            [] => return Element::Array(Array::new(para.position)),
            [link] if matches!(link.kind, NodeKind::Link { .. }) => {
                if let NodeKind::Link { url, .. } = &link.kind
                    && is_normal_link(url)
                {
                    return as_is(para);
                }
                return self.parse_link(link);
            }
            [code, rest @ ..] if matches!(code.kind, NodeKind::InlineCode { .. }) => {
                let condition = code.kind.value().unwrap_or_default().to_owned();
                self.record_snippet(&condition, code.position, rest.is_empty());
                if rest.is_empty() {
                    return Element::Func(Func {
                        code: condition,
                        args: Vec::new(),
                        position: para.position,
                    });
                }
                let branch = sub_paragraph(para, 1);
                let then = self.parse_block(para.position, std::slice::from_ref(&branch));
                return Element::IfElse(IfElse {
                    condition,
                    then,
                    otherwise: None,
                    position: para.position,
                });
            }
            _ => {}
        }
        if has_code_or_link(para) {
            self.diagnostics.report(
                "links or inline code snippets in text are not supported",
                para.position,
            );
        }
        Element::Text(self.parse_text(para))
    }

    fn parse_text(&mut self, para: &Node) -> Text {
        let mut para = para.clone();
        let tags = extract_tags(&mut para);
        let original = to_markdown(&para);
        let mut references = Vec::new();
        replace_expressions(&mut para, &mut references);
        let rendered = to_markdown(&para);
        let (text, values, plural) = self.replace_references(rendered, references);
        Text {
            text,
            tags,
            values,
            plural,
            original,
            position: para.position,
        }
    }

    /// Swaps expression sentinels for `vN` placeholders.
    fn replace_references(
        &mut self,
        rendered: String,
        references: Vec<Reference>,
    ) -> (String, BTreeMap<String, String>, Option<String>) {
        let mut text = rendered;
        let mut values = BTreeMap::new();
        let mut plural = None;
        let mut names: HashMap<String, String> = HashMap::new();
        let mut i = 1;
        for reference in references {
            let raw = reference.expression.trim().to_owned();
            if let Some(name) = names.get(&raw) {
                text = text.replacen(&reference.sentinel, name, 1);
                continue;
            }
            while text.contains(&format!("v{i}")) {
                i += 1;
            }
            let name = format!("v{i}");
            i += 1;
            text = text.replacen(&reference.sentinel, &name, 1);
            names.insert(raw.clone(), name.clone());

            let mut value = raw;
            if let Some(stripped) = value.strip_suffix('?') {
                if plural.is_some() {
                    self.diagnostics
                        .report("multiple plural expression defined", reference.position);
                }
                plural = Some(name.clone());
                value = stripped.trim().to_owned();
            }
            if value.is_empty() {
                self.diagnostics
                    .report("empty expression", reference.position);
                value = "nil".to_owned();
            }
            self.record_snippet(&value, reference.position, true);
            values.insert(name, value);
        }
        (text, values, plural)
    }

    /// `[text](#a#b)` jumps to label `b` under `a`; `[text](other.md#a)`
    /// jumps into another file.
    fn parse_link(&mut self, link: &Node) -> Element {
        let NodeKind::Link {
            url,
            title,
            coroutine,
        } = &link.kind
        else {
            return as_is(link);
        };
        let mut labels: Vec<String> = split_link_url(url).iter().map(|s| anchor(s)).collect();
        let mut root = None;
        if let Some(captures) = LINK_ROOT_RE.captures(url) {
            root = Some(normalize_stem(&captures[1]));
            if !labels.is_empty() {
                labels.remove(0);
            }
        } else if let Some(title) = title.as_deref().filter(|t| t.trim_end().ends_with(".md")) {
            root = Some(normalize_stem(title));
        }
        let root = root.filter(|root| !root.is_empty() && *root != normalize_stem(self.stem));
        if let Some(root) = &root {
            self.output
                .dependencies
                .entry(root.clone())
                .or_insert(link.position);
        }

        let params = match link.children.first().map(|c| &c.kind) {
            Some(NodeKind::Expression { value }) => {
                if link.children.len() > 1 {
                    self.diagnostics
                        .report("unexpected complex link content", link.position);
                }
                let params = format!("{{{}}}", value.trim());
                self.record_snippet(&params, link.position, true);
                params
            }
            _ => String::new(),
        };
        Element::Link(Link {
            labels,
            root,
            params,
            coroutine: *coroutine,
            position: link.position,
        })
    }
}

struct DirectiveParts<'n> {
    label: Option<String>,
    list: Option<&'n Node>,
    /// Whether the label is a `lua func` body rather than a callee.
    func: bool,
}

struct Reference {
    sentinel: String,
    expression: String,
    position: Option<Position>,
}

/// Keeps a node as literal Markdown text.
fn as_is(node: &Node) -> Element {
    let text = to_markdown(node);
    Element::Text(Text {
        original: text.clone(),
        text,
        position: node.position,
        ..Text::default()
    })
}

fn has_code_or_link(node: &Node) -> bool {
    node.children.iter().any(|child| match &child.kind {
        NodeKind::InlineCode { .. } => true,
        NodeKind::Link { url, .. } if !is_normal_link(url) => true,
        _ => has_code_or_link(child),
    })
}

/// Strips leading `[tag]` and `[tag=value]` markers from the first text.
fn extract_tags(para: &mut Node) -> BTreeMap<String, String> {
    let mut tags = BTreeMap::new();
    let Some(NodeKind::Text { value }) = para.children.first_mut().map(|c| &mut c.kind) else {
        return tags;
    };
    let mut offset = 0;
    while let Some(captures) = TAG_RE.captures(&value[offset..]) {
        tags.insert(
            captures[1].to_owned(),
            captures.get(2).map_or("", |m| m.as_str()).to_owned(),
        );
        offset += captures.get(0).map_or(0, |m| m.end());
        offset += TAG_SEPARATOR_RE
            .find(&value[offset..])
            .map_or(0, |m| m.end());
    }
    if offset == 0 {
        return tags;
    }
    let rest = value[offset..].to_owned();
    if rest.is_empty() {
        para.children.remove(0);
    } else {
        *value = rest;
    }
    tags
}

/// Replaces every expression value with a unique sentinel.
fn replace_expressions(node: &mut Node, references: &mut Vec<Reference>) {
    if let NodeKind::Expression { value } = &mut node.kind {
        let sentinel = Uuid::new_v4().simple().to_string();
        references.push(Reference {
            sentinel: sentinel.clone(),
            expression: std::mem::replace(value, sentinel),
            position: node.position,
        });
    }
    for child in &mut node.children {
        replace_expressions(child, references);
    }
}

/// Splits a link URL at unescaped `#` and single `|`. `\#` and `||` stand
/// for literal characters.
fn split_link_url(url: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = url.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('#') => current.push('#'),
                Some(next) => {
                    current.push('\\');
                    current.push(next);
                }
                None => current.push('\\'),
            },
            '#' => segments.push(std::mem::take(&mut current)),
            '|' if chars.peek() == Some(&'|') => {
                chars.next();
                current.push('|');
            }
            '|' => segments.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    segments.push(current);
    segments.retain(|s| !s.is_empty());
    segments
}

/// Normalizes an IFID to its uppercase hyphenated form.
fn normalize_ifid(s: &str) -> Option<String> {
    let upper = s.to_uppercase();
    let captures = IFID_RE.captures(&upper)?;
    let id = &captures[1];
    Uuid::parse_str(id).ok()?;
    Some(id.to_owned())
}
