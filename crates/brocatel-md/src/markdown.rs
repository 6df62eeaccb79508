//! Serializes document trees back to Markdown.
//!
//! The output re-parses into a structurally equivalent tree. Block nodes are
//! separated by blank lines, directives print as `:::name` followed by their
//! label code span.

use crate::node::{Node, NodeKind};

/// Serializes `node` and trims surrounding whitespace.
#[must_use]
pub fn to_markdown(node: &Node) -> String {
    let mut out = String::new();
    write_node(node, &mut out);
    out.trim().to_owned()
}

fn write_node(node: &Node, out: &mut String) {
    match &node.kind {
        NodeKind::Root | NodeKind::ListItem => write_flow(&node.children, out),
        NodeKind::Paragraph | NodeKind::DirectiveLabel => write_phrasing(&node.children, out),
        NodeKind::Heading { depth } => {
            for _ in 0..*depth {
                out.push('#');
            }
            out.push(' ');
            write_phrasing(&node.children, out);
        }
        NodeKind::ThematicBreak => out.push_str("***"),
        NodeKind::Blockquote => {
            let mut inner = String::new();
            write_flow(&node.children, &mut inner);
            let quoted: Vec<String> = inner
                .lines()
                .map(|line| {
                    if line.is_empty() {
                        ">".to_owned()
                    } else {
                        format!("> {line}")
                    }
                })
                .collect();
            out.push_str(&quoted.join("\n"));
        }
        NodeKind::List { ordered, start } => write_list(node, *ordered, start.unwrap_or(1), out),
        NodeKind::Code { lang, meta, value } => {
            let fence = fence_for(value, '`', 3);
            out.push_str(&fence);
            if let Some(lang) = lang {
                out.push_str(lang);
                if let Some(meta) = meta {
                    out.push(' ');
                    out.push_str(meta);
                }
            }
            out.push('\n');
            if !value.is_empty() {
                out.push_str(value);
                out.push('\n');
            }
            out.push_str(&fence);
        }
        NodeKind::Html { value } => out.push_str(value),
        NodeKind::Yaml { value } => {
            out.push_str("---\n");
            out.push_str(value);
            out.push_str("\n---");
        }
        NodeKind::Directive { name } => {
            out.push_str(":::");
            out.push_str(name);
            let body = match node.children.first() {
                Some(label) if label.kind == NodeKind::DirectiveLabel => {
                    write_phrasing(&label.children, out);
                    &node.children[1..]
                }
                _ => &node.children[..],
            };
            out.push_str("\n\n");
            write_flow(body, out);
        }
        NodeKind::Text { value } => escape_text(value, out),
        NodeKind::InlineCode { value } => {
            let fence = fence_for(value, '`', 1);
            let pad = value.starts_with('`') || value.ends_with('`');
            out.push_str(&fence);
            if pad {
                out.push(' ');
            }
            out.push_str(value);
            if pad {
                out.push(' ');
            }
            out.push_str(&fence);
        }
        NodeKind::Expression { value } => {
            out.push('{');
            out.push_str(value);
            out.push('}');
        }
        NodeKind::Emphasis => wrap(&node.children, "*", out),
        NodeKind::Strong => wrap(&node.children, "**", out),
        NodeKind::Delete => wrap(&node.children, "~~", out),
        NodeKind::Link { url, title, .. } => {
            out.push('[');
            write_phrasing(&node.children, out);
            out.push_str("](");
            write_destination(url, title.as_deref(), out);
            out.push(')');
        }
        NodeKind::Image { url, title } => {
            out.push_str("![");
            write_phrasing(&node.children, out);
            out.push_str("](");
            write_destination(url, title.as_deref(), out);
            out.push(')');
        }
        NodeKind::Break => out.push_str("\\\n"),
        NodeKind::Other { .. } => {
            if node.children.is_empty() {
                if let Some(value) = node.kind.value() {
                    out.push_str(value);
                }
            } else {
                write_phrasing(&node.children, out);
            }
        }
    }
}

fn write_flow(children: &[Node], out: &mut String) {
    for (i, child) in children.iter().enumerate() {
        if i != 0 {
            out.push_str("\n\n");
        }
        write_node(child, out);
    }
}

fn write_phrasing(children: &[Node], out: &mut String) {
    for child in children {
        write_node(child, out);
    }
}

fn wrap(children: &[Node], marker: &str, out: &mut String) {
    out.push_str(marker);
    write_phrasing(children, out);
    out.push_str(marker);
}

fn write_list(list: &Node, ordered: bool, start: u64, out: &mut String) {
    for (i, item) in list.children.iter().enumerate() {
        if i != 0 {
            out.push('\n');
        }
        let marker = if ordered {
            format!("{}. ", start + i as u64)
        } else {
            "- ".to_owned()
        };
        let indent = " ".repeat(marker.len());
        let mut inner = String::new();
        write_node(item, &mut inner);
        out.push_str(&marker);
        for (j, line) in inner.lines().enumerate() {
            if j != 0 {
                out.push('\n');
                if !line.is_empty() {
                    out.push_str(&indent);
                }
            }
            out.push_str(line);
        }
    }
}

fn write_destination(url: &str, title: Option<&str>, out: &mut String) {
    if url.is_empty() || url.contains([' ', '(', ')', '<', '>']) {
        out.push('<');
        out.push_str(url);
        out.push('>');
    } else {
        out.push_str(url);
    }
    if let Some(title) = title {
        out.push_str(" \"");
        out.push_str(&title.replace('"', "\\\""));
        out.push('"');
    }
}

/// A code fence longer than any run of `c` inside `value`.
fn fence_for(value: &str, c: char, min: usize) -> String {
    let mut longest = 0;
    let mut run = 0;
    for ch in value.chars() {
        if ch == c {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    let len = if min == 1 { longest + 1 } else { min.max(longest + 1) };
    c.to_string().repeat(len)
}

/// Escapes characters that would otherwise start Markdown constructs.
fn escape_text(value: &str, out: &mut String) {
    let chars: Vec<char> = value.chars().collect();
    let mut line_start = out.is_empty() || out.ends_with('\n');
    for (i, &c) in chars.iter().enumerate() {
        let prev = i.checked_sub(1).map(|j| chars[j]);
        let next = chars.get(i + 1).copied();
        let escape = match c {
            '\\' | '[' | '`' | '*' => true,
            '_' => {
                !prev.is_some_and(char::is_alphanumeric) || !next.is_some_and(char::is_alphanumeric)
            }
            '<' => next.is_some_and(|n| n.is_ascii_alphabetic() || n == '/' || n == '!'),
            '#' | '>' => line_start,
            '-' | '+' => line_start && next.is_none_or(char::is_whitespace),
            _ => false,
        };
        if escape {
            out.push('\\');
        }
        out.push(c);
        line_start = c == '\n' || (line_start && c == ' ');
    }
}
