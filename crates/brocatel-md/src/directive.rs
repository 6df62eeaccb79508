//! Container directive parsing.
//!
//! A directive is written as a marker line followed by a list:
//!
//! ```markdown
//! :::name `label`
//! - body
//! ```
//!
//! The marker line parses as an ordinary paragraph. [`merge_directives`]
//! folds it together with the blocks that follow into one
//! `containerDirective` node. A directive without a label may carry a
//! `lua func` code block between the marker line and the list.

use std::sync::LazyLock;

use regex::Regex;

use crate::diagnostic::Diagnostics;
use crate::node::{Node, NodeKind};
use crate::position::Position;

static DIRECTIVE_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^:::(\S+)\s*$").unwrap());

/// Folds directive marker lines and their bodies into directive nodes,
/// throughout the tree.
pub fn merge_directives(node: &mut Node, diagnostics: &mut Diagnostics) {
    if node.children.iter().any(is_directive_line) {
        let mut merger = DirectiveMerger::new(diagnostics);
        for child in std::mem::take(&mut node.children) {
            merger.process(child);
        }
        node.children = merger.finish();
    }
    for child in &mut node.children {
        merge_directives(child, diagnostics);
    }
}

fn is_directive_line(node: &Node) -> bool {
    node.kind == NodeKind::Paragraph
        && matches!(
            node.children.first().map(|c| &c.kind),
            Some(NodeKind::Text { value }) if value.starts_with(":::")
        )
}

struct Pending {
    directive: Node,
    line: Node,
    following: Vec<Node>,
}

struct DirectiveMerger<'a> {
    diagnostics: &'a mut Diagnostics,
    merged: Vec<Node>,
    pending: Option<Pending>,
}

impl<'a> DirectiveMerger<'a> {
    fn new(diagnostics: &'a mut Diagnostics) -> Self {
        Self {
            diagnostics,
            merged: Vec::new(),
            pending: None,
        }
    }

    fn process(&mut self, node: Node) {
        if let Some(pending) = self.pending.as_mut() {
            let is_code = matches!(node.kind, NodeKind::Code { .. });
            pending.following.push(node);
            if pending.following.len() >= 2 || !is_code {
                self.submit();
            }
            return;
        }
        if !is_directive_line(&node) {
            self.merged.push(node);
            return;
        }
        match self.parse_line(&node) {
            Some(directive) => {
                self.pending = Some(Pending {
                    directive,
                    line: node,
                    following: Vec::new(),
                });
            }
            None => self.merged.push(node),
        }
    }

    fn finish(mut self) -> Vec<Node> {
        if self.pending.is_some() {
            self.submit();
        }
        self.merged
    }

    fn parse_line(&mut self, line: &Node) -> Option<Node> {
        let first = line.children.first()?;
        let Some(captures) = first.kind.value().and_then(|v| DIRECTIVE_LINE_RE.captures(v)) else {
            self.diagnostics
                .report("invalid directive line", line.position);
            return None;
        };
        let mut directive = Node::new(NodeKind::Directive {
            name: captures[1].to_owned(),
        })
        .with_position(line.position);
        if let Some(condition) = line.children.get(1) {
            if let NodeKind::InlineCode { value } = &condition.kind {
                directive
                    .children
                    .push(Node::directive_label(value.clone(), condition.position));
            } else {
                self.diagnostics
                    .report("unsupported element", condition.position);
            }
        }
        if let Some(extra) = line.children.get(2) {
            self.diagnostics.report("unexpected element", extra.position);
        }
        Some(directive)
    }

    fn submit(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        let Pending {
            mut directive,
            line,
            mut following,
        } = pending;

        let failure = match following.as_slice() {
            [] => {
                self.diagnostics.report("empty directive", line.position);
                following.push(
                    Node::new(NodeKind::List {
                        ordered: false,
                        start: None,
                    })
                    .with_position(line.position),
                );
                None
            }
            [list] => (!is_list(list)).then(|| {
                (
                    "expecting a list after the directive block",
                    list.position,
                )
            }),
            [code, list, ..] => {
                if !code.is_lua_block(Some("func")) {
                    Some((
                        "expecting a code block of lua func type after the directive block",
                        code.position,
                    ))
                } else if !directive.children.is_empty() {
                    Some((
                        "a labeled directive should not contain a lua func code block",
                        directive.position,
                    ))
                } else if !is_list(list) {
                    Some(("expecting a list after the code block", list.position))
                } else {
                    None
                }
            }
        };

        if let Some((message, position)) = failure {
            self.diagnostics.report(message, position);
            self.merged.push(line);
            self.merged.extend(following);
            return;
        }

        if let (Some(start), Some(end)) = (
            directive.position,
            following.last().and_then(|n| n.position),
        ) {
            directive.position = Some(Position::new(start.start, end.end));
        }
        directive.children.extend(following);
        self.merged.push(directive);
    }
}

fn is_list(node: &Node) -> bool {
    matches!(node.kind, NodeKind::List { .. })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::parse::parse;

    fn merged(source: &str) -> (Node, Vec<String>) {
        let mut root = parse(source);
        let mut diagnostics = Diagnostics::new();
        merge_directives(&mut root, &mut diagnostics);
        let messages = diagnostics.iter().map(|d| d.message.clone()).collect();
        (root, messages)
    }

    fn kinds(node: &Node) -> Vec<&str> {
        node.children.iter().map(Node::type_name).collect()
    }

    #[test]
    fn test_labeled_directive() {
        let (root, messages) = merged(":::if `a == 1`\n- yes\n- no\n");
        assert!(messages.is_empty(), "{messages:?}");
        assert_eq!(kinds(&root), vec!["containerDirective"]);
        let directive = &root.children[0];
        assert_eq!(
            directive.kind,
            NodeKind::Directive {
                name: "if".to_owned()
            }
        );
        assert_eq!(directive.directive_label_code(), Some("a == 1"));
        assert_eq!(kinds(directive), vec!["containerDirectiveLabel", "list"]);
    }

    #[test]
    fn test_directive_with_func_block() {
        let (root, messages) = merged(":::do\n```lua func\nprint(args)\n```\n- a\n");
        assert!(messages.is_empty(), "{messages:?}");
        assert_eq!(kinds(&root.children[0]), vec!["code", "list"]);
    }

    #[test]
    fn test_labeled_directive_rejects_func_block() {
        let (root, messages) = merged(":::do `f`\n```lua func\nx()\n```\n- a\n");
        assert_eq!(
            messages,
            vec!["a labeled directive should not contain a lua func code block"]
        );
        assert_eq!(kinds(&root), vec!["paragraph", "code", "list"]);
    }

    #[test]
    fn test_directive_requires_list() {
        let (root, messages) = merged(":::loop\n\ntext\n");
        assert_eq!(messages, vec!["expecting a list after the directive block"]);
        assert_eq!(kinds(&root), vec!["paragraph", "paragraph"]);
    }

    #[test]
    fn test_wrong_code_block_type() {
        let (_, messages) = merged(":::do\n```js\nx\n```\n- a\n");
        assert_eq!(
            messages,
            vec!["expecting a code block of lua func type after the directive block"]
        );
    }

    #[test]
    fn test_empty_directive_synthesizes_list() {
        let (root, messages) = merged("text\n\n:::loop\n");
        assert_eq!(messages, vec!["empty directive"]);
        assert_eq!(kinds(&root), vec!["paragraph", "containerDirective"]);
        assert_eq!(kinds(&root.children[1]), vec!["list"]);
    }

    #[test]
    fn test_invalid_directive_line_kept() {
        let (root, messages) = merged("::: loop\n- a\n");
        assert_eq!(messages, vec!["invalid directive line"]);
        assert_eq!(kinds(&root), vec!["paragraph", "list"]);
    }

    #[test]
    fn test_unsupported_and_unexpected_elements() {
        let (_, messages) = merged(":::loop *a*\n- b\n");
        assert_eq!(messages, vec!["unsupported element"]);
        let (root, messages) = merged(":::loop `a` `b`\n- c\n");
        assert_eq!(messages, vec!["unexpected element"]);
        assert_eq!(root.children[0].directive_label_code(), Some("a"));
    }

    #[test]
    fn test_nested_directives() {
        let (root, messages) = merged("- :::if `x`\n  - y\n");
        assert!(messages.is_empty(), "{messages:?}");
        let item = &root.children[0].children[0];
        assert_eq!(kinds(item), vec!["containerDirective"]);
    }
}
