//! One paragraph per source line.
//!
//! Story text is displayed line by line, so multi-line paragraphs are split at
//! soft and hard line breaks. Multi-line setext headings (`Text\n---`) are
//! almost always meant as text followed by a thematic break and are split the
//! same way.

use crate::node::{Node, NodeKind};
use crate::position::{Point, Position};

/// Splits multi-line paragraphs and setext headings throughout the tree.
pub fn split_paragraphs(node: &mut Node) {
    if matches!(node.kind, NodeKind::Paragraph | NodeKind::Heading { .. }) {
        return;
    }
    let children = std::mem::take(&mut node.children);
    node.children = children
        .into_iter()
        .flat_map(|child| match child.kind {
            NodeKind::Paragraph if should_split_paragraph(&child) => split_paragraph(child),
            NodeKind::Heading { .. } if should_split_heading(&child) => split_heading(child),
            _ => vec![child],
        })
        .collect();
    for child in &mut node.children {
        split_paragraphs(child);
    }
}

fn should_split_paragraph(para: &Node) -> bool {
    para.children.iter().any(|child| match &child.kind {
        NodeKind::Break => true,
        NodeKind::Text { value } => value.contains('\n'),
        _ => false,
    })
}

fn should_split_heading(heading: &Node) -> bool {
    heading
        .position
        .is_some_and(|p| p.start.line != p.end.line)
}

fn split_heading(heading: Node) -> Vec<Node> {
    let position = heading.position;
    let para = Node {
        kind: NodeKind::Paragraph,
        ..heading
    };
    let mut expanded = split_paragraph(para);
    let rule = Node::new(NodeKind::ThematicBreak).with_position(position.map(|p| {
        Position::new(Point::new(p.end.line, p.start.column), p.end)
    }));
    expanded.push(rule);
    expanded
}

struct LineSplitter {
    start: Option<Point>,
    paragraphs: Vec<Node>,
    children: Vec<Node>,
    count: usize,
}

impl LineSplitter {
    fn flush(&mut self) {
        self.count += 1;
        if self.children.is_empty() {
            return;
        }
        let children = std::mem::take(&mut self.children);
        let position = self.start.map(|start| {
            let line = start.line + self.count - 1;
            let end_column = children
                .last()
                .and_then(|c| c.position)
                .map_or(start.column, |p| p.end.column);
            Position::new(Point::new(line, start.column), Point::new(line, end_column))
        });
        self.paragraphs.push(
            Node::new(NodeKind::Paragraph)
                .with_children(children)
                .with_position(position),
        );
    }
}

fn split_paragraph(para: Node) -> Vec<Node> {
    let start = para.position.map(|p| p.start);
    let mut splitter = LineSplitter {
        start,
        paragraphs: Vec::new(),
        children: Vec::new(),
        count: 0,
    };
    for child in para.children {
        if child.kind == NodeKind::Break {
            splitter.flush();
            continue;
        }
        let multiline = matches!(&child.kind, NodeKind::Text { value } if value.contains('\n'));
        if !multiline {
            splitter.children.push(child);
            continue;
        }
        let value = child.kind.value().unwrap_or_default();
        for (i, text) in split_text(value, child.position, start).into_iter().enumerate() {
            if i != 0 {
                splitter.flush();
            }
            if text.kind.value().is_some_and(|v| !v.is_empty()) {
                splitter.children.push(text);
            }
        }
    }
    splitter.flush();
    splitter.paragraphs
}

fn split_text(value: &str, position: Option<Position>, para_start: Option<Point>) -> Vec<Node> {
    value
        .split('\n')
        .enumerate()
        .map(|(i, line)| {
            let width = line.chars().count();
            let position = position.map(|p| {
                let (line_no, column) = if i == 0 {
                    (p.start.line, p.start.column)
                } else {
                    (
                        p.start.line + i,
                        para_start.map_or(p.start.column, |s| s.column),
                    )
                };
                Position::new(
                    Point::new(line_no, column),
                    Point::new(line_no, column + width),
                )
            });
            Node::text(line).with_position(position)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::parse::parse;

    #[test]
    fn test_split_soft_breaks() {
        let mut root = parse("Hello\nWorld\n");
        split_paragraphs(&mut root);
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.children[0].plain_text(), "Hello");
        assert_eq!(root.children[1].plain_text(), "World");
        assert_eq!(
            root.children[1].position,
            Some(Position::new(Point::new(2, 1), Point::new(2, 6)))
        );
    }

    #[test]
    fn test_split_inside_list_items() {
        let mut root = parse("- A\n  B\n");
        split_paragraphs(&mut root);
        let item = &root.children[0].children[0];
        assert_eq!(item.children.len(), 2);
        assert_eq!(item.children[1].plain_text(), "B");
        assert_eq!(item.children[1].position.map(|p| p.start), Some(Point::new(2, 3)));
    }

    #[test]
    fn test_split_setext_heading() {
        let mut root = parse("Text\n---\n");
        split_paragraphs(&mut root);
        let kinds: Vec<&str> = root.children.iter().map(Node::type_name).collect();
        assert_eq!(kinds, vec!["paragraph", "thematicBreak"]);
    }

    #[test]
    fn test_single_line_untouched() {
        let mut root = parse("a {b} c\n");
        let before = root.clone();
        split_paragraphs(&mut root);
        assert_eq!(root, before);
    }
}
