//! Builds the document tree from pulldown-cmark offset events.
//!
//! pulldown-cmark reports tight list items without paragraph wrappers. The
//! builder opens an implicit paragraph for such inline content so that every
//! list item holds block nodes, the shape later stages rely on.

use std::ops::Range;

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag};

use crate::node::{Node, NodeKind};
use crate::position::{LineIndex, Position};

/// Parses Markdown into a document tree rooted at a `root` node.
#[must_use]
pub fn parse(source: &str) -> Node {
    let mut builder = TreeBuilder::new(source);
    let options = Options::ENABLE_YAML_STYLE_METADATA_BLOCKS | Options::ENABLE_STRIKETHROUGH;
    for (event, range) in Parser::new_ext(source, options).into_offset_iter() {
        builder.event(event, range);
    }
    builder.finish()
}

struct Frame {
    node: Node,
    range: Range<usize>,
    /// Paragraph opened by the builder rather than by a `Start` event.
    implicit: bool,
    /// Text run not yet split into text and expression nodes.
    pending: Option<(String, Range<usize>)>,
}

impl Frame {
    fn new(kind: NodeKind, range: Range<usize>) -> Self {
        Self {
            node: Node::new(kind),
            range,
            implicit: false,
            pending: None,
        }
    }

    fn is_literal(&self) -> bool {
        matches!(
            self.node.kind,
            NodeKind::Code { .. } | NodeKind::Yaml { .. } | NodeKind::Html { .. }
        )
    }

    fn holds_blocks(&self) -> bool {
        matches!(
            self.node.kind,
            NodeKind::Root | NodeKind::ListItem | NodeKind::Blockquote | NodeKind::Directive { .. }
        )
    }
}

struct TreeBuilder<'a> {
    source: &'a str,
    index: LineIndex<'a>,
    stack: Vec<Frame>,
}

impl<'a> TreeBuilder<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            index: LineIndex::new(source),
            stack: vec![Frame::new(NodeKind::Root, 0..source.len())],
        }
    }

    fn event(&mut self, event: Event<'_>, range: Range<usize>) {
        match event {
            Event::Start(tag) => {
                if is_inline(&tag) {
                    self.open_implicit(&range);
                } else {
                    self.close_implicit();
                }
                self.flush_text();
                self.stack.push(Frame::new(open_kind(tag), range));
            }
            Event::End(_) => {
                self.close_implicit();
                self.close();
            }
            Event::Text(text) => {
                if let Some(top) = self.stack.last_mut()
                    && top.is_literal()
                {
                    append_literal(&mut top.node.kind, &text);
                    return;
                }
                self.push_text(&text, range);
            }
            Event::Html(html) => {
                if let Some(top) = self.stack.last_mut()
                    && top.is_literal()
                {
                    append_literal(&mut top.node.kind, &html);
                    return;
                }
                self.push_inline(NodeKind::Html { value: html.into_string() }, range);
            }
            Event::InlineHtml(html) => {
                self.push_inline(NodeKind::Html { value: html.into_string() }, range);
            }
            Event::Code(code) => {
                self.push_inline(NodeKind::InlineCode { value: code.into_string() }, range);
            }
            Event::SoftBreak => self.push_text("\n", range),
            Event::HardBreak => self.push_inline(NodeKind::Break, range),
            Event::Rule => {
                self.close_implicit();
                self.attach(Node::new(NodeKind::ThematicBreak), &range);
            }
            Event::FootnoteReference(_) => {
                self.push_inline(other("footnoteReference"), range);
            }
            Event::TaskListMarker(_) => {}
            Event::InlineMath(_) | Event::DisplayMath(_) => {
                self.push_inline(other("math"), range);
            }
        }
    }

    fn finish(mut self) -> Node {
        while self.stack.len() > 1 {
            self.close();
        }
        self.flush_text();
        let Some(mut root) = self.stack.pop() else {
            return Node::new(NodeKind::Root);
        };
        root.node.position = Some(Position::new(
            self.index.point(0),
            self.index.point(self.source.len()),
        ));
        root.node
    }

    fn open_implicit(&mut self, range: &Range<usize>) {
        if self.stack.last().is_some_and(Frame::holds_blocks) {
            let mut frame = Frame::new(NodeKind::Paragraph, range.clone());
            frame.implicit = true;
            self.stack.push(frame);
        }
    }

    fn close_implicit(&mut self) {
        if self.stack.last().is_some_and(|f| f.implicit) {
            self.close();
        }
    }

    /// Pops the top frame and attaches it to its parent.
    fn close(&mut self) {
        self.flush_text();
        let Some(frame) = self.stack.pop() else {
            return;
        };
        let mut node = frame.node;
        if let NodeKind::Code { value, .. }
        | NodeKind::Yaml { value }
        | NodeKind::Html { value } = &mut node.kind
            && value.ends_with('\n')
        {
            value.pop();
        }
        self.attach(node, &frame.range);
    }

    fn attach(&mut self, mut node: Node, range: &Range<usize>) {
        self.flush_text();
        if node.position.is_none() {
            node.position = Some(self.index.position(range));
        }
        if let Some(top) = self.stack.last_mut() {
            if top.implicit {
                top.range.end = top.range.end.max(range.end);
            }
            top.node.children.push(node);
        }
    }

    fn push_inline(&mut self, kind: NodeKind, range: Range<usize>) {
        self.open_implicit(&range);
        self.attach(Node::new(kind), &range);
    }

    fn push_text(&mut self, text: &str, range: Range<usize>) {
        self.open_implicit(&range);
        let Some(top) = self.stack.last_mut() else {
            return;
        };
        if top.implicit {
            top.range.end = top.range.end.max(range.end);
        }
        match &mut top.pending {
            Some((value, run)) => {
                value.push_str(text);
                run.end = range.end;
            }
            None => top.pending = Some((text.to_owned(), range)),
        }
    }

    /// Splits the pending text run of the top frame into text and `{expr}` nodes.
    fn flush_text(&mut self) {
        let Some(top) = self.stack.last_mut() else {
            return;
        };
        let Some((value, run)) = top.pending.take() else {
            return;
        };
        let exact = self.source.get(run.clone()) == Some(value.as_str());
        for piece in split_expressions(&value) {
            let range = if exact {
                run.start + piece.range.start..run.start + piece.range.end
            } else {
                run.clone()
            };
            let kind = if piece.expression {
                NodeKind::Expression {
                    value: value[piece.range.start + 1..piece.range.end - 1].to_owned(),
                }
            } else {
                NodeKind::Text {
                    value: value[piece.range].to_owned(),
                }
            };
            let position = self.index.position(&range);
            top.node
                .children
                .push(Node::new(kind).with_position(Some(position)));
        }
    }
}

struct Piece {
    expression: bool,
    range: Range<usize>,
}

/// Splits `text` at balanced `{...}` spans. Unbalanced braces stay literal.
fn split_expressions(text: &str) -> Vec<Piece> {
    let mut pieces = Vec::new();
    let mut literal_start = 0;
    let mut cursor = 0;
    while let Some(offset) = text[cursor..].find('{') {
        let open = cursor + offset;
        let Some(close) = matching_brace(text, open) else {
            break;
        };
        if literal_start < open {
            pieces.push(Piece {
                expression: false,
                range: literal_start..open,
            });
        }
        pieces.push(Piece {
            expression: true,
            range: open..close + 1,
        });
        literal_start = close + 1;
        cursor = close + 1;
    }
    if literal_start < text.len() {
        pieces.push(Piece {
            expression: false,
            range: literal_start..text.len(),
        });
    }
    pieces
}

fn matching_brace(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text[open..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

fn append_literal(kind: &mut NodeKind, text: &str) {
    if let NodeKind::Code { value, .. } | NodeKind::Yaml { value } | NodeKind::Html { value } =
        kind
    {
        value.push_str(text);
    }
}

fn is_inline(tag: &Tag<'_>) -> bool {
    matches!(
        tag,
        Tag::Emphasis
            | Tag::Strong
            | Tag::Strikethrough
            | Tag::Superscript
            | Tag::Subscript
            | Tag::Link { .. }
            | Tag::Image { .. }
    )
}

fn other(name: &str) -> NodeKind {
    NodeKind::Other {
        name: name.to_owned(),
    }
}

fn heading_depth(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_owned())
}

fn open_kind(tag: Tag<'_>) -> NodeKind {
    match tag {
        Tag::Paragraph => NodeKind::Paragraph,
        Tag::Heading { level, .. } => NodeKind::Heading {
            depth: heading_depth(level),
        },
        Tag::BlockQuote(_) => NodeKind::Blockquote,
        Tag::CodeBlock(CodeBlockKind::Fenced(info)) => {
            let info = info.trim();
            let (lang, meta) = match info.split_once(char::is_whitespace) {
                Some((lang, meta)) => (non_empty(lang), non_empty(meta)),
                None => (non_empty(info), None),
            };
            NodeKind::Code {
                lang,
                meta,
                value: String::new(),
            }
        }
        Tag::CodeBlock(CodeBlockKind::Indented) => NodeKind::Code {
            lang: None,
            meta: None,
            value: String::new(),
        },
        Tag::HtmlBlock => NodeKind::Html {
            value: String::new(),
        },
        Tag::List(start) => NodeKind::List {
            ordered: start.is_some(),
            start,
        },
        Tag::Item => NodeKind::ListItem,
        Tag::MetadataBlock(_) => NodeKind::Yaml {
            value: String::new(),
        },
        Tag::Emphasis => NodeKind::Emphasis,
        Tag::Strong => NodeKind::Strong,
        Tag::Strikethrough => NodeKind::Delete,
        Tag::Link {
            dest_url, title, ..
        } => NodeKind::Link {
            url: dest_url.into_string(),
            title: non_empty(&title),
            coroutine: false,
        },
        Tag::Image {
            dest_url, title, ..
        } => NodeKind::Image {
            url: dest_url.into_string(),
            title: non_empty(&title),
        },
        Tag::Table(_) => other("table"),
        Tag::TableHead | Tag::TableRow => other("tableRow"),
        Tag::TableCell => other("tableCell"),
        Tag::FootnoteDefinition(_) => other("footnoteDefinition"),
        Tag::Superscript => other("superscript"),
        Tag::Subscript => other("subscript"),
        Tag::DefinitionList
        | Tag::DefinitionListTitle
        | Tag::DefinitionListDefinition => other("definitionList"),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::position::Point;

    fn kinds(node: &Node) -> Vec<&str> {
        node.children.iter().map(Node::type_name).collect()
    }

    #[test]
    fn test_parse_blocks() {
        let root = parse("# Title\n\nHello\n\n---\n\n```lua func\nEND()\n```\n");
        assert_eq!(kinds(&root), vec!["heading", "paragraph", "thematicBreak", "code"]);
        assert_eq!(root.children[0].kind, NodeKind::Heading { depth: 1 });
        assert_eq!(
            root.children[3].kind,
            NodeKind::Code {
                lang: Some("lua".to_owned()),
                meta: Some("func".to_owned()),
                value: "END()".to_owned(),
            }
        );
    }

    #[test]
    fn test_parse_heading_position() {
        let root = parse("\n# Hello\n");
        assert_eq!(
            root.children[0].position,
            Some(Position::new(Point::new(2, 1), Point::new(2, 8)))
        );
    }

    #[test]
    fn test_tight_list_items_get_paragraphs() {
        let root = parse("- a\n- b\n");
        let list = &root.children[0];
        assert_eq!(
            list.kind,
            NodeKind::List {
                ordered: false,
                start: None
            }
        );
        for item in &list.children {
            assert_eq!(kinds(item), vec!["paragraph"]);
        }
        assert_eq!(list.children[1].children[0].plain_text(), "b");
    }

    #[test]
    fn test_nested_list() {
        let root = parse("- - Hello\n");
        let outer = &root.children[0].children[0];
        assert_eq!(kinds(outer), vec!["list"]);
        assert_eq!(outer.children[0].children[0].plain_text(), "Hello");
    }

    #[test]
    fn test_soft_breaks_merge_into_text() {
        let root = parse("a\nb\n");
        let para = &root.children[0];
        assert_eq!(
            para.children[0].kind,
            NodeKind::Text {
                value: "a\nb".to_owned()
            }
        );
    }

    #[test]
    fn test_expressions_are_split_from_text() {
        let root = parse("The {count} Names\n");
        let para = &root.children[0];
        assert_eq!(kinds(para), vec!["text", "mdxTextExpression", "text"]);
        assert_eq!(
            para.children[1].kind,
            NodeKind::Expression {
                value: "count".to_owned()
            }
        );
        assert_eq!(
            para.children[1].position,
            Some(Position::new(Point::new(1, 5), Point::new(1, 12)))
        );
    }

    #[test]
    fn test_function_heading_expression() {
        let root = parse("# fibonacci { i, j }\n");
        let heading = &root.children[0];
        assert_eq!(kinds(heading), vec!["text", "mdxTextExpression"]);
    }

    #[test]
    fn test_link_with_expression() {
        let root = parse("[{ n = 8 }](#fib)\n");
        let link = &root.children[0].children[0];
        assert_eq!(
            link.kind,
            NodeKind::Link {
                url: "#fib".to_owned(),
                title: None,
                coroutine: false
            }
        );
        assert_eq!(kinds(link), vec!["mdxTextExpression"]);
    }

    #[test]
    fn test_unbalanced_brace_is_text() {
        let root = parse("a { b\n");
        assert_eq!(kinds(&root.children[0]), vec!["text"]);
    }

    #[test]
    fn test_front_matter() {
        let root = parse("---\nIFID: x\n---\n\nHello\n");
        assert_eq!(
            root.children[0].kind,
            NodeKind::Yaml {
                value: "IFID: x".to_owned()
            }
        );
    }

    #[test]
    fn test_directive_line_shape() {
        let root = parse(":::if `a`\n- b\n");
        assert_eq!(kinds(&root), vec!["paragraph", "list"]);
        assert_eq!(kinds(&root.children[0]), vec!["text", "inlineCode"]);
    }

    #[test]
    fn test_root_position_spans_document() {
        let root = parse("a\n");
        assert_eq!(
            root.position,
            Some(Position::new(Point::new(1, 1), Point::new(2, 1)))
        );
    }
}
