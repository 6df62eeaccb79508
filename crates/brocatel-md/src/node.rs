//! Document tree.
//!
//! A small owned tree modeled after mdast: every node has a kind, an optional
//! source position and an ordered list of children. Rewriting passes replace
//! nodes by rebinding slots in `children` rather than sharing references.

use crate::position::Position;

/// The kind of a document node, with its type-specific fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Root,
    Paragraph,
    Heading {
        depth: u8,
    },
    ThematicBreak,
    Blockquote,
    List {
        ordered: bool,
        start: Option<u64>,
    },
    ListItem,
    Code {
        lang: Option<String>,
        meta: Option<String>,
        value: String,
    },
    Html {
        value: String,
    },
    /// YAML front matter.
    Yaml {
        value: String,
    },
    /// A `:::name` block directive.
    Directive {
        name: String,
    },
    /// The inline-code label of a directive.
    DirectiveLabel,
    Text {
        value: String,
    },
    InlineCode {
        value: String,
    },
    /// An inline `{expr}` expression.
    Expression {
        value: String,
    },
    Emphasis,
    Strong,
    Delete,
    Link {
        url: String,
        title: Option<String>,
        /// Set for links wrapped in a block quote: the call suspends and resumes.
        coroutine: bool,
    },
    Image {
        url: String,
        title: Option<String>,
    },
    Break,
    /// Constructs the compiler has no use for (tables, footnotes, ...).
    Other {
        name: String,
    },
}

impl NodeKind {
    /// The mdast type name of this kind.
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Self::Root => "root",
            Self::Paragraph => "paragraph",
            Self::Heading { .. } => "heading",
            Self::ThematicBreak => "thematicBreak",
            Self::Blockquote => "blockquote",
            Self::List { .. } => "list",
            Self::ListItem => "listItem",
            Self::Code { .. } => "code",
            Self::Html { .. } => "html",
            Self::Yaml { .. } => "yaml",
            Self::Directive { .. } => "containerDirective",
            Self::DirectiveLabel => "containerDirectiveLabel",
            Self::Text { .. } => "text",
            Self::InlineCode { .. } => "inlineCode",
            Self::Expression { .. } => "mdxTextExpression",
            Self::Emphasis => "emphasis",
            Self::Strong => "strong",
            Self::Delete => "delete",
            Self::Link { .. } => "link",
            Self::Image { .. } => "image",
            Self::Break => "break",
            Self::Other { name } => name,
        }
    }

    /// The literal value carried by leaf kinds.
    #[must_use]
    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Code { value, .. }
            | Self::Html { value }
            | Self::Yaml { value }
            | Self::Text { value }
            | Self::InlineCode { value }
            | Self::Expression { value } => Some(value),
            _ => None,
        }
    }
}

/// A document node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub kind: NodeKind,
    pub position: Option<Position>,
    pub children: Vec<Node>,
}

impl Node {
    #[must_use]
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            position: None,
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children = children;
        self
    }

    #[must_use]
    pub fn with_position(mut self, position: Option<Position>) -> Self {
        self.position = position;
        self
    }

    /// A text node.
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::new(NodeKind::Text {
            value: value.into(),
        })
    }

    /// A Lua code block.
    #[must_use]
    pub fn lua(value: impl Into<String>, meta: Option<&str>) -> Self {
        Self::new(NodeKind::Code {
            lang: Some("lua".to_owned()),
            meta: meta.map(str::to_owned),
            value: value.into(),
        })
    }

    /// A directive label wrapping one inline code span.
    #[must_use]
    pub fn directive_label(code: impl Into<String>, position: Option<Position>) -> Self {
        let inline = Self::new(NodeKind::InlineCode { value: code.into() }).with_position(position);
        Self::new(NodeKind::DirectiveLabel)
            .with_children(vec![inline])
            .with_position(position)
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        self.kind.type_name()
    }

    /// Whether this is a Lua code block with the given meta string.
    #[must_use]
    pub fn is_lua_block(&self, expected: Option<&str>) -> bool {
        matches!(
            &self.kind,
            NodeKind::Code { lang: Some(lang), meta, .. }
                if lang == "lua" && meta.as_deref() == expected
        )
    }

    /// The label snippet of a directive node, if it has one.
    #[must_use]
    pub fn directive_label_code(&self) -> Option<&str> {
        let label = self.children.first()?;
        if label.kind != NodeKind::DirectiveLabel {
            return None;
        }
        match &label.children.first()?.kind {
            NodeKind::InlineCode { value } => Some(value),
            _ => None,
        }
    }

    /// Concatenated text content of the subtree.
    #[must_use]
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }

    /// Stamps every node lacking a position with its nearest ancestor's.
    pub fn inherit_positions(&mut self, inherited: Option<Position>) {
        if self.position.is_none() {
            self.position = inherited;
        }
        let position = self.position;
        for child in &mut self.children {
            child.inherit_positions(position);
        }
    }

    /// Applies `f` to every position in the subtree.
    pub fn map_positions(&mut self, f: &mut impl FnMut(&mut Position)) {
        if let Some(position) = self.position.as_mut() {
            f(position);
        }
        for child in &mut self.children {
            child.map_positions(f);
        }
    }
}

fn collect_text(node: &Node, out: &mut String) {
    match &node.kind {
        NodeKind::Text { value } | NodeKind::InlineCode { value } => out.push_str(value),
        _ => {
            for child in &node.children {
                collect_text(child, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::Point;

    #[test]
    fn test_directive_label_code() {
        let directive = Node::new(NodeKind::Directive {
            name: "if".to_owned(),
        })
        .with_children(vec![Node::directive_label("a == 1", None)]);
        assert_eq!(directive.directive_label_code(), Some("a == 1"));

        let bare = Node::new(NodeKind::Directive {
            name: "do".to_owned(),
        });
        assert_eq!(bare.directive_label_code(), None);
    }

    #[test]
    fn test_inherit_positions_fills_only_missing() {
        let outer = Position::at(Point::new(3, 1));
        let inner = Position::at(Point::new(4, 2));
        let mut node = Node::new(NodeKind::Paragraph)
            .with_position(Some(outer))
            .with_children(vec![
                Node::text("a"),
                Node::text("b").with_position(Some(inner)),
            ]);
        node.inherit_positions(None);
        assert_eq!(node.children[0].position, Some(outer));
        assert_eq!(node.children[1].position, Some(inner));
    }

    #[test]
    fn test_is_lua_block() {
        assert!(Node::lua("a", Some("func")).is_lua_block(Some("func")));
        assert!(!Node::lua("a", None).is_lua_block(Some("func")));
        assert!(Node::lua("a", None).is_lua_block(None));
    }
}
