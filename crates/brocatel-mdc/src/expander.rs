//! Macro expansion.
//!
//! Syntactic sugar is rewritten into the four built-in directives (`do`,
//! `if`, `local` and `nil`) and plain Lua code blocks. Other directives are
//! macros, run through the script engine with the directive as argument and
//! replaced by whatever node they return. Each node is rewritten until no
//! rule applies any more, before its children are visited.

use brocatel_md::{Diagnostics, Node, NodeKind, Position};

use crate::lua::{ScriptEngine, is_identifier};

/// Directives handled by the transformer itself.
#[must_use]
pub fn is_builtin_macro(name: &str) -> bool {
    matches!(name, "do" | "if" | "local" | "nil")
}

pub(crate) struct MacroExpander<'a> {
    engine: &'a dyn ScriptEngine,
    diagnostics: &'a mut Diagnostics,
    /// Bodies of `lua macro` code blocks seen so far.
    macros: Vec<String>,
}

impl<'a> MacroExpander<'a> {
    pub(crate) fn new(engine: &'a dyn ScriptEngine, diagnostics: &'a mut Diagnostics) -> Self {
        Self {
            engine,
            diagnostics,
            macros: Vec::new(),
        }
    }

    pub(crate) fn expand(&mut self, root: &mut Node) {
        self.expand_children(root);
        root.inherit_positions(None);
    }

    fn expand_children(&mut self, parent: &mut Node) {
        let directive = match &parent.kind {
            NodeKind::Directive { name } => Some(name.clone()),
            _ => None,
        };
        let parent_position = parent.position;
        for child in &mut parent.children {
            let mut position = child.position;
            while self.expand_sugar(child, directive.as_deref(), parent_position)
                || self.expand_macro(child)
            {
                if child.position.is_none() {
                    child.position = position;
                }
                position = child.position.or(position);
            }
            self.expand_children(child);
        }
    }

    fn expand_sugar(
        &mut self,
        node: &mut Node,
        parent_directive: Option<&str>,
        parent_position: Option<Position>,
    ) -> bool {
        self.expand_list(node, parent_directive, parent_position)
            || expand_conditional(node)
            || expand_thematic_break(node)
            || expand_blockquote(node)
    }

    /// A list outside a directive offers its items as choices.
    fn expand_list(
        &mut self,
        node: &mut Node,
        parent_directive: Option<&str>,
        parent_position: Option<Position>,
    ) -> bool {
        let NodeKind::List { ordered, .. } = node.kind else {
            return false;
        };
        if let Some(name) = parent_directive {
            if !is_builtin_macro(name) {
                self.diagnostics
                    .report("macro node not transformed", parent_position);
            }
            return false;
        }
        let function = if ordered { "FUNC.S_RECUR" } else { "FUNC.S_ONCE" };
        let position = node.position;
        let list = std::mem::replace(node, Node::new(NodeKind::Root));
        *node = Node::new(NodeKind::Directive {
            name: "do".to_owned(),
        })
        .with_children(vec![Node::directive_label(function, None), list])
        .with_position(position);
        true
    }

    fn expand_macro(&mut self, node: &mut Node) -> bool {
        if node.is_lua_block(Some("macro")) {
            if let Some(value) = node.kind.value() {
                self.macros.push(value.to_owned());
            }
            return false;
        }
        let NodeKind::Directive { name } = &node.kind else {
            return false;
        };
        if is_builtin_macro(name) {
            return false;
        }
        let name = name.clone();
        let shape_error = match node.children.as_slice() {
            [_, _, _, ..] => Some("too many children inside a macro node"),
            [list] if !is_list(list) => Some("expecting a list inside the macro node"),
            [list] if is_list(list) => None,
            [label, list] if label.kind == NodeKind::DirectiveLabel && is_list(list) => None,
            _ => Some("invalid macro node"),
        };
        if let Some(message) = shape_error {
            self.diagnostics.report(message, node.position);
            return false;
        }
        if !is_identifier(&name.replace('.', "")) {
            self.diagnostics
                .report("not a lua identifier", node.position);
            return false;
        }
        match self.engine.run_macro(&name, node, &self.macros) {
            Ok(mut generated) => {
                tracing::debug!(macro_name = %name, "Expanded macro");
                if generated.position.is_none() {
                    generated.position = node.position;
                }
                *node = generated;
                true
            }
            Err(e) => {
                self.diagnostics.report(e.to_string(), node.position);
                false
            }
        }
    }
}

fn is_list(node: &Node) -> bool {
    matches!(node.kind, NodeKind::List { .. })
}

/// A paragraph led by inline code is a statement when the code stands alone,
/// and a conditional line otherwise.
fn expand_conditional(node: &mut Node) -> bool {
    if node.kind != NodeKind::Paragraph {
        return false;
    }
    let Some(NodeKind::InlineCode { value }) = node.children.first().map(|c| &c.kind) else {
        return false;
    };
    let code = value.clone();
    if node.children.len() == 1 {
        *node = Node::lua(code, None).with_position(node.position);
        return true;
    }
    let label_position = node.children[0].position;
    let branch = sub_paragraph(node, 1);
    let item = Node::new(NodeKind::ListItem)
        .with_children(vec![branch])
        .with_position(node.position);
    let list = Node::new(NodeKind::List {
        ordered: false,
        start: None,
    })
    .with_children(vec![item])
    .with_position(node.position);
    *node = Node::new(NodeKind::Directive {
        name: "if".to_owned(),
    })
    .with_children(vec![Node::directive_label(code, label_position), list])
    .with_position(node.position);
    true
}

/// The paragraph made of `para`'s children from `start` on, with leading
/// whitespace trimmed.
pub(crate) fn sub_paragraph(para: &Node, start: usize) -> Node {
    let mut children = Vec::new();
    for child in para.children.iter().skip(start) {
        match &child.kind {
            NodeKind::Text { value } if children.is_empty() => {
                let trimmed = value.trim_start();
                if !trimmed.is_empty() {
                    let mut text = child.clone();
                    text.kind = NodeKind::Text {
                        value: trimmed.to_owned(),
                    };
                    children.push(text);
                }
            }
            _ => children.push(child.clone()),
        }
    }
    Node::new(NodeKind::Paragraph)
        .with_children(children)
        .with_position(para.position)
}

fn expand_thematic_break(node: &mut Node) -> bool {
    if node.kind != NodeKind::ThematicBreak {
        return false;
    }
    *node = Node::lua("END()", None).with_position(node.position);
    true
}

/// `> ***` ends the story. `> [](#x)` calls `x` as a coroutine.
fn expand_blockquote(node: &mut Node) -> bool {
    if node.kind != NodeKind::Blockquote || node.children.len() != 1 {
        return false;
    }
    let position = node.position;
    let child = &mut node.children[0];
    if child.kind == NodeKind::ThematicBreak {
        *node = Node::lua("END(true)", None).with_position(position);
        return true;
    }
    if child.kind != NodeKind::Paragraph || child.children.len() != 1 {
        return false;
    }
    let NodeKind::Link { coroutine, .. } = &mut child.children[0].kind else {
        return false;
    };
    *coroutine = true;
    let mut para = node.children.remove(0);
    if para.position.is_none() {
        para.position = position;
    }
    *node = para;
    true
}

#[cfg(test)]
mod tests {
    use brocatel_md::{merge_directives, parse, to_markdown};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::lua::LuaEngine;

    fn expanded(source: &str) -> (Node, Vec<String>) {
        let engine = LuaEngine::new().unwrap();
        let mut diagnostics = Diagnostics::new();
        let mut root = parse(source);
        merge_directives(&mut root, &mut diagnostics);
        MacroExpander::new(&engine, &mut diagnostics).expand(&mut root);
        let messages = diagnostics.iter().map(|d| d.message.clone()).collect();
        (root, messages)
    }

    fn assert_expands(source: &str, expected: &str) {
        let (root, messages) = expanded(source);
        assert!(messages.is_empty(), "{messages:?}");
        assert_eq!(to_markdown(&root), expected);
    }

    fn all_positioned(node: &Node) -> bool {
        node.position.is_some() && node.children.iter().all(all_positioned)
    }

    #[test]
    fn test_lists_become_choices() {
        assert_expands("- a\n- b", ":::do`FUNC.S_ONCE`\n\n- a\n- b");
        assert_expands("1. a\n2. b", ":::do`FUNC.S_RECUR`\n\n1. a\n2. b");
    }

    #[test]
    fn test_inline_code_paragraphs() {
        assert_expands("`x = 1`", "```lua\nx = 1\n```");
        assert_expands("`x` hello", ":::if`x`\n\n- hello");
    }

    #[test]
    fn test_breaks_and_quotes() {
        assert_expands("a\n\n***", "a\n\n```lua\nEND()\n```");
        assert_expands("> ***", "```lua\nEND(true)\n```");
        let (root, messages) = expanded("> [go](#x)");
        assert!(messages.is_empty(), "{messages:?}");
        assert_eq!(root.children[0].kind, NodeKind::Paragraph);
        assert!(matches!(
            root.children[0].children[0].kind,
            NodeKind::Link {
                coroutine: true,
                ..
            }
        ));
    }

    #[test]
    fn test_expanding_twice_is_stable() {
        let (root, _) = expanded("- a\n- b");
        let again = to_markdown(&root);
        let (reexpanded, messages) = expanded(&again);
        assert!(messages.is_empty(), "{messages:?}");
        assert_eq!(to_markdown(&reexpanded), again);
    }

    #[test]
    fn test_loop_macro() {
        assert_expands(
            ":::loop\n- a",
            ":::local\n\n- # #loop-1\n- :::local\n\n  - a\n- [](\\#loop-1)",
        );
        let (root, _) = expanded(":::loop\n- a");
        assert!(all_positioned(&root));
    }

    #[test]
    fn test_named_loops_and_counter() {
        let (root, _) = expanded(":::loop\n- a\n\n:::loop\n- b\n\n:::loop`name`\n- c");
        let markdown = to_markdown(&root);
        assert!(markdown.contains("# #loop-1"), "{markdown}");
        assert!(markdown.contains("# #loop-2"), "{markdown}");
        assert!(markdown.contains("# name"), "{markdown}");
        assert!(markdown.contains("[](name)"), "{markdown}");
    }

    #[test]
    fn test_switch_macro() {
        assert_expands(
            ":::switch`a = 0`\n- `a == 1`\n\n  ok\n- `a == 0`\n\n  ok",
            ":::do\n\n```lua func\na = 0\nif(\na == 1\n)then return IP:set(args:resolve(2))end\n\
             if(\na == 0\n)then return IP:set(args:resolve(3))end\n```\n\n- ok\n- ok",
        );
    }

    #[test]
    fn test_user_macro() {
        let (root, messages) = expanded(
            "```lua macro\nfunction quote(node)\n  return { type = 'paragraph', children = {\n    \
             { type = 'text', value = TO_MARKDOWN(node.children[1]) } } }\nend\n```\n\n:::quote\n- a",
        );
        assert!(messages.is_empty(), "{messages:?}");
        assert_eq!(root.children[1].plain_text(), "- a");
        assert!(all_positioned(&root));
    }

    #[test]
    fn test_macro_runtime_error() {
        let (_, messages) = expanded(
            "```lua macro\nfunction broken(node)\n  error('bad')\nend\n```\n\n:::broken\n- a",
        );
        assert_eq!(messages, vec!["bad", "macro node not transformed"]);
    }

    #[test]
    fn test_unknown_macro() {
        let (_, messages) = expanded(":::custom\n- a");
        assert_eq!(
            messages,
            vec!["unknown macro: custom", "macro node not transformed"]
        );
    }

    #[test]
    fn test_invalid_macro_names_and_shapes() {
        let (_, messages) = expanded(":::for-each\n- a");
        assert_eq!(
            messages,
            vec!["not a lua identifier", "macro node not transformed"]
        );

        let engine = LuaEngine::new().unwrap();
        let mut diagnostics = Diagnostics::new();
        let list = || {
            Node::new(NodeKind::List {
                ordered: false,
                start: None,
            })
        };
        let directive = |children| {
            Node::new(NodeKind::Directive {
                name: "custom".to_owned(),
            })
            .with_children(children)
        };
        let mut root = Node::new(NodeKind::Root).with_children(vec![
            directive(vec![list(), list(), list()]),
            directive(vec![Node::text("a")]),
            directive(vec![list(), list()]),
            directive(Vec::new()),
        ]);
        MacroExpander::new(&engine, &mut diagnostics).expand(&mut root);
        let messages: Vec<&str> = diagnostics.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "too many children inside a macro node",
                "macro node not transformed",
                "macro node not transformed",
                "macro node not transformed",
                "expecting a list inside the macro node",
                "invalid macro node",
                "macro node not transformed",
                "macro node not transformed",
                "invalid macro node",
            ]
        );
    }
}
