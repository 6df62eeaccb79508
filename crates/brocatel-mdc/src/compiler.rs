//! Single-file compilation pipeline.
//!
//! Markdown goes through parsing, directive merging, macro expansion,
//! transformation and serialization. Each compile gets its own script engine
//! and diagnostic sink, so files can be compiled independently.

use std::collections::BTreeMap;

use brocatel_md::{Diagnostic, Diagnostics, Position, merge_directives, parse, split_paragraphs};
use tracing::debug;

use crate::error::CompileError;
use crate::expander::MacroExpander;
use crate::gettext::collect_texts;
use crate::ir::{Array, Text};
use crate::labels::LabelTree;
use crate::line_remap::{LineMapping, auto_new_line};
use crate::links::{StoryLink, collect_links};
use crate::lua::LuaEngine;
use crate::serializer::Serializer;
use crate::source_map::Mapping;
use crate::transformer::{AstTransformer, CodeSnippet};

/// Options for [`Compiler`].
#[derive(Clone, Debug)]
pub struct CompilerOptions {
    /// Record child positions in every scope's metadata.
    pub debug: bool,
    /// Treat every source line as its own paragraph.
    pub auto_new_line: bool,
    /// Split multi-line paragraphs into one paragraph per line.
    pub split_paragraphs: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            debug: false,
            auto_new_line: false,
            split_paragraphs: true,
        }
    }
}

/// Result of compiling one Markdown file.
#[derive(Clone, Debug)]
pub struct CompiledFile {
    /// File stem, e.g. `main` for `main.md`.
    pub stem: String,
    /// The serialized Lua table.
    pub code: String,
    /// Source mappings of `code`.
    pub mappings: Vec<Mapping>,
    /// Diagnostics, tagged with `<stem>.md`.
    pub diagnostics: Vec<Diagnostic>,
    /// Stems of linked files, with the first link to each.
    pub dependencies: BTreeMap<String, Option<Position>>,
    /// `lua global` snippets for the bundle prelude.
    pub globals: Vec<String>,
    /// Story identifiers declared in the front matter.
    pub ifid: Vec<String>,
    /// Texts in document order, for translation catalogs.
    pub texts: Vec<Text>,
    /// Labeled scopes.
    pub labels: LabelTree,
    pub links: Vec<StoryLink>,
    pub snippets: Vec<CodeSnippet>,
    /// Present when `auto_new_line` rewrote the source.
    pub line_mapping: Option<LineMapping>,
    /// The intermediate tree `code` was generated from.
    pub root: Array,
}

impl CompiledFile {
    /// File name used in diagnostics and source maps.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.md", self.stem)
    }

    /// Whether the file compiled without diagnostics.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Compiles story files.
///
/// # Example
///
/// ```
/// use brocatel_mdc::{Compiler, CompilerOptions};
///
/// let compiler = Compiler::new(CompilerOptions::default());
/// let compiled = compiler.compile("main", "Hello World!").unwrap();
/// assert_eq!(compiled.code, "{_,\n\"Hello World!\"}");
/// ```
#[derive(Clone, Debug, Default)]
pub struct Compiler {
    options: CompilerOptions,
}

impl Compiler {
    #[must_use]
    pub fn new(options: CompilerOptions) -> Self {
        Self { options }
    }

    #[must_use]
    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Compiles the Markdown `content` of file `stem`.
    ///
    /// Problems in the story are returned as diagnostics on the compiled
    /// file.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError`] when the script engine cannot be started.
    pub fn compile(&self, stem: &str, content: &str) -> Result<CompiledFile, CompileError> {
        let (source, line_mapping) = if self.options.auto_new_line {
            let (source, mapping) = auto_new_line(content);
            (source, Some(mapping))
        } else {
            (content.to_owned(), None)
        };

        let mut root = parse(&source);
        if let Some(mapping) = &line_mapping {
            mapping.remap(&mut root);
        }
        if self.options.split_paragraphs {
            split_paragraphs(&mut root);
        }

        let mut diagnostics = Diagnostics::new();
        merge_directives(&mut root, &mut diagnostics);
        debug!(file = %stem, "directives merged");

        let engine = LuaEngine::new()?;
        MacroExpander::new(&engine, &mut diagnostics).expand(&mut root);
        debug!(file = %stem, "macros expanded");

        let transformed = AstTransformer::new(stem, &engine, &mut diagnostics).transform(&root);
        debug!(
            file = %stem,
            dependencies = transformed.dependencies.len(),
            "transformed"
        );

        let (code, mappings) =
            Serializer::new(&engine, &mut diagnostics, self.options.debug).serialize(&transformed.root);

        let file_name = format!("{stem}.md");
        if !diagnostics.is_empty() {
            debug!(file = %file_name, count = diagnostics.len(), "diagnostics reported");
        }
        Ok(CompiledFile {
            stem: stem.to_owned(),
            code,
            mappings,
            diagnostics: diagnostics.into_tagged(&file_name),
            dependencies: transformed.dependencies,
            globals: transformed.globals,
            ifid: transformed.ifid,
            texts: collect_texts(&transformed.root),
            labels: LabelTree::from_root(&transformed.root),
            links: collect_links(&transformed.root),
            snippets: transformed.snippets,
            line_mapping,
            root: transformed.root,
        })
    }
}

#[cfg(test)]
mod tests {
    use brocatel_md::Point;
    use pretty_assertions::assert_eq;

    use super::*;

    fn compile_with(source: &str, options: CompilerOptions) -> (String, Vec<String>) {
        let compiled = Compiler::new(options).compile("main", source).unwrap();
        let messages = compiled
            .diagnostics
            .iter()
            .map(|d| d.message.clone())
            .collect();
        (compiled.code.replace('\n', ""), messages)
    }

    fn compile(source: &str) -> String {
        let (code, messages) = compile_with(source, CompilerOptions::default());
        assert!(messages.is_empty(), "{messages:?}");
        code
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(compile("test"), "{_,\"test\"}");
        assert_eq!(compile("hello\n\nhello"), "{_,\"hello\",\"hello\"}");
    }

    #[test]
    fn test_tags_and_values() {
        assert_eq!(
            compile("[a] [b] c [d] e"),
            "{_,{tags={a=\"\",b=\"\"},text=\"c \\\\[d] e\"}}"
        );
        assert_eq!(
            compile("The {count?} Names of God"),
            "{_,{plural=\"v1\",text=\"The {v1} Names of God\",values={v1=function()return(count)end}}}"
        );
        let (_, messages) = compile_with("The {} Names of God", CompilerOptions::default());
        assert_eq!(messages, vec!["empty expression"]);
    }

    #[test]
    fn test_headings() {
        assert_eq!(
            compile("# Heading 1"),
            "{{labels={[\"heading-1\"]={2}}},{{label=\"heading-1\"}}}"
        );
        let expected = "
            {
              {labels={a={2},f={3}}},
              {
                {label=\"a\",labels={b={3},e={5}}},
                {func=function(args)END()end},
                {
                  {label=\"b\",labels={c={3},d={5}}},
                  {func=function(args)END()end},
                  {{label=\"c\"},{func=function(args)END()end}},
                  {func=function(args)END()end},
                  {{label=\"d\"},{func=function(args)END()end}},
                  {func=function(args)END()end}
                },
                {func=function(args)END()end},
                {{label=\"e\"},{func=function(args)END()end}},
                {func=function(args)END()end}
              },
              {{label=\"f\"}}
            }"
        .replace([' ', '\n'], "");
        assert_eq!(compile("# A\n## B\n### C\n### D\n## E\n# F"), expected);
    }

    #[test]
    fn test_links() {
        assert_eq!(
            compile("[](a)\n# A"),
            "{{labels={a={3}}},{link={\"a\"},params=true},{{label=\"a\"}}}"
        );
    }

    #[test]
    fn test_function_heading() {
        assert_eq!(
            compile("# func {}\n[{}](#func)\n\n---"),
            "{{labels={func={3}}},{func=function(args)END()end},\
             {{routine={},label=\"func\"},{link={\"func\"},params=function()return {}end},\
             {func=function(args)END()end}}}"
        );
    }

    #[test]
    fn test_choices() {
        assert_eq!(
            compile("- a\n- b"),
            "{_,{args={_,{_,\"a\"},{_,\"b\"}},func=function(args)FUNC.S_ONCE(args)end}}"
        );
        assert_eq!(
            compile("- # A\n- [](a)"),
            "{{labels={a={2,\"args\",2,2}}},\
             {args={_,{_,{{label=\"a\"}}},{_,{link={\"a\"},params=true}}},\
             func=function(args)FUNC.S_ONCE(args)end}}"
        );
    }

    #[test]
    fn test_bare_list_matches_expanded_directive() {
        let expected = "{_,{args={_,{_,\"a\"},{_,\"b\"}},func=function(args)FUNC.S_ONCE(args)end}}";
        assert_eq!(compile("- a\n- b"), expected);
        assert_eq!(compile(":::do`FUNC.S_ONCE`\n- a\n- b"), expected);
    }

    #[test]
    fn test_visit_counter() {
        let values = "values={v1=function()return(VISITS(x))end}";
        assert_eq!(
            compile("Visited {VISITS(x)} times.\n\n# x\n\nVisited {VISITS(x)} times."),
            format!(
                "{{{{labels={{x={{3}}}}}},\
                 {{text=\"Visited {{v1}} times.\",{values}}},\
                 {{{{label=\"x\"}},{{text=\"Visited {{v1}} times.\",{values}}}}}}}"
            )
        );
    }

    #[test]
    fn test_loop_macro() {
        assert_eq!(
            compile(":::loop`id`\n- - Hello"),
            "{{labels={id={2,2}}},{_,{{label=\"id\"},\
             {_,{args={_,{_,\"Hello\"}},func=function(args)FUNC.S_ONCE(args)end}},\
             {link={\"id\"},params=true}}}}"
        );
    }

    #[test]
    fn test_illegal_snippet() {
        let (code, messages) = compile_with("`a +` text", CompilerOptions::default());
        assert_eq!(messages.len(), 1, "{messages:?}");
        assert!(messages[0].starts_with("illegal lua snippet: "), "{messages:?}");
        assert!(code.contains("function()return(a +)end"));
    }

    #[test]
    fn test_debug_positions() {
        let options = CompilerOptions {
            debug: true,
            ..CompilerOptions::default()
        };
        let (code, _) = compile_with("a\n\nb", options);
        assert_eq!(code, "{{debug={\"1:1\",\"\",\"3:1\"}},\"a\",\"b\"}");
    }

    #[test]
    fn test_auto_new_line_positions() {
        let options = CompilerOptions {
            auto_new_line: true,
            ..CompilerOptions::default()
        };
        let compiled = Compiler::new(options).compile("main", "a\nb\n`x` c").unwrap();
        assert_eq!(compiled.code.replace('\n', ""), "{_,\"a\",\"b\",{function()return(x)end,{_,\"c\"}}}");
        let lines: Vec<usize> = compiled
            .texts
            .iter()
            .filter_map(|t| t.position.map(|p| p.start.line))
            .collect();
        assert_eq!(lines, vec![1, 2, 3]);
    }

    #[test]
    fn test_compiled_file_data() {
        let source = "---\nifid: 9e2c5a3e-2d4f-4c1a-8b7e-0a1b2c3d4e5f\n---\n\n# Start\n\n[go](other.md#end)\n\n```lua global\nGLOBAL = 1\n```";
        let compiled = Compiler::default().compile("main", source).unwrap();
        assert!(compiled.is_clean(), "{:?}", compiled.diagnostics);
        assert_eq!(compiled.ifid, vec!["9E2C5A3E-2D4F-4C1A-8B7E-0A1B2C3D4E5F"]);
        assert_eq!(compiled.globals.len(), 1);
        assert_eq!(
            compiled.dependencies.keys().collect::<Vec<_>>(),
            vec!["other"]
        );
        assert!(compiled.labels.children.contains_key("start"));
        assert_eq!(compiled.links.len(), 1);
        assert_eq!(compiled.links[0].root.as_deref(), Some("other"));
        assert_eq!(compiled.file_name(), "main.md");
    }

    #[test]
    fn test_diagnostics_are_tagged() {
        let compiled = Compiler::default().compile("intro", "{}").unwrap();
        let diagnostic = &compiled.diagnostics[0];
        assert_eq!(diagnostic.file.as_deref(), Some("intro.md"));
        assert_eq!(diagnostic.position.map(|p| p.start), Some(Point::new(1, 1)));
    }
}
