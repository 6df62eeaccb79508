//! Brocatel story compiler.
//!
//! Compiles story Markdown into Lua table bytecode for the Brocatel runtime:
//!
//! 1. [`brocatel_md`] parses the source and folds `:::` directives.
//! 2. Macros (`loop`, `switch` and user-defined ones written in Lua) are
//!    expanded into built-in directives.
//! 3. The tree is transformed into scopes, texts, links, conditionals and
//!    functions, with headings registered as labels.
//! 4. The result is serialized as a Lua table, with source mappings.
//!
//! [`Linker`] compiles a whole story, following cross-file links, and
//! produces a single bundle.
//!
//! # Example
//!
//! ```
//! use brocatel_mdc::{Compiler, CompilerOptions};
//!
//! let compiler = Compiler::new(CompilerOptions::default());
//! let compiled = compiler.compile("main", "- Yes\n- No").unwrap();
//! assert!(compiled.diagnostics.is_empty());
//! assert!(compiled.code.contains("FUNC.S_ONCE(args)"));
//! ```

mod compiler;
mod error;
mod expander;
mod gettext;
mod headings;
mod ir;
mod labels;
mod line_remap;
mod linker;
mod links;
mod lua;
mod serializer;
mod source_map;
mod table;
mod transformer;

pub use compiler::{CompiledFile, Compiler, CompilerOptions};
pub use error::{CompileError, FetchError, ScriptError};
pub use expander::is_builtin_macro;
pub use gettext::{collect_texts, compile_gettext};
pub use ir::{Array, Element, Func, IfElse, Link, Metadata, PathSegment, RelativePath, Text};
pub use labels::LabelTree;
pub use line_remap::{LineMapping, auto_new_line};
pub use linker::{
    BUNDLE_VERSION, Bundle, FsFetcher, Linker, MemoryFetcher, SourceFetcher, render_bundle,
    validate_links,
};
pub use links::{
    LabelTreeValidator, LinkCheck, LinkValidator, StoryLink, collect_links, normalize_stem,
};
pub use lua::{LuaEngine, ScriptEngine, is_identifier};
pub use source_map::{Mapping, MarkdownSourceError, SourceMap, lua_error_to_source};
pub use transformer::CodeSnippet;
