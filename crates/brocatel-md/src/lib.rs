//! Markdown front end for Brocatel stories.
//!
//! Parses story Markdown into an owned document tree, folds `:::` directive
//! blocks into directive nodes and serializes trees back to Markdown.
//!
//! # Example
//!
//! ```
//! use brocatel_md::{Diagnostics, merge_directives, parse, to_markdown};
//!
//! let mut root = parse(":::if `ready`\n- Go!\n");
//! let mut diagnostics = Diagnostics::new();
//! merge_directives(&mut root, &mut diagnostics);
//! assert!(diagnostics.is_empty());
//! assert_eq!(to_markdown(&root), ":::if`ready`\n\n- Go!");
//! ```

mod anchor;
mod diagnostic;
mod directive;
mod markdown;
mod node;
mod parse;
mod position;
mod split;

pub use anchor::{anchor, is_normal_link};
pub use diagnostic::{Diagnostic, Diagnostics};
pub use directive::merge_directives;
pub use markdown::to_markdown;
pub use node::{Node, NodeKind};
pub use parse::parse;
pub use position::{Point, Position};
pub use split::split_paragraphs;
