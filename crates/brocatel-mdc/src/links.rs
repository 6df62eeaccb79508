//! Link collection and validation.

use std::collections::BTreeMap;

use brocatel_md::Position;
use serde::Serialize;

use crate::ir::{Array, Element};
use crate::labels::LabelTree;

/// A link found in a compiled file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoryLink {
    pub labels: Vec<String>,
    /// Target file stem for cross-file links.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
    /// Labels of the enclosing labeled scopes, outermost first.
    pub scope: Vec<String>,
    pub position: Option<Position>,
}

impl StoryLink {
    /// The target as written, e.g. `a/b`.
    #[must_use]
    pub fn target(&self) -> String {
        self.labels.join("/")
    }
}

/// Lists every link under `root` with its enclosing scopes.
#[must_use]
pub fn collect_links(root: &Array) -> Vec<StoryLink> {
    let mut links = Vec::new();
    walk(root, &mut Vec::new(), &mut links);
    links
}

/// Canonical stem of a linked file: `./a/../b.md` becomes `b`.
///
/// `..` segments that would escape the story directory are kept.
#[must_use]
pub fn normalize_stem(stem: &str) -> String {
    let stem = stem.trim();
    let stem = stem.strip_suffix(".md").unwrap_or(stem);
    let mut segments: Vec<&str> = Vec::new();
    for segment in stem.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." if segments.last().is_some_and(|last| *last != "..") => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }
    segments.join("/")
}

fn walk(array: &Array, scope: &mut Vec<String>, links: &mut Vec<StoryLink>) {
    if let Some(label) = &array.meta.label {
        scope.push(label.clone());
    }
    for child in &array.children {
        if let Element::Link(link) = child {
            links.push(StoryLink {
                labels: link.labels.clone(),
                root: link.root.clone(),
                scope: scope.clone(),
                position: link.position,
            });
        }
        for (_, nested) in child.child_arrays() {
            walk(nested, scope, links);
        }
    }
    if array.meta.label.is_some() {
        scope.pop();
    }
}

/// Outcome of checking one link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkCheck {
    Resolved,
    Broken,
    /// The target file is not available, so the link cannot be checked.
    Unknown,
}

/// Checks links against compiled files.
pub trait LinkValidator {
    /// Checks `link`, found in file `stem`.
    fn check(&self, stem: &str, link: &StoryLink) -> LinkCheck;
}

/// Resolves links the way the runtime does, using the label trees of every
/// loaded file.
///
/// The first label is looked up among the direct labels of the enclosing
/// scopes, innermost first. Failing that, a label that is unique below one of
/// the enclosing scopes is accepted. Remaining labels must be direct labels
/// of the scope found so far. Cross-file links start at the target root.
#[derive(Debug, Default)]
pub struct LabelTreeValidator {
    trees: BTreeMap<String, LabelTree>,
}

impl LabelTreeValidator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, stem: impl Into<String>, tree: LabelTree) {
        self.trees.insert(stem.into(), tree);
    }
}

impl LinkValidator for LabelTreeValidator {
    fn check(&self, stem: &str, link: &StoryLink) -> LinkCheck {
        let target = link.root.as_deref().unwrap_or(stem);
        let Some(root) = self.trees.get(target) else {
            return LinkCheck::Unknown;
        };
        let Some((first, rest)) = link.labels.split_first() else {
            return LinkCheck::Resolved;
        };
        let scope: &[String] = if link.root.is_some() { &[] } else { &link.scope };

        let mut chain = vec![root];
        let mut current = root;
        for label in scope {
            let Some(next) = current.children.get(label) else {
                break;
            };
            chain.push(next);
            current = next;
        }

        let start = chain
            .iter()
            .rev()
            .find_map(|tree| tree.children.get(first))
            .or_else(|| chain.iter().rev().find_map(|tree| tree.find_unique(first)));
        let Some(mut current) = start else {
            return LinkCheck::Broken;
        };
        for label in rest {
            match current.children.get(label) {
                Some(next) => current = next,
                None => return LinkCheck::Broken,
            }
        }
        LinkCheck::Resolved
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn tree(entries: &[(&str, LabelTree)]) -> LabelTree {
        LabelTree {
            position: None,
            children: entries
                .iter()
                .map(|(k, v)| ((*k).to_owned(), v.clone()))
                .collect(),
        }
    }

    fn link(labels: &[&str], scope: &[&str], root: Option<&str>) -> StoryLink {
        StoryLink {
            labels: labels.iter().map(|s| (*s).to_owned()).collect(),
            root: root.map(str::to_owned),
            scope: scope.iter().map(|s| (*s).to_owned()).collect(),
            position: None,
        }
    }

    fn validator() -> LabelTreeValidator {
        let leaf = LabelTree::default();
        let main = tree(&[
            ("a", tree(&[("b", tree(&[("deep", leaf.clone())]))])),
            ("c", tree(&[("b", leaf.clone())])),
        ]);
        let mut validator = LabelTreeValidator::new();
        validator.insert("main", main);
        validator.insert("other", tree(&[("x", leaf)]));
        validator
    }

    #[test]
    fn test_resolves_through_enclosing_scopes() {
        let validator = validator();
        assert_eq!(validator.check("main", &link(&["b"], &["a"], None)), LinkCheck::Resolved);
        assert_eq!(validator.check("main", &link(&["c"], &["a", "b"], None)), LinkCheck::Resolved);
        assert_eq!(validator.check("main", &link(&["a", "b"], &[], None)), LinkCheck::Resolved);
        assert_eq!(validator.check("main", &link(&["a", "c"], &[], None)), LinkCheck::Broken);
    }

    #[test]
    fn test_unique_fallback() {
        let validator = validator();
        assert_eq!(validator.check("main", &link(&["deep"], &[], None)), LinkCheck::Resolved);
        assert_eq!(validator.check("main", &link(&["b"], &[], None)), LinkCheck::Broken);
    }

    #[test]
    fn test_cross_file() {
        let validator = validator();
        assert_eq!(validator.check("main", &link(&["x"], &["a"], Some("other"))), LinkCheck::Resolved);
        assert_eq!(validator.check("main", &link(&["a"], &[], Some("other"))), LinkCheck::Broken);
        assert_eq!(validator.check("main", &link(&["a"], &[], Some("gone"))), LinkCheck::Unknown);
    }

    #[test]
    fn test_collect_links() {
        let mut root = Array::new(None);
        let mut a = Array::labeled(None, Some("a".to_owned()));
        a.children.push(Element::Link(crate::ir::Link {
            labels: vec!["b".to_owned()],
            ..crate::ir::Link::default()
        }));
        root.children.push(Element::Array(a));
        let links = collect_links(&root);
        assert_eq!(links, vec![link(&["b"], &["a"], None)]);
        assert_eq!(links[0].target(), "b");
    }

    #[test]
    fn test_normalize_stem() {
        assert_eq!(normalize_stem("other"), "other");
        assert_eq!(normalize_stem("other.md"), "other");
        assert_eq!(normalize_stem("./other.md"), "other");
        assert_eq!(normalize_stem("chapters/../other.md"), "other");
        assert_eq!(normalize_stem("chapters/./one.md"), "chapters/one");
        assert_eq!(normalize_stem("../shared/end.md"), "../shared/end");
    }
}
