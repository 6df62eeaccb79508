//! Label registration.
//!
//! A labeled array is registered in the `labels` map of its nearest labeled
//! ancestor, or of the file root, under its path relative to that ancestor.
//! Paths use Lua indices: child `i` of an array sits at `i + 2` because the
//! metadata table comes first. Function arguments add an `"args"` step.

use std::collections::BTreeMap;

use brocatel_md::{Diagnostics, Position};
use serde::Serialize;

use crate::ir::{Array, PathSegment, RelativePath};

struct Found {
    label: String,
    /// Path from the array currently collecting.
    path: RelativePath,
    position: Option<Position>,
    registered: bool,
}

/// Fills in `labels` and `children` metadata throughout the tree.
pub(crate) fn attach_relative_links(root: &mut Array, diagnostics: &mut Diagnostics) {
    collect(root, true, diagnostics);
}

fn collect(array: &mut Array, is_root: bool, diagnostics: &mut Diagnostics) -> Vec<Found> {
    let mut found = Vec::new();
    for (i, child) in array.children.iter_mut().enumerate() {
        for (suffix, nested) in child.child_arrays_mut() {
            let mut path = vec![PathSegment::Index(i + 2)];
            path.extend(suffix);
            for mut inner in collect(nested, false, diagnostics) {
                let mut full = path.clone();
                full.append(&mut inner.path);
                inner.path = full;
                found.push(inner);
            }
            if let Some(label) = &nested.meta.label {
                found.push(Found {
                    label: label.clone(),
                    path,
                    position: nested.position,
                    registered: false,
                });
            }
        }
    }

    let registers = is_root || array.meta.label.is_some();
    for item in &mut found {
        array
            .meta
            .children
            .entry(item.label.clone())
            .or_default()
            .push(item.path.clone());
        if registers && !item.registered {
            if array.meta.labels.contains_key(&item.label) {
                diagnostics.report("heading name collision", item.position);
            }
            array
                .meta
                .labels
                .insert(item.label.clone(), item.path.clone());
            item.registered = true;
        }
    }
    found
}

/// The tree of labeled scopes in one file, as the runtime resolves them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LabelTree {
    pub position: Option<Position>,
    /// Directly registered labels.
    pub children: BTreeMap<String, LabelTree>,
}

impl LabelTree {
    /// Builds the label tree of a compiled file.
    #[must_use]
    pub fn from_root(root: &Array) -> Self {
        let mut tree = Self {
            position: root.position,
            children: BTreeMap::new(),
        };
        fill(root, &mut tree);
        tree
    }

    /// Number of scopes labeled `label` anywhere below this one.
    #[must_use]
    pub fn count(&self, label: &str) -> usize {
        self.children
            .iter()
            .map(|(name, child)| usize::from(name == label) + child.count(label))
            .sum()
    }

    /// The only scope labeled `label` below this one, if it is unique.
    #[must_use]
    pub fn find_unique(&self, label: &str) -> Option<&LabelTree> {
        if self.count(label) != 1 {
            return None;
        }
        self.find(label)
    }

    fn find(&self, label: &str) -> Option<&LabelTree> {
        self.children.get(label).or_else(|| {
            self.children
                .values()
                .find_map(|child| child.find(label))
        })
    }
}

fn fill(array: &Array, sink: &mut LabelTree) {
    for child in &array.children {
        for (_, nested) in child.child_arrays() {
            match &nested.meta.label {
                Some(label) => {
                    let mut subtree = LabelTree {
                        position: nested.position,
                        children: BTreeMap::new(),
                    };
                    fill(nested, &mut subtree);
                    sink.children.insert(label.clone(), subtree);
                }
                None => fill(nested, sink),
            }
        }
    }
}
