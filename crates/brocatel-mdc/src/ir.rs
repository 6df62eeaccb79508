//! Intermediate representation.
//!
//! The transformer turns the expanded document tree into nested [`Array`]
//! scopes. Arrays are the only containers. Every other element is a leaf,
//! except that [`IfElse`] branches and [`Func`] arguments are arrays again.

use std::collections::BTreeMap;
use std::fmt;

use brocatel_md::Position;
use serde::Serialize;

/// One step of a table path: a Lua array index or a string key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(usize),
    Key(String),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "{index}"),
            Self::Key(key) => f.write_str(key),
        }
    }
}

/// A table path relative to the array registering it.
pub type RelativePath = Vec<PathSegment>;

/// Metadata stored as the first element of every array.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    /// The label of this array, if a heading or a macro named it.
    pub label: Option<String>,
    /// Paths to labeled arrays registered directly under this one.
    pub labels: BTreeMap<String, RelativePath>,
    /// Paths to every labeled array reachable from this one.
    pub children: BTreeMap<String, Vec<RelativePath>>,
    /// Parameter names of a function scope.
    pub routine: Option<Vec<String>>,
}

/// An ordered scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Array {
    pub meta: Metadata,
    pub children: Vec<Element>,
    pub position: Option<Position>,
}

impl Array {
    #[must_use]
    pub fn new(position: Option<Position>) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn labeled(position: Option<Position>, label: Option<String>) -> Self {
        let mut array = Self::new(position);
        array.meta.label = label.filter(|l| !l.is_empty());
        array
    }

    /// Whether the scope ends with an explicit `END()` or `END(true)`.
    #[must_use]
    pub fn has_returned(&self) -> bool {
        matches!(
            self.children.last(),
            Some(Element::Func(func)) if matches!(func.code.trim(), "END()" | "END(true)")
        )
    }

    /// Appends an implicit `END()`.
    pub fn append_return(&mut self) {
        self.children.push(Element::Func(Func {
            code: "END()".to_owned(),
            args: Vec::new(),
            position: self.position,
        }));
    }
}

/// A line of text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Text {
    /// Text with `{vN}` placeholders.
    pub text: String,
    pub tags: BTreeMap<String, String>,
    /// Placeholder name to Lua expression.
    pub values: BTreeMap<String, String>,
    /// The placeholder selecting plural forms.
    pub plural: Option<String>,
    /// Markdown source of the text, shown to translators.
    pub original: String,
    pub position: Option<Position>,
}

impl Text {
    #[must_use]
    pub fn is_plain(&self) -> bool {
        self.plural.is_none() && self.tags.is_empty() && self.values.is_empty()
    }
}

/// A jump to a labeled scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Link {
    pub labels: Vec<String>,
    /// Stem of the target file, for cross-file links.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
    /// Parameter table constructor, or empty for none.
    pub params: String,
    /// Whether control returns here once the target ends.
    pub coroutine: bool,
    pub position: Option<Position>,
}

/// A conditional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfElse {
    pub condition: String,
    pub then: Array,
    pub otherwise: Option<Array>,
    pub position: Option<Position>,
}

/// A Lua statement snippet with argument scopes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Func {
    pub code: String,
    pub args: Vec<Array>,
    pub position: Option<Position>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Element {
    Array(Array),
    Text(Text),
    Link(Link),
    IfElse(IfElse),
    Func(Func),
}

impl Element {
    #[must_use]
    pub fn position(&self) -> Option<Position> {
        match self {
            Self::Array(array) => array.position,
            Self::Text(text) => text.position,
            Self::Link(link) => link.position,
            Self::IfElse(if_else) => if_else.position,
            Self::Func(func) => func.position,
        }
    }

    /// Child arrays, paired with their path segments from this element.
    #[must_use]
    pub fn child_arrays(&self) -> Vec<(RelativePath, &Array)> {
        match self {
            Self::IfElse(if_else) => std::iter::once(&if_else.then)
                .chain(if_else.otherwise.as_ref())
                .enumerate()
                .map(|(i, array)| (vec![PathSegment::Index(i + 2)], array))
                .collect(),
            Self::Func(func) => func
                .args
                .iter()
                .enumerate()
                .map(|(i, array)| {
                    (
                        vec![PathSegment::Key("args".to_owned()), PathSegment::Index(i + 2)],
                        array,
                    )
                })
                .collect(),
            Self::Array(array) => vec![(Vec::new(), array)],
            Self::Text(_) | Self::Link(_) => Vec::new(),
        }
    }

    /// Mutable counterpart of [`Element::child_arrays`].
    pub fn child_arrays_mut(&mut self) -> Vec<(RelativePath, &mut Array)> {
        match self {
            Self::IfElse(if_else) => std::iter::once(&mut if_else.then)
                .chain(if_else.otherwise.as_mut())
                .enumerate()
                .map(|(i, array)| (vec![PathSegment::Index(i + 2)], array))
                .collect(),
            Self::Func(func) => func
                .args
                .iter_mut()
                .enumerate()
                .map(|(i, array)| {
                    (
                        vec![PathSegment::Key("args".to_owned()), PathSegment::Index(i + 2)],
                        array,
                    )
                })
                .collect(),
            Self::Array(array) => vec![(Vec::new(), array)],
            Self::Text(_) | Self::Link(_) => Vec::new(),
        }
    }
}
