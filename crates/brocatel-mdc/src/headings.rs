//! Heading nesting.
//!
//! Headings in a block open nested scopes. A heading of depth `d` closes every
//! open scope of depth `>= d` before opening its own. Scopes other than the
//! block itself end with `END()` unless the author already ended them, so
//! control never falls through into the next section.

use crate::ir::{Array, Element};

pub(crate) struct HeadingStack {
    /// Open scopes with their heading depths. The first entry is the block.
    stack: Vec<(Array, u8)>,
}

impl HeadingStack {
    pub(crate) fn new(root: Array) -> Self {
        Self {
            stack: vec![(root, 0)],
        }
    }

    fn last_depth(&self) -> u8 {
        self.stack.last().map_or(0, |(_, depth)| *depth)
    }

    /// The innermost open scope.
    pub(crate) fn last(&mut self) -> &mut Array {
        let index = self.stack.len() - 1;
        &mut self.stack[index].0
    }

    pub(crate) fn push_element(&mut self, element: Element) {
        self.last().children.push(element);
    }

    /// Opens the scope of a heading of depth `depth`.
    pub(crate) fn push_heading(&mut self, nested: Array, depth: u8) {
        self.pop_until(depth);
        let needs_return = self.last_depth() != 0 || nested.meta.routine.is_some();
        let last = self.last();
        if needs_return && !last.has_returned() {
            last.append_return();
        }
        self.stack.push((nested, depth));
    }

    /// Closes every scope of depth `>= depth`.
    fn pop_until(&mut self, depth: u8) {
        while self.stack.len() > 1 && depth <= self.last_depth() {
            let Some((mut array, _)) = self.stack.pop() else {
                return;
            };
            if (depth != 0 || array.meta.routine.is_some()) && !array.has_returned() {
                array.append_return();
            }
            self.last().children.push(Element::Array(array));
        }
    }

    /// Closes all headings and returns the block scope.
    pub(crate) fn finish(mut self) -> Array {
        self.pop_until(0);
        self.stack
            .pop()
            .map(|(array, _)| array)
            .unwrap_or_default()
    }
}
