//! Source positions.
//!
//! All coordinates are 1-based. Columns count characters, not bytes.

use serde::Serialize;

/// A point in a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Point {
    pub line: usize,
    pub column: usize,
}

impl Point {
    #[must_use]
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// A span between two points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Position {
    pub start: Point,
    pub end: Point,
}

impl Position {
    #[must_use]
    pub fn new(start: Point, end: Point) -> Self {
        Self { start, end }
    }

    /// A zero-width position at `point`.
    #[must_use]
    pub fn at(point: Point) -> Self {
        Self {
            start: point,
            end: point,
        }
    }
}

/// Maps byte offsets to line/column points.
#[derive(Debug)]
pub(crate) struct LineIndex<'a> {
    source: &'a str,
    /// Byte offset of the start of each line.
    starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    pub(crate) fn new(source: &'a str) -> Self {
        let mut starts = vec![0];
        starts.extend(
            source
                .bytes()
                .enumerate()
                .filter(|&(_, b)| b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self { source, starts }
    }

    pub(crate) fn point(&self, offset: usize) -> Point {
        let offset = offset.min(self.source.len());
        let line = match self.starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let start = self.starts[line];
        let column = self
            .source
            .get(start..offset)
            .map_or(offset - start, |s| s.chars().count());
        Point::new(line + 1, column + 1)
    }

    /// Converts a byte range, dropping trailing line breaks from the end.
    pub(crate) fn position(&self, range: &std::ops::Range<usize>) -> Position {
        let bytes = self.source.as_bytes();
        let mut end = range.end.min(bytes.len());
        while end > range.start && matches!(bytes[end - 1], b'\n' | b'\r') {
            end -= 1;
        }
        Position::new(self.point(range.start), self.point(end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_index_points() {
        let index = LineIndex::new("ab\ncd\n\nef");
        assert_eq!(index.point(0), Point::new(1, 1));
        assert_eq!(index.point(2), Point::new(1, 3));
        assert_eq!(index.point(3), Point::new(2, 1));
        assert_eq!(index.point(7), Point::new(4, 1));
    }

    #[test]
    fn test_line_index_counts_characters() {
        let index = LineIndex::new("你好 a");
        assert_eq!(index.point("你好 ".len()), Point::new(1, 4));
    }

    #[test]
    fn test_position_trims_trailing_newline() {
        let index = LineIndex::new("hello\nworld\n");
        let position = index.position(&(0..6));
        assert_eq!(position.start, Point::new(1, 1));
        assert_eq!(position.end, Point::new(1, 6));
    }
}
