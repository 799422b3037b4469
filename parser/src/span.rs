//! Positions and ranges in source text, attached to tokens, syntax nodes
//! and compile errors.

use std::fmt;

/// 1-based line and column of a byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pos {
    pub offset: usize,
    pub line: usize,
    /// Counted in bytes.
    pub column: usize,
}

impl Pos {
    pub const fn new(offset: usize, line: usize, column: usize) -> Self {
        Self {
            offset,
            line,
            column,
        }
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Half-open range `start..end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: Pos,
    pub end: Pos,
}

impl Span {
    pub const fn new(start: Pos, end: Pos) -> Self {
        Self { start, end }
    }

    pub const fn point(pos: Pos) -> Self {
        Self::new(pos, pos)
    }

    /// Cover both spans, whichever comes first.
    pub fn merge(self, other: Span) -> Span {
        Span {
            start: std::cmp::min_by_key(self.start, other.start, |p| p.offset),
            end: std::cmp::max_by_key(self.end, other.end, |p| p.offset),
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_covers_both_in_either_order() {
        let a = Span::new(Pos::new(0, 1, 1), Pos::new(3, 1, 4));
        let b = Span::new(Pos::new(6, 1, 7), Pos::new(9, 1, 10));
        assert_eq!(a.merge(b), b.merge(a));
        assert_eq!(a.merge(b), Span::new(a.start, b.end));
    }

    #[test]
    fn display_is_line_col() {
        let span = Span::new(Pos::new(4, 2, 1), Pos::new(7, 2, 4));
        assert_eq!(span.to_string(), "2:1-2:4");
    }
}
