//! Position and range arithmetic.
//!
//! Every other module decides containment and overlap through the three
//! predicates here, so they have to agree exactly on boundary behavior:
//! a position on the edge of a range is not inside it, and two ranges that
//! only touch do not overlap.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// A location in the buffer.
///
/// Columns count characters, not bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    /// Zero-based line index.
    pub line: usize,
    /// Zero-based character column within the line.
    pub col: usize,
}

impl Position {
    pub const fn new(line: usize, col: usize) -> Self {
        Self { line, col }
    }

    /// Start of the given line.
    pub const fn line_start(line: usize) -> Self {
        Self { line, col: 0 }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Error returned when parsing a `LINE:COL` position fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParsePositionError {
    #[error("expected LINE:COL, got {0:?}")]
    MissingSeparator(String),
    #[error("invalid number {0:?} in position")]
    InvalidNumber(String),
}

impl FromStr for Position {
    type Err = ParsePositionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (line, col) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| ParsePositionError::MissingSeparator(s.to_string()))?;
        let parse = |part: &str| {
            part.trim()
                .parse::<usize>()
                .map_err(|_| ParsePositionError::InvalidNumber(part.to_string()))
        };
        Ok(Self::new(parse(line)?, parse(col)?))
    }
}

/// A half-open span `[from, to)` of buffer text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Range {
    pub from: Position,
    pub to: Position,
}

impl Range {
    /// Build a range, swapping the endpoints if they arrive reversed.
    pub fn new(from: Position, to: Position) -> Self {
        if to < from {
            Self { from: to, to: from }
        } else {
            Self { from, to }
        }
    }

    /// A range covering `[start_col, end_col)` on one line.
    pub fn on_line(line: usize, start_col: usize, end_col: usize) -> Self {
        Self::new(Position::new(line, start_col), Position::new(line, end_col))
    }

    /// Whole lines `[first, end)`, expressed as line starts.
    pub const fn lines(first: usize, end: usize) -> Self {
        Self {
            from: Position::line_start(first),
            to: Position::line_start(end),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.from == self.to
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.from, self.to)
    }
}

/// Lexicographic comparison on (line, column).
pub fn compare(a: Position, b: Position) -> Ordering {
    a.cmp(&b)
}

/// True if `pos` lies strictly between the range endpoints.
///
/// Touching either boundary does not count.
pub fn is_strictly_inside(pos: Position, range: Range) -> bool {
    compare(range.from, pos).is_lt() && compare(pos, range.to).is_lt()
}

/// True if the ranges share at least one character.
pub fn overlaps(a: Range, b: Range) -> bool {
    compare(a.from, b.to).is_lt() && compare(b.from, a.to).is_lt()
}
