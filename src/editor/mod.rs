//! Reference host buffer.
//!
//! A rope-backed text buffer with a cursor, edit-tracking marks and an event
//! queue, implementing [`crate::host::Buffer`] so the overlay engine can be
//! driven without an external editor.

mod buffer;
mod marks;

pub use buffer::{EditorBuffer, Segment};

use crate::position::Position;

/// Cursor position in the editor buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    /// Zero-based line index.
    pub line: usize,
    /// Zero-based character column.
    pub col: usize,
    /// Column to aim for when moving vertically (sticky column).
    col_memory: usize,
}

impl Cursor {
    /// Create a cursor at line 0, column 0.
    pub const fn new() -> Self {
        Self::at(0, 0)
    }

    /// Create a cursor at a specific position.
    pub const fn at(line: usize, col: usize) -> Self {
        Self {
            line,
            col,
            col_memory: col,
        }
    }

    pub const fn position(self) -> Position {
        Position::new(self.line, self.col)
    }

    /// Update column and reset column memory to match.
    const fn set_col(&mut self, col: usize) {
        self.col = col;
        self.col_memory = col;
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Position> for Cursor {
    fn from(pos: Position) -> Self {
        Self::at(pos.line, pos.col)
    }
}

/// Direction for cursor movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}
