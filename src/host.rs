//! Collaborator interfaces.
//!
//! The overlay engine never touches text storage or typesetting directly.
//! It drives a [`Buffer`] (text, cursor, marks, notifications) and a
//! [`Renderer`] (asynchronous typesetting with FIFO completions) through the
//! traits below. [`crate::editor::EditorBuffer`] and the renderers in
//! [`crate::render`] are the in-crate implementations.

use std::fmt;

use crate::overlay::RenderElement;
use crate::position::{Position, Range};
use crate::render::RenderedFormula;

/// Opaque handle to a mark created by a [`Buffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MarkId(u64);

impl MarkId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// How a mark should present its range.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkOptions {
    /// Rendered surrogate drawn instead of the marked text.
    pub replacement: Option<RenderedFormula>,
    /// Let the buffer destroy the mark by itself when the cursor enters it.
    pub clear_on_enter: bool,
}

impl MarkOptions {
    /// A mark that only tracks its range; the text stays visible.
    pub const fn plain() -> Self {
        Self {
            replacement: None,
            clear_on_enter: false,
        }
    }

    /// A mark drawn as `formula`, left alone on cursor entry so the engine
    /// can handle the transition itself.
    pub const fn replaced_with(formula: RenderedFormula) -> Self {
        Self {
            replacement: Some(formula),
            clear_on_enter: false,
        }
    }
}

/// A buffer edit in pre-edit coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub from: Position,
    pub to: Position,
    /// Number of line breaks in the inserted text.
    pub inserted_lines: usize,
    /// Follow-up edit of a compound operation, applied after this one.
    pub next: Option<Box<Change>>,
}

impl Change {
    pub const fn new(from: Position, to: Position, inserted_lines: usize) -> Self {
        Self {
            from,
            to,
            inserted_lines,
            next: None,
        }
    }

    /// This change followed by every linked continuation, in order.
    pub fn chain(&self) -> impl Iterator<Item = &Self> {
        std::iter::successors(Some(self), |change| change.next.as_deref())
    }
}

/// Notifications a subscribed buffer queues for its observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferEvent {
    Change(Change),
    CursorActivity,
    /// The cursor moved strictly inside a mark that carries a replacement.
    /// Queued before the matching `CursorActivity`.
    CursorEntered(MarkId),
}

/// Host text buffer as seen by the overlay engine.
pub trait Buffer {
    /// Text covered by `range`.
    fn text(&self, range: Range) -> String;

    fn line_count(&self) -> usize;

    /// Content of a line without its line ending.
    fn line_text(&self, line: usize) -> Option<String>;

    /// Visit lines `[from, to)`, clamped to the buffer.
    fn for_each_line(&self, from: usize, to: usize, f: &mut dyn FnMut(usize, &str)) {
        for line in from..to.min(self.line_count()) {
            if let Some(text) = self.line_text(line) {
                f(line, &text);
            }
        }
    }

    fn cursor(&self) -> Position;

    fn create_mark(&mut self, range: Range, options: MarkOptions) -> MarkId;

    /// Current range of a mark, or `None` once it no longer exists.
    fn mark_range(&self, mark: MarkId) -> Option<Range>;

    /// Destroy a mark along with any replacement. Unknown ids are ignored.
    fn clear_mark(&mut self, mark: MarkId);

    /// Marks sharing at least one character with `range`.
    fn marks_overlapping(&self, range: Range) -> Vec<MarkId>;

    /// Start queueing [`BufferEvent`]s.
    fn subscribe(&mut self);

    /// Stop queueing events and drop any not yet taken.
    fn unsubscribe(&mut self);

    /// Drain queued notifications in the order they happened.
    fn take_events(&mut self) -> Vec<BufferEvent>;

    /// Run `f` as one grouped mutation so layout work is coalesced.
    fn run_batched<F>(&mut self, f: F)
    where
        F: FnOnce(&mut Self),
        Self: Sized;

    /// Space-separated token classes at `pos`, if any.
    fn token_class_at(&self, pos: Position) -> Option<String>;
}

/// Identifies one submission to a [`Renderer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(u64);

impl JobId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job#{}", self.0)
    }
}

/// A resolved entry of the renderer's queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// A submitted element finished typesetting.
    Typeset { job: JobId, output: RenderedFormula },
    /// A flush continuation came due; every earlier job has resolved.
    Flush,
}

/// Asynchronous typesetter with a single FIFO queue.
///
/// Completions must be returned in submission order, with each `Flush`
/// positioned after every job submitted before it was scheduled.
pub trait Renderer {
    /// Queue `element` for typesetting. Fire and forget.
    fn submit(&mut self, job: JobId, element: RenderElement);

    /// Queue a flush continuation behind everything submitted so far.
    fn schedule_flush(&mut self);

    /// Take whatever has resolved since the last poll.
    fn poll_completions(&mut self) -> Vec<Completion>;

    /// True when nothing is queued or in flight.
    fn is_idle(&self) -> bool;
}
