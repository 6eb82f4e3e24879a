use ropey::Rope;

use super::marks::{MarkSet, map_point};
use super::{Cursor, Direction};
use crate::host::{Buffer, BufferEvent, Change, MarkId, MarkOptions};
use crate::position::{Position, Range};
use crate::render::RenderedFormula;
use crate::scanner::scan_line;

/// A piece of a displayed line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Source text shown as-is.
    Text(String),
    /// A range drawn as its rendered replacement.
    Formula(RenderedFormula),
}

/// A text buffer backed by a rope data structure.
///
/// Every edit goes through [`EditorBuffer::replace`], which keeps marks and
/// the cursor in step with the text and, once subscribed, queues the change
/// and cursor notifications the overlay engine consumes.
pub struct EditorBuffer {
    rope: Rope,
    cursor: Cursor,
    marks: MarkSet,
    subscribed: bool,
    events: Vec<BufferEvent>,
    batch_depth: usize,
    batch_count: usize,
    batch_marks: usize,
    last_batch_marks: usize,
}

impl EditorBuffer {
    /// Create a new buffer from a string.
    pub fn from_text(text: &str) -> Self {
        Self {
            rope: Rope::from_str(text),
            cursor: Cursor::new(),
            marks: MarkSet::default(),
            subscribed: false,
            events: Vec::new(),
            batch_depth: 0,
            batch_count: 0,
            batch_marks: 0,
            last_batch_marks: 0,
        }
    }

    /// Create an empty buffer.
    pub fn empty() -> Self {
        Self::from_text("")
    }

    /// The current cursor position.
    pub const fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Total number of lines in the buffer.
    pub fn line_count(&self) -> usize {
        self.rope.len_lines()
    }

    /// Get the content of a line (without trailing newline).
    pub fn line_at(&self, line_idx: usize) -> Option<String> {
        if line_idx >= self.rope.len_lines() {
            return None;
        }
        let line = self.rope.line(line_idx).to_string();
        Some(line.trim_end_matches('\n').trim_end_matches('\r').to_string())
    }

    /// Length of a line in characters (without trailing newline).
    pub fn line_len(&self, line_idx: usize) -> usize {
        if line_idx >= self.rope.len_lines() {
            return 0;
        }
        let line = self.rope.line(line_idx);
        let mut len = line.len_chars();
        if len > 0 && line.char(len - 1) == '\n' {
            len -= 1;
            if len > 0 && line.char(len - 1) == '\r' {
                len -= 1;
            }
        }
        len
    }

    /// The full text content of the buffer.
    pub fn text(&self) -> String {
        self.rope.to_string()
    }

    /// Number of live marks.
    pub fn mark_count(&self) -> usize {
        self.marks.len()
    }

    /// Number of live marks drawn as a replacement.
    pub fn replacement_count(&self) -> usize {
        self.marks.replacement_count()
    }

    /// How many batched mutation scopes have completed.
    pub const fn batch_count(&self) -> usize {
        self.batch_count
    }

    /// Replacement marks created inside the most recent batch.
    pub const fn marks_installed_in_last_batch(&self) -> usize {
        self.last_batch_marks
    }

    /// Split a line into plain text and rendered replacements.
    pub fn display_line(&self, line_idx: usize) -> Vec<Segment> {
        let Some(text) = self.line_at(line_idx) else {
            return Vec::new();
        };
        let chars: Vec<char> = text.chars().collect();
        let mut segments = Vec::new();
        let mut col = 0;
        for (range, formula) in self.marks.replacements_on_line(line_idx) {
            let start = range.from.col.min(chars.len());
            if start < col {
                continue;
            }
            if start > col {
                segments.push(Segment::Text(chars[col..start].iter().collect()));
            }
            segments.push(Segment::Formula(formula.clone()));
            col = range.to.col.min(chars.len());
        }
        if col < chars.len() {
            segments.push(Segment::Text(chars[col..].iter().collect()));
        }
        segments
    }

    /// Replace `range` with `text`, moving marks and the cursor along.
    pub fn replace(&mut self, range: Range, text: &str) {
        let change = self.apply_replace(range, text);
        self.emit(BufferEvent::Change(change));
        self.cursor_moved();
    }

    /// Apply several edits as one compound operation.
    ///
    /// Each range is interpreted after the edits before it. Observers see a
    /// single change whose linked continuations follow in order.
    pub fn apply_edits(&mut self, edits: &[(Range, &str)]) {
        let mut changes: Vec<Change> = edits
            .iter()
            .map(|(range, text)| self.apply_replace(*range, text))
            .collect();
        let Some(mut head) = changes.pop() else {
            return;
        };
        while let Some(mut previous) = changes.pop() {
            previous.next = Some(Box::new(head));
            head = previous;
        }
        self.emit(BufferEvent::Change(head));
        self.cursor_moved();
    }

    /// Insert a character at the cursor position.
    pub fn insert_char(&mut self, ch: char) {
        let mut utf8 = [0; 4];
        self.insert_str(ch.encode_utf8(&mut utf8));
    }

    /// Insert a string at the cursor position.
    pub fn insert_str(&mut self, s: &str) {
        if s.is_empty() {
            return;
        }
        let at = self.cursor.position();
        self.replace(Range::new(at, at), s);
    }

    /// Split the current line at the cursor (Enter key).
    pub fn split_line(&mut self) {
        self.insert_str("\n");
    }

    /// Delete the character before the cursor (Backspace).
    ///
    /// Returns `true` if a character was deleted.
    pub fn delete_back(&mut self) -> bool {
        let at = self.cursor.position();
        let Some(before) = self.position_before(at) else {
            return false;
        };
        self.replace(Range::new(before, at), "");
        true
    }

    /// Delete the character at the cursor (Delete key).
    ///
    /// Returns `true` if a character was deleted.
    pub fn delete_forward(&mut self) -> bool {
        let at = self.cursor.position();
        let Some(after) = self.position_after(at) else {
            return false;
        };
        self.replace(Range::new(at, after), "");
        true
    }

    /// Move the cursor in the given direction.
    pub fn move_cursor(&mut self, direction: Direction) {
        let mut next = self.cursor;
        match direction {
            Direction::Left => {
                if let Some(pos) = self.position_before(next.position()) {
                    next = Cursor::from(pos);
                }
            }
            Direction::Right => {
                if let Some(pos) = self.position_after(next.position()) {
                    next = Cursor::from(pos);
                }
            }
            Direction::Up if next.line > 0 => {
                next.line -= 1;
                next.col = next.col_memory.min(self.line_len(next.line));
            }
            Direction::Down if next.line + 1 < self.line_count() => {
                next.line += 1;
                next.col = next.col_memory.min(self.line_len(next.line));
            }
            Direction::Up | Direction::Down => {}
        }
        self.set_cursor(next);
    }

    /// Move cursor to the beginning of the line (Home).
    pub fn move_home(&mut self) {
        let mut next = self.cursor;
        next.set_col(0);
        self.set_cursor(next);
    }

    /// Move cursor to the end of the line (End).
    pub fn move_end(&mut self) {
        let mut next = self.cursor;
        next.set_col(self.line_len(next.line));
        self.set_cursor(next);
    }

    /// Move cursor to a specific line and column, clamped to the text.
    pub fn move_to(&mut self, line: usize, col: usize) {
        let pos = self.clamp(Position::new(line, col));
        self.set_cursor(Cursor::from(pos));
    }

    /// Move cursor to the start of the buffer (Ctrl+Home).
    pub fn move_to_start(&mut self) {
        self.set_cursor(Cursor::new());
    }

    /// Move cursor to the end of the buffer (Ctrl+End).
    pub fn move_to_end(&mut self) {
        let last_line = self.line_count().saturating_sub(1);
        self.set_cursor(Cursor::at(last_line, self.line_len(last_line)));
    }

    // --- Private helpers ---

    fn apply_replace(&mut self, range: Range, text: &str) -> Change {
        let from = self.clamp(range.from);
        let to = self.clamp(range.to);
        let start = self.char_idx(from);
        let end = self.char_idx(to);
        self.rope.remove(start..end);
        self.rope.insert(start, text);

        let inserted_end = end_of_insert(from, text);
        self.marks.map_through(from, to, inserted_end);
        self.cursor = Cursor::from(map_point(self.cursor.position(), from, to, inserted_end));
        Change::new(from, to, text.matches('\n').count())
    }

    fn set_cursor(&mut self, cursor: Cursor) {
        self.cursor = cursor;
        self.cursor_moved();
    }

    /// Report replaced marks the cursor now sits in, then the move itself.
    fn cursor_moved(&mut self) {
        let pos = self.cursor.position();
        for (mark, clear_on_enter) in self.marks.replaced_containing(pos) {
            self.emit(BufferEvent::CursorEntered(mark));
            if clear_on_enter {
                self.marks.remove(mark);
            }
        }
        self.emit(BufferEvent::CursorActivity);
    }

    fn emit(&mut self, event: BufferEvent) {
        if self.subscribed {
            self.events.push(event);
        }
    }

    fn clamp(&self, pos: Position) -> Position {
        let line = pos.line.min(self.line_count().saturating_sub(1));
        Position::new(line, pos.col.min(self.line_len(line)))
    }

    /// Convert a (clamped) position to a ropey char index.
    fn char_idx(&self, pos: Position) -> usize {
        self.rope.line_to_char(pos.line) + pos.col
    }

    fn position_before(&self, pos: Position) -> Option<Position> {
        if pos.col > 0 {
            Some(Position::new(pos.line, pos.col - 1))
        } else if pos.line > 0 {
            Some(Position::new(pos.line - 1, self.line_len(pos.line - 1)))
        } else {
            None
        }
    }

    fn position_after(&self, pos: Position) -> Option<Position> {
        if pos.col < self.line_len(pos.line) {
            Some(Position::new(pos.line, pos.col + 1))
        } else if pos.line + 1 < self.line_count() {
            Some(Position::line_start(pos.line + 1))
        } else {
            None
        }
    }
}

/// Where inserted text ends when placed at `from`.
fn end_of_insert(from: Position, text: &str) -> Position {
    let breaks = text.matches('\n').count();
    if breaks == 0 {
        return Position::new(from.line, from.col + text.chars().count());
    }
    let last = text.rsplit('\n').next().unwrap_or_default();
    Position::new(from.line + breaks, last.chars().count())
}

impl Buffer for EditorBuffer {
    fn text(&self, range: Range) -> String {
        let start = self.char_idx(self.clamp(range.from));
        let end = self.char_idx(self.clamp(range.to));
        self.rope.slice(start..end.max(start)).to_string()
    }

    fn line_count(&self) -> usize {
        Self::line_count(self)
    }

    fn line_text(&self, line: usize) -> Option<String> {
        self.line_at(line)
    }

    fn cursor(&self) -> Position {
        self.cursor.position()
    }

    fn create_mark(&mut self, range: Range, options: MarkOptions) -> MarkId {
        if self.batch_depth > 0 && options.replacement.is_some() {
            self.batch_marks += 1;
        }
        let range = Range::new(self.clamp(range.from), self.clamp(range.to));
        self.marks.insert(range, options)
    }

    fn mark_range(&self, mark: MarkId) -> Option<Range> {
        self.marks.range(mark)
    }

    fn clear_mark(&mut self, mark: MarkId) {
        self.marks.remove(mark);
    }

    fn marks_overlapping(&self, range: Range) -> Vec<MarkId> {
        self.marks.overlapping(range)
    }

    fn subscribe(&mut self) {
        self.subscribed = true;
    }

    fn unsubscribe(&mut self) {
        self.subscribed = false;
        self.events.clear();
    }

    fn take_events(&mut self) -> Vec<BufferEvent> {
        std::mem::take(&mut self.events)
    }

    fn run_batched<F>(&mut self, f: F)
    where
        F: FnOnce(&mut Self),
    {
        if self.batch_depth == 0 {
            self.batch_marks = 0;
        }
        self.batch_depth += 1;
        f(self);
        self.batch_depth -= 1;
        if self.batch_depth == 0 {
            self.batch_count += 1;
            self.last_batch_marks = self.batch_marks;
        }
    }

    fn token_class_at(&self, pos: Position) -> Option<String> {
        let line = self.line_at(pos.line)?;
        let mut classes = Vec::new();
        if line.trim_start().starts_with('#') {
            classes.push("header");
        }
        if let Some(span) = scan_line(&line)
            .into_iter()
            .find(|span| span.contains_col(pos.col))
        {
            classes.push("math");
            if span.is_delimiter_col(pos.col) {
                classes.push("delimiter");
            }
        }
        (!classes.is_empty()).then(|| classes.join(" "))
    }
}

impl std::fmt::Debug for EditorBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditorBuffer")
            .field(
                "rope",
                &format_args!("Rope({} lines)", self.rope.len_lines()),
            )
            .field("cursor", &self.cursor)
            .field("marks", &self.marks.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscribed(text: &str) -> EditorBuffer {
        let mut buf = EditorBuffer::from_text(text);
        buf.subscribe();
        buf
    }

    fn formula(source: &str) -> RenderedFormula {
        RenderedFormula {
            element: crate::overlay::RenderElement::build(source, None),
            text: "F".to_string(),
        }
    }

    // --- Construction and basic queries ---

    #[test]
    fn test_empty_buffer_has_one_line() {
        let buf = EditorBuffer::empty();
        assert_eq!(buf.line_count(), 1);
        assert_eq!(buf.line_at(0), Some(String::new()));
    }

    #[test]
    fn test_from_text_trailing_newline() {
        let buf = EditorBuffer::from_text("hello\n");
        assert_eq!(buf.line_count(), 2);
        assert_eq!(buf.line_at(0), Some("hello".to_string()));
        assert_eq!(buf.line_at(1), Some(String::new()));
    }

    #[test]
    fn test_line_len_counts_characters() {
        let buf = EditorBuffer::from_text("café\r\nhi");
        assert_eq!(buf.line_len(0), 4);
        assert_eq!(buf.line_len(1), 2);
        assert_eq!(buf.line_len(9), 0);
    }

    #[test]
    fn test_range_text_across_lines() {
        let buf = EditorBuffer::from_text("hello\nworld");
        let text = Buffer::text(&buf, Range::new(Position::new(0, 3), Position::new(1, 2)));
        assert_eq!(text, "lo\nwo");
    }

    // --- Editing ---

    #[test]
    fn test_insert_char_moves_cursor() {
        let mut buf = EditorBuffer::from_text("hllo");
        buf.move_cursor(Direction::Right);
        buf.insert_char('e');
        assert_eq!(buf.line_at(0), Some("hello".to_string()));
        assert_eq!(buf.cursor(), Cursor::at(0, 2));
    }

    #[test]
    fn test_insert_str_empty_is_noop() {
        let mut buf = EditorBuffer::from_text("hello");
        buf.insert_str("");
        assert_eq!(buf.text(), "hello");
        assert_eq!(buf.cursor(), Cursor::at(0, 0));
    }

    #[test]
    fn test_split_line_in_middle() {
        let mut buf = EditorBuffer::from_text("hello world");
        buf.move_to(0, 5);
        buf.split_line();
        assert_eq!(buf.line_at(0), Some("hello".to_string()));
        assert_eq!(buf.line_at(1), Some(" world".to_string()));
        assert_eq!(buf.cursor(), Cursor::at(1, 0));
    }

    #[test]
    fn test_delete_back_joins_lines() {
        let mut buf = EditorBuffer::from_text("hello\nworld");
        buf.move_to(1, 0);
        assert!(buf.delete_back());
        assert_eq!(buf.line_count(), 1);
        assert_eq!(buf.line_at(0), Some("helloworld".to_string()));
        assert_eq!(buf.cursor(), Cursor::at(0, 5));
    }

    #[test]
    fn test_delete_back_at_start_is_noop() {
        let mut buf = EditorBuffer::from_text("hello");
        assert!(!buf.delete_back());
    }

    #[test]
    fn test_delete_forward_multibyte() {
        let mut buf = EditorBuffer::from_text("éa");
        assert!(buf.delete_forward());
        assert_eq!(buf.line_at(0), Some("a".to_string()));
        buf.move_end();
        assert!(!buf.delete_forward());
    }

    #[test]
    fn test_cursor_after_edit_point_shifts() {
        let mut buf = EditorBuffer::from_text("abc\ndef");
        buf.move_to(1, 2);
        buf.replace(Range::on_line(0, 0, 0), "xx\n");
        assert_eq!(buf.cursor(), Cursor::at(2, 2));
    }

    // --- Cursor movement ---

    #[test]
    fn test_move_up_clamps_and_remembers_column() {
        let mut buf = EditorBuffer::from_text("hello\nhi\nworld");
        buf.move_to(0, 4);
        buf.move_cursor(Direction::Down);
        assert_eq!((buf.cursor().line, buf.cursor().col), (1, 2));
        buf.move_cursor(Direction::Down);
        assert_eq!((buf.cursor().line, buf.cursor().col), (2, 4));
    }

    #[test]
    fn test_move_left_wraps_to_prev_line() {
        let mut buf = EditorBuffer::from_text("hello\nworld");
        buf.move_to(1, 0);
        buf.move_cursor(Direction::Left);
        assert_eq!(buf.cursor(), Cursor::at(0, 5));
    }

    #[test]
    fn test_move_to_clamps() {
        let mut buf = EditorBuffer::from_text("hello");
        buf.move_to(100, 100);
        assert_eq!(buf.cursor(), Cursor::at(0, 5));
        buf.move_to_start();
        assert_eq!(buf.cursor(), Cursor::at(0, 0));
        buf.move_to_end();
        buf.move_home();
        assert_eq!(buf.cursor(), Cursor::at(0, 0));
    }

    // --- Events ---

    #[test]
    fn test_no_events_until_subscribed() {
        let mut buf = EditorBuffer::from_text("hello");
        buf.insert_char('x');
        assert!(buf.take_events().is_empty());
    }

    #[test]
    fn test_edit_reports_change_then_cursor_activity() {
        let mut buf = subscribed("a\nb");
        buf.move_to(1, 0);
        buf.take_events();
        buf.insert_str("x\n\ny");
        let events = buf.take_events();
        assert_eq!(
            events,
            vec![
                BufferEvent::Change(Change::new(Position::new(1, 0), Position::new(1, 0), 2)),
                BufferEvent::CursorActivity,
            ]
        );
    }

    #[test]
    fn test_compound_edit_links_changes() {
        let mut buf = subscribed("one\ntwo\nthree");
        buf.apply_edits(&[
            (Range::on_line(0, 0, 3), "1"),
            (Range::on_line(2, 0, 5), "3"),
        ]);
        let events = buf.take_events();
        let BufferEvent::Change(change) = &events[0] else {
            panic!("expected change, got {events:?}");
        };
        let lines: Vec<usize> = change.chain().map(|c| c.from.line).collect();
        assert_eq!(lines, vec![0, 2]);
        assert_eq!(buf.text(), "1\ntwo\n3");
    }

    #[test]
    fn test_cursor_entering_replaced_mark_is_reported() {
        let mut buf = subscribed("Let $x^2$ be");
        let mark = buf.create_mark(Range::on_line(0, 4, 9), MarkOptions::replaced_with(formula("$x^2$")));
        buf.move_to(0, 4);
        assert_eq!(buf.take_events(), vec![BufferEvent::CursorActivity]);
        buf.move_to(0, 6);
        assert_eq!(
            buf.take_events(),
            vec![BufferEvent::CursorEntered(mark), BufferEvent::CursorActivity]
        );
        assert!(buf.mark_range(mark).is_some(), "clear_on_enter is off");
    }

    #[test]
    fn test_clear_on_enter_removes_mark() {
        let mut buf = subscribed("$a+b$");
        let mut options = MarkOptions::replaced_with(formula("$a+b$"));
        options.clear_on_enter = true;
        let mark = buf.create_mark(Range::on_line(0, 0, 5), options);
        buf.move_to(0, 2);
        assert_eq!(buf.mark_range(mark), None);
    }

    #[test]
    fn test_unsubscribe_drops_queued_events() {
        let mut buf = subscribed("abc");
        buf.move_to(0, 1);
        buf.unsubscribe();
        assert!(buf.take_events().is_empty());
    }

    // --- Marks, batching, display ---

    #[test]
    fn test_marks_follow_edits_and_vanish_when_deleted() {
        let mut buf = EditorBuffer::from_text("Let $x$ go");
        let mark = buf.create_mark(Range::on_line(0, 4, 7), MarkOptions::plain());
        buf.replace(Range::on_line(0, 0, 0), ">> ");
        assert_eq!(buf.mark_range(mark), Some(Range::on_line(0, 7, 10)));
        buf.replace(Range::on_line(0, 7, 10), "");
        assert_eq!(buf.mark_range(mark), None);
    }

    #[test]
    fn test_run_batched_counts_scopes_and_marks() {
        let mut buf = EditorBuffer::from_text("$a$ $b$");
        buf.run_batched(|buf| {
            buf.create_mark(Range::on_line(0, 0, 3), MarkOptions::replaced_with(formula("$a$")));
            buf.run_batched(|buf| {
                buf.create_mark(Range::on_line(0, 4, 7), MarkOptions::replaced_with(formula("$b$")));
            });
        });
        assert_eq!(buf.batch_count(), 1, "nested scopes count once");
        assert_eq!(buf.marks_installed_in_last_batch(), 2);
        assert_eq!(buf.replacement_count(), 2);
    }

    #[test]
    fn test_display_line_substitutes_replacements() {
        let mut buf = EditorBuffer::from_text("Let $x$ be");
        buf.create_mark(Range::on_line(0, 4, 7), MarkOptions::replaced_with(formula("$x$")));
        let segments = buf.display_line(0);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0], Segment::Text("Let ".to_string()));
        assert!(matches!(&segments[1], Segment::Formula(f) if f.text == "F"));
        assert_eq!(segments[2], Segment::Text(" be".to_string()));
    }

    #[test]
    fn test_token_classes() {
        let buf = EditorBuffer::from_text("Let $x^2$ be\n# Title $$y$$");
        assert_eq!(buf.token_class_at(Position::new(0, 0)), None);
        assert_eq!(buf.token_class_at(Position::new(0, 4)).as_deref(), Some("math delimiter"));
        assert_eq!(buf.token_class_at(Position::new(0, 5)).as_deref(), Some("math"));
        assert_eq!(
            buf.token_class_at(Position::new(1, 9)).as_deref(),
            Some("header math delimiter")
        );
        assert_eq!(buf.token_class_at(Position::new(1, 1)).as_deref(), Some("header"));
    }
}
