//! Mark storage and edit mapping.
//!
//! Marks are not inclusive on either side: text inserted exactly at a mark
//! boundary stays outside it. A mark whose text is deleted entirely
//! collapses and is dropped, after which lookups report it gone.

use std::collections::BTreeMap;

use crate::host::{MarkId, MarkOptions};
use crate::position::{Position, Range, is_strictly_inside, overlaps};
use crate::render::RenderedFormula;

#[derive(Debug, Clone)]
struct MarkEntry {
    range: Range,
    options: MarkOptions,
}

#[derive(Debug, Default)]
pub(super) struct MarkSet {
    entries: BTreeMap<MarkId, MarkEntry>,
    next_id: u64,
}

impl MarkSet {
    pub(super) fn insert(&mut self, range: Range, options: MarkOptions) -> MarkId {
        self.next_id += 1;
        let id = MarkId::new(self.next_id);
        self.entries.insert(id, MarkEntry { range, options });
        id
    }

    pub(super) fn remove(&mut self, id: MarkId) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub(super) fn range(&self, id: MarkId) -> Option<Range> {
        self.entries.get(&id).map(|entry| entry.range)
    }

    pub(super) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(super) fn replacement_count(&self) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.options.replacement.is_some())
            .count()
    }

    pub(super) fn overlapping(&self, range: Range) -> Vec<MarkId> {
        self.entries
            .iter()
            .filter(|(_, entry)| overlaps(entry.range, range))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Replaced marks that strictly contain `pos`, with their
    /// `clear_on_enter` flag.
    pub(super) fn replaced_containing(&self, pos: Position) -> Vec<(MarkId, bool)> {
        self.entries
            .iter()
            .filter(|(_, entry)| {
                entry.options.replacement.is_some() && is_strictly_inside(pos, entry.range)
            })
            .map(|(id, entry)| (*id, entry.options.clear_on_enter))
            .collect()
    }

    /// Single-line replacements on `line`, ordered by start column.
    pub(super) fn replacements_on_line(&self, line: usize) -> Vec<(Range, &RenderedFormula)> {
        let mut found: Vec<_> = self
            .entries
            .values()
            .filter(|entry| entry.range.from.line == line && entry.range.to.line == line)
            .filter_map(|entry| {
                entry
                    .options
                    .replacement
                    .as_ref()
                    .map(|formula| (entry.range, formula))
            })
            .collect();
        found.sort_by_key(|(range, _)| range.from);
        found
    }

    /// Move every mark through an edit that replaced `[from, to)` with text
    /// ending at `inserted_end`.
    pub(super) fn map_through(&mut self, from: Position, to: Position, inserted_end: Position) {
        self.entries.retain(|_, entry| {
            let was_empty = entry.range.is_empty();
            let start = map_start(entry.range.from, from, to, inserted_end);
            let end = if was_empty {
                start
            } else {
                map_end(entry.range.to, from, to, inserted_end)
            };
            if !was_empty && end <= start {
                return false;
            }
            entry.range = Range { from: start, to: end };
            true
        });
    }
}

/// Map a point after the edit. Points inside the replaced text land after
/// the inserted text.
pub(super) fn map_point(pos: Position, from: Position, to: Position, inserted_end: Position) -> Position {
    map_start(pos, from, to, inserted_end)
}

fn map_start(pos: Position, from: Position, to: Position, inserted_end: Position) -> Position {
    if pos < from {
        pos
    } else if pos <= to {
        inserted_end
    } else {
        shift(pos, to, inserted_end)
    }
}

fn map_end(pos: Position, from: Position, to: Position, inserted_end: Position) -> Position {
    if pos <= from {
        pos
    } else if pos <= to {
        from
    } else {
        shift(pos, to, inserted_end)
    }
}

/// Translate a point after the replaced range.
fn shift(pos: Position, to: Position, inserted_end: Position) -> Position {
    if pos.line == to.line {
        Position::new(inserted_end.line, inserted_end.col + (pos.col - to.col))
    } else {
        Position::new(pos.line - to.line + inserted_end.line, pos.col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(line: usize, col: usize) -> Position {
        Position::new(line, col)
    }

    fn set_with(range: Range) -> (MarkSet, MarkId) {
        let mut set = MarkSet::default();
        let id = set.insert(range, MarkOptions::plain());
        (set, id)
    }

    #[test]
    fn test_insert_before_mark_shifts_it() {
        let (mut set, id) = set_with(Range::on_line(0, 5, 10));
        set.map_through(pos(0, 2), pos(0, 2), pos(0, 5));
        assert_eq!(set.range(id), Some(Range::on_line(0, 8, 13)));
    }

    #[test]
    fn test_insert_at_boundaries_stays_outside() {
        let (mut set, id) = set_with(Range::on_line(0, 5, 10));
        set.map_through(pos(0, 5), pos(0, 5), pos(0, 7));
        assert_eq!(set.range(id), Some(Range::on_line(0, 7, 12)));
        set.map_through(pos(0, 12), pos(0, 12), pos(0, 14));
        assert_eq!(set.range(id), Some(Range::on_line(0, 7, 12)));
    }

    #[test]
    fn test_insert_inside_mark_grows_it() {
        let (mut set, id) = set_with(Range::on_line(0, 5, 10));
        set.map_through(pos(0, 7), pos(0, 7), pos(0, 9));
        assert_eq!(set.range(id), Some(Range::on_line(0, 5, 12)));
    }

    #[test]
    fn test_partial_delete_trims_mark() {
        let (mut set, id) = set_with(Range::on_line(0, 5, 10));
        // "xy" replaces columns 3..7
        set.map_through(pos(0, 3), pos(0, 7), pos(0, 5));
        assert_eq!(set.range(id), Some(Range::on_line(0, 5, 8)));

        let (mut set, id) = set_with(Range::on_line(0, 5, 10));
        set.map_through(pos(0, 7), pos(0, 12), pos(0, 9));
        assert_eq!(set.range(id), Some(Range::on_line(0, 5, 7)));
    }

    #[test]
    fn test_deleting_marked_text_drops_mark() {
        let (mut set, id) = set_with(Range::on_line(0, 5, 10));
        set.map_through(pos(0, 5), pos(0, 10), pos(0, 5));
        assert_eq!(set.range(id), None);

        let (mut set, id) = set_with(Range::on_line(0, 5, 10));
        set.map_through(pos(0, 5), pos(0, 10), pos(0, 8));
        assert_eq!(set.range(id), None, "replaced text is not the marked text");
    }

    #[test]
    fn test_newline_insert_moves_later_lines() {
        let (mut set, id) = set_with(Range::on_line(3, 1, 4));
        set.map_through(pos(1, 0), pos(1, 0), pos(3, 0));
        assert_eq!(set.range(id), Some(Range::on_line(5, 1, 4)));
    }

    #[test]
    fn test_line_join_moves_mark_onto_previous_line() {
        let (mut set, id) = set_with(Range::on_line(1, 2, 5));
        // Delete the newline at the end of line 0 (length 6).
        set.map_through(pos(0, 6), pos(1, 0), pos(0, 6));
        assert_eq!(set.range(id), Some(Range::on_line(0, 8, 11)));
    }

    #[test]
    fn test_overlapping_and_containing_queries() {
        let mut set = MarkSet::default();
        let plain = set.insert(Range::on_line(0, 0, 4), MarkOptions::plain());
        let formula = RenderedFormula {
            element: crate::overlay::RenderElement::build("$a$", None),
            text: "a".to_string(),
        };
        let replaced = set.insert(Range::on_line(0, 6, 9), MarkOptions::replaced_with(formula));

        assert_eq!(set.overlapping(Range::lines(0, 1)), vec![plain, replaced]);
        assert_eq!(set.overlapping(Range::on_line(0, 4, 6)), Vec::<MarkId>::new());
        assert_eq!(set.replaced_containing(pos(0, 7)), vec![(replaced, false)]);
        assert!(set.replaced_containing(pos(0, 2)).is_empty(), "plain marks never report entry");
        assert_eq!(set.replacements_on_line(0).len(), 1);
        assert_eq!(set.replacement_count(), 1);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_map_point_follows_insertion() {
        assert_eq!(map_point(pos(0, 3), pos(0, 3), pos(0, 3), pos(0, 4)), pos(0, 4));
        assert_eq!(map_point(pos(0, 1), pos(0, 3), pos(0, 3), pos(0, 4)), pos(0, 1));
    }
}
