//! Formula overlay engine.
//!
//! [`MathOverlay`] keeps rendered formula regions in step with a live
//! [`Buffer`] while typesetting happens asynchronously in a [`Renderer`].
//!
//! Every region owns exactly one mark. While a region is detected, in
//! flight or suppressed the mark only tracks its range; once a placement
//! is flushed the mark carries the rendered replacement. Transitions
//! re-read the mark and the cursor first, because completions can arrive
//! after any number of edits and cursor moves.
//!
//! The engine is driven from the host thread:
//! - [`MathOverlay::process_events`]: buffer notifications
//! - [`MathOverlay::process_completions`]: renderer continuations
//! - [`MathOverlay::tick`]: watchdog
//! - [`MathOverlay::pump`]: all of the above

mod element;
mod placement;
mod region;


use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use tracing::{debug, warn};

pub use element::{DisplayMode, RenderElement};
pub use region::{Region, RegionId, RegionState};

use placement::{Placement, PlacementQueue, Watchdog};

use crate::config::OverlayConfig;
use crate::error::OverlayError;
use crate::host::{Buffer, BufferEvent, Change, Completion, JobId, MarkId, MarkOptions, Renderer};
use crate::perf;
use crate::position::{Position, Range, is_strictly_inside};
use crate::render::RenderedFormula;
use crate::scanner::scan_line;

/// Keeps a buffer's formulas rendered while the text and cursor change.
pub struct MathOverlay<B: Buffer, R: Renderer> {
    buffer: B,
    renderer: R,
    regions: BTreeMap<RegionId, Region>,
    by_mark: HashMap<MarkId, RegionId>,
    jobs: HashMap<JobId, RegionId>,
    /// The one region shown as source because the cursor is in it.
    suppressed: Option<RegionId>,
    placements: PlacementQueue,
    watchdog: Watchdog,
    next_region: u64,
    next_job: u64,
}

impl<B: Buffer, R: Renderer> std::fmt::Debug for MathOverlay<B, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MathOverlay")
            .field("regions", &self.regions.len())
            .field("suppressed", &self.suppressed)
            .field("pending_placements", &self.placements.len())
            .finish_non_exhaustive()
    }
}

impl<B: Buffer, R: Renderer> MathOverlay<B, R> {
    /// Attach to `buffer`: subscribe to its notifications and start the
    /// watchdog. Nothing is scanned until [`Self::render_all`].
    pub fn initialize(mut buffer: B, renderer: R, config: &OverlayConfig) -> Self {
        buffer.subscribe();
        let mut watchdog = Watchdog::new(config.watchdog_interval);
        watchdog.start(Instant::now());
        debug!(interval = ?config.watchdog_interval, "overlay attached");
        Self {
            buffer,
            renderer,
            regions: BTreeMap::new(),
            by_mark: HashMap::new(),
            jobs: HashMap::new(),
            suppressed: None,
            placements: PlacementQueue::default(),
            watchdog,
            next_region: 0,
            next_job: 0,
        }
    }

    /// Scan the whole buffer and submit every formula, then schedule the
    /// flush that will place them. Existing regions are dropped first.
    pub fn render_all(&mut self) {
        let _scope = perf::scope("overlay.render_all");
        let existing: Vec<RegionId> = self.regions.keys().copied().collect();
        for id in existing {
            self.destroy(id);
        }
        self.placements.clear();

        let submitted = self.scan_lines(0, self.buffer.line_count());
        self.renderer.schedule_flush();
        debug!(submitted, "initial scan submitted");
        perf::log_event("overlay.render_all", format!("submitted={submitted}"));
    }

    /// Detach from the buffer and hand the collaborators back. Marks that
    /// are installed stay installed.
    pub fn shutdown(mut self) -> (B, R) {
        self.watchdog.stop();
        self.buffer.unsubscribe();
        debug!(regions = self.regions.len(), "overlay detached");
        (self.buffer, self.renderer)
    }

    /// Handle every buffer notification queued since the last call.
    pub fn process_events(&mut self) {
        for event in self.buffer.take_events() {
            match event {
                BufferEvent::Change(change) => self.handle_change(&change),
                BufferEvent::CursorEntered(mark) => self.handle_cursor_entered(mark),
                BufferEvent::CursorActivity => self.handle_cursor_activity(),
            }
        }
    }

    /// Handle every renderer completion, in the order they resolved.
    pub fn process_completions(&mut self) {
        for completion in self.renderer.poll_completions() {
            match completion {
                Completion::Typeset { job, output } => self.handle_typeset(job, output),
                Completion::Flush => self.flush(),
            }
        }
    }

    /// Let the watchdog run. A due tick with placements still queued means
    /// a flush continuation was missed, so the queue is flushed here.
    pub fn tick(&mut self, now: Instant) {
        if !self.watchdog.take_due(now) || self.placements.is_empty() {
            return;
        }
        let error = OverlayError::MissedFlush {
            pending: self.placements.len(),
        };
        warn!(%error, "forcing flush");
        self.flush();
    }

    /// Events, then completions, then the watchdog.
    pub fn pump(&mut self, now: Instant) {
        self.process_events();
        self.process_completions();
        self.tick(now);
    }

    /// Install every queued placement in one batched buffer mutation.
    pub fn flush(&mut self) {
        let placements = self.placements.take();
        if placements.is_empty() {
            return;
        }
        let _scope = perf::scope("overlay.flush");
        let queued = placements.len();
        let cursor = self.buffer.cursor();
        let regions = &mut self.regions;
        let by_mark = &mut self.by_mark;
        let mut stale = Vec::new();
        let mut entered = Vec::new();
        let mut installed = 0_usize;

        self.buffer.run_batched(|buffer| {
            for Placement { region, job, output } in placements {
                let Some(entry) = regions.get_mut(&region) else {
                    continue;
                };
                if !entry.awaits(job) {
                    continue;
                }
                let Some(range) = buffer.mark_range(entry.mark) else {
                    stale.push(region);
                    continue;
                };
                if is_strictly_inside(cursor, range) {
                    entered.push(region);
                    continue;
                }
                buffer.clear_mark(entry.mark);
                by_mark.remove(&entry.mark);
                let mark = buffer.create_mark(range, MarkOptions::replaced_with(output));
                by_mark.insert(mark, region);
                entry.mark = mark;
                entry.state = RegionState::Rendered;
                entry.job = None;
                installed += 1;
            }
        });

        for id in stale {
            self.report_stale(id);
        }
        for id in entered {
            self.suppress(id);
        }
        debug!(queued, installed, "placements flushed");
        perf::log_event("overlay.flush", format!("queued={queued} installed={installed}"));
    }

    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.regions.values()
    }

    pub fn region(&self, id: RegionId) -> Option<&Region> {
        self.regions.get(&id)
    }

    /// The region whose current range contains `pos`.
    pub fn region_at(&self, pos: Position) -> Option<&Region> {
        self.regions.values().find(|region| {
            self.buffer
                .mark_range(region.mark)
                .is_some_and(|range| range.from <= pos && pos < range.to)
        })
    }

    /// Current range of a region, read from its mark.
    pub fn region_range(&self, id: RegionId) -> Option<Range> {
        self.regions
            .get(&id)
            .and_then(|region| self.buffer.mark_range(region.mark))
    }

    pub const fn suppressed(&self) -> Option<RegionId> {
        self.suppressed
    }

    pub const fn pending_placements(&self) -> usize {
        self.placements.len()
    }

    pub const fn watchdog_running(&self) -> bool {
        self.watchdog.is_running()
    }

    pub const fn buffer(&self) -> &B {
        &self.buffer
    }

    /// Mutable access for host edits. Call [`Self::process_events`] after.
    pub const fn buffer_mut(&mut self) -> &mut B {
        &mut self.buffer
    }

    pub const fn renderer(&self) -> &R {
        &self.renderer
    }

    pub const fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    // --- Detection and submission ---

    /// Detect and submit every formula on lines `[from, to)`.
    fn scan_lines(&mut self, from: usize, to: usize) -> usize {
        let _scope = perf::scope("overlay.scan");
        let mut found = Vec::new();
        self.buffer.for_each_line(from, to, &mut |line, text| {
            for span in scan_line(text) {
                found.push((
                    Range::on_line(line, span.start, span.end),
                    span.text(text).to_string(),
                ));
            }
        });
        let count = found.len();
        for (range, source) in found {
            self.detect(range, source);
        }
        count
    }

    fn detect(&mut self, range: Range, source: String) -> RegionId {
        self.next_region += 1;
        let id = RegionId::new(self.next_region);
        let mark = self.buffer.create_mark(range, MarkOptions::plain());
        self.by_mark.insert(mark, id);
        self.regions.insert(id, Region::detected(id, mark, source));
        debug!(%id, %range, "region detected");
        self.submit(id, range);
        id
    }

    /// Build the element from the region's current text and hand it over.
    fn submit(&mut self, id: RegionId, range: Range) {
        let source = self.buffer.text(range);
        let class = self
            .buffer
            .token_class_at(Position::new(range.from.line, range.from.col + 1));
        let element = RenderElement::build(&source, class.as_deref());

        self.next_job += 1;
        let job = JobId::new(self.next_job);
        let Some(region) = self.regions.get_mut(&id) else {
            return;
        };
        if let Some(previous) = region.job.take() {
            self.jobs.remove(&previous);
        }
        region.source = source;
        region.begin_typesetting(job);
        self.jobs.insert(job, id);
        debug!(%id, %job, mode = ?element.mode, "submitted");
        self.renderer.submit(job, element);
    }

    fn handle_typeset(&mut self, job: JobId, output: RenderedFormula) {
        let Some(id) = self.jobs.remove(&job) else {
            debug!(%job, "completion for a discarded job");
            return;
        };
        if !self.regions.get(&id).is_some_and(|region| region.awaits(job)) {
            debug!(%id, %job, "completion superseded");
            return;
        }
        let Some(range) = self.live_range(id) else {
            return;
        };
        if is_strictly_inside(self.buffer.cursor(), range) {
            self.suppress(id);
        } else {
            self.placements.push(Placement {
                region: id,
                job,
                output,
            });
        }
    }

    // --- Cursor transitions ---

    fn handle_cursor_entered(&mut self, mark: MarkId) {
        let Some(&id) = self.by_mark.get(&mark) else {
            return;
        };
        if self.regions.get(&id).map(Region::state) != Some(RegionState::Rendered) {
            return;
        }
        let Some(range) = self.live_range(id) else {
            return;
        };
        self.replace_mark(id, range, MarkOptions::plain());
        self.suppress(id);
    }

    fn handle_cursor_activity(&mut self) {
        let Some(id) = self.suppressed else {
            return;
        };
        let Some(range) = self.live_range(id) else {
            return;
        };
        if is_strictly_inside(self.buffer.cursor(), range) {
            return;
        }
        self.suppressed = None;
        self.release(id);
    }

    /// Put `id` in the suppressed slot. A previous occupant is released
    /// and resubmitted.
    fn suppress(&mut self, id: RegionId) {
        if let Some(prior) = self.suppressed.filter(|prior| *prior != id) {
            let error = OverlayError::DoubleSuppression { prior, incoming: id };
            let cursor = self.buffer.cursor();
            let cursor_left = self
                .region_range(prior)
                .is_none_or(|range| !is_strictly_inside(cursor, range));
            if cursor_left {
                debug!(%error, "cursor moved between regions");
            } else {
                warn!(%error, "releasing prior region");
            }
            self.suppressed = None;
            self.release(prior);
        }
        let Some(region) = self.regions.get_mut(&id) else {
            return;
        };
        if let Some(job) = region.job.take() {
            self.jobs.remove(&job);
        }
        region.state = RegionState::Suppressed;
        self.suppressed = Some(id);
        debug!(%id, "suppressed");
    }

    /// Resubmit a region that left the suppressed slot and schedule the
    /// flush for it.
    fn release(&mut self, id: RegionId) {
        let Some(range) = self.live_range(id) else {
            return;
        };
        self.replace_mark(id, range, MarkOptions::plain());
        self.submit(id, range);
        self.renderer.schedule_flush();
    }

    fn replace_mark(&mut self, id: RegionId, range: Range, options: MarkOptions) {
        let Some(region) = self.regions.get_mut(&id) else {
            return;
        };
        self.buffer.clear_mark(region.mark);
        self.by_mark.remove(&region.mark);
        let mark = self.buffer.create_mark(range, options);
        region.mark = mark;
        self.by_mark.insert(mark, id);
    }

    // --- Edits ---

    fn handle_change(&mut self, change: &Change) {
        let _scope = perf::scope("overlay.rescan");
        let mut submitted = 0;
        let links: Vec<&Change> = change.chain().collect();
        for (index, link) in links.iter().enumerate() {
            let (first, end) = links[index + 1..].iter().fold(
                (link.from.line, link.to.line + link.inserted_lines + 1),
                |(first, end), later| carry_window(first, end, later),
            );
            let window = Range::lines(first, end);
            let invalidated: Vec<RegionId> = self
                .buffer
                .marks_overlapping(window)
                .into_iter()
                .filter_map(|mark| self.by_mark.get(&mark).copied())
                .collect();
            for id in invalidated {
                debug!(%id, %window, "invalidated by edit");
                self.destroy(id);
            }
            submitted += self.scan_lines(first, end);
        }
        self.prune_stale();
        if submitted > 0 {
            self.renderer.schedule_flush();
        }
    }

    /// Drop regions whose text was deleted out from under them.
    fn prune_stale(&mut self) {
        let stale: Vec<RegionId> = self
            .regions
            .values()
            .filter(|region| self.buffer.mark_range(region.mark).is_none())
            .map(Region::id)
            .collect();
        for id in stale {
            self.report_stale(id);
        }
    }

    // --- Bookkeeping ---

    /// Current range of a live region. A missing mark destroys the region.
    fn live_range(&mut self, id: RegionId) -> Option<Range> {
        let mark = self.regions.get(&id)?.mark;
        let range = self.buffer.mark_range(mark);
        if range.is_none() {
            self.report_stale(id);
        }
        range
    }

    fn report_stale(&mut self, id: RegionId) {
        if let Some(region) = self.regions.get(&id) {
            let error = OverlayError::StaleMark {
                region: id,
                mark: region.mark,
            };
            debug!(%error, "transition aborted");
        }
        self.destroy(id);
    }

    fn destroy(&mut self, id: RegionId) {
        let Some(region) = self.regions.remove(&id) else {
            return;
        };
        self.buffer.clear_mark(region.mark);
        self.by_mark.remove(&region.mark);
        if let Some(job) = region.job {
            self.jobs.remove(&job);
        }
        if self.suppressed == Some(id) {
            self.suppressed = None;
        }
    }
}

/// Carry a line window `[first, end)` through a compound-edit link applied
/// after the edit that produced it. Lines the link replaced collapse onto
/// the text it inserted, so the result never shrinks below the edited text.
fn carry_window(first: usize, end: usize, later: &Change) -> (usize, usize) {
    let (from, to) = (later.from.line, later.to.line);
    let shift = |line: usize| line - (to - from) + later.inserted_lines;
    let first = if first > to {
        shift(first)
    } else {
        first.min(from)
    };
    let end = if end > to {
        shift(end)
    } else if end > from {
        from + later.inserted_lines + 1
    } else {
        end
    };
    (first, end.max(first + 1))
}
