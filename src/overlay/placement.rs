//! Batched placement of rendered formulas.

use std::time::{Duration, Instant};

use super::RegionId;
use crate::host::JobId;
use crate::render::RenderedFormula;

/// A finished render waiting to be installed as a mark replacement.
#[derive(Debug, Clone)]
pub(super) struct Placement {
    pub(super) region: RegionId,
    pub(super) job: JobId,
    pub(super) output: RenderedFormula,
}

/// Pending placements. Taken whole, never partially.
#[derive(Debug, Default)]
pub(super) struct PlacementQueue {
    pending: Vec<Placement>,
}

impl PlacementQueue {
    pub(super) fn push(&mut self, placement: Placement) {
        self.pending.push(placement);
    }

    pub(super) fn take(&mut self) -> Vec<Placement> {
        std::mem::take(&mut self.pending)
    }

    pub(super) const fn len(&self) -> usize {
        self.pending.len()
    }

    pub(super) const fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub(super) fn clear(&mut self) {
        self.pending.clear();
    }
}

/// Periodic backstop that forces a flush if one was missed.
///
/// Runs from `start` until `stop`; the host feeds it the current time.
#[derive(Debug)]
pub(super) struct Watchdog {
    interval: Duration,
    next_due: Option<Instant>,
}

impl Watchdog {
    pub(super) const fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_due: None,
        }
    }

    pub(super) fn start(&mut self, now: Instant) {
        self.next_due = Some(now + self.interval);
    }

    pub(super) const fn stop(&mut self) {
        self.next_due = None;
    }

    pub(super) const fn is_running(&self) -> bool {
        self.next_due.is_some()
    }

    /// True once per elapsed interval; schedules the next tick.
    pub(super) fn take_due(&mut self, now: Instant) -> bool {
        let Some(due) = self.next_due else {
            return false;
        };
        if now < due {
            return false;
        }
        self.next_due = Some(now + self.interval);
        true
    }
}
