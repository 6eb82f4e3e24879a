//! Tracked formula regions.

use std::fmt;

use crate::host::{JobId, MarkId};

/// Stable identity of a region for as long as it lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegionId(u64);

impl RegionId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "region#{}", self.0)
    }
}

/// Lifecycle of a region.
///
/// `Detected` is transient: a detected region is submitted right away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionState {
    Detected,
    /// Handed to the renderer; the text is untouched.
    Typesetting,
    /// Drawn as its rendered replacement.
    Rendered,
    /// Shown as plain text because the cursor is inside.
    Suppressed,
}

impl fmt::Display for RegionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Detected => "detected",
            Self::Typesetting => "typesetting",
            Self::Rendered => "rendered",
            Self::Suppressed => "suppressed",
        };
        f.write_str(name)
    }
}

/// One detected formula and the mark that tracks it.
#[derive(Debug, Clone)]
pub struct Region {
    pub(super) id: RegionId,
    pub(super) mark: MarkId,
    pub(super) source: String,
    pub(super) state: RegionState,
    /// The submission whose result this region is waiting to place.
    pub(super) job: Option<JobId>,
}

impl Region {
    pub(super) const fn detected(id: RegionId, mark: MarkId, source: String) -> Self {
        Self {
            id,
            mark,
            source,
            state: RegionState::Detected,
            job: None,
        }
    }

    pub const fn id(&self) -> RegionId {
        self.id
    }

    /// The mark currently backing the region's range.
    pub const fn mark(&self) -> MarkId {
        self.mark
    }

    /// Source text captured by the most recent typesetting submission.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub const fn state(&self) -> RegionState {
        self.state
    }

    pub(super) const fn begin_typesetting(&mut self, job: JobId) {
        self.state = RegionState::Typesetting;
        self.job = Some(job);
    }

    /// True if `job` is the submission this region is waiting on.
    pub(super) fn awaits(&self, job: JobId) -> bool {
        self.state == RegionState::Typesetting && self.job == Some(job)
    }
}
