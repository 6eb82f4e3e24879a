//! Error taxonomy.
//!
//! None of the overlay errors reach the host: the engine builds them only to
//! log them, then recovers locally. The worst visible outcome is a formula
//! that stays unrendered a little longer.

use thiserror::Error;

use crate::host::MarkId;
use crate::overlay::RegionId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OverlayError {
    /// The region's mark no longer exists; its text was deleted by an edit
    /// the engine had not processed yet.
    #[error("region {region} lost its mark {mark:?} before the transition ran")]
    StaleMark { region: RegionId, mark: MarkId },

    /// A second region tried to occupy the suppressed slot.
    #[error("region {incoming} suppressed while region {prior} was still suppressed")]
    DoubleSuppression { prior: RegionId, incoming: RegionId },

    /// The watchdog found placements that no flush continuation picked up.
    #[error("watchdog found {pending} unflushed placement(s); a flush trigger was missed")]
    MissedFlush { pending: usize },
}

/// Failures surfaced by renderer implementations.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("render worker thread is gone")]
    WorkerGone,
    #[error("failed to spawn render worker: {0}")]
    Spawn(#[from] std::io::Error),
}
