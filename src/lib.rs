// Only allow lints that are either transitive-dependency noise or
// genuinely opinionated style choices that don't indicate real issues.
#![allow(
    // Transitive dependency version mismatches we can't control
    clippy::multiple_crate_versions,
    // module_name_repetitions is pure style preference (e.g. overlay::OverlayConfig)
    clippy::module_name_repetitions
)]

//! # formula-overlay
//!
//! Keeps typeset formulas drawn over a live, editable text buffer.
//!
//! Formulas (`$…$`, `$$…$$`, `\(…\)`, `\[…\]`, `\begin{env}…\end{env}`,
//! `\newcommand{…}`) are found line by line, typeset asynchronously and
//! shown in place of their source. The source comes back when the cursor
//! enters a formula and is typeset again once the cursor leaves. Edits
//! invalidate and rescan only the lines they touch.
//!
//! ## Architecture
//!
//! The engine is a single-threaded state machine around two
//! collaborators:
//! - **Buffer**: text, cursor, marks and change notifications
//! - **Renderer**: a FIFO typesetting queue with flush continuations
//!
//! ## Modules
//!
//! - [`overlay`]: the engine and its region state machine
//! - [`host`]: collaborator traits
//! - [`editor`]: rope-backed reference buffer
//! - [`render`]: typesetters and renderers
//! - [`scanner`]: formula detection
//! - [`position`]: positions, ranges and their predicates
//! - [`config`]: engine settings and CLI flag files
//! - [`error`]: error types
//! - [`perf`]: timing scopes and the render debug log

pub mod config;
pub mod editor;
pub mod error;
pub mod host;
pub mod overlay;
pub mod perf;
pub mod position;
pub mod render;
pub mod scanner;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::OverlayConfig;
    pub use crate::editor::EditorBuffer;
    pub use crate::host::{Buffer, Renderer};
    pub use crate::overlay::{MathOverlay, RegionId, RegionState};
    pub use crate::position::{Position, Range};
    pub use crate::render::{FifoRenderer, PlainTypesetter, ThreadedRenderer};
}
