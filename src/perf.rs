//! Timing scopes and the render debug log.
//!
//! Both are process-wide and off by default. [`scope`] times a block and
//! reports it through `tracing` under the `perf` target; [`log_event`] appends
//! to the file opened with [`set_debug_log_path`]. Timed scopes are copied
//! into that file as well.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

static TIMING: AtomicBool = AtomicBool::new(false);
static DEBUG_LOG: Mutex<Option<DebugLog>> = Mutex::new(None);

pub fn set_enabled(enabled: bool) {
    TIMING.store(enabled, Ordering::Relaxed);
}

pub fn is_enabled() -> bool {
    TIMING.load(Ordering::Relaxed)
}

/// Start timing `name`. The result is reported when the guard drops, and
/// only if timing was enabled when it was created.
pub fn scope(name: &'static str) -> Scope {
    Scope {
        name,
        start: is_enabled().then(Instant::now),
    }
}

#[derive(Debug)]
#[must_use = "the scope is timed until the guard is dropped"]
pub struct Scope {
    name: &'static str,
    start: Option<Instant>,
}

impl Drop for Scope {
    fn drop(&mut self) {
        let Some(start) = self.start else {
            return;
        };
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        tracing::info!(target: "perf", scope = self.name, elapsed_ms, "timing");
        log_event(self.name, format!("{elapsed_ms:.3} ms"));
    }
}

#[derive(Debug)]
struct DebugLog {
    opened: Instant,
    writer: BufWriter<File>,
}

/// Route [`log_event`] output to `path`, or close the log with `None`.
pub fn set_debug_log_path(path: Option<&Path>) -> std::io::Result<()> {
    let log = match path {
        Some(path) => {
            let mut writer = BufWriter::new(File::create(path)?);
            writeln!(writer, "formula-overlay render debug log start")?;
            writer.flush()?;
            Some(DebugLog {
                opened: Instant::now(),
                writer,
            })
        }
        None => None,
    };
    *DEBUG_LOG.lock().unwrap_or_else(PoisonError::into_inner) = log;
    Ok(())
}

/// Append a line stamped with the time since the log was opened. Write
/// failures are ignored; the log is a diagnostic aid.
pub fn log_event(name: &str, detail: impl AsRef<str>) {
    let mut guard = DEBUG_LOG.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(log) = guard.as_mut() {
        let elapsed_ms = log.opened.elapsed().as_secs_f64() * 1000.0;
        let _ = writeln!(log.writer, "[{elapsed_ms:>10.3} ms] {name}: {}", detail.as_ref())
            .and_then(|()| log.writer.flush());
    }
}
