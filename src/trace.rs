//! Per-call trace buffers.
//!
//! A [`Trace`] collects short, timestamped notes about what happened to a
//! call. Calls hold it behind an [`Arc`](std::sync::Arc) so other components
//! may keep appending to or reading from the same buffer after the call has
//! been answered and dropped.

use std::{
    fmt::Write as _,
    sync::{Mutex, MutexGuard, PoisonError},
};

use tokio::time::Instant;

#[derive(Debug)]
struct TraceEntry {
    at: Instant,
    message: String,
}

/// Append-only, thread-safe trace buffer.
#[derive(Debug)]
pub struct Trace {
    started: Instant,
    entries: Mutex<Vec<TraceEntry>>,
}

impl Trace {
    #[must_use]
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Append a note stamped with the current time.
    pub fn record(&self, message: impl Into<String>) {
        let entry = TraceEntry {
            at: Instant::now(),
            message: message.into(),
        };
        self.lock().push(entry);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.lock().is_empty() }

    /// Render the trace, one note per line.
    ///
    /// With `include_time_deltas` each line is prefixed by the microseconds
    /// elapsed since the previous note (or since the trace was created).
    #[must_use]
    pub fn dump(&self, include_time_deltas: bool) -> String {
        let entries = self.lock();
        let mut out = String::new();
        let mut previous = self.started;
        for entry in entries.iter() {
            if include_time_deltas {
                let delta = entry.at.saturating_duration_since(previous).as_micros();
                let _ = write!(out, "(+{delta:>6}us) ");
                previous = entry.at;
            }
            out.push_str(&entry.message);
            out.push('\n');
        }
        out
    }

    // Entries are plain data, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, Vec<TraceEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Trace {
    fn default() -> Self { Self::new() }
}
