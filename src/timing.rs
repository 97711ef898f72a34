//! Per-call timestamps and client deadlines.
//!
//! A call moves through three stages: received by the I/O thread, picked up
//! by a handler, and completed by that handler. Each stage is stamped exactly
//! once and only after the stage before it. Violations are reported as
//! [`TimingError`] and leave the recorded timestamps untouched.
//!
//! Timestamps use [`tokio::time::Instant`] so tests can pause and advance the
//! clock.

use std::{fmt, time::Duration};

use thiserror::Error;
use tokio::time::Instant;

/// Stage of a call's life that can be stamped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimingStage {
    /// The transfer was accepted and parsed.
    Received,
    /// A handler started executing the call.
    HandlingStarted,
    /// The handler finished executing the call.
    HandlingCompleted,
}

impl TimingStage {
    fn as_str(self) -> &'static str {
        match self {
            TimingStage::Received => "received",
            TimingStage::HandlingStarted => "handling started",
            TimingStage::HandlingCompleted => "handling completed",
        }
    }
}

impl fmt::Display for TimingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Misuse of the timing recorder.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum TimingError {
    /// The stage was already stamped.
    #[error("call timing stage '{0}' recorded twice")]
    AlreadyRecorded(TimingStage),
    /// The stage was stamped before the stage it depends on.
    #[error("call timing stage '{stage}' recorded before '{missing}'")]
    OutOfOrder {
        stage: TimingStage,
        missing: TimingStage,
    },
}

/// Receive, start and completion timestamps of one call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallTiming {
    received: Option<Instant>,
    handling_started: Option<Instant>,
    handling_completed: Option<Instant>,
}

impl CallTiming {
    #[must_use]
    pub const fn received(&self) -> Option<Instant> { self.received }

    #[must_use]
    pub const fn handling_started(&self) -> Option<Instant> { self.handling_started }

    #[must_use]
    pub const fn handling_completed(&self) -> Option<Instant> { self.handling_completed }

    /// Stamp the receive time.
    ///
    /// # Errors
    ///
    /// Returns [`TimingError::AlreadyRecorded`] on a second call.
    pub fn mark_received(&mut self, now: Instant) -> Result<(), TimingError> {
        if self.received.is_some() {
            return Err(TimingError::AlreadyRecorded(TimingStage::Received));
        }
        self.received = Some(now);
        Ok(())
    }

    /// Stamp the handling start time and return the time spent queued.
    ///
    /// # Errors
    ///
    /// Returns [`TimingError`] if the call was not received yet or if handling
    /// was already marked as started.
    pub fn mark_handling_started(&mut self, now: Instant) -> Result<Duration, TimingError> {
        let received = Self::require(
            self.received,
            TimingStage::HandlingStarted,
            TimingStage::Received,
        )?;
        if self.handling_started.is_some() {
            return Err(TimingError::AlreadyRecorded(TimingStage::HandlingStarted));
        }
        let now = now.max(received);
        self.handling_started = Some(now);
        Ok(now - received)
    }

    /// Stamp the handling completion time and return the handler run time.
    ///
    /// # Errors
    ///
    /// Returns [`TimingError`] if handling has not started or was already
    /// marked as complete.
    pub fn mark_handling_completed(&mut self, now: Instant) -> Result<Duration, TimingError> {
        let started = Self::require(
            self.handling_started,
            TimingStage::HandlingCompleted,
            TimingStage::HandlingStarted,
        )?;
        if self.handling_completed.is_some() {
            return Err(TimingError::AlreadyRecorded(
                TimingStage::HandlingCompleted,
            ));
        }
        let now = now.max(started);
        self.handling_completed = Some(now);
        Ok(now - started)
    }

    /// Time elapsed since the call was received, if it was.
    #[must_use]
    pub fn elapsed_since_received(&self, now: Instant) -> Option<Duration> {
        self.received
            .map(|received| now.saturating_duration_since(received))
    }

    fn require(
        value: Option<Instant>,
        stage: TimingStage,
        missing: TimingStage,
    ) -> Result<Instant, TimingError> {
        value.ok_or(TimingError::OutOfOrder { stage, missing })
    }
}

/// Point in time after which the client no longer waits for a response.
///
/// A deadline is either a concrete instant or infinite, for clients that
/// did not declare one.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use callframe::timing::Deadline;
/// use tokio::time::Instant;
///
/// let start = Instant::now();
/// let deadline = Deadline::after(start, Duration::from_millis(100));
/// assert!(!deadline.has_passed(start));
/// assert!(deadline.has_passed(start + Duration::from_millis(100)));
/// assert!(!Deadline::infinite().has_passed(start + Duration::from_secs(3600)));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// A deadline that never passes.
    #[must_use]
    pub const fn infinite() -> Self { Self(None) }

    /// A deadline `timeout` after `start`. Saturates to infinite on overflow.
    #[must_use]
    pub fn after(start: Instant, timeout: Duration) -> Self { Self(start.checked_add(timeout)) }

    #[must_use]
    pub const fn is_infinite(&self) -> bool { self.0.is_none() }

    #[must_use]
    pub const fn instant(&self) -> Option<Instant> { self.0 }

    /// Whether `now` is at or beyond the deadline.
    #[must_use]
    pub fn has_passed(&self, now: Instant) -> bool { self.0.is_some_and(|deadline| now >= deadline) }

    /// Time left before the deadline, `None` when infinite.
    #[must_use]
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.0
            .map(|deadline| deadline.saturating_duration_since(now))
    }
}

impl Default for Deadline {
    fn default() -> Self { Self::infinite() }
}
