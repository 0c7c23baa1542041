//! Collaborator interfaces (spec.md §6).
//!
//! The reference tracking core never talks to hardware, a scheduler runtime,
//! a log file or a mail program directly — it only calls through these four
//! traits, the way the teacher's `src/traits.rs` keeps `NtpSource`/
//! `PtpNetwork` as the sole seam between `PtpController` and the outside
//! world.

use anyhow::Result;
use std::time::{Duration, SystemTime};

/// Opaque handle for a scheduled one-shot timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeoutId(pub u64);

/// Opaque handle for an open tracking-log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LogFileId(pub u32);

/// Tags carried by a fired timeout so the host's event loop knows which
/// `ReferenceTracker` method to call back into. The core never stores a
/// closure that captures its own `&mut self` across a scheduler boundary;
/// see SPEC_FULL.md §5 for the rationale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutEvent {
    /// The fallback drift ladder's re-escalation timer (§4.4) fired.
    FallbackDrift,
}

/// The local clock driver (spec.md §6 "Local Clock"). All frequency/skew
/// quantities exchanged with the core are fractional (seconds/second),
/// matching `skew`'s units in the data model; `read_absolute_frequency` and
/// `set_absolute_frequency` are the one boundary expressed in ppm, since
/// that's the unit the drift file and tracking log display.
#[cfg_attr(test, mockall::automock)]
pub trait LocalClock {
    /// Current raw (uncorrected) time.
    fn read_raw_time(&self) -> SystemTime;

    /// The offset that must be added to `raw` to get "cooked" time, i.e.
    /// the slew correction already in flight.
    fn get_offset_correction(&self, raw: SystemTime) -> f64;

    /// Absolute frequency currently applied to the clock, in ppm.
    fn read_absolute_frequency(&self) -> f64;

    /// Set the clock's absolute frequency outright, in ppm.
    fn set_absolute_frequency(&mut self, freq_ppm: f64) -> Result<()>;

    /// Fold a fractional frequency delta and an offset into the running
    /// slew, paced by `correction_rate` (§4.2).
    fn accumulate_frequency_and_offset(
        &mut self,
        freq_delta: f64,
        offset: f64,
        correction_rate: f64,
    ) -> Result<()>;

    /// Fold only an offset into the running slew (skew was untrustworthy).
    fn accumulate_offset(&mut self, offset: f64, correction_rate: f64) -> Result<()>;

    /// Apply an instantaneous step of `offset` seconds.
    fn apply_step_offset(&mut self, offset: f64) -> Result<()>;

    /// Program the pending leap second: -1, 0 or +1.
    fn set_leap(&mut self, leap_sec: i32) -> Result<()>;

    /// Worst-case clock error bound, fractional (seconds/second).
    fn get_max_clock_error(&self) -> f64;

    /// System clock read precision, expressed as a dispersion quantum in
    /// seconds.
    fn get_sys_precision_as_quantum(&self) -> f64;
}

/// One-shot timer scheduling (spec.md §6 "Scheduler").
#[cfg_attr(test, mockall::automock)]
pub trait Scheduler {
    /// Schedule `event` to fire after `delay`. Returns an id valid for
    /// `remove_timeout` until it fires.
    fn add_timeout(&mut self, delay: Duration, event: TimeoutEvent) -> TimeoutId;

    /// Cancel a previously scheduled timeout; a no-op if it already fired.
    fn remove_timeout(&mut self, id: TimeoutId);
}

/// Append-only tracking log (spec.md §6 "Log sink").
#[cfg_attr(test, mockall::automock)]
pub trait LogSink {
    /// Open (or create) a log file, writing `header` as its first line if
    /// newly created. Returns a handle for subsequent writes.
    fn file_open(&mut self, name: &str, header: &str) -> LogFileId;

    /// Append a fully-formatted line to the file.
    fn file_write(&mut self, id: LogFileId, line: &str);
}

/// External notification command (spec.md §6, §4.8).
#[cfg_attr(test, mockall::automock)]
pub trait Notifier {
    /// Pipe a notification with `subject`/`body` to the mailer for `user`.
    fn notify(&self, subject: &str, body: &str, user: &str) -> Result<()>;
}
