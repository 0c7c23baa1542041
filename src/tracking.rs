//! Tracking report and tracking-log formatting (spec.md §4.8, §6).

use crate::types::LeapStatus;
use std::time::SystemTime;

/// Snapshot returned by `ReferenceTracker::get_tracking_report` (spec.md §3,
/// `REF_GetTrackingReport` in `reference.c`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingReport {
    pub reference_id: u32,
    pub stratum: u16,
    pub leap: LeapStatus,
    pub ref_time: SystemTime,
    pub current_correction: f64,
    pub last_offset: f64,
    pub rms_offset: f64,
    pub frequency_ppm: f64,
    pub skew_ppm: f64,
    pub root_delay: f64,
    pub root_dispersion: f64,
}

/// Column header written once at the top of a newly created tracking log
/// file. Kept byte-for-byte identical to `reference.c`'s `REF_Initialise`
/// so existing log-parsing tools keep working unchanged.
pub const TRACKING_LOG_HEADER: &str =
    "   Date (UTC) Time     IP Address   St   Freq ppm   Skew ppm     Offset L Co  Offset sd Rem. corr.";

/// Format one tracking-log line (`write_log` in `reference.c`).
///
/// `date_time` must already be rendered in the `UTI_TimeToLogForm` style
/// (`YYYY-MM-DD HH:MM:SS`); formatting `SystemTime` into that string is the
/// embedding host's job (it owns the calendar/locale dependency), this
/// function only lays the fields out in their fixed-width columns.
#[allow(clippy::too_many_arguments)]
pub fn format_tracking_line(
    date_time: &str,
    reference: &str,
    stratum: u16,
    freq_ppm: f64,
    skew_ppm: f64,
    offset: f64,
    leap: LeapStatus,
    combined_sources: u32,
    offset_sd: f64,
    uncorrected_offset: f64,
) -> String {
    format!(
        "{} {:<15} {:2} {:10.3} {:10.3} {:10.3e} {:1} {:2} {:10.3e} {:10.3e}",
        date_time,
        reference,
        stratum,
        freq_ppm,
        skew_ppm,
        offset,
        leap.code(),
        combined_sources,
        offset_sd,
        uncorrected_offset,
    )
}
