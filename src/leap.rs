//! Leap-second resolution (spec.md §4.5).
//!
//! Calendar gating (`is_leap_second_day`) is pure. Detecting a leap second
//! announced via the system timezone database is not: it requires probing
//! `mktime`'s 23:59:60 rollover behavior under a foreign `TZ`, which this
//! module delegates to an injectable [`TzProbe`] so the resolver itself stays
//! unit-testable without touching process-global environment state.

use crate::types::LeapStatus;
use chrono::{Datelike, NaiveDateTime};

/// Leap seconds are only ever inserted/deleted at the end of June or
/// December (spec.md §4.5, `is_leap_second_day` in `reference.c`).
pub fn is_leap_second_day(now_unix: i64) -> bool {
    let Some(dt) = NaiveDateTime::from_timestamp_opt(now_unix, 0) else {
        return false;
    };
    let (month, day) = (dt.month(), dt.day());
    (month == 6 && day == 30) || (month == 12 && day == 31)
}

/// Probes whether `tzname` announces a leap second at the end of the UTC day
/// containing `when` (unix seconds), via the `mktime(23:59:60)` rollover
/// trick `get_tz_leap` relies on in `reference.c`.
///
/// A real implementation must temporarily override the process's `TZ`
/// environment variable, which is why this is a collaborator rather than a
/// pure function: exercising it directly would make tests depend on global
/// process state and the host's installed timezone database.
pub trait TzProbe {
    fn probe(&self, when_unix: i64, tzname: &str) -> LeapStatus;
}

/// Caches the last `TzProbe` result to at most twice a day, per
/// `reference.c`'s `last_tz_leap_check` floor.
#[derive(Debug, Clone, Default)]
pub struct LeapResolver {
    last_check_floor: Option<i64>,
    cached: LeapStatus,
}

const TZ_CHECK_PERIOD: i64 = 12 * 3600;

impl LeapResolver {
    pub fn new() -> Self {
        LeapResolver { last_check_floor: None, cached: LeapStatus::Normal }
    }

    /// `get_tz_leap`: probe at most twice a day, and only on a calendar day
    /// that could actually carry a leap second.
    pub fn tz_leap(&mut self, now_unix: i64, tzname: &str, probe: &dyn TzProbe) -> LeapStatus {
        let floor = (now_unix / TZ_CHECK_PERIOD) * TZ_CHECK_PERIOD;
        if self.last_check_floor == Some(floor) {
            return self.cached;
        }
        self.last_check_floor = Some(floor);
        self.cached = LeapStatus::Normal;

        if !is_leap_second_day(floor) {
            return self.cached;
        }

        self.cached = probe.probe(floor, tzname);
        self.cached
    }

    /// `update_leap_status`: combine an explicit (e.g. manually configured
    /// or NTP-source-announced) leap status with the timezone probe, gate it
    /// against the calendar, and return the resolved status plus the signed
    /// `leap_sec` (`-1`/`0`/`1`) that should be programmed into the clock.
    pub fn resolve(
        &mut self,
        leap_in: LeapStatus,
        now_unix: i64,
        tzname: Option<&str>,
        probe: &dyn TzProbe,
    ) -> (LeapStatus, i32) {
        let mut leap = leap_in;

        if let Some(tzname) = tzname {
            if now_unix != 0 && leap == LeapStatus::Normal {
                leap = self.tz_leap(now_unix, tzname, probe);
            }
        }

        let leap_sec = match leap {
            LeapStatus::InsertSecond | LeapStatus::DeleteSecond => {
                if is_leap_second_day(now_unix) {
                    leap.pending_leap_value()
                } else {
                    leap = LeapStatus::Normal;
                    0
                }
            }
            LeapStatus::Normal | LeapStatus::Unsynchronised => 0,
        };

        (leap, leap_sec)
    }
}
