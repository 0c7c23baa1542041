//! Tunables for the reference tracking core (spec.md §3 "Configuration").
//!
//! Loaded by the embedding host (parsing the on-disk config format is out of
//! scope, per spec.md §1) and handed to [`crate::reference::ReferenceTracker::new`].

use serde::{Deserialize, Serialize};

/// All tunables read at init; a subset (`max_update_skew`, local-stratum
/// enablement) is mutable afterwards through the public control surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceConfig {
    /// Skew, in ppm, above which a measurement's frequency component is
    /// distrusted and only its offset is applied (§4.2). Converted to a
    /// fractional s/s threshold internally via `* 1.0e-6`.
    pub max_update_skew: f64,

    /// Pacing ratio for the area-under-curve correction rate (§4.2).
    pub correction_time_ratio: f64,

    /// Remaining number of allowed steps; 0 = never step, negative = unlimited.
    pub make_step_limit: i32,
    /// Offset magnitude above which a step (rather than slew) is applied.
    pub make_step_threshold: f64,

    /// Warm-up countdown before offset gating kicks in; negative disables
    /// the offset gate entirely.
    pub max_offset_delay: i32,
    /// Number of oversized-offset updates to silently ignore before giving
    /// up and ending the reference mode; negative = ignore forever.
    pub max_offset_ignore: i32,
    /// Maximum accepted offset magnitude once warm-up has elapsed.
    pub max_offset: f64,

    /// Emit a syslog-style warning when `|offset| >` this (disabled if `None`).
    pub log_change_threshold: Option<f64>,
    /// Pipe a mail notification when `|offset| >` this (disabled if `None`).
    pub mail_change_threshold: Option<f64>,
    /// `user` argument passed to the mailer program; truncated to 128 bytes.
    pub mail_user: Option<String>,

    /// Drift file path; `None` disables persistence.
    pub drift_file_path: Option<String>,

    /// System timezone name carrying leap-second data at midnight boundaries;
    /// `None` disables timezone-based leap detection.
    pub leap_timezone_name: Option<String>,

    /// Inclusive `log2(seconds)` range of the fallback drift ladder.
    /// `fb_drift_max < fb_drift_min` disables the ladder.
    pub fb_drift_min: i32,
    pub fb_drift_max: i32,

    /// Stratum reported while free-running on the local reference, if enabled.
    pub local_stratum: Option<u16>,

    /// Offset magnitude at or above which `InitStepSlew` mode steps instead
    /// of slewing (§4.7).
    pub init_step_threshold: f64,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        ReferenceConfig {
            max_update_skew: 1000.0,
            correction_time_ratio: 3.0,
            make_step_limit: 1,
            make_step_threshold: 1.0,
            max_offset_delay: 0,
            max_offset_ignore: 0,
            max_offset: 1.0,
            log_change_threshold: Some(1.0),
            mail_change_threshold: None,
            mail_user: None,
            drift_file_path: None,
            leap_timezone_name: None,
            // Mirrors chrony's default: fallback ladder disabled unless an
            // administrator opts in with fb_drift_min > 0.
            fb_drift_min: 0,
            fb_drift_max: -1,
            local_stratum: None,
            init_step_threshold: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_disables_fallback_ladder() {
        let cfg = ReferenceConfig::default();
        assert!(cfg.fb_drift_max < cfg.fb_drift_min);
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = ReferenceConfig::default();
        let json = serde_json::to_string(&cfg).expect("serialize");
        let restored: ReferenceConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(restored.max_offset, cfg.max_offset);
        assert_eq!(restored.fb_drift_min, cfg.fb_drift_min);
    }
}
