//! The reference tracking core (spec.md §3, §4).
//!
//! `ReferenceTracker<C, S, L, M>` mirrors the teacher's `PtpController<C, N, S>`:
//! a generic struct parameterized over its collaborators, holding all
//! mutable state itself and calling out through the `LocalClock`/
//! `Scheduler`/`LogSink`/`Notifier` traits rather than owning any I/O
//! directly.

use crate::blender::{self, BlendInput, BlendOutcome, OffsetGateResult, SplitOffset};
use crate::config::ReferenceConfig;
use crate::drift_file;
use crate::fallback::FallbackLadder;
use crate::leap::{LeapResolver, TzProbe};
use crate::mode::{Mode, ModeAction};
use crate::tracking::{format_tracking_line, TrackingReport, TRACKING_LOG_HEADER};
use crate::traits::{LocalClock, LogFileId, LogSink, Notifier, Scheduler, TimeoutEvent};
use crate::types::{LeapStatus, RefAddr, LOCAL_REFERENCE_ID, MANUAL_REFERENCE_ID, MIN_SKEW, UNSYNCHRONISED_STRATUM};
use chrono::{TimeZone, Utc};
use log::{debug, info, warn};
use std::time::{Duration, SystemTime};

/// Whether a call into the tracker ended an active one-shot mode, and with
/// what result. Returned to the host instead of dispatched through a
/// stored closure, per SPEC_FULL.md §5.
pub type ModeEndResult = Option<bool>;

struct SyncedState {
    stratum: u16,
    ref_id: u32,
    ref_addr: RefAddr,
    ref_time: SystemTime,
    root_delay: f64,
    root_dispersion: f64,
    skew: f64,
    residual_freq: f64,
}

/// The reference tracking core.
pub struct ReferenceTracker<C, S, L, M> {
    clock: C,
    scheduler: S,
    log_sink: L,
    notifier: M,
    tz_probe: Option<Box<dyn TzProbe>>,

    config: ReferenceConfig,
    mode: Mode,

    are_we_synchronised: bool,
    synced: Option<SyncedState>,

    our_leap_status: LeapStatus,
    our_leap_sec: i32,
    leap_resolver: LeapResolver,

    last_ref_update: Option<SystemTime>,
    last_ref_update_interval: f64,
    last_offset: f64,
    /// Skew seeded from the drift file at `initialise`, used as the prior
    /// skew for the very first blend after a restart (`our_skew` in
    /// `REF_Initialise`/`REF_SetReference`).
    seed_skew: f64,
    avg2_offset: f64,
    avg2_moving: bool,

    drift_file_age: f64,

    enable_local_stratum: bool,
    local_stratum: u16,

    max_update_skew: f64,
    step_limit_remaining: i32,
    offset_delay_remaining: i32,
    offset_ignore_remaining: i32,

    fallback: FallbackLadder,
    fb_timeout_id: Option<crate::traits::TimeoutId>,

    log_file: Option<LogFileId>,
    initialised: bool,
}

impl<C, S, L, M> ReferenceTracker<C, S, L, M>
where
    C: LocalClock,
    S: Scheduler,
    L: LogSink,
    M: Notifier,
{
    pub fn new(config: ReferenceConfig, clock: C, scheduler: S, log_sink: L, notifier: M) -> Self {
        let step_limit_remaining = config.make_step_limit;
        let offset_delay_remaining = config.max_offset_delay;
        let offset_ignore_remaining = config.max_offset_ignore;
        let max_update_skew = config.max_update_skew.abs() * 1.0e-6;
        let fallback = FallbackLadder::new(config.fb_drift_min, config.fb_drift_max);

        ReferenceTracker {
            clock,
            scheduler,
            log_sink,
            notifier,
            tz_probe: None,
            config,
            mode: Mode::Normal,
            are_we_synchronised: false,
            synced: None,
            our_leap_status: LeapStatus::Unsynchronised,
            our_leap_sec: 0,
            leap_resolver: LeapResolver::new(),
            last_ref_update: None,
            last_ref_update_interval: 0.0,
            last_offset: 0.0,
            seed_skew: 1.0,
            avg2_offset: 0.0,
            avg2_moving: false,
            drift_file_age: 0.0,
            enable_local_stratum: config.local_stratum.is_some(),
            local_stratum: config.local_stratum.unwrap_or(UNSYNCHRONISED_STRATUM),
            max_update_skew,
            step_limit_remaining,
            offset_delay_remaining,
            offset_ignore_remaining,
            fallback,
            fb_timeout_id: None,
            log_file: None,
            initialised: false,
        }
    }

    /// Installs the timezone-leap probe; only consulted if
    /// `config.leap_timezone_name` is set.
    pub fn with_tz_probe(mut self, probe: Box<dyn TzProbe>) -> Self {
        self.tz_probe = Some(probe);
        self
    }

    fn config(&self) -> &ReferenceConfig {
        &self.config
    }

    /// `REF_Initialise`: reads the drift file, opens the tracking log,
    /// sanity-checks the configured leap timezone, and logs the first
    /// (unsynchronised) tracking entry.
    pub fn initialise(&mut self) {
        let mut have_frequency = false;

        if let Some(path) = self.config().drift_file_path.clone() {
            match drift_file::read(std::path::Path::new(&path)) {
                Ok(Some(contents)) => {
                    info!(
                        "Frequency {:.3} +/- {:.3} ppm read from {}",
                        contents.frequency_ppm,
                        1.0e6 * contents.skew,
                        path
                    );
                    let _ = self.clock.set_absolute_frequency(contents.frequency_ppm);
                    self.seed_skew = contents.skew;
                    have_frequency = true;
                }
                Ok(None) => {}
                Err(err) => warn!("Could not read valid frequency and skew from driftfile {path}: {err}"),
            }
        }

        if !have_frequency {
            let freq = self.clock.read_absolute_frequency();
            if freq != 0.0 {
                info!("Initial frequency {:.3} ppm", freq);
            }
        }

        if self.config().leap_timezone_name.is_some() && self.tz_probe.is_none() {
            warn!("Leap timezone configured but no TzProbe installed, ignoring");
        } else if let (Some(tzname), Some(probe)) =
            (self.config().leap_timezone_name.clone(), self.tz_probe.as_deref())
        {
            // Sanity check against two known reference dates, mirroring
            // REF_Initialise's startup self-test.
            let june_2008 = probe.probe(1214784000, &tzname);
            let dec_2008 = probe.probe(1230681600, &tzname);
            if june_2008 == LeapStatus::Normal && dec_2008 == LeapStatus::InsertSecond {
                info!("Using {} timezone to obtain leap second data", tzname);
            } else {
                warn!("Timezone {} failed leap second check, ignoring", tzname);
                self.tz_probe = None;
            }
        }

        if self.config().log_change_threshold.is_some() {
            self.log_file = Some(self.log_sink.file_open("tracking", TRACKING_LOG_HEADER));
        }

        self.initialised = true;
        self.set_unsynchronised();
    }

    /// `REF_Finalise`.
    pub fn finalise(&mut self) {
        if self.our_leap_sec != 0 {
            let _ = self.clock.set_leap(0);
        }
        if let Some(path) = &self.config.drift_file_path {
            if self.drift_file_age > 0.0 {
                if let Some(synced) = &self.synced {
                    let freq_ppm = self.clock.read_absolute_frequency();
                    let _ = drift_file::write(std::path::Path::new(path), freq_ppm, synced.skew);
                }
            }
        }
        self.initialised = false;
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    fn end_ref_mode(&mut self, result: bool) -> ModeEndResult {
        self.mode = Mode::Ignore;
        Some(result)
    }

    fn log_change(&self, offset: f64) {
        if let Some(threshold) = self.config.log_change_threshold {
            if offset.abs() > threshold.abs() {
                warn!("System clock wrong by {:.6} seconds, adjustment started", -offset);
            }
        }
    }

    fn mail_change(&self, offset: f64, now_unix: i64) {
        let Some(threshold) = self.config.mail_change_threshold else { return };
        if offset.abs() <= threshold {
            return;
        }
        let Some(user) = &self.config.mail_user else { return };
        // Bounded to avoid overflowing the mailer's command line (spec.md §4.8).
        let boundary = user.char_indices().map(|(i, _)| i).find(|&i| i >= 128).unwrap_or(user.len());
        let user = &user[..boundary];
        let when = Utc.timestamp_opt(now_unix, 0).single();
        let body = match when {
            Some(dt) => format!(
                "On {}\n  with the system clock reading {} UTC\n\n\
                 started to apply an adjustment of {:.3} seconds to it,\n\
                 which exceeded the reporting threshold of {:.3} seconds\n",
                dt.format("%A, %d %B %Y"),
                dt.format("%H:%M:%S"),
                -offset,
                threshold
            ),
            None => format!(
                "started to apply an adjustment of {:.3} seconds, exceeding the threshold of {:.3}\n",
                -offset, threshold
            ),
        };
        if let Err(err) = self.notifier.notify("reports change to system clock", &body, user) {
            warn!("Could not send mail notification to user {user}: {err}");
        }
    }

    fn write_tracking_log(
        &mut self,
        now_unix: i64,
        reference: &str,
        stratum: u16,
        freq_ppm: f64,
        skew_ppm: f64,
        offset: f64,
        leap: LeapStatus,
        combined_sources: u32,
        offset_sd: f64,
        uncorrected_offset: f64,
    ) {
        let Some(id) = self.log_file else { return };
        let date_time = Utc
            .timestamp_opt(now_unix, 0)
            .single()
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "????-??-?? ??:??:??".to_string());
        let line = format_tracking_line(
            &date_time,
            reference,
            stratum,
            freq_ppm,
            skew_ppm,
            offset,
            leap,
            combined_sources,
            offset_sd,
            uncorrected_offset,
        );
        self.log_sink.file_write(id, &line);
    }

    fn now_corrected(&self) -> (SystemTime, f64) {
        let raw = self.clock.read_raw_time();
        let correction = self.clock.get_offset_correction(raw);
        let cooked = raw + Duration::from_secs_f64(correction.max(0.0))
            - Duration::from_secs_f64((-correction).max(0.0));
        (cooked, correction)
    }

    /// `REF_SetReference` (spec.md §4.1-§4.3).
    #[allow(clippy::too_many_arguments)]
    pub fn set_reference(
        &mut self,
        stratum: u16,
        leap: LeapStatus,
        combined_sources: u32,
        ref_id: u32,
        ref_addr: RefAddr,
        ref_time: SystemTime,
        offset: f64,
        offset_sd: f64,
        frequency: f64,
        skew: f64,
        root_delay: f64,
        root_dispersion: f64,
    ) -> ModeEndResult {
        assert!(self.initialised, "set_reference called before initialise");

        if self.mode != Mode::Normal {
            return self.dispatch_special_mode(true, offset);
        }

        let mut skew = skew;
        if skew < MIN_SKEW {
            skew = MIN_SKEW;
        }
        if !blender::is_skew_sane(skew) {
            warn!("Bogus skew value encountered");
            return None;
        }

        let (now, uncorrected_offset) = self.now_corrected();
        let elapsed = now
            .duration_since(ref_time)
            .map(|d| d.as_secs_f64())
            .unwrap_or_else(|e| -e.duration().as_secs_f64());
        let our_offset = offset + elapsed * frequency;

        match blender::is_offset_ok(
            our_offset,
            self.config.max_offset,
            &mut self.offset_delay_remaining,
            &mut self.offset_ignore_remaining,
        ) {
            OffsetGateResult::Ok => {}
            OffsetGateResult::RejectEndMode => return self.end_ref_mode(false),
            OffsetGateResult::RejectIgnored => return None,
        }

        self.are_we_synchronised = leap != LeapStatus::Unsynchronised;

        let update_interval = match self.last_ref_update {
            Some(prev) => now.duration_since(prev).map(|d| d.as_secs_f64()).unwrap_or(0.0).max(0.0),
            None => 0.0,
        };
        self.last_ref_update = Some(now);

        let correction_rate =
            blender::correction_rate(self.config.correction_time_ratio, offset_sd, update_interval);

        let should_step = blender::is_step_limit_reached(
            our_offset,
            uncorrected_offset,
            &mut self.step_limit_remaining,
            self.config.make_step_threshold,
        );
        let SplitOffset { accumulate_offset, step_offset } =
            blender::split_offset(our_offset, uncorrected_offset, should_step);

        let prior_skew = self.synced.as_ref().map(|s| s.skew).unwrap_or(self.seed_skew);
        // Mirrors `reference.c`: the weight given to the *previous* skew is
        // gated on this call's announced leap status, not on whether an
        // earlier call ever succeeded (a manual/unsynchronised reference
        // always has zero old weight, any other source always has some).
        let had_prior_weight = leap != LeapStatus::Unsynchronised;

        let outcome = blender::blend(&BlendInput {
            prior_skew,
            was_synchronised: had_prior_weight,
            new_skew: skew,
            new_freq: frequency,
            max_update_skew: self.max_update_skew,
            leap,
        });

        let (our_skew, residual_freq) = match outcome {
            BlendOutcome::Blended { our_frequency, our_skew, residual_freq } => {
                let _ = self.clock.accumulate_frequency_and_offset(
                    our_frequency,
                    accumulate_offset,
                    correction_rate,
                );
                (our_skew.max(MIN_SKEW), residual_freq)
            }
            BlendOutcome::OffsetOnly { residual_freq } => {
                debug!("Skew {skew} too large to track, offset={accumulate_offset}");
                let _ = self.clock.accumulate_offset(accumulate_offset, correction_rate);
                (prior_skew, residual_freq)
            }
        };

        let now_unix = now
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        let (leap, leap_sec) = self.leap_resolver.resolve(
            leap,
            now_unix,
            self.config.leap_timezone_name.as_deref(),
            self.tz_probe.as_deref().unwrap_or(&NeverLeap),
        );
        if leap_sec != self.our_leap_sec {
            let _ = self.clock.set_leap(leap_sec);
            self.our_leap_sec = leap_sec;
        }
        self.our_leap_status = leap;

        self.log_change(our_offset);
        self.mail_change(our_offset, now_unix);

        if step_offset != 0.0 {
            let _ = self.clock.apply_step_offset(step_offset);
            warn!("System clock was stepped by {:.6} seconds", -step_offset);
        }

        let abs_freq_ppm = self.clock.read_absolute_frequency();
        let reference_label = ref_addr.map(|a| a.to_string()).unwrap_or_else(|| format!("{ref_id:08X}"));
        self.write_tracking_log(
            now_unix,
            &reference_label,
            stratum + 1,
            abs_freq_ppm,
            1.0e6 * our_skew,
            our_offset,
            self.our_leap_status,
            combined_sources,
            offset_sd,
            uncorrected_offset,
        );

        if let Some(path) = self.config.drift_file_path.clone() {
            self.drift_file_age += update_interval;
            if self.drift_file_age < 0.0 || self.drift_file_age > 3600.0 {
                let _ = drift_file::write(std::path::Path::new(&path), abs_freq_ppm, our_skew);
                self.drift_file_age = 0.0;
            }
        }

        if self.fallback.is_enabled() {
            self.fallback.update_on_sync(update_interval, self.last_ref_update_interval, abs_freq_ppm);
            if let Some(id) = self.fb_timeout_id.take() {
                self.scheduler.remove_timeout(id);
            }
        }

        self.last_ref_update_interval = update_interval;
        self.last_offset = our_offset;

        if self.avg2_moving {
            self.avg2_offset += 0.1 * (our_offset * our_offset - self.avg2_offset);
        } else {
            if self.avg2_offset > 0.0 && self.avg2_offset < our_offset * our_offset {
                self.avg2_moving = true;
            }
            self.avg2_offset = our_offset * our_offset;
        }

        self.synced = Some(SyncedState {
            stratum: stratum + 1,
            ref_id,
            ref_addr,
            ref_time,
            root_delay,
            root_dispersion,
            skew: our_skew,
            residual_freq,
        });

        None
    }

    /// `REF_SetManualReference`.
    pub fn set_manual_reference(
        &mut self,
        ref_time: SystemTime,
        offset: f64,
        frequency: f64,
        skew: f64,
    ) -> ModeEndResult {
        self.set_reference(
            0,
            LeapStatus::Unsynchronised,
            1,
            MANUAL_REFERENCE_ID,
            None,
            ref_time,
            offset,
            0.0,
            frequency,
            skew,
            0.0,
            0.0,
        )
    }

    /// `REF_SetUnsynchronised`.
    pub fn set_unsynchronised(&mut self) -> ModeEndResult {
        if self.mode != Mode::Normal {
            return self.dispatch_special_mode(false, 0.0);
        }

        let (now, uncorrected_offset) = self.now_corrected();

        // `schedule_fb_drift`: a no-op if a re-escalation timer is already
        // pending, mirroring `fb_drift_timeout_id != -1` early return.
        if self.fallback.is_enabled() && self.fb_timeout_id.is_none() {
            let downtime = self
                .last_ref_update
                .and_then(|prev| now.duration_since(prev).ok())
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0);
            let (set_freq, arm_timer) = self.fallback.schedule(downtime);
            if let Some(freq) = set_freq {
                let _ = self.clock.set_absolute_frequency(freq);
            }
            if let Some((delay, _freq_at_timeout)) = arm_timer {
                self.fb_timeout_id = Some(
                    self.scheduler
                        .add_timeout(Duration::from_secs_f64(delay.max(0.0)), TimeoutEvent::FallbackDrift),
                );
            }
        }

        let now_unix = now
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        let (leap, leap_sec) = self.leap_resolver.resolve(
            LeapStatus::Unsynchronised,
            0,
            self.config.leap_timezone_name.as_deref(),
            self.tz_probe.as_deref().unwrap_or(&NeverLeap),
        );
        if leap_sec != self.our_leap_sec {
            let _ = self.clock.set_leap(leap_sec);
            self.our_leap_sec = leap_sec;
        }
        self.our_leap_status = leap;
        self.are_we_synchronised = false;

        let abs_freq_ppm = self.clock.read_absolute_frequency();
        let skew_ppm = self.synced.as_ref().map(|s| 1.0e6 * s.skew).unwrap_or(1.0e6);
        self.write_tracking_log(
            now_unix,
            "0.0.0.0",
            0,
            abs_freq_ppm,
            skew_ppm,
            0.0,
            self.our_leap_status,
            0,
            0.0,
            uncorrected_offset,
        );

        None
    }

    /// Called by the host when a scheduled `TimeoutEvent::FallbackDrift`
    /// fires, re-entering fallback escalation (`fb_drift_timeout`).
    pub fn on_fallback_timeout(&mut self) {
        self.fb_timeout_id = None;
        if let Some(drift) = self.fallback.freq_at_next_fb_drift() {
            let _ = self.clock.set_absolute_frequency(drift);
        }
        self.set_unsynchronised();
    }

    /// Called by the host whenever its `LocalClock` implementation performs
    /// a slew, in place of the closure-based `LCL_AddParameterChangeHandler`
    /// observer (SPEC_FULL.md §5).
    pub fn on_clock_slew(&mut self, _delta_seconds: f64) {
        // The reference core currently has no state that depends on being
        // notified of slews directly; `get_offset_correction` is read fresh
        // on every call instead. Kept as an explicit hook for a host that
        // wants to log slew events alongside tracking updates.
    }

    fn dispatch_special_mode(&mut self, valid: bool, offset: f64) -> ModeEndResult {
        if self.mode == Mode::InitStepSlew && !valid {
            warn!("No suitable source for initstepslew");
        }
        let outcome = crate::mode::special_mode_sync(self.mode, valid, offset, self.config.init_step_threshold);
        match outcome.action {
            ModeAction::Step(off) => {
                let _ = self.clock.apply_step_offset(off);
            }
            ModeAction::AccumulateOffset(off) => {
                let _ = self.clock.accumulate_offset(off, 0.0);
            }
            ModeAction::None => {}
        }
        self.mode = outcome.new_mode;
        outcome.end_result
    }

    /// `REF_GetReferenceParams`.
    pub fn get_reference_params(&self, local_time: SystemTime) -> ReferenceParams {
        if self.are_we_synchronised {
            let synced = self.synced.as_ref().expect("synchronised without synced state");
            let elapsed = local_time
                .duration_since(synced.ref_time)
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0);
            let extra_dispersion =
                (synced.skew + synced.residual_freq.abs() + self.clock.get_max_clock_error()) * elapsed;
            ReferenceParams {
                is_synchronised: true,
                leap_status: self.our_leap_status,
                stratum: synced.stratum,
                ref_id: synced.ref_id,
                ref_time: synced.ref_time,
                root_delay: synced.root_delay,
                root_dispersion: synced.root_dispersion + extra_dispersion,
            }
        } else if self.enable_local_stratum {
            ReferenceParams {
                is_synchronised: true,
                leap_status: LeapStatus::Normal,
                stratum: self.local_stratum,
                ref_id: LOCAL_REFERENCE_ID,
                ref_time: local_time - Duration::from_secs(1),
                root_delay: 0.0,
                root_dispersion: self.clock.get_sys_precision_as_quantum(),
            }
        } else {
            ReferenceParams {
                is_synchronised: false,
                leap_status: LeapStatus::Unsynchronised,
                stratum: 0,
                ref_id: 0,
                ref_time: SystemTime::UNIX_EPOCH,
                root_delay: 1.0,
                root_dispersion: 1.0,
            }
        }
    }

    /// `REF_GetOurStratum`.
    pub fn get_our_stratum(&self) -> u16 {
        if self.are_we_synchronised {
            self.synced.as_ref().map(|s| s.stratum).unwrap_or(UNSYNCHRONISED_STRATUM)
        } else if self.enable_local_stratum {
            self.local_stratum
        } else {
            UNSYNCHRONISED_STRATUM
        }
    }

    /// `REF_ModifyMaxupdateskew`.
    pub fn modify_max_update_skew(&mut self, new_max_update_skew_ppm: f64) {
        self.max_update_skew = new_max_update_skew_ppm.abs() * 1.0e-6;
    }

    /// `REF_EnableLocal`.
    pub fn enable_local(&mut self, stratum: u16) {
        self.enable_local_stratum = true;
        self.local_stratum = stratum;
    }

    /// `REF_DisableLocal`.
    pub fn disable_local(&mut self) {
        self.enable_local_stratum = false;
    }

    /// `REF_IsLocalActive`.
    pub fn is_local_active(&self) -> bool {
        !self.are_we_synchronised && self.enable_local_stratum
    }

    /// `REF_GetTrackingReport`.
    pub fn get_tracking_report(&self) -> TrackingReport {
        let raw = self.clock.read_raw_time();
        let correction = self.clock.get_offset_correction(raw);
        let freq_ppm = self.clock.read_absolute_frequency();
        let rms_offset = self.avg2_offset.max(0.0).sqrt();

        if let Some(synced) = &self.synced {
            if self.are_we_synchronised {
                let now_cooked = raw + Duration::from_secs_f64(correction.max(0.0));
                let elapsed = now_cooked
                    .duration_since(synced.ref_time)
                    .map(|d| d.as_secs_f64())
                    .unwrap_or(0.0);
                let extra_dispersion =
                    (synced.skew + synced.residual_freq.abs() + self.clock.get_max_clock_error()) * elapsed;
                return TrackingReport {
                    reference_id: synced.ref_id,
                    stratum: synced.stratum,
                    leap: self.our_leap_status,
                    ref_time: synced.ref_time,
                    current_correction: correction,
                    last_offset: self.last_offset,
                    rms_offset,
                    frequency_ppm: freq_ppm,
                    skew_ppm: 1.0e6 * synced.skew,
                    root_delay: synced.root_delay,
                    root_dispersion: synced.root_dispersion + extra_dispersion,
                };
            }
        }

        if self.enable_local_stratum {
            TrackingReport {
                reference_id: LOCAL_REFERENCE_ID,
                stratum: self.local_stratum,
                leap: self.our_leap_status,
                ref_time: raw,
                current_correction: correction,
                last_offset: self.last_offset,
                rms_offset,
                frequency_ppm: freq_ppm,
                skew_ppm: 0.0,
                root_delay: 0.0,
                root_dispersion: self.clock.get_sys_precision_as_quantum(),
            }
        } else {
            TrackingReport {
                reference_id: 0,
                stratum: 0,
                leap: self.our_leap_status,
                ref_time: SystemTime::UNIX_EPOCH,
                current_correction: correction,
                last_offset: self.last_offset,
                rms_offset,
                frequency_ppm: freq_ppm,
                skew_ppm: 0.0,
                root_delay: 0.0,
                root_dispersion: 0.0,
            }
        }
    }
}

/// Parameters reported to dependent protocol modules (spec.md §3
/// `REF_GetReferenceParams`'s output).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceParams {
    pub is_synchronised: bool,
    pub leap_status: LeapStatus,
    pub stratum: u16,
    pub ref_id: u32,
    pub ref_time: SystemTime,
    pub root_delay: f64,
    pub root_dispersion: f64,
}

/// A `TzProbe` that never reports a leap second, used when no probe is
/// installed so `LeapResolver::resolve` always has a collaborator to call.
struct NeverLeap;
impl TzProbe for NeverLeap {
    fn probe(&self, _when_unix: i64, _tzname: &str) -> LeapStatus {
        LeapStatus::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NullNotifier;
    use crate::scheduler::ManualScheduler;
    use crate::traits::MockLocalClock;

    fn stub_log_sink() -> crate::log_sink::FileLogSink {
        crate::log_sink::FileLogSink::new(std::env::temp_dir())
    }

    fn base_clock() -> MockLocalClock {
        let mut clock = MockLocalClock::new();
        clock.expect_read_raw_time().returning(SystemTime::now);
        clock.expect_get_offset_correction().returning(|_| 0.0);
        clock.expect_read_absolute_frequency().returning(|| 0.0);
        clock.expect_set_absolute_frequency().returning(|_| Ok(()));
        clock
            .expect_accumulate_frequency_and_offset()
            .returning(|_, _, _| Ok(()));
        clock.expect_accumulate_offset().returning(|_, _| Ok(()));
        clock.expect_apply_step_offset().returning(|_| Ok(()));
        clock.expect_set_leap().returning(|_| Ok(()));
        clock.expect_get_max_clock_error().returning(|| 1.0e-6);
        clock.expect_get_sys_precision_as_quantum().returning(|| 1.0e-9);
        clock
    }

    fn tracker(
        config: ReferenceConfig,
    ) -> ReferenceTracker<MockLocalClock, ManualScheduler, crate::log_sink::FileLogSink, NullNotifier> {
        let mut t = ReferenceTracker::new(config, base_clock(), ManualScheduler::new(), stub_log_sink(), NullNotifier::new());
        t.initialise();
        t
    }

    #[test]
    fn cold_start_is_unsynchronised_and_stratum_sixteen() {
        let t = tracker(ReferenceConfig::default());
        assert!(!t.are_we_synchronised);
        assert_eq!(t.get_our_stratum(), UNSYNCHRONISED_STRATUM);
        assert!(!t.is_local_active());
    }

    #[test]
    fn first_successful_sync_marks_synchronised() {
        let mut t = tracker(ReferenceConfig::default());
        let now = SystemTime::now();
        let result = t.set_reference(1, LeapStatus::Normal, 1, 0x11223344, None, now, 0.001, 0.0005, 1e-7, 1e-7, 0.01, 0.01);
        assert_eq!(result, None);
        assert!(t.are_we_synchronised);
        assert_eq!(t.get_our_stratum(), 2);
    }

    #[test]
    fn bogus_skew_is_rejected_without_state_change() {
        let mut t = tracker(ReferenceConfig::default());
        let now = SystemTime::now();
        t.set_reference(1, LeapStatus::Normal, 1, 1, None, now, 0.0, 0.0, 0.0, f64::NAN, 0.0, 0.0);
        assert!(!t.are_we_synchronised);
    }

    #[test]
    fn oversized_offset_ends_mode_when_no_ignore_budget() {
        let mut config = ReferenceConfig::default();
        config.max_offset = 0.01;
        config.max_offset_ignore = 0;
        let mut t = tracker(config);
        let now = SystemTime::now();
        let result = t.set_reference(1, LeapStatus::Normal, 1, 1, None, now, 10.0, 0.0, 1e-7, 1e-7, 0.0, 0.0);
        assert_eq!(result, Some(false));
        assert_eq!(t.mode(), Mode::Ignore);
    }

    #[test]
    fn init_step_slew_steps_once_then_ignores() {
        let mut t = tracker(ReferenceConfig::default());
        t.set_mode(Mode::InitStepSlew);
        let now = SystemTime::now();
        let result = t.set_reference(1, LeapStatus::Normal, 1, 1, None, now, 5.0, 0.0, 0.0, 1e-7, 0.0, 0.0);
        assert_eq!(result, Some(true));
        assert_eq!(t.mode(), Mode::Ignore);
    }

    #[test]
    fn enable_local_reports_local_stratum_when_unsynced() {
        let mut t = tracker(ReferenceConfig::default());
        t.enable_local(8);
        assert!(t.is_local_active());
        assert_eq!(t.get_our_stratum(), 8);
    }

    #[test]
    fn manual_reference_uses_manual_refid() {
        let mut t = tracker(ReferenceConfig::default());
        let now = SystemTime::now();
        t.set_manual_reference(now, 0.0, 0.0, 1e-7);
        // reference.c:834 gates `are_we_synchronised` on the announced leap
        // status, and REF_SetManualReference always announces
        // LEAP_Unsynchronised - manual mode never claims synchronisation.
        assert!(!t.are_we_synchronised);
        assert_eq!(t.synced.as_ref().unwrap().ref_id, MANUAL_REFERENCE_ID);
    }
}
