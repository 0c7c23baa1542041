//! Frequency/skew blender and step/slew offset gating (spec.md §4.2, §4.3).
//!
//! Pure, clock-agnostic helpers — `reference.rs` owns the mutable state and
//! dispatches the results to the `LocalClock` collaborator, mirroring how
//! `servo.rs`'s `PiServo` is a self-contained numeric core driven by
//! `controller.rs`.

use crate::types::LeapStatus;
use log::warn;

/// Checks the NaN/Inf guard from spec.md §4.2 step 2: `(skew + skew) / skew`
/// must land in `[1.9, 2.1]`. Kept as the literal arithmetic trick rather
/// than `f64::is_finite`/`is_nan`, per the Design Notes' instruction to
/// preserve this behavior bit-for-bit pending a future rewrite.
pub fn is_skew_sane(skew: f64) -> bool {
    let t = (skew + skew) / skew;
    (1.9..=2.1).contains(&t)
}

/// Result of blending a new measurement's frequency/skew with prior state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BlendOutcome {
    /// The measurement's skew was trustworthy: both a frequency delta and
    /// an offset should be accumulated into the clock.
    Blended {
        our_frequency: f64,
        our_skew: f64,
        residual_freq: f64,
    },
    /// The skew was too large to track: only the offset should be
    /// accumulated, and `our_skew`/`our_frequency` are left untouched.
    ///
    /// `residual_freq` here is set to the *raw* measured frequency, not
    /// `frequency - our_frequency` — preserved exactly per spec.md §9's
    /// open question, since `our_frequency` itself is not recomputed on
    /// this branch.
    OffsetOnly { residual_freq: f64 },
}

/// Inputs to the blender (spec.md §4.2).
#[derive(Debug, Clone, Copy)]
pub struct BlendInput {
    /// `our_skew` prior to this update; only meaningful if `was_synchronised`.
    pub prior_skew: f64,
    pub was_synchronised: bool,
    /// The measurement's skew (already sanity-checked and MIN_SKEW-clamped).
    pub new_skew: f64,
    /// The measurement's frequency, fractional seconds/second.
    pub new_freq: f64,
    pub max_update_skew: f64,
    pub leap: LeapStatus,
}

/// Blend a new measurement into prior state (spec.md §4.2 steps 3-4).
pub fn blend(input: &BlendInput) -> BlendOutcome {
    let skew_trusted = input.new_skew.abs() < input.max_update_skew
        || input.leap == LeapStatus::Unsynchronised;

    if !skew_trusted {
        return BlendOutcome::OffsetOnly { residual_freq: input.new_freq };
    }

    // The "previous frequency" is always treated as 0: absolute frequencies
    // live in the local clock module, this blender only ever tracks deltas.
    let previous_freq = 0.0f64;

    let old_weight = if input.was_synchronised {
        1.0 / (input.prior_skew * input.prior_skew)
    } else {
        0.0
    };
    let new_weight = 3.0 / (input.new_skew * input.new_skew);
    let sum_weight = old_weight + new_weight;

    let our_frequency = (previous_freq * old_weight + input.new_freq * new_weight) / sum_weight;

    let delta_freq1 = previous_freq - our_frequency;
    let delta_freq2 = input.new_freq - our_frequency;

    let skew1 = ((delta_freq1 * delta_freq1 * old_weight + delta_freq2 * delta_freq2 * new_weight)
        / sum_weight)
        .sqrt();
    let skew2 = (input.prior_skew * old_weight + input.new_skew * new_weight) / sum_weight;
    let our_skew = skew1 + skew2;

    let residual_freq = input.new_freq - our_frequency;

    BlendOutcome::Blended { our_frequency, our_skew, residual_freq }
}

/// Correction rate pacing (spec.md §4.2 "Correction rate").
pub fn correction_rate(correction_time_ratio: f64, offset_sd: f64, update_interval: f64) -> f64 {
    correction_time_ratio * 0.5 * offset_sd * update_interval
}

/// Outcome of the offset warm-up/ceiling gate (spec.md §4.3 `is_offset_ok`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetGateResult {
    /// Accept the update.
    Ok,
    /// Reject and end the reference mode (no ignore budget left).
    RejectEndMode,
    /// Reject but keep running (ignore budget consumed or unlimited).
    RejectIgnored,
}

/// `is_offset_ok` (spec.md §4.3). `offset_delay_remaining` and
/// `offset_ignore_remaining` are live countdown counters seeded from
/// config at `initialise`; negative means "disabled"/"unlimited".
pub fn is_offset_ok(
    offset: f64,
    max_offset: f64,
    offset_delay_remaining: &mut i32,
    offset_ignore_remaining: &mut i32,
) -> OffsetGateResult {
    if *offset_delay_remaining < 0 {
        return OffsetGateResult::Ok;
    }
    if *offset_delay_remaining > 0 {
        *offset_delay_remaining -= 1;
        return OffsetGateResult::Ok;
    }

    let abs_offset = offset.abs();
    if abs_offset > max_offset {
        let will_exit = *offset_ignore_remaining == 0;
        warn!(
            "Adjustment of {:.3} seconds exceeds the allowed maximum of {:.3} seconds ({})",
            -offset,
            max_offset,
            if will_exit { "exiting" } else { "ignored" }
        );
        if will_exit {
            return OffsetGateResult::RejectEndMode;
        }
        if *offset_ignore_remaining > 0 {
            *offset_ignore_remaining -= 1;
        }
        return OffsetGateResult::RejectIgnored;
    }
    OffsetGateResult::Ok
}

/// `is_step_limit_reached` (spec.md §4.3). `step_limit_remaining` is a live
/// countdown counter seeded from config; negative means "unlimited budget".
pub fn is_step_limit_reached(
    offset: f64,
    uncorrected_offset: f64,
    step_limit_remaining: &mut i32,
    make_step_threshold: f64,
) -> bool {
    if *step_limit_remaining == 0 {
        return false;
    }
    if *step_limit_remaining > 0 {
        *step_limit_remaining -= 1;
    }
    (offset - uncorrected_offset).abs() > make_step_threshold
}

/// Split an accepted offset into the part to accumulate into the slew and
/// the part to apply as an instantaneous step (spec.md §4.3, last paragraph).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitOffset {
    pub accumulate_offset: f64,
    pub step_offset: f64,
}

pub fn split_offset(our_offset: f64, uncorrected_offset: f64, should_step: bool) -> SplitOffset {
    if should_step {
        SplitOffset {
            accumulate_offset: uncorrected_offset,
            step_offset: our_offset - uncorrected_offset,
        }
    } else {
        SplitOffset { accumulate_offset: our_offset, step_offset: 0.0 }
    }
}
