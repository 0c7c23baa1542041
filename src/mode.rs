//! Mode state machine (spec.md §4.7).
//!
//! Kept clock-agnostic and pure, the way the teacher's `servo.rs` isolates
//! `PiServo` from the network/clock plumbing in `controller.rs` — this
//! module decides *what* to do, `reference.rs` dispatches the result to the
//! `LocalClock` collaborator.

/// Operating mode (spec.md §3, §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Continuous tracking — the ordinary case.
    Normal,
    /// One-shot: step if `|offset| >= init_step_threshold`, else slew.
    InitStepSlew,
    /// One-shot: always step.
    UpdateOnce,
    /// One-shot: observe only, never adjust the clock.
    PrintOnce,
    /// Absorb updates but never adjust anything, until the mode is changed.
    Ignore,
}

/// What `reference.rs` must do to the local clock as a result of a
/// `special_mode_sync` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModeAction {
    /// Apply an instantaneous step of this many seconds.
    Step(f64),
    /// Accumulate this offset into the slew (used by `InitStepSlew` when it
    /// decides to slew rather than step; correction rate is always zero
    /// here, matching `reference.c`'s `LCL_AccumulateOffset(offset, 0.0)`).
    AccumulateOffset(f64),
    /// No clock adjustment.
    None,
}

/// Outcome of a one-shot-mode dispatch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeOutcome {
    pub action: ModeAction,
    pub new_mode: Mode,
    /// `Some(success)` if the mode ended as a result of this call, invoking
    /// the installed `ModeEndHandler`.
    pub end_result: Option<bool>,
}

/// Dispatch a `SetReference`/`SetUnsynchronised` call while `mode != Normal`
/// (spec.md §4.7 `special_mode_sync`).
///
/// `valid` is `true` for a `SetReference` call (a usable measurement was
/// supplied) and `false` for `SetUnsynchronised` (no usable source).
pub fn special_mode_sync(mode: Mode, valid: bool, offset: f64, init_step_threshold: f64) -> ModeOutcome {
    match mode {
        Mode::InitStepSlew => {
            if !valid {
                return ModeOutcome { action: ModeAction::None, new_mode: Mode::Ignore, end_result: Some(false) };
            }
            let step = offset.abs() >= init_step_threshold;
            let action = if step {
                ModeAction::Step(offset)
            } else {
                ModeAction::AccumulateOffset(offset)
            };
            ModeOutcome { action, new_mode: Mode::Ignore, end_result: Some(true) }
        }
        Mode::UpdateOnce | Mode::PrintOnce => {
            if !valid {
                return ModeOutcome { action: ModeAction::None, new_mode: Mode::Ignore, end_result: Some(false) };
            }
            let step = mode == Mode::UpdateOnce;
            let action = if step { ModeAction::Step(offset) } else { ModeAction::None };
            ModeOutcome { action, new_mode: Mode::Ignore, end_result: Some(true) }
        }
        Mode::Ignore => ModeOutcome { action: ModeAction::None, new_mode: Mode::Ignore, end_result: None },
        Mode::Normal => unreachable!("special_mode_sync is only called when mode != Normal"),
    }
}
