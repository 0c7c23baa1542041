//! Shared primitive types for the reference tracking core (spec.md §3, §6).

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Reference id supplied when the local (free-running) reference is active
/// (spec.md §6 sentinels).
pub const LOCAL_REFERENCE_ID: u32 = 0x7F7F_0101;

/// Reference id used by [`crate::reference::ReferenceTracker::set_manual_reference`]
/// ('MANU' in ASCII).
pub const MANUAL_REFERENCE_ID: u32 = 0x4D41_4E55;

/// Stratum reported while neither synchronised nor local-stratum-enabled.
pub const UNSYNCHRONISED_STRATUM: u16 = 16;

/// Floor below which `skew` is never allowed to drop (spec.md §3).
pub const MIN_SKEW: f64 = 1.0e-12;

/// Announced leap status (spec.md §3, §6 leap code mapping).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LeapStatus {
    #[default]
    Normal,
    InsertSecond,
    DeleteSecond,
    Unsynchronised,
}

impl LeapStatus {
    /// Single-character code used in the tracking log line (spec.md §6).
    pub fn code(self) -> char {
        match self {
            LeapStatus::Normal => 'N',
            LeapStatus::InsertSecond => '+',
            LeapStatus::DeleteSecond => '-',
            LeapStatus::Unsynchronised => '?',
        }
    }

    /// The signed pending-leap value this status implies once accepted for
    /// today (0 if not a leap day or not a leap status).
    pub fn pending_leap_value(self) -> i32 {
        match self {
            LeapStatus::InsertSecond => 1,
            LeapStatus::DeleteSecond => -1,
            LeapStatus::Normal | LeapStatus::Unsynchronised => 0,
        }
    }
}

/// The address of a reference source, if known (spec.md §3 `ref_ip`).
pub type RefAddr = Option<IpAddr>;
