//! Real [`crate::traits::LocalClock`] adapter over the kernel's software
//! clock discipline, grounded in the teacher's `clock/linux.rs`
//! (`adjtimex`/`ADJ_FREQUENCY`/`settimeofday` usage and its `Drop`-restores-
//! original-frequency pattern).

#![cfg(unix)]

use crate::traits::LocalClock;
use anyhow::{anyhow, Result};
use libc::{adjtimex, settimeofday, timeval, timex};
use std::mem;
use std::time::SystemTime;

/// A conservative worst-case clock error bound (fractional s/s) used when
/// the platform offers no better estimate. chrony's `sys_linux` driver
/// measures this empirically at startup; we settle for a fixed, generous
/// figure rather than reproduce that probing here.
const DEFAULT_MAX_CLOCK_ERROR: f64 = 1.0e-6;

/// Dispersion quantum corresponding to a nanosecond-resolution clock read.
const DEFAULT_PRECISION_QUANTUM: f64 = 1.0e-9;

pub struct AdjtimexClock {
    original_freq: i64,
}

impl AdjtimexClock {
    pub fn new() -> Result<Self> {
        let mut tx: timex = unsafe { mem::zeroed() };
        let ret = unsafe { adjtimex(&mut tx) };
        if ret < 0 {
            return Err(anyhow!("adjtimex query failed (are you root?)"));
        }
        Ok(AdjtimexClock { original_freq: tx.freq })
    }

    fn query(&self) -> Result<timex> {
        let mut tx: timex = unsafe { mem::zeroed() };
        let ret = unsafe { adjtimex(&mut tx) };
        if ret < 0 {
            return Err(anyhow!("adjtimex query failed"));
        }
        Ok(tx)
    }

    fn set_frequency_ppm(&mut self, freq_ppm: f64) -> Result<()> {
        let mut tx: timex = unsafe { mem::zeroed() };
        tx.modes = libc::ADJ_FREQUENCY;
        tx.freq = (freq_ppm * 65536.0).round() as i64;
        let ret = unsafe { adjtimex(&mut tx) };
        if ret < 0 {
            return Err(anyhow!("adjtimex failed to set frequency"));
        }
        Ok(())
    }

    fn slew_offset_usec(&mut self, offset_usec: i64) -> Result<()> {
        let mut tx: timex = unsafe { mem::zeroed() };
        tx.modes = libc::ADJ_OFFSET | libc::ADJ_STATUS;
        tx.status = libc::STA_PLL;
        tx.offset = offset_usec;
        let ret = unsafe { adjtimex(&mut tx) };
        if ret < 0 {
            return Err(anyhow!("adjtimex failed to slew offset"));
        }
        Ok(())
    }
}

impl LocalClock for AdjtimexClock {
    fn read_raw_time(&self) -> SystemTime {
        SystemTime::now()
    }

    fn get_offset_correction(&self, _raw: SystemTime) -> f64 {
        match self.query() {
            Ok(tx) => tx.offset as f64 / 1.0e6,
            Err(_) => 0.0,
        }
    }

    fn read_absolute_frequency(&self) -> f64 {
        self.query().map(|tx| tx.freq as f64 / 65536.0).unwrap_or(0.0)
    }

    fn set_absolute_frequency(&mut self, freq_ppm: f64) -> Result<()> {
        self.set_frequency_ppm(freq_ppm)
    }

    fn accumulate_frequency_and_offset(
        &mut self,
        freq_delta: f64,
        offset: f64,
        _correction_rate: f64,
    ) -> Result<()> {
        let current_ppm = self.read_absolute_frequency();
        self.set_frequency_ppm(current_ppm + freq_delta * 1.0e6)?;
        self.slew_offset_usec((offset * 1.0e6).round() as i64)
    }

    fn accumulate_offset(&mut self, offset: f64, _correction_rate: f64) -> Result<()> {
        self.slew_offset_usec((offset * 1.0e6).round() as i64)
    }

    fn apply_step_offset(&mut self, offset: f64) -> Result<()> {
        let mut tv: timeval = unsafe { mem::zeroed() };
        let ret = unsafe { libc::gettimeofday(&mut tv, std::ptr::null_mut()) };
        if ret < 0 {
            return Err(anyhow!("gettimeofday failed"));
        }

        let whole_secs = offset.trunc() as i64;
        let frac_usecs = ((offset - offset.trunc()) * 1.0e6).round() as i64;

        tv.tv_sec += whole_secs;
        tv.tv_usec += frac_usecs;
        normalize_timeval(&mut tv.tv_sec, &mut tv.tv_usec);

        let ret = unsafe { settimeofday(&tv, std::ptr::null()) };
        if ret < 0 {
            return Err(anyhow!(
                "settimeofday failed: {}",
                std::io::Error::last_os_error()
            ));
        }
        Ok(())
    }

    fn set_leap(&mut self, leap_sec: i32) -> Result<()> {
        let mut tx: timex = unsafe { mem::zeroed() };
        tx.modes = libc::ADJ_STATUS;
        tx.status = match leap_sec {
            1 => libc::STA_INS,
            -1 => libc::STA_DEL,
            _ => 0,
        };
        let ret = unsafe { adjtimex(&mut tx) };
        if ret < 0 {
            return Err(anyhow!("adjtimex failed to set leap status"));
        }
        Ok(())
    }

    fn get_max_clock_error(&self) -> f64 {
        DEFAULT_MAX_CLOCK_ERROR
    }

    fn get_sys_precision_as_quantum(&self) -> f64 {
        DEFAULT_PRECISION_QUANTUM
    }
}

impl Drop for AdjtimexClock {
    fn drop(&mut self) {
        let mut tx: timex = unsafe { mem::zeroed() };
        tx.modes = libc::ADJ_FREQUENCY;
        tx.freq = self.original_freq;
        unsafe {
            adjtimex(&mut tx);
        }
    }
}

/// Kept separate from the `libc` calls so this arithmetic can be
/// unit-tested without root privileges.
fn normalize_timeval(sec: &mut i64, usec: &mut i64) {
    while *usec >= 1_000_000 {
        *sec += 1;
        *usec -= 1_000_000;
    }
    while *usec < 0 {
        *sec -= 1;
        *usec += 1_000_000;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ppm_to_freq_val_matches_kernel_fixed_point() {
        let freq_val = |ppm: f64| (ppm * 65536.0).round() as i64;
        assert_eq!(freq_val(0.0), 0);
        assert_eq!(freq_val(100.0), 6_553_600);
        assert_eq!(freq_val(-100.0), -6_553_600);
    }

    #[test]
    fn timeval_normalization_handles_overflow_and_underflow() {
        let (mut sec, mut usec) = (10, 1_500_000);
        normalize_timeval(&mut sec, &mut usec);
        assert_eq!((sec, usec), (11, 500_000));

        let (mut sec, mut usec) = (10, -500_000);
        normalize_timeval(&mut sec, &mut usec);
        assert_eq!((sec, usec), (9, 500_000));
    }
}
