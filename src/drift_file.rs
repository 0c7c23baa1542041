//! Drift file persistence (spec.md §4.6).
//!
//! On-disk format is two whitespace-separated numbers — frequency and skew,
//! both in ppm — written atomically via a `.tmp` + `rename(2)` dance so a
//! reader never observes a half-written file, the same approach
//! `reference.c`'s `update_drift_file` takes.

use crate::types::MIN_SKEW;
use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Frequency (ppm) and skew (fractional s/s) parsed from a drift file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriftFileContents {
    pub frequency_ppm: f64,
    pub skew: f64,
}

/// Read and parse a drift file, if present. Matches `REF_Initialise`'s
/// tolerant behavior: a missing file is not an error, but a malformed one is
/// reported so the caller can log a warning and fall back to defaults.
pub fn read(path: &Path) -> Result<Option<DriftFileContents>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err).context("reading drift file"),
    };
    let mut fields = text.split_whitespace();
    let freq_ppm: f64 = fields
        .next()
        .context("drift file missing frequency field")?
        .parse()
        .context("drift file frequency is not a number")?;
    let skew_ppm: f64 = fields
        .next()
        .context("drift file missing skew field")?
        .parse()
        .context("drift file skew is not a number")?;

    let mut skew = 1.0e-6 * skew_ppm;
    if skew < MIN_SKEW {
        skew = MIN_SKEW;
    }
    Ok(Some(DriftFileContents { frequency_ppm: freq_ppm, skew }))
}

/// Atomically rewrite the drift file with a new frequency/skew pair.
/// Best-effort clones the previous file's ownership and permission bits;
/// failures there are non-fatal (logged by the caller).
pub fn write(path: &Path, frequency_ppm: f64, skew: f64) -> Result<()> {
    let tmp_path = {
        let mut s = path.as_os_str().to_owned();
        s.push(".tmp");
        std::path::PathBuf::from(s)
    };

    let body = format!("{:20.6} {:20.6}\n", frequency_ppm, 1.0e6 * skew);
    let write_result = (|| -> Result<()> {
        let mut file = fs::File::create(&tmp_path).context("opening temporary drift file")?;
        file.write_all(body.as_bytes()).context("writing temporary drift file")?;
        Ok(())
    })();

    if write_result.is_err() {
        let _ = fs::remove_file(&tmp_path);
        return write_result;
    }

    clone_attributes_best_effort(path, &tmp_path);

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err).context("replacing drift file");
    }
    Ok(())
}

#[cfg(unix)]
fn clone_attributes_best_effort(existing: &Path, tmp: &Path) {
    use std::os::unix::fs::{MetadataExt, PermissionsExt};
    if let Ok(meta) = fs::metadata(existing) {
        let perms = fs::Permissions::from_mode(meta.mode() & 0o777);
        let _ = fs::set_permissions(tmp, perms);
        if let Some(tmp_str) = tmp.to_str() {
            if let Ok(c_path) = std::ffi::CString::new(tmp_str) {
                unsafe {
                    libc::chown(c_path.as_ptr(), meta.uid(), meta.gid());
                }
            }
        }
    }
}

#[cfg(not(unix))]
fn clone_attributes_best_effort(_existing: &Path, _tmp: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_returns_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("drift");
        assert_eq!(read(&path).unwrap(), None);
    }

    #[test]
    fn round_trip_write_then_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("drift");
        write(&path, 12.5, 3.0e-7).unwrap();
        let contents = read(&path).unwrap().unwrap();
        assert!((contents.frequency_ppm - 12.5).abs() < 1e-6);
        assert!((contents.skew - 3.0e-7).abs() < 1e-12);
    }

    #[test]
    fn skew_floor_applied_on_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("drift");
        fs::write(&path, "1.0 0.0\n").unwrap();
        let contents = read(&path).unwrap().unwrap();
        assert_eq!(contents.skew, MIN_SKEW);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("drift");
        fs::write(&path, "not-a-number\n").unwrap();
        assert!(read(&path).is_err());
    }

    #[test]
    fn write_leaves_no_tmp_file_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("drift");
        write(&path, 1.0, 1e-7).unwrap();
        assert!(!dir.path().join("drift.tmp").exists());
        assert!(path.exists());
    }
}
