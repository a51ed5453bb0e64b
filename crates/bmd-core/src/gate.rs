//! Pre-flight resource gate: destination creation and free-space check.
//!
//! The capacity check runs once per job, strictly before any transfer. It is
//! advisory and point-in-time: concurrent jobs can still collectively exceed
//! free space between checks.

use std::path::{Path, PathBuf};
use thiserror::Error;

const BYTES_PER_GB: u64 = 1 << 30;

#[derive(Debug, Error)]
pub enum GateError {
    #[error(
        "insufficient storage at {}: {available_gb:.2} GB free, {required_gb} GB required",
        .path.display()
    )]
    InsufficientStorage {
        path: PathBuf,
        available_gb: f64,
        required_gb: u64,
    },

    #[error("cannot create directory {}: {source}", .path.display())]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Create `path` (and parents) if missing. Tolerates pre-existing directories.
pub fn ensure_dir(path: &Path) -> Result<(), GateError> {
    std::fs::create_dir_all(path).map_err(|source| GateError::PermissionDenied {
        path: path.to_path_buf(),
        source,
    })
}

/// Fail with `InsufficientStorage` when the filesystem containing `path` has
/// less than `min_gb` GB available. `min_gb == 0` disables the check.
/// A failed probe is logged and passes the gate; the check is advisory.
pub fn check_capacity(path: &Path, min_gb: u64) -> Result<(), GateError> {
    if min_gb == 0 {
        return Ok(());
    }
    let available = match available_bytes(path) {
        Ok(n) => n,
        Err(e) => {
            tracing::warn!(path = %path.display(), "free-space probe failed: {}", e);
            return Ok(());
        }
    };
    let required = min_gb.saturating_mul(BYTES_PER_GB);
    if available < required {
        return Err(GateError::InsufficientStorage {
            path: path.to_path_buf(),
            available_gb: available as f64 / BYTES_PER_GB as f64,
            required_gb: min_gb,
        });
    }
    Ok(())
}

#[cfg(unix)]
fn available_bytes(path: &Path) -> std::io::Result<u64> {
    use std::os::unix::ffi::OsStrExt;

    let cpath = std::ffi::CString::new(path.as_os_str().as_bytes())
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "path contains NUL"))?;
    let mut stats: libc::statvfs = unsafe { std::mem::zeroed() };
    let r = unsafe { libc::statvfs(cpath.as_ptr(), &mut stats) };
    if r != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(stats.f_bavail as u64 * stats.f_frsize as u64)
}

/// No reliable probe on non-Unix targets; the gate passes.
#[cfg(not(unix))]
fn available_bytes(_path: &Path) -> std::io::Result<u64> {
    Ok(u64::MAX)
}
