//! The exclusive run lease.
//!
//! Single-flight execution is enforced with an OS advisory lock on a `LOCK`
//! file in the data directory, plus a small `lease.json` describing the
//! holder. The advisory lock is released by the OS when a process dies, so a
//! crashed run can never block future runs; the lease file exists so a
//! contending run can report who is holding the lease and for how long, and
//! flag holders that have outlived the configured timeout.

use crate::error::{StoreError, StoreResult};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

const LOCK_FILE: &str = "LOCK";
const LEASE_FILE: &str = "lease.json";

/// What `lease.json` records about the current holder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseInfo {
    /// Free-form holder label (host, pid, run id).
    pub holder: String,
    /// Process ID of the holder.
    pub pid: u32,
    /// When the lease was acquired, epoch milliseconds.
    pub acquired_at_ms: u64,
}

/// An exclusive lease over one data directory.
///
/// Held for the duration of one synchronization pass; dropping it releases
/// the lock and removes the lease file.
#[derive(Debug)]
pub struct RunLease {
    lease_path: PathBuf,
    // Held for exclusive access; the OS releases it when the file closes.
    _lock_file: File,
}

impl RunLease {
    /// Acquires the lease, or reports the current holder.
    ///
    /// `timeout` only affects reporting: a holder older than the timeout is
    /// flagged as stale in the log, because a live-but-stuck process still
    /// holds the OS lock and cannot be displaced safely.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LeaseHeld`] if another process holds the lease,
    /// or an I/O error if the lock file cannot be created.
    pub fn acquire(
        dir: impl AsRef<Path>,
        holder: impl Into<String>,
        timeout: Duration,
    ) -> StoreResult<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let lock_path = dir.join(LOCK_FILE);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        if lock_file.try_lock_exclusive().is_err() {
            let info = read_lease(&dir.join(LEASE_FILE));
            let held_for_ms = info
                .as_ref()
                .map(|i| epoch_ms().saturating_sub(i.acquired_at_ms))
                .unwrap_or(0);
            let holder_label = info
                .map(|i| i.holder)
                .unwrap_or_else(|| "unknown".to_string());
            if held_for_ms > timeout.as_millis() as u64 {
                warn!(
                    holder = %holder_label,
                    held_for_ms,
                    "lease holder has exceeded the lease timeout but is still alive"
                );
            }
            return Err(StoreError::LeaseHeld {
                holder: holder_label,
                held_for_ms,
            });
        }

        // Lock acquired. A leftover lease file means the previous holder
        // died without cleanup; the OS already released its lock.
        let lease_path = dir.join(LEASE_FILE);
        if let Some(stale) = read_lease(&lease_path) {
            warn!(
                previous_holder = %stale.holder,
                "taking over lease from crashed holder"
            );
        }

        let info = LeaseInfo {
            holder: holder.into(),
            pid: std::process::id(),
            acquired_at_ms: epoch_ms(),
        };
        fs::write(&lease_path, serde_json::to_vec_pretty(&info).unwrap_or_default())?;
        debug!(holder = %info.holder, "lease acquired");

        Ok(Self {
            lease_path,
            _lock_file: lock_file,
        })
    }

    /// Reads the lease file of a directory without acquiring anything.
    ///
    /// Used by status reporting; the result is advisory and may be stale by
    /// the time it is read.
    #[must_use]
    pub fn peek(dir: impl AsRef<Path>) -> Option<LeaseInfo> {
        read_lease(&dir.as_ref().join(LEASE_FILE))
    }
}

impl Drop for RunLease {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.lease_path) {
            debug!(error = %e, "could not remove lease file");
        }
        // The advisory lock is released when the file handle closes.
    }
}

fn read_lease(path: &Path) -> Option<LeaseInfo> {
    let bytes = fs::read(path).ok()?;
    serde_json::from_slice(&bytes).ok()
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
