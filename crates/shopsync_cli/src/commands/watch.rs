//! Watch command implementation.

use crate::credentials::Credentials;
use shopsync_engine::EngineError;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info, warn};

/// Runs passes on an interval until the process is stopped.
///
/// Failures are logged and the loop continues; a broken platform should not
/// take the scheduler down with it.
pub fn run(
    data_dir: &Path,
    credentials: &Credentials,
    interval_secs: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let coordinator = super::build_coordinator(data_dir, credentials, false)?;
    let interval = Duration::from_secs(interval_secs.max(1));
    info!(interval_secs = interval.as_secs(), "watch loop started");

    loop {
        match coordinator.run_once() {
            Ok(summary) => {
                info!(
                    run_id = %summary.run_id,
                    applied = summary.changes_applied,
                    deferred = summary.conflicts_deferred,
                    failures = summary.failures,
                    "pass completed"
                );
            }
            Err(EngineError::LeaseContention { holder, .. }) => {
                warn!(%holder, "another run is active; skipping this tick");
            }
            Err(e) => {
                error!(error = %e, "pass failed; will retry next tick");
            }
        }
        std::thread::sleep(interval);
    }
}
