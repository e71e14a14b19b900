//! Run command implementation.

use crate::credentials::Credentials;
use shopsync_engine::EngineError;
use std::path::Path;
use tracing::{info, warn};

/// Runs one synchronization pass.
pub fn run(
    data_dir: &Path,
    credentials: &Credentials,
    dry_run: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let coordinator = super::build_coordinator(data_dir, credentials, dry_run)?;

    match coordinator.run_once() {
        Ok(summary) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).unwrap_or_default()
            );
            if summary.failures > 0 {
                warn!(failures = summary.failures, "pass completed with failures");
            } else {
                info!("pass completed");
            }
            Ok(())
        }
        Err(EngineError::LeaseContention { holder, .. }) => {
            warn!(%holder, "another run is active; nothing was done");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
