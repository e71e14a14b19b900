//! Status command implementation.

use crate::client::ReqwestClient;
use crate::credentials::Credentials;
use serde::Serialize;
use shopsync_adapter::{InventoryAdapter, PlatformAdapter, StorefrontAdapter};
use shopsync_engine::RunSummary;
use shopsync_store::{LeaseInfo, RunLease, SnapshotStore, StoreStats};
use std::path::Path;
use std::time::Duration;

/// Reachability of both platforms.
#[derive(Debug, Serialize)]
pub struct PlatformHealth {
    /// Storefront reachable with the supplied credentials.
    pub storefront: bool,
    /// Inventory platform reachable with the supplied credentials.
    pub inventory: bool,
}

/// Everything the status command reports.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    /// Data directory inspected.
    pub data_dir: String,
    /// Current lease holder, if a run is active.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lease: Option<LeaseInfo>,
    /// Most recent run summary, if any pass has completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run: Option<RunSummary>,
    /// Snapshot statistics.
    pub snapshot: StoreStats,
    /// Platform health, when credentials were supplied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platforms: Option<PlatformHealth>,
}

/// Runs the status command.
pub fn run(
    data_dir: &Path,
    format: &str,
    credentials: Option<&Credentials>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = SnapshotStore::open(data_dir)?;
    let report = StatusReport {
        data_dir: data_dir.display().to_string(),
        lease: RunLease::peek(data_dir),
        last_run: RunSummary::read_from(data_dir),
        snapshot: store.stats(),
        platforms: match credentials {
            Some(credentials) => Some(check_platforms(credentials)?),
            None => None,
        },
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => print_text(&report),
    }
    Ok(())
}

fn check_platforms(
    credentials: &Credentials,
) -> Result<PlatformHealth, Box<dyn std::error::Error>> {
    let timeout = Duration::from_secs(credentials.timeout_secs);
    let storefront = StorefrontAdapter::new(
        credentials.storefront.base_url.clone(),
        ReqwestClient::new(
            timeout,
            ("X-Access-Token", credentials.storefront.access_token.clone()),
        )?,
    );
    let inventory = InventoryAdapter::new(
        credentials.inventory.endpoint_url.clone(),
        ReqwestClient::new(
            timeout,
            ("X-Api-Token", credentials.inventory.token.clone()),
        )?,
    );
    Ok(PlatformHealth {
        storefront: storefront.is_healthy(),
        inventory: inventory.is_healthy(),
    })
}

fn print_text(report: &StatusReport) {
    println!("data dir:  {}", report.data_dir);
    match &report.lease {
        Some(lease) => println!("lease:     held by {} (pid {})", lease.holder, lease.pid),
        None => println!("lease:     free"),
    }
    match &report.last_run {
        Some(run) => {
            println!(
                "last run:  {} ({})",
                run.run_id,
                if run.dry_run { "dry run" } else { "applied" }
            );
            println!(
                "           {} entities, {} applied, {} deferred, {} failures",
                run.entities_processed, run.changes_applied, run.conflicts_deferred, run.failures
            );
        }
        None => println!("last run:  never"),
    }
    println!(
        "snapshot:  {} active, {} retired, {} field baselines",
        report.snapshot.active, report.snapshot.retired, report.snapshot.fields
    );
    if let Some(platforms) = &report.platforms {
        println!(
            "platforms: storefront {}, inventory {}",
            if platforms.storefront { "up" } else { "down" },
            if platforms.inventory { "up" } else { "down" }
        );
    }
}
