//! CLI command implementations.

pub mod run;
pub mod status;
pub mod watch;

use crate::client::ReqwestClient;
use crate::credentials::Credentials;
use shopsync_adapter::{InventoryAdapter, StorefrontAdapter};
use shopsync_engine::{EngineConfig, JsonlAuditSink, RunCoordinator};
use shopsync_store::SnapshotStore;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const AUDIT_FILE: &str = "audit.jsonl";

/// Wires adapters, store and audit sink into a coordinator.
pub fn build_coordinator(
    data_dir: &Path,
    credentials: &Credentials,
    dry_run: bool,
) -> Result<RunCoordinator, Box<dyn std::error::Error>> {
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

    let store = SnapshotStore::open(data_dir)?;
    let audit = JsonlAuditSink::open(data_dir.join(AUDIT_FILE))?;
    let config = EngineConfig::new().with_dry_run(dry_run);

    Ok(RunCoordinator::new(
        config,
        Arc::new(storefront),
        Arc::new(inventory),
        store,
        Arc::new(audit),
    ))
}
