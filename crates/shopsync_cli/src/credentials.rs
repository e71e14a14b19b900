//! Credentials file loading.
//!
//! The engine never manages secrets; this module is the credential/config
//! provider that turns a JSON file into authenticated platform clients
//! before a run starts. The file is never written, only read.

use serde::Deserialize;
use std::path::Path;

const DEFAULT_CREDENTIALS_FILE: &str = "shopsync_credentials.json";

/// Credentials for both platforms.
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    /// Storefront API access.
    pub storefront: StorefrontCredentials,
    /// Inventory platform API access.
    pub inventory: InventoryCredentials,
    /// Request timeout in seconds for both platforms.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Storefront API credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct StorefrontCredentials {
    /// API base URL, e.g. `https://your-shop.example.com`.
    pub base_url: String,
    /// Access token sent as `X-Access-Token`.
    pub access_token: String,
}

/// Inventory platform API credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct InventoryCredentials {
    /// RPC endpoint URL.
    pub endpoint_url: String,
    /// API token sent as `X-Api-Token`.
    pub token: String,
}

fn default_timeout_secs() -> u64 {
    30
}

/// Loads credentials from the given path, or from
/// `shopsync_credentials.json` in the working directory.
pub fn load(path: Option<&Path>) -> Result<Credentials, Box<dyn std::error::Error>> {
    let path = path.unwrap_or_else(|| Path::new(DEFAULT_CREDENTIALS_FILE));
    let bytes = std::fs::read(path)
        .map_err(|e| format!("cannot read credentials file {}: {e}", path.display()))?;
    let credentials: Credentials = serde_json::from_slice(&bytes)
        .map_err(|e| format!("invalid credentials file {}: {e}", path.display()))?;
    Ok(credentials)
}
