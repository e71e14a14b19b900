//! Platform identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one of the two synchronized platforms.
///
/// The engine is symmetric over platforms except where the conflict policy
/// explicitly names one (pricing authority lives on the inventory side).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PlatformId {
    /// The storefront platform (customer-facing shop).
    Storefront,
    /// The inventory-management platform (order/stock system of record).
    Inventory,
}

impl PlatformId {
    /// Returns the opposite platform.
    #[must_use]
    pub fn other(&self) -> PlatformId {
        match self {
            PlatformId::Storefront => PlatformId::Inventory,
            PlatformId::Inventory => PlatformId::Storefront,
        }
    }

    /// Returns a stable lowercase name, used in logs and audit records.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformId::Storefront => "storefront",
            PlatformId::Inventory => "inventory",
        }
    }
}

impl fmt::Display for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
