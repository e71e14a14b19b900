//! Change records produced by the diff engine.
//!
//! Change records are ephemeral: produced in one pass, consumed by the
//! conflict resolver and apply pipeline within that pass, and forwarded to
//! the audit sink. They are never persisted beyond a run's audit log.

use serde::Serialize;
use shopsync_model::{CanonicalProduct, FieldRef, FieldValue, PlatformId, Sku};

/// Which side of the sync reported a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChangeSource {
    /// Exactly one platform diverged from the baseline.
    Platform(PlatformId),
    /// Both platforms diverged to the same new value; no conflict, and no
    /// platform write is needed, only a baseline advancement.
    Both,
}

impl ChangeSource {
    /// The platform a field update must be written to, if any.
    #[must_use]
    pub fn apply_target(&self) -> Option<PlatformId> {
        match self {
            ChangeSource::Platform(p) => Some(p.other()),
            ChangeSource::Both => None,
        }
    }
}

/// What kind of divergence a change record describes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ChangeKind {
    /// One tracked field diverged from the baseline.
    FieldUpdate,
    /// The SKU exists on one platform only and has never been reconciled;
    /// it must be created on the target platform.
    Creation {
        /// The platform missing the product.
        target: PlatformId,
        /// The full product as reported by the source platform.
        product: Box<CanonicalProduct>,
    },
    /// The SKU is in the snapshot but absent from both platforms.
    Retirement,
}

/// One detected divergence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeRecord {
    /// The product SKU.
    pub sku: Sku,
    /// The diverging field; `None` for creations and retirements.
    pub field: Option<FieldRef>,
    /// The kind of divergence.
    pub kind: ChangeKind,
    /// The baseline value, if one existed.
    pub old: Option<FieldValue>,
    /// The newly reported value, if any.
    pub new: Option<FieldValue>,
    /// Which side reported the change.
    pub source: ChangeSource,
    /// Platform-reported modification time of the source entity, epoch ms.
    pub source_updated_at_ms: u64,
    /// When the diff engine detected the divergence, epoch ms.
    pub detected_at_ms: u64,
}

/// A field changed on both platforms to different values.
///
/// The storefront record always sits on the left, the inventory record on
/// the right, so downstream code never has to inspect sources to know which
/// side is which.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldConflict {
    /// The product SKU.
    pub sku: Sku,
    /// The contested field.
    pub field: FieldRef,
    /// The storefront's change.
    pub storefront: ChangeRecord,
    /// The inventory platform's change.
    pub inventory: ChangeRecord,
}

/// Statistics about one diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffStats {
    /// Distinct SKUs seen across the snapshot and both platforms.
    pub skus_seen: usize,
    /// Field-level changes (conflicting fields excluded).
    pub fields_changed: usize,
    /// Fields contested by both platforms.
    pub conflicts: usize,
    /// Products that need creation on one platform.
    pub creations: usize,
    /// SKUs retired from both platforms.
    pub retirements: usize,
}

/// The complete output of one diff.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    /// Unconflicted changes, ready for planning.
    pub changes: Vec<ChangeRecord>,
    /// Contested fields, routed to the conflict resolver.
    pub conflicts: Vec<FieldConflict>,
    /// Aggregate statistics.
    pub stats: DiffStats,
}

impl ChangeSet {
    /// Returns true if the diff found nothing to do.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.conflicts.is_empty()
    }
}
