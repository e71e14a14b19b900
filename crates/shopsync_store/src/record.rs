//! Snapshot record types.

use serde::{Deserialize, Serialize};
use shopsync_model::{FieldRef, FieldValue, PlatformId, Sku};
use std::collections::BTreeMap;

/// The last reconciled state of one tracked field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldBaseline {
    /// SHA-256 content hash of the canonicalized value.
    pub hash: [u8; 32],
    /// The reconciled value itself.
    pub value: FieldValue,
    /// Monotonic per-field version, bumped on every advancement.
    pub version: u64,
    /// When the value was durably applied, epoch milliseconds.
    pub applied_at_ms: u64,
}

/// The last reconciled state of one SKU across all tracked fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// The product SKU.
    pub sku: Sku,
    /// Known external IDs per platform (lookup cache, rebuildable).
    pub external_ids: BTreeMap<PlatformId, String>,
    /// Per-field baselines.
    pub fields: BTreeMap<FieldRef, FieldBaseline>,
    /// Monotonic record version, bumped on every change.
    pub version: u64,
    /// True once the SKU has been retired from both platforms.
    pub retired: bool,
    /// When the SKU was retired, if it was.
    pub retired_at_ms: Option<u64>,
}

impl SnapshotRecord {
    /// Creates an empty record for a newly seen SKU.
    #[must_use]
    pub fn new(sku: Sku) -> Self {
        Self {
            sku,
            external_ids: BTreeMap::new(),
            fields: BTreeMap::new(),
            version: 0,
            retired: false,
            retired_at_ms: None,
        }
    }

    /// Returns the baseline for a field, if one exists.
    #[must_use]
    pub fn baseline(&self, field: &FieldRef) -> Option<&FieldBaseline> {
        self.fields.get(field)
    }

    /// Advances a field baseline after a durable apply.
    ///
    /// Re-applying the value already on file (a crashed run being replayed)
    /// is a no-op, so an idempotent re-apply changes nothing here either.
    /// Also revives a tombstoned record: a re-appearing SKU flows through the
    /// normal diff/apply pipeline, and its first successful apply marks it
    /// active again.
    pub fn advance(&mut self, field: FieldRef, value: FieldValue, applied_at_ms: u64) {
        let value = value.canonicalize();
        let hash = value.content_hash();
        if !self.retired && self.fields.get(&field).is_some_and(|b| b.hash == hash) {
            return;
        }
        let version = self.fields.get(&field).map_or(1, |b| b.version + 1);
        self.fields.insert(
            field,
            FieldBaseline {
                hash,
                value,
                version,
                applied_at_ms,
            },
        );
        self.version += 1;
        self.retired = false;
        self.retired_at_ms = None;
    }

    /// Marks the record retired.
    pub fn retire(&mut self, retired_at_ms: u64) {
        self.retired = true;
        self.retired_at_ms = Some(retired_at_ms);
        self.version += 1;
    }
}
