//! The snapshot store.
//!
//! Records live in memory behind a lock and are persisted as one CBOR file
//! with a write-to-temp / fsync / rename / directory-fsync sequence, so a
//! crash can only ever lose the most recent save, never corrupt the file.

use crate::error::{StoreError, StoreResult};
use crate::record::SnapshotRecord;
use parking_lot::RwLock;
use shopsync_model::{FieldRef, FieldValue, PlatformId, Sku};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const SNAPSHOT_FILE: &str = "snapshot.cbor";
const SNAPSHOT_TEMP: &str = "snapshot.cbor.tmp";

/// Aggregate statistics about the snapshot store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct StoreStats {
    /// Records that are live (not tombstoned).
    pub active: usize,
    /// Tombstoned records.
    pub retired: usize,
    /// Total tracked field baselines across all records.
    pub fields: usize,
}

/// Durable record of the last reconciled state per SKU.
///
/// The store exclusively owns its records; everything else sees clones.
pub struct SnapshotStore {
    dir: PathBuf,
    records: RwLock<BTreeMap<Sku, SnapshotRecord>>,
}

impl SnapshotStore {
    /// Opens or creates a snapshot store in the given data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the snapshot
    /// file cannot be read or decoded.
    pub fn open(dir: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        } else if !dir.is_dir() {
            return Err(StoreError::NotADirectory(dir.display().to_string()));
        }

        let snapshot_path = dir.join(SNAPSHOT_FILE);
        let records = if snapshot_path.exists() {
            let file = File::open(&snapshot_path)?;
            let records: BTreeMap<Sku, SnapshotRecord> = ciborium::from_reader(file)
                .map_err(|e| StoreError::Codec(e.to_string()))?;
            info!(records = records.len(), "loaded snapshot");
            records
        } else {
            debug!(dir = %dir.display(), "starting with empty snapshot");
            BTreeMap::new()
        };

        Ok(Self {
            dir,
            records: RwLock::new(records),
        })
    }

    /// Returns the data directory this store lives in.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns a copy of the record for a SKU, if one exists.
    #[must_use]
    pub fn record(&self, sku: &Sku) -> Option<SnapshotRecord> {
        self.records.read().get(sku).cloned()
    }

    /// Returns copies of all records, tombstoned ones included.
    #[must_use]
    pub fn records(&self) -> BTreeMap<Sku, SnapshotRecord> {
        self.records.read().clone()
    }

    /// Returns true if the SKU is tombstoned.
    #[must_use]
    pub fn is_retired(&self, sku: &Sku) -> bool {
        self.records.read().get(sku).is_some_and(|r| r.retired)
    }

    /// Advances one field baseline after a durable apply.
    pub fn record_applied(
        &self,
        sku: &Sku,
        field: &FieldRef,
        value: FieldValue,
        applied_at_ms: u64,
    ) {
        let mut records = self.records.write();
        let record = records
            .entry(sku.clone())
            .or_insert_with(|| SnapshotRecord::new(sku.clone()));
        record.advance(field.clone(), value, applied_at_ms);
    }

    /// Records a platform's external ID for an already-tracked SKU.
    ///
    /// External IDs are a rebuildable cache, so this never creates a record:
    /// a SKU absent from the snapshot must keep looking absent, or the diff
    /// engine would stop detecting it as a creation.
    pub fn record_external_id(&self, sku: &Sku, platform: PlatformId, id: String) {
        let mut records = self.records.write();
        if let Some(record) = records.get_mut(sku) {
            record.external_ids.insert(platform, id);
        }
    }

    /// Tombstones a SKU after its retirement was observed on both platforms.
    pub fn retire(&self, sku: &Sku, retired_at_ms: u64) {
        let mut records = self.records.write();
        if let Some(record) = records.get_mut(sku) {
            record.retire(retired_at_ms);
        }
    }

    /// Returns aggregate statistics.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        let records = self.records.read();
        let retired = records.values().filter(|r| r.retired).count();
        StoreStats {
            active: records.len() - retired,
            retired,
            fields: records.values().map(|r| r.fields.len()).sum(),
        }
    }

    /// Persists the snapshot atomically.
    ///
    /// Write-to-temp, fsync, rename, then fsync the directory so the rename
    /// itself is durable.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure; the previous snapshot file is left
    /// intact in that case.
    pub fn save(&self) -> StoreResult<()> {
        let snapshot_path = self.dir.join(SNAPSHOT_FILE);
        let temp_path = self.dir.join(SNAPSHOT_TEMP);

        {
            let records = self.records.read();
            let file = File::create(&temp_path)?;
            ciborium::into_writer(&*records, &file)
                .map_err(|e| StoreError::Codec(e.to_string()))?;
            file.sync_all()?;
        }

        fs::rename(&temp_path, &snapshot_path)?;
        self.sync_directory()?;

        debug!(path = %snapshot_path.display(), "snapshot persisted");
        Ok(())
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> StoreResult<()> {
        let dir = File::open(&self.dir)?;
        dir.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> StoreResult<()> {
        // NTFS journaling covers metadata durability on Windows.
        Ok(())
    }
}
