//! # shopsync Store
//!
//! Durable snapshot store and run lease for shopsync.
//!
//! This crate provides:
//! - [`SnapshotStore`]: the last reconciled value of every tracked field per
//!   SKU, with per-field content hashes and versions
//! - [`RunLease`]: the exclusive lease that makes synchronization passes
//!   single-flight
//!
//! ## Data Directory Layout
//!
//! ```text
//! <data_dir>/
//! ├─ snapshot.cbor     # Snapshot records, CBOR-encoded
//! ├─ LOCK              # Advisory lock backing the run lease
//! ├─ lease.json        # Current lease holder (observability)
//! └─ last_run.json     # Most recent run summary (written by the engine)
//! ```
//!
//! ## Key Invariants
//!
//! - A field baseline is advanced only after the change is durably applied
//!   on the owning platform(s)
//! - Retired SKUs are tombstoned, never purged, so re-appearance is detected
//!   as new divergence rather than silently merged
//! - Snapshot saves are atomic (write-to-temp, fsync, rename, dir fsync)

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod lease;
mod record;
mod store;

pub use error::{StoreError, StoreResult};
pub use lease::{LeaseInfo, RunLease};
pub use record::{FieldBaseline, SnapshotRecord};
pub use store::{SnapshotStore, StoreStats};
