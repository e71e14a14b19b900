//! The audit/reporting sink contract.
//!
//! The sink is append-only: the engine writes every change record, every
//! conflict decision (deferred ones included) and every per-entity apply
//! outcome, and never reads anything back. Failures to record are logged and
//! swallowed; auditing must never take a pass down with it.

use crate::apply::EntityOutcome;
use crate::change::ChangeRecord;
use crate::resolve::ConflictDecision;
use crate::run::RunSummary;
use parking_lot::Mutex;
use serde::Serialize;
use shopsync_model::{FieldRef, PlatformId, Sku};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use tracing::warn;

/// One audit event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    /// A pass started.
    RunStarted {
        /// Run identifier.
        run_id: String,
        /// Start time, epoch milliseconds.
        started_at_ms: u64,
        /// Whether the pass applies anything.
        dry_run: bool,
    },
    /// The diff engine detected a divergence.
    ChangeDetected {
        /// The change record.
        change: ChangeRecord,
    },
    /// A conflict was resolved or deferred.
    ConflictDecided {
        /// The decision, winner or deferral reason included.
        decision: ConflictDecision,
    },
    /// One field was durably applied.
    FieldApplied {
        /// The product SKU.
        sku: Sku,
        /// The applied field.
        field: FieldRef,
        /// The platform written to; `None` for baseline-only advancement.
        platform: Option<PlatformId>,
    },
    /// One field could not be applied.
    FieldFailed {
        /// The product SKU.
        sku: Sku,
        /// The failed field.
        field: FieldRef,
        /// Why it failed.
        reason: String,
    },
    /// An entity finished the apply pipeline.
    EntityCompleted {
        /// The per-entity outcome.
        outcome: EntityOutcome,
    },
    /// A pass finished.
    RunCompleted {
        /// The run summary.
        summary: RunSummary,
    },
}

/// Receives audit events. Append-only; never read back by the engine.
pub trait AuditSink: Send + Sync {
    /// Records one event.
    fn record(&self, event: &AuditEvent);
}

/// A sink that appends JSON lines to a file.
pub struct JsonlAuditSink {
    file: Mutex<File>,
}

impl JsonlAuditSink {
    /// Opens (or creates) an audit log file for appending.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl AuditSink for JsonlAuditSink {
    fn record(&self, event: &AuditEvent) {
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "could not encode audit event");
                return;
            }
        };
        let mut file = self.file.lock();
        if let Err(e) = writeln!(file, "{line}") {
            warn!(error = %e, "could not append audit event");
        }
    }
}

/// A sink that keeps events in memory, for tests.
#[derive(Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every recorded event.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    /// Counts events matching a predicate.
    pub fn count(&self, predicate: impl Fn(&AuditEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &AuditEvent) {
        self.events.lock().push(event.clone());
    }
}

/// A sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&self, _event: &AuditEvent) {}
}
