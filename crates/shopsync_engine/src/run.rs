//! The run coordinator.
//!
//! Orchestrates one synchronization pass: fetch both platforms concurrently,
//! diff against the snapshot baseline, resolve conflicts, apply, persist.
//! Single-flight execution is enforced with the exclusive lease from
//! `shopsync_store`; a second invocation while a pass is active returns
//! [`EngineError::LeaseContention`] with zero side effects.

use crate::apply::{plan, ApplyPipeline, ApplyReport};
use crate::audit::{AuditEvent, AuditSink};
use crate::change::ChangeSet;
use crate::config::EngineConfig;
use crate::diff::DiffEngine;
use crate::error::{EngineError, EngineResult};
use crate::policy::{PlatformPolicy, RetryPolicy};
use crate::resolve::{ConflictDecision, ConflictResolver};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use shopsync_adapter::{fetch_all, AdapterResult, FetchSelector, PlatformAdapter};
use shopsync_model::{CanonicalProduct, PlatformId};
use shopsync_store::{RunLease, SnapshotStore, StoreError};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const LAST_RUN_FILE: &str = "last_run.json";

/// The stage a pass is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    /// No pass is active.
    Idle,
    /// Pulling current state from both platforms.
    Fetching,
    /// Comparing platform state against the baseline.
    Diffing,
    /// Running the conflict policy table.
    Resolving,
    /// Executing the apply pipeline.
    Applying,
    /// Saving the snapshot and run summary.
    Persisting,
    /// The previous pass aborted on an unrecoverable error.
    Failed,
}

impl RunState {
    /// Returns true while a pass is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !matches!(self, RunState::Idle | RunState::Failed)
    }
}

/// Coarse health as exposed to schedulers and health checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Health {
    /// Ready for the next pass.
    Idle,
    /// A pass is in progress.
    Running,
    /// The previous pass failed.
    Failed,
}

/// Summary of one completed pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Run identifier.
    pub run_id: String,
    /// Start time, epoch milliseconds.
    pub started_at_ms: u64,
    /// Finish time, epoch milliseconds.
    pub finished_at_ms: u64,
    /// Whether the pass applied anything.
    pub dry_run: bool,
    /// Entities with planned work this pass.
    pub entities_processed: usize,
    /// Platform mutations applied.
    pub changes_applied: usize,
    /// Conflicts deferred for manual review.
    pub conflicts_deferred: usize,
    /// Entities that ended failed or partially applied.
    pub failures: usize,
}

impl RunSummary {
    /// Reads the most recent summary from a data directory, if any.
    #[must_use]
    pub fn read_from(dir: impl AsRef<Path>) -> Option<RunSummary> {
        let bytes = fs::read(dir.as_ref().join(LAST_RUN_FILE)).ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}

/// Orchestrates synchronization passes.
pub struct RunCoordinator {
    config: EngineConfig,
    storefront: Arc<dyn PlatformAdapter>,
    inventory: Arc<dyn PlatformAdapter>,
    store: SnapshotStore,
    audit: Arc<dyn AuditSink>,
    state: RwLock<RunState>,
    cancel: AtomicBool,
    storefront_policy: PlatformPolicy,
    inventory_policy: PlatformPolicy,
}

impl RunCoordinator {
    /// Creates a coordinator.
    #[must_use]
    pub fn new(
        config: EngineConfig,
        storefront: Arc<dyn PlatformAdapter>,
        inventory: Arc<dyn PlatformAdapter>,
        store: SnapshotStore,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let storefront_policy =
            PlatformPolicy::new(config.retry.clone(), config.storefront_rate.bucket());
        let inventory_policy =
            PlatformPolicy::new(config.retry.clone(), config.inventory_rate.bucket());
        Self {
            config,
            storefront,
            inventory,
            store,
            audit,
            state: RwLock::new(RunState::Idle),
            cancel: AtomicBool::new(false),
            storefront_policy,
            inventory_policy,
        }
    }

    /// Returns the current stage.
    #[must_use]
    pub fn state(&self) -> RunState {
        *self.state.read()
    }

    /// Returns coarse health for schedulers and health checks.
    #[must_use]
    pub fn health(&self) -> Health {
        match self.state() {
            RunState::Idle => Health::Idle,
            RunState::Failed => Health::Failed,
            _ => Health::Running,
        }
    }

    /// Requests cancellation of the active pass.
    ///
    /// The in-flight apply completes, no new applies start, and the snapshot
    /// keeps everything that was durably applied before the request.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Returns the snapshot store backing this coordinator.
    #[must_use]
    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    fn set_state(&self, state: RunState) {
        debug!(?state, "run state transition");
        *self.state.write() = state;
    }

    /// Runs one synchronization pass.
    ///
    /// # Errors
    ///
    /// - [`EngineError::LeaseContention`] if another run holds the lease;
    ///   the invocation returns immediately with zero side effects
    /// - [`EngineError::FatalConnectivity`] if a platform is unreachable;
    ///   un-applied snapshots are left untouched
    pub fn run_once(&self) -> EngineResult<RunSummary> {
        let run_id = Uuid::new_v4().to_string();
        let started_at_ms = epoch_ms();
        self.cancel.store(false, Ordering::SeqCst);

        let lease = match RunLease::acquire(
            self.store.dir(),
            format!("run {run_id} (pid {})", std::process::id()),
            self.config.lease_timeout,
        ) {
            Ok(lease) => lease,
            Err(StoreError::LeaseHeld {
                holder,
                held_for_ms,
            }) => {
                info!(%holder, held_for_ms, "lease contention; refusing to start");
                return Err(EngineError::LeaseContention {
                    holder,
                    held_for_ms,
                });
            }
            Err(e) => return Err(e.into()),
        };

        info!(%run_id, dry_run = self.config.dry_run, "pass started");
        self.audit.record(&AuditEvent::RunStarted {
            run_id: run_id.clone(),
            started_at_ms,
            dry_run: self.config.dry_run,
        });

        let result = self.execute_pass(&run_id, started_at_ms);
        match &result {
            Ok(summary) => {
                self.set_state(RunState::Idle);
                info!(
                    %run_id,
                    entities = summary.entities_processed,
                    applied = summary.changes_applied,
                    deferred = summary.conflicts_deferred,
                    failures = summary.failures,
                    "pass completed"
                );
            }
            Err(e) => {
                self.set_state(RunState::Failed);
                error!(%run_id, error = %e, "pass failed");
            }
        }

        drop(lease);
        result
    }

    fn execute_pass(&self, run_id: &str, started_at_ms: u64) -> EngineResult<RunSummary> {
        // Fetching: both platforms concurrently, joined before diffing.
        self.set_state(RunState::Fetching);
        let (sf_state, inv_state) = self.fetch_both()?;

        // External IDs are a rebuildable cache; refresh them for SKUs the
        // snapshot already tracks.
        for product in sf_state.iter().chain(inv_state.iter()) {
            for (platform, id) in &product.external_ids {
                self.store
                    .record_external_id(&product.sku, *platform, id.clone());
            }
        }

        // Diffing.
        self.set_state(RunState::Diffing);
        let detected_at_ms = epoch_ms();
        let snapshot = self.store.records();
        let change_set: ChangeSet =
            DiffEngine::new().diff(&snapshot, &sf_state, &inv_state, detected_at_ms);
        for change in &change_set.changes {
            self.audit.record(&AuditEvent::ChangeDetected {
                change: change.clone(),
            });
        }

        // Resolving.
        self.set_state(RunState::Resolving);
        let resolver = ConflictResolver::new();
        let decisions: Vec<ConflictDecision> = change_set
            .conflicts
            .iter()
            .map(|c| resolver.resolve(c))
            .collect();
        let conflicts_deferred = decisions.iter().filter(|d| d.is_deferred()).count();
        for decision in &decisions {
            self.audit.record(&AuditEvent::ConflictDecided {
                decision: decision.clone(),
            });
        }

        let work = plan(&change_set.changes, &decisions);
        let entities_processed = work.len();

        // Applying.
        let report = if self.config.dry_run {
            info!(entities = entities_processed, "dry run; applying nothing");
            ApplyReport::default()
        } else {
            self.set_state(RunState::Applying);
            let pipeline = ApplyPipeline::new(
                self.storefront.as_ref(),
                self.inventory.as_ref(),
                &self.storefront_policy,
                &self.inventory_policy,
                &self.store,
                self.audit.as_ref(),
                &self.cancel,
            );
            pipeline.execute(work, epoch_ms())?
        };

        // Persisting.
        self.set_state(RunState::Persisting);
        if !self.config.dry_run {
            self.store.save()?;
        }

        let summary = RunSummary {
            run_id: run_id.to_string(),
            started_at_ms,
            finished_at_ms: epoch_ms(),
            dry_run: self.config.dry_run,
            entities_processed,
            changes_applied: report.changes_applied,
            conflicts_deferred,
            failures: report.failures,
        };
        self.write_last_run(&summary);
        self.audit.record(&AuditEvent::RunCompleted {
            summary: summary.clone(),
        });
        Ok(summary)
    }

    /// Fetches both platforms on scoped threads and joins before returning.
    fn fetch_both(&self) -> EngineResult<(Vec<CanonicalProduct>, Vec<CanonicalProduct>)> {
        let selector = &self.config.selector;
        let retry = &self.config.retry;

        let (sf_result, inv_result) = thread::scope(|scope| {
            let sf = scope
                .spawn(|| fetch_with_retry(self.storefront.as_ref(), selector, retry));
            let inv = scope
                .spawn(|| fetch_with_retry(self.inventory.as_ref(), selector, retry));
            (
                sf.join()
                    .unwrap_or_else(|_| Err(shopsync_adapter::AdapterError::transport_fatal(
                        "storefront fetch thread panicked",
                    ))),
                inv.join()
                    .unwrap_or_else(|_| Err(shopsync_adapter::AdapterError::transport_fatal(
                        "inventory fetch thread panicked",
                    ))),
            )
        });

        let sf_state = sf_result.map_err(|e| EngineError::FatalConnectivity {
            platform: PlatformId::Storefront,
            message: e.to_string(),
        })?;
        let inv_state = inv_result.map_err(|e| EngineError::FatalConnectivity {
            platform: PlatformId::Inventory,
            message: e.to_string(),
        })?;

        debug!(
            storefront = sf_state.len(),
            inventory = inv_state.len(),
            "fetched both platforms"
        );
        Ok((sf_state, inv_state))
    }

    fn write_last_run(&self, summary: &RunSummary) {
        let path = self.store.dir().join(LAST_RUN_FILE);
        match serde_json::to_vec_pretty(summary) {
            Ok(bytes) => {
                if let Err(e) = fs::write(&path, bytes) {
                    warn!(error = %e, "could not write run summary");
                }
            }
            Err(e) => warn!(error = %e, "could not encode run summary"),
        }
    }
}

/// Fetches a full catalog, retrying transient failures from the start so a
/// retried fetch never mixes pages from different catalog versions.
fn fetch_with_retry(
    adapter: &dyn PlatformAdapter,
    selector: &FetchSelector,
    retry: &RetryPolicy,
) -> AdapterResult<Vec<CanonicalProduct>> {
    let mut attempt = 0u32;
    loop {
        match fetch_all(adapter, selector) {
            Ok(products) => return Ok(products),
            Err(e) if e.is_retryable() && attempt + 1 < retry.max_attempts.max(1) => {
                attempt += 1;
                let wait = retry.delay_for_attempt(attempt);
                warn!(
                    platform = %adapter.platform(),
                    error = %e,
                    attempt,
                    ?wait,
                    "fetch failed; retrying"
                );
                thread::sleep(wait);
            }
            Err(e) => return Err(e),
        }
    }
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use shopsync_adapter::{AdapterError, MockAdapter};
    use shopsync_model::{FieldKind, FieldRef, FieldValue, Money, Sku, StockLevel};
    use std::collections::BTreeMap;
    use std::time::Duration;
    use tempfile::tempdir;

    fn product(sku: &str, price_minor: i64, stock: u64) -> CanonicalProduct {
        CanonicalProduct {
            sku: Sku::new(sku).unwrap(),
            external_ids: BTreeMap::new(),
            title: "Oak chair".into(),
            description: "A chair".into(),
            price: Money::from_minor(price_minor, "PLN").unwrap(),
            tags: vec!["chairs".into()],
            stock: Some(StockLevel::Units(stock)),
            variants: vec![],
            updated_at_ms: 100,
        }
    }

    fn fast_config() -> EngineConfig {
        EngineConfig::new()
            .with_retry(
                RetryPolicy::new(2)
                    .with_initial_delay(Duration::from_millis(1))
                    .without_jitter(),
            )
            .with_lease_timeout(Duration::from_secs(5))
    }

    struct Fixture {
        storefront: MockAdapter,
        inventory: MockAdapter,
        audit: Arc<MemoryAuditSink>,
        coordinator: RunCoordinator,
        _temp: tempfile::TempDir,
    }

    impl Fixture {
        fn new(config: EngineConfig) -> Self {
            let temp = tempdir().unwrap();
            let storefront = MockAdapter::new(PlatformId::Storefront);
            let inventory = MockAdapter::new(PlatformId::Inventory);
            let audit = Arc::new(MemoryAuditSink::new());
            let coordinator = RunCoordinator::new(
                config,
                Arc::new(storefront.clone()),
                Arc::new(inventory.clone()),
                SnapshotStore::open(temp.path()).unwrap(),
                audit.clone(),
            );
            Self {
                storefront,
                inventory,
                audit,
                coordinator,
                _temp: temp,
            }
        }

        /// Seeds the snapshot to exactly match a product.
        fn seed_snapshot(&self, product: &CanonicalProduct) {
            for (field, value) in product.fields() {
                self.coordinator
                    .store()
                    .record_applied(&product.sku, &field, value, 1);
            }
        }
    }

    #[test]
    fn coordinator_starts_idle() {
        let fx = Fixture::new(fast_config());
        assert_eq!(fx.coordinator.state(), RunState::Idle);
        assert_eq!(fx.coordinator.health(), Health::Idle);
    }

    #[test]
    fn end_to_end_scenario() {
        // Baseline {CH-100: price 199.00, stock 10}; storefront reports
        // price 219.00, inventory reports stock 7.
        let fx = Fixture::new(fast_config());
        let base = product("CH-100", 19_900, 10);
        fx.seed_snapshot(&base);

        let mut sf = base.clone();
        sf.price = Money::from_minor(21_900, "PLN").unwrap();
        sf.updated_at_ms = 900;
        fx.storefront.put_product(sf);

        let mut inv = base;
        inv.stock = Some(StockLevel::Units(7));
        inv.updated_at_ms = 950;
        fx.inventory.put_product(inv);

        let summary = fx.coordinator.run_once().unwrap();

        assert_eq!(summary.entities_processed, 1);
        assert_eq!(summary.changes_applied, 2);
        assert_eq!(summary.conflicts_deferred, 0);
        assert_eq!(summary.failures, 0);
        assert_eq!(fx.coordinator.state(), RunState::Idle);

        // The storefront's price reached the inventory platform and the
        // inventory count reached the storefront.
        let sku = Sku::new("CH-100").unwrap();
        assert_eq!(fx.inventory.product(&sku).unwrap().price.minor(), 21_900);
        assert_eq!(
            fx.storefront.product(&sku).unwrap().stock,
            Some(StockLevel::Units(7))
        );

        // The snapshot advanced to {219.00, 7}.
        let record = fx.coordinator.store().record(&sku).unwrap();
        assert_eq!(
            record
                .baseline(&FieldRef::product(FieldKind::Price))
                .unwrap()
                .value,
            FieldValue::Money(Money::from_minor(21_900, "PLN").unwrap())
        );
        assert_eq!(
            record
                .baseline(&FieldRef::product(FieldKind::Stock))
                .unwrap()
                .value,
            FieldValue::Stock(StockLevel::Units(7))
        );

        // A clean follow-up pass finds nothing.
        let summary = fx.coordinator.run_once().unwrap();
        assert_eq!(summary.entities_processed, 0);
        assert_eq!(summary.changes_applied, 0);
    }

    #[test]
    fn lease_contention_causes_zero_applies() {
        let fx = Fixture::new(fast_config());
        let base = product("CH-100", 19_900, 10);
        fx.seed_snapshot(&base);

        let mut sf = base.clone();
        sf.price = Money::from_minor(21_900, "PLN").unwrap();
        fx.storefront.put_product(sf);
        fx.inventory.put_product(base);

        // Another "run" holds the lease.
        let _lease = RunLease::acquire(
            fx.coordinator.store().dir(),
            "other-run",
            Duration::from_secs(5),
        )
        .unwrap();

        let err = fx.coordinator.run_once().unwrap_err();
        assert!(matches!(err, EngineError::LeaseContention { .. }));
        assert!(fx.storefront.applied_log().is_empty());
        assert!(fx.inventory.applied_log().is_empty());
        // Contention is not a failure state; the coordinator never started.
        assert_eq!(fx.coordinator.state(), RunState::Idle);
    }

    #[test]
    fn fatal_connectivity_fails_the_pass() {
        let fx = Fixture::new(fast_config());
        fx.storefront
            .fail_next_fetch(AdapterError::Authentication("expired token".into()));

        let err = fx.coordinator.run_once().unwrap_err();
        assert!(matches!(
            err,
            EngineError::FatalConnectivity {
                platform: PlatformId::Storefront,
                ..
            }
        ));
        assert_eq!(fx.coordinator.state(), RunState::Failed);
        assert_eq!(fx.coordinator.health(), Health::Failed);

        // The pass can run again once connectivity returns.
        let summary = fx.coordinator.run_once().unwrap();
        assert_eq!(summary.failures, 0);
        assert_eq!(fx.coordinator.health(), Health::Idle);
    }

    #[test]
    fn transient_fetch_failures_are_retried() {
        let fx = Fixture::new(fast_config());
        fx.storefront.put_product(product("CH-100", 19_900, 10));
        fx.inventory.put_product(product("CH-100", 19_900, 10));
        fx.storefront
            .fail_next_fetch(AdapterError::transport_retryable("503"));

        let summary = fx.coordinator.run_once().unwrap();
        // First reconciliation seeds baselines; no conflicts, no failures.
        assert_eq!(summary.failures, 0);
        assert_eq!(summary.conflicts_deferred, 0);
    }

    #[test]
    fn deferred_conflicts_are_counted_and_not_applied() {
        let fx = Fixture::new(fast_config());
        let base = product("CH-100", 19_900, 10);
        fx.seed_snapshot(&base);

        // Both platforms changed the description at the same reported time.
        let mut sf = base.clone();
        sf.description = "Solid oak chair".into();
        sf.updated_at_ms = 700;
        fx.storefront.put_product(sf);

        let mut inv = base;
        inv.description = "Oak chair, solid".into();
        inv.updated_at_ms = 700;
        fx.inventory.put_product(inv);

        let summary = fx.coordinator.run_once().unwrap();
        assert_eq!(summary.conflicts_deferred, 1);
        assert_eq!(summary.changes_applied, 0);
        assert!(fx.storefront.applied_log().is_empty());
        assert!(fx.inventory.applied_log().is_empty());

        // The next pass re-evaluates against the unchanged baseline instead
        // of silently dropping the conflict.
        let summary = fx.coordinator.run_once().unwrap();
        assert_eq!(summary.conflicts_deferred, 1);
    }

    #[test]
    fn retirement_round_trip() {
        let fx = Fixture::new(fast_config());
        let base = product("CH-100", 19_900, 10);
        fx.seed_snapshot(&base);
        // Absent from both platforms.

        let summary = fx.coordinator.run_once().unwrap();
        assert_eq!(summary.entities_processed, 1);

        let sku = Sku::new("CH-100").unwrap();
        assert!(fx.coordinator.store().is_retired(&sku));

        // Tombstoned SKUs produce no further work.
        let summary = fx.coordinator.run_once().unwrap();
        assert_eq!(summary.entities_processed, 0);
    }

    #[test]
    fn creation_propagates_to_the_other_platform() {
        let fx = Fixture::new(fast_config());
        fx.storefront.put_product(product("CH-300", 9_900, 2));

        let summary = fx.coordinator.run_once().unwrap();
        assert_eq!(summary.changes_applied, 1);

        let sku = Sku::new("CH-300").unwrap();
        assert!(fx.inventory.product(&sku).is_some());
        assert_eq!(fx.inventory.created_log(), vec![sku]);
    }

    #[test]
    fn dry_run_applies_nothing_but_reports_work() {
        let fx = Fixture::new(fast_config().with_dry_run(true));
        let base = product("CH-100", 19_900, 10);
        fx.seed_snapshot(&base);

        let mut sf = base.clone();
        sf.price = Money::from_minor(21_900, "PLN").unwrap();
        fx.storefront.put_product(sf);
        fx.inventory.put_product(base);

        let summary = fx.coordinator.run_once().unwrap();
        assert!(summary.dry_run);
        assert_eq!(summary.entities_processed, 1);
        assert_eq!(summary.changes_applied, 0);
        assert!(fx.inventory.applied_log().is_empty());
    }

    #[test]
    fn last_run_summary_is_written() {
        let fx = Fixture::new(fast_config());
        let summary = fx.coordinator.run_once().unwrap();

        let read = RunSummary::read_from(fx.coordinator.store().dir()).unwrap();
        assert_eq!(read.run_id, summary.run_id);

        let started = fx
            .audit
            .count(|e| matches!(e, AuditEvent::RunStarted { .. }));
        let completed = fx
            .audit
            .count(|e| matches!(e, AuditEvent::RunCompleted { .. }));
        assert_eq!(started, 1);
        assert_eq!(completed, 1);
    }
}
