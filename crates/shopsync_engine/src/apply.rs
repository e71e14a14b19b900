//! The apply/commit pipeline.
//!
//! Executes resolved changes against the target platforms. Each entity is
//! one logical unit: fields apply in fixed precedence, a failed field leaves
//! already-applied fields applied (the platforms have no multi-field
//! transaction to roll back), and the snapshot advances only for fields that
//! succeeded, so a retried run re-attempts exactly the failures and nothing
//! else.

use crate::audit::{AuditEvent, AuditSink};
use crate::change::{ChangeKind, ChangeRecord};
use crate::error::{EngineError, EngineResult};
use crate::policy::PlatformPolicy;
use crate::resolve::ConflictDecision;
use serde::Serialize;
use shopsync_adapter::{AdapterError, ApplyOutcome, PlatformAdapter};
use shopsync_model::{CanonicalProduct, FieldRef, FieldValue, PlatformId, Sku};
use shopsync_store::SnapshotStore;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// One field change ready for execution.
#[derive(Debug, Clone)]
pub struct ApplyItem {
    /// The field to write.
    pub field: FieldRef,
    /// The value to write.
    pub value: FieldValue,
    /// The platform to write to; `None` advances the baseline only (both
    /// platforms already agree on the value).
    pub target: Option<PlatformId>,
}

/// What the pipeline must do for one entity.
#[derive(Debug, Clone)]
pub enum EntityAction {
    /// Apply field changes in precedence order.
    Fields(Vec<ApplyItem>),
    /// Create the product on the platform that is missing it.
    Create {
        /// The platform missing the product.
        target: PlatformId,
        /// The product to create.
        product: CanonicalProduct,
    },
    /// Tombstone the SKU; no platform call is involved.
    Retire,
}

/// One entity's worth of planned work.
#[derive(Debug, Clone)]
pub struct EntityWork {
    /// The product SKU.
    pub sku: Sku,
    /// The planned action.
    pub action: EntityAction,
}

/// How one entity fared in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EntityStatus {
    /// Every planned change applied.
    Synced,
    /// Some fields applied, some failed; the failures will be rediscovered
    /// next run.
    Partial,
    /// Nothing applied.
    Failed,
    /// Skipped because the pass was cancelled before this entity started.
    Skipped,
}

/// Per-entity apply outcome, forwarded to the audit sink.
#[derive(Debug, Clone, Serialize)]
pub struct EntityOutcome {
    /// The product SKU.
    pub sku: Sku,
    /// Final status.
    pub status: EntityStatus,
    /// Fields durably applied this pass.
    pub applied: Vec<FieldRef>,
    /// Fields that failed, with reasons.
    pub failed: Vec<(FieldRef, String)>,
}

/// Aggregate result of one pipeline execution.
#[derive(Debug, Default)]
pub struct ApplyReport {
    /// Per-entity outcomes, in processing order.
    pub outcomes: Vec<EntityOutcome>,
    /// Platform mutations: field applies and creations.
    pub changes_applied: usize,
    /// Entities that ended `Failed` or `Partial`.
    pub failures: usize,
}

/// Groups unconflicted changes and auto-resolved winners into per-entity
/// work, with fields sorted into apply precedence.
#[must_use]
pub fn plan(changes: &[ChangeRecord], decisions: &[ConflictDecision]) -> Vec<EntityWork> {
    let mut fields: BTreeMap<Sku, BTreeMap<FieldRef, ApplyItem>> = BTreeMap::new();
    let mut actions: BTreeMap<Sku, EntityAction> = BTreeMap::new();

    let winners = decisions.iter().filter_map(ConflictDecision::winner);
    for change in changes.iter().chain(winners) {
        match &change.kind {
            ChangeKind::Retirement => {
                actions.insert(change.sku.clone(), EntityAction::Retire);
            }
            ChangeKind::Creation { target, product } => {
                actions.insert(
                    change.sku.clone(),
                    EntityAction::Create {
                        target: *target,
                        product: (**product).clone(),
                    },
                );
            }
            ChangeKind::FieldUpdate => {
                let (Some(field), Some(value)) = (&change.field, &change.new) else {
                    continue;
                };
                fields.entry(change.sku.clone()).or_default().insert(
                    field.clone(),
                    ApplyItem {
                        field: field.clone(),
                        value: value.clone(),
                        target: change.source.apply_target(),
                    },
                );
            }
        }
    }

    let mut work: Vec<EntityWork> = Vec::new();
    for (sku, items) in fields {
        work.push(EntityWork {
            sku,
            action: EntityAction::Fields(items.into_values().collect()),
        });
    }
    for (sku, action) in actions {
        work.push(EntityWork { sku, action });
    }
    work
}

enum FieldFailure {
    /// Not retried; the value was refused or retries ran out.
    Terminal(String),
    /// The platform does not know the SKU; remaining fields are pointless.
    EntityGone(String),
    /// The platform is unreachable or rejects our credentials; the pass
    /// itself must stop.
    Fatal(String),
}

/// Executes planned work against the adapters.
pub struct ApplyPipeline<'a> {
    storefront: &'a dyn PlatformAdapter,
    inventory: &'a dyn PlatformAdapter,
    storefront_policy: &'a PlatformPolicy,
    inventory_policy: &'a PlatformPolicy,
    store: &'a SnapshotStore,
    audit: &'a dyn AuditSink,
    cancel: &'a AtomicBool,
}

impl<'a> ApplyPipeline<'a> {
    /// Creates a pipeline over the given adapters, policies and store.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storefront: &'a dyn PlatformAdapter,
        inventory: &'a dyn PlatformAdapter,
        storefront_policy: &'a PlatformPolicy,
        inventory_policy: &'a PlatformPolicy,
        store: &'a SnapshotStore,
        audit: &'a dyn AuditSink,
        cancel: &'a AtomicBool,
    ) -> Self {
        Self {
            storefront,
            inventory,
            storefront_policy,
            inventory_policy,
            store,
            audit,
            cancel,
        }
    }

    fn side(&self, platform: PlatformId) -> (&dyn PlatformAdapter, &PlatformPolicy) {
        match platform {
            PlatformId::Storefront => (self.storefront, self.storefront_policy),
            PlatformId::Inventory => (self.inventory, self.inventory_policy),
        }
    }

    /// Runs every planned entity.
    ///
    /// Entities are independent: one entity's failure never blocks another.
    /// The snapshot is saved after each entity so a crash mid-pass leaves it
    /// reflecting exactly the durably-applied fields.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::FatalConnectivity`] if a platform becomes
    /// unreachable or rejects credentials mid-pass; everything applied so
    /// far stays applied and recorded.
    pub fn execute(&self, work: Vec<EntityWork>, now_ms: u64) -> EngineResult<ApplyReport> {
        let mut report = ApplyReport::default();

        for entity in work {
            if self.cancel.load(Ordering::SeqCst) {
                debug!(sku = %entity.sku, "pass cancelled; skipping entity");
                let outcome = EntityOutcome {
                    sku: entity.sku,
                    status: EntityStatus::Skipped,
                    applied: vec![],
                    failed: vec![],
                };
                self.audit.record(&AuditEvent::EntityCompleted {
                    outcome: outcome.clone(),
                });
                report.outcomes.push(outcome);
                continue;
            }

            let outcome = match entity.action {
                EntityAction::Retire => self.retire(&entity.sku, now_ms)?,
                EntityAction::Create { target, product } => {
                    self.create(&entity.sku, target, &product, now_ms, &mut report)?
                }
                EntityAction::Fields(items) => {
                    self.apply_fields(&entity.sku, items, now_ms, &mut report)?
                }
            };

            if matches!(outcome.status, EntityStatus::Failed | EntityStatus::Partial) {
                report.failures += 1;
            }
            self.audit.record(&AuditEvent::EntityCompleted {
                outcome: outcome.clone(),
            });
            report.outcomes.push(outcome);
        }

        info!(
            entities = report.outcomes.len(),
            applied = report.changes_applied,
            failures = report.failures,
            "apply pipeline finished"
        );
        Ok(report)
    }

    fn retire(&self, sku: &Sku, now_ms: u64) -> EngineResult<EntityOutcome> {
        self.store.retire(sku, now_ms);
        self.store.save()?;
        debug!(%sku, "tombstoned retired product");
        Ok(EntityOutcome {
            sku: sku.clone(),
            status: EntityStatus::Synced,
            applied: vec![],
            failed: vec![],
        })
    }

    fn create(
        &self,
        sku: &Sku,
        target: PlatformId,
        product: &CanonicalProduct,
        now_ms: u64,
        report: &mut ApplyReport,
    ) -> EngineResult<EntityOutcome> {
        let (adapter, policy) = self.side(target);
        let result = self.attempt(target, policy, || adapter.create_product(product));

        match result {
            Ok(()) => {
                // The product is now live on both platforms; seed every
                // field baseline so the next diff starts from agreement.
                for (field, value) in product.fields() {
                    self.store.record_applied(sku, &field, value, now_ms);
                }
                if let Some(id) = product.external_ids.get(&target.other()) {
                    self.store
                        .record_external_id(sku, target.other(), id.clone());
                }
                self.store.save()?;
                report.changes_applied += 1;
                info!(%sku, %target, "created product");
                Ok(EntityOutcome {
                    sku: sku.clone(),
                    status: EntityStatus::Synced,
                    applied: vec![],
                    failed: vec![],
                })
            }
            Err(FieldFailure::Fatal(message)) => Err(EngineError::FatalConnectivity {
                platform: target,
                message,
            }),
            Err(FieldFailure::Terminal(reason) | FieldFailure::EntityGone(reason)) => {
                warn!(%sku, %target, reason, "product creation failed");
                Ok(EntityOutcome {
                    sku: sku.clone(),
                    status: EntityStatus::Failed,
                    applied: vec![],
                    failed: vec![],
                })
            }
        }
    }

    fn apply_fields(
        &self,
        sku: &Sku,
        items: Vec<ApplyItem>,
        now_ms: u64,
        report: &mut ApplyReport,
    ) -> EngineResult<EntityOutcome> {
        let mut applied = Vec::new();
        let mut failed: Vec<(FieldRef, String)> = Vec::new();
        let mut advanced = false;
        let mut entity_gone = false;

        for item in items {
            if entity_gone {
                failed.push((item.field, "skipped: product missing on platform".into()));
                continue;
            }
            if self.cancel.load(Ordering::SeqCst) {
                failed.push((item.field, "skipped: pass cancelled".into()));
                continue;
            }

            let result = match item.target {
                // Both platforms already hold the value; only the baseline
                // moves.
                None => Ok(()),
                Some(platform) => {
                    let (adapter, policy) = self.side(platform);
                    let sku = sku.clone();
                    let field = item.field.clone();
                    let value = item.value.clone();
                    self.attempt(platform, policy, move || {
                        adapter.apply_change(&sku, &field, &value)
                    })
                }
            };

            match result {
                Ok(()) => {
                    self.store
                        .record_applied(sku, &item.field, item.value.clone(), now_ms);
                    advanced = true;
                    if item.target.is_some() {
                        report.changes_applied += 1;
                    }
                    self.audit.record(&AuditEvent::FieldApplied {
                        sku: sku.clone(),
                        field: item.field.clone(),
                        platform: item.target,
                    });
                    applied.push(item.field);
                }
                Err(FieldFailure::Fatal(message)) => {
                    // Persist what did apply before aborting the pass.
                    if advanced {
                        self.store.save()?;
                    }
                    return Err(EngineError::FatalConnectivity {
                        platform: item.target.unwrap_or(PlatformId::Storefront),
                        message,
                    });
                }
                Err(FieldFailure::EntityGone(reason)) => {
                    entity_gone = true;
                    self.audit.record(&AuditEvent::FieldFailed {
                        sku: sku.clone(),
                        field: item.field.clone(),
                        reason: reason.clone(),
                    });
                    failed.push((item.field, reason));
                }
                Err(FieldFailure::Terminal(reason)) => {
                    self.audit.record(&AuditEvent::FieldFailed {
                        sku: sku.clone(),
                        field: item.field.clone(),
                        reason: reason.clone(),
                    });
                    failed.push((item.field, reason));
                }
            }
        }

        if advanced {
            self.store.save()?;
        }

        let status = match (applied.is_empty(), failed.is_empty()) {
            (_, true) => EntityStatus::Synced,
            (false, false) => EntityStatus::Partial,
            (true, false) => EntityStatus::Failed,
        };
        Ok(EntityOutcome {
            sku: sku.clone(),
            status,
            applied,
            failed,
        })
    }

    /// One rate-limited, retried platform call.
    fn attempt(
        &self,
        platform: PlatformId,
        policy: &PlatformPolicy,
        call: impl Fn() -> Result<ApplyOutcome, AdapterError>,
    ) -> Result<(), FieldFailure> {
        let max_attempts = policy.retry.max_attempts.max(1);
        for attempt in 0..max_attempts {
            policy.bucket.take();

            match call() {
                Ok(ApplyOutcome::Applied) => return Ok(()),
                Ok(ApplyOutcome::RateLimited { retry_after }) => {
                    if attempt + 1 >= max_attempts {
                        return Err(FieldFailure::Terminal(format!(
                            "{platform} rate limit persisted through {max_attempts} attempts"
                        )));
                    }
                    let backoff = policy.retry.delay_for_attempt(attempt + 1);
                    let wait = retry_after.map_or(backoff, |hint| hint.max(backoff));
                    debug!(%platform, ?wait, "rate limited; backing off");
                    std::thread::sleep(wait);
                }
                Ok(ApplyOutcome::NotFound) => {
                    return Err(FieldFailure::EntityGone(format!(
                        "{platform} does not know this SKU"
                    )));
                }
                Ok(ApplyOutcome::Rejected { reason }) => {
                    return Err(FieldFailure::Terminal(format!("{platform} rejected: {reason}")));
                }
                Err(AdapterError::Authentication(message)) => {
                    return Err(FieldFailure::Fatal(message));
                }
                Err(e) if e.is_retryable() && attempt + 1 < max_attempts => {
                    let wait = policy.retry.delay_for_attempt(attempt + 1);
                    debug!(%platform, error = %e, ?wait, "transient failure; backing off");
                    std::thread::sleep(wait);
                }
                Err(e) => {
                    return Err(FieldFailure::Terminal(e.to_string()));
                }
            }
        }
        Err(FieldFailure::Terminal(format!(
            "{platform} retries exhausted"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::change::ChangeSource;
    use crate::policy::{RetryPolicy, TokenBucket};
    use shopsync_model::{FieldKind, Money, StockLevel};
    use std::collections::BTreeMap as StdBTreeMap;
    use std::time::Duration;
    use tempfile::tempdir;

    fn fast_policy() -> PlatformPolicy {
        PlatformPolicy::new(
            RetryPolicy::new(3)
                .with_initial_delay(Duration::from_millis(1))
                .without_jitter(),
            TokenBucket::new(100, 1_000.0),
        )
    }

    fn sample(sku: &str, price_minor: i64, stock: u64) -> CanonicalProduct {
        CanonicalProduct {
            sku: Sku::new(sku).unwrap(),
            external_ids: StdBTreeMap::new(),
            title: "Oak chair".into(),
            description: String::new(),
            price: Money::from_minor(price_minor, "PLN").unwrap(),
            tags: vec![],
            stock: Some(StockLevel::Units(stock)),
            variants: vec![],
            updated_at_ms: 0,
        }
    }

    struct Fixture {
        storefront: shopsync_adapter::MockAdapter,
        inventory: shopsync_adapter::MockAdapter,
        store: SnapshotStore,
        audit: MemoryAuditSink,
        cancel: AtomicBool,
        sf_policy: PlatformPolicy,
        inv_policy: PlatformPolicy,
        _temp: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = tempdir().unwrap();
            Self {
                storefront: shopsync_adapter::MockAdapter::new(PlatformId::Storefront),
                inventory: shopsync_adapter::MockAdapter::new(PlatformId::Inventory),
                store: SnapshotStore::open(temp.path()).unwrap(),
                audit: MemoryAuditSink::new(),
                cancel: AtomicBool::new(false),
                sf_policy: fast_policy(),
                inv_policy: fast_policy(),
                _temp: temp,
            }
        }

        fn pipeline(&self) -> ApplyPipeline<'_> {
            ApplyPipeline::new(
                &self.storefront,
                &self.inventory,
                &self.sf_policy,
                &self.inv_policy,
                &self.store,
                &self.audit,
                &self.cancel,
            )
        }
    }

    fn field_work(sku: &str, items: Vec<ApplyItem>) -> EntityWork {
        EntityWork {
            sku: Sku::new(sku).unwrap(),
            action: EntityAction::Fields(items),
        }
    }

    fn price_item(minor: i64, target: Option<PlatformId>) -> ApplyItem {
        ApplyItem {
            field: FieldRef::product(FieldKind::Price),
            value: FieldValue::Money(Money::from_minor(minor, "PLN").unwrap()),
            target,
        }
    }

    fn stock_item(units: u64, target: Option<PlatformId>) -> ApplyItem {
        ApplyItem {
            field: FieldRef::product(FieldKind::Stock),
            value: FieldValue::Stock(StockLevel::Units(units)),
            target,
        }
    }

    #[test]
    fn applies_and_advances_snapshot() {
        let fx = Fixture::new();
        fx.inventory.put_product(sample("CH-100", 19_900, 10));

        let work = vec![field_work(
            "CH-100",
            vec![price_item(21_900, Some(PlatformId::Inventory))],
        )];
        let report = fx.pipeline().execute(work, 1_000).unwrap();

        assert_eq!(report.changes_applied, 1);
        assert_eq!(report.failures, 0);
        let sku = Sku::new("CH-100").unwrap();
        assert_eq!(fx.inventory.product(&sku).unwrap().price.minor(), 21_900);

        let baseline = fx
            .store
            .record(&sku)
            .unwrap()
            .baseline(&FieldRef::product(FieldKind::Price))
            .cloned()
            .unwrap();
        assert_eq!(
            baseline.value,
            FieldValue::Money(Money::from_minor(21_900, "PLN").unwrap())
        );
    }

    #[test]
    fn partial_failure_advances_only_successes() {
        let fx = Fixture::new();
        fx.inventory.put_product(sample("CH-100", 19_900, 10));

        let sku = Sku::new("CH-100").unwrap();
        let stock_field = FieldRef::product(FieldKind::Stock);
        // The stock write is rejected on every attempt.
        fx.inventory.script_outcome(
            &sku,
            &stock_field,
            ApplyOutcome::Rejected {
                reason: "quantity locked".into(),
            },
        );

        let work = vec![field_work(
            "CH-100",
            vec![
                price_item(21_900, Some(PlatformId::Inventory)),
                stock_item(7, Some(PlatformId::Inventory)),
            ],
        )];
        let report = fx.pipeline().execute(work, 1_000).unwrap();

        assert_eq!(report.failures, 1);
        assert_eq!(report.outcomes[0].status, EntityStatus::Partial);

        // Price advanced, stock did not: the next diff will re-surface
        // exactly the stock divergence.
        let record = fx.store.record(&sku).unwrap();
        assert!(record.baseline(&FieldRef::product(FieldKind::Price)).is_some());
        assert!(record.baseline(&stock_field).is_none());
    }

    #[test]
    fn rate_limit_retries_until_applied() {
        let fx = Fixture::new();
        fx.storefront.put_product(sample("CH-100", 19_900, 10));

        let sku = Sku::new("CH-100").unwrap();
        let field = FieldRef::product(FieldKind::Price);
        fx.storefront.script_outcome(
            &sku,
            &field,
            ApplyOutcome::RateLimited {
                retry_after: Some(Duration::from_millis(1)),
            },
        );
        fx.storefront.script_outcome(
            &sku,
            &field,
            ApplyOutcome::RateLimited { retry_after: None },
        );

        let work = vec![field_work(
            "CH-100",
            vec![price_item(21_900, Some(PlatformId::Storefront))],
        )];
        let report = fx.pipeline().execute(work, 1_000).unwrap();

        assert_eq!(report.changes_applied, 1);
        // Two throttled attempts, then the real apply.
        assert_eq!(fx.storefront.applied_log().len(), 1);
    }

    #[test]
    fn rate_limit_exhaustion_is_an_entity_failure() {
        let fx = Fixture::new();
        fx.storefront.put_product(sample("CH-100", 19_900, 10));

        let sku = Sku::new("CH-100").unwrap();
        let field = FieldRef::product(FieldKind::Price);
        for _ in 0..3 {
            fx.storefront.script_outcome(
                &sku,
                &field,
                ApplyOutcome::RateLimited { retry_after: None },
            );
        }

        let work = vec![field_work(
            "CH-100",
            vec![price_item(21_900, Some(PlatformId::Storefront))],
        )];
        let report = fx.pipeline().execute(work, 1_000).unwrap();

        assert_eq!(report.failures, 1);
        assert_eq!(report.outcomes[0].status, EntityStatus::Failed);
        assert!(fx.store.record(&sku).is_none());
    }

    #[test]
    fn not_found_stops_remaining_fields() {
        let fx = Fixture::new();
        // Product exists nowhere on the storefront.

        let work = vec![field_work(
            "CH-100",
            vec![
                price_item(21_900, Some(PlatformId::Storefront)),
                stock_item(7, Some(PlatformId::Storefront)),
            ],
        )];
        let report = fx.pipeline().execute(work, 1_000).unwrap();

        let outcome = &report.outcomes[0];
        assert_eq!(outcome.status, EntityStatus::Failed);
        assert_eq!(outcome.failed.len(), 2);
        assert!(outcome.failed[1].1.contains("skipped"));
    }

    #[test]
    fn authentication_failure_aborts_the_pass() {
        let fx = Fixture::new();
        fx.storefront.put_product(sample("CH-100", 19_900, 10));

        // A wrapper whose writes always fail authentication.
        struct AuthFailing(shopsync_adapter::MockAdapter);
        impl PlatformAdapter for AuthFailing {
            fn platform(&self) -> PlatformId {
                self.0.platform()
            }
            fn fetch_page(
                &self,
                selector: &shopsync_adapter::FetchSelector,
                cursor: Option<&str>,
            ) -> Result<shopsync_adapter::FetchPage, AdapterError> {
                self.0.fetch_page(selector, cursor)
            }
            fn apply_change(
                &self,
                _sku: &Sku,
                _field: &FieldRef,
                _value: &FieldValue,
            ) -> Result<ApplyOutcome, AdapterError> {
                Err(AdapterError::Authentication("expired token".into()))
            }
            fn create_product(
                &self,
                _product: &CanonicalProduct,
            ) -> Result<ApplyOutcome, AdapterError> {
                Err(AdapterError::Authentication("expired token".into()))
            }
            fn is_healthy(&self) -> bool {
                false
            }
        }

        let failing = AuthFailing(fx.storefront.clone());
        let pipeline = ApplyPipeline::new(
            &failing,
            &fx.inventory,
            &fx.sf_policy,
            &fx.inv_policy,
            &fx.store,
            &fx.audit,
            &fx.cancel,
        );

        let work = vec![field_work(
            "CH-100",
            vec![price_item(21_900, Some(PlatformId::Storefront))],
        )];
        let err = pipeline.execute(work, 1_000).unwrap_err();
        assert!(matches!(err, EngineError::FatalConnectivity { .. }));
    }

    #[test]
    fn cancellation_skips_entities() {
        let fx = Fixture::new();
        fx.storefront.put_product(sample("CH-100", 19_900, 10));
        fx.cancel.store(true, Ordering::SeqCst);

        let work = vec![field_work(
            "CH-100",
            vec![price_item(21_900, Some(PlatformId::Storefront))],
        )];
        let report = fx.pipeline().execute(work, 1_000).unwrap();

        assert_eq!(report.outcomes[0].status, EntityStatus::Skipped);
        assert_eq!(report.changes_applied, 0);
        assert!(fx.storefront.applied_log().is_empty());
    }

    #[test]
    fn creation_seeds_baselines() {
        let fx = Fixture::new();
        let product = sample("CH-200", 9_900, 4);

        let work = vec![EntityWork {
            sku: product.sku.clone(),
            action: EntityAction::Create {
                target: PlatformId::Inventory,
                product: product.clone(),
            },
        }];
        let report = fx.pipeline().execute(work, 1_000).unwrap();

        assert_eq!(report.changes_applied, 1);
        assert_eq!(fx.inventory.created_log().len(), 1);

        // Every product field now has a baseline.
        let record = fx.store.record(&product.sku).unwrap();
        assert_eq!(record.fields.len(), product.fields().len());
    }

    #[test]
    fn retirement_tombstones_without_platform_calls() {
        let fx = Fixture::new();
        let sku = Sku::new("CH-100").unwrap();
        fx.store.record_applied(
            &sku,
            &FieldRef::product(FieldKind::Price),
            FieldValue::Money(Money::from_minor(19_900, "PLN").unwrap()),
            100,
        );

        let work = vec![EntityWork {
            sku: sku.clone(),
            action: EntityAction::Retire,
        }];
        fx.pipeline().execute(work, 1_000).unwrap();

        assert!(fx.store.is_retired(&sku));
        assert!(fx.storefront.applied_log().is_empty());
        assert!(fx.inventory.applied_log().is_empty());
    }

    #[test]
    fn idempotent_reapply_changes_nothing() {
        let fx = Fixture::new();
        fx.inventory.put_product(sample("CH-100", 19_900, 10));

        let work = vec![field_work(
            "CH-100",
            vec![price_item(21_900, Some(PlatformId::Inventory))],
        )];
        fx.pipeline().execute(work.clone(), 1_000).unwrap();

        let sku = Sku::new("CH-100").unwrap();
        let version_after_first = fx.store.record(&sku).unwrap().version;
        let log_after_first = fx.inventory.applied_log().len();

        // Re-running the same work (as a crashed-and-retried pass would)
        // issues the same absolute set: the platform ends up in the same
        // state and the snapshot record does not change at all.
        fx.pipeline().execute(work, 2_000).unwrap();
        assert_eq!(fx.inventory.product(&sku).unwrap().price.minor(), 21_900);
        assert_eq!(fx.inventory.applied_log().len(), log_after_first + 1);
        assert_eq!(fx.store.record(&sku).unwrap().version, version_after_first);
    }

    #[test]
    fn plan_groups_and_orders_fields() {
        let sku = Sku::new("CH-100").unwrap();
        let changes = vec![
            ChangeRecord {
                sku: sku.clone(),
                field: Some(FieldRef::product(FieldKind::Title)),
                kind: ChangeKind::FieldUpdate,
                old: None,
                new: Some(FieldValue::Text("Oak chair".into())),
                source: ChangeSource::Platform(PlatformId::Storefront),
                source_updated_at_ms: 1,
                detected_at_ms: 1,
            },
            ChangeRecord {
                sku: sku.clone(),
                field: Some(FieldRef::product(FieldKind::Price)),
                kind: ChangeKind::FieldUpdate,
                old: None,
                new: Some(FieldValue::Money(Money::from_minor(100, "PLN").unwrap())),
                source: ChangeSource::Platform(PlatformId::Inventory),
                source_updated_at_ms: 1,
                detected_at_ms: 1,
            },
        ];

        let work = plan(&changes, &[]);
        assert_eq!(work.len(), 1);
        let EntityAction::Fields(items) = &work[0].action else {
            panic!("expected field work");
        };
        // Price precedes title regardless of input order.
        assert_eq!(items[0].field.kind, FieldKind::Price);
        assert_eq!(items[1].field.kind, FieldKind::Title);
        // A storefront-sourced change targets inventory and vice versa.
        assert_eq!(items[0].target, Some(PlatformId::Storefront));
        assert_eq!(items[1].target, Some(PlatformId::Inventory));
    }
}
