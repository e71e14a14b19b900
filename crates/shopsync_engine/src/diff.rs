//! The diff engine.
//!
//! Compares the current state of both platforms against the snapshot
//! baseline and produces field-level change records tagged with provenance.
//! All comparison goes through content hashes over canonicalized values, so
//! formatting-only differences never register as changes.

use crate::change::{ChangeKind, ChangeRecord, ChangeSet, ChangeSource, FieldConflict};
use shopsync_model::{CanonicalProduct, FieldRef, FieldValue, PlatformId, Sku};
use shopsync_store::SnapshotRecord;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Computes the divergence between the snapshot baseline and both platforms.
#[derive(Debug, Default)]
pub struct DiffEngine;

impl DiffEngine {
    /// Creates a diff engine.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Diffs one pass worth of state.
    ///
    /// For every SKU present in the snapshot or on either platform:
    /// - changed on one platform → one record sourced to that platform
    /// - changed on both to the same value → one record sourced to `Both`
    /// - changed on both to different values → a [`FieldConflict`]
    /// - in the snapshot, absent from both platforms → a retirement record
    /// - absent from the snapshot, present on one platform → a creation
    ///   record targeting the other platform
    #[must_use]
    pub fn diff(
        &self,
        snapshot: &BTreeMap<Sku, SnapshotRecord>,
        storefront: &[CanonicalProduct],
        inventory: &[CanonicalProduct],
        detected_at_ms: u64,
    ) -> ChangeSet {
        let storefront: BTreeMap<&Sku, &CanonicalProduct> =
            storefront.iter().map(|p| (&p.sku, p)).collect();
        let inventory: BTreeMap<&Sku, &CanonicalProduct> =
            inventory.iter().map(|p| (&p.sku, p)).collect();

        let mut skus: BTreeSet<&Sku> = BTreeSet::new();
        skus.extend(snapshot.keys());
        skus.extend(storefront.keys());
        skus.extend(inventory.keys());

        let mut set = ChangeSet::default();
        set.stats.skus_seen = skus.len();

        for sku in skus {
            let record = snapshot.get(sku);
            let sf = storefront.get(sku).copied();
            let inv = inventory.get(sku).copied();

            match (record, sf, inv) {
                // Gone from both platforms while the snapshot still tracks
                // it as live: retirement.
                (Some(record), None, None) => {
                    if !record.retired {
                        set.stats.retirements += 1;
                        set.changes.push(ChangeRecord {
                            sku: sku.clone(),
                            field: None,
                            kind: ChangeKind::Retirement,
                            old: None,
                            new: None,
                            source: ChangeSource::Both,
                            source_updated_at_ms: detected_at_ms,
                            detected_at_ms,
                        });
                    }
                }

                // Never reconciled and only one platform knows the SKU:
                // create it on the other side.
                (None, Some(product), None) => {
                    set.stats.creations += 1;
                    set.changes.push(creation(product, PlatformId::Inventory, detected_at_ms));
                }
                (None, None, Some(product)) => {
                    set.stats.creations += 1;
                    set.changes.push(creation(product, PlatformId::Storefront, detected_at_ms));
                }

                (None, None, None) => unreachable!("sku came from one of the maps"),

                // Everything else is compared field by field against the
                // baseline (an absent baseline means every reported field
                // counts as changed, which covers first reconciliation).
                (record, sf, inv) => {
                    self.diff_fields(sku, record, sf, inv, detected_at_ms, &mut set);
                }
            }
        }

        info!(
            skus = set.stats.skus_seen,
            changed = set.stats.fields_changed,
            conflicts = set.stats.conflicts,
            creations = set.stats.creations,
            retirements = set.stats.retirements,
            "diff complete"
        );
        set
    }

    fn diff_fields(
        &self,
        sku: &Sku,
        record: Option<&SnapshotRecord>,
        sf: Option<&CanonicalProduct>,
        inv: Option<&CanonicalProduct>,
        detected_at_ms: u64,
        set: &mut ChangeSet,
    ) {
        let sf_fields = sf.map(CanonicalProduct::fields).unwrap_or_default();
        let inv_fields = inv.map(CanonicalProduct::fields).unwrap_or_default();

        let mut fields: BTreeSet<&FieldRef> = BTreeSet::new();
        fields.extend(sf_fields.keys());
        fields.extend(inv_fields.keys());
        if let Some(record) = record {
            fields.extend(record.fields.keys());
        }

        for field in fields {
            let baseline = record.and_then(|r| r.baseline(field));
            let baseline_hash = baseline.map(|b| b.hash);

            let sf_value = sf_fields.get(field);
            let inv_value = inv_fields.get(field);

            let sf_changed = changed_against(sf_value, baseline_hash);
            let inv_changed = changed_against(inv_value, baseline_hash);

            match (sf_changed, inv_changed) {
                (None, None) => {}
                (Some(value), None) => {
                    set.stats.fields_changed += 1;
                    set.changes.push(field_update(
                        sku,
                        field,
                        baseline.map(|b| b.value.clone()),
                        value.clone(),
                        ChangeSource::Platform(PlatformId::Storefront),
                        updated_at(sf, field, detected_at_ms),
                        detected_at_ms,
                    ));
                }
                (None, Some(value)) => {
                    set.stats.fields_changed += 1;
                    set.changes.push(field_update(
                        sku,
                        field,
                        baseline.map(|b| b.value.clone()),
                        value.clone(),
                        ChangeSource::Platform(PlatformId::Inventory),
                        updated_at(inv, field, detected_at_ms),
                        detected_at_ms,
                    ));
                }
                (Some(sf_value), Some(inv_value)) => {
                    if sf_value.content_hash() == inv_value.content_hash() {
                        // Same new value on both sides: no conflict, only a
                        // baseline advancement.
                        set.stats.fields_changed += 1;
                        set.changes.push(field_update(
                            sku,
                            field,
                            baseline.map(|b| b.value.clone()),
                            sf_value.clone(),
                            ChangeSource::Both,
                            updated_at(sf, field, detected_at_ms)
                                .max(updated_at(inv, field, detected_at_ms)),
                            detected_at_ms,
                        ));
                    } else {
                        set.stats.conflicts += 1;
                        debug!(%sku, %field, "field contested by both platforms");
                        set.conflicts.push(FieldConflict {
                            sku: sku.clone(),
                            field: field.clone(),
                            storefront: field_update(
                                sku,
                                field,
                                baseline.map(|b| b.value.clone()),
                                sf_value.clone(),
                                ChangeSource::Platform(PlatformId::Storefront),
                                updated_at(sf, field, detected_at_ms),
                                detected_at_ms,
                            ),
                            inventory: field_update(
                                sku,
                                field,
                                baseline.map(|b| b.value.clone()),
                                inv_value.clone(),
                                ChangeSource::Platform(PlatformId::Inventory),
                                updated_at(inv, field, detected_at_ms),
                                detected_at_ms,
                            ),
                        });
                    }
                }
            }
        }
    }
}

/// Returns the reported value if it diverges from the baseline hash.
fn changed_against<'a>(
    value: Option<&'a FieldValue>,
    baseline_hash: Option<[u8; 32]>,
) -> Option<&'a FieldValue> {
    let value = value?;
    match baseline_hash {
        Some(hash) if value.content_hash() == hash => None,
        _ => Some(value),
    }
}

fn updated_at(product: Option<&CanonicalProduct>, field: &FieldRef, fallback: u64) -> u64 {
    product.map_or(fallback, |p| p.field_updated_at_ms(field))
}

fn field_update(
    sku: &Sku,
    field: &FieldRef,
    old: Option<FieldValue>,
    new: FieldValue,
    source: ChangeSource,
    source_updated_at_ms: u64,
    detected_at_ms: u64,
) -> ChangeRecord {
    ChangeRecord {
        sku: sku.clone(),
        field: Some(field.clone()),
        kind: ChangeKind::FieldUpdate,
        old,
        new: Some(new),
        source,
        source_updated_at_ms,
        detected_at_ms,
    }
}

fn creation(product: &CanonicalProduct, target: PlatformId, detected_at_ms: u64) -> ChangeRecord {
    ChangeRecord {
        sku: product.sku.clone(),
        field: None,
        kind: ChangeKind::Creation {
            target,
            product: Box::new(product.clone()),
        },
        old: None,
        new: None,
        source: ChangeSource::Platform(target.other()),
        source_updated_at_ms: product.updated_at_ms,
        detected_at_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopsync_model::{FieldKind, Money, StockLevel};

    fn product(sku: &str, price_minor: i64, stock: u64, updated_at_ms: u64) -> CanonicalProduct {
        CanonicalProduct {
            sku: Sku::new(sku).unwrap(),
            external_ids: BTreeMap::new(),
            title: "Oak chair".into(),
            description: "A chair".into(),
            price: Money::from_minor(price_minor, "PLN").unwrap(),
            tags: vec!["chairs".into()],
            stock: Some(StockLevel::Units(stock)),
            variants: vec![],
            updated_at_ms,
        }
    }

    /// Builds a snapshot that exactly matches the given product.
    fn snapshot_of(products: &[CanonicalProduct]) -> BTreeMap<Sku, SnapshotRecord> {
        let mut map = BTreeMap::new();
        for p in products {
            let mut record = SnapshotRecord::new(p.sku.clone());
            for (field, value) in p.fields() {
                record.advance(field, value, 1);
            }
            map.insert(p.sku.clone(), record);
        }
        map
    }

    #[test]
    fn identical_states_produce_no_changes() {
        let base = product("CH-100", 19_900, 10, 100);
        let snapshot = snapshot_of(&[base.clone()]);

        let set = DiffEngine::new().diff(&snapshot, &[base.clone()], &[base], 500);
        assert!(set.is_empty());
        assert_eq!(set.stats.skus_seen, 1);
    }

    #[test]
    fn single_platform_change_is_sourced_to_it() {
        let base = product("CH-100", 19_900, 10, 100);
        let snapshot = snapshot_of(&[base.clone()]);

        let mut changed = base.clone();
        changed.price = Money::from_minor(21_900, "PLN").unwrap();
        changed.updated_at_ms = 900;

        let set = DiffEngine::new().diff(&snapshot, &[changed], &[base], 1_000);
        assert_eq!(set.changes.len(), 1);
        assert!(set.conflicts.is_empty());

        let change = &set.changes[0];
        assert_eq!(change.field, Some(FieldRef::product(FieldKind::Price)));
        assert_eq!(
            change.source,
            ChangeSource::Platform(PlatformId::Storefront)
        );
        assert_eq!(change.source_updated_at_ms, 900);
        assert_eq!(
            change.old,
            Some(FieldValue::Money(Money::from_minor(19_900, "PLN").unwrap()))
        );
        assert_eq!(
            change.new,
            Some(FieldValue::Money(Money::from_minor(21_900, "PLN").unwrap()))
        );
    }

    #[test]
    fn same_value_on_both_sides_is_not_a_conflict() {
        let base = product("CH-100", 19_900, 10, 100);
        let snapshot = snapshot_of(&[base.clone()]);

        let mut sf = base.clone();
        sf.stock = Some(StockLevel::Units(7));
        let mut inv = base;
        inv.stock = Some(StockLevel::Units(7));

        let set = DiffEngine::new().diff(&snapshot, &[sf], &[inv], 1_000);
        assert!(set.conflicts.is_empty());
        assert_eq!(set.changes.len(), 1);
        assert_eq!(set.changes[0].source, ChangeSource::Both);
        // A `Both` change needs no platform write.
        assert_eq!(set.changes[0].source.apply_target(), None);
    }

    #[test]
    fn different_values_on_both_sides_conflict() {
        let base = product("CH-100", 19_900, 10, 100);
        let snapshot = snapshot_of(&[base.clone()]);

        let mut sf = base.clone();
        sf.stock = Some(StockLevel::Units(5));
        let mut inv = base;
        inv.stock = Some(StockLevel::Units(3));

        let set = DiffEngine::new().diff(&snapshot, &[sf], &[inv], 1_000);
        assert!(set.changes.is_empty());
        assert_eq!(set.conflicts.len(), 1);

        let conflict = &set.conflicts[0];
        assert_eq!(conflict.field, FieldRef::product(FieldKind::Stock));
        assert_eq!(
            conflict.storefront.new,
            Some(FieldValue::Stock(StockLevel::Units(5)))
        );
        assert_eq!(
            conflict.inventory.new,
            Some(FieldValue::Stock(StockLevel::Units(3)))
        );
    }

    #[test]
    fn formatting_differences_are_invisible() {
        let base = product("CH-100", 19_900, 10, 100);
        let snapshot = snapshot_of(&[base.clone()]);

        // Same title with trailing whitespace; same price reported with
        // different string precision upstream would already be normalized by
        // the adapters, but whitespace survives to the model level.
        let mut sf = base.clone();
        sf.title = "Oak chair  ".into();

        let set = DiffEngine::new().diff(&snapshot, &[sf], &[base], 1_000);
        assert!(set.is_empty());
    }

    #[test]
    fn retirement_emitted_once() {
        let base = product("CH-100", 19_900, 10, 100);
        let mut snapshot = snapshot_of(&[base]);

        let set = DiffEngine::new().diff(&snapshot, &[], &[], 1_000);
        assert_eq!(set.stats.retirements, 1);
        assert!(matches!(set.changes[0].kind, ChangeKind::Retirement));

        // Once tombstoned, subsequent passes stay silent.
        snapshot
            .get_mut(&Sku::new("CH-100").unwrap())
            .unwrap()
            .retire(1_000);
        let set = DiffEngine::new().diff(&snapshot, &[], &[], 2_000);
        assert!(set.is_empty());
        assert_eq!(set.stats.retirements, 0);
    }

    #[test]
    fn unknown_sku_on_one_platform_is_a_creation() {
        let snapshot = BTreeMap::new();
        let sf_only = product("CH-200", 9_900, 4, 100);

        let set = DiffEngine::new().diff(&snapshot, &[sf_only], &[], 1_000);
        assert_eq!(set.stats.creations, 1);
        match &set.changes[0].kind {
            ChangeKind::Creation { target, product } => {
                assert_eq!(*target, PlatformId::Inventory);
                assert_eq!(product.sku.as_str(), "CH-200");
            }
            other => panic!("expected creation, got {other:?}"),
        }
    }

    #[test]
    fn first_reconciliation_with_agreement_seeds_baselines() {
        // Present on both platforms, absent from the snapshot: agreeing
        // fields become `Both` changes (baseline seeds), disagreeing fields
        // become conflicts.
        let snapshot = BTreeMap::new();
        let sf = product("CH-100", 19_900, 10, 100);
        let mut inv = product("CH-100", 19_900, 10, 100);
        inv.title = "Oak chair deluxe".into();

        let set = DiffEngine::new().diff(&snapshot, &[sf], &[inv], 1_000);
        assert_eq!(set.conflicts.len(), 1);
        assert_eq!(set.conflicts[0].field, FieldRef::product(FieldKind::Title));
        assert!(set
            .changes
            .iter()
            .all(|c| c.source == ChangeSource::Both));
        // price, stock, description, tags agree.
        assert_eq!(set.changes.len(), 4);
    }

    #[test]
    fn end_to_end_scenario_changes() {
        // Baseline: price 199.00, stock 10. Platform A (storefront) reports
        // price 219.00; platform B (inventory) reports stock 7.
        let base = product("CH-100", 19_900, 10, 100);
        let snapshot = snapshot_of(&[base.clone()]);

        let mut sf = base.clone();
        sf.price = Money::from_minor(21_900, "PLN").unwrap();
        let mut inv = base;
        inv.stock = Some(StockLevel::Units(7));

        let set = DiffEngine::new().diff(&snapshot, &[sf], &[inv], 1_000);
        assert!(set.conflicts.is_empty());
        assert_eq!(set.changes.len(), 2);

        let price = set
            .changes
            .iter()
            .find(|c| c.field == Some(FieldRef::product(FieldKind::Price)))
            .unwrap();
        assert_eq!(
            price.source,
            ChangeSource::Platform(PlatformId::Storefront)
        );

        let stock = set
            .changes
            .iter()
            .find(|c| c.field == Some(FieldRef::product(FieldKind::Stock)))
            .unwrap();
        assert_eq!(stock.source, ChangeSource::Platform(PlatformId::Inventory));
    }
}
