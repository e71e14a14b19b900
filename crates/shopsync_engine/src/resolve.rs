//! The conflict resolver.
//!
//! A state-free policy table over a pair of change records. Rules are
//! evaluated in order and the first match wins:
//!
//! 1. stock: the numerically lower value wins (conservative, avoids
//!    overselling; "unlimited" counts as higher than any number)
//! 2. price: the inventory platform wins (pricing authority by business
//!    rule, regardless of timestamps)
//! 3. descriptive fields: the most recently modified source wins by
//!    platform-reported timestamp; exact ties are deferred
//! 4. anything else: deferred for manual review, no automatic write

use crate::change::{ChangeRecord, FieldConflict};
use serde::Serialize;
use shopsync_model::{FieldKind, FieldRef, FieldValue, Sku};
use tracing::debug;

/// Which policy rule decided a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResolutionPolicy {
    /// Lower stock value wins.
    ConservativeStock,
    /// Inventory platform wins on price.
    PriceAuthority,
    /// Most recently modified source wins.
    LatestWrite,
    /// No rule applied; manual review required.
    Deferred,
}

/// The outcome of resolving one conflict.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DecisionOutcome {
    /// Resolved automatically; the winning record is applied this run.
    Auto {
        /// The winning change.
        winner: ChangeRecord,
        /// The rule that picked it.
        policy: ResolutionPolicy,
    },
    /// Deferred for manual review; excluded from this run's apply set and
    /// re-evaluated next run against the unchanged baseline.
    Deferred {
        /// Why no rule applied.
        reason: String,
    },
}

/// A resolved (or deferred) conflict.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictDecision {
    /// The product SKU.
    pub sku: Sku,
    /// The contested field.
    pub field: FieldRef,
    /// The storefront's change.
    pub storefront: ChangeRecord,
    /// The inventory platform's change.
    pub inventory: ChangeRecord,
    /// What the policy table decided.
    pub outcome: DecisionOutcome,
}

impl ConflictDecision {
    /// Returns the winning record if the conflict auto-resolved.
    #[must_use]
    pub fn winner(&self) -> Option<&ChangeRecord> {
        match &self.outcome {
            DecisionOutcome::Auto { winner, .. } => Some(winner),
            DecisionOutcome::Deferred { .. } => None,
        }
    }

    /// Returns true if the conflict was deferred.
    #[must_use]
    pub fn is_deferred(&self) -> bool {
        matches!(self.outcome, DecisionOutcome::Deferred { .. })
    }
}

/// Applies the policy table to contested fields.
#[derive(Debug, Default)]
pub struct ConflictResolver;

impl ConflictResolver {
    /// Creates a resolver.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Resolves one contested field.
    #[must_use]
    pub fn resolve(&self, conflict: &FieldConflict) -> ConflictDecision {
        let outcome = self.decide(conflict);
        if let DecisionOutcome::Auto { policy, .. } = &outcome {
            debug!(sku = %conflict.sku, field = %conflict.field, ?policy, "conflict auto-resolved");
        } else {
            debug!(sku = %conflict.sku, field = %conflict.field, "conflict deferred");
        }
        ConflictDecision {
            sku: conflict.sku.clone(),
            field: conflict.field.clone(),
            storefront: conflict.storefront.clone(),
            inventory: conflict.inventory.clone(),
            outcome,
        }
    }

    fn decide(&self, conflict: &FieldConflict) -> DecisionOutcome {
        match conflict.field.kind {
            FieldKind::Stock => self.decide_stock(conflict),
            FieldKind::Price => DecisionOutcome::Auto {
                winner: conflict.inventory.clone(),
                policy: ResolutionPolicy::PriceAuthority,
            },
            kind if kind.is_descriptive() => self.decide_by_timestamp(conflict),
            _ => DecisionOutcome::Deferred {
                reason: format!("no policy covers field kind {}", conflict.field.kind),
            },
        }
    }

    fn decide_stock(&self, conflict: &FieldConflict) -> DecisionOutcome {
        let (sf, inv) = match (&conflict.storefront.new, &conflict.inventory.new) {
            (Some(FieldValue::Stock(sf)), Some(FieldValue::Stock(inv))) => (*sf, *inv),
            _ => {
                return DecisionOutcome::Deferred {
                    reason: "stock conflict with non-stock values".into(),
                }
            }
        };

        let winner = if sf.min(inv) == sf {
            conflict.storefront.clone()
        } else {
            conflict.inventory.clone()
        };
        DecisionOutcome::Auto {
            winner,
            policy: ResolutionPolicy::ConservativeStock,
        }
    }

    fn decide_by_timestamp(&self, conflict: &FieldConflict) -> DecisionOutcome {
        let sf_at = conflict.storefront.source_updated_at_ms;
        let inv_at = conflict.inventory.source_updated_at_ms;

        if sf_at > inv_at {
            DecisionOutcome::Auto {
                winner: conflict.storefront.clone(),
                policy: ResolutionPolicy::LatestWrite,
            }
        } else if inv_at > sf_at {
            DecisionOutcome::Auto {
                winner: conflict.inventory.clone(),
                policy: ResolutionPolicy::LatestWrite,
            }
        } else {
            DecisionOutcome::Deferred {
                reason: format!(
                    "both platforms modified {} at the same reported time",
                    conflict.field
                ),
            }
        }
    }
}
