//! Canonical products and variants.

use crate::error::{ModelError, ModelResult};
use crate::field::{FieldKind, FieldRef, FieldValue};
use crate::platform::PlatformId;
use crate::sku::{Sku, VariantSku};
use crate::value::{Money, StockLevel};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A variant of a canonical product.
///
/// Variants are owned by exactly one product and share its lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalVariant {
    /// Variant SKU, unique within the owning product.
    pub sku: VariantSku,
    /// Selling price of this variant.
    pub price: Money,
    /// Stock on hand for this variant.
    pub stock: StockLevel,
    /// Ordered attribute pairs (e.g. `[("Color", "Red"), ("Size", "L")]`).
    pub attributes: Vec<(String, String)>,
    /// Platform-reported last modification, epoch milliseconds.
    pub updated_at_ms: u64,
}

/// A platform-agnostic product as the engine sees it.
///
/// The SKU is the identity; external platform IDs are a lookup cache that can
/// be rebuilt from fetches at any time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalProduct {
    /// Stable product SKU.
    pub sku: Sku,
    /// Known external IDs per platform.
    pub external_ids: BTreeMap<PlatformId, String>,
    /// Product title.
    pub title: String,
    /// Product description.
    pub description: String,
    /// Product-level price.
    pub price: Money,
    /// Product tags.
    pub tags: Vec<String>,
    /// Product-level stock for simple products; `None` when stock is tracked
    /// per variant.
    pub stock: Option<StockLevel>,
    /// Owned variants.
    pub variants: Vec<CanonicalVariant>,
    /// Platform-reported last modification, epoch milliseconds.
    pub updated_at_ms: u64,
}

impl CanonicalProduct {
    /// Validates internal invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::DuplicateVariant`] if two variants share a SKU.
    pub fn validate(&self) -> ModelResult<()> {
        let mut seen = BTreeSet::new();
        for variant in &self.variants {
            if !seen.insert(&variant.sku) {
                return Err(ModelError::DuplicateVariant {
                    product: self.sku.to_string(),
                    variant: variant.sku.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Looks up a variant by SKU.
    #[must_use]
    pub fn variant(&self, sku: &VariantSku) -> Option<&CanonicalVariant> {
        self.variants.iter().find(|v| &v.sku == sku)
    }

    /// Returns the current value of a tracked field, if the field exists on
    /// this product.
    #[must_use]
    pub fn field(&self, field: &FieldRef) -> Option<FieldValue> {
        match &field.variant {
            None => match field.kind {
                FieldKind::Price => Some(FieldValue::Money(self.price.clone())),
                FieldKind::Stock => self.stock.map(FieldValue::Stock),
                FieldKind::Title => Some(FieldValue::Text(self.title.clone())),
                FieldKind::Description => Some(FieldValue::Text(self.description.clone())),
                FieldKind::Tags => Some(FieldValue::Tags(self.tags.clone())),
                FieldKind::Attributes => None,
            },
            Some(vsku) => {
                let variant = self.variant(vsku)?;
                match field.kind {
                    FieldKind::Price => Some(FieldValue::Money(variant.price.clone())),
                    FieldKind::Stock => Some(FieldValue::Stock(variant.stock)),
                    FieldKind::Attributes => {
                        Some(FieldValue::Attributes(variant.attributes.clone()))
                    }
                    _ => None,
                }
            }
        }
    }

    /// Enumerates every tracked field with its canonicalized value, ordered
    /// by apply precedence.
    #[must_use]
    pub fn fields(&self) -> BTreeMap<FieldRef, FieldValue> {
        let mut out = BTreeMap::new();
        out.insert(
            FieldRef::product(FieldKind::Price),
            FieldValue::Money(self.price.clone()).canonicalize(),
        );
        if let Some(stock) = self.stock {
            out.insert(
                FieldRef::product(FieldKind::Stock),
                FieldValue::Stock(stock).canonicalize(),
            );
        }
        out.insert(
            FieldRef::product(FieldKind::Title),
            FieldValue::Text(self.title.clone()).canonicalize(),
        );
        out.insert(
            FieldRef::product(FieldKind::Description),
            FieldValue::Text(self.description.clone()).canonicalize(),
        );
        out.insert(
            FieldRef::product(FieldKind::Tags),
            FieldValue::Tags(self.tags.clone()).canonicalize(),
        );
        for variant in &self.variants {
            out.insert(
                FieldRef::variant(FieldKind::Price, variant.sku.clone()),
                FieldValue::Money(variant.price.clone()).canonicalize(),
            );
            out.insert(
                FieldRef::variant(FieldKind::Stock, variant.sku.clone()),
                FieldValue::Stock(variant.stock).canonicalize(),
            );
            out.insert(
                FieldRef::variant(FieldKind::Attributes, variant.sku.clone()),
                FieldValue::Attributes(variant.attributes.clone()).canonicalize(),
            );
        }
        out
    }

    /// Returns the platform-reported modification time for a field, falling
    /// back to the product timestamp for product-level fields.
    #[must_use]
    pub fn field_updated_at_ms(&self, field: &FieldRef) -> u64 {
        match &field.variant {
            None => self.updated_at_ms,
            Some(vsku) => self
                .variant(vsku)
                .map_or(self.updated_at_ms, |v| v.updated_at_ms),
        }
    }
}
