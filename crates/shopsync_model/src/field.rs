//! Field identities and canonical field values.
//!
//! A [`FieldRef`] names one tracked field of an entity: either a product-level
//! field or a field of one variant. Field ordering doubles as the apply
//! precedence: price before stock before descriptive fields, so a partially
//! applied entity is always left in an explainable state.

use crate::sku::VariantSku;
use crate::value::{normalize_tags, normalize_text, Money, StockLevel};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// The kind of a tracked field.
///
/// Declaration order is the apply precedence within one entity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum FieldKind {
    /// Selling price (product-level or per variant).
    Price,
    /// Stock quantity (product-level for simple products, or per variant).
    Stock,
    /// Product title.
    Title,
    /// Product description.
    Description,
    /// Product tags.
    Tags,
    /// Variant attributes (size, color, ...).
    Attributes,
}

impl FieldKind {
    /// Returns a stable lowercase name, used in logs and audit records.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Price => "price",
            FieldKind::Stock => "stock",
            FieldKind::Title => "title",
            FieldKind::Description => "description",
            FieldKind::Tags => "tags",
            FieldKind::Attributes => "attributes",
        }
    }

    /// Returns true for fields resolved by the descriptive-field policy
    /// (most-recently-modified source wins).
    #[must_use]
    pub fn is_descriptive(&self) -> bool {
        matches!(
            self,
            FieldKind::Title | FieldKind::Description | FieldKind::Tags | FieldKind::Attributes
        )
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Names one tracked field of an entity.
///
/// The derived ordering sorts by kind first, then by variant, which is
/// exactly the apply precedence: all prices, then all stock levels, then
/// descriptive fields.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FieldRef {
    /// The field kind.
    pub kind: FieldKind,
    /// The variant the field belongs to, or `None` for product-level fields.
    pub variant: Option<VariantSku>,
}

impl FieldRef {
    /// A product-level field.
    #[must_use]
    pub fn product(kind: FieldKind) -> Self {
        Self {
            kind,
            variant: None,
        }
    }

    /// A field of one variant.
    #[must_use]
    pub fn variant(kind: FieldKind, variant: VariantSku) -> Self {
        Self {
            kind,
            variant: Some(variant),
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.variant {
            Some(v) => write!(f, "{}/{}", v, self.kind),
            None => f.write_str(self.kind.as_str()),
        }
    }
}

/// A canonical field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// A monetary amount.
    Money(Money),
    /// A stock level.
    Stock(StockLevel),
    /// Free text (title, description).
    Text(String),
    /// A tag list.
    Tags(Vec<String>),
    /// Ordered attribute pairs.
    Attributes(Vec<(String, String)>),
}

impl FieldValue {
    /// Returns the value with normalization applied.
    ///
    /// Text is CRLF/whitespace-normalized and tags are sorted and
    /// deduplicated. Money and stock are already canonical by construction.
    #[must_use]
    pub fn canonicalize(self) -> Self {
        match self {
            FieldValue::Text(t) => FieldValue::Text(normalize_text(&t)),
            FieldValue::Tags(t) => FieldValue::Tags(normalize_tags(&t)),
            other => other,
        }
    }

    /// Computes the SHA-256 content hash of the canonicalized value.
    ///
    /// The hash is over a tagged canonical encoding, so values that differ
    /// only in formatting ("219.0" vs "219.00", trailing whitespace) hash
    /// identically and never produce spurious change records.
    #[must_use]
    pub fn content_hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        match self.clone().canonicalize() {
            FieldValue::Money(m) => {
                hasher.update(b"money\0");
                hasher.update(m.minor().to_le_bytes());
                hasher.update(m.currency().as_bytes());
            }
            FieldValue::Stock(StockLevel::Unlimited) => {
                hasher.update(b"stock\0unlimited");
            }
            FieldValue::Stock(StockLevel::Units(n)) => {
                hasher.update(b"stock\0");
                hasher.update(n.to_le_bytes());
            }
            FieldValue::Text(t) => {
                hasher.update(b"text\0");
                hasher.update(t.as_bytes());
            }
            FieldValue::Tags(tags) => {
                hasher.update(b"tags\0");
                for tag in &tags {
                    hasher.update(tag.as_bytes());
                    hasher.update([0u8]);
                }
            }
            FieldValue::Attributes(attrs) => {
                hasher.update(b"attrs\0");
                for (k, v) in &attrs {
                    hasher.update(k.as_bytes());
                    hasher.update([1u8]);
                    hasher.update(v.as_bytes());
                    hasher.update([0u8]);
                }
            }
        }
        hasher.finalize().into()
    }

    /// Returns true if this value is of the kind expected for `kind`.
    #[must_use]
    pub fn matches_kind(&self, kind: FieldKind) -> bool {
        matches!(
            (self, kind),
            (FieldValue::Money(_), FieldKind::Price)
                | (FieldValue::Stock(_), FieldKind::Stock)
                | (FieldValue::Text(_), FieldKind::Title)
                | (FieldValue::Text(_), FieldKind::Description)
                | (FieldValue::Tags(_), FieldKind::Tags)
                | (FieldValue::Attributes(_), FieldKind::Attributes)
        )
    }

    /// Returns a short name for the value kind, used in error messages.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            FieldValue::Money(_) => "money",
            FieldValue::Stock(_) => "stock",
            FieldValue::Text(_) => "text",
            FieldValue::Tags(_) => "tags",
            FieldValue::Attributes(_) => "attributes",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn precedence_orders_price_before_stock_before_descriptive() {
        let red = VariantSku::new("CH-100-RED").unwrap();
        let mut fields = vec![
            FieldRef::product(FieldKind::Tags),
            FieldRef::variant(FieldKind::Stock, red.clone()),
            FieldRef::product(FieldKind::Title),
            FieldRef::variant(FieldKind::Price, red.clone()),
            FieldRef::product(FieldKind::Price),
        ];
        fields.sort();

        assert_eq!(fields[0], FieldRef::product(FieldKind::Price));
        assert_eq!(fields[1], FieldRef::variant(FieldKind::Price, red.clone()));
        assert_eq!(fields[2], FieldRef::variant(FieldKind::Stock, red));
        assert_eq!(fields[3], FieldRef::product(FieldKind::Title));
        assert_eq!(fields[4], FieldRef::product(FieldKind::Tags));
    }

    #[test]
    fn formatting_differences_hash_identically() {
        let a = FieldValue::Money(Money::parse("199.0", "PLN").unwrap());
        let b = FieldValue::Money(Money::parse("199.00", "PLN").unwrap());
        assert_eq!(a.content_hash(), b.content_hash());

        let a = FieldValue::Text("Oak chair  ".into());
        let b = FieldValue::Text("Oak chair".into());
        assert_eq!(a.content_hash(), b.content_hash());

        let a = FieldValue::Tags(vec!["oak".into(), "chairs".into()]);
        let b = FieldValue::Tags(vec!["chairs".into(), "oak".into(), "oak".into()]);
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn different_values_hash_differently() {
        let a = FieldValue::Money(Money::parse("199.00", "PLN").unwrap());
        let b = FieldValue::Money(Money::parse("219.00", "PLN").unwrap());
        assert_ne!(a.content_hash(), b.content_hash());

        let a = FieldValue::Stock(StockLevel::Units(10));
        let b = FieldValue::Stock(StockLevel::Units(7));
        assert_ne!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn value_kinds_do_not_collide_in_hashing() {
        // A text value must never hash like a tag list with one tag.
        let text = FieldValue::Text("oak".into());
        let tags = FieldValue::Tags(vec!["oak".into()]);
        assert_ne!(text.content_hash(), tags.content_hash());
    }

    #[test]
    fn kind_matching() {
        let price = FieldValue::Money(Money::from_minor(100, "EUR").unwrap());
        assert!(price.matches_kind(FieldKind::Price));
        assert!(!price.matches_kind(FieldKind::Stock));

        let text = FieldValue::Text("t".into());
        assert!(text.matches_kind(FieldKind::Title));
        assert!(text.matches_kind(FieldKind::Description));
        assert!(!text.matches_kind(FieldKind::Tags));
    }

    proptest! {
        #[test]
        fn hash_is_stable_under_canonicalization(raw in "\\PC{0,64}") {
            let v = FieldValue::Text(raw);
            let canon = v.clone().canonicalize();
            prop_assert_eq!(v.content_hash(), canon.content_hash());
        }

        #[test]
        fn tag_order_never_affects_hash(tags in proptest::collection::vec("[a-z]{1,8}", 0..6)) {
            let mut reversed = tags.clone();
            reversed.reverse();
            let a = FieldValue::Tags(tags);
            let b = FieldValue::Tags(reversed);
            prop_assert_eq!(a.content_hash(), b.content_hash());
        }
    }
}
