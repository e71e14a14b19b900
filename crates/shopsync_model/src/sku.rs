//! SKU newtypes.
//!
//! SKUs are the durable join key across platforms. They are normalized on
//! construction (surrounding whitespace stripped) and immutable afterwards.

use crate::error::{ModelError, ModelResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A product SKU, the stable identity of a product across platforms.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sku(String);

impl Sku {
    /// Creates a SKU from a raw string.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::EmptySku`] if the string is empty after trimming.
    pub fn new(raw: impl AsRef<str>) -> ModelResult<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(ModelError::EmptySku);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the SKU as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A variant SKU, unique within its owning product.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariantSku(String);

impl VariantSku {
    /// Creates a variant SKU from a raw string.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::EmptySku`] if the string is empty after trimming.
    pub fn new(raw: impl AsRef<str>) -> ModelResult<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(ModelError::EmptySku);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the variant SKU as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VariantSku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sku_trims_whitespace() {
        let sku = Sku::new("  CH-100 ").unwrap();
        assert_eq!(sku.as_str(), "CH-100");
    }

    #[test]
    fn empty_sku_rejected() {
        assert_eq!(Sku::new("   "), Err(ModelError::EmptySku));
        assert_eq!(VariantSku::new(""), Err(ModelError::EmptySku));
    }

    #[test]
    fn skus_compare_by_value() {
        let a = Sku::new("CH-100").unwrap();
        let b = Sku::new(" CH-100").unwrap();
        assert_eq!(a, b);
    }
}
