//! # shopsync Model
//!
//! Canonical, platform-agnostic product model for shopsync.
//!
//! This crate provides:
//! - SKU newtypes (the durable join key across platforms)
//! - Canonical products and variants
//! - Field identities and canonical field values
//! - Value normalization (money, stock, text, tags)
//! - Content hashing for change detection
//!
//! ## Key Invariants
//!
//! - SKU is unique and immutable; external platform IDs are a rebuildable
//!   lookup cache, never identity
//! - Variant SKUs are unique within their product
//! - Two values that normalize identically hash identically, so formatting
//!   differences between platforms never register as changes

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod field;
mod platform;
mod product;
mod sku;
mod value;

pub use error::{ModelError, ModelResult};
pub use field::{FieldKind, FieldRef, FieldValue};
pub use platform::PlatformId;
pub use product::{CanonicalProduct, CanonicalVariant};
pub use sku::{Sku, VariantSku};
pub use value::{Money, StockLevel};
