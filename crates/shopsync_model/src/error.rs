//! Error types for the canonical model.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur while building or validating canonical entities.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// A SKU was empty after normalization.
    #[error("SKU must not be empty")]
    EmptySku,

    /// A variant SKU appears more than once within one product.
    #[error("duplicate variant SKU {variant} in product {product}")]
    DuplicateVariant {
        /// The owning product SKU.
        product: String,
        /// The duplicated variant SKU.
        variant: String,
    },

    /// A monetary amount could not be parsed.
    #[error("invalid money amount: {0}")]
    InvalidAmount(String),

    /// A currency code was not three ASCII letters.
    #[error("invalid currency code: {0}")]
    InvalidCurrency(String),

    /// A value of the wrong kind was supplied for a field.
    #[error("value kind mismatch for field {field}: got {got}")]
    ValueKindMismatch {
        /// The field the value was destined for.
        field: String,
        /// The kind of value that was supplied.
        got: String,
    },
}
