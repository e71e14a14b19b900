//! The platform adapter contract.

use crate::error::AdapterResult;
use shopsync_model::{CanonicalProduct, FieldRef, FieldValue, PlatformId, Sku};
use std::time::Duration;

/// Narrows a fetch to a subset of the catalog.
#[derive(Debug, Clone, Default)]
pub struct FetchSelector {
    /// Restrict to these SKUs; `None` fetches the whole catalog.
    pub skus: Option<Vec<Sku>>,
    /// Restrict to entities modified at or after this time (epoch ms).
    pub updated_since_ms: Option<u64>,
}

/// One page of fetched canonical products.
#[derive(Debug, Clone)]
pub struct FetchPage {
    /// Products on this page, in platform order.
    pub products: Vec<CanonicalProduct>,
    /// Cursor for the next page, or `None` on the last page.
    pub next_cursor: Option<String>,
}

/// Outcome of applying one field change on a platform.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// The value is now live on the platform.
    Applied,
    /// The platform throttled the call; retry after the hint, if given.
    RateLimited {
        /// Platform-suggested wait before retrying.
        retry_after: Option<Duration>,
    },
    /// The platform does not know the SKU.
    NotFound,
    /// The platform (or local validation) refused the value.
    Rejected {
        /// Human-readable refusal reason.
        reason: String,
    },
}

/// Translates between one platform's native representation and the canonical
/// model, and between canonical mutations and platform API calls.
///
/// Implementations must be stateless across runs and idempotent for identical
/// `(SKU, field, value)` triples: every write is an absolute set.
pub trait PlatformAdapter: Send + Sync {
    /// Which platform this adapter fronts.
    fn platform(&self) -> PlatformId;

    /// Fetches one page of canonical products.
    ///
    /// # Errors
    ///
    /// Returns an [`AdapterError`](crate::AdapterError) if the platform
    /// cannot be reached or the response cannot be decoded.
    fn fetch_page(
        &self,
        selector: &FetchSelector,
        cursor: Option<&str>,
    ) -> AdapterResult<FetchPage>;

    /// Applies one field change as an absolute set.
    ///
    /// Values that fail platform validation are rejected locally, without a
    /// network call, so remote failures stay explainable.
    ///
    /// # Errors
    ///
    /// Returns an [`AdapterError`](crate::AdapterError) only for transport
    /// and decoding failures; refusals are [`ApplyOutcome`] variants.
    fn apply_change(
        &self,
        sku: &Sku,
        field: &FieldRef,
        value: &FieldValue,
    ) -> AdapterResult<ApplyOutcome>;

    /// Creates a product that exists on the other platform but not here.
    ///
    /// # Errors
    ///
    /// Same contract as [`PlatformAdapter::apply_change`].
    fn create_product(&self, product: &CanonicalProduct) -> AdapterResult<ApplyOutcome>;

    /// Returns true if the platform looks reachable with the supplied
    /// credentials. Used by health checks; never mutates anything.
    fn is_healthy(&self) -> bool;
}

/// Drains every page of a fetch into one vector.
///
/// # Errors
///
/// Propagates the first page-level error; pages fetched so far are dropped
/// because a partial catalog must never be diffed against a baseline.
pub fn fetch_all(
    adapter: &dyn PlatformAdapter,
    selector: &FetchSelector,
) -> AdapterResult<Vec<CanonicalProduct>> {
    let mut products = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = adapter.fetch_page(selector, cursor.as_deref())?;
        products.extend(page.products);
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    Ok(products)
}
