//! An in-memory platform adapter for tests.
//!
//! The mock holds a catalog in memory, applies changes to it like a real
//! platform would, and keeps a log of every mutation so tests can assert
//! idempotence (no second mutation for an already-applied change). Outcomes
//! can be scripted per `(SKU, field)` to exercise rate limits, rejections and
//! missing products.

use crate::adapter::{ApplyOutcome, FetchPage, FetchSelector, PlatformAdapter};
use crate::error::{AdapterError, AdapterResult};
use parking_lot::Mutex;
use shopsync_model::{CanonicalProduct, FieldKind, FieldRef, FieldValue, PlatformId, Sku};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct MockState {
    products: Mutex<BTreeMap<Sku, CanonicalProduct>>,
    scripted: Mutex<HashMap<(String, String), VecDeque<ApplyOutcome>>>,
    applied_log: Mutex<Vec<(Sku, FieldRef, FieldValue)>>,
    created_log: Mutex<Vec<Sku>>,
    fetch_failures: Mutex<VecDeque<AdapterError>>,
    healthy: AtomicBool,
}

/// An in-memory adapter with scripted outcomes and a mutation log.
///
/// Cloning is cheap and shares state, so a test can keep a handle while the
/// engine owns another.
#[derive(Clone)]
pub struct MockAdapter {
    platform: PlatformId,
    page_size: usize,
    state: Arc<MockState>,
}

impl MockAdapter {
    /// Creates an empty mock for the given platform.
    #[must_use]
    pub fn new(platform: PlatformId) -> Self {
        let state = MockState {
            healthy: AtomicBool::new(true),
            ..Default::default()
        };
        Self {
            platform,
            page_size: 50,
            state: Arc::new(state),
        }
    }

    /// Sets the fetch page size.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Inserts or replaces a product in the mock catalog.
    pub fn put_product(&self, product: CanonicalProduct) {
        self.state
            .products
            .lock()
            .insert(product.sku.clone(), product);
    }

    /// Removes a product from the mock catalog.
    pub fn remove_product(&self, sku: &Sku) {
        self.state.products.lock().remove(sku);
    }

    /// Returns a copy of a product, if present.
    #[must_use]
    pub fn product(&self, sku: &Sku) -> Option<CanonicalProduct> {
        self.state.products.lock().get(sku).cloned()
    }

    /// Queues an outcome for the next `apply_change` on `(sku, field)`.
    ///
    /// Queued outcomes are consumed in order; once the queue is empty the
    /// mock falls back to applying the change for real.
    pub fn script_outcome(&self, sku: &Sku, field: &FieldRef, outcome: ApplyOutcome) {
        self.state
            .scripted
            .lock()
            .entry((sku.to_string(), field.to_string()))
            .or_default()
            .push_back(outcome);
    }

    /// Queues a transport failure for upcoming `fetch_page` calls.
    pub fn fail_next_fetch(&self, error: AdapterError) {
        self.state.fetch_failures.lock().push_back(error);
    }

    /// Flips the health flag.
    pub fn set_healthy(&self, healthy: bool) {
        self.state.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Returns every `(SKU, field, value)` mutation applied so far.
    #[must_use]
    pub fn applied_log(&self) -> Vec<(Sku, FieldRef, FieldValue)> {
        self.state.applied_log.lock().clone()
    }

    /// Returns every SKU created so far.
    #[must_use]
    pub fn created_log(&self) -> Vec<Sku> {
        self.state.created_log.lock().clone()
    }

    /// Applies a field value to an in-memory product the way the platform
    /// would: an absolute set.
    fn set_field(product: &mut CanonicalProduct, field: &FieldRef, value: &FieldValue) -> bool {
        match &field.variant {
            None => match (field.kind, value) {
                (FieldKind::Price, FieldValue::Money(m)) => product.price = m.clone(),
                (FieldKind::Stock, FieldValue::Stock(s)) => product.stock = Some(*s),
                (FieldKind::Title, FieldValue::Text(t)) => product.title = t.clone(),
                (FieldKind::Description, FieldValue::Text(t)) => product.description = t.clone(),
                (FieldKind::Tags, FieldValue::Tags(t)) => product.tags = t.clone(),
                _ => return false,
            },
            Some(vsku) => {
                let Some(variant) = product.variants.iter_mut().find(|v| &v.sku == vsku) else {
                    return false;
                };
                match (field.kind, value) {
                    (FieldKind::Price, FieldValue::Money(m)) => variant.price = m.clone(),
                    (FieldKind::Stock, FieldValue::Stock(s)) => variant.stock = *s,
                    (FieldKind::Attributes, FieldValue::Attributes(a)) => {
                        variant.attributes = a.clone();
                    }
                    _ => return false,
                }
            }
        }
        true
    }
}

impl PlatformAdapter for MockAdapter {
    fn platform(&self) -> PlatformId {
        self.platform
    }

    fn fetch_page(
        &self,
        selector: &FetchSelector,
        cursor: Option<&str>,
    ) -> AdapterResult<FetchPage> {
        if let Some(error) = self.state.fetch_failures.lock().pop_front() {
            return Err(error);
        }

        let offset: usize = match cursor {
            Some(raw) => raw
                .parse()
                .map_err(|_| AdapterError::Protocol(format!("bad mock cursor: {raw}")))?,
            None => 0,
        };

        let products = self.state.products.lock();
        let filtered: Vec<&CanonicalProduct> = products
            .values()
            .filter(|p| match &selector.skus {
                Some(skus) => skus.contains(&p.sku),
                None => true,
            })
            .filter(|p| match selector.updated_since_ms {
                Some(since) => p.updated_at_ms >= since,
                None => true,
            })
            .collect();

        let page: Vec<CanonicalProduct> = filtered
            .iter()
            .skip(offset)
            .take(self.page_size)
            .map(|p| (*p).clone())
            .collect();
        let next = offset + page.len();
        let next_cursor = (next < filtered.len()).then(|| next.to_string());

        Ok(FetchPage {
            products: page,
            next_cursor,
        })
    }

    fn apply_change(
        &self,
        sku: &Sku,
        field: &FieldRef,
        value: &FieldValue,
    ) -> AdapterResult<ApplyOutcome> {
        let scripted = self
            .state
            .scripted
            .lock()
            .get_mut(&(sku.to_string(), field.to_string()))
            .and_then(VecDeque::pop_front);
        if let Some(outcome) = scripted {
            return Ok(outcome);
        }

        let mut products = self.state.products.lock();
        let Some(product) = products.get_mut(sku) else {
            return Ok(ApplyOutcome::NotFound);
        };
        if !Self::set_field(product, field, value) {
            return Ok(ApplyOutcome::Rejected {
                reason: format!("field {field} does not exist on {sku}"),
            });
        }
        drop(products);

        self.state
            .applied_log
            .lock()
            .push((sku.clone(), field.clone(), value.clone()));
        Ok(ApplyOutcome::Applied)
    }

    fn create_product(&self, product: &CanonicalProduct) -> AdapterResult<ApplyOutcome> {
        let mut products = self.state.products.lock();
        if products.contains_key(&product.sku) {
            return Ok(ApplyOutcome::Rejected {
                reason: format!("product {} already exists", product.sku),
            });
        }
        products.insert(product.sku.clone(), product.clone());
        drop(products);

        self.state.created_log.lock().push(product.sku.clone());
        Ok(ApplyOutcome::Applied)
    }

    fn is_healthy(&self) -> bool {
        self.state.healthy.load(Ordering::SeqCst)
    }
}
