//! Storefront platform adapter.
//!
//! The storefront exposes a REST-style JSON API: products are queried with a
//! cursor, prices travel as decimal strings, tags as one comma-separated
//! string, and untracked inventory means "sell any quantity".

use crate::adapter::{ApplyOutcome, FetchPage, FetchSelector, PlatformAdapter};
use crate::error::{AdapterError, AdapterResult};
use crate::http::{HttpClient, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shopsync_model::{
    CanonicalProduct, CanonicalVariant, FieldKind, FieldRef, FieldValue, Money, PlatformId, Sku,
    StockLevel, VariantSku,
};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

const MAX_TITLE_LEN: usize = 255;
const MAX_DESCRIPTION_LEN: usize = 65_535;
const MAX_STOCK_UNITS: u64 = 1_000_000_000;

/// Adapter for the storefront platform.
pub struct StorefrontAdapter<C: HttpClient> {
    base_url: String,
    client: C,
    page_size: u32,
}

impl<C: HttpClient> StorefrontAdapter<C> {
    /// Creates a storefront adapter against the given API base URL.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into(),
            client,
            page_size: 100,
        }
    }

    /// Sets the fetch page size.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/2024-01/{path}", self.base_url)
    }

    fn post_json(&self, path: &str, body: serde_json::Value) -> AdapterResult<HttpResponse> {
        self.client
            .post(&self.endpoint(path), body.to_string().into_bytes())
            .map_err(AdapterError::transport_retryable)
    }

    /// Maps an HTTP write response onto an apply outcome.
    fn write_outcome(&self, response: HttpResponse) -> AdapterResult<ApplyOutcome> {
        match response.status {
            200 | 201 => Ok(ApplyOutcome::Applied),
            404 => Ok(ApplyOutcome::NotFound),
            409 | 422 => Ok(ApplyOutcome::Rejected {
                reason: error_message(&response.body),
            }),
            429 => Ok(ApplyOutcome::RateLimited {
                retry_after: retry_after_hint(&response.body),
            }),
            401 | 403 => Err(AdapterError::Authentication(error_message(&response.body))),
            500..=599 => Err(AdapterError::transport_retryable(format!(
                "storefront returned {}",
                response.status
            ))),
            other => Err(AdapterError::Protocol(format!(
                "unexpected storefront status {other}"
            ))),
        }
    }

    /// Rejects values the storefront would refuse, without a network call.
    fn validate(&self, field: &FieldRef, value: &FieldValue) -> Option<String> {
        if !value.matches_kind(field.kind) {
            return Some(format!(
                "value kind {} does not fit field {field}",
                value.kind_name()
            ));
        }
        match value {
            FieldValue::Money(m) if m.minor() < 0 => Some("price must not be negative".into()),
            FieldValue::Stock(StockLevel::Units(n)) if *n > MAX_STOCK_UNITS => {
                Some(format!("stock {n} exceeds platform maximum"))
            }
            FieldValue::Text(t) if field.kind == FieldKind::Title && t.trim().is_empty() => {
                Some("title must not be empty".into())
            }
            FieldValue::Text(t) if field.kind == FieldKind::Title && t.len() > MAX_TITLE_LEN => {
                Some(format!("title exceeds {MAX_TITLE_LEN} characters"))
            }
            FieldValue::Text(t)
                if field.kind == FieldKind::Description && t.len() > MAX_DESCRIPTION_LEN =>
            {
                Some(format!("description exceeds {MAX_DESCRIPTION_LEN} characters"))
            }
            FieldValue::Tags(tags) if tags.iter().any(|t| t.len() > MAX_TITLE_LEN) => {
                Some("tag exceeds maximum length".into())
            }
            _ => None,
        }
    }
}

impl<C: HttpClient> PlatformAdapter for StorefrontAdapter<C> {
    fn platform(&self) -> PlatformId {
        PlatformId::Storefront
    }

    fn fetch_page(
        &self,
        selector: &FetchSelector,
        cursor: Option<&str>,
    ) -> AdapterResult<FetchPage> {
        let body = json!({
            "limit": self.page_size,
            "cursor": cursor,
            "skus": selector.skus.as_ref().map(|skus| {
                skus.iter().map(Sku::as_str).collect::<Vec<_>>()
            }),
            "updated_since_ms": selector.updated_since_ms,
        });

        let response = self.post_json("products/query", body)?;
        match response.status {
            200 => {}
            401 | 403 => {
                return Err(AdapterError::Authentication(error_message(&response.body)))
            }
            429 | 500..=599 => {
                return Err(AdapterError::transport_retryable(format!(
                    "storefront returned {}",
                    response.status
                )))
            }
            other => {
                return Err(AdapterError::Protocol(format!(
                    "unexpected storefront status {other}"
                )))
            }
        }

        let page: WireQueryPage = serde_json::from_slice(&response.body)
            .map_err(|e| AdapterError::Protocol(format!("bad query response: {e}")))?;

        let mut products = Vec::with_capacity(page.products.len());
        for wire in page.products {
            products.push(wire.into_canonical()?);
        }
        debug!(
            count = products.len(),
            has_more = page.next_cursor.is_some(),
            "fetched storefront page"
        );
        Ok(FetchPage {
            products,
            next_cursor: page.next_cursor,
        })
    }

    fn apply_change(
        &self,
        sku: &Sku,
        field: &FieldRef,
        value: &FieldValue,
    ) -> AdapterResult<ApplyOutcome> {
        if let Some(reason) = self.validate(field, value) {
            debug!(%sku, %field, reason, "storefront rejected value locally");
            return Ok(ApplyOutcome::Rejected { reason });
        }

        let body = json!({
            "sku": sku.as_str(),
            "variant_sku": field.variant.as_ref().map(VariantSku::as_str),
            "set": wire_value(field.kind, value),
        });

        let response = self.post_json("products/update", body)?;
        self.write_outcome(response)
    }

    fn create_product(&self, product: &CanonicalProduct) -> AdapterResult<ApplyOutcome> {
        let wire = WireProduct::from_canonical(product);
        let body = serde_json::to_value(&wire)
            .map_err(|e| AdapterError::Protocol(format!("encode create: {e}")))?;
        let response = self.post_json("products/create", body)?;
        self.write_outcome(response)
    }

    fn is_healthy(&self) -> bool {
        if !self.client.is_healthy() {
            return false;
        }
        match self.post_json("ping", json!({})) {
            Ok(response) => response.is_success(),
            Err(_) => false,
        }
    }
}

/// Encodes one field value in the storefront's write vocabulary.
fn wire_value(kind: FieldKind, value: &FieldValue) -> serde_json::Value {
    match value {
        FieldValue::Money(m) => json!({
            "price": m.to_decimal_string(),
            "currency": m.currency(),
        }),
        FieldValue::Stock(StockLevel::Unlimited) => json!({
            "inventory_tracked": false,
        }),
        FieldValue::Stock(StockLevel::Units(n)) => json!({
            "inventory_tracked": true,
            "inventory_quantity": n,
        }),
        FieldValue::Text(t) => match kind {
            FieldKind::Description => json!({ "body_html": t }),
            _ => json!({ "title": t }),
        },
        FieldValue::Tags(tags) => json!({ "tags": tags.join(", ") }),
        FieldValue::Attributes(attrs) => json!({ "options": attrs }),
    }
}

fn error_message(body: &[u8]) -> String {
    #[derive(Deserialize)]
    struct WireError {
        #[serde(default)]
        errors: Option<String>,
        #[serde(default)]
        error: Option<String>,
    }
    serde_json::from_slice::<WireError>(body)
        .ok()
        .and_then(|e| e.errors.or(e.error))
        .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned())
}

fn retry_after_hint(body: &[u8]) -> Option<Duration> {
    #[derive(Deserialize)]
    struct WireThrottle {
        retry_after_ms: Option<u64>,
    }
    serde_json::from_slice::<WireThrottle>(body)
        .ok()
        .and_then(|t| t.retry_after_ms)
        .map(Duration::from_millis)
}

#[derive(Debug, Deserialize)]
struct WireQueryPage {
    products: Vec<WireProduct>,
    next_cursor: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireProduct {
    #[serde(default)]
    id: Option<String>,
    sku: String,
    title: String,
    #[serde(default)]
    body_html: String,
    price: String,
    currency: String,
    /// Comma-separated tag string.
    #[serde(default)]
    tags: String,
    #[serde(default)]
    inventory_tracked: Option<bool>,
    #[serde(default)]
    inventory_quantity: Option<i64>,
    #[serde(default)]
    variants: Vec<WireVariant>,
    updated_at_ms: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireVariant {
    sku: String,
    price: String,
    #[serde(default)]
    inventory_tracked: Option<bool>,
    #[serde(default)]
    inventory_quantity: Option<i64>,
    #[serde(default)]
    options: Vec<(String, String)>,
    updated_at_ms: u64,
}

/// Untracked inventory sells in any quantity; a tracked negative count (the
/// storefront reports oversells that way) clamps to zero.
fn wire_stock(tracked: Option<bool>, quantity: Option<i64>, sku: &str) -> StockLevel {
    match (tracked, quantity) {
        (Some(false), _) => StockLevel::Unlimited,
        (_, Some(n)) if n < 0 => {
            warn!(sku, quantity = n, "clamping negative storefront inventory");
            StockLevel::Units(0)
        }
        (_, Some(n)) => StockLevel::Units(n as u64),
        (_, None) => StockLevel::Unlimited,
    }
}

impl WireProduct {
    fn into_canonical(self) -> AdapterResult<CanonicalProduct> {
        let sku = Sku::new(&self.sku)
            .map_err(|e| AdapterError::Protocol(format!("bad storefront sku: {e}")))?;
        let price = Money::parse(&self.price, &self.currency)
            .map_err(|e| AdapterError::Protocol(format!("bad storefront price: {e}")))?;

        let mut variants = Vec::with_capacity(self.variants.len());
        for wire in &self.variants {
            variants.push(CanonicalVariant {
                sku: VariantSku::new(&wire.sku)
                    .map_err(|e| AdapterError::Protocol(format!("bad variant sku: {e}")))?,
                price: Money::parse(&wire.price, &self.currency)
                    .map_err(|e| AdapterError::Protocol(format!("bad variant price: {e}")))?,
                stock: wire_stock(wire.inventory_tracked, wire.inventory_quantity, &wire.sku),
                attributes: wire.options.clone(),
                updated_at_ms: wire.updated_at_ms,
            });
        }

        let stock = if variants.is_empty() {
            Some(wire_stock(
                self.inventory_tracked,
                self.inventory_quantity,
                &self.sku,
            ))
        } else {
            None
        };

        let mut external_ids = BTreeMap::new();
        if let Some(id) = self.id {
            external_ids.insert(PlatformId::Storefront, id);
        }

        let product = CanonicalProduct {
            sku,
            external_ids,
            title: self.title,
            description: self.body_html,
            price,
            tags: self
                .tags
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            stock,
            variants,
            updated_at_ms: self.updated_at_ms,
        };
        product
            .validate()
            .map_err(|e| AdapterError::Protocol(format!("invalid storefront product: {e}")))?;
        Ok(product)
    }

    fn from_canonical(product: &CanonicalProduct) -> Self {
        Self {
            id: product.external_ids.get(&PlatformId::Storefront).cloned(),
            sku: product.sku.to_string(),
            title: product.title.clone(),
            body_html: product.description.clone(),
            price: product.price.to_decimal_string(),
            currency: product.price.currency().to_string(),
            tags: product.tags.join(", "),
            inventory_tracked: product.stock.map(|s| s != StockLevel::Unlimited),
            inventory_quantity: product
                .stock
                .and_then(|s| s.units())
                .map(|n| n as i64),
            variants: product
                .variants
                .iter()
                .map(|v| WireVariant {
                    sku: v.sku.to_string(),
                    price: v.price.to_decimal_string(),
                    inventory_tracked: Some(v.stock != StockLevel::Unlimited),
                    inventory_quantity: v.stock.units().map(|n| n as i64),
                    options: v.attributes.clone(),
                    updated_at_ms: v.updated_at_ms,
                })
                .collect(),
            updated_at_ms: product.updated_at_ms,
        }
    }
}
