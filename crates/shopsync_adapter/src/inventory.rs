//! Inventory-management platform adapter.
//!
//! The inventory platform exposes an RPC-style API: every call is a POST to
//! one endpoint with a method name and parameters, and errors come back as
//! `status: "ERROR"` envelopes with an error code rather than HTTP statuses.
//! Prices travel as JSON numbers, unlimited stock as quantity `-1`, and tags
//! as a proper array.

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
use tracing::debug;

const MAX_NAME_LEN: usize = 200;

/// Adapter for the inventory-management platform.
pub struct InventoryAdapter<C: HttpClient> {
    endpoint_url: String,
    client: C,
    page_size: u32,
}

impl<C: HttpClient> InventoryAdapter<C> {
    /// Creates an inventory adapter against the given RPC endpoint.
    pub fn new(endpoint_url: impl Into<String>, client: C) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
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

    fn call(&self, method: &str, parameters: serde_json::Value) -> AdapterResult<Envelope> {
        let body = json!({ "method": method, "parameters": parameters });
        let response: HttpResponse = self
            .client
            .post(&self.endpoint_url, body.to_string().into_bytes())
            .map_err(AdapterError::transport_retryable)?;

        if (500..600).contains(&response.status) {
            return Err(AdapterError::transport_retryable(format!(
                "inventory platform returned {}",
                response.status
            )));
        }
        if !response.is_success() {
            return Err(AdapterError::Protocol(format!(
                "unexpected inventory status {}",
                response.status
            )));
        }

        serde_json::from_slice(&response.body)
            .map_err(|e| AdapterError::Protocol(format!("bad inventory envelope: {e}")))
    }

    /// Maps an RPC error envelope onto an apply outcome or a hard error.
    fn write_outcome(&self, envelope: Envelope) -> AdapterResult<ApplyOutcome> {
        if envelope.status == "SUCCESS" {
            return Ok(ApplyOutcome::Applied);
        }
        match envelope.error_code.as_deref() {
            Some("ERROR_RATE_LIMIT") => Ok(ApplyOutcome::RateLimited {
                retry_after: envelope.retry_after_ms.map(Duration::from_millis),
            }),
            Some("ERROR_NOT_FOUND") => Ok(ApplyOutcome::NotFound),
            Some("ERROR_VALIDATION") => Ok(ApplyOutcome::Rejected {
                reason: envelope.message(),
            }),
            Some("ERROR_AUTH") => Err(AdapterError::Authentication(envelope.message())),
            _ => Err(AdapterError::transport_fatal(envelope.message())),
        }
    }

    /// Rejects values the platform would refuse, without a network call.
    fn validate(&self, field: &FieldRef, value: &FieldValue) -> Option<String> {
        if !value.matches_kind(field.kind) {
            return Some(format!(
                "value kind {} does not fit field {field}",
                value.kind_name()
            ));
        }
        match value {
            FieldValue::Money(m) if m.minor() < 0 => Some("price must not be negative".into()),
            FieldValue::Text(t) if field.kind == FieldKind::Title && t.trim().is_empty() => {
                Some("name must not be empty".into())
            }
            FieldValue::Text(t) if field.kind == FieldKind::Title && t.len() > MAX_NAME_LEN => {
                Some(format!("name exceeds {MAX_NAME_LEN} characters"))
            }
            _ => None,
        }
    }
}

impl<C: HttpClient> PlatformAdapter for InventoryAdapter<C> {
    fn platform(&self) -> PlatformId {
        PlatformId::Inventory
    }

    fn fetch_page(
        &self,
        selector: &FetchSelector,
        cursor: Option<&str>,
    ) -> AdapterResult<FetchPage> {
        let page_no: u64 = match cursor {
            Some(raw) => raw
                .parse()
                .map_err(|_| AdapterError::Protocol(format!("bad inventory cursor: {raw}")))?,
            None => 1,
        };

        let envelope = self.call(
            "getProducts",
            json!({
                "page": page_no,
                "page_size": self.page_size,
                "skus": selector.skus.as_ref().map(|skus| {
                    skus.iter().map(Sku::as_str).collect::<Vec<_>>()
                }),
                "updated_since_ms": selector.updated_since_ms,
            }),
        )?;

        if envelope.status != "SUCCESS" {
            // Fetch failures are never outcomes; surface them for the retry
            // policy to classify.
            return match envelope.error_code.as_deref() {
                Some("ERROR_AUTH") => Err(AdapterError::Authentication(envelope.message())),
                Some("ERROR_RATE_LIMIT") => {
                    Err(AdapterError::transport_retryable(envelope.message()))
                }
                _ => Err(AdapterError::transport_fatal(envelope.message())),
            };
        }

        let mut products = Vec::with_capacity(envelope.products.len());
        for wire in envelope.products {
            products.push(wire.into_canonical()?);
        }
        debug!(
            page = page_no,
            count = products.len(),
            has_more = envelope.has_more,
            "fetched inventory page"
        );
        Ok(FetchPage {
            products,
            next_cursor: envelope.has_more.then(|| (page_no + 1).to_string()),
        })
    }

    fn apply_change(
        &self,
        sku: &Sku,
        field: &FieldRef,
        value: &FieldValue,
    ) -> AdapterResult<ApplyOutcome> {
        if let Some(reason) = self.validate(field, value) {
            debug!(%sku, %field, reason, "inventory rejected value locally");
            return Ok(ApplyOutcome::Rejected { reason });
        }

        let envelope = self.call(
            "updateProductField",
            json!({
                "sku": sku.as_str(),
                "variant_sku": field.variant.as_ref().map(VariantSku::as_str),
                "field": field.kind.as_str(),
                "value": wire_value(value),
            }),
        )?;
        self.write_outcome(envelope)
    }

    fn create_product(&self, product: &CanonicalProduct) -> AdapterResult<ApplyOutcome> {
        let wire = WireProduct::from_canonical(product);
        let parameters = serde_json::to_value(&wire)
            .map_err(|e| AdapterError::Protocol(format!("encode create: {e}")))?;
        let envelope = self.call("addProduct", parameters)?;
        self.write_outcome(envelope)
    }

    fn is_healthy(&self) -> bool {
        if !self.client.is_healthy() {
            return false;
        }
        matches!(
            self.call("ping", json!({})),
            Ok(envelope) if envelope.status == "SUCCESS"
        )
    }
}

/// Encodes one field value in the inventory platform's write vocabulary.
fn wire_value(value: &FieldValue) -> serde_json::Value {
    match value {
        FieldValue::Money(m) => json!({
            "price": m.minor() as f64 / 100.0,
            "currency": m.currency(),
        }),
        FieldValue::Stock(StockLevel::Unlimited) => json!({ "quantity": -1 }),
        FieldValue::Stock(StockLevel::Units(n)) => json!({ "quantity": n }),
        FieldValue::Text(t) => json!({ "text": t }),
        FieldValue::Tags(tags) => json!({ "tags": tags }),
        FieldValue::Attributes(attrs) => json!({
            "attributes": attrs.iter().map(|(k, v)| json!({"name": k, "value": v}))
                .collect::<Vec<_>>(),
        }),
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    status: String,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    retry_after_ms: Option<u64>,
    #[serde(default)]
    products: Vec<WireProduct>,
    #[serde(default)]
    has_more: bool,
}

impl Envelope {
    fn message(&self) -> String {
        self.error_message
            .clone()
            .or_else(|| self.error_code.clone())
            .unwrap_or_else(|| "unspecified inventory error".into())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireProduct {
    #[serde(default)]
    product_id: Option<String>,
    sku: String,
    name: String,
    #[serde(default)]
    description: String,
    /// Gross price as a JSON number.
    price_brutto: f64,
    currency: String,
    /// `-1` means unlimited / not tracked.
    quantity: i64,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    variants: Vec<WireVariant>,
    updated_at_ms: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireVariant {
    sku: String,
    price_brutto: f64,
    quantity: i64,
    #[serde(default)]
    attributes: Vec<WireAttribute>,
    updated_at_ms: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireAttribute {
    name: String,
    value: String,
}

/// Converts a platform float price to minor units.
///
/// The platform serializes prices with two decimal places, so rounding here
/// only ever corrects float representation noise.
fn float_to_money(price: f64, currency: &str) -> AdapterResult<Money> {
    let minor = (price * 100.0).round() as i64;
    Money::from_minor(minor, currency)
        .map_err(|e| AdapterError::Protocol(format!("bad inventory price: {e}")))
}

fn wire_quantity(quantity: i64) -> StockLevel {
    if quantity < 0 {
        StockLevel::Unlimited
    } else {
        StockLevel::Units(quantity as u64)
    }
}

impl WireProduct {
    fn into_canonical(self) -> AdapterResult<CanonicalProduct> {
        let sku = Sku::new(&self.sku)
            .map_err(|e| AdapterError::Protocol(format!("bad inventory sku: {e}")))?;
        let price = float_to_money(self.price_brutto, &self.currency)?;

        let mut variants = Vec::with_capacity(self.variants.len());
        for wire in &self.variants {
            variants.push(CanonicalVariant {
                sku: VariantSku::new(&wire.sku)
                    .map_err(|e| AdapterError::Protocol(format!("bad variant sku: {e}")))?,
                price: float_to_money(wire.price_brutto, &self.currency)?,
                stock: wire_quantity(wire.quantity),
                attributes: wire
                    .attributes
                    .iter()
                    .map(|a| (a.name.clone(), a.value.clone()))
                    .collect(),
                updated_at_ms: wire.updated_at_ms,
            });
        }

        let stock = if variants.is_empty() {
            Some(wire_quantity(self.quantity))
        } else {
            None
        };

        let mut external_ids = BTreeMap::new();
        if let Some(id) = self.product_id {
            external_ids.insert(PlatformId::Inventory, id);
        }

        let product = CanonicalProduct {
            sku,
            external_ids,
            title: self.name,
            description: self.description,
            price,
            tags: self.tags,
            stock,
            variants,
            updated_at_ms: self.updated_at_ms,
        };
        product
            .validate()
            .map_err(|e| AdapterError::Protocol(format!("invalid inventory product: {e}")))?;
        Ok(product)
    }

    fn from_canonical(product: &CanonicalProduct) -> Self {
        Self {
            product_id: product.external_ids.get(&PlatformId::Inventory).cloned(),
            sku: product.sku.to_string(),
            name: product.title.clone(),
            description: product.description.clone(),
            price_brutto: product.price.minor() as f64 / 100.0,
            currency: product.price.currency().to_string(),
            quantity: match product.stock {
                Some(StockLevel::Units(n)) => n as i64,
                _ => -1,
            },
            tags: product.tags.clone(),
            variants: product
                .variants
                .iter()
                .map(|v| WireVariant {
                    sku: v.sku.to_string(),
                    price_brutto: v.price.minor() as f64 / 100.0,
                    quantity: match v.stock {
                        StockLevel::Units(n) => n as i64,
                        StockLevel::Unlimited => -1,
                    },
                    attributes: v
                        .attributes
                        .iter()
                        .map(|(k, v)| WireAttribute {
                            name: k.clone(),
                            value: v.clone(),
                        })
                        .collect(),
                    updated_at_ms: v.updated_at_ms,
                })
                .collect(),
            updated_at_ms: product.updated_at_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::CannedClient;
    use serde_json::json;

    fn adapter_with(client: CannedClient) -> InventoryAdapter<CannedClient> {
        InventoryAdapter::new("https://inventory.example.com/rpc", client)
    }

    #[test]
    fn fetch_normalizes_wire_products() {
        let client = CannedClient::new();
        client.push_json(
            200,
            json!({
                "status": "SUCCESS",
                "products": [{
                    "product_id": "556677",
                    "sku": "CH-100",
                    "name": "Oak chair",
                    "description": "A chair",
                    "price_brutto": 199.00,
                    "currency": "PLN",
                    "quantity": -1,
                    "tags": ["chairs"],
                    "updated_at_ms": 2000,
                }],
                "has_more": true,
            }),
        );

        let adapter = adapter_with(client);
        let page = adapter.fetch_page(&FetchSelector::default(), None).unwrap();

        let p = &page.products[0];
        assert_eq!(p.price.minor(), 19_900);
        assert_eq!(p.stock, Some(StockLevel::Unlimited));
        assert_eq!(page.next_cursor.as_deref(), Some("2"));
    }

    #[test]
    fn paging_walks_page_numbers() {
        let client = CannedClient::new();
        client.push_json(
            200,
            json!({"status": "SUCCESS", "products": [], "has_more": false}),
        );
        let adapter = adapter_with(client);

        let page = adapter
            .fetch_page(&FetchSelector::default(), Some("7"))
            .unwrap();
        assert!(page.next_cursor.is_none());

        let (_, body) = adapter.client.requests.lock()[0].clone();
        let sent: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(sent["parameters"]["page"], 7);
    }

    #[test]
    fn error_codes_map_to_outcomes() {
        let sku = Sku::new("CH-100").unwrap();
        let field = FieldRef::product(FieldKind::Stock);
        let value = FieldValue::Stock(StockLevel::Units(7));

        let client = CannedClient::new();
        client.push_json(200, json!({"status": "SUCCESS"}));
        client.push_json(
            200,
            json!({"status": "ERROR", "error_code": "ERROR_RATE_LIMIT", "retry_after_ms": 800}),
        );
        client.push_json(
            200,
            json!({"status": "ERROR", "error_code": "ERROR_NOT_FOUND"}),
        );
        client.push_json(
            200,
            json!({"status": "ERROR", "error_code": "ERROR_VALIDATION",
                   "error_message": "quantity out of range"}),
        );
        let adapter = adapter_with(client);

        assert_eq!(
            adapter.apply_change(&sku, &field, &value).unwrap(),
            ApplyOutcome::Applied
        );
        assert_eq!(
            adapter.apply_change(&sku, &field, &value).unwrap(),
            ApplyOutcome::RateLimited {
                retry_after: Some(Duration::from_millis(800))
            }
        );
        assert_eq!(
            adapter.apply_change(&sku, &field, &value).unwrap(),
            ApplyOutcome::NotFound
        );
        assert_eq!(
            adapter.apply_change(&sku, &field, &value).unwrap(),
            ApplyOutcome::Rejected {
                reason: "quantity out of range".into()
            }
        );
    }

    #[test]
    fn auth_error_aborts_fetch() {
        let client = CannedClient::new();
        client.push_json(
            200,
            json!({"status": "ERROR", "error_code": "ERROR_AUTH", "error_message": "bad token"}),
        );
        let adapter = adapter_with(client);

        let err = adapter
            .fetch_page(&FetchSelector::default(), None)
            .unwrap_err();
        assert!(matches!(err, AdapterError::Authentication(_)));
    }

    #[test]
    fn float_prices_round_exactly() {
        // 19.99 * 100 is 1998.9999... in binary; rounding must fix it.
        let m = float_to_money(19.99, "EUR").unwrap();
        assert_eq!(m.minor(), 1999);
        let m = float_to_money(0.1 + 0.2, "EUR").unwrap();
        assert_eq!(m.minor(), 30);
    }

    #[test]
    fn wire_product_round_trip() {
        let product = CanonicalProduct {
            sku: Sku::new("CH-100").unwrap(),
            external_ids: BTreeMap::new(),
            title: "Oak chair".into(),
            description: "desc".into(),
            price: Money::parse("219.00", "PLN").unwrap(),
            tags: vec!["chairs".into()],
            stock: None,
            variants: vec![CanonicalVariant {
                sku: VariantSku::new("CH-100-RED").unwrap(),
                price: Money::parse("229.00", "PLN").unwrap(),
                stock: StockLevel::Units(3),
                attributes: vec![("Color".into(), "Red".into())],
                updated_at_ms: 5,
            }],
            updated_at_ms: 42,
        };
        let wire = WireProduct::from_canonical(&product);
        let back = wire.into_canonical().unwrap();
        assert_eq!(back, product);
    }
}
