//! # shopsync Adapter
//!
//! Platform adapter contract and concrete adapters for shopsync.
//!
//! This crate provides:
//! - The [`PlatformAdapter`] trait the engine is written against
//! - An abstract [`HttpClient`] so real clients, loopback servers and test
//!   doubles plug in the same way
//! - The storefront adapter (REST-style JSON API)
//! - The inventory adapter (RPC-style JSON API)
//! - An in-memory [`MockAdapter`] with scripted outcomes for tests
//!
//! ## Key Invariants
//!
//! - Adapters hold no cross-run state
//! - Every write is an absolute set, never an increment, so retrying a
//!   previously-successful `(SKU, field, value)` triple cannot double-apply
//! - Values the platform would refuse are rejected locally before any
//!   network call

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod error;
mod http;
mod inventory;
mod mock;
mod storefront;

pub use adapter::{fetch_all, ApplyOutcome, FetchPage, FetchSelector, PlatformAdapter};
pub use error::{AdapterError, AdapterResult};
pub use http::{HttpClient, HttpResponse};
pub use inventory::InventoryAdapter;
pub use mock::MockAdapter;
pub use storefront::StorefrontAdapter;
