//! Local catalog of the provider games and products.
//!
//! # Modules
//!
//! - `models` - Games, products and transactions as stored locally
//! - `fields` - Candidate field lists and lookups over provider payloads
//! - `store` - JSON persisted catalog with upserts keyed by code
//! - `sync` - Reconciliation of provider data into the catalog

pub(crate) mod fields;
mod models;
mod store;
mod sync;

#[cfg(test)]
pub use crate::catalog::models::{Form, GameAttributes, ProductAttributes, UserInformation};
pub use crate::catalog::models::{Transaction, TransactionStatus};
pub use crate::catalog::store::Catalog;
pub use crate::catalog::sync::{CatalogSync, SyncReport};
