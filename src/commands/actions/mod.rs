//! Command action handlers.
//!
//! Each handler runs one command against the services and returns its outcome.
//! Handlers never print nor persist the catalog: [`run`](crate::commands::run)
//! does both once the handler returned.
//!
//! # Available Handlers
//!
//! - [`handle_import`] - One-shot catalog import
//! - [`watch`] - Periodic games and products synchronization
//! - [`handle_create`] - Transaction creation
//! - [`handle_status`] - Transaction status refresh
//! - [`handle_balance`] - Deposit balance

mod import;
mod sync;
mod transaction;

pub use import::{ImportOptions, handle_import};
pub use sync::watch;
pub use transaction::{handle_balance, handle_create, handle_status};
