//! Transaction and balance command handlers.

use log::debug;
use serde_json::{Map, Value};

use crate::catalog::{Catalog, Transaction};
use crate::ditusi::Provider;
use crate::ledger::{Balance, LedgerError, TransactionService};

/// Creates a transaction, `info` being the buyer form values.
pub async fn handle_create<P: Provider>(
    service: &TransactionService<P>,
    catalog: &mut Catalog,
    product_code: &str,
    amount: u64,
    info: Vec<(String, String)>,
) -> anyhow::Result<Transaction> {
    let additional_information: Map<String, Value> = info
        .into_iter()
        .map(|(key, value)| (key, Value::String(value)))
        .collect();
    debug!("additional information {:?}", additional_information);

    let transaction = service
        .create(
            catalog,
            product_code,
            amount,
            Value::Object(additional_information),
        )
        .await?;

    Ok(transaction)
}

/// Refreshes the transaction `id` from the provider.
pub async fn handle_status<P: Provider>(
    service: &TransactionService<P>,
    catalog: &mut Catalog,
    id: &str,
) -> anyhow::Result<Transaction> {
    Ok(service.status(catalog, id).await?)
}

pub async fn handle_balance<P: Provider>(
    service: &TransactionService<P>,
) -> Result<Balance, LedgerError> {
    service.balance().await
}
