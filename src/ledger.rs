//! Transaction relay between the local ledger and the provider.
//!
//! This module provides the [`TransactionService`] which records top-up
//! transactions in the [`Catalog`], forwards them to the provider and keeps
//! their status in sync.

use std::fmt;

use chrono::Utc;
use log::{error, info, warn};
use rand::{Rng, distributions::Alphanumeric};
use serde_json::{Map, Value, json};

use crate::catalog::{Catalog, Transaction, TransactionStatus, fields};
use crate::ditusi::{Provider, ProviderError};

/// Prefix of the locally generated transaction reference ids.
const REFERENCE_PREFIX: &str = "TOP-";
const REFERENCE_LENGTH: usize = 10;

/// Errors returned by the [`TransactionService`].
#[derive(Debug)]
pub enum LedgerError {
    /// The request is malformed.
    Invalid(String),
    /// The product or transaction does not exist locally, or is inactive.
    NotFound(String),
    /// The provider call failed.
    ///
    /// `reference_id` is set when a pending transaction was recorded before
    /// the failure.
    ProviderFailed {
        reference_id: Option<String>,
        source: ProviderError,
    },
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LedgerError::Invalid(reason) => write!(f, "invalid request: {}", reason),
            LedgerError::NotFound(what) => write!(f, "{} not found", what),
            LedgerError::ProviderFailed {
                reference_id: Some(reference_id),
                source,
            } => write!(f, "provider failed for {}: {}", reference_id, source),
            LedgerError::ProviderFailed {
                reference_id: None,
                source,
            } => write!(f, "provider failed: {}", source),
        }
    }
}

impl std::error::Error for LedgerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LedgerError::ProviderFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Deposit balance of the account.
#[derive(Debug, Clone, PartialEq)]
pub struct Balance {
    pub balance: f64,
    /// Partner type of the account, as reported by the provider
    pub partner_type: Option<String>,
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "balance={}, partner_type={}",
            self.balance,
            self.partner_type.as_deref().unwrap_or("-")
        )
    }
}

/// Records and relays top-up transactions.
///
/// The service never persists the catalog itself: the caller owns the
/// catalog and persists it once the operation returned, whatever its outcome.
pub struct TransactionService<P: Provider> {
    provider: P,
}

impl<P: Provider> TransactionService<P> {
    pub fn new(provider: P) -> Self {
        TransactionService { provider }
    }

    /// Creates a transaction for `amount` units of `product_code`.
    ///
    /// A pending transaction is recorded before the provider is called. It is
    /// kept when the provider fails, so that the reference id can be traced.
    ///
    /// # Arguments
    ///
    /// * `catalog` - Catalog holding the product and the ledger.
    /// * `product_code` - Code of an active product.
    /// * `amount` - Number of units, at least 1.
    /// * `additional_information` - JSON object of the buyer form values.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// let transaction = service
    ///     .create(&mut catalog, "MLBB-5", 1, json!({"userId": "123", "zoneId": "4567"}))
    ///     .await?;
    /// println!("{}", transaction.reference_id);
    /// ```
    pub async fn create(
        &self,
        catalog: &mut Catalog,
        product_code: &str,
        amount: u64,
        additional_information: Value,
    ) -> Result<Transaction, LedgerError> {
        if amount < 1 {
            return Err(LedgerError::Invalid("amount must be at least 1".to_owned()));
        }
        if !additional_information.is_object() {
            return Err(LedgerError::Invalid(
                "additional information must be an object".to_owned(),
            ));
        }

        let product = catalog
            .find_product(product_code)
            .filter(|product| product.is_active)
            .ok_or_else(|| LedgerError::NotFound(format!("active product {}", product_code)))?
            .clone();

        let reference_id = generate_reference_id();
        let now = Utc::now();
        catalog.insert_transaction(Transaction {
            reference_id: reference_id.to_owned(),
            transaction_id: None,
            product_code: product.product_code.to_owned(),
            product_name: product.name.to_owned(),
            amount,
            price: product.price * amount as f64,
            status: TransactionStatus::Pending,
            additional_information: additional_information.clone(),
            created_at: now,
            updated_at: now,
        });

        info!(
            "created transaction {} for {} x{}",
            reference_id, product.product_code, amount
        );

        let mut payload = Map::new();
        payload.insert("productCode".to_owned(), json!(product.product_code));
        payload.insert("amount".to_owned(), json!(amount));
        payload.insert("transactionReferenceId".to_owned(), json!(reference_id));
        payload.insert("initialPrice".to_owned(), json!(product.price));
        payload.insert("additionalInformation".to_owned(), additional_information);

        let response = match self.provider.create_transaction(payload).await {
            Ok(response) => response,
            Err(e) => {
                error!("failed to create transaction {} at ditusi: {}", reference_id, e);
                return Err(LedgerError::ProviderFailed {
                    reference_id: Some(reference_id),
                    source: e,
                });
            }
        };

        let transaction_id = lookup(&response, "transactionId");
        let status = lookup(&response, "statusTransaction")
            .and_then(|status| status.parse().ok())
            .unwrap_or(TransactionStatus::Pending);

        let transaction = catalog
            .transaction_mut(&reference_id)
            .ok_or_else(|| LedgerError::NotFound(format!("transaction {}", reference_id)))?;
        transaction.transaction_id = transaction_id;
        transaction.status = status;
        transaction.updated_at = Utc::now();

        info!("transaction {} accepted by ditusi: {}", reference_id, transaction);

        Ok(transaction.clone())
    }

    /// Returns the transaction `id`, a reference id or a provider transaction
    /// id, with its status refreshed from the provider.
    ///
    /// A transaction unknown to the provider, or a failed provider call, keeps
    /// its stored status.
    pub async fn status(&self, catalog: &mut Catalog, id: &str) -> Result<Transaction, LedgerError> {
        let transaction = catalog
            .find_transaction(id)
            .ok_or_else(|| LedgerError::NotFound(format!("transaction {}", id)))?;
        let reference_id = transaction.reference_id.to_owned();

        let Some(transaction_id) = transaction.transaction_id.to_owned() else {
            return Ok(transaction.clone());
        };

        let status = match self.provider.check_transaction(&transaction_id).await {
            Ok(response) => response
                .get("data")
                .and_then(|data| fields::first_string(data, &["transactionStatus"])),
            Err(e) => {
                warn!("failed to check transaction {}: {}", transaction_id, e);
                None
            }
        };

        let transaction = catalog
            .transaction_mut(&reference_id)
            .ok_or_else(|| LedgerError::NotFound(format!("transaction {}", id)))?;

        match status.as_deref().map(str::parse::<TransactionStatus>) {
            Some(Ok(status)) if status != transaction.status => {
                info!(
                    "transaction {} changed from {} to {}",
                    reference_id, transaction.status, status
                );
                transaction.status = status;
                transaction.updated_at = Utc::now();
            }
            Some(Err(e)) => warn!("ignoring status of {}: {}", transaction_id, e),
            _ => {}
        }

        Ok(transaction.clone())
    }

    /// Returns the deposit balance of the account.
    pub async fn balance(&self) -> Result<Balance, LedgerError> {
        let response = self
            .provider
            .check_balance()
            .await
            .map_err(|e| LedgerError::ProviderFailed {
                reference_id: None,
                source: e,
            })?;

        let account = response.get("data").and_then(|data| data.get("data"));

        Ok(Balance {
            balance: account
                .and_then(|account| fields::first_number(account, &["DepositBalance"]))
                .unwrap_or(0.0),
            partner_type: account.and_then(|account| fields::first_string(account, &["partnerType"])),
        })
    }
}

/// Generates a reference id, `TOP-` followed by 10 uppercase alphanumerics.
fn generate_reference_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(REFERENCE_LENGTH)
        .map(char::from)
        .collect();

    format!("{}{}", REFERENCE_PREFIX, suffix.to_uppercase())
}

/// Reads `field` at the top level of a response, else under `data`.
fn lookup(response: &Value, field: &str) -> Option<String> {
    fields::first_string(response, &[field]).or_else(|| {
        response
            .get("data")
            .and_then(|data| fields::first_string(data, &[field]))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{GameAttributes, ProductAttributes};
    use crate::ditusi::MockProvider;

    fn catalog_with_product(is_active: bool) -> Catalog {
        let mut catalog = Catalog::empty("catalog.json");
        let game = catalog.upsert_game(
            "MLBB",
            GameAttributes {
                title: "Mobile Legends".to_owned(),
                product_amount: 1,
                user_information: None,
                is_active: true,
            },
        );
        catalog.upsert_product(
            "MLBB-5",
            ProductAttributes {
                game_id: game.id,
                name: "5 Diamonds".to_owned(),
                code: None,
                description: None,
                price: 1500.0,
                currency: "IDR".to_owned(),
                ingame_currency: Some("Diamonds".to_owned()),
                is_active,
            },
        );
        catalog
    }

    #[test]
    fn test_generate_reference_id() {
        let reference_id = generate_reference_id();

        assert_eq!(reference_id.len(), 14);
        assert!(reference_id.starts_with("TOP-"));
        assert!(
            reference_id[4..]
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        );
        assert_ne!(reference_id, generate_reference_id());
    }

    #[tokio::test]
    async fn test_create_transaction() {
        let mut provider = MockProvider::new();
        provider
            .expect_create_transaction()
            .withf(|payload| {
                payload["productCode"] == "MLBB-5"
                    && payload["amount"] == 2
                    && payload["initialPrice"] == 1500.0
                    && payload["additionalInformation"] == json!({"userId": "123"})
                    && payload["transactionReferenceId"]
                        .as_str()
                        .is_some_and(|id| id.starts_with("TOP-"))
            })
            .times(1)
            .returning(|_| Ok(json!({"transactionId": "DT-1", "statusTransaction": "PROCESS"})));

        let service = TransactionService::new(provider);
        let mut catalog = catalog_with_product(true);

        let transaction = service
            .create(&mut catalog, "MLBB-5", 2, json!({"userId": "123"}))
            .await
            .unwrap();

        assert_eq!(transaction.transaction_id.as_deref(), Some("DT-1"));
        assert_eq!(transaction.status, TransactionStatus::Process);
        assert_eq!(transaction.price, 3000.0);
        assert_eq!(transaction.product_name, "5 Diamonds");
        assert_eq!(catalog.transactions(), &[transaction]);
    }

    #[tokio::test]
    async fn test_create_transaction_unknown_status_is_pending() {
        let mut provider = MockProvider::new();
        provider
            .expect_create_transaction()
            .returning(|_| Ok(json!({"transactionId": "DT-1", "statusTransaction": "QUEUED"})));

        let service = TransactionService::new(provider);
        let mut catalog = catalog_with_product(true);

        let transaction = service
            .create(&mut catalog, "MLBB-5", 1, json!({}))
            .await
            .unwrap();

        assert_eq!(transaction.status, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn test_create_transaction_provider_failure_keeps_pending() {
        let mut provider = MockProvider::new();
        provider.expect_create_transaction().returning(|_| {
            Err(ProviderError::ProviderRejected {
                status: 422,
                body: json!({"message": "insufficient balance"}),
            })
        });

        let service = TransactionService::new(provider);
        let mut catalog = catalog_with_product(true);

        let result = service
            .create(&mut catalog, "MLBB-5", 1, json!({"userId": "123"}))
            .await;

        let Err(LedgerError::ProviderFailed {
            reference_id: Some(reference_id),
            ..
        }) = result
        else {
            panic!("expected a provider failure");
        };
        let transaction = catalog.find_transaction(&reference_id).unwrap();
        assert_eq!(transaction.status, TransactionStatus::Pending);
        assert_eq!(transaction.transaction_id, None);
    }

    #[tokio::test]
    async fn test_create_transaction_rejects_invalid_requests() {
        let mut provider = MockProvider::new();
        provider.expect_create_transaction().never();

        let service = TransactionService::new(provider);
        let mut catalog = catalog_with_product(true);

        assert!(matches!(
            service.create(&mut catalog, "MLBB-5", 0, json!({})).await,
            Err(LedgerError::Invalid(_))
        ));
        assert!(matches!(
            service.create(&mut catalog, "MLBB-5", 1, json!("123")).await,
            Err(LedgerError::Invalid(_))
        ));
        assert!(matches!(
            service.create(&mut catalog, "FF-70", 1, json!({})).await,
            Err(LedgerError::NotFound(_))
        ));
        assert!(catalog.transactions().is_empty());
    }

    #[tokio::test]
    async fn test_create_transaction_inactive_product() {
        let mut provider = MockProvider::new();
        provider.expect_create_transaction().never();

        let service = TransactionService::new(provider);
        let mut catalog = catalog_with_product(false);

        assert!(matches!(
            service.create(&mut catalog, "MLBB-5", 1, json!({})).await,
            Err(LedgerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_status_refreshes_from_provider() {
        let mut provider = MockProvider::new();
        provider
            .expect_create_transaction()
            .returning(|_| Ok(json!({"transactionId": "DT-1"})));
        provider
            .expect_check_transaction()
            .withf(|transaction_id| transaction_id == "DT-1")
            .times(2)
            .returning(|_| Ok(json!({"data": {"transactionStatus": "SUCCESS"}})));

        let service = TransactionService::new(provider);
        let mut catalog = catalog_with_product(true);
        let created = service
            .create(&mut catalog, "MLBB-5", 1, json!({}))
            .await
            .unwrap();
        assert_eq!(created.status, TransactionStatus::Pending);

        let by_reference = service
            .status(&mut catalog, &created.reference_id)
            .await
            .unwrap();
        assert_eq!(by_reference.status, TransactionStatus::Success);

        let by_provider_id = service.status(&mut catalog, "DT-1").await.unwrap();
        assert_eq!(by_provider_id.reference_id, created.reference_id);
        assert_eq!(by_provider_id.status, TransactionStatus::Success);
    }

    #[tokio::test]
    async fn test_status_keeps_stored_status_on_failure() {
        let mut provider = MockProvider::new();
        provider
            .expect_create_transaction()
            .returning(|_| Ok(json!({"transactionId": "DT-1", "statusTransaction": "PROCESS"})));
        provider
            .expect_check_transaction()
            .returning(|_| Err(ProviderError::TransportFailed("timeout".to_owned())));

        let service = TransactionService::new(provider);
        let mut catalog = catalog_with_product(true);
        let created = service
            .create(&mut catalog, "MLBB-5", 1, json!({}))
            .await
            .unwrap();

        let transaction = service.status(&mut catalog, "DT-1").await.unwrap();

        assert_eq!(transaction.status, TransactionStatus::Process);
        assert_eq!(transaction, created);
    }

    #[tokio::test]
    async fn test_status_without_provider_id() {
        let mut provider = MockProvider::new();
        provider
            .expect_create_transaction()
            .returning(|_| Err(ProviderError::AuthFailed));
        provider.expect_check_transaction().never();

        let service = TransactionService::new(provider);
        let mut catalog = catalog_with_product(true);
        let Err(LedgerError::ProviderFailed {
            reference_id: Some(reference_id),
            ..
        }) = service.create(&mut catalog, "MLBB-5", 1, json!({})).await
        else {
            panic!("expected a provider failure");
        };

        let transaction = service.status(&mut catalog, &reference_id).await.unwrap();

        assert_eq!(transaction.status, TransactionStatus::Pending);
        assert!(matches!(
            service.status(&mut catalog, "unknown").await,
            Err(LedgerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_balance() {
        let mut provider = MockProvider::new();
        provider.expect_check_balance().times(1).returning(|| {
            Ok(json!({"data": {"data": {"DepositBalance": 250000, "partnerType": "RESELLER"}}}))
        });

        let service = TransactionService::new(provider);

        assert_eq!(
            service.balance().await.unwrap(),
            Balance {
                balance: 250000.0,
                partner_type: Some("RESELLER".to_owned())
            }
        );
    }

    #[tokio::test]
    async fn test_balance_defaults_and_failure() {
        let mut provider = MockProvider::new();
        let mut calls = 0;
        provider.expect_check_balance().times(2).returning(move || {
            calls += 1;
            if calls == 1 {
                Ok(json!({"data": {}}))
            } else {
                Err(ProviderError::AuthFailed)
            }
        });

        let service = TransactionService::new(provider);

        assert_eq!(
            service.balance().await.unwrap(),
            Balance {
                balance: 0.0,
                partner_type: None
            }
        );
        assert!(matches!(
            service.balance().await,
            Err(LedgerError::ProviderFailed {
                reference_id: None,
                ..
            })
        ));
    }
}
