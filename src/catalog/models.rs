//! Rows of the local catalog and ledger.
//!
//! This module defines games, products and transactions as they are stored,
//! independently of the provider payloads they are built from.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::fields;

/// A game offered by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    /// Local identifier, stable across synchronizations
    pub id: u64,
    /// Provider game code, unique
    pub game_code: String,
    pub title: String,
    /// Number of products, overwritten with the imported count on product sync
    pub product_amount: u64,
    /// Forms the buyer must fill to top up this game
    pub user_information: Option<UserInformation>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Display for Game {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "id={}, game_code={}, title={}, product_amount={}",
            self.id, self.game_code, self.title, self.product_amount
        )
    }
}

/// Attributes of a game upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct GameAttributes {
    pub title: String,
    pub product_amount: u64,
    pub user_information: Option<UserInformation>,
    pub is_active: bool,
}

/// Buyer forms of a game, `{"forms": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInformation {
    pub forms: Vec<Form>,
}

/// One buyer form field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Form {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

impl UserInformation {
    /// Normalizes the provider `userInformation` array.
    ///
    /// Returns `None` when the value is absent, not an array, or empty. Missing
    /// names default to an empty string and missing types to `text`.
    pub fn from_provider(value: Option<&Value>) -> Option<Self> {
        let forms: Vec<Form> = value?
            .as_array()?
            .iter()
            .map(|form| Form {
                name: fields::first_string(form, &["name"]).unwrap_or_default(),
                kind: fields::first_string(form, &["type"]).unwrap_or_else(|| "text".to_owned()),
                options: fields::first(form, &["options"]).cloned(),
            })
            .collect();

        if forms.is_empty() {
            return None;
        }

        Some(UserInformation { forms })
    }
}

/// A product, a purchasable top-up of a game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: u64,
    /// Provider product code, unique
    pub product_code: String,
    /// Local id of the owning game
    pub game_id: u64,
    pub name: String,
    /// Secondary provider code
    pub code: Option<String>,
    pub description: Option<String>,
    pub price: f64,
    pub currency: String,
    /// Name of the in-game currency, e.g. `Diamonds`
    pub ingame_currency: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "id={}, product_code={}, name={}, price={} {}",
            self.id, self.product_code, self.name, self.price, self.currency
        )
    }
}

/// Attributes of a product upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductAttributes {
    pub game_id: u64,
    pub name: String,
    pub code: Option<String>,
    pub description: Option<String>,
    pub price: f64,
    pub currency: String,
    pub ingame_currency: Option<String>,
    pub is_active: bool,
}

/// Status of a top-up transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    Pending,
    Process,
    Success,
    Expired,
    Rejected,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let status = match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Process => "PROCESS",
            TransactionStatus::Success => "SUCCESS",
            TransactionStatus::Expired => "EXPIRED",
            TransactionStatus::Rejected => "REJECTED",
        };
        write!(f, "{}", status)
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(status: &str) -> Result<Self, Self::Err> {
        match status.trim().to_uppercase().as_str() {
            "PENDING" => Ok(TransactionStatus::Pending),
            "PROCESS" => Ok(TransactionStatus::Process),
            "SUCCESS" => Ok(TransactionStatus::Success),
            "EXPIRED" => Ok(TransactionStatus::Expired),
            "REJECTED" => Ok(TransactionStatus::Rejected),
            _ => Err(format!("unknown transaction status {}", status)),
        }
    }
}

/// A top-up transaction of the local ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Locally generated identifier, unique
    pub reference_id: String,
    /// Provider transaction id, known once the provider accepted the transaction
    pub transaction_id: Option<String>,
    pub product_code: String,
    pub product_name: String,
    pub amount: u64,
    /// Unit price multiplied by the amount
    pub price: f64,
    pub status: TransactionStatus,
    /// Buyer form values sent to the provider
    pub additional_information: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "reference_id={}, transaction_id={}, product_code={}, amount={}, price={}, status={}",
            self.reference_id,
            self.transaction_id.as_deref().unwrap_or("-"),
            self.product_code,
            self.amount,
            self.price,
            self.status
        )
    }
}
