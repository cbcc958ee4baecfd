//! Catalog persistence layer.
//!
//! This module provides the [`Catalog`], the local store of games, products and
//! transactions. Rows are upserted by their unique code and the whole catalog is
//! serialized to a JSON file.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use anyhow::Context;
use chrono::Utc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::catalog::models::{
    Game, GameAttributes, Product, ProductAttributes, Transaction,
};

/// Name of the catalog file inside the data directory.
pub const CATALOG_FILE: &str = "catalog.json";

/// Serialized content of the catalog file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogData {
    /// Games by game code
    games: BTreeMap<String, Game>,
    /// Products by product code
    products: BTreeMap<String, Product>,
    transactions: Vec<Transaction>,
}

/// Local catalog of games and products, and ledger of transactions.
///
/// # Examples
///
/// ```no_run
/// let mut catalog = Catalog::load(Catalog::path_in("./data")).await?;
/// catalog.upsert_game("MLBB", attributes);
/// catalog.persist().await?;
/// ```
#[derive(Debug)]
pub struct Catalog {
    /// Path of the JSON file backing the catalog
    path: PathBuf,
    data: CatalogData,
}

impl Catalog {
    /// Returns the catalog file path inside `data_dir`.
    pub fn path_in(data_dir: &str) -> PathBuf {
        Path::new(data_dir).join(CATALOG_FILE)
    }

    /// Creates an empty catalog backed by `path`, without touching the disk.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Catalog {
            path: path.into(),
            data: CatalogData::default(),
        }
    }

    /// Loads the catalog from `path`.
    ///
    /// A missing file yields an empty catalog.
    ///
    /// # Errors
    ///
    /// Fails when the file exists but cannot be read or deserialized, so that
    /// a corrupted ledger is never silently replaced.
    pub async fn load(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();

        let serialized = match fs::read_to_string(&path).await {
            Ok(serialized) => serialized,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    "no catalog found at {}, starting with an empty catalog",
                    path.display()
                );
                return Ok(Catalog::empty(path));
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()));
            }
        };

        let data: CatalogData = serde_json::from_str(&serialized)
            .with_context(|| format!("failed to deserialize catalog {}", path.display()))?;

        info!(
            "loaded catalog with {} games, {} products and {} transactions",
            data.games.len(),
            data.products.len(),
            data.transactions.len()
        );

        Ok(Catalog { path, data })
    }

    /// Writes the catalog to disk.
    ///
    /// The content is written to a temporary file first and renamed over the
    /// catalog file, so a failed write leaves the previous catalog intact.
    pub async fn persist(&self) -> anyhow::Result<()> {
        let serialized =
            serde_json::to_string_pretty(&self.data).context("failed to serialize catalog")?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, serialized)
            .await
            .with_context(|| format!("failed to write {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .await
            .with_context(|| format!("failed to replace {}", self.path.display()))?;

        debug!("persisted catalog to {}", self.path.display());

        Ok(())
    }

    /// Games ordered by game code.
    pub fn games(&self) -> Vec<&Game> {
        self.data.games.values().collect()
    }

    pub fn find_game(&self, game_code: &str) -> Option<&Game> {
        self.data.games.get(game_code)
    }

    /// Inserts the game `game_code` or updates its attributes.
    ///
    /// An existing game keeps its id and creation date; its update date only
    /// changes when an attribute does.
    pub fn upsert_game(&mut self, game_code: &str, attributes: GameAttributes) -> Game {
        let now = Utc::now();
        let next_id = self.data.games.values().map(|g| g.id).max().unwrap_or(0) + 1;

        let game = self
            .data
            .games
            .entry(game_code.to_owned())
            .and_modify(|game| {
                let changed = game.title != attributes.title
                    || game.product_amount != attributes.product_amount
                    || game.user_information != attributes.user_information
                    || game.is_active != attributes.is_active;
                if changed {
                    game.title = attributes.title.to_owned();
                    game.product_amount = attributes.product_amount;
                    game.user_information = attributes.user_information.to_owned();
                    game.is_active = attributes.is_active;
                    game.updated_at = now;
                }
            })
            .or_insert_with(|| Game {
                id: next_id,
                game_code: game_code.to_owned(),
                title: attributes.title.to_owned(),
                product_amount: attributes.product_amount,
                user_information: attributes.user_information.to_owned(),
                is_active: attributes.is_active,
                created_at: now,
                updated_at: now,
            });

        game.clone()
    }

    /// Overwrites the product count of a game.
    pub fn set_product_amount(&mut self, game_code: &str, product_amount: u64) {
        if let Some(game) = self.data.games.get_mut(game_code) {
            if game.product_amount != product_amount {
                game.product_amount = product_amount;
                game.updated_at = Utc::now();
            }
        }
    }

    /// Products ordered by product code.
    pub fn products(&self) -> Vec<&Product> {
        self.data.products.values().collect()
    }

    pub fn find_product(&self, product_code: &str) -> Option<&Product> {
        self.data.products.get(product_code)
    }

    /// Products of the game with local id `game_id`.
    pub fn products_of(&self, game_id: u64) -> Vec<&Product> {
        self.data
            .products
            .values()
            .filter(|product| product.game_id == game_id)
            .collect()
    }

    /// Inserts the product `product_code` or updates its attributes.
    ///
    /// Same id and date rules as [`Self::upsert_game`].
    pub fn upsert_product(&mut self, product_code: &str, attributes: ProductAttributes) -> Product {
        let now = Utc::now();
        let next_id = self.data.products.values().map(|p| p.id).max().unwrap_or(0) + 1;

        let product = self
            .data
            .products
            .entry(product_code.to_owned())
            .and_modify(|product| {
                let current = ProductAttributes {
                    game_id: product.game_id,
                    name: product.name.to_owned(),
                    code: product.code.to_owned(),
                    description: product.description.to_owned(),
                    price: product.price,
                    currency: product.currency.to_owned(),
                    ingame_currency: product.ingame_currency.to_owned(),
                    is_active: product.is_active,
                };
                if current != attributes {
                    product.game_id = attributes.game_id;
                    product.name = attributes.name.to_owned();
                    product.code = attributes.code.to_owned();
                    product.description = attributes.description.to_owned();
                    product.price = attributes.price;
                    product.currency = attributes.currency.to_owned();
                    product.ingame_currency = attributes.ingame_currency.to_owned();
                    product.is_active = attributes.is_active;
                    product.updated_at = now;
                }
            })
            .or_insert_with(|| Product {
                id: next_id,
                product_code: product_code.to_owned(),
                game_id: attributes.game_id,
                name: attributes.name.to_owned(),
                code: attributes.code.to_owned(),
                description: attributes.description.to_owned(),
                price: attributes.price,
                currency: attributes.currency.to_owned(),
                ingame_currency: attributes.ingame_currency.to_owned(),
                is_active: attributes.is_active,
                created_at: now,
                updated_at: now,
            });

        product.clone()
    }

    /// Records a new transaction.
    pub fn insert_transaction(&mut self, transaction: Transaction) {
        self.data.transactions.push(transaction);
    }

    /// Finds a transaction by reference id or by provider transaction id.
    pub fn find_transaction(&self, id: &str) -> Option<&Transaction> {
        self.data.transactions.iter().find(|transaction| {
            transaction.reference_id == id || transaction.transaction_id.as_deref() == Some(id)
        })
    }

    /// Mutable access to the transaction with reference id `reference_id`.
    pub fn transaction_mut(&mut self, reference_id: &str) -> Option<&mut Transaction> {
        self.data
            .transactions
            .iter_mut()
            .find(|transaction| transaction.reference_id == reference_id)
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.data.transactions
    }
}
