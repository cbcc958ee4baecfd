//! Catalog synchronization with the Ditusi provider.
//!
//! This module provides the [`CatalogSync`] struct that fetches games and
//! products through a [`Provider`] and reconciles them into the [`Catalog`].

use std::{collections::BTreeSet, fmt};

use futures::{StreamExt, stream};
use log::{debug, error, info, warn};
use serde_json::Value;

use crate::catalog::{
    fields,
    models::{GameAttributes, ProductAttributes, UserInformation},
    store::Catalog,
};
use crate::ditusi::{Provider, ProviderError};

const DEFAULT_GAME_TITLE: &str = "Unknown Game";
const DEFAULT_PRODUCT_NAME: &str = "Unknown Product";
const DEFAULT_CURRENCY: &str = "IDR";

/// Outcome of a synchronization run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    /// Records upserted into the catalog
    pub imported: usize,
    /// Records ignored because they could not be identified or attributed
    pub skipped: usize,
    /// Provider calls that failed or returned an unusable payload
    pub failed: usize,
}

impl SyncReport {
    /// Adds the counters of `other` to this report.
    pub fn merge(&mut self, other: SyncReport) {
        self.imported += other.imported;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "imported={}, skipped={}, failed={}",
            self.imported, self.skipped, self.failed
        )
    }
}

/// Synchronizes the catalog with the provider.
///
/// Every operation is idempotent: running it twice against the same provider
/// data leaves the catalog unchanged.
///
/// # Examples
///
/// ```no_run
/// let catalog_sync = CatalogSync::new(client, 4);
/// let mut catalog = Catalog::load(Catalog::path_in("./data")).await?;
/// let report = catalog_sync.sync_games(&mut catalog).await?;
/// catalog_sync.sync_products(&mut catalog, None).await;
/// ```
pub struct CatalogSync<P: Provider> {
    /// Provider to fetch games and products from
    provider: P,
    /// Maximum number of product requests in flight
    concurrency: usize,
}

impl<P: Provider> CatalogSync<P> {
    /// Create a new [CatalogSync].
    ///
    /// # Arguments
    ///
    /// * `provider` - An implementation of the [Provider] trait.
    /// * `concurrency` - Maximum number of concurrent product requests, at least 1.
    pub fn new(provider: P, concurrency: usize) -> Self {
        CatalogSync {
            provider,
            concurrency: concurrency.max(1),
        }
    }

    /// Imports every game returned by the provider.
    ///
    /// Records without a game code are skipped, the rest of the batch goes on.
    ///
    /// # Errors
    ///
    /// Returns the provider error when the call fails, or
    /// [`ProviderError::DataShapeInvalid`] when the response has no non-empty
    /// `data` array. The catalog is left untouched in both cases.
    pub async fn sync_games(&self, catalog: &mut Catalog) -> Result<SyncReport, ProviderError> {
        let response = self.provider.get_games(None).await.inspect_err(|e| {
            error!("failed to fetch games: {}", e);
        })?;

        let records = match response.get("data").and_then(Value::as_array) {
            Some(records) if !records.is_empty() => records,
            _ => {
                error!("games response has no data");
                return Err(ProviderError::DataShapeInvalid(
                    "games response has no data array".to_owned(),
                ));
            }
        };

        info!("found {} games", records.len());

        let mut report = SyncReport::default();
        for record in records {
            let Some(game_code) = fields::first_string(record, fields::GAME_CODE) else {
                warn!("skipping game without code: {}", record);
                report.skipped += 1;
                continue;
            };

            let attributes = GameAttributes {
                title: fields::first_string(record, &["title"])
                    .unwrap_or_else(|| DEFAULT_GAME_TITLE.to_owned()),
                product_amount: fields::first_number(record, &["productAmount"])
                    .filter(|amount| *amount >= 0.0)
                    .map_or(0, |amount| amount as u64),
                user_information: UserInformation::from_provider(record.get("userInformation")),
                is_active: true,
            };

            let game = catalog.upsert_game(&game_code, attributes);
            debug!("synced game {}", game);
            report.imported += 1;
        }

        info!("games synchronization done: {}", report);

        Ok(report)
    }

    /// Imports the products of one game, or of every known game when `scope`
    /// is `None`.
    ///
    /// Product requests run concurrently, bounded by the configured
    /// concurrency. A failed game is logged and counted, the others go on.
    /// The product count of each synchronized game is overwritten with the
    /// number of products imported for it.
    pub async fn sync_products(&self, catalog: &mut Catalog, scope: Option<&str>) -> SyncReport {
        let mut report = SyncReport::default();

        let game_codes: Vec<String> = match scope {
            Some(game_code) if catalog.find_game(game_code).is_none() => {
                warn!("unknown game {}, import games first", game_code);
                report.failed += 1;
                return report;
            }
            Some(game_code) => vec![game_code.to_owned()],
            None => catalog
                .games()
                .into_iter()
                .map(|game| game.game_code.to_owned())
                .collect(),
        };

        let responses: Vec<(String, Result<Value, ProviderError>)> = stream::iter(game_codes)
            .map(|game_code| async move {
                debug!("fetching products of {}", game_code);
                let response = self
                    .provider
                    .get_products(Some(game_code.to_owned()), None)
                    .await;
                (game_code, response)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for (game_code, response) in responses {
            let response = match response {
                Ok(response) => response,
                Err(e) => {
                    error!("failed to fetch products of {}: {}", game_code, e);
                    report.failed += 1;
                    continue;
                }
            };

            let Some(records) = fields::records(&response) else {
                warn!("products response of {} has no data", game_code);
                report.failed += 1;
                continue;
            };

            report.merge(self.import_game_products(catalog, &game_code, records));
        }

        info!("products synchronization done: {}", report);

        report
    }

    /// Imports the unfiltered product list.
    ///
    /// Each record is attributed to a game by its `gameCode` field, else by the
    /// prefix of its product code. Records that cannot be attributed to a known
    /// game are skipped. The product counts of the touched games are recomputed
    /// from the catalog.
    ///
    /// # Errors
    ///
    /// Same as [`Self::sync_games`].
    pub async fn sync_product_list(
        &self,
        catalog: &mut Catalog,
    ) -> Result<SyncReport, ProviderError> {
        let response = self.provider.get_products(None, None).await.inspect_err(|e| {
            error!("failed to fetch products: {}", e);
        })?;

        let Some(records) = fields::records(&response) else {
            error!("products response has no data");
            return Err(ProviderError::DataShapeInvalid(
                "products response has no data array".to_owned(),
            ));
        };

        info!("found {} products", records.len());

        let mut report = SyncReport::default();
        let mut touched_games = BTreeSet::new();

        for record in records {
            let Some(product_code) = fields::first_string(record, fields::PRODUCT_CODE) else {
                warn!("skipping product without code: {}", record);
                report.skipped += 1;
                continue;
            };

            let game_code = fields::first_string(record, &["gameCode"])
                .or_else(|| fields::game_code_prefix(&product_code));

            let Some(game) = game_code.as_deref().and_then(|code| catalog.find_game(code)) else {
                warn!("skipping product {}: no known game matches", product_code);
                report.skipped += 1;
                continue;
            };

            let game_id = game.id;
            touched_games.insert(game.game_code.to_owned());

            let product = catalog.upsert_product(&product_code, product_attributes(game_id, record));
            debug!("synced product {}", product);
            report.imported += 1;
        }

        for game_code in touched_games {
            let count = catalog
                .find_game(&game_code)
                .map_or(0, |game| catalog.products_of(game.id).len());
            catalog.set_product_amount(&game_code, count as u64);
        }

        info!("product list synchronization done: {}", report);

        Ok(report)
    }

    /// Upserts the product `records` of `game_code`, then overwrites the game
    /// product count with the number of imported records.
    fn import_game_products(
        &self,
        catalog: &mut Catalog,
        game_code: &str,
        records: &[Value],
    ) -> SyncReport {
        let mut report = SyncReport::default();

        // The game may have been removed since the fetch was scheduled
        let Some(game_id) = catalog.find_game(game_code).map(|game| game.id) else {
            warn!("game {} disappeared from the catalog", game_code);
            report.skipped += records.len();
            return report;
        };

        for record in records {
            let Some(product_code) = fields::first_string(record, fields::PRODUCT_CODE) else {
                warn!("skipping product of {} without code: {}", game_code, record);
                report.skipped += 1;
                continue;
            };

            let product = catalog.upsert_product(&product_code, product_attributes(game_id, record));
            debug!("synced product {}", product);
            report.imported += 1;
        }

        catalog.set_product_amount(game_code, report.imported as u64);
        info!("synced {} products of {}", report.imported, game_code);

        report
    }
}

/// Builds the product attributes of a provider record.
fn product_attributes(game_id: u64, record: &Value) -> ProductAttributes {
    ProductAttributes {
        game_id,
        name: fields::first_string(record, &["name"])
            .unwrap_or_else(|| DEFAULT_PRODUCT_NAME.to_owned()),
        code: fields::first_string(record, &["code"]),
        description: fields::first_string(record, &["description"]),
        price: fields::first_number(record, &["price"]).unwrap_or(0.0),
        currency: fields::first_string(record, fields::CURRENCY)
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_owned()),
        ingame_currency: fields::first_string(record, fields::INGAME_CURRENCY),
        is_active: true,
    }
}
