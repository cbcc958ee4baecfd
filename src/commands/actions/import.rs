//! Import command handler.
//!
//! Imports games, the products of the known games, or the flat product list,
//! in that order. Fails when there is nothing to import, when the games cannot
//! be fetched, or when products are requested while the catalog has no game.

use anyhow::{Context, bail};
use log::info;

use crate::catalog::{Catalog, CatalogSync, SyncReport};
use crate::ditusi::Provider;

/// What the import command should import.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportOptions {
    pub games: bool,
    pub products: bool,
    pub flat: bool,
    /// Restricts the product import to this game code
    pub game: Option<String>,
}

impl ImportOptions {
    /// Builds the options from the `import` flags.
    ///
    /// `--all` selects games and products. A `--game` scope selects products.
    pub fn from_flags(
        games: bool,
        products: bool,
        all: bool,
        flat: bool,
        game: Option<String>,
    ) -> Self {
        ImportOptions {
            games: games || all,
            products: products || all || game.is_some(),
            flat,
            game,
        }
    }
}

/// Runs the requested imports and returns the merged report.
pub async fn handle_import<P: Provider>(
    catalog_sync: &CatalogSync<P>,
    catalog: &mut Catalog,
    options: &ImportOptions,
) -> anyhow::Result<SyncReport> {
    if !options.games && !options.products && !options.flat {
        bail!("please specify what to import: --games, --products, --all or --flat");
    }

    let mut report = SyncReport::default();

    if options.games {
        info!("importing games from ditusi...");
        let games_report = catalog_sync
            .sync_games(catalog)
            .await
            .context("failed to import games")?;
        report.merge(games_report);
    }

    if options.products {
        if catalog.games().is_empty() {
            bail!("no games found in the catalog, import games first");
        }

        info!("importing products from ditusi...");
        report.merge(
            catalog_sync
                .sync_products(catalog, options.game.as_deref())
                .await,
        );
    }

    if options.flat {
        info!("importing the product list from ditusi...");
        let list_report = catalog_sync
            .sync_product_list(catalog)
            .await
            .context("failed to import the product list")?;
        report.merge(list_report);
    }

    Ok(report)
}
