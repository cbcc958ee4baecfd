//! Periodic synchronization.

use std::time::Duration;

use log::{error, info, warn};
use tokio::time;

use crate::catalog::{Catalog, CatalogSync, SyncReport};
use crate::ditusi::Provider;

/// Imports games then products every `interval` seconds, persisting the
/// catalog after each round.
///
/// Failures are logged and the next round runs as scheduled. Never returns.
pub async fn watch<P: Provider>(catalog_sync: &CatalogSync<P>, catalog: &mut Catalog, interval: u64) {
    info!("syncing with ditusi every {} seconds", interval);
    let mut interval = time::interval(Duration::from_secs(interval.max(1)));

    loop {
        interval.tick().await;

        let report = sync_once(catalog_sync, catalog).await;
        info!("synchronization round done: {}", report);

        if let Err(e) = catalog.persist().await {
            error!("failed to persist catalog: {:#}", e);
        }
    }
}

/// Runs one synchronization round: games, then the products of every known game.
///
/// The products are synchronized even when the games fetch failed, against
/// the games already in the catalog.
async fn sync_once<P: Provider>(catalog_sync: &CatalogSync<P>, catalog: &mut Catalog) -> SyncReport {
    let mut report = SyncReport::default();

    match catalog_sync.sync_games(catalog).await {
        Ok(games_report) => report.merge(games_report),
        Err(e) => {
            warn!("games synchronization failed: {}", e);
            report.failed += 1;
        }
    }

    report.merge(catalog_sync.sync_products(catalog, None).await);

    report
}
