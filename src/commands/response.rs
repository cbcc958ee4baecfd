//! Plain text formatters of command outputs.

use std::fmt::Write;

use crate::catalog::{Catalog, SyncReport, Transaction};
use crate::ledger::Balance;

/// Formats an import report.
///
/// # Examples
///
/// ```
/// let report = SyncReport { imported: 3, skipped: 1, failed: 0 };
/// assert_eq!(format_sync_report(&report), "Imported 3 records (1 skipped, 0 failed).");
/// ```
pub fn format_sync_report(report: &SyncReport) -> String {
    format!(
        "Imported {} records ({} skipped, {} failed).",
        report.imported, report.skipped, report.failed
    )
}

/// Formats the catalog, each game followed by its products.
///
/// Returns "No games found." when the catalog is empty.
pub fn format_catalog(catalog: &Catalog) -> String {
    let games = catalog.games();
    if games.is_empty() {
        return "No games found.\n".to_owned();
    }

    let mut body = String::new();
    for game in games {
        let products = catalog.products_of(game.id);
        let _ = writeln!(
            body,
            "{} ({}): {} products",
            game.title,
            game.game_code,
            products.len()
        );

        if let Some(user_information) = &game.user_information {
            let forms: Vec<String> = user_information
                .forms
                .iter()
                .map(|form| format!("{}:{}", form.name, form.kind))
                .collect();
            let _ = writeln!(body, "  forms: {}", forms.join(", "));
        }

        for product in products {
            let _ = writeln!(
                body,
                "  - {} {}: {} {}{}",
                product.product_code,
                product.name,
                product.price,
                product.currency,
                if product.is_active { "" } else { " (inactive)" }
            );
        }
    }

    body
}

/// Formats the transaction ledger, one transaction per line.
pub fn format_ledger(catalog: &Catalog) -> String {
    catalog
        .transactions()
        .iter()
        .map(|transaction| format!("{}\n", format_transaction(transaction)))
        .collect()
}

pub fn format_balance(balance: &Balance) -> String {
    match &balance.partner_type {
        Some(partner_type) => format!("Deposit balance: {} ({})", balance.balance, partner_type),
        None => format!("Deposit balance: {}", balance.balance),
    }
}

pub fn format_transaction(transaction: &Transaction) -> String {
    format!(
        "{} {}: {} x{} for {}, ditusi id {}",
        transaction.reference_id,
        transaction.status,
        transaction.product_name,
        transaction.amount,
        transaction.price,
        transaction.transaction_id.as_deref().unwrap_or("-")
    )
}
