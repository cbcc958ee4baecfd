//! Command line subcommands.
//!
//! This module maps the parsed subcommand onto the catalog and ledger services,
//! then prints the outcome.
//!
//! # Flow
//!
//! ```text
//! Args ─▶ run() ─▶ load catalog ─▶ action handler ─▶ persist catalog ─▶ stdout
//! ```
//!
//! # Available Commands
//!
//! | Command | Arguments | Description |
//! |---------|-----------|-------------|
//! | `import` | `--games`, `--products`, `--game <code>`, `--all`, `--flat`, `--debug` | Import the catalog once. `--game` imports the products of one game |
//! | `sync` | None | Import games and products every `sync.interval` seconds |
//! | `report` | None | Print the catalog, products grouped by game, then the transactions |
//! | `balance` | None | Print the account deposit balance |
//! | `transaction create` | `<product_code> <amount> --info key=value...` | Create a top-up transaction |
//! | `transaction status` | `<id>` | Refresh and print a transaction |
//!
//! The catalog is persisted after every command that may change it, including
//! when the command failed halfway.

mod actions;
mod response;

use std::sync::Arc;

use anyhow::Context;
use clap::Subcommand;
use log::debug;

use crate::{
    catalog::{Catalog, CatalogSync},
    commands::actions::{
        ImportOptions, handle_balance, handle_create, handle_import, handle_status, watch,
    },
    config::Config,
    ditusi::{DitusiClient, MemoryCache},
    ledger::TransactionService,
};

/// Subcommands of ditusi-sync.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Import games and products from Ditusi into the catalog.
    Import {
        /// Import games
        #[arg(long)]
        games: bool,
        /// Import the products of every known game
        #[arg(long)]
        products: bool,
        /// Import both games and products
        #[arg(long)]
        all: bool,
        /// Import the unfiltered product list, attributing products by code
        #[arg(long)]
        flat: bool,
        /// Import the products of this game code only
        #[arg(long, value_name = "GAME_CODE")]
        game: Option<String>,
        /// Log provider requests and responses
        #[arg(long)]
        debug: bool,
    },
    /// Import games and products periodically, until interrupted.
    Sync,
    /// Print the imported games and products.
    Report,
    /// Print the account deposit balance.
    Balance,
    /// Create or follow top-up transactions.
    Transaction {
        #[command(subcommand)]
        action: TransactionCommand,
    },
}

/// Transaction subcommands.
#[derive(Subcommand, Debug)]
pub enum TransactionCommand {
    /// Create a transaction and send it to Ditusi.
    Create {
        /// Code of an active product
        product_code: String,
        /// Number of units
        amount: u64,
        /// Buyer form value, repeatable
        #[arg(long = "info", value_name = "KEY=VALUE", value_parser = parse_info)]
        info: Vec<(String, String)>,
    },
    /// Refresh and print a transaction.
    Status {
        /// Reference id or Ditusi transaction id
        id: String,
    },
}

impl Command {
    /// Returns true when the command asked for debug output.
    pub fn is_debug(&self) -> bool {
        matches!(self, Command::Import { debug: true, .. })
    }
}

/// Parses a `key=value` buyer form value.
fn parse_info(pair: &str) -> Result<(String, String), String> {
    match pair.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_owned(), value.to_owned()))
        }
        _ => Err(format!("expected KEY=VALUE, got {}", pair)),
    }
}

/// Runs `command` against the catalog of the `data_dir` directory.
///
/// # Errors
///
/// Fails when the provider client cannot be built, the catalog cannot be
/// loaded or persisted, or the command itself fails.
pub async fn run(command: Command, config: Config, data_dir: &str) -> anyhow::Result<()> {
    let client = DitusiClient::new(&config.ditusi, Arc::new(MemoryCache::new()))
        .context("failed to build the ditusi client")?;
    let mut catalog = Catalog::load(Catalog::path_in(data_dir)).await?;

    debug!("running {:?}", command);

    match command {
        Command::Import {
            games,
            products,
            all,
            flat,
            game,
            debug: _,
        } => {
            let catalog_sync = CatalogSync::new(client, config.sync.concurrency);
            let options = ImportOptions::from_flags(games, products, all, flat, game);
            let result = handle_import(&catalog_sync, &mut catalog, &options).await;
            catalog.persist().await?;
            println!("{}", response::format_sync_report(&result?));
        }
        Command::Sync => {
            let catalog_sync = CatalogSync::new(client, config.sync.concurrency);
            watch(&catalog_sync, &mut catalog, config.sync.interval).await;
        }
        Command::Report => {
            print!("{}", response::format_catalog(&catalog));
            print!("{}", response::format_ledger(&catalog));
        }
        Command::Balance => {
            let service = TransactionService::new(client);
            let balance = handle_balance(&service).await?;
            println!("{}", response::format_balance(&balance));
        }
        Command::Transaction { action } => {
            let service = TransactionService::new(client);
            let result = match action {
                TransactionCommand::Create {
                    product_code,
                    amount,
                    info,
                } => handle_create(&service, &mut catalog, &product_code, amount, info).await,
                TransactionCommand::Status { id } => {
                    handle_status(&service, &mut catalog, &id).await
                }
            };
            catalog.persist().await?;
            println!("{}", response::format_transaction(&result?));
        }
    }

    Ok(())
}
