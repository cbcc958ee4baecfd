//! ditusi-sync - Ditusi top-up provider client.
//!
//! This is the main entry point of ditusi-sync, which keeps a local catalog of
//! the games and products sold by the Ditusi game top-up provider and relays
//! top-up transactions to it.
//!
//! # Overview
//!
//! Every Ditusi call is signed with the account client key and authorized with
//! a short-lived bearer token. ditusi-sync obtains and caches the token, signs
//! each request, and retries once with a fresh token when the provider reports
//! the token as expired or invalid.
//!
//! # Features
//!
//! - **Catalog Import**: Import games, the products of each game, or the flat product list
//! - **Periodic Sync**: Re-import games and products on a fixed interval
//! - **Transactions**: Create top-up transactions and follow their status
//! - **Balance**: Report the account deposit balance
//! - **YAML Configuration**: Simple configuration file format with environment variable support
//!
//! # Configuration
//!
//! Create a `config.yaml` file with your settings:
//!
//! ```yaml
//! ditusi:
//!   client_id: "your-client-id"
//!   client_key: "your-client-key"
//!
//! sync:
//!   interval: 3600
//! ```
//!
//! # Environment Variable Overrides
//!
//! Override any configuration value using environment variables with the `DITUSI_SYNC_` prefix:
//!
//! ```bash
//! export DITUSI_SYNC_DITUSI__CLIENT_ID="your-client-id"
//! export DITUSI_SYNC_DITUSI__CLIENT_KEY="your-client-key"
//! ```
//!
//! # Usage
//!
//! ```bash
//! ditusi-sync --config config.yaml --data ./data import --all
//! ditusi-sync --config config.yaml --data ./data sync
//! ditusi-sync --config config.yaml --data ./data report
//! ditusi-sync --config config.yaml --data ./data balance
//! ditusi-sync --config config.yaml --data ./data transaction create MLBB-5 1 --info userId=123
//! ditusi-sync --config config.yaml --data ./data transaction status TOP-7KQ2M9XA1B
//! ```
//!
//! # Architecture
//!
//! - [`catalog`] - Local games, products and transactions, and their synchronization
//! - [`commands`] - Command line subcommands and their handlers
//! - [`config`] - YAML configuration file structures and loading with environment variable support
//! - [`ditusi`] - Ditusi API client: signatures, tokens and signed requests
//! - [`ledger`] - Transaction creation, status refresh and balance
//!
//! # Environment Variables
//!
//! - `RUST_LOG` - Controls logging level (default: `info`, `debug` with `import --debug`)

use std::process::ExitCode;

use clap::Parser;
use env_logger::Env;
use log::{error, info};

use crate::{commands::Command, config::Config};

mod catalog;
mod commands;
mod config;
mod ditusi;
mod ledger;

/// Command-line arguments of ditusi-sync.
///
/// # Examples
///
/// ```bash
/// ditusi-sync --config config.yaml --data ./data import --all
/// ```
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the YAML configuration file.
    ///
    /// See the [`config`] module for the expected format.
    #[arg(short, long)]
    config: String,

    /// Path to the directory holding the catalog file.
    ///
    /// The directory is created on first write. It contains `catalog.json`,
    /// the imported games and products and the transaction ledger.
    #[arg(short, long)]
    data: String,

    #[command(subcommand)]
    command: Command,
}

/// Main entry point of ditusi-sync.
///
/// 1. **Argument Parsing**: Parses command-line arguments using `clap`
/// 2. **Logging Setup**: Configures the logger with `info` level by default
///    (`debug` for `import --debug`, overridden by `RUST_LOG`)
/// 3. **Configuration Loading**: Reads the YAML configuration file and applies
///    environment variable overrides
/// 4. **Command Execution**: Runs the subcommand against the catalog of the
///    data directory
///
/// Exits with code 1 when the configuration cannot be loaded or the command fails.
#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.command.is_debug() {
        "debug"
    } else {
        "info"
    };
    let env = Env::default().filter_or("RUST_LOG", default_level);
    env_logger::init_from_env(env);

    info!("Starting ditusi-sync {}...", env!("CARGO_PKG_VERSION"));

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load config file: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match commands::run(args.command, config, &args.data).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
