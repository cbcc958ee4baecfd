//! Configuration file structures for ditusi-sync.
//!
//! The configuration is a YAML file split into two sections: the Ditusi account
//! settings and the catalog synchronization settings.
//!
//! # Configuration File Format
//!
//! ```yaml
//! ditusi:
//!   # Production base URL, only used to issue access tokens
//!   base_url: "https://api.ditusi.co.id/api/v1"
//!   # Sandbox base URL, used by every service call
//!   dev_base_url: "https://api.ditusi.co.id/api/dev/v1"
//!   client_id: "your-client-id"
//!   client_key: "your-client-key"
//!   # Token lifetime in seconds when the provider does not declare one
//!   token_cache_time: 600
//!   # HTTP timeout in seconds
//!   timeout: 30
//!   # local, development and testing skip TLS certificate verification
//!   environment: "production"
//!
//! sync:
//!   # Seconds between two synchronizations of the `sync` command
//!   interval: 3600
//!   # Maximum number of product requests in flight
//!   concurrency: 4
//! ```
//!
//! # Environment Variable Overrides
//!
//! Every value can be overridden with a `DITUSI_SYNC_` prefixed variable,
//! sections being separated by `__`:
//!
//! ```bash
//! export DITUSI_SYNC_DITUSI__CLIENT_ID="your-client-id"
//! export DITUSI_SYNC_DITUSI__CLIENT_KEY="your-client-key"
//! ```

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::Deserialize;

/// Prefix of the environment variables overriding the configuration file.
const ENV_PREFIX: &str = "DITUSI_SYNC_";

/// Root configuration structure.
#[derive(Deserialize, Debug)]
pub struct Config {
    /// Ditusi account configuration
    pub ditusi: Ditusi,
    /// Catalog synchronization configuration
    #[serde(default)]
    pub sync: SyncSettings,
}

/// Ditusi account configuration.
#[derive(Deserialize, Debug, Clone)]
pub struct Ditusi {
    /// Production base URL, without trailing slash.
    ///
    /// Access tokens are always requested from this URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Sandbox base URL, without trailing slash.
    ///
    /// Games, products, transactions and balance are requested from this URL.
    #[serde(default = "default_dev_base_url")]
    pub dev_base_url: String,

    /// Client id sent in `X-CLIENT-ID`.
    pub client_id: String,

    /// Secret client key used to sign requests. Never sent nor logged.
    pub client_key: String,

    /// Token lifetime in seconds when the token response has no expiry.
    #[serde(default = "default_token_cache_time")]
    pub token_cache_time: u64,

    /// HTTP timeout in seconds, applied to every provider call.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Execution environment.
    ///
    /// `local`, `development` and `testing` disable TLS certificate verification.
    #[serde(default = "default_environment")]
    pub environment: String,
}

/// Catalog synchronization configuration.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Seconds between two synchronizations of the `sync` command.
    #[serde(default = "default_interval")]
    pub interval: u64,

    /// Maximum number of concurrent product requests.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            interval: default_interval(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.ditusi.co.id/api/v1".to_owned()
}

fn default_dev_base_url() -> String {
    "https://api.ditusi.co.id/api/dev/v1".to_owned()
}

fn default_token_cache_time() -> u64 {
    600
}

fn default_timeout() -> u64 {
    30
}

fn default_environment() -> String {
    "production".to_owned()
}

fn default_interval() -> u64 {
    3600
}

fn default_concurrency() -> usize {
    4
}

impl Config {
    /// Loads the configuration from a YAML file, then applies the
    /// `DITUSI_SYNC_` environment variables.
    ///
    /// Trailing slashes of the base URLs are removed.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or a required value (`client_id`,
    /// `client_key`) is missing from both the file and the environment.
    pub fn load(path: &str) -> Result<Self, figment::Error> {
        let mut config: Config = Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        config.ditusi.base_url = config.ditusi.base_url.trim_end_matches('/').to_owned();
        config.ditusi.dev_base_url = config.ditusi.dev_base_url.trim_end_matches('/').to_owned();
        config.sync.concurrency = config.sync.concurrency.max(1);

        Ok(config)
    }
}

#[cfg(test)]
impl Ditusi {
    /// Configuration pointing both base URLs at a mock server.
    pub fn for_server(url: &str) -> Self {
        Ditusi {
            base_url: format!("{}/api/v1", url),
            dev_base_url: format!("{}/api/dev/v1", url),
            client_id: "client-id".to_owned(),
            client_key: "client-key".to_owned(),
            token_cache_time: default_token_cache_time(),
            timeout: 5,
            environment: "testing".to_owned(),
        }
    }
}
