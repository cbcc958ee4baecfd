//! Ditusi top-up provider integration.
//!
//! This module provides everything needed to talk to the Ditusi API: signing,
//! token lifecycle, and the signed request path with its single token retry.
//!
//! # Modules
//!
//! - `signature` - SHA-256 request signatures and the signing timestamp
//! - `cache` - Injected token cache abstraction and its in-memory implementation
//! - `token_manager` - Access token issuance, caching and forced refresh
//! - `client` - Signed requests, response classification and endpoint wrappers
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use ditusi_sync::ditusi::{DitusiClient, MemoryCache, Provider};
//!
//! # async fn example(config: &ditusi_sync::config::Ditusi) -> Result<(), Box<dyn std::error::Error>> {
//! let client = DitusiClient::new(config, Arc::new(MemoryCache::new()))?;
//! let games = client.get_games(None).await?;
//! # Ok(())
//! # }
//! ```

mod cache;
mod client;
mod signature;
mod token_manager;

use std::fmt;

use serde_json::Value;

pub use crate::ditusi::cache::{MemoryCache, TokenCache};
#[cfg(test)]
pub use crate::ditusi::client::MockProvider;
pub use crate::ditusi::client::{DitusiClient, Provider};
pub use crate::ditusi::token_manager::TokenManager;

/// Environments where TLS certificate verification is skipped.
const INSECURE_ENVIRONMENTS: [&str; 3] = ["local", "development", "testing"];

/// Returns true when TLS certificates must not be verified in `environment`.
pub fn skip_tls_verification(environment: &str) -> bool {
    INSECURE_ENVIRONMENTS.contains(&environment)
}

/// Parses a response body, keeping a non-JSON body as a JSON string.
fn parse_body(text: String) -> Value {
    serde_json::from_str::<Value>(&text).unwrap_or_else(|_| Value::String(text))
}

/// HTTP methods used by the Ditusi API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
        }
    }
}

/// Errors returned by the Ditusi client.
///
/// Every failure of a provider call ends up as one of these variants; nothing
/// is raised past the client.
#[derive(Debug)]
pub enum ProviderError {
    /// No access token could be obtained or refreshed.
    AuthFailed,
    /// Network error, timeout or unparsable response body.
    TransportFailed(String),
    /// Non-2xx response that is not a token error.
    ProviderRejected { status: u16, body: Value },
    /// Token error still returned after the token was refreshed.
    TokenRejected { status: u16, body: Value },
    /// The response does not have the expected shape.
    DataShapeInvalid(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProviderError::AuthFailed => write!(f, "failed to get ditusi access token"),
            ProviderError::TransportFailed(reason) => write!(f, "transport failure: {}", reason),
            ProviderError::ProviderRejected { status, body } => {
                write!(f, "request rejected with status {}: {}", status, body)
            }
            ProviderError::TokenRejected { status, body } => {
                write!(f, "token rejected after refresh, status {}: {}", status, body)
            }
            ProviderError::DataShapeInvalid(reason) => write!(f, "invalid response: {}", reason),
        }
    }
}

impl std::error::Error for ProviderError {}
