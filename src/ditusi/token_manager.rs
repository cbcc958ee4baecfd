//! Access token lifecycle for the Ditusi API.
//!
//! Tokens are always issued by the production base URL, whatever base the
//! service calls use.

use std::{sync::Arc, time::Duration};

use log::{debug, error, info};
use reqwest::{
    Client,
    header::{ACCEPT, CONTENT_TYPE},
};
use serde_json::Value;

use crate::{
    config::Ditusi,
    ditusi::{ProviderError, TokenCache, parse_body, signature},
};

/// Cache key of the access token.
pub const TOKEN_CACHE_KEY: &str = "ditusi_token";

/// Response fields holding the token lifetime in seconds, in lookup order.
const EXPIRY_FIELDS: [&str; 2] = ["expiryTime", "expiredIn"];

/// Longest lifetime a token is cached for, in seconds.
const MAX_TTL_SECS: u64 = 86_400;

/// Obtains, caches and refreshes Ditusi access tokens.
///
/// # Examples
///
/// ```no_run
/// let token_manager = TokenManager::new(client, &config.ditusi, Arc::new(MemoryCache::new()));
/// let token = token_manager.get_token().await?;
/// ```
pub struct TokenManager {
    /// HTTP client shared with the service calls
    client: Client,
    /// Production base URL
    base_url: String,
    client_id: String,
    client_key: String,
    /// TTL used when the token response does not declare one
    default_ttl: Duration,
    cache: Arc<dyn TokenCache>,
}

impl TokenManager {
    /// Create a new [TokenManager].
    ///
    /// # Arguments
    ///
    /// * `client` - HTTP client used for the `/access-token` request
    /// * `config` - Ditusi credentials and base URLs
    /// * `cache` - Cache shared by every holder of the token
    pub fn new(client: Client, config: &Ditusi, cache: Arc<dyn TokenCache>) -> Self {
        TokenManager {
            client,
            base_url: config.base_url.to_owned(),
            client_id: config.client_id.to_owned(),
            client_key: config.client_key.to_owned(),
            default_ttl: Duration::from_secs(config.token_cache_time.min(MAX_TTL_SECS)),
            cache,
        }
    }

    /// Returns the cached token, or requests a new one when none is cached.
    pub async fn get_token(&self) -> Result<String, ProviderError> {
        if let Some(token) = self.cache.get(TOKEN_CACHE_KEY) {
            debug!("using cached ditusi token");
            return Ok(token);
        }

        debug!("no cached token found, fetching new token");
        self.refresh_token().await
    }

    /// Drops the cached token and requests a new one.
    pub async fn force_refresh(&self) -> Result<String, ProviderError> {
        self.cache.forget(TOKEN_CACHE_KEY);
        self.refresh_token().await
    }

    /// Requests a new token from `/access-token` and caches it.
    ///
    /// The cache is ignored. Every failure (network, non-2xx, missing
    /// `accessToken`) is logged and returned as [`ProviderError::AuthFailed`].
    pub async fn refresh_token(&self) -> Result<String, ProviderError> {
        let url = format!("{}/access-token", &self.base_url);
        let timestamp = signature::timestamp();
        let signature = signature::auth_signature(&self.client_key, &timestamp);

        debug!(
            "request ditusi access token {} client_id={} timestamp={}",
            &url, &self.client_id, &timestamp
        );

        let response = match self
            .client
            .get(&url)
            .header("X-CLIENT-ID", &self.client_id)
            .header("X-TIMESTAMP", &timestamp)
            .header("X-SIGNATURE", &signature)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!("error while getting ditusi token from {}: {}", &url, e);
                return Err(ProviderError::AuthFailed);
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(text) => parse_body(text),
            Err(e) => {
                error!("error while reading ditusi token response: {}", e);
                return Err(ProviderError::AuthFailed);
            }
        };

        if !status.is_success() {
            error!(
                "failed to get ditusi token from {}, status={} response={}",
                &url,
                status.as_u16(),
                body
            );
            return Err(ProviderError::AuthFailed);
        }

        debug!("ditusi token response status={}", status.as_u16());

        let Some(token) = extract_token(&body) else {
            error!("ditusi token response missing accessToken: {}", body);
            return Err(ProviderError::AuthFailed);
        };

        let ttl = declared_ttl(&body).unwrap_or(self.default_ttl);
        self.cache.put(TOKEN_CACHE_KEY, &token, ttl);

        info!("ditusi token obtained and cached for {}s", ttl.as_secs());

        Ok(token)
    }
}

/// Reads `accessToken`, or `data.accessToken` when `statusCode` reports success.
fn extract_token(body: &Value) -> Option<String> {
    let non_empty = |value: Option<&Value>| {
        value
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .map(str::to_owned)
    };

    if let Some(token) = non_empty(body.get("accessToken")) {
        return Some(token);
    }

    let succeeded = match body.get("statusCode") {
        Some(Value::Number(code)) => code.as_u64() == Some(200),
        Some(Value::String(code)) => code == "200",
        _ => false,
    };
    if !succeeded {
        return None;
    }

    non_empty(body.get("data").and_then(|data| data.get("accessToken")))
}

/// Reads the token lifetime from the first expiry field holding a positive number.
///
/// Lifetimes above one day are ignored.
fn declared_ttl(body: &Value) -> Option<Duration> {
    EXPIRY_FIELDS
        .iter()
        .filter_map(|field| body.get(field))
        .find_map(|value| match value {
            Value::Number(seconds) => seconds.as_u64(),
            Value::String(seconds) => seconds.trim().parse().ok(),
            _ => None,
        })
        .filter(|seconds| (1..=MAX_TTL_SECS).contains(seconds))
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ditusi::MemoryCache;
    use crate::ditusi::cache::MockTokenCache;
    use serde_json::json;

    fn token_manager(url: &str, cache: Arc<dyn TokenCache>) -> TokenManager {
        TokenManager::new(Client::new(), &Ditusi::for_server(url), cache)
    }

    async fn mock_token(server: &mut mockito::ServerGuard, body: &str, hits: usize) -> mockito::Mock {
        server
            .mock("GET", "/api/v1/access-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .expect(hits)
            .create_async()
            .await
    }

    #[tokio::test]
    async fn test_refresh_token_sends_signed_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/access-token")
            .match_header("x-client-id", "client-id")
            .match_header("x-timestamp", mockito::Matcher::Regex(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}[+-]\d{2}:\d{2}$".to_owned()))
            .match_header("x-signature", mockito::Matcher::Regex("^[0-9a-f]{64}$".to_owned()))
            .match_header("accept", "application/json")
            .with_status(200)
            .with_body(r#"{"accessToken": "abc123", "expiredIn": 300}"#)
            .create_async()
            .await;

        let token_manager = token_manager(&server.url(), Arc::new(MemoryCache::new()));
        let token = token_manager.refresh_token().await.unwrap();

        assert_eq!(token, "abc123");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_refresh_token_signature_matches_timestamp() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/access-token")
            .match_request(|request| {
                let timestamps = request.header("x-timestamp");
                let signatures = request.header("x-signature");
                match (
                    timestamps.first().and_then(|value| value.to_str().ok()),
                    signatures.first().and_then(|value| value.to_str().ok()),
                ) {
                    (Some(timestamp), Some(sent)) => {
                        sent == signature::auth_signature("client-key", timestamp)
                    }
                    _ => false,
                }
            })
            .with_status(200)
            .with_body(r#"{"accessToken": "abc123"}"#)
            .create_async()
            .await;

        let token_manager = token_manager(&server.url(), Arc::new(MemoryCache::new()));
        assert_eq!(token_manager.refresh_token().await.unwrap(), "abc123");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_token_uses_cache() {
        let mut server = mockito::Server::new_async().await;
        let mock = mock_token(&mut server, r#"{"accessToken": "abc123"}"#, 1).await;

        let token_manager = token_manager(&server.url(), Arc::new(MemoryCache::new()));
        let first = token_manager.get_token().await.unwrap();
        let second = token_manager.get_token().await.unwrap();

        assert_eq!(first, "abc123");
        assert_eq!(second, "abc123");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_force_refresh_requests_new_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = mock_token(&mut server, r#"{"accessToken": "abc123"}"#, 2).await;

        let token_manager = token_manager(&server.url(), Arc::new(MemoryCache::new()));
        token_manager.get_token().await.unwrap();
        token_manager.force_refresh().await.unwrap();
        // Cached again after the forced refresh
        token_manager.get_token().await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_token_cached_with_declared_expiry() {
        let mut server = mockito::Server::new_async().await;
        mock_token(&mut server, r#"{"accessToken": "abc123", "expiredIn": 300}"#, 1).await;

        let mut cache = MockTokenCache::new();
        cache
            .expect_get()
            .with(mockall::predicate::eq(TOKEN_CACHE_KEY))
            .times(1)
            .returning(|_| None);
        cache
            .expect_put()
            .with(
                mockall::predicate::eq(TOKEN_CACHE_KEY),
                mockall::predicate::eq("abc123"),
                mockall::predicate::eq(Duration::from_secs(300)),
            )
            .times(1)
            .return_const(());

        let token_manager = token_manager(&server.url(), Arc::new(cache));
        assert_eq!(token_manager.get_token().await.unwrap(), "abc123");
    }

    #[tokio::test]
    async fn test_token_cached_with_default_expiry() {
        let mut server = mockito::Server::new_async().await;
        mock_token(&mut server, r#"{"accessToken": "abc123"}"#, 1).await;

        let mut cache = MockTokenCache::new();
        cache
            .expect_put()
            .with(
                mockall::predicate::eq(TOKEN_CACHE_KEY),
                mockall::predicate::eq("abc123"),
                mockall::predicate::eq(Duration::from_secs(600)),
            )
            .times(1)
            .return_const(());

        let token_manager = token_manager(&server.url(), Arc::new(cache));
        token_manager.refresh_token().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_expires_after_declared_ttl() {
        let mut server = mockito::Server::new_async().await;
        let mock = mock_token(&mut server, r#"{"accessToken": "abc123", "expiredIn": 300}"#, 2).await;

        // No pooled connection, so no idle timer for the paused clock to jump to
        let client = Client::builder().pool_max_idle_per_host(0).build().unwrap();
        let token_manager = TokenManager::new(
            client,
            &Ditusi::for_server(&server.url()),
            Arc::new(MemoryCache::new()),
        );
        token_manager.get_token().await.unwrap();

        tokio::time::advance(Duration::from_secs(299)).await;
        // Still cached, no request
        assert_eq!(token_manager.get_token().await.unwrap(), "abc123");

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(token_manager.get_token().await.unwrap(), "abc123");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_oversized_expiry_falls_back_to_default() {
        let mut server = mockito::Server::new_async().await;
        mock_token(
            &mut server,
            r#"{"accessToken": "abc123", "expiredIn": 18446744073709551615}"#,
            1,
        )
        .await;

        let mut cache = MockTokenCache::new();
        cache
            .expect_put()
            .with(
                mockall::predicate::eq(TOKEN_CACHE_KEY),
                mockall::predicate::eq("abc123"),
                mockall::predicate::eq(Duration::from_secs(600)),
            )
            .times(1)
            .return_const(());

        let token_manager = token_manager(&server.url(), Arc::new(cache));
        assert_eq!(token_manager.refresh_token().await.unwrap(), "abc123");
    }

    #[tokio::test]
    async fn test_oversized_expiry_is_cached_in_memory() {
        let mut server = mockito::Server::new_async().await;
        let mock = mock_token(
            &mut server,
            r#"{"accessToken": "abc123", "expiredIn": "18446744073709551615"}"#,
            1,
        )
        .await;

        let token_manager = token_manager(&server.url(), Arc::new(MemoryCache::new()));
        assert_eq!(token_manager.get_token().await.unwrap(), "abc123");
        assert_eq!(token_manager.get_token().await.unwrap(), "abc123");

        mock.assert_async().await;
    }

    #[test]
    fn test_default_ttl_is_capped() {
        let mut config = Ditusi::for_server("http://127.0.0.1:1");
        config.token_cache_time = u64::MAX;

        let token_manager = TokenManager::new(Client::new(), &config, Arc::new(MemoryCache::new()));
        assert_eq!(token_manager.default_ttl, Duration::from_secs(MAX_TTL_SECS));
    }

    #[tokio::test]
    async fn test_refresh_token_fails_without_access_token() {
        let mut server = mockito::Server::new_async().await;
        mock_token(&mut server, r#"{"statusCode": 400, "message": "bad signature"}"#, 1).await;

        let cache = Arc::new(MemoryCache::new());
        let token_manager = token_manager(&server.url(), cache.clone());

        assert!(matches!(
            token_manager.refresh_token().await,
            Err(ProviderError::AuthFailed)
        ));
        assert_eq!(cache.get(TOKEN_CACHE_KEY), None);
    }

    #[tokio::test]
    async fn test_refresh_token_fails_on_error_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/access-token")
            .with_status(403)
            .with_body(r#"{"message": "forbidden"}"#)
            .create_async()
            .await;

        let token_manager = token_manager(&server.url(), Arc::new(MemoryCache::new()));
        assert!(matches!(
            token_manager.get_token().await,
            Err(ProviderError::AuthFailed)
        ));
    }

    #[tokio::test]
    async fn test_refresh_token_fails_when_unreachable() {
        let token_manager = token_manager("http://127.0.0.1:1", Arc::new(MemoryCache::new()));
        assert!(matches!(
            token_manager.refresh_token().await,
            Err(ProviderError::AuthFailed)
        ));
    }

    #[test]
    fn test_extract_token() {
        assert_eq!(
            extract_token(&json!({"accessToken": "abc"})),
            Some("abc".to_owned())
        );
        assert_eq!(
            extract_token(&json!({"statusCode": 200, "data": {"accessToken": "nested"}})),
            Some("nested".to_owned())
        );
        assert_eq!(
            extract_token(&json!({"statusCode": 401, "data": {"accessToken": "nested"}})),
            None
        );
        assert_eq!(extract_token(&json!({"accessToken": ""})), None);
        assert_eq!(extract_token(&json!({})), None);
    }

    #[test]
    fn test_declared_ttl() {
        assert_eq!(
            declared_ttl(&json!({"expiryTime": 120, "expiredIn": 300})),
            Some(Duration::from_secs(120))
        );
        assert_eq!(
            declared_ttl(&json!({"expiredIn": "300"})),
            Some(Duration::from_secs(300))
        );
        assert_eq!(declared_ttl(&json!({"expiredIn": 0})), None);
        assert_eq!(
            declared_ttl(&json!({"expiredIn": 86_400})),
            Some(Duration::from_secs(86_400))
        );
        assert_eq!(declared_ttl(&json!({"expiredIn": 86_401})), None);
        assert_eq!(declared_ttl(&json!({"expiredIn": u64::MAX})), None);
        assert_eq!(declared_ttl(&json!({})), None);
    }
}
