//! Signed HTTP client for the Ditusi API.
//!
//! This module provides the [`DitusiClient`] struct, the single request path of
//! every provider call, and the [`Provider`] trait it implements.

use std::{sync::Arc, time::Duration};

use log::{debug, error, warn};
use mockall::automock;
use reqwest::{
    Client, Url,
    header::{ACCEPT, CONTENT_TYPE},
};
use serde_json::{Map, Value};

use crate::{
    config::Ditusi,
    ditusi::{
        HttpMethod, ProviderError, TokenCache, TokenManager, parse_body, signature,
        skip_tls_verification,
    },
};

/// Client for the Ditusi API.
///
/// Tokens come from the production base URL; every endpoint wrapper of
/// [`Provider`] targets the sandbox base URL.
///
/// # Examples
///
/// ```no_run
/// let client = DitusiClient::new(&config.ditusi, Arc::new(MemoryCache::new()))?;
/// let balance = client.check_balance().await?;
/// println!("Balance: {}", balance);
/// ```
pub struct DitusiClient {
    /// HTTP client, shared with the token manager
    client: Client,
    token_manager: TokenManager,
    /// Production base URL, e.g. `https://api.ditusi.co.id/api/v1`
    base_url: String,
    /// Sandbox base URL, e.g. `https://api.ditusi.co.id/api/dev/v1`
    dev_base_url: String,
    client_id: String,
    client_key: String,
}

/// Calls offered by the Ditusi API.
///
/// This trait abstracts the provider for the catalog and ledger services so
/// they can be tested with mocks.
#[automock]
pub trait Provider {
    /// Fetches the games, optionally filtered by game code.
    async fn get_games(&self, game_code: Option<String>) -> Result<Value, ProviderError>;
    /// Fetches the products, optionally filtered by game and product code.
    async fn get_products(
        &self,
        game_code: Option<String>,
        product_code: Option<String>,
    ) -> Result<Value, ProviderError>;
    /// Creates a top-up transaction.
    async fn create_transaction(&self, payload: Map<String, Value>) -> Result<Value, ProviderError>;
    /// Fetches the status of a transaction by provider transaction id.
    async fn check_transaction(&self, transaction_id: &str) -> Result<Value, ProviderError>;
    /// Fetches the deposit balance.
    async fn check_balance(&self) -> Result<Value, ProviderError>;
}

impl DitusiClient {
    /// Create a new [DitusiClient].
    ///
    /// # Arguments
    ///
    /// * `config` - Ditusi credentials, base URLs, timeout and environment
    /// * `cache` - Token cache, shared with any other client of the same account
    ///
    /// # Errors
    ///
    /// Fails when the HTTP client cannot be built (TLS backend initialization).
    pub fn new(config: &Ditusi, cache: Arc<dyn TokenCache>) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .danger_accept_invalid_certs(skip_tls_verification(&config.environment))
            .build()?;

        Ok(DitusiClient {
            token_manager: TokenManager::new(client.clone(), config, cache),
            client,
            base_url: config.base_url.to_owned(),
            dev_base_url: config.dev_base_url.to_owned(),
            client_id: config.client_id.to_owned(),
            client_key: config.client_key.to_owned(),
        })
    }

    /// Sends a signed request and returns the JSON body of a 2xx response.
    ///
    /// A token error (401, or a message mentioning an expired or invalid token)
    /// forces a token refresh and the request is sent a second and last time.
    ///
    /// # Arguments
    ///
    /// * `method` - GET sends `query` as query string, POST sends `body` as JSON
    /// * `endpoint` - Path after the base URL, e.g. `/game`
    /// * `query` - Query parameters, signed for GET
    /// * `body` - Body parameters, signed for POST
    /// * `use_dev` - Use the sandbox base URL instead of the production one
    pub async fn request(
        &self,
        method: HttpMethod,
        endpoint: &str,
        query: &Map<String, Value>,
        body: &Map<String, Value>,
        use_dev: bool,
    ) -> Result<Value, ProviderError> {
        match self.send(method, endpoint, query, body, use_dev, false).await {
            Err(ProviderError::TokenRejected {
                status,
                body: response,
            }) => {
                warn!(
                    "token expired or invalid, retrying {} {} with fresh token, status={} response={}",
                    method, endpoint, status, response
                );

                let result = self.send(method, endpoint, query, body, use_dev, true).await;
                if let Err(ProviderError::TokenRejected { status, .. }) = &result {
                    error!(
                        "failed ditusi request {} {}: token still rejected, status={}",
                        method, endpoint, status
                    );
                }
                result
            }
            result => result,
        }
    }

    /// Sends one attempt of a request.
    ///
    /// `is_retry` forces a token refresh before signing.
    async fn send(
        &self,
        method: HttpMethod,
        endpoint: &str,
        query: &Map<String, Value>,
        body: &Map<String, Value>,
        use_dev: bool,
        is_retry: bool,
    ) -> Result<Value, ProviderError> {
        let token = if is_retry {
            self.token_manager.force_refresh().await
        } else {
            self.token_manager.get_token().await
        };
        let Ok(token) = token else {
            error!("failed to get ditusi access token for {} {}", method, endpoint);
            return Err(ProviderError::AuthFailed);
        };

        let base_url = if use_dev {
            &self.dev_base_url
        } else {
            &self.base_url
        };
        let url = format!("{}{}", base_url, endpoint);

        let timestamp = signature::timestamp();
        let data = match method {
            HttpMethod::Get => query,
            HttpMethod::Post => body,
        };
        let signature = signature::service_signature(
            &format!("{}{}", api_path(base_url), endpoint),
            &self.client_key,
            &timestamp,
            data,
        );

        let request = match method {
            HttpMethod::Get => self.client.get(&url).query(&query_pairs(query)),
            HttpMethod::Post => self.client.post(&url).body(signature::encode_body(body)),
        };

        debug!(
            "ditusi request {} {} client_id={} timestamp={} signature={} data={}",
            method,
            &url,
            &self.client_id,
            &timestamp,
            &signature,
            signature::encode_body(data)
        );

        let response = match request
            .bearer_auth(&token)
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
                error!("error making ditusi request {} {}: {}", method, &url, e);
                return Err(ProviderError::TransportFailed(e.to_string()));
            }
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                error!("error reading ditusi response {} {}: {}", method, &url, e);
                return Err(ProviderError::TransportFailed(e.to_string()));
            }
        };

        if status.is_success() {
            return match serde_json::from_str::<Value>(&text) {
                Ok(data) => {
                    debug!(
                        "response from {} {} status={} -> {}",
                        method,
                        &url,
                        status.as_u16(),
                        data
                    );
                    Ok(data)
                }
                Err(e) => {
                    error!("malformed ditusi response from {} {}: {}", method, &url, e);
                    Err(ProviderError::TransportFailed(format!(
                        "malformed response body: {}",
                        e
                    )))
                }
            };
        }

        let status = status.as_u16();
        let response_body = parse_body(text);
        warn!(
            "ditusi non-successful response {} {} status={} response={} query={}",
            method,
            &url,
            status,
            response_body,
            signature::encode_body(query)
        );

        if is_token_error(status, &response_body) {
            return Err(ProviderError::TokenRejected {
                status,
                body: response_body,
            });
        }

        error!(
            "failed ditusi request {} {}, status={} response={}",
            method, &url, status, response_body
        );
        Err(ProviderError::ProviderRejected {
            status,
            body: response_body,
        })
    }
}

impl Provider for DitusiClient {
    /// Request `GET /game`, optionally filtered with `gameCode`.
    ///
    /// This api call returns the games and the forms a buyer must fill:
    /// ```text
    /// {
    ///   data: [
    ///     { gameCode: "MLBB", title: "Mobile Legends", productAmount: 5,
    ///       userInformation: [{ name: "userId", type: "text" }] }
    ///   ]
    /// }
    /// ```
    async fn get_games(&self, game_code: Option<String>) -> Result<Value, ProviderError> {
        let mut query = Map::new();
        if let Some(game_code) = game_code.filter(|code| !code.is_empty()) {
            query.insert("gameCode".to_owned(), Value::String(game_code));
        }

        self.request(HttpMethod::Get, "/game", &query, &Map::new(), true)
            .await
    }

    /// Request `GET /product`, optionally filtered with `gameCode` and `productCode`.
    ///
    /// The products are either directly under `data` or under `data.item`.
    async fn get_products(
        &self,
        game_code: Option<String>,
        product_code: Option<String>,
    ) -> Result<Value, ProviderError> {
        let mut query = Map::new();
        if let Some(game_code) = game_code.filter(|code| !code.is_empty()) {
            query.insert("gameCode".to_owned(), Value::String(game_code));
        }
        if let Some(product_code) = product_code.filter(|code| !code.is_empty()) {
            query.insert("productCode".to_owned(), Value::String(product_code));
        }

        debug!(
            "fetching products {} from {}",
            signature::encode_body(&query),
            &self.dev_base_url
        );

        let result = self
            .request(HttpMethod::Get, "/product", &query, &Map::new(), true)
            .await;

        if let Err(e) = &result {
            error!(
                "failed to fetch products {}: {}",
                signature::encode_body(&query),
                e
            );
        }

        result
    }

    /// Request `POST /transaction`.
    ///
    /// The payload is
    /// `{productCode, amount, transactionReferenceId, initialPrice, additionalInformation}`
    /// and the response carries `transactionId` and `statusTransaction`.
    async fn create_transaction(&self, payload: Map<String, Value>) -> Result<Value, ProviderError> {
        self.request(HttpMethod::Post, "/transaction", &Map::new(), &payload, true)
            .await
    }

    /// Request `GET /transaction/{id}`, the response carries `data.transactionStatus`.
    async fn check_transaction(&self, transaction_id: &str) -> Result<Value, ProviderError> {
        self.request(
            HttpMethod::Get,
            &format!("/transaction/{}", transaction_id),
            &Map::new(),
            &Map::new(),
            true,
        )
        .await
    }

    /// Request `GET /balance`, the response carries `data.data.DepositBalance`.
    async fn check_balance(&self) -> Result<Value, ProviderError> {
        self.request(HttpMethod::Get, "/balance", &Map::new(), &Map::new(), true)
            .await
    }
}

/// Returns true when a non-2xx response is caused by an expired or invalid token.
fn is_token_error(status: u16, body: &Value) -> bool {
    if status == 401 {
        return true;
    }

    body.get("message")
        .and_then(Value::as_str)
        .map(str::to_lowercase)
        .is_some_and(|message| {
            message.contains("token") && (message.contains("expired") || message.contains("invalid"))
        })
}

/// Returns the path component of a base URL, `/api/dev/v1` for
/// `https://api.ditusi.co.id/api/dev/v1`.
fn api_path(base_url: &str) -> String {
    Url::parse(base_url)
        .map(|url| url.path().trim_end_matches('/').to_owned())
        .unwrap_or_default()
}

/// Converts query parameters into string pairs.
fn query_pairs(query: &Map<String, Value>) -> Vec<(String, String)> {
    query
        .iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(value) => value.to_owned(),
                other => other.to_string(),
            };
            (key.to_owned(), value)
        })
        .collect()
}
