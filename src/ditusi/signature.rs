//! Request signatures for the Ditusi API.
//!
//! Ditusi authenticates every call with an `X-SIGNATURE` header computed from the
//! client key and the `X-TIMESTAMP` header. The provider recomputes the digest from
//! the literal request, so the same timestamp string and the same JSON bytes must
//! be used for the signature and for the request itself.

use chrono::Local;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Format of the `X-TIMESTAMP` header: ISO-8601, second precision, explicit offset.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%:z";

/// Returns the current local time formatted for the `X-TIMESTAMP` header.
///
/// # Examples
///
/// ```
/// let timestamp = timestamp(); // e.g. "2025-04-24T17:46:59+07:00"
/// ```
pub fn timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Computes the signature of the `/access-token` request.
///
/// `sha256(client_key + ":" + timestamp)`, hex encoded.
pub fn auth_signature(client_key: &str, timestamp: &str) -> String {
    sha256_hex(&format!("{}:{}", client_key, timestamp))
}

/// Computes the signature of a service call.
///
/// `sha256(path + ":" + client_key + ":" + timestamp + ":" + json_body)`, hex encoded,
/// where `json_body` is `{}` for an empty body.
///
/// # Arguments
///
/// * `path` - Full API path, including the version prefix (`/api/dev/v1/game`)
/// * `client_key` - Secret client key
/// * `timestamp` - The exact value sent in `X-TIMESTAMP`
/// * `data` - Query parameters for GET, body for POST
pub fn service_signature(
    path: &str,
    client_key: &str,
    timestamp: &str,
    data: &Map<String, Value>,
) -> String {
    sha256_hex(&format!(
        "{}:{}:{}:{}",
        path,
        client_key,
        timestamp,
        encode_body(data)
    ))
}

/// Encodes a body map the way it is sent on the wire.
///
/// Keys keep their insertion order. An empty map encodes as `{}`.
pub fn encode_body(data: &Map<String, Value>) -> String {
    if data.is_empty() {
        return "{}".to_owned();
    }
    Value::Object(data.clone()).to_string()
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}
