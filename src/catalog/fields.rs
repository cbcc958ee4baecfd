//! Field extraction from provider payloads.
//!
//! The provider is inconsistent in its field names, so each logical attribute
//! lists its candidate fields in lookup order and the first present one wins.
//! A field holding `null` is absent.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

pub const GAME_CODE: &[&str] = &["gameCode", "code"];
pub const PRODUCT_CODE: &[&str] = &["productCode", "code"];
/// `currencry` is a misspelling found in provider payloads
pub const CURRENCY: &[&str] = &["currency", "currencry"];
pub const INGAME_CURRENCY: &[&str] = &["ingame_currency", "inGameCurrency"];

/// Game code prefix of a product code, `MLBB` in `MLBB-1001`.
static GAME_CODE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Z0-9]+)-").expect("valid game code prefix regex"));

/// Returns the value of the first candidate field present in `record`.
pub fn first<'a>(record: &'a Value, candidates: &[&str]) -> Option<&'a Value> {
    candidates
        .iter()
        .filter_map(|field| record.get(field))
        .find(|value| !value.is_null())
}

/// Returns the first candidate field holding a non-empty string or a number,
/// as a string.
pub fn first_string(record: &Value, candidates: &[&str]) -> Option<String> {
    candidates
        .iter()
        .filter_map(|field| record.get(field))
        .find_map(|value| match value {
            Value::String(s) if !s.is_empty() => Some(s.to_owned()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

/// Returns the first candidate field holding a number or a numeric string.
pub fn first_number(record: &Value, candidates: &[&str]) -> Option<f64> {
    candidates
        .iter()
        .filter_map(|field| record.get(field))
        .find_map(|value| match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
}

/// Returns the game code encoded as prefix of a product code.
///
/// Best effort only: the provider does not document product codes, a product
/// may be attributed to the wrong game.
pub fn game_code_prefix(product_code: &str) -> Option<String> {
    GAME_CODE_PREFIX
        .captures(product_code)
        .and_then(|captures| captures.get(1))
        .map(|prefix| prefix.as_str().to_owned())
}

/// Returns the records of a `{data: [...]}` or `{data: {item: [...]}}` response.
pub fn records(response: &Value) -> Option<&Vec<Value>> {
    let data = response.get("data")?;
    match data.get("item") {
        Some(items) => items.as_array(),
        None => data.as_array(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_first_wins_in_order() {
        let record = json!({"gameCode": "MLBB", "code": "OTHER"});
        assert_eq!(first_string(&record, GAME_CODE), Some("MLBB".to_owned()));

        let record = json!({"code": "FF"});
        assert_eq!(first_string(&record, GAME_CODE), Some("FF".to_owned()));
    }

    #[test]
    fn test_null_and_empty_are_absent() {
        let record = json!({"gameCode": null, "code": "FF"});
        assert_eq!(first_string(&record, GAME_CODE), Some("FF".to_owned()));
        assert_eq!(first(&record, GAME_CODE), Some(&json!("FF")));

        let record = json!({"gameCode": ""});
        assert_eq!(first_string(&record, GAME_CODE), None);
    }

    #[test]
    fn test_misspelled_currency() {
        let record = json!({"currencry": "USD"});
        assert_eq!(first_string(&record, CURRENCY), Some("USD".to_owned()));
    }

    #[test]
    fn test_first_number() {
        assert_eq!(first_number(&json!({"price": 15000}), &["price"]), Some(15000.0));
        assert_eq!(first_number(&json!({"price": "1500.50"}), &["price"]), Some(1500.5));
        assert_eq!(first_number(&json!({"price": "free"}), &["price"]), None);
        assert_eq!(first_number(&json!({}), &["price"]), None);
    }

    // Heuristic, may misclassify: the prefix is not a documented contract
    #[test]
    fn test_game_code_prefix() {
        assert_eq!(game_code_prefix("ABC-1001"), Some("ABC".to_owned()));
        assert_eq!(game_code_prefix("ML2-5-DIAMONDS"), Some("ML2".to_owned()));
        assert_eq!(game_code_prefix("abc-1001"), None);
        assert_eq!(game_code_prefix("ABC1001"), None);
        assert_eq!(game_code_prefix("-1001"), None);
    }

    #[test]
    fn test_records() {
        let flat = json!({"data": [{"code": "A"}]});
        assert_eq!(records(&flat).map(Vec::len), Some(1));

        let nested = json!({"data": {"item": [{"code": "A"}, {"code": "B"}]}});
        assert_eq!(records(&nested).map(Vec::len), Some(2));

        assert_eq!(records(&json!({"data": {"total": 0}})), None);
        assert_eq!(records(&json!({"message": "ok"})), None);
    }
}
