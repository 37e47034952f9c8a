use std::collections::HashMap;

use axum::http::header::{AUTHORIZATION, SEC_WEBSOCKET_PROTOCOL};
use axum::http::HeaderMap;

/// Outcome of the pre-upgrade authorization check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    /// Proceed with the upgrade; when a sub-protocol token matched, it must
    /// be echoed back as the accepted sub-protocol.
    Accept { subprotocol: Option<String> },
    /// 401 before any message exchange.
    Unauthorized,
    /// Key auth is enabled but no keys are configured; every connection is
    /// rejected.
    Misconfigured,
}

/// Splits a comma-separated key list, trimming entries and dropping blanks.
pub fn parse_api_keys(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .collect()
}

/// Decides whether a connection may upgrade. Keys are compared by exact byte
/// equality. Precedence, first match wins: `Authorization` header (bearer or
/// bare), `authorization` query parameter, then a client-offered
/// sub-protocol token. The `api_key` query parameter is deliberately not
/// honored.
pub fn authorize(
    mode: &str,
    keys: &[String],
    headers: &HeaderMap,
    query: &HashMap<String, String>,
) -> AuthDecision {
    if !mode.eq_ignore_ascii_case("api_key") {
        return AuthDecision::Accept { subprotocol: None };
    }
    if keys.is_empty() {
        return AuthDecision::Misconfigured;
    }

    for value in headers.get_all(AUTHORIZATION) {
        let Ok(value) = value.to_str() else { continue };
        let trimmed = value.trim();
        if trimmed.is_empty() {
            continue;
        }
        if keys.iter().any(|key| key == trimmed) {
            return AuthDecision::Accept { subprotocol: None };
        }
        if let Some(prefix) = trimmed.get(..7) {
            if prefix.eq_ignore_ascii_case("bearer ") {
                let candidate = trimmed[7..].trim();
                if keys.iter().any(|key| key == candidate) {
                    return AuthDecision::Accept { subprotocol: None };
                }
            }
        }
    }

    if let Some(value) = query.get("authorization") {
        if keys.iter().any(|key| key == value) {
            return AuthDecision::Accept { subprotocol: None };
        }
    }

    for value in headers.get_all(SEC_WEBSOCKET_PROTOCOL) {
        let Ok(value) = value.to_str() else { continue };
        for protocol in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            if keys.iter().any(|key| key == protocol) {
                return AuthDecision::Accept {
                    subprotocol: Some(protocol.to_string()),
                };
            }
        }
    }

    AuthDecision::Unauthorized
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const KEY: &str = "test_api_key";

    fn keys() -> Vec<String> {
        parse_api_keys(Some("test_api_key, spare_key"))
    }

    fn accept() -> AuthDecision {
        AuthDecision::Accept { subprotocol: None }
    }

    #[test]
    fn none_mode_accepts_without_credentials() {
        let decision = authorize("none", &[], &HeaderMap::new(), &HashMap::new());
        assert_eq!(decision, accept());
    }

    #[test]
    fn missing_keys_reject_everything() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static(KEY));
        let decision = authorize("api_key", &[], &headers, &HashMap::new());
        assert_eq!(decision, AuthDecision::Misconfigured);
    }

    #[test]
    fn bare_authorization_header_matches() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static(KEY));
        let decision = authorize("api_key", &keys(), &headers, &HashMap::new());
        assert_eq!(decision, accept());
    }

    #[test]
    fn bearer_authorization_header_matches() {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_static("Bearer test_api_key"),
        );
        let decision = authorize("api_key", &keys(), &headers, &HashMap::new());
        assert_eq!(decision, accept());
    }

    #[test]
    fn authorization_query_parameter_matches() {
        let query = HashMap::from([("authorization".to_string(), KEY.to_string())]);
        let decision = authorize("api_key", &keys(), &HeaderMap::new(), &query);
        assert_eq!(decision, accept());
    }

    #[test]
    fn api_key_query_parameter_is_not_honored() {
        let query = HashMap::from([("api_key".to_string(), KEY.to_string())]);
        let decision = authorize("api_key", &keys(), &HeaderMap::new(), &query);
        assert_eq!(decision, AuthDecision::Unauthorized);
    }

    #[test]
    fn matching_subprotocol_is_echoed() {
        let mut headers = HeaderMap::new();
        headers.insert(
            SEC_WEBSOCKET_PROTOCOL,
            HeaderValue::from_static("other, test_api_key"),
        );
        let decision = authorize("api_key", &keys(), &headers, &HashMap::new());
        assert_eq!(
            decision,
            AuthDecision::Accept {
                subprotocol: Some(KEY.to_string()),
            }
        );
    }

    #[test]
    fn wrong_key_is_unauthorized() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer nope"));
        let decision = authorize("api_key", &keys(), &headers, &HashMap::new());
        assert_eq!(decision, AuthDecision::Unauthorized);
    }

    #[test]
    fn keys_parse_trims_and_drops_blanks() {
        assert_eq!(
            parse_api_keys(Some(" a ,, b ")),
            vec!["a".to_string(), "b".to_string()]
        );
        assert!(parse_api_keys(Some("  ")).is_empty());
        assert!(parse_api_keys(None).is_empty());
    }
}
