//! Mapping of Chromium network error strings onto the fetch error taxonomy

use crate::error::FetchError;

/// Classify a navigation failure by the `net::ERR_*` text Chromium reports
pub(crate) fn classify_navigation_error(url: &str, message: &str) -> FetchError {
    let upper = message.to_ascii_uppercase();

    if upper.contains("ERR_HTTP2_PROTOCOL_ERROR") || upper.contains("ERR_BLOCKED_BY_RESPONSE") {
        return FetchError::blocked(format!("Navigation to {url} was refused: {message}"), None);
    }
    if upper.contains("ERR_TIMED_OUT")
        || upper.contains("ERR_CONNECTION_TIMED_OUT")
        || upper.contains("TIMEOUT")
        || upper.contains("TIMED OUT")
    {
        return FetchError::timeout(format!("Navigation to {url} timed out: {message}"));
    }
    if upper.contains("ERR_CONNECTION_REFUSED")
        || upper.contains("ERR_CONNECTION_RESET")
        || upper.contains("ERR_CONNECTION_CLOSED")
        || upper.contains("ERR_EMPTY_RESPONSE")
    {
        // The raw text is kept so the strategy can spot Cloudflare-style resets
        return FetchError::network(format!("Connection failed for {url}: {message}"));
    }
    if upper.contains("ERR_NAME_NOT_RESOLVED") || upper.contains("ERR_NAME_RESOLUTION_FAILED") {
        return FetchError::network(format!("DNS lookup failed for {url}: {message}"));
    }
    if upper.contains("ERR_CERT") || upper.contains("ERR_SSL") {
        return FetchError::network(format!("TLS failure for {url}: {message}"));
    }
    FetchError::network(format!("Navigation to {url} failed: {message}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn kind(message: &str) -> ErrorKind {
        classify_navigation_error("https://example.com/", message).kind()
    }

    #[test]
    fn chromium_errors_map_to_kinds() {
        assert_eq!(kind("net::ERR_HTTP2_PROTOCOL_ERROR"), ErrorKind::Blocked);
        assert_eq!(kind("net::ERR_CONNECTION_REFUSED"), ErrorKind::Network);
        assert_eq!(kind("net::ERR_CONNECTION_RESET"), ErrorKind::Network);
        assert_eq!(kind("net::ERR_NAME_NOT_RESOLVED"), ErrorKind::Network);
        assert_eq!(kind("net::ERR_CERT_AUTHORITY_INVALID"), ErrorKind::Network);
        assert_eq!(kind("net::ERR_SSL_PROTOCOL_ERROR"), ErrorKind::Network);
        assert_eq!(kind("net::ERR_TIMED_OUT"), ErrorKind::Timeout);
        assert_eq!(kind("Request timed out"), ErrorKind::Timeout);
        assert_eq!(kind("something unexpected"), ErrorKind::Network);
    }

    #[test]
    fn reset_text_survives_for_cloudflare_detection() {
        let err = classify_navigation_error(
            "https://example.com/",
            "net::ERR_CONNECTION_RESET (cloudflare)",
        );
        assert!(err.to_string().contains("ERR_CONNECTION_RESET"));
    }
}
