//! URL canonicalization and cache keys

use sha2::{Digest, Sha256};
use url::Url;

/// Canonical form of `url` for cache lookups.
///
/// Lowercases the host, drops the fragment and a default port, turns an
/// empty path into `/` and sorts query pairs by key (stable for repeated
/// keys). Unparseable input comes back trimmed and otherwise untouched.
#[must_use]
pub fn normalize_url(url: &str) -> String {
    let Ok(mut parsed) = Url::parse(url.trim()) else {
        return url.trim().to_string();
    };

    parsed.set_fragment(None);

    // `Url` already lowercases special-scheme hosts and drops default ports
    if parsed.port().is_some() && parsed.port() == default_port(parsed.scheme()) {
        let _ = parsed.set_port(None);
    }
    if parsed.path().is_empty() {
        parsed.set_path("/");
    }

    let mut pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if pairs.is_empty() {
        parsed.set_query(None);
    } else {
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        parsed.query_pairs_mut().clear().extend_pairs(pairs);
    }

    parsed.to_string()
}

/// SHA-256 hex digest of the canonical URL
#[must_use]
pub fn cache_key(url: &str) -> String {
    hex::encode(Sha256::digest(normalize_url(url).as_bytes()))
}

fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn equivalent_urls_share_a_key() {
        assert_eq!(
            cache_key("https://Example.com:443/a?b=2&a=1"),
            cache_key("https://example.com/a?a=1&b=2")
        );
        assert_eq!(
            cache_key("http://example.com:80#top"),
            cache_key("http://EXAMPLE.com/")
        );
    }

    #[test]
    fn meaningful_differences_keep_distinct_keys() {
        assert_ne!(cache_key("https://example.com/a"), cache_key("https://example.com/b"));
        assert_ne!(cache_key("https://example.com/"), cache_key("http://example.com/"));
        assert_ne!(
            cache_key("https://example.com/?a=1"),
            cache_key("https://example.com/?a=2")
        );
        assert_ne!(
            cache_key("https://example.com:8443/"),
            cache_key("https://example.com/")
        );
    }

    #[test]
    fn canonical_form() {
        assert_eq!(
            normalize_url("HTTPS://Example.COM:443?z=1&a=2&m=3#frag"),
            "https://example.com/?a=2&m=3&z=1"
        );
        assert_eq!(normalize_url("https://example.com/?"), "https://example.com/");
    }

    #[test]
    fn repeated_keys_keep_their_order() {
        assert_eq!(
            normalize_url("https://example.com/?b=1&a=2&a=1"),
            "https://example.com/?a=2&a=1&b=1"
        );
    }

    #[test]
    fn key_is_sha256_hex() {
        let key = cache_key("https://example.com/");
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    proptest! {
        #[test]
        fn normalization_is_idempotent(
            scheme in prop::sample::select(vec!["http", "https"]),
            host in "[a-zA-Z][a-zA-Z0-9]{0,10}(\\.[a-zA-Z]{2,5}){1,2}",
            port in prop::option::of(prop::sample::select(vec![80u16, 443, 8080])),
            path in "(/[a-zA-Z0-9_%-]{0,8}){0,3}",
            query in prop::collection::vec(("[a-z]{1,4}", "[a-zA-Z0-9 +%&=]{0,6}"), 0..4),
            fragment in prop::option::of("[a-z]{0,6}"),
        ) {
            let mut url = format!("{scheme}://{host}");
            if let Some(port) = port {
                url.push_str(&format!(":{port}"));
            }
            url.push_str(&path);
            if !query.is_empty() {
                let q: Vec<String> = query.iter().map(|(k, v)| format!("{k}={v}")).collect();
                url.push('?');
                url.push_str(&q.join("&"));
            }
            if let Some(fragment) = fragment {
                url.push('#');
                url.push_str(&fragment);
            }

            let once = normalize_url(&url);
            prop_assert_eq!(normalize_url(&once), once);
        }
    }
}
