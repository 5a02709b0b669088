//! SSRF and malformed-input validation
//!
//! Every URL is checked here before any network I/O happens, and again on
//! every redirect hop. IPv4 literals are recognised in all the encodings
//! `inet_aton` accepts (dotted, hex, octal, pure decimal) so that
//! `http://0x7f000001/` and `http://2130706433/` are caught the same way as
//! `http://127.0.0.1/`.

mod ip;

use url::{Host, Url};

use crate::error::{FetchError, Result};
use crate::utils::constants::{MAX_HEADER_VALUE_LENGTH, MAX_URL_LENGTH, MAX_USER_AGENT_LENGTH};

pub use ip::{check_ipv4, check_ipv6, parse_ipv4_literal};

/// Validate a caller-supplied URL and return it parsed.
///
/// # Errors
/// `FetchError::Security` when the URL is oversized, malformed, uses a
/// non-HTTP scheme, or points at a loopback/private/link-local target.
pub fn validate_url(input: &str) -> Result<Url> {
    if input.len() > MAX_URL_LENGTH {
        return Err(FetchError::security(format!(
            "URL exceeds {MAX_URL_LENGTH} characters"
        )));
    }
    if input.chars().any(char::is_control) {
        return Err(FetchError::security("URL contains control characters"));
    }

    let url = Url::parse(input).map_err(|e| FetchError::security(format!("Invalid URL: {e}")))?;
    validate_parsed(&url, Some(input))?;
    Ok(url)
}

/// Validate an already parsed URL (redirect targets resolved by `Url::join`).
pub fn validate_parsed(url: &Url, raw: Option<&str>) -> Result<()> {
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(FetchError::security(format!(
                "Unsupported protocol: {other}"
            )));
        }
    }

    let host = url
        .host()
        .ok_or_else(|| FetchError::security("URL has no hostname"))?;

    // The WHATWG parser already folds numeric hosts into Host::Ipv4, but the
    // raw text is checked too so no encoding slips through a parser difference.
    if let Some(raw_host) = raw.and_then(raw_host) {
        if let Some(ip) = parse_ipv4_literal(&raw_host) {
            check_ipv4(ip)?;
        }
    }

    match host {
        Host::Domain(domain) => check_domain(domain),
        Host::Ipv4(ip) => check_ipv4(ip),
        Host::Ipv6(ip) => check_ipv6(ip),
    }
}

fn check_domain(domain: &str) -> Result<()> {
    let domain = domain.trim_end_matches('.').to_ascii_lowercase();
    if domain.is_empty() {
        return Err(FetchError::security("URL has an empty hostname"));
    }
    if domain == "localhost"
        || domain.ends_with(".localhost")
        || domain == "0.0.0.0"
        || domain.ends_with(".0.0.0.0")
    {
        return Err(FetchError::security(format!(
            "Access to loopback host '{domain}' is not allowed"
        )));
    }
    if let Some(ip) = parse_ipv4_literal(&domain) {
        check_ipv4(ip)?;
    }
    Ok(())
}

/// Extract the host portion of a URL string without normalising it.
fn raw_host(input: &str) -> Option<String> {
    let (_, rest) = input.split_once("://")?;
    let authority = rest
        .split(['/', '?', '#', '\\'])
        .next()
        .unwrap_or_default();
    let host_port = authority.rsplit('@').next().unwrap_or(authority);

    if host_port.starts_with('[') {
        // IPv6 literals are handled from the parsed Host
        return None;
    }

    let host = match host_port.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => host_port,
    };
    if host.is_empty() {
        None
    } else {
        Some(host.to_ascii_lowercase())
    }
}

/// Validate a caller-supplied user agent: printable ASCII, bounded length.
pub fn validate_user_agent(user_agent: &str) -> Result<()> {
    if user_agent.len() > MAX_USER_AGENT_LENGTH {
        return Err(FetchError::security(format!(
            "User agent exceeds {MAX_USER_AGENT_LENGTH} characters"
        )));
    }
    if !user_agent.chars().all(|c| (' '..='~').contains(&c)) {
        return Err(FetchError::security(
            "User agent must contain printable ASCII only",
        ));
    }
    Ok(())
}

/// Validate caller-supplied headers before they are injected into a request or page.
pub fn validate_headers<I, K, V>(headers: I) -> Result<()>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    for (name, value) in headers {
        let (name, value) = (name.as_ref(), value.as_ref());

        if name.is_empty() || !name.bytes().all(is_token_byte) {
            return Err(FetchError::security(format!("Invalid header name: {name:?}")));
        }
        if name.eq_ignore_ascii_case("host") {
            return Err(FetchError::security("Overriding the Host header is not allowed"));
        }
        if value.len() > MAX_HEADER_VALUE_LENGTH {
            return Err(FetchError::security(format!(
                "Header '{name}' value exceeds {MAX_HEADER_VALUE_LENGTH} characters"
            )));
        }
        if value.chars().any(|c| c == '\r' || c == '\n' || c == '\0') {
            return Err(FetchError::security(format!(
                "Header '{name}' value contains line breaks"
            )));
        }
    }
    Ok(())
}

const fn is_token_byte(b: u8) -> bool {
    matches!(b,
        b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' |
        b'^' | b'_' | b'`' | b'|' | b'~' | b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(url: &str) -> bool {
        matches!(validate_url(url), Err(FetchError::Security(_)))
    }

    #[test]
    fn rejects_known_ssrf_targets() {
        for url in [
            "http://127.0.0.1/",
            "http://0x7f000001/",
            "http://2130706433/",
            "http://[::1]/",
            "http://10.0.0.5/",
            "http://169.254.1.1/",
            "http://[::ffff:192.168.1.1]/",
            "http://localhost/",
        ] {
            assert!(rejected(url), "{url} should be rejected");
        }
    }

    #[test]
    fn accepts_public_address() {
        let url = validate_url("http://93.184.216.34/").expect("public IPv4 should pass");
        assert_eq!(url.host_str(), Some("93.184.216.34"));
        assert!(validate_url("https://example.com/path?q=1").is_ok());
    }

    #[test]
    fn rejects_alternate_ipv4_encodings() {
        for url in [
            "http://0177.0.0.1/",
            "http://017700000001/",
            "http://0x7f.0x0.0x0.0x1/",
            "http://127.1/",
            "http://0/",
            "http://255.255.255.255/",
            "http://172.16.0.1/",
            "http://172.31.255.255/",
            "http://192.168.0.10:8080/",
            "http://user:pw@10.1.2.3/",
        ] {
            assert!(rejected(url), "{url} should be rejected");
        }
        assert!(validate_url("http://172.32.0.1/").is_ok());
    }

    #[test]
    fn rejects_ipv6_private_ranges() {
        for url in [
            "http://[fc00::1]/",
            "http://[fd12:3456::1]/",
            "http://[fe80::1]/",
            "http://[::]/",
            "http://[::ffff:8.8.8.8]/",
        ] {
            assert!(rejected(url), "{url} should be rejected");
        }
        assert!(validate_url("http://[2606:4700:4700::1111]/").is_ok());
    }

    #[test]
    fn rejects_localhost_aliases() {
        assert!(rejected("http://LOCALHOST/"));
        assert!(rejected("http://app.localhost/"));
        assert!(rejected("http://localhost./"));
        assert!(rejected("http://0.0.0.0/"));
    }

    #[test]
    fn rejects_malformed_and_non_http() {
        assert!(rejected("not a url"));
        assert!(rejected("ftp://example.com/file"));
        assert!(rejected("file:///etc/passwd"));
        assert!(rejected("javascript:alert(1)"));
        assert!(rejected("http://exa\tmple.com/"));
        let long = format!("https://example.com/{}", "a".repeat(MAX_URL_LENGTH));
        assert!(rejected(&long));
    }

    #[test]
    fn user_agent_validation() {
        assert!(validate_user_agent("Mozilla/5.0 (compatible; Bot/1.0)").is_ok());
        assert!(validate_user_agent(&"a".repeat(501)).is_err());
        assert!(validate_user_agent("bad\u{7f}agent").is_err());
        assert!(validate_user_agent("ünïcode").is_err());
    }

    #[test]
    fn header_validation() {
        assert!(validate_headers([("X-Api-Key", "abc"), ("Accept", "text/html")]).is_ok());
        assert!(validate_headers([("Host", "internal")]).is_err());
        assert!(validate_headers([("host", "internal")]).is_err());
        assert!(validate_headers([("X-Long", "v".repeat(501).as_str())]).is_err());
        assert!(validate_headers([("X-Split", "a\r\nSet-Cookie: x")]).is_err());
        assert!(validate_headers([("Bad Name", "v")]).is_err());
    }

    #[test]
    fn raw_host_extraction() {
        assert_eq!(raw_host("http://user@0x7f000001:80/x").as_deref(), Some("0x7f000001"));
        assert_eq!(raw_host("https://Example.com?q").as_deref(), Some("example.com"));
        assert_eq!(raw_host("http://[::1]/"), None);
    }
}
