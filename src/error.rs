//! Typed failure taxonomy for fetch operations
//!
//! Every component raises the most specific kind it can determine. Only the
//! escalation strategy turns one kind into an attempt at another tier.

use thiserror::Error;

/// Result alias used across the crate
pub type Result<T, E = FetchError> = std::result::Result<T, E>;

/// Error returned by every fetch entry point
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Input failed validation: SSRF target, malformed URL, oversized input,
    /// disallowed header or content type, redirect loop, size cap exceeded
    #[error("Security error: {0}")]
    Security(String),

    /// Target is actively resisting automated access
    #[error("Blocked: {message}")]
    Blocked {
        message: String,
        status: Option<u16>,
    },

    /// Attempt exceeded its time budget
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Connectivity or protocol failure not attributable to deliberate blocking
    #[error("Network error: {0}")]
    Network(String),

    /// Caller withdrew the request
    #[error("Fetch aborted by caller")]
    Aborted,
}

/// Discriminant of [`FetchError`] without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Security,
    Blocked,
    Timeout,
    Network,
    Aborted,
}

impl FetchError {
    pub fn security(msg: impl Into<String>) -> Self {
        Self::Security(msg.into())
    }

    pub fn blocked(msg: impl Into<String>, status: Option<u16>) -> Self {
        Self::Blocked {
            message: msg.into(),
            status,
        }
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Security(_) => ErrorKind::Security,
            Self::Blocked { .. } => ErrorKind::Blocked,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Network(_) => ErrorKind::Network,
            Self::Aborted => ErrorKind::Aborted,
        }
    }

    /// Whether repeating the same attempt at the same tier can change the outcome.
    ///
    /// Only plain network failures qualify.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// Network failure whose text points at a Cloudflare-style connection reset
    #[must_use]
    pub fn is_cloudflare_block(&self) -> bool {
        match self {
            Self::Network(msg) => {
                let msg = msg.to_lowercase();
                msg.contains("cloudflare")
                    || msg.contains("cf-ray")
                    || msg.contains("err_connection_reset")
                    || msg.contains("connection reset")
            }
            _ => false,
        }
    }
}

impl From<anyhow::Error> for FetchError {
    fn from(err: anyhow::Error) -> Self {
        // {:#} keeps the context chain
        Self::Network(format!("{err:#}"))
    }
}

impl From<chromiumoxide::error::CdpError> for FetchError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        match err {
            chromiumoxide::error::CdpError::Timeout => Self::Timeout("Browser command timed out".into()),
            other => Self::Network(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_network_errors_are_retryable() {
        assert!(FetchError::network("reset").is_retryable());
        assert!(!FetchError::timeout("slow").is_retryable());
        assert!(!FetchError::blocked("403", Some(403)).is_retryable());
        assert!(!FetchError::security("ssrf").is_retryable());
        assert!(!FetchError::Aborted.is_retryable());
    }

    #[test]
    fn cloudflare_block_detection() {
        assert!(FetchError::network("net::ERR_CONNECTION_RESET at https://x").is_cloudflare_block());
        assert!(FetchError::network("blocked by Cloudflare").is_cloudflare_block());
        assert!(!FetchError::network("net::ERR_NAME_NOT_RESOLVED").is_cloudflare_block());
        assert!(!FetchError::blocked("cloudflare", None).is_cloudflare_block());
    }

    #[test]
    fn kind_matches_variant() {
        assert_eq!(FetchError::Aborted.kind(), ErrorKind::Aborted);
        assert_eq!(FetchError::blocked("x", None).kind(), ErrorKind::Blocked);
    }
}
