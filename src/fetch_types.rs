//! Results produced by the fetch engines

use serde::{Deserialize, Serialize};

/// Response payload: markup text or raw document bytes, never both
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum FetchBody {
    Html(String),
    /// PDF/DOCX and other binary documents, passed through untouched
    Binary(#[serde(with = "base64_bytes")] Vec<u8>),
}

/// Outcome of one successful fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResult {
    pub body: FetchBody,
    /// URL after redirects
    pub final_url: String,
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub content_type: Option<String>,
    /// PNG bytes
    #[serde(default, with = "base64_opt_bytes")]
    pub screenshot: Option<Vec<u8>>,
}

impl FetchResult {
    pub fn html(
        html: impl Into<String>,
        final_url: impl Into<String>,
        status_code: Option<u16>,
        content_type: Option<String>,
    ) -> Self {
        Self {
            body: FetchBody::Html(html.into()),
            final_url: final_url.into(),
            status_code,
            content_type,
            screenshot: None,
        }
    }

    /// Markup, when the body is HTML
    #[must_use]
    pub fn html_body(&self) -> Option<&str> {
        match &self.body {
            FetchBody::Html(html) => Some(html),
            FetchBody::Binary(_) => None,
        }
    }

    #[must_use]
    pub fn is_binary(&self) -> bool {
        matches!(self.body, FetchBody::Binary(_))
    }
}

/// Which tier served a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMethod {
    Simple,
    Browser,
    Stealth,
}

impl std::fmt::Display for FetchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Simple => "simple",
            Self::Browser => "browser",
            Self::Stealth => "stealth",
        })
    }
}

mod base64_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

mod base64_opt_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|encoded| STANDARD.decode(encoded).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_body_survives_json() {
        let result = FetchResult {
            body: FetchBody::Binary(vec![0x25, 0x50, 0x44, 0x46, 0x00, 0xff]),
            final_url: "https://example.com/a.pdf".into(),
            status_code: Some(200),
            content_type: Some("application/pdf".into()),
            screenshot: Some(vec![0x89, b'P', b'N', b'G']),
        };
        let json = serde_json::to_string(&result).expect("serialize");
        assert!(json.contains("\"kind\":\"binary\""));
        let back: FetchResult = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, result);
        assert!(back.is_binary());
        assert_eq!(back.html_body(), None);
    }

    #[test]
    fn missing_optional_fields_default() {
        let back: FetchResult = serde_json::from_str(
            r#"{"body":{"kind":"html","data":"<p>x</p>"},"final_url":"https://e.com/"}"#,
        )
        .expect("deserialize");
        assert_eq!(back.html_body(), Some("<p>x</p>"));
        assert_eq!(back.screenshot, None);
    }
}
