//! Bot-challenge and empty-shell detection for rendered pages
//!
//! Signature based. A strong vendor marker on a page with little visible
//! text is a challenge; the same marker inside a long article is not.
//! Empty shells (an app root with almost no text) are reported separately so
//! the renderer can wait longer instead of failing.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Confidence at or above which a detection counts as a challenge
pub const CHALLENGE_THRESHOLD: f32 = 0.7;

/// Pages with more visible text than this are treated as real content
const CONTENT_TEXT_CHARS: usize = 5_000;

/// Visible text below this is "short" for weak phrase matches
const SHORT_TEXT_CHARS: usize = 1_000;

/// Visible text below this, with scripts present, is an unrendered shell
const SHELL_TEXT_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeKind {
    None,
    Cloudflare,
    Captcha,
    AccessDenied,
    RateLimited,
    EmptyShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChallengeDetection {
    pub is_challenge: bool,
    pub kind: ChallengeKind,
    pub confidence: f32,
}

impl ChallengeDetection {
    const fn clean() -> Self {
        Self {
            is_challenge: false,
            kind: ChallengeKind::None,
            confidence: 0.0,
        }
    }

    fn found(kind: ChallengeKind, confidence: f32) -> Self {
        Self {
            is_challenge: kind != ChallengeKind::EmptyShell && confidence >= CHALLENGE_THRESHOLD,
            kind,
            confidence,
        }
    }

    /// Page rendered nothing yet; worth waiting rather than failing
    #[must_use]
    pub fn is_empty_shell(&self) -> bool {
        self.kind == ChallengeKind::EmptyShell
    }
}

const CLOUDFLARE_MARKERS: &[&str] = &[
    "cf-browser-verification",
    "cf-challenge",
    "challenge-platform",
    "__cf_chl_",
    "cf_chl_opt",
    "just a moment...",
    "checking your browser before accessing",
    "attention required! | cloudflare",
];

const CAPTCHA_MARKERS: &[&str] = &[
    "g-recaptcha",
    "recaptcha/api.js",
    "h-captcha",
    "hcaptcha.com/1/api.js",
    "captcha-delivery.com",
    "px-captcha",
    "arkoselabs.com",
    "please verify you are a human",
    "verify you are human",
];

const ACCESS_DENIED_MARKERS: &[&str] = &[
    "_incapsula_resource",
    "incapsula incident id",
    "access denied",
    "request blocked",
    "you don't have permission to access",
    "you have been blocked",
];

const RATE_LIMIT_MARKERS: &[&str] = &["too many requests", "rate limit exceeded", "slow down"];

static SCRIPT_OR_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style|noscript|template)\b[^>]*>.*?</(script|style|noscript|template)\s*>")
        .expect("SCRIPT_OR_STYLE: hardcoded regex is valid")
});

static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("TAG: hardcoded regex is valid"));

static APP_ROOT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<div[^>]+id=["'](root|app|__next|__nuxt|svelte)["'][^>]*>\s*</div>"#)
        .expect("APP_ROOT: hardcoded regex is valid")
});

/// Classify rendered HTML and its HTTP status
#[must_use]
pub fn detect_challenge(html: &str, status: Option<u16>) -> ChallengeDetection {
    let lower = html.to_ascii_lowercase();
    let text_len = visible_text_len(html);
    let short = text_len < SHORT_TEXT_CHARS;
    let is_content = text_len > CONTENT_TEXT_CHARS;

    if status == Some(429) {
        return ChallengeDetection::found(ChallengeKind::RateLimited, 0.95);
    }

    let cloudflare = count_markers(&lower, CLOUDFLARE_MARKERS);
    if cloudflare > 0 {
        let confidence = if is_content {
            0.4
        } else {
            strong_confidence(cloudflare, status)
        };
        return ChallengeDetection::found(ChallengeKind::Cloudflare, confidence);
    }

    let captcha = count_markers(&lower, CAPTCHA_MARKERS);
    if captcha > 0 {
        let confidence = if short {
            strong_confidence(captcha, status)
        } else {
            0.4
        };
        return ChallengeDetection::found(ChallengeKind::Captcha, confidence);
    }

    let denied = count_markers(&lower, ACCESS_DENIED_MARKERS);
    if denied > 0 && short {
        let confidence = if matches!(status, Some(401 | 403)) { 0.9 } else { 0.75 };
        return ChallengeDetection::found(ChallengeKind::AccessDenied, confidence);
    }
    if matches!(status, Some(401 | 403)) && short {
        return ChallengeDetection::found(ChallengeKind::AccessDenied, 0.7);
    }

    if count_markers(&lower, RATE_LIMIT_MARKERS) > 0 && text_len < SHELL_TEXT_CHARS * 2 {
        return ChallengeDetection::found(ChallengeKind::RateLimited, 0.75);
    }

    if text_len < SHELL_TEXT_CHARS && (APP_ROOT.is_match(html) || lower.contains("<script")) {
        return ChallengeDetection::found(ChallengeKind::EmptyShell, 0.6);
    }

    ChallengeDetection::clean()
}

fn count_markers(haystack: &str, markers: &[&str]) -> usize {
    markers.iter().filter(|m| haystack.contains(**m)).count()
}

fn strong_confidence(matches: usize, status: Option<u16>) -> f32 {
    let base: f32 = if matches!(status, Some(403 | 503)) { 0.9 } else { 0.8 };
    let extra = (matches.saturating_sub(1) as f32) * 0.05;
    (base + extra).min(1.0)
}

/// Characters of visible text, whitespace collapsed
#[must_use]
pub fn visible_text_len(html: &str) -> usize {
    let without_code = SCRIPT_OR_STYLE.replace_all(html, " ");
    let text = TAG.replace_all(&without_code, " ");
    text.split_whitespace().map(|w| w.chars().count() + 1).sum::<usize>().saturating_sub(1)
}
