//! Login link, code and payment-failure extraction from email bodies
//!
//! Extraction walks a fixed priority table and stops at the first hit:
//!
//! 1. mobile login link, searched in the raw body
//! 2. desktop login link, searched in the raw body
//! 3. labeled code (`code: 123456`), searched in cleaned text
//! 4. bare six-digit code, searched in cleaned text
//! 5. payment failure, only when the subject says so
//!
//! Links live inside `href` attributes, so they are matched before markup is
//! stripped. Codes are matched only after stripping, because raw HTML is full
//! of digit runs (CSS colours, tracking ids) that look like codes.

use once_cell::sync::Lazy;
use regex::Regex;
use std::cell::OnceCell;

use crate::body::strip_html;
use crate::models::ExtractionResult;

/// Placeholder used when a payment email names no card
pub const UNKNOWN_CARD: &str = "****";

/// Subject keywords that mark a payment-failure email
const PAYMENT_KEYWORDS: &[&str] = &["payment", "unsuccessful"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthKind {
    MobileLink,
    Link,
    Code,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    /// Body exactly as received, markup intact
    Raw,
    /// Body after [`strip_html`]
    Clean,
}

struct AuthPattern {
    kind: AuthKind,
    source: Source,
    regex: Regex,
    group: usize,
    /// Reject matches immediately preceded by a URL fragment marker
    reject_after_fragment: bool,
}

static AUTH_PATTERNS: Lazy<Vec<AuthPattern>> = Lazy::new(|| {
    vec![
        // Mobile variant carries ?client= before the fragment
        AuthPattern {
            kind: AuthKind::MobileLink,
            source: Source::Raw,
            regex: Regex::new(r#"(?i)https://claude\.ai/magic-link\?client=[^#\s"<>]+#[^\s"<>]+"#)
                .unwrap(),
            group: 0,
            reject_after_fragment: false,
        },
        AuthPattern {
            kind: AuthKind::Link,
            source: Source::Raw,
            regex: Regex::new(r#"(?i)https://claude\.ai/magic-link#[^\s"<>]+"#).unwrap(),
            group: 0,
            reject_after_fragment: false,
        },
        AuthPattern {
            kind: AuthKind::Code,
            source: Source::Clean,
            regex: Regex::new(r"(?i)(?:code|код|verification|pin)[:\s]+(\d{4,8})").unwrap(),
            group: 1,
            reject_after_fragment: false,
        },
        AuthPattern {
            kind: AuthKind::Code,
            source: Source::Clean,
            regex: Regex::new(r"\b(\d{6})\b").unwrap(),
            group: 1,
            reject_after_fragment: true,
        },
    ]
});

struct PaymentPatterns {
    amount: Regex,
    card: Regex,
}

static PAYMENT_PATTERNS: Lazy<PaymentPatterns> = Lazy::new(|| PaymentPatterns {
    amount: Regex::new(r"[$€£]\d[\d,.]*").unwrap(),
    card: Regex::new(r"(?i)(?:ending in|оканчивающ\S*(?:\s+на)?)\s+(\d{4})").unwrap(),
});

/// Classify an email and pull out its login link, code or payment details
///
/// `raw_body` is the decoded body as received (plain text or HTML).
/// Returns [`ExtractionResult::None`] when nothing recognisable is present;
/// that is not an error.
pub fn extract(subject: &str, raw_body: &str) -> ExtractionResult {
    let clean_text = OnceCell::new();

    if let Some(result) = extract_auth(raw_body, &clean_text) {
        return result;
    }

    if is_payment_subject(subject) {
        if let Some(result) = extract_payment(subject, cleaned(raw_body, &clean_text)) {
            return result;
        }
    }

    ExtractionResult::None
}

/// Strip markup once, on first use
fn cleaned<'a>(raw_body: &str, cell: &'a OnceCell<String>) -> &'a str {
    cell.get_or_init(|| strip_html(raw_body))
}

/// Run the auth pattern table in priority order
fn extract_auth(raw_body: &str, clean_text: &OnceCell<String>) -> Option<ExtractionResult> {
    AUTH_PATTERNS.iter().find_map(|pattern| {
        let haystack = match pattern.source {
            Source::Raw => raw_body,
            Source::Clean => cleaned(raw_body, clean_text),
        };

        let value = find_value(pattern, haystack)?;
        Some(match pattern.kind {
            AuthKind::MobileLink => ExtractionResult::mobile_login_link(value),
            AuthKind::Link => ExtractionResult::login_link(value),
            AuthKind::Code => ExtractionResult::code(value),
        })
    })
}

fn find_value<'a>(pattern: &AuthPattern, haystack: &'a str) -> Option<&'a str> {
    pattern.regex.captures_iter(haystack).find_map(|caps| {
        let m = caps.get(pattern.group)?;
        if pattern.reject_after_fragment && haystack[..m.start()].ends_with('#') {
            return None;
        }
        Some(m.as_str())
    })
}

fn is_payment_subject(subject: &str) -> bool {
    let subject = subject.to_lowercase();
    PAYMENT_KEYWORDS.iter().any(|keyword| subject.contains(keyword))
}

/// Amount from the subject (preferred) or the text, plus the card suffix
fn extract_payment(subject: &str, clean_text: &str) -> Option<ExtractionResult> {
    let p = &*PAYMENT_PATTERNS;

    let amount = p
        .amount
        .find(subject)
        .or_else(|| p.amount.find(clean_text))
        .map(|m| m.as_str().trim_end_matches(['.', ',']))?;

    let card_last4 = p
        .card
        .captures(clean_text)
        .and_then(|caps| caps.get(1))
        .map_or(UNKNOWN_CARD, |m| m.as_str());

    Some(ExtractionResult::payment_failure(amount, card_last4))
}
