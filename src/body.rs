//! Email body decoding and HTML-to-text cleanup

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::error::{RelayError, Result};
use crate::models::{PayloadHeader, PayloadPart};

/// base64url engine that accepts both padded and unpadded input
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decode base64url transport data into raw bytes
pub fn decode_base64url(data: &str) -> Result<Vec<u8>> {
    URL_SAFE_LENIENT
        .decode(data.trim())
        .map_err(|e| RelayError::InvalidMessageFormat(format!("Invalid base64url body: {}", e)))
}

/// Encode raw bytes as unpadded base64url
pub fn encode_base64url(data: &[u8]) -> String {
    URL_SAFE_LENIENT.encode(data)
}

/// Decode base64url transport data into text (invalid UTF-8 is replaced)
pub fn decode_body_data(data: &str) -> Result<String> {
    let bytes = decode_base64url(data)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Extract the body text of a message payload
///
/// A single-part payload yields its own data. For multipart payloads the
/// first `text/plain` part wins; the last `text/html` part is kept as a
/// fallback since link extraction needs the markup.
pub fn extract_body(payload: &PayloadPart) -> String {
    if let Some(data) = payload.body.data.as_deref().filter(|d| !d.is_empty()) {
        return String::from_utf8_lossy(data).into_owned();
    }

    let mut html_body = None;
    find_text_parts(payload, &mut html_body)
        .or(html_body)
        .unwrap_or_default()
}

/// Depth-first search for a `text/plain` part, remembering HTML on the way
fn find_text_parts(part: &PayloadPart, html_body: &mut Option<String>) -> Option<String> {
    for child in &part.parts {
        if !child.parts.is_empty() {
            if let Some(plain) = find_text_parts(child, html_body) {
                return Some(plain);
            }
            continue;
        }

        let Some(data) = child.body.data.as_deref().filter(|d| !d.is_empty()) else {
            continue;
        };

        match child.mime_type.to_lowercase().as_str() {
            "text/plain" => return Some(String::from_utf8_lossy(data).into_owned()),
            "text/html" => *html_body = Some(String::from_utf8_lossy(data).into_owned()),
            _ => {}
        }
    }
    None
}

/// Case-insensitive header lookup
pub fn get_header<'a>(headers: &'a [PayloadHeader], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

struct StripPatterns {
    style: Regex,
    comment: Regex,
    line_break: Regex,
    block_tag: Regex,
    any_tag: Regex,
    numeric_entity: Regex,
    blank_lines: Regex,
}

static STRIP_PATTERNS: Lazy<StripPatterns> = Lazy::new(|| StripPatterns {
    style: Regex::new(r"(?is)<style[^>]*>.*?</style>").unwrap(),
    comment: Regex::new(r"(?s)<!--.*?-->").unwrap(),
    line_break: Regex::new(r"(?i)<br\s*/?>").unwrap(),
    block_tag: Regex::new(r"(?i)</?(?:p|div|tr|td|table|h[1-6])\b[^>]*>").unwrap(),
    any_tag: Regex::new(r"<[^>]+>").unwrap(),
    numeric_entity: Regex::new(r"&#(\d+);").unwrap(),
    blank_lines: Regex::new(r"\n{3,}").unwrap(),
});

/// Strip HTML markup and decode the common entities to get plain text
///
/// Style blocks go first so CSS colour codes never reach digit matching.
pub fn strip_html(html: &str) -> String {
    let p = &*STRIP_PATTERNS;

    let text = p.style.replace_all(html, "");
    let text = p.comment.replace_all(&text, "");
    let text = p.line_break.replace_all(&text, "\n");
    let text = p.block_tag.replace_all(&text, "\n");
    let text = p.any_tag.replace_all(&text, "");
    let text = p.numeric_entity.replace_all(&text, |caps: &Captures| {
        caps[1]
            .parse::<u32>()
            .ok()
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default()
    });
    let text = text.replace("&nbsp;", " ").replace("&amp;", "&");
    let text = p.blank_lines.replace_all(&text, "\n\n");

    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PayloadBody;

    fn leaf(mime_type: &str, data: &str) -> PayloadPart {
        PayloadPart {
            mime_type: mime_type.to_string(),
            body: PayloadBody {
                data: Some(data.as_bytes().to_vec()),
            },
            ..Default::default()
        }
    }

    fn multipart(parts: Vec<PayloadPart>) -> PayloadPart {
        PayloadPart {
            mime_type: "multipart/alternative".to_string(),
            parts,
            ..Default::default()
        }
    }

    #[test]
    fn test_base64url_round_trip() {
        let original = "Код: 482913 — use it within 10 minutes?>".as_bytes();
        let encoded = encode_base64url(original);
        assert!(!encoded.contains('+') && !encoded.contains('/'));

        let decoded = decode_base64url(&encoded).unwrap();
        assert_eq!(decoded, original);
        assert_eq!(encode_base64url(&decoded), encoded);
    }

    #[test]
    fn test_decode_accepts_padding() {
        assert_eq!(decode_body_data("aGk=").unwrap(), "hi");
        assert_eq!(decode_body_data("aGk").unwrap(), "hi");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = decode_body_data("not base64 at all!").unwrap_err();
        assert!(matches!(err, RelayError::InvalidMessageFormat(_)));
    }

    #[test]
    fn test_single_part_body() {
        let payload = leaf("text/plain", "hello");
        assert_eq!(extract_body(&payload), "hello");
    }

    #[test]
    fn test_prefers_plain_text() {
        let payload = multipart(vec![
            leaf("text/html", "<p>html</p>"),
            leaf("text/plain", "plain"),
        ]);
        assert_eq!(extract_body(&payload), "plain");
    }

    #[test]
    fn test_falls_back_to_html() {
        let payload = multipart(vec![
            leaf("text/html", "<a href=\"x\">link</a>"),
            leaf("image/png", "binary"),
        ]);
        assert_eq!(extract_body(&payload), "<a href=\"x\">link</a>");
    }

    #[test]
    fn test_nested_multipart() {
        let payload = PayloadPart {
            mime_type: "multipart/mixed".to_string(),
            parts: vec![
                multipart(vec![leaf("text/html", "<b>x</b>"), leaf("text/plain", "nested")]),
                leaf("application/pdf", "%PDF"),
            ],
            ..Default::default()
        };
        assert_eq!(extract_body(&payload), "nested");
    }

    #[test]
    fn test_empty_payload() {
        assert_eq!(extract_body(&PayloadPart::default()), "");
    }

    #[test]
    fn test_get_header_case_insensitive() {
        let headers = vec![PayloadHeader {
            name: "Subject".to_string(),
            value: "Hello".to_string(),
        }];
        assert_eq!(get_header(&headers, "subject"), Some("Hello"));
        assert_eq!(get_header(&headers, "from"), None);
    }

    #[test]
    fn test_strip_html_removes_style_and_comments() {
        let html = "<style type=\"text/css\">.a { color: #123456; }</style>\
                    <!-- 654321 --><p>Hello</p>";
        assert_eq!(strip_html(html), "Hello");
    }

    #[test]
    fn test_strip_html_block_tags_and_entities() {
        let html = "<div>Line&nbsp;one</div><br/>Tom &amp; Jerry &#8212; done&#65;";
        let text = strip_html(html);
        assert_eq!(text, "Line one\n\nTom & Jerry \u{2014} done\u{41}");
    }

    #[test]
    fn test_strip_html_collapses_blank_lines() {
        let html = "<p>a</p><p></p><p></p><p>b</p>";
        assert_eq!(strip_html(html), "a\n\nb");
    }

    #[test]
    fn test_strip_html_keeps_paragraph_text() {
        assert_eq!(strip_html("<span>x</span> <pre>y</pre>"), "x y");
    }
}
