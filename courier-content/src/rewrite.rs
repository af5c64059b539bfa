//! Anchor rewriting for click tracking, and the raw link inventory.

use std::sync::LazyLock;

use courier_common::message::TrackingToken;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use regex::{Captures, Regex};

/// Everything except the characters `encodeURIComponent` leaves alone, so the
/// `url=` parameter matches what the tracking endpoints were built against.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

static HREF_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"href\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("href pattern is valid")
});

static INVENTORY_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"href="(https?://[^"]+)""#).expect("inventory pattern is valid")
});

/// Schemes and pseudo-targets that must never be routed through the redirect.
fn is_untrackable(href: &str) -> bool {
    let lower = href.trim_start().to_ascii_lowercase();
    lower.is_empty()
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with('#')
}

/// Rewrite every trackable anchor href into a click-tracking redirect:
/// `{base}/track/click/{token}?url={encoded original}`.
///
/// `mailto:`, `tel:`, fragment-only, and empty hrefs pass through untouched.
/// Quote style is preserved.
#[must_use]
pub fn rewrite_links(html: &str, token: &TrackingToken, base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');

    HREF_ATTR
        .replace_all(html, |caps: &Captures<'_>| {
            let (quote, original) = if let Some(m) = caps.get(1) {
                ('"', m.as_str())
            } else if let Some(m) = caps.get(2) {
                ('\'', m.as_str())
            } else {
                return caps[0].to_string();
            };

            if is_untrackable(original) {
                return caps[0].to_string();
            }

            let encoded = utf8_percent_encode(original, URI_COMPONENT);
            format!("href={quote}{base}/track/click/{token}?url={encoded}{quote}")
        })
        .into_owned()
}

/// Scan raw HTML text for absolute `http(s)` links and return the unique set
/// in first-seen order.
///
/// This feeds the campaign link inventory; it is a plain pattern scan and is
/// intentionally independent of the tracking rewrite above.
#[must_use]
pub fn extract_links(html: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut links = Vec::new();

    for caps in INVENTORY_LINK.captures_iter(html) {
        if let Some(url) = caps.get(1) {
            if seen.insert(url.as_str()) {
                links.push(url.as_str().to_string());
            }
        }
    }

    links
}
