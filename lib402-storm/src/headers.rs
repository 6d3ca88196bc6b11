use reqwest::header::HeaderMap;
use std::{borrow::Cow, collections::BTreeMap};

/// Pricing headers in the order they are consulted for a price. Vendors
/// disagree on naming, so several spellings are accepted.
pub const PRICING_HEADERS: [&str; 4] = [
    "crawler-price",
    "x-crawler-price",
    "x-pay-per-crawl",
    "x-price-per-request",
];

pub const RAY_ID_HEADER: &str = "cf-ray";
pub const CACHE_STATUS_HEADER: &str = "cf-cache-status";
pub const SERVER_HEADER: &str = "server";

pub const CDN_HEADERS: [&str; 3] = [RAY_ID_HEADER, CACHE_STATUS_HEADER, SERVER_HEADER];

/// Lowercase substrings of a `server` header that identify an edge proxy.
pub const CDN_SERVER_TOKENS: &[&str] = &["cloudflare"];

pub fn is_allowed(name: &str) -> bool {
    PRICING_HEADERS
        .iter()
        .chain(CDN_HEADERS.iter())
        .any(|allowed| allowed.eq_ignore_ascii_case(name))
}

/// Trimmed value of `name`, or `None` when absent or blank. Presence is
/// decided on the raw bytes, so obs-text values (`0,01 €`) still count; bytes
/// that are not UTF-8 are replaced lossily.
pub fn non_empty<'a>(headers: &'a HeaderMap, name: &str) -> Option<Cow<'a, str>> {
    headers
        .get(name)
        .map(|value| value.as_bytes().trim_ascii())
        .filter(|bytes| !bytes.is_empty())
        .map(String::from_utf8_lossy)
}

/// Copy only the allow-listed headers out of a response. Everything else the
/// server sent is dropped here and never reaches a verdict.
pub fn redact(headers: &HeaderMap) -> BTreeMap<String, String> {
    PRICING_HEADERS
        .iter()
        .chain(CDN_HEADERS.iter())
        .filter_map(|name| non_empty(headers, name).map(|v| (name.to_string(), v.into_owned())))
        .collect()
}
