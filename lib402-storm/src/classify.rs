use crate::{
    headers::{non_empty, redact, CACHE_STATUS_HEADER, CDN_SERVER_TOKENS, PRICING_HEADERS, RAY_ID_HEADER, SERVER_HEADER},
    price::extract_price,
    types::{PayPerCrawl, ResponseSignals},
};
use reqwest::{header::HeaderMap, StatusCode};

/// Uses the same presence rule as [`redact`], so a positive answer always
/// leaves its evidence header in the verdict.
pub fn is_cloudflare_like(headers: &HeaderMap) -> bool {
    if non_empty(headers, RAY_ID_HEADER).is_some() || non_empty(headers, CACHE_STATUS_HEADER).is_some() {
        return true;
    }

    non_empty(headers, SERVER_HEADER)
        .map(|server| server.to_ascii_lowercase())
        .is_some_and(|server| CDN_SERVER_TOKENS.iter().any(|token| server.contains(token)))
}

pub fn has_pricing_header(headers: &HeaderMap) -> bool {
    PRICING_HEADERS
        .iter()
        .any(|name| non_empty(headers, name).is_some())
}

pub fn classify(status: StatusCode, headers: &HeaderMap) -> ResponseSignals {
    let charges = status == StatusCode::PAYMENT_REQUIRED || has_pricing_header(headers);

    ResponseSignals {
        http_status: status.as_u16(),
        headers: redact(headers),
        is_cloudflare_like: is_cloudflare_like(headers),
        pay_per_crawl: charges.then(|| PayPerCrawl {
            price: extract_price(headers),
        }),
    }
}
