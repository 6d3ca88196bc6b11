//! Price extraction from pricing header values.
//!
//! Two shapes are recognised: a number optionally followed by a currency
//! code (`0.01 USD`, `0.01`) and a currency code followed by a number
//! (`USD 0.01`). Each shape is tried on its own; when both match, the one
//! starting earlier in the value wins, with number-first winning ties.
//! Numbers glued to further digits or dots (`1.2.3`) never match.

use crate::headers::{non_empty, PRICING_HEADERS};
use crate::types::Price;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::header::HeaderMap;

pub const DEFAULT_CURRENCY: &str = "USD";

lazy_static! {
    static ref NUMBER_FIRST: Regex =
        Regex::new(r"(?i)(?:^|[^0-9.])([0-9]+(?:\.[0-9]+)?)\s*([a-z]{3})?(?:[^a-z0-9.]|$)")
            .expect("number-first price pattern is valid");
    static ref CURRENCY_FIRST: Regex =
        Regex::new(r"(?i)(?:^|[^a-z])([a-z]{3})\s*([0-9]+(?:\.[0-9]+)?)(?:[^0-9.]|$)")
            .expect("currency-first price pattern is valid");
}

/// A price found inside a header value, with the byte offset where it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceMatch {
    pub offset: usize,
    pub price: Price,
}

fn build_price(number: &str, currency: Option<&str>) -> Option<Price> {
    let amount: f64 = number.parse().ok().filter(|n: &f64| n.is_finite())?;
    Some(Price {
        amount,
        currency: currency.unwrap_or(DEFAULT_CURRENCY).to_ascii_uppercase(),
    })
}

pub fn parse_number_first(value: &str) -> Option<PriceMatch> {
    let caps = NUMBER_FIRST.captures(value)?;
    let number = caps.get(1)?;
    let price = build_price(number.as_str(), caps.get(2).map(|m| m.as_str()))?;
    Some(PriceMatch {
        offset: number.start(),
        price,
    })
}

pub fn parse_currency_first(value: &str) -> Option<PriceMatch> {
    let caps = CURRENCY_FIRST.captures(value)?;
    let currency = caps.get(1)?;
    let price = build_price(caps.get(2)?.as_str(), Some(currency.as_str()))?;
    Some(PriceMatch {
        offset: currency.start(),
        price,
    })
}

pub fn parse_price(value: &str) -> Option<Price> {
    match (parse_number_first(value), parse_currency_first(value)) {
        (Some(a), Some(b)) if b.offset < a.offset => Some(b.price),
        (Some(a), _) => Some(a.price),
        (None, Some(b)) => Some(b.price),
        (None, None) => None,
    }
}

/// First parseable price across the pricing headers, in priority order.
pub fn extract_price(headers: &HeaderMap) -> Option<Price> {
    PRICING_HEADERS
        .iter()
        .filter_map(|name| non_empty(headers, name))
        .find_map(|value| parse_price(&value))
}
