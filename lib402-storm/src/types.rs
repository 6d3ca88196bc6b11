use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = "PayPerCrawlProbe/1.0 (+discovery)";

static NO_HEADERS: BTreeMap<String, String> = BTreeMap::new();

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Price {
    pub amount: f64,
    pub currency: String,
}

/// Evidence that a site charges crawlers. Only exists when the response was
/// a 402 or carried a pricing header, so a price can never be attached to a
/// site that did not ask for payment.
#[derive(Debug, Clone, PartialEq)]
pub struct PayPerCrawl {
    pub price: Option<Price>,
}

/// What a completed HEAD request told us about the site.
///
/// Outside this crate the only way to build one is [`crate::classify`], which
/// takes a real status code and redacts the headers.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSignals {
    pub(crate) http_status: u16,
    pub(crate) headers: BTreeMap<String, String>,
    pub(crate) is_cloudflare_like: bool,
    pub(crate) pay_per_crawl: Option<PayPerCrawl>,
}

impl ResponseSignals {
    pub fn http_status(&self) -> u16 {
        self.http_status
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn is_cloudflare_like(&self) -> bool {
        self.is_cloudflare_like
    }

    pub fn pay_per_crawl(&self) -> Option<&PayPerCrawl> {
        self.pay_per_crawl.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    Responded(ResponseSignals),
    Failed { reason: String },
}

/// Terminal result of probing one domain.
///
/// Fields are private: a verdict is built once by the prober and only read
/// afterwards. A failed probe reports status 0, no headers and all flags off.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeVerdict {
    domain: String,
    url: String,
    outcome: ProbeOutcome,
    response_time: Duration,
    probed_at: DateTime<Utc>,
}

impl ProbeVerdict {
    pub(crate) fn new(domain: String, url: String, outcome: ProbeOutcome, response_time: Duration) -> Self {
        Self {
            domain,
            url,
            outcome,
            response_time,
            probed_at: Utc::now(),
        }
    }

    pub fn responded(domain: String, url: String, signals: ResponseSignals, response_time: Duration) -> Self {
        Self::new(domain, url, ProbeOutcome::Responded(signals), response_time)
    }

    pub fn failed(domain: String, url: String, reason: impl Into<String>, response_time: Duration) -> Self {
        Self::new(
            domain,
            url,
            ProbeOutcome::Failed { reason: reason.into() },
            response_time,
        )
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn outcome(&self) -> &ProbeOutcome {
        &self.outcome
    }

    fn signals(&self) -> Option<&ResponseSignals> {
        match &self.outcome {
            ProbeOutcome::Responded(signals) => Some(signals),
            ProbeOutcome::Failed { .. } => None,
        }
    }

    pub fn http_status(&self) -> u16 {
        self.signals().map(|s| s.http_status).unwrap_or(0)
    }

    pub fn has_pay_per_crawl(&self) -> bool {
        self.signals().is_some_and(|s| s.pay_per_crawl.is_some())
    }

    pub fn price(&self) -> Option<&Price> {
        self.signals()
            .and_then(|s| s.pay_per_crawl.as_ref())
            .and_then(|p| p.price.as_ref())
    }

    pub fn price_per_request(&self) -> Option<f64> {
        self.price().map(|p| p.amount)
    }

    pub fn currency(&self) -> Option<&str> {
        self.price().map(|p| p.currency.as_str())
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        self.signals().map(|s| &s.headers).unwrap_or(&NO_HEADERS)
    }

    pub fn is_cloudflare_like(&self) -> bool {
        self.signals().is_some_and(|s| s.is_cloudflare_like)
    }

    pub fn response_time(&self) -> Duration {
        self.response_time
    }

    pub fn response_time_ms(&self) -> u64 {
        u64::try_from(self.response_time.as_millis()).unwrap_or(u64::MAX)
    }

    pub fn probed_at(&self) -> DateTime<Utc> {
        self.probed_at
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            ProbeOutcome::Failed { reason } => Some(reason),
            ProbeOutcome::Responded(_) => None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error().is_some()
    }
}

/// Flat wire shape shared by the JSON report, NDJSON output and the
/// JSON-lines sink.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VerdictRecord<'a> {
    domain: &'a str,
    url: &'a str,
    http_status: u16,
    has_pay_per_crawl: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    price_per_request: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    currency: Option<&'a str>,
    headers: &'a BTreeMap<String, String>,
    is_cloudflare_like: bool,
    response_time_ms: u64,
    probed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

impl Serialize for ProbeVerdict {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        VerdictRecord {
            domain: &self.domain,
            url: &self.url,
            http_status: self.http_status(),
            has_pay_per_crawl: self.has_pay_per_crawl(),
            price_per_request: self.price_per_request(),
            currency: self.currency(),
            headers: self.headers(),
            is_cloudflare_like: self.is_cloudflare_like(),
            response_time_ms: self.response_time_ms(),
            probed_at: self.probed_at,
            error: self.error(),
        }
        .serialize(serializer)
    }
}

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub timeout: Duration,
    pub user_agent: String,
    pub concurrency: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            concurrency: 10,
        }
    }
}
