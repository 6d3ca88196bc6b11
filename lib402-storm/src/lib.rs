mod classify;
pub mod discovery;
pub mod headers;
mod http;
pub mod price;
mod prober;
mod ratelimit;
pub mod sink;
pub mod sources;
mod summary;
mod transport;
mod types;

pub use classify::{classify, has_pricing_header, is_cloudflare_like};
pub use discovery::{DiscoveryConfig, DiscoveryError, DiscoveryLoop, RoundReport};
pub use http::{create_fetch_client, create_probe_client};
pub use prober::{normalize_domain, Prober};
pub use ratelimit::{HostRateLimiters, ThrottledTransport};
pub use sink::{DiscoverySink, JsonLinesSink, MemorySink, SinkError};
pub use sources::{fetch_domain_list, parse_domain_list, read_domain_list, DomainSource, ListSource, SourceError};
pub use summary::{BatchReport, BatchSummary};
pub use transport::{HeadTransport, ReqwestTransport, ResponseHead, TransportError};
pub use types::{
    PayPerCrawl, Price, ProbeConfig, ProbeOutcome, ProbeVerdict, ResponseSignals, DEFAULT_USER_AGENT,
};

use std::time::{Duration, Instant};

fn config_for(timeout: Duration, user_agent: &str, concurrency: usize) -> ProbeConfig {
    ProbeConfig {
        timeout,
        user_agent: user_agent.to_string(),
        concurrency,
    }
}

pub async fn probe(domain: &str, timeout: Duration, user_agent: &str) -> ProbeVerdict {
    let start = Instant::now();
    match Prober::with_config(config_for(timeout, user_agent, 1)) {
        Ok(prober) => prober.probe_one(domain).await,
        Err(e) => {
            let domain = normalize_domain(domain);
            let url = format!("https://{}", domain);
            ProbeVerdict::failed(domain, url, e.to_string(), start.elapsed())
        }
    }
}

pub async fn probe_batch<I>(domains: I, timeout: Duration, user_agent: &str, concurrency: usize) -> Vec<ProbeVerdict>
where
    I: IntoIterator<Item = String>,
{
    let start = Instant::now();
    match Prober::with_config(config_for(timeout, user_agent, concurrency)) {
        Ok(prober) => prober.probe_batch(domains).await,
        Err(e) => {
            let reason = e.to_string();
            domains
                .into_iter()
                .map(|domain| {
                    let domain = normalize_domain(&domain);
                    let url = format!("https://{}", domain);
                    ProbeVerdict::failed(domain, url, reason.clone(), start.elapsed())
                })
                .collect()
        }
    }
}
