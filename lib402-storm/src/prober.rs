use crate::{
    classify::classify,
    transport::{HeadTransport, ReqwestTransport, TransportError},
    types::{ProbeConfig, ProbeOutcome, ProbeVerdict},
};
use futures::stream::{self, FuturesUnordered, Stream, StreamExt};
use reqwest::StatusCode;
use std::{sync::Arc, time::Instant};
use tokio_util::sync::CancellationToken;

/// Strip a leading `http://` or `https://` and any trailing slashes.
pub fn normalize_domain(input: &str) -> String {
    let trimmed = input.trim();
    let lower = trimmed.to_ascii_lowercase();
    let without_scheme = if lower.starts_with("https://") {
        &trimmed["https://".len()..]
    } else if lower.starts_with("http://") {
        &trimmed["http://".len()..]
    } else {
        trimmed
    };
    without_scheme.trim_end_matches('/').to_string()
}

#[derive(Clone)]
pub struct Prober {
    transport: Arc<dyn HeadTransport>,
    config: ProbeConfig,
}

impl Prober {
    pub fn new() -> Result<Self, TransportError> {
        Self::with_config(ProbeConfig::default())
    }

    pub fn with_config(config: ProbeConfig) -> Result<Self, TransportError> {
        let transport = ReqwestTransport::new()?;
        Ok(Self::with_transport(Arc::new(transport), config))
    }

    pub fn with_transport(transport: Arc<dyn HeadTransport>, config: ProbeConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    fn concurrency(&self) -> usize {
        self.config.concurrency.max(1)
    }

    /// Probe one domain. Every failure ends up inside the returned verdict.
    pub async fn probe_one(&self, domain_input: &str) -> ProbeVerdict {
        let start = Instant::now();
        let domain = normalize_domain(domain_input);
        let url = format!("https://{}", domain);

        if domain.is_empty() || domain.contains(char::is_whitespace) {
            let err = TransportError::InvalidDomain(domain_input.to_string());
            return ProbeVerdict::failed(domain, url, err.to_string(), start.elapsed());
        }

        let timeout = self.config.timeout;
        let request = self.transport.head(&url, timeout, &self.config.user_agent);

        let outcome = match tokio::time::timeout(timeout, request).await {
            Ok(Ok(head)) => match StatusCode::from_u16(head.status) {
                Ok(status) => ProbeOutcome::Responded(classify(status, &head.headers)),
                Err(_) => ProbeOutcome::Failed {
                    reason: TransportError::Request(format!("invalid HTTP status {}", head.status)).to_string(),
                },
            },
            Ok(Err(e)) => ProbeOutcome::Failed { reason: e.to_string() },
            Err(_) => ProbeOutcome::Failed {
                reason: TransportError::timeout(timeout).to_string(),
            },
        };

        let verdict = ProbeVerdict::new(domain, url, outcome, start.elapsed());

        tracing::debug!(
            domain = verdict.domain(),
            status = verdict.http_status(),
            pay_per_crawl = verdict.has_pay_per_crawl(),
            cdn = verdict.is_cloudflare_like(),
            elapsed_ms = verdict.response_time_ms(),
            error = verdict.error(),
            "probed"
        );

        verdict
    }

    /// Probe every domain, `concurrency` at a time. Each chunk finishes
    /// before the next one starts. Output order follows chunk order and,
    /// within a chunk, completion order.
    pub async fn probe_batch<I>(&self, domains: I) -> Vec<ProbeVerdict>
    where
        I: IntoIterator<Item = String>,
    {
        self.probe_batch_until(domains, &CancellationToken::new()).await
    }

    /// Like [`Prober::probe_batch`], but stops launching chunks once `cancel`
    /// fires. Probes already in flight are allowed to finish.
    pub async fn probe_batch_until<I>(&self, domains: I, cancel: &CancellationToken) -> Vec<ProbeVerdict>
    where
        I: IntoIterator<Item = String>,
    {
        let domains: Vec<String> = domains.into_iter().collect();
        let mut verdicts = Vec::with_capacity(domains.len());

        for chunk in domains.chunks(self.concurrency()) {
            if cancel.is_cancelled() {
                tracing::debug!(
                    remaining = domains.len().saturating_sub(verdicts.len()),
                    "batch cancelled"
                );
                break;
            }

            let mut in_flight: FuturesUnordered<_> = chunk
                .iter()
                .map(|domain| {
                    let prober = self.clone();
                    let task_domain = domain.clone();
                    let handle = tokio::spawn(async move { prober.probe_one(&task_domain).await });
                    let domain = domain.clone();
                    async move { (domain, handle.await) }
                })
                .collect();

            while let Some((domain, joined)) = in_flight.next().await {
                match joined {
                    Ok(verdict) => verdicts.push(verdict),
                    Err(e) => {
                        tracing::warn!(domain = %domain, error = %e, "probe task failed, dropping domain from batch");
                    }
                }
            }
        }

        verdicts
    }

    /// Continuously refilling pool: a new probe starts as soon as any of the
    /// `concurrency` in-flight probes completes.
    pub fn probe_stream<I>(&self, domains: I) -> impl Stream<Item = ProbeVerdict> + '_
    where
        I: IntoIterator<Item = String> + 'static,
    {
        let domains: Vec<String> = domains.into_iter().collect();

        stream::iter(domains)
            .map(move |domain| async move { self.probe_one(&domain).await })
            .buffer_unordered(self.concurrency())
    }
}
