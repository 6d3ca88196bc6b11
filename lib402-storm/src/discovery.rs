//! Long-running discovery: pull candidates, probe them, record the ones that
//! ask crawlers to pay, sleep, repeat.
//!
//! A failing round (source error, panic anywhere in the round) is logged and
//! the next round runs on schedule. `stop` waits for the current round to
//! finish; it never interrupts one.

use crate::{
    prober::Prober,
    sink::DiscoverySink,
    sources::{DomainSource, SourceError},
    summary::BatchSummary,
};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("Discovery round aborted: {0}")]
    Aborted(String),
}

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub batch_size: usize,
    pub interval: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundReport {
    pub summary: BatchSummary,
    pub recorded: usize,
    pub sink_failures: usize,
}

struct Shared {
    prober: Prober,
    source: Arc<dyn DomainSource>,
    sink: Arc<dyn DiscoverySink>,
    config: DiscoveryConfig,
}

impl Shared {
    async fn run_round(&self) -> Result<RoundReport, DiscoveryError> {
        let domains = self.source.next_domain_batch(self.config.batch_size).await?;
        if domains.is_empty() {
            tracing::debug!("domain source returned no candidates");
            return Ok(RoundReport::default());
        }

        let verdicts = self.prober.probe_batch(domains).await;
        let mut report = RoundReport {
            summary: BatchSummary::from_verdicts(&verdicts),
            ..RoundReport::default()
        };

        for verdict in verdicts.iter().filter(|v| v.has_pay_per_crawl()) {
            match self.sink.record_discovery(verdict).await {
                Ok(()) => {
                    report.recorded += 1;
                    tracing::info!(
                        domain = verdict.domain(),
                        status = verdict.http_status(),
                        price = verdict.price_per_request(),
                        currency = verdict.currency(),
                        "pay-per-crawl domain discovered"
                    );
                }
                Err(e) => {
                    report.sink_failures += 1;
                    tracing::warn!(domain = verdict.domain(), error = %e, "failed to record discovery");
                }
            }
        }

        Ok(report)
    }
}

struct Running {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct DiscoveryLoop {
    shared: Arc<Shared>,
    running: Mutex<Option<Running>>,
}

impl DiscoveryLoop {
    pub fn new(
        prober: Prober,
        source: Arc<dyn DomainSource>,
        sink: Arc<dyn DiscoverySink>,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                prober,
                source,
                sink,
                config,
            }),
            running: Mutex::new(None),
        }
    }

    /// Run a single round in the caller's task.
    pub async fn run_round(&self) -> Result<RoundReport, DiscoveryError> {
        self.shared.run_round().await
    }

    /// Start the loop in the background. Returns `false` if it was already
    /// running.
    pub async fn start(&self) -> bool {
        let mut running = self.running.lock().await;
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return false;
        }

        let token = CancellationToken::new();
        let handle = tokio::spawn(run_loop(Arc::clone(&self.shared), token.clone()));
        *running = Some(Running { token, handle });
        true
    }

    /// Stop the loop and wait for the round in progress, if any, to finish.
    /// Stopping a loop that is not running does nothing.
    pub async fn stop(&self) {
        let Some(Running { token, handle }) = self.running.lock().await.take() else {
            return;
        };

        token.cancel();
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "discovery loop task ended abnormally");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }
}

impl Drop for DiscoveryLoop {
    /// A dropped loop can no longer be stopped, so cancel it here. The round
    /// in progress still finishes in the background.
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.token.cancel();
        }
    }
}

async fn run_loop(shared: Arc<Shared>, token: CancellationToken) {
    tracing::info!(
        batch_size = shared.config.batch_size,
        interval_secs = shared.config.interval.as_secs(),
        "discovery loop started"
    );

    let mut round: u64 = 0;
    while !token.is_cancelled() {
        round = round.wrapping_add(1);

        // Each round gets its own task so a panic stays inside it.
        let round_shared = Arc::clone(&shared);
        let outcome = tokio::spawn(async move { round_shared.run_round().await })
            .await
            .map_err(|e| DiscoveryError::Aborted(e.to_string()))
            .and_then(|result| result);

        match outcome {
            Ok(report) => tracing::info!(
                round,
                probed = report.summary.total_probed,
                found = report.summary.pay_per_crawl_found,
                errors = report.summary.errors,
                recorded = report.recorded,
                sink_failures = report.sink_failures,
                "discovery round complete"
            ),
            Err(e) => tracing::error!(round, error = %e, "discovery round failed"),
        }

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(shared.config.interval) => {}
        }
    }

    tracing::info!(rounds = round, "discovery loop stopped");
}
