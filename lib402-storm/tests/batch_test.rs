use async_trait::async_trait;
use futures::StreamExt;
use lib402_storm::{HeadTransport, ProbeConfig, Prober, ResponseHead, TransportError};
use reqwest::header::{HeaderMap, HeaderValue};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Start(String),
    End(String),
}

/// Transport that tracks how many requests are in flight and answers from a
/// per-host script.
#[derive(Default)]
struct InstrumentedTransport {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    events: Mutex<Vec<Event>>,
    delays: HashMap<String, Duration>,
    statuses: HashMap<String, u16>,
    refuse: Vec<String>,
    panic_on: Vec<String>,
    cancel_on_start: Option<CancellationToken>,
}

impl InstrumentedTransport {
    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

fn host_of(url: &str) -> String {
    url.trim_start_matches("https://").to_string()
}

#[async_trait]
impl HeadTransport for InstrumentedTransport {
    async fn head(&self, url: &str, _: Duration, _: &str) -> Result<ResponseHead, TransportError> {
        let host = host_of(url);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.events.lock().unwrap().push(Event::Start(host.clone()));
        if let Some(token) = &self.cancel_on_start {
            token.cancel();
        }

        let delay = self.delays.get(&host).copied().unwrap_or(Duration::from_millis(20));
        tokio::time::sleep(delay).await;

        self.events.lock().unwrap().push(Event::End(host.clone()));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.panic_on.contains(&host) {
            panic!("transport blew up for {host}");
        }
        if self.refuse.contains(&host) {
            return Err(TransportError::Connect("connection refused".to_string()));
        }

        let mut headers = HeaderMap::new();
        let status = self.statuses.get(&host).copied().unwrap_or(200);
        if status == 402 {
            headers.insert("crawler-price", HeaderValue::from_static("0.01 USD"));
        }
        Ok(ResponseHead { status, headers })
    }
}

fn prober(transport: Arc<InstrumentedTransport>, concurrency: usize) -> Prober {
    Prober::with_transport(
        transport,
        ProbeConfig {
            concurrency,
            timeout: Duration::from_secs(2),
            ..ProbeConfig::default()
        },
    )
}

fn domains(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn sorted_domains(verdicts: &[lib402_storm::ProbeVerdict]) -> Vec<String> {
    let mut names: Vec<String> = verdicts.iter().map(|v| v.domain().to_string()).collect();
    names.sort();
    names
}

#[tokio::test]
async fn batch_returns_one_verdict_per_domain() {
    let transport = Arc::new(InstrumentedTransport::default());
    let prober = prober(transport, 2);

    let verdicts = prober.probe_batch(domains(&["a.com", "b.com", "c.com"])).await;

    assert_eq!(verdicts.len(), 3);
    assert_eq!(sorted_domains(&verdicts), vec!["a.com", "b.com", "c.com"]);
}

#[tokio::test]
async fn batch_never_exceeds_concurrency() {
    let transport = Arc::new(InstrumentedTransport::default());
    let prober = prober(transport.clone(), 3);
    let names: Vec<String> = (0..20).map(|i| format!("site{i}.example")).collect();

    let verdicts = prober.probe_batch(names).await;

    assert_eq!(verdicts.len(), 20);
    assert!(transport.peak() <= 3, "peak in-flight was {}", transport.peak());
    assert_eq!(transport.peak(), 3);
}

#[tokio::test]
async fn next_chunk_waits_for_slowest_probe() {
    let transport = Arc::new(InstrumentedTransport {
        delays: HashMap::from([
            ("slow.com".to_string(), Duration::from_millis(150)),
            ("fast.com".to_string(), Duration::from_millis(5)),
            ("next.com".to_string(), Duration::from_millis(5)),
        ]),
        ..InstrumentedTransport::default()
    });
    let prober = prober(transport.clone(), 2);

    prober
        .probe_batch(domains(&["slow.com", "fast.com", "next.com"]))
        .await;

    let events = transport.events();
    let slow_end = events
        .iter()
        .position(|e| *e == Event::End("slow.com".to_string()))
        .unwrap();
    let next_start = events
        .iter()
        .position(|e| *e == Event::Start("next.com".to_string()))
        .unwrap();
    assert!(next_start > slow_end);
}

#[tokio::test]
async fn duplicates_are_probed_independently() {
    let transport = Arc::new(InstrumentedTransport::default());
    let prober = prober(transport.clone(), 4);

    let verdicts = prober
        .probe_batch(domains(&["dup.com", "dup.com", "https://dup.com/"]))
        .await;

    assert_eq!(verdicts.len(), 3);
    assert!(verdicts.iter().all(|v| v.domain() == "dup.com"));
    let starts = transport
        .events()
        .iter()
        .filter(|e| matches!(e, Event::Start(_)))
        .count();
    assert_eq!(starts, 3);
}

#[tokio::test]
async fn network_failures_stay_inside_verdicts() {
    let transport = Arc::new(InstrumentedTransport {
        refuse: vec!["down.com".to_string()],
        statuses: HashMap::from([("paid.com".to_string(), 402)]),
        ..InstrumentedTransport::default()
    });
    let prober = prober(transport, 2);

    let verdicts = prober
        .probe_batch(domains(&["down.com", "paid.com", "plain.com"]))
        .await;

    assert_eq!(verdicts.len(), 3);
    let by_domain: HashMap<&str, _> = verdicts.iter().map(|v| (v.domain(), v)).collect();

    let down = by_domain["down.com"];
    assert_eq!(down.http_status(), 0);
    assert_eq!(down.error(), Some("Connection failed: connection refused"));

    let paid = by_domain["paid.com"];
    assert!(paid.has_pay_per_crawl());
    assert_eq!(paid.price_per_request(), Some(0.01));

    assert!(by_domain["plain.com"].error().is_none());
}

#[tokio::test]
async fn panicking_probe_is_dropped_from_batch() {
    let transport = Arc::new(InstrumentedTransport {
        panic_on: vec!["boom.com".to_string()],
        ..InstrumentedTransport::default()
    });
    let prober = prober(transport, 2);

    let verdicts = prober
        .probe_batch(domains(&["ok1.com", "boom.com", "ok2.com"]))
        .await;

    assert_eq!(sorted_domains(&verdicts), vec!["ok1.com", "ok2.com"]);
}

#[tokio::test]
async fn cancelled_batch_launches_no_new_chunks() {
    let cancel = CancellationToken::new();
    // cancel as soon as the first request of the first chunk is under way
    let transport = Arc::new(InstrumentedTransport {
        cancel_on_start: Some(cancel.clone()),
        ..InstrumentedTransport::default()
    });
    let prober = prober(transport.clone(), 2);

    let verdicts = prober
        .probe_batch_until(domains(&["a.com", "b.com", "c.com", "d.com", "e.com"]), &cancel)
        .await;

    // the first chunk was already running and finishes
    assert_eq!(sorted_domains(&verdicts), vec!["a.com", "b.com"]);
    let started: Vec<Event> = transport
        .events()
        .into_iter()
        .filter(|e| matches!(e, Event::Start(_)))
        .collect();
    assert_eq!(started.len(), 2);
}

#[tokio::test]
async fn already_cancelled_batch_is_empty() {
    let transport = Arc::new(InstrumentedTransport::default());
    let prober = prober(transport.clone(), 2);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let verdicts = prober.probe_batch_until(domains(&["a.com"]), &cancel).await;

    assert!(verdicts.is_empty());
    assert!(transport.events().is_empty());
}

#[tokio::test]
async fn stream_refills_without_exceeding_ceiling() {
    let transport = Arc::new(InstrumentedTransport::default());
    let prober = prober(transport.clone(), 4);
    let names: Vec<String> = (0..25).map(|i| format!("stream{i}.example")).collect();

    let verdicts: Vec<_> = prober.probe_stream(names).collect().await;

    assert_eq!(verdicts.len(), 25);
    assert!(transport.peak() <= 4);
}

#[tokio::test]
async fn empty_batch_is_empty() {
    let transport = Arc::new(InstrumentedTransport::default());
    let prober = prober(transport.clone(), 3);

    assert!(prober.probe_batch(Vec::new()).await.is_empty());
    assert_eq!(transport.peak(), 0);
}
