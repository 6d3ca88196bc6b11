use crate::transport::{HeadTransport, ResponseHead, TransportError};
use async_trait::async_trait;
use dashmap::DashMap;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::Url;
use std::{num::NonZeroU32, sync::Arc, time::Duration};

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

pub struct HostRateLimiters {
    limiters: DashMap<String, Arc<Limiter>>,
    rate_per_second: NonZeroU32,
}

impl HostRateLimiters {
    pub fn new(rate_per_second: NonZeroU32) -> Self {
        Self {
            limiters: DashMap::new(),
            rate_per_second,
        }
    }

    pub async fn acquire(&self, host: &str) {
        let limiter = self.get_or_create(host);
        limiter.until_ready().await;
    }

    pub fn tracked_hosts(&self) -> usize {
        self.limiters.len()
    }

    fn get_or_create(&self, host: &str) -> Arc<Limiter> {
        self.limiters
            .entry(host.to_ascii_lowercase())
            .or_insert_with(|| {
                let quota = Quota::per_second(self.rate_per_second).allow_burst(NonZeroU32::MIN);
                Arc::new(RateLimiter::direct(quota))
            })
            .clone()
    }
}

/// Wraps a transport so requests to the same host are spaced out. The wait
/// for a permit counts against the probe's own deadline.
pub struct ThrottledTransport<T> {
    inner: T,
    limiters: HostRateLimiters,
}

impl<T: HeadTransport> ThrottledTransport<T> {
    pub fn new(inner: T, rate_per_second: NonZeroU32) -> Self {
        Self {
            inner,
            limiters: HostRateLimiters::new(rate_per_second),
        }
    }
}

#[async_trait]
impl<T: HeadTransport> HeadTransport for ThrottledTransport<T> {
    async fn head(
        &self,
        url: &str,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<ResponseHead, TransportError> {
        let host = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .ok_or_else(|| TransportError::InvalidDomain(url.to_string()))?;

        self.limiters.acquire(&host).await;
        self.inner.head(url, timeout, user_agent).await
    }
}
