use crate::http::create_probe_client;
use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, USER_AGENT},
    Client,
};
use std::{error::Error as StdError, time::Duration};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request timed out after {0} ms")]
    Timeout(u64),
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("Request failed: {0}")]
    Request(String),
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),
    #[error("Invalid domain: {0:?}")]
    InvalidDomain(String),
}

impl TransportError {
    pub fn timeout(after: Duration) -> Self {
        TransportError::Timeout(u64::try_from(after.as_millis()).unwrap_or(u64::MAX))
    }

    fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            TransportError::timeout(timeout)
        } else if err.is_connect() {
            TransportError::Connect(describe(&err))
        } else {
            TransportError::Request(describe(&err))
        }
    }
}

/// Flatten an error and its sources into one line. reqwest's top-level
/// message rarely says more than "error sending request"; the DNS, TLS or
/// socket detail lives in the source chain.
fn describe(err: &(dyn StdError + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if parts.last() != Some(&text) {
            parts.push(text);
        }
        source = cause.source();
    }
    parts.join(": ")
}

/// Status line and headers of a HEAD response, after redirects.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: u16,
    pub headers: HeaderMap,
}

/// Issues a single HEAD request. The deadline and user agent are passed with
/// every call rather than configured once.
#[async_trait]
pub trait HeadTransport: Send + Sync {
    async fn head(
        &self,
        url: &str,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<ResponseHead, TransportError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = create_probe_client().map_err(|e| TransportError::ClientBuild(describe(&e)))?;
        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HeadTransport for ReqwestTransport {
    async fn head(
        &self,
        url: &str,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<ResponseHead, TransportError> {
        let response = self
            .client
            .head(url)
            .timeout(timeout)
            .header(USER_AGENT, user_agent)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(e, timeout))?;

        Ok(ResponseHead {
            status: response.status().as_u16(),
            headers: response.headers().clone(),
        })
    }
}
