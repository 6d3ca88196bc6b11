use crate::prober::normalize_domain;
use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Failed to fetch domain list: {0}")]
    FetchError(#[from] reqwest::Error),
    #[error("Failed to read domain list: {0}")]
    Io(#[from] std::io::Error),
    #[error("Domain source unavailable: {0}")]
    Unavailable(String),
}

/// Supplies candidate domains to the discovery loop. May return fewer than
/// `limit`, or nothing at all.
#[async_trait]
pub trait DomainSource: Send + Sync {
    async fn next_domain_batch(&self, limit: usize) -> Result<Vec<String>, SourceError>;
}

/// Parse a domain list: one entry per line, `#` comments, and the
/// `rank,domain` form used by top-sites lists.
pub fn parse_domain_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#') && !line.is_empty())
        .map(|line| line.rsplit(',').next().unwrap_or(line))
        .map(|entry| normalize_domain(entry).to_lowercase())
        .filter(|domain| !domain.is_empty() && domain.contains('.'))
        .collect()
}

pub async fn fetch_domain_list(client: &Client, url: &str) -> Result<Vec<String>, SourceError> {
    let response = client.get(url).send().await?.error_for_status()?.text().await?;
    Ok(parse_domain_list(&response))
}

pub async fn read_domain_list(path: &std::path::Path) -> Result<Vec<String>, SourceError> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(parse_domain_list(&content))
}

/// Hands out a fixed list in `limit`-sized slices, starting over from the
/// top once the end is reached.
pub struct ListSource {
    domains: Vec<String>,
    cursor: Mutex<usize>,
}

impl ListSource {
    pub fn new(domains: Vec<String>) -> Self {
        Self {
            domains,
            cursor: Mutex::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

#[async_trait]
impl DomainSource for ListSource {
    async fn next_domain_batch(&self, limit: usize) -> Result<Vec<String>, SourceError> {
        if self.domains.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let mut cursor = self.cursor.lock().await;
        let take = limit.min(self.domains.len());
        let batch = self
            .domains
            .iter()
            .cycle()
            .skip(*cursor)
            .take(take)
            .cloned()
            .collect();
        *cursor = (*cursor + take) % self.domains.len();
        Ok(batch)
    }
}
