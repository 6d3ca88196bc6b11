use crate::types::ProbeVerdict;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::{fs::OpenOptions, io::AsyncWriteExt, sync::Mutex};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Failed to write discovery: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to encode discovery: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Discovery rejected: {0}")]
    Rejected(String),
}

/// Receives every verdict that asked for payment.
#[async_trait]
pub trait DiscoverySink: Send + Sync {
    async fn record_discovery(&self, verdict: &ProbeVerdict) -> Result<(), SinkError>;
}

/// Appends each discovery to a file as one JSON object per line.
pub struct JsonLinesSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonLinesSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DiscoverySink for JsonLinesSink {
    async fn record_discovery(&self, verdict: &ProbeVerdict) -> Result<(), SinkError> {
        let mut line = serde_json::to_string(verdict)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySink {
    recorded: Mutex<Vec<ProbeVerdict>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn recorded(&self) -> Vec<ProbeVerdict> {
        self.recorded.lock().await.clone()
    }
}

#[async_trait]
impl DiscoverySink for MemorySink {
    async fn record_discovery(&self, verdict: &ProbeVerdict) -> Result<(), SinkError> {
        self.recorded.lock().await.push(verdict.clone());
        Ok(())
    }
}
