pub mod http_client;

use crate::config::SourceConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;
use url::Url;

use self::http_client::HttpClient;

// ── Source trait ──────────────────────────────────────────────────────────────

/// Swappable origin of the raw case CSV.
#[async_trait]
pub trait DatasetSource: Send + Sync {
    /// Human-readable origin, recorded in the refresh log.
    fn describe(&self) -> String;

    /// Materialize the dataset at `dest`. Returns the number of bytes written.
    async fn fetch(&self, dest: &Path) -> Result<u64>;
}

// ── SISA download ─────────────────────────────────────────────────────────────

pub struct HttpSource {
    client: HttpClient,
    url: Url,
}

impl HttpSource {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let url = Url::parse(&config.url).with_context(|| format!("Invalid source url {:?}", config.url))?;
        Ok(Self {
            client: HttpClient::new(config)?,
            url,
        })
    }
}

#[async_trait]
impl DatasetSource for HttpSource {
    fn describe(&self) -> String {
        self.url.to_string()
    }

    async fn fetch(&self, dest: &Path) -> Result<u64> {
        info!("Downloading {}", self.url);
        let bytes = self.client.download(&self.url, dest).await?;
        info!("Downloaded {} bytes to {:?}", bytes, dest);
        Ok(bytes)
    }
}

// ── Local file ────────────────────────────────────────────────────────────────

/// A CSV already on disk, e.g. a manual download.
pub struct LocalFileSource {
    path: PathBuf,
}

impl LocalFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DatasetSource for LocalFileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn fetch(&self, dest: &Path) -> Result<u64> {
        if self.path == dest {
            let meta = tokio::fs::metadata(dest).await?;
            return Ok(meta.len());
        }
        tokio::fs::copy(&self.path, dest)
            .await
            .with_context(|| format!("Failed to copy {:?} to {:?}", self.path, dest))
    }
}
