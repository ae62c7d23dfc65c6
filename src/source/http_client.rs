use crate::config::SourceConfig;
use anyhow::{Context, Result};
use reqwest::StatusCode;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::{debug, warn};
use url::Url;

pub struct HttpClient {
    inner: reqwest::Client,
    config: SourceConfig,
}

impl HttpClient {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            inner,
            config: config.clone(),
        })
    }

    /// Download `url` into `dest`, retrying transient failures with
    /// exponential backoff plus jitter. Returns the number of bytes written.
    pub async fn download(&self, url: &Url, dest: &Path) -> Result<u64> {
        let strategy = ExponentialBackoff::from_millis(2)
            .factor(self.config.retry_delay_ms)
            .max_delay(Duration::from_secs(60))
            .map(jitter)
            .take(self.config.max_retries as usize);

        RetryIf::start(strategy, || self.try_download(url, dest), is_transient)
            .await
            .with_context(|| format!("All retries exhausted for {}", url))
    }

    async fn try_download(&self, url: &Url, dest: &Path) -> Result<u64> {
        debug!("GET {}", url);

        let mut resp = self
            .inner
            .get(url.as_str())
            .send()
            .await
            .context("Request error")?
            .error_for_status()
            .context("HTTP error")?;

        // Stream into a sibling file so a failed transfer never clobbers `dest`.
        let partial = dest.with_extension("part");
        let written = match stream_to(&mut resp, &partial).await {
            Ok(n) => n,
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&partial).await {
                    debug!("Could not remove {:?}: {}", partial, rm);
                }
                return Err(e);
            }
        };

        tokio::fs::rename(&partial, dest)
            .await
            .with_context(|| format!("Could not move download to {:?}", dest))?;
        Ok(written)
    }
}

async fn stream_to(resp: &mut reqwest::Response, path: &Path) -> Result<u64> {
    let mut file = tokio::fs::File::create(path)
        .await
        .with_context(|| format!("Could not create {:?}", path))?;

    let mut written = 0u64;
    while let Some(chunk) = resp.chunk().await.context("Failed to read response body")? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

/// Retry network failures, 5xx and 429. Other 4xx and local I/O errors fail
/// straight away.
fn is_transient(err: &anyhow::Error) -> bool {
    let transient = match err.downcast_ref::<reqwest::Error>() {
        Some(e) => match e.status() {
            Some(s) => s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS,
            None => true,
        },
        None => false,
    };
    if transient {
        warn!("Transient download failure: {:#}", err);
    }
    transient
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    /// Answer every connection with `response`, counting requests.
    async fn serve(response: &'static str) -> (Url, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = Url::parse(&format!("http://{}/cases.csv", listener.local_addr().unwrap())).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        (url, hits)
    }

    fn client(max_retries: u32) -> HttpClient {
        let mut cfg = AppConfig::default().source;
        cfg.max_retries = max_retries;
        cfg.retry_delay_ms = 1;
        HttpClient::new(&cfg).unwrap()
    }

    #[test]
    fn test_local_io_errors_are_not_retried() {
        let err = anyhow::Error::new(std::io::Error::from(std::io::ErrorKind::PermissionDenied))
            .context("Could not create \"cases.part\"");
        assert!(!is_transient(&err));
    }

    #[test]
    fn test_download_writes_body() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("cases.csv");

        let bytes = tokio_test::block_on(async {
            let (url, _) = serve("HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello").await;
            client(0).download(&url, &dest).await
        })
        .unwrap();

        assert_eq!(bytes, 5);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "hello");
        assert!(!dest.with_extension("part").exists());
    }

    #[test]
    fn test_unwritable_destination_fails_once() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("missing/cases.csv");

        let (res, hits) = tokio_test::block_on(async {
            let (url, hits) = serve("HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello").await;
            (client(3).download(&url, &dest).await, hits)
        });

        assert!(res.is_err());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_truncated_body_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("cases.csv");

        let res = tokio_test::block_on(async {
            let (url, _) = serve("HTTP/1.1 200 OK\r\nContent-Length: 100\r\nConnection: close\r\n\r\nhello").await;
            client(0).download(&url, &dest).await
        });

        assert!(res.is_err());
        assert!(!dest.exists());
        assert!(!dest.with_extension("part").exists());
    }

    #[test]
    fn test_client_builds_from_config() {
        let cfg = AppConfig::default();
        assert!(HttpClient::new(&cfg.source).is_ok());
    }
}
