//! Refresh job: source → loader → storage.
//!
//! ## Run modes
//!
//! `refresh()` — one shot (cron use):
//!   1. Fetch the case CSV from the configured source into `download_path`
//!   2. Parse and clean it
//!   3. Replace the `cases` table in a single transaction
//!   Every run is logged in `refresh_runs`, failures included.
//!
//! `watch()` — repeat `refresh()` on a fixed interval until Ctrl-C. A failed
//!   run is logged and the previous snapshot keeps serving queries.

use crate::config::AppConfig;
use crate::loader::load_csv;
use crate::source::DatasetSource;
use crate::storage::{RecordStore, Repository};
use crate::utils::Timer;
use anyhow::{Context, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

pub struct Pipeline {
    config: AppConfig,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub async fn refresh(&self, repo: Arc<Repository>, source: &dyn DatasetSource) -> Result<RefreshStats> {
        let _t = Timer::start("Dataset refresh");
        let run_id = repo.begin_refresh_run(&source.describe())?;

        let outcome = self.run_steps(Arc::clone(&repo), source).await;

        let logged = match &outcome {
            Ok(stats) => repo.finish_refresh_run(run_id, stats.rows_loaded, None),
            Err(e) => repo.finish_refresh_run(run_id, 0, Some(&format!("{:#}", e))),
        };
        if let Err(e) = logged {
            error!("Could not close refresh run #{}: {:#}", run_id, e);
        }
        outcome
    }

    async fn run_steps(&self, repo: Arc<Repository>, source: &dyn DatasetSource) -> Result<RefreshStats> {
        let dest = self.config.source.download_path.clone();
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Could not create dir {:?}", parent))?;
        }

        // ── 1. Fetch ───────────────────────────────────────────────────────────
        info!("=== Step 1: Fetching {} ===", source.describe());
        let bytes = source.fetch(&dest).await.context("Dataset fetch failed")?;

        // ── 2. Parse ───────────────────────────────────────────────────────────
        info!("=== Step 2: Parsing {:?} ===", dest);
        let path = dest.clone();
        let report = tokio::task::spawn_blocking(move || load_csv(&path))
            .await
            .context("Loader task panicked")??;

        // ── 3. Swap snapshot ──────────────────────────────────────────────────
        info!("=== Step 3: Replacing {} cases ===", report.records.len());
        let records = report.records;
        let rows_loaded = tokio::task::spawn_blocking(move || repo.replace_all(&records))
            .await
            .context("Storage task panicked")??;

        let stats = RefreshStats {
            bytes,
            rows_loaded,
            rows_skipped: report.skipped,
        };
        info!(
            "=== Done: {} bytes | {} cases | {} skipped ===",
            stats.bytes, stats.rows_loaded, stats.rows_skipped
        );
        Ok(stats)
    }

    /// Refresh every `every` until Ctrl-C.
    pub async fn watch(&self, repo: Arc<Repository>, source: &dyn DatasetSource, every: Duration) -> Result<()> {
        self.watch_until(repo, source, every, tokio::signal::ctrl_c()).await
    }

    /// Refresh every `every` until `shutdown` resolves. A refresh still in
    /// flight at that point is abandoned; its transaction never commits
    /// half a snapshot.
    pub async fn watch_until<F>(
        &self,
        repo: Arc<Repository>,
        source: &dyn DatasetSource,
        every: Duration,
        shutdown: F,
    ) -> Result<()>
    where
        F: Future<Output = std::io::Result<()>>,
    {
        let mut ticker = tokio::time::interval(every);
        tokio::pin!(shutdown);
        info!("Refreshing every {:?}; Ctrl-C to stop", every);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                res = &mut shutdown => {
                    info!("Stopping refresh loop");
                    return res.context("Shutdown signal failed");
                }
            }

            tokio::select! {
                outcome = self.refresh(Arc::clone(&repo), source) => {
                    if let Err(e) = outcome {
                        error!("Refresh failed, keeping previous snapshot: {:#}", e);
                    }
                }
                res = &mut shutdown => {
                    info!("Stopping refresh loop, abandoning the refresh in progress");
                    return res.context("Shutdown signal failed");
                }
            }
        }
    }
}

#[derive(Debug, PartialEq)]
pub struct RefreshStats {
    pub bytes: u64,
    pub rows_loaded: usize,
    pub rows_skipped: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::LocalFileSource;
    use async_trait::async_trait;
    use std::path::Path;

    /// Never finishes a download within the test's lifetime.
    struct StalledSource;

    #[async_trait]
    impl DatasetSource for StalledSource {
        fn describe(&self) -> String {
            "stalled".into()
        }

        async fn fetch(&self, _dest: &Path) -> Result<u64> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(0)
        }
    }

    /// Fails the fetch after dropping the run-log table out from under the pipeline.
    struct LogBreakingSource {
        repo: Arc<Repository>,
    }

    #[async_trait]
    impl DatasetSource for LogBreakingSource {
        fn describe(&self) -> String {
            "log-breaking".into()
        }

        async fn fetch(&self, _dest: &Path) -> Result<u64> {
            self.repo.execute_batch("DROP TABLE refresh_runs")?;
            anyhow::bail!("upstream unavailable")
        }
    }

    const CSV: &str = "id_evento_caso,carga_provincia_nombre,fallecido,clasificacion_resumen,fecha_diagnostico
1,Salta,NO,Confirmado,2020-05-01
2,Salta,NO,Sospechoso,2020-05-02
3,,NO,Confirmado,2020-05-03
";

    fn setup() -> (tempfile::TempDir, Pipeline, Arc<Repository>) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.source.download_path = dir.path().join("download/cases.csv");

        let repo = Repository::open_in_memory().unwrap();
        repo.run_migrations().unwrap();
        (dir, Pipeline::new(config), Arc::new(repo))
    }

    #[test]
    fn test_refresh_from_local_file() {
        let (dir, pipeline, repo) = setup();
        let input = dir.path().join("input.csv");
        std::fs::write(&input, CSV).unwrap();

        let stats = tokio_test::block_on(pipeline.refresh(Arc::clone(&repo), &LocalFileSource::new(&input))).unwrap();

        assert_eq!(stats.rows_loaded, 2);
        assert_eq!(stats.rows_skipped, 1);
        assert_eq!(stats.bytes, CSV.len() as u64);
        assert_eq!(repo.case_count().unwrap(), 2);

        let run = repo.last_refresh_run().unwrap().unwrap();
        assert_eq!(run.status, "success");
        assert_eq!(run.rows_loaded, 2);
    }

    #[test]
    fn test_failed_refresh_keeps_snapshot_and_logs_error() {
        let (dir, pipeline, repo) = setup();
        let input = dir.path().join("input.csv");
        std::fs::write(&input, CSV).unwrap();
        tokio_test::block_on(pipeline.refresh(Arc::clone(&repo), &LocalFileSource::new(&input))).unwrap();

        let missing = LocalFileSource::new(dir.path().join("gone.csv"));
        assert!(tokio_test::block_on(pipeline.refresh(Arc::clone(&repo), &missing)).is_err());

        assert_eq!(repo.case_count().unwrap(), 2);
        let run = repo.last_refresh_run().unwrap().unwrap();
        assert_eq!(run.status, "error");
        assert!(run.error_msg.unwrap().contains("fetch failed"));
    }

    #[test]
    fn test_run_log_failure_keeps_refresh_error() {
        let (_dir, pipeline, repo) = setup();
        let source = LogBreakingSource { repo: Arc::clone(&repo) };

        let err = tokio_test::block_on(pipeline.refresh(Arc::clone(&repo), &source)).unwrap_err();
        assert!(format!("{:#}", err).contains("upstream unavailable"));
    }

    #[test]
    fn test_watch_stops_during_refresh() {
        let (_dir, pipeline, repo) = setup();
        let shutdown = async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok::<_, std::io::Error>(())
        };

        let res = tokio_test::block_on(async {
            tokio::time::timeout(
                Duration::from_secs(5),
                pipeline.watch_until(Arc::clone(&repo), &StalledSource, Duration::from_secs(3600), shutdown),
            )
            .await
        });

        assert!(matches!(res, Ok(Ok(()))));
        assert_eq!(repo.case_count().unwrap(), 0);
        assert_eq!(repo.last_refresh_run().unwrap().unwrap().status, "running");
    }
}
