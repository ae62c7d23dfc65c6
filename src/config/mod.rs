use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default = "default_source")]
    pub source: SourceConfig,
    #[serde(default = "default_storage")]
    pub storage: StorageConfig,
    #[serde(default = "default_refresh")]
    pub refresh: RefreshConfig,
}

/// Where the raw case CSV comes from
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    #[serde(default = "default_url")]
    pub url: String,

    /// Covers the whole transfer, body included.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff unit; attempt n waits roughly 2^n times this.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_download_path")]
    pub download_path: PathBuf,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

/// Refresh job configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RefreshConfig {
    /// Used by `refresh --watch` when no explicit interval is given.
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u64,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_url() -> String {
    "https://sisa.msal.gov.ar/datos/descargas/covid-19/files/Covid19Casos.csv".to_string()
}
fn default_timeout_secs() -> u64 {
    1800
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    1000
}
fn default_user_agent() -> String {
    "covid-ar/0.1 (case statistics; daily refresh)".to_string()
}
fn default_download_path() -> PathBuf {
    PathBuf::from("data/Covid19Casos.csv")
}
fn default_db_path() -> PathBuf {
    PathBuf::from("data/covid.duckdb")
}
fn default_true() -> bool {
    true
}
fn default_interval_hours() -> u64 {
    24
}

fn default_source() -> SourceConfig {
    SourceConfig {
        url: default_url(),
        timeout_secs: default_timeout_secs(),
        max_retries: default_max_retries(),
        retry_delay_ms: default_retry_delay_ms(),
        user_agent: default_user_agent(),
        download_path: default_download_path(),
    }
}
fn default_storage() -> StorageConfig {
    StorageConfig {
        db_path: default_db_path(),
        run_migrations: true,
    }
}
fn default_refresh() -> RefreshConfig {
    RefreshConfig {
        interval_hours: default_interval_hours(),
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("COVID_AR").separator("__"))
            .build()?;

        let app_cfg = cfg.try_deserialize().unwrap_or_else(|e| {
            warn!("Ignoring malformed configuration: {}", e);
            AppConfig::default()
        });
        Ok(app_cfg)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
            storage: default_storage(),
            refresh: default_refresh(),
        }
    }
}
