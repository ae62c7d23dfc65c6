mod aggregation;
mod config;
mod error;
mod loader;
mod models;
mod normalization;
mod output;
mod pipeline;
mod provinces;
mod service;
mod source;
mod storage;
mod utils;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::io::stdout;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::AppConfig;
use crate::models::{parse_query_date, CaseFilter, Classification};
use crate::output::{write_one, write_rows, OutputFormat};
use crate::pipeline::Pipeline;
use crate::service::CovidService;
use crate::source::{HttpSource, LocalFileSource};
use crate::storage::Repository;

#[derive(Parser)]
#[command(name = "covid-ar", about = "Argentine COVID-19 case statistics", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Apply schema migrations without loading data
    Migrate,

    /// Load a Covid19Casos.csv already on disk
    Load {
        file: PathBuf,
    },

    /// Download the dataset and replace the stored cases
    Refresh {
        /// Keep running and refresh on an interval
        #[arg(long)]
        watch: bool,

        /// Interval for --watch (default: refresh.interval_hours)
        #[arg(long, requires = "watch")]
        every_hours: Option<u64>,
    },

    /// Number of cases matching the filters
    Count {
        #[command(flatten)]
        filter: FilterArgs,
        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// Cases matching the filters
    List {
        #[command(flatten)]
        filter: FilterArgs,
        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// Daily and cumulative cases/deaths with per-capita rates
    Summary {
        #[command(flatten)]
        filter: FilterArgs,
        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// Confirmed-case totals, rates and lethality
    Stats {
        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// List provinces with their slugs
    Provinces {
        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Date the dataset was last updated at the source
    LastUpdate {
        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Show database statistics
    Info,
}

#[derive(Args, Debug)]
struct FilterArgs {
    #[arg(long, value_enum)]
    classification: Option<Classification>,

    /// Intensive care (true/false)
    #[arg(long)]
    icu: Option<bool>,

    /// Mechanical respiratory assistance (true/false)
    #[arg(long)]
    respirator: Option<bool>,

    /// Deceased (true/false); with `true`, --from/--to apply to the death date
    #[arg(long)]
    dead: Option<bool>,

    /// YYYY-MM-DD, inclusive
    #[arg(long, value_parser = parse_query_date)]
    from: Option<NaiveDate>,

    /// YYYY-MM-DD, inclusive
    #[arg(long, value_parser = parse_query_date)]
    to: Option<NaiveDate>,
}

impl From<FilterArgs> for CaseFilter {
    fn from(a: FilterArgs) -> Self {
        CaseFilter {
            classification: a.classification,
            icu: a.icu,
            respirator: a.respirator,
            deceased: a.dead,
            date_from: a.from,
            date_to: a.to,
        }
    }
}

#[derive(Args, Debug)]
struct ScopeArgs {
    /// Province slug (see `provinces`); whole country when omitted
    #[arg(short, long)]
    province: Option<String>,

    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,
}

impl ScopeArgs {
    fn province(&self) -> Option<&str> {
        let slug = self.province.as_deref()?;
        if provinces::resolve(slug).is_none() {
            warn!("Unknown province {:?}; result will be empty", slug);
        }
        Some(slug)
    }
}

#[derive(Serialize)]
struct CountOut {
    count: u64,
}

#[derive(Serialize)]
struct LastUpdateOut {
    last_update: Option<NaiveDate>,
}

#[derive(Serialize)]
struct ProvinceOut {
    slug: &'static str,
    province: &'static str,
    population: u64,
}

fn open_repo(config: &AppConfig) -> Result<Arc<Repository>> {
    let repo = Repository::open(&config.storage.db_path)?;
    if config.storage.run_migrations {
        repo.run_migrations()?;
    }
    Ok(Arc::new(repo))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "covid_ar=info,warn",
        1 => "covid_ar=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false).with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let config = AppConfig::load()?;

    match cli.command {
        Command::Migrate => {
            Repository::open(&config.storage.db_path)?.run_migrations()?;
            println!("Migrations applied.");
        }

        Command::Load { file } => {
            let repo = open_repo(&config)?;
            let stats = Pipeline::new(config)
                .refresh(repo, &LocalFileSource::new(file))
                .await?;
            info!("Done: {} cases, {} rows skipped", stats.rows_loaded, stats.rows_skipped);
        }

        Command::Refresh { watch, every_hours } => {
            let repo = open_repo(&config)?;
            let source = HttpSource::new(&config.source)?;
            let hours = every_hours.unwrap_or(config.refresh.interval_hours).max(1);
            let pipeline = Pipeline::new(config);

            if watch {
                pipeline
                    .watch(repo, &source, Duration::from_secs(hours * 3600))
                    .await?;
            } else {
                let stats = pipeline.refresh(repo, &source).await?;
                info!("Done: {} cases, {} rows skipped", stats.rows_loaded, stats.rows_skipped);
            }
        }

        Command::Count { filter, scope } => {
            let service = CovidService::new(open_repo(&config)?);
            let count = service.count(&filter.into(), scope.province())?;
            write_one(&CountOut { count }, scope.format, stdout().lock())?;
        }

        Command::List { filter, scope } => {
            let service = CovidService::new(open_repo(&config)?);
            let cases = service.cases(&filter.into(), scope.province())?;
            write_rows(&cases, scope.format, stdout().lock())?;
        }

        Command::Summary { filter, scope } => {
            let _t = utils::Timer::start("Summary");
            let service = CovidService::new(open_repo(&config)?);
            let rows = service.summary(&filter.into(), scope.province())?;
            write_rows(&rows, scope.format, stdout().lock())?;
        }

        Command::Stats { scope } => {
            let service = CovidService::new(open_repo(&config)?);
            let stats: Vec<_> = match scope.province() {
                Some(slug) => service.stats(Some(slug))?.into_iter().collect(),
                None => service.all_stats()?,
            };
            write_rows(&stats, scope.format, stdout().lock())?;
        }

        Command::Provinces { format } => {
            let list: Vec<ProvinceOut> = provinces::provinces()
                .iter()
                .map(|p| ProvinceOut {
                    slug: p.slug,
                    province: p.name,
                    population: p.population,
                })
                .collect();
            write_rows(&list, format, stdout().lock())?;
        }

        Command::LastUpdate { format } => {
            let service = CovidService::new(open_repo(&config)?);
            let last_update = service.last_update()?;
            write_one(&LastUpdateOut { last_update }, format, stdout().lock())?;
        }

        Command::Info => {
            let repo = open_repo(&config)?;
            let cases = repo.case_count()?;
            let (min, max) = repo.diagnosis_range()?;
            let last_run = repo.last_refresh_run()?;
            let fmt_date = |d: Option<NaiveDate>| d.map(|d| d.to_string()).unwrap_or("—".into());

            println!("─────────────────────────────────");
            println!("  COVID-19 AR — Database Stats");
            println!("─────────────────────────────────");
            println!("  Cases      : {}", utils::fmt_count(cases));
            println!("  Population : {}", utils::fmt_count(provinces::COUNTRY_POPULATION));
            println!("  From       : {}", fmt_date(min));
            println!("  To         : {}", fmt_date(max));
            match last_run {
                Some(run) => println!(
                    "  Last run   : #{} {} at {} ({} rows)",
                    run.id, run.status, run.started_at, run.rows_loaded
                ),
                None => println!("  Last run   : —"),
            }
            println!("─────────────────────────────────");
        }
    }

    Ok(())
}
