use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

mod analysis;
mod config;
mod dates;
mod db;
mod dedupe;
mod email;
mod error;
mod export;
mod ingest;
mod models;
mod normalize;
mod overlap;
mod report;
mod sheet;
mod store;

use config::{AcceptancePolicy, CleanupConfig, ExportConfig, PipelineConfig};
use db::PgGuestStore;
use error::{IngestError, ResolveError};
use store::GuestStore;

#[derive(Parser)]
#[command(name = "guest-contacts")]
#[command(about = "Import, clean and export hostel guest contacts", long_about = None)]
struct Cli {
    /// Print reports as JSON instead of text
    #[arg(long, global = true)]
    json: bool,
    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Import guests from a spreadsheet saved as CSV
    Import {
        #[arg(long)]
        file: PathBuf,
        /// Hostel label stored on every imported guest
        #[arg(long)]
        hostel: Option<String>,
        #[arg(long, value_enum, default_value_t = AcceptancePolicy::AnyIdentifier)]
        policy: AcceptancePolicy,
        /// Skip rows whose email is invalid or belongs to a booking platform
        #[arg(long)]
        filter_flagged: bool,
        /// chrono format of the last-stay column
        #[arg(long)]
        date_format: Option<String>,
        /// Latest records to show after the import
        #[arg(long, default_value_t = 10)]
        recent: usize,
    },
    /// Remove records whose email already exists with a lower id
    Dedupe {
        /// Delete for real; without this flag only the plan is shown
        #[arg(long)]
        execute: bool,
        /// Skip the table copy taken before deleting
        #[arg(long)]
        no_backup: bool,
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        batch_size: Option<u64>,
    },
    /// Write a Brevo contact CSV with only clean emails
    Export {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Count distinct guests whose stay overlaps a year
    CountGuests {
        #[arg(long, default_value_t = 2024)]
        year: i32,
        #[arg(long)]
        per_hostel: bool,
    },
    /// Profile stored emails: duplicates, domains, likely fake addresses
    Analyze,
}

fn init_tracing(log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let file_layer = match log_file {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("failed to create log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(())
}

fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce(&T) -> String) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print!("{}", text(value));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_file.as_deref())?;

    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to the guest contacts Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping at the next row or batch");
            interrupt.cancel();
        }
    });

    let json = cli.json;
    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Import {
            file,
            hostel,
            policy,
            filter_flagged,
            date_format,
            recent,
        } => {
            let mut pipeline = PipelineConfig::from_env();
            pipeline.policy = policy;
            pipeline.filter_flagged = filter_flagged;
            if let Some(hostel) = hostel {
                pipeline.hostel = hostel;
            }
            if let Some(format) = date_format {
                pipeline.date_format = format;
            }

            let rows = sheet::read_rows(&file)?;
            let normalizer = normalize::RecordNormalizer::new(pipeline);
            let mut store = PgGuestStore::new(pool.clone());

            let report = match ingest::ingest(&mut store, &normalizer, rows, &cancel).await {
                Ok(report) => report,
                Err(IngestError::Commit { report, source }) => {
                    emit(json, report.as_ref(), report::build_ingest_report)?;
                    return Err(source).context("import was not committed");
                }
            };
            emit(json, &report, report::build_ingest_report)?;

            if !json && recent > 0 {
                let latest = store.list_recent(recent).await?;
                print!("\n{}", report::build_recent_records(&latest));
            }
        }
        Commands::Dedupe {
            execute,
            no_backup,
            batch_size,
        } => {
            let mut cleanup = CleanupConfig::from_env();
            cleanup.dry_run = !execute;
            cleanup.backup = !no_backup;
            if let Some(size) = batch_size {
                cleanup.batch_size = usize::try_from(size).unwrap_or(usize::MAX);
            }

            let mut store = PgGuestStore::new(pool.clone());
            let before = store.table_stats().await?;
            if !json {
                println!("{}", report::build_stats("Before", &before));
            }

            let resolver = dedupe::DuplicateResolver::new(cleanup);
            let report = match resolver.resolve(&mut store, &cancel).await {
                Ok(report) => report,
                Err(ResolveError::PartialDeletion { report, source }) => {
                    emit(json, report.as_ref(), report::build_cleanup_report)?;
                    return Err(source).context("duplicate deletion stopped partway");
                }
                Err(err) => return Err(err.into()),
            };
            emit(json, &report, report::build_cleanup_report)?;

            if !report.dry_run && !json {
                let after = store.table_stats().await?;
                print!("\n{}", report::build_stats("After", &after));
            }
        }
        Commands::Export { out } => {
            let config = ExportConfig::from_env();
            let path = out.unwrap_or_else(|| export::timestamped_path(&config));
            let mut store = PgGuestStore::new(pool.clone());
            let report = export::export_guests(&mut store, &config, &path).await?;
            emit(json, &report, |r| report::build_export_report(r, &config.fake_domains))?;
        }
        Commands::CountGuests { year, per_hostel } => {
            let mut store = PgGuestStore::new(pool.clone());
            let counts = overlap::count_guests(&mut store, year, per_hostel).await?;
            emit(json, &counts, report::build_overlap_report)?;
        }
        Commands::Analyze => {
            let mut store = PgGuestStore::new(pool.clone());
            let emails = analysis::load_emails(&mut store).await?;
            let analysis = analysis::analyze(&emails, &analysis::AnalysisOptions::default());
            let configured = PipelineConfig::from_env().fake_domains;
            emit(json, &analysis, |a| report::build_analysis_report(a, &configured))?;
        }
    }

    Ok(())
}
