//! Netsnap CLI binary.
//!
//! A thin wrapper around the library that handles command-line arguments,
//! credential/env file loading, logger initialization, and exit-code policy.
//! All core functionality lives in the library crate.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Parser, ValueEnum};
use log::{info, warn};

use netsnap::credentials::CredentialStore;
use netsnap::dispatch::{Dispatcher, SshSettings};
use netsnap::error::{Error, StorageError};
use netsnap::http::HttpFetcher;
use netsnap::report::{Context, HtmlReport, LogMailer, Mailer, ReportRenderer};
use netsnap::run::{RunLog, RunOptions, RunSummary, run_backup};
use netsnap::storage::BackupWriter;
use netsnap::transport::SshConnector;
use netsnap::vendor::VendorRegistry;

/// Configuration backup for multi-vendor network device fleets.
#[derive(Debug, Parser)]
#[command(name = "netsnap", version, about)]
struct Cli {
    /// Device inventory file (semicolon-delimited)
    #[arg(short = 'c', long)]
    inventory: PathBuf,

    /// Credential/env file (KEY=VALUE)
    #[arg(short = 'e', long)]
    env: PathBuf,

    /// Backup output directory
    #[arg(short = 'b', long)]
    backup_dir: PathBuf,

    /// Log output directory
    #[arg(short = 'l', long)]
    log_dir: PathBuf,

    /// Vendor profile overlay (TOML)
    #[arg(long)]
    vendors: Option<PathBuf>,

    /// Maximum devices in flight at once
    #[arg(long, default_value_t = 8)]
    max_concurrency: usize,

    /// Bound on total run wall-clock time, in seconds
    #[arg(long)]
    deadline_secs: Option<u64>,

    /// When the process exit code should report failure
    #[arg(long, value_enum, default_value = "never")]
    fail_on: FailOn,
}

/// Exit-code policy. Device failures are always recorded in the summary;
/// by default they do not flip the process exit status.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum FailOn {
    /// Exit nonzero only on fatal configuration errors.
    Never,
    /// Exit nonzero if any device failed or timed out.
    DeviceFailure,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("netsnap error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, Error> {
    let started_at = Utc::now();
    let stamp = started_at.format("%Y%m%d-%H%M%S");

    init_logger(&cli.log_dir, started_at)?;
    info!("Starting netsnap");
    info!("Inventory: {}", cli.inventory.display());
    info!("Backup dir: {}", cli.backup_dir.display());

    // Fatal when missing or unusable: no device is contacted without them.
    let store = Arc::new(CredentialStore::load(&cli.env)?);
    let credentials = store.shared_account()?;
    info!("Loaded credentials for organization '{}'", store.org());

    let mut registry = VendorRegistry::builtin();
    if let Some(path) = &cli.vendors {
        registry.load_overlay(path)?;
    }

    let inventory = netsnap::inventory::load(&cli.inventory).await?;
    if !inventory.errors.is_empty() {
        warn!(
            "{} inventory row(s) skipped as malformed",
            inventory.errors.len()
        );
    }
    info!("Loaded {} devices", inventory.devices.len());

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(registry),
        SshConnector,
        HttpFetcher::new(Duration::from_secs(60))?,
        BackupWriter::new(&cli.backup_dir, started_at),
        credentials,
        Arc::clone(&store),
        SshSettings::default(),
    ));

    let run_log_path = cli.log_dir.join(format!("{stamp}-run-log.jsonl"));
    let mut run_log = RunLog::create(&run_log_path).await?;

    let options = RunOptions {
        max_concurrency: cli.max_concurrency,
        deadline: cli.deadline_secs.map(Duration::from_secs),
    };
    let summary = run_backup(dispatcher, &inventory.devices, &options, Some(&mut run_log)).await;

    // Reporting and mail run strictly after backup work; their failures are
    // logged but never alter recorded outcomes or the exit policy below.
    deliver_report(&cli.log_dir, &stamp.to_string(), &store, &summary).await;

    println!(
        "Backed up {}/{} devices ({} failed, {} timed out) in {:.1}s",
        summary.succeeded,
        summary.total(),
        summary.failed,
        summary.timed_out,
        summary.elapsed.as_secs_f64()
    );
    println!("Artifacts in {}", cli.backup_dir.display());

    let ok = match cli.fail_on {
        FailOn::Never => true,
        FailOn::DeviceFailure => summary.all_succeeded(),
    };
    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

/// Log to `<log_dir>/<YYYYMMDD>-backup-log.txt`, appending across same-day
/// runs.
fn init_logger(log_dir: &Path, started_at: DateTime<Utc>) -> Result<(), Error> {
    std::fs::create_dir_all(log_dir).map_err(|source| StorageError::Write {
        path: log_dir.to_path_buf(),
        source,
    })?;
    let path = log_dir.join(format!("{}-backup-log.txt", started_at.format("%Y%m%d")));
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|source| StorageError::Write {
            path: path.clone(),
            source,
        })?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .init();
    Ok(())
}

/// Render the report, persist it next to the logs, and mail it when SMTP is
/// enabled.
async fn deliver_report(
    log_dir: &Path,
    stamp: &str,
    store: &CredentialStore,
    summary: &RunSummary,
) {
    let context = Context::from_summary(store.org(), summary);
    let body = match HtmlReport.render(&context) {
        Ok(body) => body,
        Err(e) => {
            warn!("Report rendering failed: {e}");
            return;
        }
    };

    let report_path = log_dir.join(format!("{stamp}-report.html"));
    if let Err(e) = std::fs::write(&report_path, &body) {
        warn!("Could not write report {}: {e}", report_path.display());
    } else {
        info!("Report written to {}", report_path.display());
    }

    match store.mail() {
        Ok(Some(settings)) => {
            let subject = format!("Netsnap report for {} at {}", context.org, context.date);
            if let Err(e) = LogMailer.send(&settings, &subject, &body).await {
                warn!("Report mail failed: {e}");
            }
        }
        Ok(None) => info!("SMTP disabled; report not mailed"),
        Err(e) => warn!("Mail settings unusable: {e}"),
    }
}
