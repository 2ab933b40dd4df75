//! Command implementations for the CLI
//!
//! Each handler takes its parsed arguments plus the loaded configuration,
//! applies the command-line overrides and drives the library.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::args::{ConfigAction, ConfigArgs, DownloadArgs, GlobalArgs, RetryArgs, StatusArgs};
use super::progress::DownloadProgress;
use crate::app::ledger::read_ledger_file;
use crate::app::{
    build_notifier, load_jobs, notify, run_batch, DownloadExecutor, FailureLedger, HttpFetcher,
    LedgerContents, ReconcileReport, RetryReconciler,
};
use crate::config::AppConfig;
use crate::errors::{AppError, Result};

/// Handle the download command
///
/// Runs the bulk pass over the job list, then a retry pass when failures
/// were recorded and retries are enabled.
pub async fn handle_download(
    args: DownloadArgs,
    mut config: AppConfig,
    global: &GlobalArgs,
) -> Result<()> {
    let start_time = Instant::now();
    args.validate().map_err(AppError::generic)?;

    if let Some(workers) = args.workers {
        config.download.worker_count = workers;
    }
    if let Some(max_retry) = args.max_retry {
        config.retry.max_retry = max_retry;
    }
    config.validate()?;

    let jobs = load_jobs(&args.jobs).await?;
    if jobs.is_empty() {
        warn!("Job list {} is empty", args.jobs.display());
        if !global.quiet {
            println!("No jobs found in {}", args.jobs.display());
        }
        return Ok(());
    }
    info!("Loaded {} jobs from {}", jobs.len(), args.jobs.display());

    let executor = build_executor(&config).await?;

    let mut progress = DownloadProgress::new(jobs.len(), !global.quiet);
    let summary = run_batch(
        Arc::clone(&executor),
        jobs,
        config.download.worker_count,
        |job, result| progress.record(job, result),
    )
    .await;
    progress.finish();

    let message = format!(
        "Bulk download finished in {:.1}s: {} downloaded ({}), {} already present, {} failed",
        start_time.elapsed().as_secs_f64(),
        summary.downloaded,
        format_bytes(summary.bytes),
        summary.skipped,
        summary.failed
    );
    if !global.quiet {
        println!("{}", message);
    }
    notify(executor.notifier().as_ref(), &message).await;

    let retry_enabled = config.download.auto_retry && !args.no_retry;
    if retry_enabled && executor.ledger().has_pending_entries().await? {
        let report = run_retry_pass(executor, &config).await?;
        print_report(&report, &config.ledger.path, global.quiet);
    } else if summary.failed > 0 {
        info!(
            "{} failures recorded in {}",
            summary.failed,
            config.ledger.path.display()
        );
    }

    Ok(())
}

/// Handle the retry command
pub async fn handle_retry(args: RetryArgs, mut config: AppConfig, global: &GlobalArgs) -> Result<()> {
    args.validate().map_err(AppError::generic)?;
    if let Some(max_retry) = args.max_retry {
        config.retry.max_retry = max_retry;
    }
    config.validate()?;

    let executor = build_executor(&config).await?;
    if !executor.ledger().has_pending_entries().await? {
        info!("Ledger {} is empty", config.ledger.path.display());
        if !global.quiet {
            println!("No failed downloads recorded");
        }
        return Ok(());
    }

    let report = run_retry_pass(executor, &config).await?;
    print_report(&report, &config.ledger.path, global.quiet);
    Ok(())
}

/// Handle the status command
///
/// Reads the ledger without opening it for writing, so a missing ledger is
/// reported as empty rather than created.
pub async fn handle_status(args: StatusArgs, config: AppConfig) -> Result<()> {
    let path = config.ledger.path.as_path();
    let contents = if tokio::fs::try_exists(path).await? {
        read_ledger_file(path).await?
    } else {
        debug!("Ledger {} does not exist yet", path.display());
        LedgerContents::default()
    };

    if args.json {
        let malformed: Vec<_> = contents
            .malformed
            .iter()
            .map(|line| {
                serde_json::json!({
                    "line": line.line_no,
                    "content": line.content,
                    "reason": line.reason,
                })
            })
            .collect();
        let output = serde_json::json!({
            "ledger": path.display().to_string(),
            "entries": contents.entries,
            "malformed": malformed,
        });
        let rendered = serde_json::to_string_pretty(&output)
            .map_err(|e| AppError::generic(format!("Failed to render status: {}", e)))?;
        println!("{}", rendered);
        return Ok(());
    }

    println!("Ledger: {}", path.display());
    if contents.is_empty() {
        println!("No failed downloads recorded");
        return Ok(());
    }

    println!("{} failed downloads:", contents.entries.len());
    for entry in &contents.entries {
        println!(
            "  {}  {}  <- {}",
            entry.timestamp(),
            entry.store_path().display(),
            entry.source_url()
        );
    }
    if !contents.malformed.is_empty() {
        println!("{} malformed lines:", contents.malformed.len());
        for line in &contents.malformed {
            println!("  line {}: {} ({})", line.line_no, line.content, line.reason);
        }
    }
    Ok(())
}

/// Handle the config command
pub async fn handle_config(args: ConfigArgs, config: AppConfig, global: &GlobalArgs) -> Result<()> {
    match args.action {
        ConfigAction::Init { force } => {
            let path = match &global.config {
                Some(path) => path.clone(),
                None => AppConfig::default_config_path().ok_or_else(|| {
                    AppError::generic("Could not determine the user configuration directory")
                })?,
            };
            AppConfig::write_default(&path, force).await?;
            println!("Wrote default configuration to {}", path.display());
        }
        ConfigAction::Show => {
            print!("{}", config.to_toml());
        }
    }
    Ok(())
}

/// Wire the ledger, fetcher, validator and notifier into one executor
async fn build_executor(config: &AppConfig) -> Result<Arc<DownloadExecutor>> {
    let ledger = Arc::new(FailureLedger::open(&config.ledger.path).await?);
    let fetcher = Arc::new(HttpFetcher::new(&config.client_config())?);
    let webhook = Some(config.notifier.webhook_url.as_str());
    let notifier = build_notifier(
        webhook,
        &config.notifier.username,
        Duration::from_secs(config.notifier.timeout_secs),
    );

    debug!("Executor ready with ledger {}", ledger.path().display());

    Ok(Arc::new(DownloadExecutor::new(
        fetcher,
        config.validator(),
        ledger,
        notifier,
    )))
}

async fn run_retry_pass(
    executor: Arc<DownloadExecutor>,
    config: &AppConfig,
) -> Result<ReconcileReport> {
    let reconciler = RetryReconciler::new(executor, config.reconciler_config());
    Ok(reconciler.reconcile().await?)
}

fn print_report(report: &ReconcileReport, ledger: &Path, quiet: bool) {
    if quiet {
        return;
    }
    println!("{}", report.summary());
    if report.still_failing > 0 || report.malformed > 0 {
        println!("Remaining failures are listed in {}", ledger.display());
    }
}

/// Format bytes in human-readable form
fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
