//! assetswap - stage, promote and serve offline asset caches.
//!
//! Commands:
//!   assetswap update        stage the manifest and promote it if complete
//!   assetswap fetch <path>  run one request through the interceptor
//!   assetswap ls            list live entries and their age
//!   assetswap recover       clean up after an interrupted cycle

use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use assetswap_core::{
    AssetWorker, Config, FileStore, HttpFetcher, PromotionResult, ResponseSource,
};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Directory for rolling log files; logs go to stderr only when unset
const ENV_LOG_DIR: &str = "ASSETSWAP_LOG_DIR";

/// Log file name prefix inside the log directory
const LOG_FILE_PREFIX: &str = "assetswap.log";

const USAGE: &str = "usage: assetswap <update | fetch <path> | ls | recover>";

/// Initialize the tracing subscriber for logging
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(ENV_LOG_DIR) {
        Ok(dir) if !dir.is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let _log_guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &[String]) -> Result<ExitCode> {
    let command = args.first().map(String::as_str);
    if !matches!(command, Some("update" | "fetch" | "ls" | "recover")) {
        eprintln!("{}", USAGE);
        return Ok(ExitCode::from(2));
    }

    let worker = build_worker().await?;

    match command {
        Some("update") => update(&worker).await,
        Some("fetch") => {
            let path = args
                .get(1)
                .ok_or_else(|| anyhow::anyhow!("fetch needs a path\n{}", USAGE))?;
            fetch(&worker, path).await
        }
        Some("ls") => list(&worker).await,
        _ => recover(&worker).await,
    }
}

async fn build_worker() -> Result<AssetWorker> {
    let config = Config::load()?;
    let manifest = config.manifest()?;
    let fetcher = HttpFetcher::new(config.origin()?, config.request_timeout())?;

    let store_dir = config.store_dir()?;
    let store = FileStore::new(&store_dir)
        .await
        .with_context(|| format!("Failed to open store at {}", store_dir.display()))?;
    info!(store = %store_dir.display(), origin = %fetcher.origin(), "Store opened");

    Ok(AssetWorker::new(
        Arc::new(store),
        Arc::new(fetcher),
        manifest,
        config.worker_options(),
    ))
}

async fn update(worker: &AssetWorker) -> Result<ExitCode> {
    let report = worker.recover().await?;
    if !report.is_clean() {
        warn!(?report, "Recovered from an interrupted cycle before updating");
    }

    match worker.update().await {
        PromotionResult::Promoted { entries, .. } => {
            println!("promoted {} entries", entries);
            Ok(ExitCode::SUCCESS)
        }
        PromotionResult::RolledBack(reason) => {
            println!("rolled back: {}", reason);
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn fetch(worker: &AssetWorker, path: &str) -> Result<ExitCode> {
    let dispatched = worker.interceptor().dispatch(path).await;
    let intercepted = dispatched.response;

    // Let the live refresh land before the process exits
    if let Some(refresh) = dispatched.refresh {
        if let Err(e) = refresh.await {
            warn!(error = %e, "Live refresh task failed");
        }
    }

    let source = match intercepted.source {
        ResponseSource::Network => "network",
        ResponseSource::Cache => "cache",
        ResponseSource::Synthetic => "synthetic",
    };
    let response = intercepted.response;
    eprintln!("{} {} ({})", response.status, response.status_text, source);

    let mut stdout = io::stdout().lock();
    stdout.write_all(&response.body)?;
    stdout.flush()?;

    if response.status == 408 && intercepted.source == ResponseSource::Synthetic {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

async fn list(worker: &AssetWorker) -> Result<ExitCode> {
    let entries = worker.live().entries().await?;
    if entries.is_empty() {
        println!("(no live cache)");
        return Ok(ExitCode::SUCCESS);
    }

    let manifest = worker.manifest();
    for (key, entry) in &entries {
        let marker = if manifest.contains(key) { ' ' } else { '+' };
        println!(
            "{} {:<40} {:>4} {:>10} {}",
            marker,
            key,
            entry.status,
            entry.body.len(),
            entry.age_display()
        );
    }
    Ok(ExitCode::SUCCESS)
}

async fn recover(worker: &AssetWorker) -> Result<ExitCode> {
    let report = worker.recover().await?;
    println!(
        "staging discarded: {}, partial copy discarded: {}, swap completed: {}, \
         old version discarded: {}, old version restored: {}",
        report.staging_discarded,
        report.side_discarded,
        report.swap_completed,
        report.retired_discarded,
        report.retired_restored
    );
    Ok(ExitCode::SUCCESS)
}
