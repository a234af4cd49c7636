use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lan_sweep_rs::scanner::{
    ScanSettings, Scanner, DEFAULT_CONCURRENCY, DEFAULT_RANGE, DEFAULT_TIMEOUT_MS,
};
use lan_sweep_rs::scheduler::AutoScanner;
use lan_sweep_rs::server;
use lan_sweep_rs::store::JsonFileStore;

/// lan-sweep-rs — IPv4 liveness sweeper with periodic auto-scan and a small JSON dashboard API.
#[derive(Debug, Clone, Parser)]
#[command(name = "lan-sweep-rs", version, about, long_about = None)]
struct Cli {
    /// Address to bind the HTTP server to.
    #[arg(long, env = "BIND", default_value = "0.0.0.0:8000")]
    bind: String,

    /// Directory holding config.json and results.json.
    #[arg(long = "data-dir", env = "DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Directory of static dashboard files served at `/`.
    #[arg(long = "static-dir", env = "STATIC_DIR", default_value = "static")]
    static_dir: PathBuf,

    /// Per-probe timeout in milliseconds (floor 50).
    #[arg(long = "timeout-ms", env = "TIMEOUT_MS", default_value_t = DEFAULT_TIMEOUT_MS)]
    timeout_ms: u64,

    /// Max probes in flight (floor 1).
    #[arg(long, env = "CONCURRENCY", default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Range used when no valid config has been stored yet.
    #[arg(long = "default-range", env = "DEFAULT_RANGE", default_value = DEFAULT_RANGE)]
    default_range: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = ScanSettings::new(cli.timeout_ms, cli.concurrency, cli.default_range.clone());
    let store = JsonFileStore::open(&cli.data_dir)
        .with_context(|| format!("cannot use data dir {}", cli.data_dir.display()))?;
    let scanner = Arc::new(Scanner::new(settings, Arc::new(store)));

    info!(
        bind = %cli.bind,
        data_dir = %cli.data_dir.display(),
        timeout_ms = scanner.settings().timeout.as_millis() as u64,
        concurrency = scanner.settings().concurrency,
        "starting lan-sweep-rs"
    );
    let cfg = scanner.config().await;
    info!(
        ip_range = %cfg.ip_range,
        auto_scan_enabled = cfg.auto_scan_enabled,
        interval_secs = cfg.auto_scan_interval_seconds,
        "loaded config"
    );

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        info!("shutting down");
        ctrl_c.cancel();
    });

    let auto = tokio::spawn(AutoScanner::new(scanner.clone()).run(shutdown.clone()));

    server::serve(&cli.bind, scanner, cli.static_dir, shutdown.clone()).await?;
    shutdown.cancel();
    let _ = auto.await;
    Ok(())
}
