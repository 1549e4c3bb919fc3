//! Binary entry point for the alert engine: loads configuration, builds
//! and starts the `Application`, and runs until a shutdown signal drains
//! every worker and flushes the journal.
//!
//! Exit codes: `0` normal, `1` unrecoverable configuration error.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use alertd::application::system::{Application, DEFAULT_SHUTDOWN_DEADLINE};
use alertd::infrastructure::config::Config;

#[cfg(feature = "read-api")]
use alertd::infrastructure::read_api;

#[derive(Parser)]
#[command(author, version, about = "Streaming alert engine", long_about = None)]
struct Cli {
    /// Seconds to wait for in-flight work to drain on shutdown.
    #[arg(long, default_value_t = DEFAULT_SHUTDOWN_DEADLINE.as_secs())]
    shutdown_deadline_secs: u64,

    /// Validate the environment and exit without connecting to anything.
    #[arg(long)]
    config_check: bool,

    /// Override JOURNAL_DIR for this run.
    #[arg(long)]
    journal_dir: Option<std::path::PathBuf>,
}

const CONFIGURATION_ERROR: u8 = 1;

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to build Tokio runtime");
            return ExitCode::from(CONFIGURATION_ERROR);
        }
    };

    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> ExitCode {
    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "configuration error at startup");
            return ExitCode::from(CONFIGURATION_ERROR);
        }
    };
    if let Some(dir) = cli.journal_dir.clone() {
        config.journal.dir = dir;
    }

    if cli.config_check {
        info!(
            upstream = %config.ingestion.upstream_ws_url,
            journal_dir = %config.journal.dir.display(),
            shards = config.cache.resolved_shard_count(),
            "configuration is valid"
        );
        return ExitCode::SUCCESS;
    }

    info!(
        upstream = %config.ingestion.upstream_ws_url,
        journal_dir = %config.journal.dir.display(),
        "alert engine starting"
    );

    let listen_addr = config.observability.listen_addr.clone();

    let app = match Application::build(config).await {
        Ok(app) => app,
        Err(e) => {
            error!(error = %e, "failed to build application");
            return ExitCode::from(CONFIGURATION_ERROR);
        }
    };

    let handle = match app.start().await {
        Ok(handle) => handle,
        Err(e) => {
            error!(error = %e, "failed to start application");
            return ExitCode::from(CONFIGURATION_ERROR);
        }
    };

    #[cfg(feature = "read-api")]
    if let Some(addr) = listen_addr {
        spawn_read_api(addr, handle.candles.clone(), handle.index.clone());
    }
    #[cfg(not(feature = "read-api"))]
    let _ = listen_addr;

    info!("alert engine running; awaiting shutdown signal");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }

    info!("shutdown signal received, draining workers");
    handle.shutdown(Duration::from_secs(cli.shutdown_deadline_secs)).await;
    ExitCode::SUCCESS
}

#[cfg(feature = "read-api")]
fn spawn_read_api(addr: String, candles: alertd::application::candle_store::CandleStore, index: alertd::application::alert_index::AlertIndex) {
    // LISTEN_ADDR defaults to ":5000" (Go-style, "all interfaces"); give
    // it an explicit host so `TcpListener::bind` accepts it.
    let addr = if addr.starts_with(':') { format!("0.0.0.0{addr}") } else { addr };
    tokio::spawn(async move {
        let router = read_api::router(candles, index);
        match tokio::net::TcpListener::bind(&addr).await {
            Ok(listener) => {
                info!(%addr, "read-only query surface listening");
                if let Err(e) = axum::serve(listener, router).await {
                    error!(error = %e, "read-only query surface stopped");
                }
            }
            Err(e) => error!(error = %e, %addr, "failed to bind read-only query surface"),
        }
    });
}
