use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

mod config;

use config::Config;
use relaymon_store::PgStore;

/// Relaymon - log-driven connection accounting for proxy servers
#[derive(Parser, Debug)]
#[command(name = "relaymon")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log file to tail when journald is unavailable (overrides config)
    #[arg(long, value_name = "PATH")]
    log_path: Option<PathBuf>,

    /// systemd unit whose journal is tailed (overrides config)
    #[arg(long, value_name = "UNIT")]
    journal_unit: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = run_app(args).await;

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

async fn run_app(args: Args) -> Result<()> {
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(log_path) = args.log_path {
        config.monitor.log_path = log_path;
    }
    if let Some(unit) = args.journal_unit {
        config.monitor.journal_unit = unit;
    }

    // Reaching the store at startup is the one fatal requirement; from
    // here on every failure degrades instead of exiting.
    let store = PgStore::connect(&config.db_settings())
        .await
        .context("Failed to connect to the database")?;
    store
        .ping()
        .await
        .context("Database connectivity probe failed")?;
    store
        .init_schema()
        .await
        .context("Failed to initialize database schema")?;
    info!(
        host = %config.database.host,
        database = %config.database.database,
        "database connection established"
    );

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    relaymon_monitor::run(config.monitor_settings(), Arc::new(store), cancel).await;
    info!("shutdown complete");
    Ok(())
}

/// Cancel the token on SIGINT or, on unix, SIGTERM.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }

    info!("shutdown signal received");
    cancel.cancel();
}
