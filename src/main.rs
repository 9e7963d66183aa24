//! failover-pool
//!
//! Loads a host list, builds an HTTP connection pool over it and either
//! checks every host once (`check`) or keeps the monitor running (`run`).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use failover_pool::config::{load_config, FailoverConfig};
use failover_pool::observability::{logging, metrics};
use failover_pool::{ConnectionPool, HttpTransport};

#[derive(Parser)]
#[command(name = "failover-pool")]
#[command(about = "Failover connection pool over a set of HTTP hosts", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, default_value = "failover.toml")]
    config: PathBuf,

    /// Overrides the configured log level
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check every host once and print the pool state
    Check,
    /// Keep monitoring hosts until Ctrl-C
    Run {
        /// Seconds between state reports
        #[arg(long, default_value_t = 10)]
        report_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    let level = cli
        .log_level
        .as_deref()
        .unwrap_or(&config.observability.log_level);
    logging::init_logging(level);

    tracing::info!(
        config = %cli.config.display(),
        hosts = config.hosts.len(),
        max_check_delay_ms = config.pool.max_check_delay_ms,
        monitor_pause_ms = config.pool.monitor_pause_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let pool = Arc::new(build_pool(&config)?);

    match cli.command {
        Commands::Check => check(&pool).await?,
        Commands::Run { report_secs } => run(&pool, Duration::from_secs(report_secs.max(1))).await?,
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

fn build_pool(config: &FailoverConfig) -> Result<ConnectionPool<HttpTransport>, failover_pool::PoolError> {
    let transport = HttpTransport::new(config.probe.clone());
    ConnectionPool::from_config(transport, config)
}

async fn check(pool: &Arc<ConnectionPool<HttpTransport>>) -> Result<(), Box<dyn std::error::Error>> {
    for check in pool.monitor_once().await? {
        tracing::info!(host = %check.address, result = ?check.result, "Host checked");
    }
    println!("{}", serde_json::to_string_pretty(&pool.snapshot())?);
    pool.shutdown();
    Ok(())
}

async fn run(
    pool: &Arc<ConnectionPool<HttpTransport>>,
    report_every: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut monitor = pool.spawn_monitor();
    let mut report = tokio::time::interval(report_every);

    loop {
        tokio::select! {
            _ = report.tick() => {
                let snapshot = pool.snapshot();
                let down = snapshot.hosts.iter().filter(|h| h.down).count();
                let state = serde_json::to_string(&snapshot)?;
                tracing::info!(
                    hosts = snapshot.hosts.len(),
                    down,
                    open_connections = pool.transport().open_connections(),
                    %state,
                    "Pool state"
                );
            }
            result = &mut monitor => {
                pool.shutdown();
                result??;
                return Ok(());
            }
            result = tokio::signal::ctrl_c() => {
                result?;
                tracing::info!("Received Ctrl-C, shutting down");
                break;
            }
        }
    }

    pool.shutdown();
    monitor.await??;
    Ok(())
}
