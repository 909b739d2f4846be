//! pulsed: the Pulse daemon.
//!
//! Single binary that assembles the Pulse subsystems:
//! - Service registry (from pulse.toml)
//! - Time-series store
//! - Check runner + periodic scheduler
//! - Alert engine + notifiers
//! - REST API
//!
//! # Usage
//!
//! ```text
//! pulsed run --config /etc/pulse/pulse.toml --port 3000
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pulse_core::PulseConfig;
use pulse_core::config::{LogConfig, LogFormat};
use pulsed::Daemon;

#[derive(Parser)]
#[command(name = "pulsed", about = "Pulse health monitoring daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run checks, alerting, and the API server.
    Run {
        /// Path to pulse.toml. Defaults are used if it does not exist.
        #[arg(long, default_value = "pulse.toml")]
        config: PathBuf,

        /// Port to listen on (overrides `[server] port`).
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run { config, port } => {
            let (config, loaded) = load_config(&config)?;
            init_tracing(&config.log);
            if !loaded {
                warn!("config file not found, running with defaults");
            }
            run(config, port).await
        }
    }
}

fn load_config(path: &Path) -> anyhow::Result<(PulseConfig, bool)> {
    if path.exists() {
        Ok((PulseConfig::from_file(path)?, true))
    } else {
        Ok((PulseConfig::default(), false))
    }
}

fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    match log.format {
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
}

async fn run(config: PulseConfig, port: Option<u16>) -> anyhow::Result<()> {
    info!("Pulse daemon starting");

    let daemon = Daemon::build(&config)?;
    daemon.start_checks().await;

    let router = daemon.router();
    let addr = SocketAddr::from(([0, 0, 0, 0], port.unwrap_or(config.server.port)));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
        })
        .await?;

    daemon.shutdown().await;

    info!("Pulse daemon stopped");
    Ok(())
}
