//! solverd - HTTP surface for the deterministic solver.
//!
//! Serves `/healthz`, `/metrics` (Prometheus text format), and the
//! discovery document at `/.well-known/agent-card.json`. The deterministic
//! pipeline itself is exercised through `solverctl`; this process only
//! exposes observability and discovery.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use prometheus::Registry;
use solver_core::metrics::SolverMetrics;
use solver_core::store::ArtifactStore;
use solver_core::SolverConfig;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod agent_card;
mod server;

/// solverd - solver HTTP surface
#[derive(Parser, Debug)]
#[command(name = "solverd")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Optional TOML config file merged over the environment
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: String,

    /// Log level filter (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = SolverConfig::load(cli.config.as_deref()).context("loading configuration")?;
    config.check().context("validating configuration")?;

    // Startup hygiene: sweep temp files orphaned by crashed writers.
    let store = ArtifactStore::new(&config.evidence_dir, config.fsync);
    let reaped = store
        .reap_orphan_temps(std::time::Duration::from_secs(3600))
        .context("reaping orphan temp files")?;
    if reaped > 0 {
        info!(reaped, "removed orphan temp files at startup");
    }

    let registry = Registry::new();
    SolverMetrics::register(&registry).context("registering metrics")?;

    let state = Arc::new(server::AppState {
        registry,
        agent_card: agent_card::render(&config),
    });

    let listener = tokio::net::TcpListener::bind(&cli.listen)
        .await
        .with_context(|| format!("binding {}", cli.listen))?;
    info!(listen = %cli.listen, "solverd listening");

    axum::serve(listener, server::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
    }
}
