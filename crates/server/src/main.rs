// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use claudeman::config::Config;
use claudeman::store::Store;
use claudeman::supervisor::{Supervisor, SupervisorConfig};
use claudeman::window::{ScreenTool, WindowTool};

fn init_tracing(config: &Config) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    if config.log_format == "json" {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let state_dir = config.state_dir();
    let store = Store::open(&state_dir)?;
    let tool = Arc::new(ScreenTool::new(state_dir.join("capture")));
    if !tool.available().await {
        // Degraded: sessions cannot be created, but the registry and API
        // surface stay up so existing state remains observable.
        error!("screen binary not found; window management is unavailable");
    }

    let supervisor =
        Supervisor::new(SupervisorConfig::from_config(&config), tool, store);

    // Settle liveness and adopt orphans from prior runs.
    match supervisor.reconcile().await {
        Ok(report) => info!(
            died = report.died.len(),
            discovered = report.discovered.len(),
            "startup reconcile complete"
        ),
        Err(e) => error!("startup reconcile failed: {e}"),
    }

    let shutdown = CancellationToken::new();
    supervisor.spawn_reconcile_loop(config.reconcile_interval(), shutdown.clone());
    supervisor.spawn_stats_loop(config.stats_interval(), shutdown.clone());

    info!(sessions = supervisor.sessions().len(), "claudeman running");
    tokio::signal::ctrl_c().await?;

    // Detached windows survive on purpose; only our tasks wind down.
    info!("shutting down (windows stay alive)");
    shutdown.cancel();
    Ok(())
}

#[tokio::main]
async fn main() {
    let config = Config::parse();
    if let Err(e) = config.validate() {
        eprintln!("error: {e}");
        std::process::exit(2);
    }
    init_tracing(&config);

    if let Err(e) = run(config).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
