//! Entry point: parse arguments, load the config document, build every
//! runtime object it describes, and run until interrupted (§3
//! "Process lifecycle"), grounded in `orchestrator/app.py::main`.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use edge_infer_orchestrator::actions::build_dispatchers;
use edge_infer_orchestrator::agents::build_agents;
use edge_infer_orchestrator::cli::Args;
use edge_infer_orchestrator::config::OrchestratorConfig;
use edge_infer_orchestrator::connectors::build_connectors;
use edge_infer_orchestrator::gateway::GatewayPool;
use edge_infer_orchestrator::pipeline::build_pipelines;
use edge_infer_orchestrator::plugins::PluginRegistry;
use edge_infer_orchestrator::scheduler::Scheduler;
use edge_infer_orchestrator::{logging, metrics};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = logging::init(args.verbose, args.log_file.as_deref());

    let config = OrchestratorConfig::load(&args.config)
        .with_context(|| format!("loading config {}", args.config.display()))?;

    let plugins = PluginRegistry::with_builtins();
    let agents = build_agents(&config.agents).context("building agents")?;
    let dispatchers = build_dispatchers(&config.actions).context("building dispatchers")?;
    let connectors = build_connectors(&config.connectors);
    let pipelines = build_pipelines(&config.pipelines, &plugins, &agents).context("resolving pipelines")?;

    let gateway = GatewayPool::new(config.gateway.host.clone(), config.gateway.port, config.gateway.pool_size);
    gateway.start().await.context("connecting to inference gateway")?;

    metrics::install(config.metrics_port).context("installing metrics exporter")?;
    info!(port = config.metrics_port, "metrics exporter listening");

    let mut scheduler = Scheduler::new(pipelines, gateway, dispatchers, agents);
    scheduler.start_agents().await;
    scheduler.start_connectors(connectors);
    scheduler.start_workers();

    wait_for_shutdown_signal().await;
    info!("shutdown signal received");
    scheduler.shutdown().await;

    Ok(())
}

/// Waits for either Ctrl-C or, on Unix, SIGTERM — whichever arrives
/// first triggers the same graceful shutdown path.
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
