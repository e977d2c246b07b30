use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use aegis_controller::engine::CognitiveEngine;
use aegis_controller::loops;
use aegis_controller::service::ControllerService;
use aegis_domain::config::{Config, ConfigSeverity};
use aegis_domain::ServiceRecord;
use aegis_lifecycle::Lifecycle;
use aegis_protocol::CognitiveControllerServer;

#[derive(Parser)]
#[command(name = "aegis-controllerd", about = "Aegis cognitive controller")]
struct Cli {
    /// Optional TOML config file; environment variables override it.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;

    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!("config validation failed");
    }

    // ── Engine + background loops ────────────────────────────────────
    let engine = Arc::new(CognitiveEngine::new(config.controller.clone()));
    let cancel = CancellationToken::new();
    loops::spawn_all(engine.clone(), cancel.clone());
    tracing::info!(
        max_patterns = config.controller.max_patterns,
        max_insights = config.controller.max_insights,
        max_reflections = config.controller.max_reflections,
        "cognitive engine ready"
    );

    // ── Self-registration ────────────────────────────────────────────
    let record = ServiceRecord::new(
        format!("controller-{}", uuid_suffix()),
        "aegis-controller",
        config.controller.host.clone(),
        config.controller.grpc_port,
    );
    let lifecycle = Arc::new(
        Lifecycle::new(config.lifecycle.clone(), record, cancel.clone())
            .context("building lifecycle handle")?,
    );
    lifecycle.start().await;

    // ── gRPC surface ─────────────────────────────────────────────────
    let addr = format!("{}:{}", config.controller.host, config.controller.grpc_port)
        .parse()
        .context("parsing bind address")?;
    tracing::info!(addr = %addr, "aegis controller listening");

    let shutdown = {
        let lifecycle = lifecycle.clone();
        async move {
            wait_for_signal().await;
            tracing::info!("shutdown signal received");
            lifecycle.shutdown().await;
        }
    };

    tonic::transport::Server::builder()
        .add_service(CognitiveControllerServer::new(ControllerService::new(engine)))
        .serve_with_shutdown(addr, shutdown)
        .await
        .context("grpc server error")?;

    Ok(())
}

/// Structured JSON tracing, same shape as the other Aegis services.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,aegis_controller=debug")),
        )
        .json()
        .init();
}

fn uuid_suffix() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("installing SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
