use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use aegis_domain::config::{Config, ConfigSeverity, StorageBackend};
use aegis_domain::ServiceRecord;
use aegis_lifecycle::Lifecycle;
use aegis_registry::metrics::RegistryMetrics;
use aegis_registry::state::AppState;
use aegis_registry::storage::{FileStorage, MemoryStorage, RedisStorage, Storage};
use aegis_registry::{api, Registry};

#[derive(Parser)]
#[command(name = "aegis-registryd", about = "Aegis service registry")]
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

    // ── Storage backend ──────────────────────────────────────────────
    let storage: Arc<dyn Storage> = match config.storage.backend {
        StorageBackend::Redis => Arc::new(
            RedisStorage::connect(&config.storage)
                .await
                .context("connecting redis storage")?,
        ),
        StorageBackend::File => {
            Arc::new(FileStorage::open(&config.storage.data_dir).context("opening file storage")?)
        }
        StorageBackend::Memory => {
            tracing::warn!("memory storage selected — records do not survive restart");
            Arc::new(MemoryStorage::new())
        }
    };

    // ── Registry core ────────────────────────────────────────────────
    let metrics = Arc::new(RegistryMetrics::new());
    let registry = Registry::start(storage, config.registry.clone(), metrics.clone())
        .await
        .context("seeding registry from storage")?;

    // ── Health reaper ────────────────────────────────────────────────
    let cancel = CancellationToken::new();
    tokio::spawn(registry.clone().run_reaper(cancel.clone()));
    tracing::info!(
        interval_secs = config.registry.reaper_interval_secs,
        deadline_secs = config.registry.staleness_deadline_secs,
        "health reaper started"
    );

    // ── Self-registration ────────────────────────────────────────────
    let record = ServiceRecord::new(
        format!("registry-{}", uuid_suffix()),
        "aegis-registry",
        config.registry.host.clone(),
        config.registry.port,
    );
    let lifecycle = Arc::new(
        Lifecycle::new(config.lifecycle.clone(), record, cancel.clone())
            .context("building lifecycle handle")?,
    );
    lifecycle.start().await;

    // ── HTTP surface ─────────────────────────────────────────────────
    let state = AppState {
        registry: registry.clone(),
        metrics,
    };
    let app = api::router().with_state(state);

    let addr = format!("{}:{}", config.registry.host, config.registry.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    tracing::info!(addr = %addr, "aegis registry listening");

    let shutdown = {
        let lifecycle = lifecycle.clone();
        let cancel = cancel.clone();
        async move {
            wait_for_signal().await;
            tracing::info!("shutdown signal received");
            // Deregister before tearing local work down.
            lifecycle.shutdown().await;
            cancel.cancel();
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("axum server error")?;

    Ok(())
}

/// Structured JSON tracing, same shape as the other Aegis services.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,aegis_registry=debug")),
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
