use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use aegis_domain::config::{Config, ConfigSeverity};
use aegis_domain::{ChannelKind, ServiceRecord};
use aegis_gateway::api;
use aegis_gateway::bridge::ControllerBridge;
use aegis_gateway::dispatch::run_dispatcher;
use aegis_gateway::metrics::GatewayMetrics;
use aegis_gateway::processors::{
    discord::DiscordProcessor, email::EmailProcessor, irc::IrcProcessor, sms::SmsProcessor,
    voice::VoiceProcessor, ChannelProcessor, ProcessorSet,
};
use aegis_gateway::queue::{BoundedQueue, IoQueue};
use aegis_gateway::senders::{irc::IrcSender, relay::RelaySender, ChannelSender, SenderSet};
use aegis_gateway::state::AppState;
use aegis_lifecycle::Lifecycle;

#[derive(Parser)]
#[command(name = "aegis-gatewayd", about = "Aegis I/O plane gateway")]
struct Cli {
    /// Optional TOML config file; environment variables override it.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = Arc::new(Config::load(cli.config.as_deref()).context("loading configuration")?);

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

    // ── Queues ───────────────────────────────────────────────────────
    let queue = Arc::new(IoQueue::new(config.gateway.queue_capacity));
    let reports = Arc::new(BoundedQueue::new("reports", config.gateway.queue_capacity));
    let metrics = Arc::new(GatewayMetrics::new());
    tracing::info!(capacity = config.gateway.queue_capacity, "io queues ready");

    // ── Processors ───────────────────────────────────────────────────
    let sweep = Duration::from_secs(config.gateway.tracker_sweep_secs);
    let processors: Vec<Arc<dyn ChannelProcessor>> = vec![
        Arc::new(SmsProcessor::new(config.channels.sms.clone(), sweep)),
        Arc::new(VoiceProcessor::new(config.channels.voice.clone(), sweep)),
        Arc::new(DiscordProcessor::new(config.channels.discord.clone(), sweep)),
        Arc::new(EmailProcessor::new(config.channels.email.clone(), sweep)),
        Arc::new(IrcProcessor::new(
            config.channels.irc.clone(),
            queue.clone(),
            sweep,
        )),
    ];
    let processors = Arc::new(ProcessorSet::new(processors));

    // ── Senders ──────────────────────────────────────────────────────
    let senders: Vec<Arc<dyn ChannelSender>> = vec![
        Arc::new(RelaySender::new(ChannelKind::Sms, config.channels.sms.clone())),
        Arc::new(RelaySender::new(
            ChannelKind::Discord,
            config.channels.discord.clone(),
        )),
        Arc::new(RelaySender::new(
            ChannelKind::Email,
            config.channels.email.clone(),
        )),
        Arc::new(IrcSender::new(config.channels.irc.clone())),
    ];
    let senders = Arc::new(SenderSet::new(senders));

    // ── Lifecycle + cancellation root ────────────────────────────────
    let cancel = CancellationToken::new();
    let record = ServiceRecord::new(
        format!("gateway-{}", uuid_suffix()),
        "aegis-gateway",
        config.gateway.host.clone(),
        config.gateway.http_port,
    );
    let lifecycle = Arc::new(
        Lifecycle::new(config.lifecycle.clone(), record, cancel.clone())
            .context("building lifecycle handle")?,
    );
    lifecycle.start().await;

    // ── Start the plane ──────────────────────────────────────────────
    processors.start_all(&cancel).await;
    senders.start_all(&cancel).await;

    let bridge = Arc::new(ControllerBridge::new(
        config.gateway.controller_url.clone(),
        Duration::from_secs(config.gateway.send_deadline_secs),
        queue.clone(),
        reports.clone(),
        metrics.clone(),
    ));
    tokio::spawn(bridge.run(cancel.clone()));
    tracing::info!(controller = %config.gateway.controller_url, "controller bridge started");

    tokio::spawn(run_dispatcher(
        queue.clone(),
        senders.clone(),
        reports.clone(),
        metrics.clone(),
        cancel.clone(),
    ));
    tracing::info!("outbound dispatcher started");

    // ── HTTP surface ─────────────────────────────────────────────────
    let state = AppState {
        config: config.clone(),
        queue,
        reports,
        processors: processors.clone(),
        senders: senders.clone(),
        metrics,
    };
    let app = api::router()
        .layer(tower::limit::ConcurrencyLimitLayer::new(
            config.gateway.max_concurrent_requests,
        ))
        .with_state(state);

    let addr = format!("{}:{}", config.gateway.host, config.gateway.http_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    tracing::info!(addr = %addr, "aegis gateway listening");

    let grace = Duration::from_secs(config.gateway.shutdown_grace_secs);
    let shutdown = {
        let lifecycle = lifecycle.clone();
        let processors = processors.clone();
        let senders = senders.clone();
        async move {
            wait_for_signal().await;
            tracing::info!("shutdown signal received");
            // Deregister first so readers see us disappear while the
            // ports are still open, then tear local work down.
            lifecycle.shutdown().await;
            processors.stop_all().await;
            senders.stop_all().await;
            tokio::time::sleep(grace.min(Duration::from_secs(1))).await;
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
                .unwrap_or_else(|_| EnvFilter::new("info,aegis_gateway=debug")),
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
