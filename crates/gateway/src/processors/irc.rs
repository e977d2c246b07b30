//! IRC processor. Unlike the webhook-fed channels this one maintains its
//! own client connections: one task per configured server, fixed-delay
//! reconnect on disconnect, PING answered with PONG. Only PRIVMSG and
//! NOTICE lines enter the classifier.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use aegis_domain::config::{IrcConfig, IrcServerConfig};
use aegis_domain::{ChannelKind, Error, InputEvent, Result};

use crate::classify::{ClassifierEngine, SourceTracker};
use crate::irc_wire::{self, parse_line};
use crate::processors::{parse_payload, sanitize, ChannelProcessor, LifecycleGate};
use crate::queue::IoQueue;

/// Webhook payload for IRC — the gateway also accepts pushed IRC
/// messages, which is what the flood tests drive.
#[derive(Debug, Deserialize)]
struct IrcPayload {
    /// `nick!user@host`
    source: String,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    message: String,
}

/// State shared between the processor facade and its connection tasks.
struct IrcCore {
    engine: ClassifierEngine,
    tracker: Arc<SourceTracker>,
    queue: Arc<IoQueue>,
    processed: AtomicU64,
    dropped: AtomicU64,
    connections: AtomicUsize,
    reconnect_delay: Duration,
}

impl IrcCore {
    fn build_event(&self, source: &str, target: Option<&str>, message: &str, server: Option<&str>) -> InputEvent {
        let content = sanitize(message);
        let mut classification = self.engine.classify_text(&content);
        let repeats = self.tracker.observe(source, &content);
        self.engine.apply_flood(&mut classification, repeats);
        let classification = self.engine.complete(classification);

        self.processed.fetch_add(1, Ordering::Relaxed);

        let priority = classification.threat_level as i32;
        let mut event = InputEvent::new(ChannelKind::Irc, source, content, classification)
            .with_metadata("channel", "irc")
            .with_priority(priority);
        if let Some(target) = target {
            event = event.with_metadata("target", target.to_string());
        }
        if let Some(server) = server {
            event = event.with_metadata("server", server.to_string());
        }
        event
    }

    fn enqueue(&self, event: InputEvent) {
        if let Err(e) = self.queue.inbound.enqueue(event) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(error = %e, "irc event dropped (queue saturated)");
        }
    }
}

pub struct IrcProcessor {
    config: IrcConfig,
    gate: LifecycleGate,
    core: Arc<IrcCore>,
    sweep_interval: Duration,
}

impl IrcProcessor {
    pub fn new(config: IrcConfig, queue: Arc<IoQueue>, sweep_interval: Duration) -> Self {
        let core = Arc::new(IrcCore {
            engine: ClassifierEngine::for_kind(ChannelKind::Irc),
            tracker: Arc::new(SourceTracker::new(16, Duration::from_secs(300))),
            queue,
            processed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            connections: AtomicUsize::new(0),
            reconnect_delay: Duration::from_secs(config.reconnect_delay_secs.max(1)),
        });
        Self {
            config,
            gate: LifecycleGate::new(),
            core,
            sweep_interval,
        }
    }

    /// One connection lifecycle per server: connect → register → read
    /// loop; on any failure, wait the fixed delay and redial.
    async fn run_connection(core: Arc<IrcCore>, server: IrcServerConfig, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                return;
            }

            match irc_wire::connect(&server).await {
                Ok(stream) => {
                    core.connections.fetch_add(1, Ordering::Relaxed);
                    tracing::info!(server = %server.host, port = server.port, tls = server.tls, "irc connected");
                    let result = Self::session(&core, stream, &server, &cancel).await;
                    core.connections.fetch_sub(1, Ordering::Relaxed);
                    match result {
                        Ok(()) => return, // cancelled
                        Err(e) => {
                            tracing::warn!(server = %server.host, error = %e, "irc connection lost")
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(server = %server.host, error = %e, "irc connect failed")
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(core.reconnect_delay) => {}
                _ = cancel.cancelled() => return,
            }
        }
    }

    async fn session(
        core: &Arc<IrcCore>,
        stream: Box<dyn irc_wire::IrcStream>,
        server: &IrcServerConfig,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let (read_half, mut write_half) = tokio::io::split(stream);
        irc_wire::register(&mut write_half, server).await?;

        let mut lines = BufReader::new(read_half).lines();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                next = lines.next_line() => {
                    let raw = next
                        .map_err(|e| Error::Transport(format!("irc read: {e}")))?
                        .ok_or_else(|| Error::Transport("irc connection closed by peer".into()))?;
                    let Some(line) = parse_line(&raw) else { continue };

                    match line.command.as_str() {
                        "PING" => {
                            let token = line.trailing.clone().unwrap_or_default();
                            irc_wire::write_line(&mut write_half, &format!("PONG :{token}")).await?;
                        }
                        "PRIVMSG" | "NOTICE" => {
                            // Lines without a user prefix (server notices) are not
                            // sender-attributable and are skipped.
                            if let Some(source) = line.source() {
                                let target = line.params.first().map(String::as_str);
                                let content = line.trailing.clone().unwrap_or_default();
                                let event = core.build_event(source, target, &content, Some(&server.host));
                                core.enqueue(event);
                            }
                        }
                        _ => {}
                    }
                }
            }
        }
    }
}

#[async_trait]
impl ChannelProcessor for IrcProcessor {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Irc
    }

    fn enabled(&self) -> bool {
        self.config.enabled
    }

    async fn start(&self, cancel: CancellationToken) -> Result<()> {
        let child = self.gate.start(&cancel)?;
        tokio::spawn(
            self.core
                .tracker
                .clone()
                .run_sweeper(self.sweep_interval, child.clone()),
        );
        for server in self.config.servers.clone() {
            tokio::spawn(Self::run_connection(self.core.clone(), server, child.clone()));
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.gate.stop()
    }

    fn process(&self, payload: &serde_json::Value) -> Result<InputEvent> {
        let payload: IrcPayload = parse_payload(ChannelKind::Irc, payload)?;
        Ok(self.core.build_event(
            &payload.source,
            payload.target.as_deref(),
            &payload.message,
            None,
        ))
    }

    fn stats(&self) -> serde_json::Value {
        serde_json::json!({
            "state": self.gate.state().to_string(),
            "processed": self.core.processed.load(Ordering::Relaxed),
            "dropped": self.core.dropped.load(Ordering::Relaxed),
            "connections": self.core.connections.load(Ordering::Relaxed),
            "servers": self.config.servers.len(),
            "tracked_sources": self.core.tracker.tracked_sources(),
        })
    }
}
