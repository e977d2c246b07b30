//! HTTP relay sender for the webhook-style channels (SMS, Discord,
//! email). Outbound commands are POSTed to the configured relay
//! endpoint — the external gateway owns the final delivery hop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use aegis_domain::config::ChannelConfig;
use aegis_domain::{ChannelKind, Error, OutputCommand, Result};

use crate::processors::LifecycleGate;
use crate::senders::{limiter, ChannelSender, Limiter};

const RELAY_TIMEOUT: Duration = Duration::from_secs(10);

pub struct RelaySender {
    kind: ChannelKind,
    config: ChannelConfig,
    gate: LifecycleGate,
    http: reqwest::Client,
    limiter: Limiter,
    sent: AtomicU64,
    failures: AtomicU64,
}

impl RelaySender {
    pub fn new(kind: ChannelKind, config: ChannelConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(RELAY_TIMEOUT)
            .build()
            .unwrap_or_default();
        let limiter = limiter(config.rate_per_sec, config.burst);
        Self {
            kind,
            config,
            gate: LifecycleGate::new(),
            http,
            limiter,
            sent: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl ChannelSender for RelaySender {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    fn enabled(&self) -> bool {
        self.config.enabled && self.config.relay_url.is_some()
    }

    async fn start(&self, cancel: CancellationToken) -> Result<()> {
        self.gate.start(&cancel)?;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.gate.stop()
    }

    async fn send(&self, command: &OutputCommand) -> Result<()> {
        if !self.gate.is_running() {
            return Err(Error::Internal(format!("{} sender not running", self.kind)));
        }
        let url = self
            .config
            .relay_url
            .as_ref()
            .ok_or_else(|| Error::Internal(format!("{} sender has no relay_url", self.kind)))?;

        self.limiter.until_ready().await;

        let payload = serde_json::json!({
            "id": command.id,
            "kind": command.kind,
            "target": command.target,
            "content": command.content,
            "metadata": command.metadata,
            "priority": command.priority,
            "created_at": command.created_at,
        });

        let response = self.http.post(url).json(&payload).send().await.map_err(|e| {
            self.failures.fetch_add(1, Ordering::Relaxed);
            Error::Transport(format!("{} relay: {e}", self.kind))
        })?;

        let status = response.status();
        if status.is_success() {
            self.sent.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }

        self.failures.fetch_add(1, Ordering::Relaxed);
        if status.is_server_error() || status.as_u16() == 429 {
            Err(Error::Transport(format!("{} relay HTTP {status}", self.kind)))
        } else {
            Err(Error::Internal(format!("{} relay rejected: HTTP {status}", self.kind)))
        }
    }

    fn stats(&self) -> serde_json::Value {
        serde_json::json!({
            "state": self.gate.state().to_string(),
            "sent": self.sent.load(Ordering::Relaxed),
            "failures": self.failures.load(Ordering::Relaxed),
            "relay_configured": self.config.relay_url.is_some(),
        })
    }
}
