//! Discord processor. Messages arrive over the webhook surface with
//! guild/channel/user scoping in the payload.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use aegis_domain::config::ChannelConfig;
use aegis_domain::{ChannelKind, InputEvent, Result};

use crate::classify::{ClassifierEngine, SourceTracker};
use crate::processors::{parse_payload, sanitize, ChannelProcessor, LifecycleGate};

#[derive(Debug, Deserialize)]
struct DiscordPayload {
    user_id: String,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    guild_id: Option<String>,
    #[serde(default)]
    channel_id: Option<String>,
    #[serde(default)]
    content: String,
}

pub struct DiscordProcessor {
    config: ChannelConfig,
    gate: LifecycleGate,
    engine: ClassifierEngine,
    tracker: Arc<SourceTracker>,
    sweep_interval: Duration,
    processed: AtomicU64,
}

impl DiscordProcessor {
    pub fn new(config: ChannelConfig, sweep_interval: Duration) -> Self {
        Self {
            config,
            gate: LifecycleGate::new(),
            engine: ClassifierEngine::for_kind(ChannelKind::Discord),
            tracker: Arc::new(SourceTracker::new(16, Duration::from_secs(300))),
            sweep_interval,
            processed: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl ChannelProcessor for DiscordProcessor {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Discord
    }

    fn enabled(&self) -> bool {
        self.config.enabled
    }

    async fn start(&self, cancel: CancellationToken) -> Result<()> {
        let child = self.gate.start(&cancel)?;
        tokio::spawn(self.tracker.clone().run_sweeper(self.sweep_interval, child));
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.gate.stop()
    }

    fn process(&self, payload: &serde_json::Value) -> Result<InputEvent> {
        let payload: DiscordPayload = parse_payload(ChannelKind::Discord, payload)?;
        let content = sanitize(&payload.content);

        let mut classification = self.engine.classify_text(&content);
        let repeats = self.tracker.observe(&payload.user_id, &content);
        self.engine.apply_flood(&mut classification, repeats);
        let classification = self.engine.complete(classification);

        self.processed.fetch_add(1, Ordering::Relaxed);

        let priority = classification.threat_level as i32;
        let mut event =
            InputEvent::new(ChannelKind::Discord, payload.user_id, content, classification)
                .with_metadata("channel", "discord")
                .with_priority(priority);
        if let Some(guild_id) = payload.guild_id {
            event = event.with_metadata("guild_id", guild_id);
        }
        if let Some(channel_id) = payload.channel_id {
            event = event.with_metadata("channel_id", channel_id);
        }
        if let Some(username) = payload.username {
            event = event.with_metadata("username", username);
        }
        Ok(event)
    }

    fn stats(&self) -> serde_json::Value {
        serde_json::json!({
            "state": self.gate.state().to_string(),
            "processed": self.processed.load(Ordering::Relaxed),
            "tracked_sources": self.tracker.tracked_sources(),
        })
    }
}
