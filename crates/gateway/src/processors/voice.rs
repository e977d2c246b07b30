//! Voice processor. The external telephony gateway pushes call events
//! with a transcript and optional voice-analysis scores; classification
//! runs on the transcript plus those structured signals.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use aegis_domain::config::ChannelConfig;
use aegis_domain::{ChannelKind, InputEvent, Result};

use crate::classify::engine::bump;
use crate::classify::{ClassifierEngine, SourceTracker};
use crate::processors::{parse_payload, sanitize, ChannelProcessor, LifecycleGate};

#[derive(Debug, Deserialize)]
struct VoicePayload {
    caller: String,
    #[serde(default)]
    duration_secs: Option<u64>,
    #[serde(default)]
    transcript: Option<String>,
    /// Upstream voice-analysis scores (0.0–1.0), e.g. `synthetic`, `scam`.
    #[serde(default)]
    voice_scores: HashMap<String, f64>,
}

pub struct VoiceProcessor {
    config: ChannelConfig,
    gate: LifecycleGate,
    engine: ClassifierEngine,
    tracker: Arc<SourceTracker>,
    sweep_interval: Duration,
    processed: AtomicU64,
}

impl VoiceProcessor {
    pub fn new(config: ChannelConfig, sweep_interval: Duration) -> Self {
        Self {
            config,
            gate: LifecycleGate::new(),
            engine: ClassifierEngine::for_kind(ChannelKind::Voice),
            tracker: Arc::new(SourceTracker::new(16, Duration::from_secs(600))),
            sweep_interval,
            processed: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl ChannelProcessor for VoiceProcessor {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Voice
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
        let payload: VoicePayload = parse_payload(ChannelKind::Voice, payload)?;
        let transcript = sanitize(payload.transcript.as_deref().unwrap_or(""));

        let mut classification = self.engine.classify_text(&transcript);

        // Structured voice-analysis signals from the gateway.
        if let Some(synthetic) = payload.voice_scores.get("synthetic") {
            if *synthetic >= 0.5 {
                bump(
                    &mut classification,
                    "bot",
                    synthetic * 0.5,
                    format!("synthetic voice score {synthetic:.2}"),
                );
            }
        }
        if let Some(scam) = payload.voice_scores.get("scam") {
            if *scam >= 0.5 {
                bump(
                    &mut classification,
                    "social_eng",
                    scam * 0.5,
                    format!("scam voice score {scam:.2}"),
                );
            }
        }

        let repeats = self.tracker.observe(&payload.caller, &transcript);
        self.engine.apply_flood(&mut classification, repeats);
        let classification = self.engine.complete(classification);

        self.processed.fetch_add(1, Ordering::Relaxed);

        let priority = classification.threat_level as i32;
        let mut event =
            InputEvent::new(ChannelKind::Voice, payload.caller, transcript, classification)
                .with_metadata("channel", "voice")
                .with_priority(priority);
        if let Some(duration) = payload.duration_secs {
            event = event.with_metadata("duration_secs", duration.to_string());
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
