//! SMS processor. Messages arrive pushed by an external gateway; the
//! processor classifies the text and tracks per-number flood behavior.

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
struct SmsPayload {
    from: String,
    #[serde(default)]
    to: Option<String>,
    #[serde(default)]
    body: String,
}

pub struct SmsProcessor {
    config: ChannelConfig,
    gate: LifecycleGate,
    engine: ClassifierEngine,
    tracker: Arc<SourceTracker>,
    sweep_interval: Duration,
    processed: AtomicU64,
}

impl SmsProcessor {
    pub fn new(config: ChannelConfig, sweep_interval: Duration) -> Self {
        Self {
            config,
            gate: LifecycleGate::new(),
            engine: ClassifierEngine::for_kind(ChannelKind::Sms),
            tracker: Arc::new(SourceTracker::new(16, Duration::from_secs(300))),
            sweep_interval,
            processed: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl ChannelProcessor for SmsProcessor {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Sms
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
        let payload: SmsPayload = parse_payload(ChannelKind::Sms, payload)?;
        let body = sanitize(&payload.body);

        let mut classification = self.engine.classify_text(&body);
        let repeats = self.tracker.observe(&payload.from, &body);
        self.engine.apply_flood(&mut classification, repeats);
        let classification = self.engine.complete(classification);

        self.processed.fetch_add(1, Ordering::Relaxed);

        let priority = classification.threat_level as i32;
        let mut event = InputEvent::new(ChannelKind::Sms, payload.from, body, classification)
            .with_metadata("channel", "sms")
            .with_priority(priority);
        if let Some(to) = payload.to {
            event = event.with_metadata("to", to);
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

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_domain::ThreatLevel;

    fn processor() -> SmsProcessor {
        SmsProcessor::new(ChannelConfig::default(), Duration::from_secs(60))
    }

    #[test]
    fn spam_sms_classifies_medium_or_high() {
        let p = processor();
        let event = p
            .process(&serde_json::json!({
                "from": "+15550001111",
                "to": "+15550002222",
                "body": "FREE MONEY!!! WIN BIG PRIZES!!! CLICK http://bit.ly/x",
            }))
            .unwrap();

        let c = &event.classification;
        assert!(c.score("spam") > 0.4);
        assert!(c.score("phishing") > 0.0);
        assert!(!c.indicators.is_empty());
        assert!(matches!(c.threat_level, ThreatLevel::Medium | ThreatLevel::High));
        assert_eq!(event.source, "+15550001111");
        assert_eq!(event.metadata["to"], "+15550002222");
    }

    #[test]
    fn benign_sms_is_none() {
        let p = processor();
        let event = p
            .process(&serde_json::json!({ "from": "+1555", "body": "see you at 6" }))
            .unwrap();
        assert_eq!(event.classification.threat_level, ThreatLevel::None);
        assert_eq!(event.priority, 0);
    }

    #[test]
    fn malformed_payload_is_validation_error() {
        let p = processor();
        let err = p.process(&serde_json::json!({ "body": "no sender" })).unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[tokio::test]
    async fn lifecycle_double_start_fails() {
        let p = processor();
        let cancel = CancellationToken::new();
        p.start(cancel.clone()).await.unwrap();
        assert!(p.start(cancel).await.is_err());
        p.stop().await.unwrap();
        assert!(p.stop().await.is_err());
    }

    #[test]
    fn repeated_bodies_raise_flood() {
        let p = processor();
        let body = serde_json::json!({ "from": "+1555", "body": "same message" });
        for _ in 0..6 {
            p.process(&body).unwrap();
        }
        let event = p.process(&body).unwrap();
        assert!(event.classification.score("flood") > 0.5);
    }
}
