//! Email (ESMTP) processor. Works on parsed mail structures: subject and
//! body feed the text classifier; attachment extensions and
//! authentication headers (SPF/DKIM/DMARC) add channel-specific weight.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use aegis_domain::config::ChannelConfig;
use aegis_domain::{ChannelKind, InputEvent, Result};

use crate::classify::engine::{bump, AUTH_FAIL_WEIGHT, DOUBLE_EXTENSION_WEIGHT};
use crate::classify::{ClassifierEngine, SourceTracker};
use crate::processors::{parse_payload, sanitize, ChannelProcessor, LifecycleGate};

#[derive(Debug, Deserialize)]
struct EmailPayload {
    from: String,
    #[serde(default)]
    to: Vec<String>,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    attachments: Vec<Attachment>,
}

#[derive(Debug, Deserialize)]
struct Attachment {
    filename: String,
    #[serde(default)]
    #[allow(dead_code)]
    content_type: Option<String>,
}

pub struct EmailProcessor {
    config: ChannelConfig,
    gate: LifecycleGate,
    engine: ClassifierEngine,
    tracker: Arc<SourceTracker>,
    sweep_interval: Duration,
    processed: AtomicU64,
    double_extension: Regex,
    executable_extension: Regex,
}

impl EmailProcessor {
    pub fn new(config: ChannelConfig, sweep_interval: Duration) -> Self {
        Self {
            config,
            gate: LifecycleGate::new(),
            engine: ClassifierEngine::for_kind(ChannelKind::Email),
            tracker: Arc::new(SourceTracker::new(16, Duration::from_secs(600))),
            sweep_interval,
            processed: AtomicU64::new(0),
            double_extension: Regex::new(r"(?i)\.[a-z0-9]{2,4}\.(exe|scr|bat|cmd|js|vbs|jar)$")
                .expect("static regex"),
            executable_extension: Regex::new(r"(?i)\.(exe|scr|bat|cmd|vbs)$")
                .expect("static regex"),
        }
    }

    fn weigh_attachments(&self, c: &mut aegis_domain::Classification, attachments: &[Attachment]) {
        for attachment in attachments {
            if self.double_extension.is_match(&attachment.filename) {
                bump(
                    c,
                    "malware",
                    DOUBLE_EXTENSION_WEIGHT,
                    format!("double-extension attachment: {}", attachment.filename),
                );
            } else if self.executable_extension.is_match(&attachment.filename) {
                bump(
                    c,
                    "malware",
                    0.3,
                    format!("executable attachment: {}", attachment.filename),
                );
            }
        }
    }

    /// SPF/DKIM/DMARC failures each add a fixed phishing increment.
    /// Headers may arrive either as discrete `spf`/`dkim`/`dmarc` keys or
    /// inside a combined `authentication-results` header.
    fn weigh_auth_headers(
        &self,
        c: &mut aegis_domain::Classification,
        headers: &HashMap<String, String>,
    ) {
        let lowered: HashMap<String, String> = headers
            .iter()
            .map(|(k, v)| (k.to_lowercase(), v.to_lowercase()))
            .collect();

        for mechanism in ["spf", "dkim", "dmarc"] {
            let failed = match lowered.get(mechanism) {
                Some(value) => value.contains("fail"),
                None => lowered
                    .get("authentication-results")
                    .map(|v| v.contains(&format!("{mechanism}=fail")))
                    .unwrap_or(false),
            };
            if failed {
                bump(c, "phishing", AUTH_FAIL_WEIGHT, format!("{mechanism}=fail"));
            }
        }
    }
}

#[async_trait]
impl ChannelProcessor for EmailProcessor {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
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
        let payload: EmailPayload = parse_payload(ChannelKind::Email, payload)?;

        let subject = payload.subject.as_deref().unwrap_or("");
        let body = payload.body.as_deref().unwrap_or("");
        let text = sanitize(&format!("{subject}\n{body}"));

        let mut classification = self.engine.classify_text(&text);
        self.weigh_attachments(&mut classification, &payload.attachments);
        self.weigh_auth_headers(&mut classification, &payload.headers);
        let repeats = self.tracker.observe(&payload.from, &text);
        self.engine.apply_flood(&mut classification, repeats);
        let classification = self.engine.complete(classification);

        self.processed.fetch_add(1, Ordering::Relaxed);

        let priority = classification.threat_level as i32;
        let mut event = InputEvent::new(ChannelKind::Email, payload.from, text, classification)
            .with_metadata("channel", "email")
            .with_metadata("subject", subject.to_string())
            .with_priority(priority);
        if !payload.to.is_empty() {
            event = event.with_metadata("to", payload.to.join(","));
        }
        if !payload.attachments.is_empty() {
            event = event.with_metadata("attachments", payload.attachments.len().to_string());
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

    fn processor() -> EmailProcessor {
        EmailProcessor::new(ChannelConfig::default(), Duration::from_secs(60))
    }

    #[test]
    fn phishing_with_failed_auth_is_high_or_critical() {
        let p = processor();
        let event = p
            .process(&serde_json::json!({
                "from": "attacker@example.tk",
                "to": ["victim@example.com"],
                "subject": "URGENT: Verify your account",
                "body": "click here to verify",
                "headers": { "spf": "fail", "dkim": "fail", "dmarc": "fail" },
            }))
            .unwrap();

        let c = &event.classification;
        assert!(c.score("phishing") >= 0.5, "phishing = {}", c.score("phishing"));
        assert!(
            matches!(c.threat_level, ThreatLevel::High | ThreatLevel::Critical),
            "got {:?} at {}",
            c.threat_level,
            c.confidence
        );
        assert!(c.indicators.iter().any(|i| i == "spf=fail"));
    }

    #[test]
    fn auth_results_header_is_parsed_too() {
        let p = processor();
        let event = p
            .process(&serde_json::json!({
                "from": "a@b.c",
                "body": "hi",
                "headers": {
                    "Authentication-Results": "mx.example.com; spf=fail; dkim=pass; dmarc=fail"
                },
            }))
            .unwrap();
        // spf + dmarc fail, dkim passes.
        assert!((event.classification.score("phishing") - 0.4).abs() < 1e-9);
    }

    #[test]
    fn double_extension_attachment_scores_malware() {
        let p = processor();
        let event = p
            .process(&serde_json::json!({
                "from": "a@b.c",
                "subject": "invoice",
                "body": "see attached",
                "attachments": [{ "filename": "invoice.pdf.exe" }],
            }))
            .unwrap();
        assert!(event.classification.score("malware") >= 0.5);
        assert!(event
            .classification
            .recommendations
            .iter()
            .any(|r| r.contains("attachment")));
    }

    #[test]
    fn plain_executable_scores_less_than_double_extension() {
        let p = processor();
        let event = p
            .process(&serde_json::json!({
                "from": "a@b.c",
                "body": "tool attached",
                "attachments": [{ "filename": "setup.exe" }],
            }))
            .unwrap();
        let score = event.classification.score("malware");
        assert!(score >= 0.3 && score < 0.5, "malware = {score}");
    }

    #[test]
    fn clean_mail_is_none() {
        let p = processor();
        let event = p
            .process(&serde_json::json!({
                "from": "friend@example.com",
                "subject": "lunch",
                "body": "sushi at noon?",
                "headers": { "spf": "pass", "dkim": "pass", "dmarc": "pass" },
            }))
            .unwrap();
        assert_eq!(event.classification.threat_level, ThreatLevel::None);
    }
}
