//! The cognitive engine: per-event ingestion, bounded state updates, and
//! the periodic awareness / pattern / insight passes.
//!
//! Lock discipline: `state` and `tracker` are separate short-lived locks
//! and neither is ever held across I/O or an await point.

pub mod patterns;
pub mod rules;
pub mod state;

use chrono::Utc;
use parking_lot::Mutex;

use aegis_domain::config::ControllerConfig;
use aegis_domain::{InputEvent, OutputCommand};

use patterns::PatternTracker;
use state::{CognitiveState, Insight, Reflection};

pub struct CognitiveEngine {
    config: ControllerConfig,
    state: Mutex<CognitiveState>,
    tracker: Mutex<PatternTracker>,
}

impl CognitiveEngine {
    pub fn new(config: ControllerConfig) -> Self {
        let window = config.pattern_window;
        Self {
            config,
            state: Mutex::new(CognitiveState::new()),
            tracker: Mutex::new(PatternTracker::new(window)),
        }
    }

    /// Ingest one classified event: pattern recognition, state update,
    /// then the decision table. Returns the commands to execute.
    pub fn ingest(&self, event: &InputEvent) -> Vec<OutputCommand> {
        let confirmed = self.tracker.lock().observe(event);

        {
            let mut state = self.state.lock();
            state.experiences += 1;
            // Event confidence drives a mild learning-rate nudge; the
            // strong signal comes from execution-report feedback.
            let feedback = event.classification.confidence - 0.5;
            let factor = self.config.adaptation_factor;
            state.adjust_learning_rate(feedback, factor);
            if let Some(pattern) = confirmed {
                tracing::debug!(pattern = %pattern.id, frequency = pattern.frequency, "pattern confirmed");
                state.upsert_pattern(pattern, self.config.max_patterns);
            }
        }

        rules::decide(event, &self.config.notification_target)
    }

    /// Execution-report feedback: success boosts, failure decays.
    pub fn record_feedback(&self, success: bool) {
        let feedback = if success { 1.0 } else { -1.0 };
        let mut state = self.state.lock();
        state.adjust_learning_rate(feedback, self.config.adaptation_factor);
        if !success {
            let reflection = Reflection {
                id: uuid::Uuid::new_v4().to_string(),
                subject: "command-execution".into(),
                content: "an emitted command failed to execute".into(),
                created_at: Utc::now(),
            };
            state.push_reflection(reflection, self.config.max_reflections);
        }
    }

    /// Awareness pass: recompute the derived scalar and snapshot.
    pub fn awareness_tick(&self) -> f64 {
        let mut state = self.state.lock();
        let level = state.recompute_awareness();
        state.snapshot();
        level
    }

    /// Pattern pass: fold every currently-confirmed window pattern into
    /// bounded state.
    pub fn pattern_tick(&self) {
        let confirmed = self.tracker.lock().confirmed();
        if confirmed.is_empty() {
            return;
        }
        let mut state = self.state.lock();
        for pattern in confirmed {
            state.upsert_pattern(pattern, self.config.max_patterns);
        }
    }

    /// Insight pass: synthesize at most three insights from the most
    /// frequent current patterns.
    pub fn insight_tick(&self) {
        let mut state = self.state.lock();
        let mut top: Vec<_> = state
            .patterns
            .values()
            .map(|p| (p.id.clone(), p.frequency, p.confidence))
            .collect();
        top.sort_by(|a, b| b.1.cmp(&a.1));

        let insights: Vec<Insight> = top
            .into_iter()
            .take(3)
            .map(|(id, frequency, confidence)| Insight {
                id: uuid::Uuid::new_v4().to_string(),
                content: format!(
                    "recurring stream pattern {id} (frequency {frequency}, strength {confidence:.2})"
                ),
                created_at: Utc::now(),
                source_patterns: vec![id],
            })
            .collect();
        for insight in insights {
            state.push_insight(insight, self.config.max_insights);
        }
    }

    pub fn stats(&self) -> serde_json::Value {
        let state = self.state.lock();
        serde_json::json!({
            "patterns": state.patterns.len(),
            "insights": state.insights.len(),
            "reflections": state.reflections.len(),
            "awareness_level": state.awareness_level,
            "learning_rate": state.learning_rate,
            "experiences": state.experiences,
            "history": state.history.len(),
        })
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_domain::{ChannelKind, Classification, ThreatLevel};

    fn engine() -> CognitiveEngine {
        CognitiveEngine::new(ControllerConfig::default())
    }

    fn event(level: ThreatLevel, confidence: f64) -> InputEvent {
        let mut classification = Classification::benign(&["spam"]);
        classification.threat_level = level;
        classification.confidence = confidence;
        InputEvent::new(ChannelKind::Sms, "+1555", "content", classification)
    }

    #[test]
    fn high_event_emits_alert_command() {
        let engine = engine();
        let commands = engine.ingest(&event(ThreatLevel::High, 0.7));
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].target, "ops");
    }

    #[test]
    fn benign_event_emits_nothing_but_counts() {
        let engine = engine();
        assert!(engine.ingest(&event(ThreatLevel::None, 0.0)).is_empty());
        assert_eq!(engine.stats()["experiences"], 1);
    }

    #[test]
    fn repeated_events_confirm_a_pattern() {
        let engine = engine();
        engine.ingest(&event(ThreatLevel::High, 0.7));
        engine.ingest(&event(ThreatLevel::High, 0.7));
        assert_eq!(engine.stats()["patterns"], 1);
    }

    #[test]
    fn failed_feedback_adds_reflection_and_decays_rate() {
        let engine = engine();
        let before = engine.stats()["learning_rate"].as_f64().unwrap();
        engine.record_feedback(false);
        let after = engine.stats()["learning_rate"].as_f64().unwrap();
        assert!(after < before);
        assert_eq!(engine.stats()["reflections"], 1);
    }

    #[test]
    fn awareness_reflects_accumulated_state() {
        let engine = engine();
        let baseline = engine.awareness_tick();
        assert!((baseline - 0.5).abs() < 1e-9);

        engine.ingest(&event(ThreatLevel::High, 0.7));
        engine.ingest(&event(ThreatLevel::High, 0.7));
        engine.insight_tick();
        let after = engine.awareness_tick();
        assert!(after > baseline);
    }

    #[test]
    fn insight_tick_caps_at_three() {
        let engine = engine();
        for kind in [ChannelKind::Sms, ChannelKind::Irc, ChannelKind::Discord, ChannelKind::Email] {
            for _ in 0..2 {
                let mut c = Classification::benign(&["spam"]);
                c.threat_level = ThreatLevel::High;
                c.confidence = 0.7;
                engine.ingest(&InputEvent::new(kind, "s", "x", c.clone()));
            }
        }
        engine.insight_tick();
        assert_eq!(engine.stats()["insights"], 3);
    }
}
