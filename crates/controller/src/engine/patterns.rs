//! Windowed pattern recognition over incoming event streams.
//!
//! One bounded window per stream kind. A signature (kind + threat level)
//! is confirmed as a pattern once it occurs at least twice within the
//! window; pattern strength is `count / window_size`.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};

use aegis_domain::InputEvent;

use super::state::Pattern;

struct WindowEntry {
    signature: String,
    at: DateTime<Utc>,
    indicator: Option<String>,
}

pub struct PatternTracker {
    windows: HashMap<String, VecDeque<WindowEntry>>,
    window_size: usize,
}

impl PatternTracker {
    pub fn new(window_size: usize) -> Self {
        Self {
            windows: HashMap::new(),
            window_size: window_size.max(2),
        }
    }

    fn signature(event: &InputEvent) -> String {
        format!("{}:{}", event.kind, event.classification.threat_level)
    }

    /// Record the event; returns a confirmed [`Pattern`] once the
    /// signature repeats within the kind's window.
    pub fn observe(&mut self, event: &InputEvent) -> Option<Pattern> {
        let signature = Self::signature(event);
        let window = self.windows.entry(event.kind.to_string()).or_default();

        if window.len() == self.window_size {
            window.pop_front();
        }
        window.push_back(WindowEntry {
            signature: signature.clone(),
            at: event.timestamp,
            indicator: event.classification.indicators.first().cloned(),
        });

        let matching: Vec<&WindowEntry> =
            window.iter().filter(|e| e.signature == signature).collect();
        let count = matching.len();
        if count < 2 {
            return None;
        }

        let first_seen = matching.first().map(|e| e.at).unwrap_or(event.timestamp);
        let indicators: Vec<String> = matching
            .iter()
            .filter_map(|e| e.indicator.clone())
            .collect();
        Some(Pattern {
            id: signature.clone(),
            kind: signature.clone(),
            description: format!("{count} {signature} events within window"),
            confidence: count as f64 / self.window_size as f64,
            frequency: count as u64,
            first_seen,
            last_seen: event.timestamp,
            indicators,
        })
    }

    /// Walk all windows and return every currently-confirmed pattern
    /// (used by the periodic pattern-recognition loop).
    pub fn confirmed(&self) -> Vec<Pattern> {
        let mut patterns = Vec::new();
        for window in self.windows.values() {
            let mut counts: HashMap<&str, (usize, DateTime<Utc>, DateTime<Utc>)> = HashMap::new();
            for entry in window {
                let slot = counts
                    .entry(entry.signature.as_str())
                    .or_insert((0, entry.at, entry.at));
                slot.0 += 1;
                slot.1 = slot.1.min(entry.at);
                slot.2 = slot.2.max(entry.at);
            }
            for (signature, (count, first_seen, last_seen)) in counts {
                if count >= 2 {
                    patterns.push(Pattern {
                        id: signature.to_string(),
                        kind: signature.to_string(),
                        description: format!("{count} {signature} events within window"),
                        confidence: count as f64 / self.window_size as f64,
                        frequency: count as u64,
                        first_seen,
                        last_seen,
                        indicators: vec![],
                    });
                }
            }
        }
        patterns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_domain::{ChannelKind, Classification, ThreatLevel};

    fn event(kind: ChannelKind, level: ThreatLevel) -> InputEvent {
        let mut classification = Classification::benign(&["spam"]);
        classification.threat_level = level;
        classification.indicators.push("spam keyword: prize".into());
        InputEvent::new(kind, "src", "content", classification)
    }

    #[test]
    fn single_event_confirms_nothing() {
        let mut tracker = PatternTracker::new(16);
        assert!(tracker
            .observe(&event(ChannelKind::Sms, ThreatLevel::High))
            .is_none());
    }

    #[test]
    fn second_matching_event_confirms() {
        let mut tracker = PatternTracker::new(16);
        tracker.observe(&event(ChannelKind::Sms, ThreatLevel::High));
        let pattern = tracker
            .observe(&event(ChannelKind::Sms, ThreatLevel::High))
            .unwrap();
        assert_eq!(pattern.id, "sms:high");
        assert_eq!(pattern.frequency, 2);
        assert!((pattern.confidence - 2.0 / 16.0).abs() < 1e-9);
        assert_eq!(pattern.indicators.len(), 2);
    }

    #[test]
    fn different_levels_do_not_cross_confirm() {
        let mut tracker = PatternTracker::new(16);
        tracker.observe(&event(ChannelKind::Sms, ThreatLevel::High));
        assert!(tracker
            .observe(&event(ChannelKind::Sms, ThreatLevel::Low))
            .is_none());
    }

    #[test]
    fn window_is_bounded_per_kind() {
        let mut tracker = PatternTracker::new(4);
        tracker.observe(&event(ChannelKind::Irc, ThreatLevel::High));
        // Push the first entry out of the 4-slot window with other levels.
        for _ in 0..4 {
            tracker.observe(&event(ChannelKind::Irc, ThreatLevel::None));
        }
        // The old high entry fell out, so this one starts fresh.
        assert!(tracker
            .observe(&event(ChannelKind::Irc, ThreatLevel::High))
            .is_none());
    }

    #[test]
    fn confirmed_walk_reports_strength() {
        let mut tracker = PatternTracker::new(8);
        for _ in 0..3 {
            tracker.observe(&event(ChannelKind::Discord, ThreatLevel::Medium));
        }
        let confirmed = tracker.confirmed();
        assert_eq!(confirmed.len(), 1);
        assert_eq!(confirmed[0].frequency, 3);
        assert!((confirmed[0].confidence - 3.0 / 8.0).abs() < 1e-9);
    }
}
