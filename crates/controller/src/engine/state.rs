//! Bounded cognitive state. Everything here is process-local; nothing
//! survives a restart by design.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Snapshot history bound.
const MAX_HISTORY: usize = 100;

/// Learning-rate clamp.
pub const LEARNING_RATE_MIN: f64 = 0.01;
pub const LEARNING_RATE_MAX: f64 = 0.5;

#[derive(Debug, Clone, Serialize)]
pub struct Pattern {
    pub id: String,
    /// Stream signature, e.g. `irc:high`.
    pub kind: String,
    pub description: String,
    pub confidence: f64,
    pub frequency: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub indicators: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Insight {
    pub id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub source_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Reflection {
    pub id: String,
    pub subject: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub at: DateTime<Utc>,
    pub awareness_level: f64,
    pub patterns: usize,
    pub insights: usize,
    pub reflections: usize,
    pub experiences: u64,
}

pub struct CognitiveState {
    pub patterns: HashMap<String, Pattern>,
    pub insights: VecDeque<Insight>,
    pub reflections: VecDeque<Reflection>,
    /// Derived observability scalar; never gates behavior.
    pub awareness_level: f64,
    /// Adjusted by feedback, clamped; observability only — no decision
    /// path reads it back.
    pub learning_rate: f64,
    pub experiences: u64,
    pub history: VecDeque<StateSnapshot>,
}

impl Default for CognitiveState {
    fn default() -> Self {
        Self::new()
    }
}

impl CognitiveState {
    pub fn new() -> Self {
        Self {
            patterns: HashMap::new(),
            insights: VecDeque::new(),
            reflections: VecDeque::new(),
            awareness_level: 0.5,
            learning_rate: 0.1,
            experiences: 0,
            history: VecDeque::new(),
        }
    }

    /// Insert or refresh a pattern, evicting the least-recently-seen one
    /// when the bound is exceeded.
    pub fn upsert_pattern(&mut self, pattern: Pattern, max_patterns: usize) {
        match self.patterns.get_mut(&pattern.id) {
            Some(existing) => {
                existing.frequency = existing.frequency.max(pattern.frequency) + 1;
                existing.confidence = existing.confidence.max(pattern.confidence);
                existing.last_seen = pattern.last_seen;
            }
            None => {
                self.patterns.insert(pattern.id.clone(), pattern);
            }
        }

        while self.patterns.len() > max_patterns {
            let oldest = self
                .patterns
                .values()
                .min_by_key(|p| p.last_seen)
                .map(|p| p.id.clone());
            match oldest {
                Some(id) => {
                    self.patterns.remove(&id);
                }
                None => break,
            }
        }
    }

    pub fn push_insight(&mut self, insight: Insight, max_insights: usize) {
        self.insights.push_back(insight);
        while self.insights.len() > max_insights {
            self.insights.pop_front();
        }
    }

    pub fn push_reflection(&mut self, reflection: Reflection, max_reflections: usize) {
        self.reflections.push_back(reflection);
        while self.reflections.len() > max_reflections {
            self.reflections.pop_front();
        }
    }

    /// `clamp01(0.5 + 0.01·patterns + 0.02·insights + 0.005·reflections)`
    pub fn recompute_awareness(&mut self) -> f64 {
        let level = 0.5
            + 0.01 * self.patterns.len() as f64
            + 0.02 * self.insights.len() as f64
            + 0.005 * self.reflections.len() as f64;
        self.awareness_level = level.clamp(0.0, 1.0);
        self.awareness_level
    }

    /// Decay or boost the learning rate by `feedback * adaptation_factor`.
    pub fn adjust_learning_rate(&mut self, feedback: f64, adaptation_factor: f64) {
        self.learning_rate = (self.learning_rate + feedback * adaptation_factor)
            .clamp(LEARNING_RATE_MIN, LEARNING_RATE_MAX);
    }

    /// Record a snapshot, bounding history.
    pub fn snapshot(&mut self) {
        let snapshot = StateSnapshot {
            at: Utc::now(),
            awareness_level: self.awareness_level,
            patterns: self.patterns.len(),
            insights: self.insights.len(),
            reflections: self.reflections.len(),
            experiences: self.experiences,
        };
        self.history.push_back(snapshot);
        while self.history.len() > MAX_HISTORY {
            self.history.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(id: &str, last_seen: DateTime<Utc>) -> Pattern {
        Pattern {
            id: id.into(),
            kind: "sms:high".into(),
            description: "test".into(),
            confidence: 0.5,
            frequency: 2,
            first_seen: last_seen,
            last_seen,
            indicators: vec![],
        }
    }

    #[test]
    fn pattern_bound_evicts_least_recently_seen() {
        let mut state = CognitiveState::new();
        let base = Utc::now();
        for i in 0..5 {
            state.upsert_pattern(
                pattern(&format!("p{i}"), base + chrono::Duration::seconds(i)),
                3,
            );
        }
        assert_eq!(state.patterns.len(), 3);
        assert!(!state.patterns.contains_key("p0"));
        assert!(!state.patterns.contains_key("p1"));
        assert!(state.patterns.contains_key("p4"));
    }

    #[test]
    fn upsert_refreshes_existing_pattern() {
        let mut state = CognitiveState::new();
        let t0 = Utc::now();
        state.upsert_pattern(pattern("p", t0), 10);
        let t1 = t0 + chrono::Duration::seconds(5);
        state.upsert_pattern(pattern("p", t1), 10);

        let p = &state.patterns["p"];
        assert_eq!(p.frequency, 3); // max(2,2)+1
        assert_eq!(p.last_seen, t1);
        assert_eq!(state.patterns.len(), 1);
    }

    #[test]
    fn insight_bound_drops_oldest() {
        let mut state = CognitiveState::new();
        for i in 0..4 {
            state.push_insight(
                Insight {
                    id: format!("i{i}"),
                    content: String::new(),
                    created_at: Utc::now(),
                    source_patterns: vec![],
                },
                2,
            );
        }
        assert_eq!(state.insights.len(), 2);
        assert_eq!(state.insights[0].id, "i2");
    }

    #[test]
    fn awareness_formula_and_clamp() {
        let mut state = CognitiveState::new();
        assert!((state.recompute_awareness() - 0.5).abs() < 1e-9);

        for i in 0..10 {
            state.upsert_pattern(pattern(&format!("p{i}"), Utc::now()), 100);
        }
        for i in 0..5 {
            state.push_insight(
                Insight {
                    id: format!("i{i}"),
                    content: String::new(),
                    created_at: Utc::now(),
                    source_patterns: vec![],
                },
                50,
            );
        }
        // 0.5 + 0.01*10 + 0.02*5 = 0.7
        assert!((state.recompute_awareness() - 0.7).abs() < 1e-9);

        for i in 10..60 {
            state.upsert_pattern(pattern(&format!("p{i}"), Utc::now()), 100);
        }
        // 0.5 + 0.6 + 0.1 > 1.0 → clamped.
        assert_eq!(state.recompute_awareness(), 1.0);
    }

    #[test]
    fn learning_rate_clamps_both_ways() {
        let mut state = CognitiveState::new();
        for _ in 0..100 {
            state.adjust_learning_rate(1.0, 0.1);
        }
        assert_eq!(state.learning_rate, LEARNING_RATE_MAX);
        for _ in 0..100 {
            state.adjust_learning_rate(-1.0, 0.1);
        }
        assert_eq!(state.learning_rate, LEARNING_RATE_MIN);
    }

    #[test]
    fn history_is_bounded() {
        let mut state = CognitiveState::new();
        for _ in 0..150 {
            state.snapshot();
        }
        assert_eq!(state.history.len(), 100);
    }
}
