//! Threat classification attached to every ingested event.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Score dimensions every classifier may emit. A channel uses the subset
/// that makes sense for it; absent dimensions score zero.
pub const DIMENSIONS: &[&str] = &["spam", "phishing", "malware", "bot", "flood", "social_eng"];

/// Ordinal threat label. Ordering is part of the contract:
/// `none < low < medium < high < critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatLevel {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl ThreatLevel {
    /// Fixed step function from aggregate confidence.
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.8 {
            ThreatLevel::Critical
        } else if confidence >= 0.6 {
            ThreatLevel::High
        } else if confidence >= 0.4 {
            ThreatLevel::Medium
        } else if confidence >= 0.2 {
            ThreatLevel::Low
        } else {
            ThreatLevel::None
        }
    }
}

impl std::str::FromStr for ThreatLevel {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(ThreatLevel::None),
            "low" => Ok(ThreatLevel::Low),
            "medium" => Ok(ThreatLevel::Medium),
            "high" => Ok(ThreatLevel::High),
            "critical" => Ok(ThreatLevel::Critical),
            other => Err(crate::Error::Validation(format!("unknown threat level: {other}"))),
        }
    }
}

impl std::fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ThreatLevel::None => "none",
            ThreatLevel::Low => "low",
            ThreatLevel::Medium => "medium",
            ThreatLevel::High => "high",
            ThreatLevel::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Result of local threat analysis for one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub threat_level: ThreatLevel,
    /// Arithmetic mean of the dimension scores, clamped to [0, 1].
    pub confidence: f64,
    pub scores: BTreeMap<String, f64>,
    /// One human-readable string per triggered signal, in trigger order.
    pub indicators: Vec<String>,
    pub recommendations: Vec<String>,
}

impl Classification {
    /// A classification with every dimension of `dims` scored zero.
    pub fn benign(dims: &[&str]) -> Self {
        Self {
            threat_level: ThreatLevel::None,
            confidence: 0.0,
            scores: dims.iter().map(|d| (d.to_string(), 0.0)).collect(),
            indicators: Vec::new(),
            recommendations: Vec::new(),
        }
    }

    /// Recompute `confidence` and `threat_level` from the current scores.
    ///
    /// Confidence is the arithmetic mean over the *triggered* dimensions
    /// (score > 0). Untriggered dimensions stay visible in `scores` but do
    /// not dilute the signal; with nothing triggered, confidence is 0.
    pub fn finalize(mut self) -> Self {
        let triggered: Vec<f64> = self.scores.values().copied().filter(|s| *s > 0.0).collect();
        self.confidence = if triggered.is_empty() {
            0.0
        } else {
            (triggered.iter().sum::<f64>() / triggered.len() as f64).clamp(0.0, 1.0)
        };
        self.threat_level = ThreatLevel::from_confidence(self.confidence);
        self
    }

    pub fn score(&self, dimension: &str) -> f64 {
        self.scores.get(dimension).copied().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_function_boundaries() {
        assert_eq!(ThreatLevel::from_confidence(0.0), ThreatLevel::None);
        assert_eq!(ThreatLevel::from_confidence(0.19), ThreatLevel::None);
        assert_eq!(ThreatLevel::from_confidence(0.2), ThreatLevel::Low);
        assert_eq!(ThreatLevel::from_confidence(0.4), ThreatLevel::Medium);
        assert_eq!(ThreatLevel::from_confidence(0.6), ThreatLevel::High);
        assert_eq!(ThreatLevel::from_confidence(0.8), ThreatLevel::Critical);
        assert_eq!(ThreatLevel::from_confidence(1.0), ThreatLevel::Critical);
    }

    #[test]
    fn levels_are_ordered() {
        assert!(ThreatLevel::None < ThreatLevel::Low);
        assert!(ThreatLevel::Low < ThreatLevel::Medium);
        assert!(ThreatLevel::Medium < ThreatLevel::High);
        assert!(ThreatLevel::High < ThreatLevel::Critical);
    }

    #[test]
    fn benign_scores_all_zero() {
        let c = Classification::benign(&["spam", "flood"]);
        assert_eq!(c.threat_level, ThreatLevel::None);
        assert_eq!(c.score("spam"), 0.0);
        assert_eq!(c.score("flood"), 0.0);
        assert!(c.indicators.is_empty());
    }

    #[test]
    fn finalize_is_mean_of_triggered_dimensions() {
        let mut c = Classification::benign(&["spam", "phishing", "flood"]);
        c.scores.insert("spam".into(), 1.0);
        c.scores.insert("phishing".into(), 0.5);
        // flood stays 0 and must not dilute the confidence.
        let c = c.finalize();
        assert!((c.confidence - 0.75).abs() < 1e-9);
        assert_eq!(c.threat_level, ThreatLevel::High);
    }

    #[test]
    fn finalize_with_no_dimensions_is_none() {
        let c = Classification::benign(&[]).finalize();
        assert_eq!(c.confidence, 0.0);
        assert_eq!(c.threat_level, ThreatLevel::None);
    }
}
