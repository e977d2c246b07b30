use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Cognitive controller
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_9090")]
    pub grpc_port: u16,
    /// Bounded cognitive state sizes; oldest entries are evicted.
    #[serde(default = "d_100")]
    pub max_patterns: usize,
    #[serde(default = "d_50")]
    pub max_insights: usize,
    #[serde(default = "d_25")]
    pub max_reflections: usize,
    /// Pattern window: events per stream kind considered for confirmation.
    #[serde(default = "d_16")]
    pub pattern_window: usize,
    /// Learning-rate feedback multiplier.
    #[serde(default = "d_adaptation")]
    pub adaptation_factor: f64,
    /// Addressee for alert commands on high/critical events.
    #[serde(default = "d_notify")]
    pub notification_target: String,
    #[serde(default = "d_30")]
    pub awareness_interval_secs: u64,
    #[serde(default = "d_30")]
    pub pattern_interval_secs: u64,
    #[serde(default = "d_60")]
    pub insight_interval_secs: u64,
    #[serde(default = "d_20")]
    pub metrics_interval_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            host: d_host(),
            grpc_port: d_9090(),
            max_patterns: d_100(),
            max_insights: d_50(),
            max_reflections: d_25(),
            pattern_window: d_16(),
            adaptation_factor: d_adaptation(),
            notification_target: d_notify(),
            awareness_interval_secs: d_30(),
            pattern_interval_secs: d_30(),
            insight_interval_secs: d_60(),
            metrics_interval_secs: d_20(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_host() -> String {
    "0.0.0.0".into()
}
fn d_9090() -> u16 {
    9090
}
fn d_100() -> usize {
    100
}
fn d_50() -> usize {
    50
}
fn d_25() -> usize {
    25
}
fn d_16() -> usize {
    16
}
fn d_adaptation() -> f64 {
    0.1
}
fn d_notify() -> String {
    "ops".into()
}
fn d_30() -> u64 {
    30
}
fn d_60() -> u64 {
    60
}
fn d_20() -> u64 {
    20
}
