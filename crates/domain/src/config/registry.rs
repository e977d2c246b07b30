use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry service
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_8500")]
    pub port: u16,
    /// Read-cache entries (records + listings).
    #[serde(default = "d_1000")]
    pub cache_capacity: usize,
    #[serde(default = "d_30")]
    pub cache_ttl_secs: u64,
    /// Negative lookups are cached for a short burst window only.
    #[serde(default = "d_5")]
    pub negative_ttl_secs: u64,
    #[serde(default = "d_30")]
    pub reaper_interval_secs: u64,
    /// Seconds without a heartbeat before a record is marked critical.
    #[serde(default = "d_120")]
    pub staleness_deadline_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            host: d_host(),
            port: d_8500(),
            cache_capacity: d_1000(),
            cache_ttl_secs: d_30(),
            negative_ttl_secs: d_5(),
            reaper_interval_secs: d_30(),
            staleness_deadline_secs: d_120(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_host() -> String {
    "0.0.0.0".into()
}
fn d_8500() -> u16 {
    8500
}
fn d_1000() -> usize {
    1000
}
fn d_30() -> u64 {
    30
}
fn d_5() -> u64 {
    5
}
fn d_120() -> u64 {
    120
}
