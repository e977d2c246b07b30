use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry lifecycle (self-registration + heartbeat)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// When false the process never talks to the registry.
    #[serde(default = "d_true")]
    pub enabled: bool,
    #[serde(default = "d_registry_url")]
    pub registry_url: String,
    /// Heartbeat = re-register; refreshes `last_seen`.
    #[serde(default = "d_30")]
    pub heartbeat_secs: u64,
    /// Deregistration happens before local work is cancelled; after this
    /// grace period remaining tasks are force-dropped.
    #[serde(default = "d_5")]
    pub shutdown_grace_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            registry_url: d_registry_url(),
            heartbeat_secs: d_30(),
            shutdown_grace_secs: d_5(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_true() -> bool {
    true
}
fn d_registry_url() -> String {
    "http://localhost:8500".into()
}
fn d_30() -> u64 {
    30
}
fn d_5() -> u64 {
    5
}
