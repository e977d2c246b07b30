use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// I/O plane gateway
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_8080")]
    pub http_port: u16,
    /// Capacity per queue direction; a full queue rejects, never blocks.
    #[serde(default = "d_4096")]
    pub queue_capacity: usize,
    /// Controller gRPC endpoint.
    #[serde(default = "d_controller_url")]
    pub controller_url: String,
    /// Per-send deadline on the controller stream.
    #[serde(default = "d_30")]
    pub send_deadline_secs: u64,
    /// How long `stop` waits for loops before force-closing handles.
    #[serde(default = "d_5")]
    pub shutdown_grace_secs: u64,
    /// Per-source tracking sweep interval.
    #[serde(default = "d_60")]
    pub tracker_sweep_secs: u64,
    #[serde(default = "d_256")]
    pub max_concurrent_requests: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: d_host(),
            http_port: d_8080(),
            queue_capacity: d_4096(),
            controller_url: d_controller_url(),
            send_deadline_secs: d_30(),
            shutdown_grace_secs: d_5(),
            tracker_sweep_secs: d_60(),
            max_concurrent_requests: d_256(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_host() -> String {
    "0.0.0.0".into()
}
fn d_8080() -> u16 {
    8080
}
fn d_4096() -> usize {
    4096
}
fn d_controller_url() -> String {
    "http://localhost:9090".into()
}
fn d_30() -> u64 {
    30
}
fn d_5() -> u64 {
    5
}
fn d_60() -> u64 {
    60
}
fn d_256() -> usize {
    256
}
