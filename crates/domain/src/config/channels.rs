use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Channel processors and senders
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub sms: ChannelConfig,
    #[serde(default)]
    pub voice: ChannelConfig,
    #[serde(default)]
    pub discord: ChannelConfig,
    #[serde(default)]
    pub email: ChannelConfig,
    #[serde(default)]
    pub irc: IrcConfig,
}

/// Settings shared by the webhook-fed channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default = "d_true")]
    pub enabled: bool,
    /// Egress token bucket: sustained sends per second.
    #[serde(default = "d_rate")]
    pub rate_per_sec: u32,
    /// Egress token bucket: burst allowance.
    #[serde(default = "d_burst")]
    pub burst: u32,
    /// Relay endpoint the sender POSTs outbound messages to.
    /// `None` disables the sender for this kind.
    #[serde(default)]
    pub relay_url: Option<String>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rate_per_sec: d_rate(),
            burst: d_burst(),
            relay_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrcConfig {
    #[serde(default = "d_true")]
    pub enabled: bool,
    #[serde(default)]
    pub servers: Vec<IrcServerConfig>,
    #[serde(default = "d_reconnect")]
    pub reconnect_delay_secs: u64,
    #[serde(default = "d_rate")]
    pub rate_per_sec: u32,
    #[serde(default = "d_burst")]
    pub burst: u32,
}

impl Default for IrcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            servers: Vec::new(),
            reconnect_delay_secs: d_reconnect(),
            rate_per_sec: d_rate(),
            burst: d_burst(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrcServerConfig {
    pub host: String,
    #[serde(default = "d_6667")]
    pub port: u16,
    #[serde(default)]
    pub tls: bool,
    #[serde(default = "d_nick")]
    pub nick: String,
    /// Channels to JOIN after registration.
    #[serde(default)]
    pub channels: Vec<String>,
}

// ── serde default helpers ───────────────────────────────────────────

fn d_true() -> bool {
    true
}
fn d_rate() -> u32 {
    5
}
fn d_burst() -> u32 {
    10
}
fn d_reconnect() -> u64 {
    10
}
fn d_6667() -> u16 {
    6667
}
fn d_nick() -> String {
    "aegis".into()
}
