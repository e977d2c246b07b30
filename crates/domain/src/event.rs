//! Channel events and commands — the payloads that move through the I/O
//! plane and the controller stream.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::Classification;

/// The communication channel an event or command belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Sms,
    Voice,
    Irc,
    Discord,
    Email,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 5] = [
        ChannelKind::Sms,
        ChannelKind::Voice,
        ChannelKind::Irc,
        ChannelKind::Discord,
        ChannelKind::Email,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Sms => "sms",
            ChannelKind::Voice => "voice",
            ChannelKind::Irc => "irc",
            ChannelKind::Discord => "discord",
            ChannelKind::Email => "email",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChannelKind {
    type Err = crate::Error;

    /// Parses the wire spelling of a kind. `esmtp` is the webhook path
    /// spelling for the email channel and maps onto it.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sms" => Ok(ChannelKind::Sms),
            "voice" => Ok(ChannelKind::Voice),
            "irc" => Ok(ChannelKind::Irc),
            "discord" => Ok(ChannelKind::Discord),
            "email" | "esmtp" => Ok(ChannelKind::Email),
            other => Err(crate::Error::NotFound(format!("unknown channel kind: {other}"))),
        }
    }
}

/// One ingress message, sanitized and classified. Immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputEvent {
    /// Unique within a process run.
    pub id: String,
    pub kind: ChannelKind,
    /// Channel-native sender identifier (phone number, `nick!user@host`,
    /// Discord user id, mail address).
    pub source: String,
    pub content: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
    /// Higher is dispatched sooner.
    #[serde(default)]
    pub priority: i32,
    pub classification: Classification,
}

impl InputEvent {
    pub fn new(
        kind: ChannelKind,
        source: impl Into<String>,
        content: impl Into<String>,
        classification: Classification,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            source: source.into(),
            content: content.into(),
            metadata: HashMap::new(),
            timestamp: Utc::now(),
            priority: 0,
            classification,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// One egress action produced by the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputCommand {
    pub id: String,
    pub kind: ChannelKind,
    /// Channel-native addressee.
    pub target: String,
    pub content: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub priority: i32,
    pub created_at: DateTime<Utc>,
}

impl OutputCommand {
    pub fn new(kind: ChannelKind, target: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            target: target.into(),
            content: content.into(),
            metadata: HashMap::new(),
            priority: 0,
            created_at: Utc::now(),
        }
    }
}

/// Terminal outcome of an [`OutputCommand`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputResult {
    pub command_id: String,
    pub success: bool,
    pub completed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OutputResult {
    pub fn ok(command_id: impl Into<String>) -> Self {
        Self {
            command_id: command_id.into(),
            success: true,
            completed_at: Utc::now(),
            error: None,
        }
    }

    pub fn failed(command_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            command_id: command_id.into(),
            success: false,
            completed_at: Utc::now(),
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Classification;

    #[test]
    fn kind_round_trips_through_str() {
        for kind in ChannelKind::ALL {
            let parsed: ChannelKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn esmtp_is_an_email_alias() {
        let parsed: ChannelKind = "esmtp".parse().unwrap();
        assert_eq!(parsed, ChannelKind::Email);
    }

    #[test]
    fn unknown_kind_is_not_found() {
        let err = "sdcard".parse::<ChannelKind>().unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn event_ids_are_unique() {
        let a = InputEvent::new(ChannelKind::Sms, "s", "x", Classification::benign(&[]));
        let b = InputEvent::new(ChannelKind::Sms, "s", "x", Classification::benign(&[]));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn failed_result_carries_error() {
        let r = OutputResult::failed("cmd-1", "timeout");
        assert!(!r.success);
        assert_eq!(r.error.as_deref(), Some("timeout"));
        // Success results omit the error field entirely on the wire.
        let ok = serde_json::to_value(OutputResult::ok("cmd-2")).unwrap();
        assert!(ok.get("error").is_none());
    }
}
