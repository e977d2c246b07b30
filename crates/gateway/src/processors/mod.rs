//! Channel processors — the ingress side of the I/O plane.
//!
//! Each processor is a lifecycle-managed state machine
//! (`created → running → stopped`) that turns raw channel payloads into
//! classified [`InputEvent`]s. The webhook-fed kinds (SMS, voice,
//! Discord, email) do their work synchronously in `process`; IRC
//! additionally maintains its own client connections.

pub mod discord;
pub mod email;
pub mod irc;
pub mod sms;
pub mod voice;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use aegis_domain::{ChannelKind, Error, InputEvent, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Lifecycle state machine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Created,
    Running,
    Stopped,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunState::Created => "created",
            RunState::Running => "running",
            RunState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Shared start/stop gate for processors and senders. Double-start and
/// double-stop fail cleanly instead of corrupting loops.
pub struct LifecycleGate {
    state: Mutex<RunState>,
    child: Mutex<Option<CancellationToken>>,
}

impl Default for LifecycleGate {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleGate {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RunState::Created),
            child: Mutex::new(None),
        }
    }

    /// Transition `created → running` and hand back a child token that
    /// trips on either the parent signal or a later `stop`.
    pub fn start(&self, parent: &CancellationToken) -> Result<CancellationToken> {
        let mut state = self.state.lock();
        match *state {
            RunState::Created => {
                *state = RunState::Running;
                let child = parent.child_token();
                *self.child.lock() = Some(child.clone());
                Ok(child)
            }
            other => Err(Error::Internal(format!("cannot start from state {other}"))),
        }
    }

    /// Transition `running → stopped`, cancelling the child token.
    pub fn stop(&self) -> Result<()> {
        let mut state = self.state.lock();
        match *state {
            RunState::Running => {
                *state = RunState::Stopped;
                if let Some(child) = self.child.lock().take() {
                    child.cancel();
                }
                Ok(())
            }
            other => Err(Error::Internal(format!("not running (state {other})"))),
        }
    }

    pub fn state(&self) -> RunState {
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.state() == RunState::Running
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Processor trait + set
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait]
pub trait ChannelProcessor: Send + Sync {
    fn kind(&self) -> ChannelKind;
    fn enabled(&self) -> bool;

    /// Launch background loops (tracker sweeper, channel connections).
    /// Returns once the loops are spawned.
    async fn start(&self, cancel: CancellationToken) -> Result<()>;

    /// Tear down loops. Fails cleanly when not running.
    async fn stop(&self) -> Result<()>;

    /// Parse → sanitize → classify one raw payload. Synchronous so tests
    /// can drive it directly.
    fn process(&self, payload: &serde_json::Value) -> Result<InputEvent>;

    fn stats(&self) -> serde_json::Value;
}

/// kind → processor, populated from configuration at construction.
/// No dynamic loading; the set is fixed for the process lifetime.
pub struct ProcessorSet {
    processors: HashMap<ChannelKind, Arc<dyn ChannelProcessor>>,
}

impl ProcessorSet {
    pub fn new(processors: Vec<Arc<dyn ChannelProcessor>>) -> Self {
        let processors = processors
            .into_iter()
            .map(|p| (p.kind(), p))
            .collect();
        Self { processors }
    }

    /// Look up an enabled processor; disabled or missing kinds are absent.
    pub fn get(&self, kind: ChannelKind) -> Option<&Arc<dyn ChannelProcessor>> {
        self.processors.get(&kind).filter(|p| p.enabled())
    }

    pub async fn start_all(&self, cancel: &CancellationToken) {
        for processor in self.processors.values() {
            if !processor.enabled() {
                tracing::info!(kind = %processor.kind(), "processor disabled");
                continue;
            }
            match processor.start(cancel.clone()).await {
                Ok(()) => tracing::info!(kind = %processor.kind(), "processor started"),
                Err(e) => tracing::error!(kind = %processor.kind(), error = %e, "processor failed to start"),
            }
        }
    }

    pub async fn stop_all(&self) {
        for processor in self.processors.values() {
            if let Err(e) = processor.stop().await {
                tracing::debug!(kind = %processor.kind(), error = %e, "processor stop skipped");
            }
        }
    }

    pub fn stats(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .processors
            .values()
            .map(|p| (p.kind().to_string(), p.stats()))
            .collect();
        serde_json::Value::Object(map)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Shared payload helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Strip control characters; channel payloads reach the classifier as
/// plain text.
pub(crate) fn sanitize(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

pub(crate) fn parse_payload<T: serde::de::DeserializeOwned>(
    kind: ChannelKind,
    payload: &serde_json::Value,
) -> Result<T> {
    serde_json::from_value(payload.clone())
        .map_err(|e| Error::Validation(format!("{kind} payload: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_walks_created_running_stopped() {
        let gate = LifecycleGate::new();
        assert_eq!(gate.state(), RunState::Created);

        let parent = CancellationToken::new();
        let child = gate.start(&parent).unwrap();
        assert!(gate.is_running());
        assert!(!child.is_cancelled());

        gate.stop().unwrap();
        assert_eq!(gate.state(), RunState::Stopped);
        assert!(child.is_cancelled());
    }

    #[test]
    fn double_start_fails_cleanly() {
        let gate = LifecycleGate::new();
        let parent = CancellationToken::new();
        gate.start(&parent).unwrap();
        let err = gate.start(&parent).unwrap_err();
        assert_eq!(err.kind(), "internal");
        assert!(gate.is_running(), "failed start must not change state");
    }

    #[test]
    fn double_stop_fails_cleanly() {
        let gate = LifecycleGate::new();
        let parent = CancellationToken::new();
        gate.start(&parent).unwrap();
        gate.stop().unwrap();
        assert!(gate.stop().is_err());
    }

    #[test]
    fn stop_before_start_fails() {
        let gate = LifecycleGate::new();
        assert!(gate.stop().is_err());
        assert_eq!(gate.state(), RunState::Created);
    }

    #[test]
    fn parent_cancel_reaches_child() {
        let gate = LifecycleGate::new();
        let parent = CancellationToken::new();
        let child = gate.start(&parent).unwrap();
        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn sanitize_strips_control_chars() {
        assert_eq!(sanitize("a\u{0}b\u{7}c"), "abc");
        assert_eq!(sanitize("line1\nline2\tend"), "line1\nline2\tend");
    }
}
