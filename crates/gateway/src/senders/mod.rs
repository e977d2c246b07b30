//! Channel senders — the egress side of the I/O plane.
//!
//! Senders share the processors' lifecycle states. Every send passes a
//! per-channel token bucket; transient transport errors are retried with
//! exponential backoff, and exhaustion surfaces as a failed
//! [`OutputResult`] that travels back over the controller stream.

pub mod irc;
pub mod relay;

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use tokio_util::sync::CancellationToken;

use aegis_domain::{ChannelKind, OutputCommand, OutputResult, Result};

pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Token bucket from a per-channel rate + burst configuration.
pub fn limiter(rate_per_sec: u32, burst: u32) -> Limiter {
    let rate = NonZeroU32::new(rate_per_sec.max(1)).expect("max(1) is non-zero");
    let burst = NonZeroU32::new(burst.max(1)).expect("max(1) is non-zero");
    RateLimiter::direct(Quota::per_second(rate).allow_burst(burst))
}

#[async_trait]
pub trait ChannelSender: Send + Sync {
    fn kind(&self) -> ChannelKind;
    fn enabled(&self) -> bool;
    async fn start(&self, cancel: CancellationToken) -> Result<()>;
    async fn stop(&self) -> Result<()>;

    /// Transmit one command on the external channel. Transient failures
    /// return `Error::Transport` so the retry wrapper can take over.
    async fn send(&self, command: &OutputCommand) -> Result<()>;

    fn stats(&self) -> serde_json::Value;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Retry policy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Exponential backoff for transient send failures: an initial attempt
/// plus up to `retries` retries, sleeping `base * factor^n` in between
/// (default 100 ms → 400 ms → 1600 ms).
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub retries: u32,
    pub base: Duration,
    pub factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            base: Duration::from_millis(100),
            factor: 4,
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base * self.factor.saturating_pow(retry)
    }
}

/// Drive a send to its terminal [`OutputResult`]. Unretryable errors
/// fail immediately; retryable ones are retried until the policy is
/// exhausted.
pub async fn send_with_retry(
    sender: &dyn ChannelSender,
    command: &OutputCommand,
    policy: &RetryPolicy,
) -> OutputResult {
    let mut last_error = String::new();
    for attempt in 0..=policy.retries {
        match sender.send(command).await {
            Ok(()) => return OutputResult::ok(&command.id),
            Err(e) if e.is_retryable() && attempt < policy.retries => {
                let delay = policy.delay_for(attempt);
                tracing::debug!(
                    command_id = %command.id,
                    kind = %command.kind,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "send failed, retrying"
                );
                last_error = e.to_string();
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                tracing::warn!(
                    command_id = %command.id,
                    kind = %command.kind,
                    error = %e,
                    "send failed terminally"
                );
                return OutputResult::failed(&command.id, e.to_string());
            }
        }
    }
    OutputResult::failed(&command.id, last_error)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sender set
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// kind → sender, fixed at construction from configuration.
pub struct SenderSet {
    senders: HashMap<ChannelKind, Arc<dyn ChannelSender>>,
}

impl SenderSet {
    pub fn new(senders: Vec<Arc<dyn ChannelSender>>) -> Self {
        let senders = senders.into_iter().map(|s| (s.kind(), s)).collect();
        Self { senders }
    }

    pub fn get(&self, kind: ChannelKind) -> Option<&Arc<dyn ChannelSender>> {
        self.senders.get(&kind).filter(|s| s.enabled())
    }

    pub async fn start_all(&self, cancel: &CancellationToken) {
        for sender in self.senders.values() {
            if !sender.enabled() {
                tracing::info!(kind = %sender.kind(), "sender disabled");
                continue;
            }
            match sender.start(cancel.clone()).await {
                Ok(()) => tracing::info!(kind = %sender.kind(), "sender started"),
                Err(e) => tracing::error!(kind = %sender.kind(), error = %e, "sender failed to start"),
            }
        }
    }

    pub async fn stop_all(&self) {
        for sender in self.senders.values() {
            if let Err(e) = sender.stop().await {
                tracing::debug!(kind = %sender.kind(), error = %e, "sender stop skipped");
            }
        }
    }

    pub fn stats(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .senders
            .values()
            .map(|s| (s.kind().to_string(), s.stats()))
            .collect();
        serde_json::Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_domain::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakySender {
        fail_first: u32,
        calls: AtomicU32,
        retryable: bool,
    }

    #[async_trait]
    impl ChannelSender for FlakySender {
        fn kind(&self) -> ChannelKind {
            ChannelKind::Sms
        }
        fn enabled(&self) -> bool {
            true
        }
        async fn start(&self, _cancel: CancellationToken) -> Result<()> {
            Ok(())
        }
        async fn stop(&self) -> Result<()> {
            Ok(())
        }
        async fn send(&self, _command: &OutputCommand) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                if self.retryable {
                    Err(Error::Transport("relay timeout".into()))
                } else {
                    Err(Error::Internal("bad target".into()))
                }
            } else {
                Ok(())
            }
        }
        fn stats(&self) -> serde_json::Value {
            serde_json::json!({})
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            retries: 3,
            base: Duration::from_millis(1),
            factor: 2,
        }
    }

    fn command() -> OutputCommand {
        OutputCommand::new(ChannelKind::Sms, "+1555", "hello")
    }

    #[test]
    fn default_backoff_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(400));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1600));
    }

    #[tokio::test]
    async fn transient_failures_eventually_succeed() {
        let sender = FlakySender {
            fail_first: 2,
            calls: AtomicU32::new(0),
            retryable: true,
        };
        let result = send_with_retry(&sender, &command(), &fast_policy()).await;
        assert!(result.success);
        assert_eq!(sender.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_surfaces_failure() {
        let sender = FlakySender {
            fail_first: 10,
            calls: AtomicU32::new(0),
            retryable: true,
        };
        let result = send_with_retry(&sender, &command(), &fast_policy()).await;
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap_or_default().contains("timeout"));
        // Initial attempt + 3 retries.
        assert_eq!(sender.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn unretryable_errors_fail_immediately() {
        let sender = FlakySender {
            fail_first: 10,
            calls: AtomicU32::new(0),
            retryable: false,
        };
        let result = send_with_retry(&sender, &command(), &fast_policy()).await;
        assert!(!result.success);
        assert_eq!(sender.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn limiter_allows_burst_then_throttles() {
        let limiter = limiter(1000, 2);
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_ok());
        // Burst exhausted; the third immediate check is rejected.
        assert!(limiter.check().is_err());
    }
}
