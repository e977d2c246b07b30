//! Outbound dispatcher: drains the outbound queue, routes each command
//! to its channel sender with retry, and posts the execution report onto
//! the report queue for the controller stream.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use aegis_domain::{OutputCommand, OutputResult};

use crate::metrics::GatewayMetrics;
use crate::queue::{BoundedQueue, IoQueue};
use crate::senders::{send_with_retry, RetryPolicy, SenderSet};

pub async fn run_dispatcher(
    queue: Arc<IoQueue>,
    senders: Arc<SenderSet>,
    reports: Arc<BoundedQueue<OutputCommand>>,
    metrics: Arc<GatewayMetrics>,
    cancel: CancellationToken,
) {
    let policy = RetryPolicy::default();

    while let Some(command) = queue.outbound.dequeue(&cancel).await {
        let kind = command.kind;
        let result = match senders.get(kind) {
            Some(sender) => send_with_retry(sender.as_ref(), &command, &policy).await,
            None => OutputResult::failed(&command.id, format!("no sender for kind {kind}")),
        };

        let outcome = if result.success { "success" } else { "error" };
        metrics
            .commands
            .with_label_values(&[kind.as_str(), outcome])
            .inc();

        // Annotate the executed command and hand it to the report stream.
        let mut report = command;
        report.metadata.insert("result".into(), outcome.into());
        report
            .metadata
            .insert("completed_at".into(), result.completed_at.to_rfc3339());
        if let Some(error) = &result.error {
            report.metadata.insert("error".into(), error.clone());
        }
        if reports.enqueue(report).is_err() {
            metrics.queue_drops.with_label_values(&["reports"]).inc();
            tracing::debug!(command_id = %result.command_id, "report queue saturated; report dropped");
        }
    }
    tracing::debug!("dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::LifecycleGate;
    use crate::senders::ChannelSender;
    use aegis_domain::{ChannelKind, Error, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct RecordingSender {
        gate: LifecycleGate,
        sent: AtomicU32,
        fail: bool,
    }

    impl RecordingSender {
        fn new(fail: bool) -> Self {
            Self {
                gate: LifecycleGate::new(),
                sent: AtomicU32::new(0),
                fail,
            }
        }
    }

    #[async_trait]
    impl ChannelSender for RecordingSender {
        fn kind(&self) -> ChannelKind {
            ChannelKind::Sms
        }
        fn enabled(&self) -> bool {
            true
        }
        async fn start(&self, cancel: CancellationToken) -> Result<()> {
            self.gate.start(&cancel)?;
            Ok(())
        }
        async fn stop(&self) -> Result<()> {
            self.gate.stop()
        }
        async fn send(&self, _command: &aegis_domain::OutputCommand) -> Result<()> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(Error::Internal("permanent failure".into()))
            } else {
                Ok(())
            }
        }
        fn stats(&self) -> serde_json::Value {
            serde_json::json!({})
        }
    }

    async fn run_one(fail: bool, kind: ChannelKind) -> OutputCommand {
        let queue = Arc::new(IoQueue::new(16));
        let reports = Arc::new(BoundedQueue::new("reports", 16));
        let metrics = Arc::new(GatewayMetrics::new());
        let sender = Arc::new(RecordingSender::new(fail));
        let cancel = CancellationToken::new();
        sender.start(cancel.clone()).await.unwrap();
        let senders = Arc::new(SenderSet::new(vec![sender]));

        queue
            .outbound
            .enqueue(OutputCommand::new(kind, "t", "payload"))
            .unwrap();

        let dispatcher = tokio::spawn(run_dispatcher(
            queue.clone(),
            senders,
            reports.clone(),
            metrics,
            cancel.clone(),
        ));

        let report = tokio::time::timeout(Duration::from_secs(2), reports.dequeue(&cancel))
            .await
            .unwrap()
            .unwrap();
        cancel.cancel();
        dispatcher.await.unwrap();
        report
    }

    #[tokio::test]
    async fn successful_send_reports_success() {
        let report = run_one(false, ChannelKind::Sms).await;
        assert_eq!(report.metadata["result"], "success");
        assert!(!report.metadata.contains_key("error"));
    }

    #[tokio::test]
    async fn failed_send_reports_error() {
        let report = run_one(true, ChannelKind::Sms).await;
        assert_eq!(report.metadata["result"], "error");
        assert!(report.metadata["error"].contains("permanent failure"));
    }

    #[tokio::test]
    async fn missing_sender_reports_error() {
        let report = run_one(false, ChannelKind::Voice).await;
        assert_eq!(report.metadata["result"], "error");
        assert!(report.metadata["error"].contains("no sender"));
    }
}
