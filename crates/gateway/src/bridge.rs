//! Streaming client to the cognitive controller.
//!
//! Maintains at most one active bidirectional session per process. Two
//! streams run concurrently inside a session: `StreamInputEvents`
//! (classified events up, analysis + recommended actions down) and
//! `StreamOutputCommands` (execution reports up, result acknowledgements
//! down). On transport failure the session closes, backs off with
//! doubling delay capped at 5 s, and re-dials; queued events survive in
//! the inbound queue, and the single in-flight event is requeued at the
//! head of its band.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Endpoint;
use tonic::Request;

use aegis_domain::{Error, OutputCommand, Result};
use aegis_protocol::{pb, CognitiveControllerClient};

use crate::metrics::GatewayMetrics;
use crate::queue::{BoundedQueue, IoQueue};

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(5);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ControllerBridge {
    endpoint: String,
    send_deadline: Duration,
    queue: Arc<IoQueue>,
    reports: Arc<BoundedQueue<OutputCommand>>,
    metrics: Arc<GatewayMetrics>,
    /// Guards the at-most-one-active-stream invariant.
    active: AtomicBool,
}

impl ControllerBridge {
    pub fn new(
        endpoint: String,
        send_deadline: Duration,
        queue: Arc<IoQueue>,
        reports: Arc<BoundedQueue<OutputCommand>>,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        Self {
            endpoint,
            send_deadline,
            queue,
            reports,
            metrics,
            active: AtomicBool::new(false),
        }
    }

    /// Reconnect loop. Runs until cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            if cancel.is_cancelled() {
                return;
            }

            match self.connect().await {
                Ok(client) => {
                    // A successful dial resets the backoff schedule.
                    backoff = INITIAL_BACKOFF;
                    match self.session(client, &cancel).await {
                        Ok(()) => return, // cancelled
                        Err(e) => {
                            self.metrics.stream_reconnects.inc();
                            tracing::warn!(error = %e, "controller stream failed; reconnecting");
                        }
                    }
                }
                Err(e) => {
                    self.metrics.stream_reconnects.inc();
                    tracing::warn!(
                        endpoint = %self.endpoint,
                        delay_ms = backoff.as_millis() as u64,
                        error = %e,
                        "controller dial failed"
                    );
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = cancel.cancelled() => return,
            }
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    async fn connect(&self) -> Result<CognitiveControllerClient<tonic::transport::Channel>> {
        // No request timeout here: the streaming call is one request and a
        // blanket timeout would sever it. The per-send deadline is applied
        // to each stream hand-off in the pumps instead.
        let endpoint = Endpoint::from_shared(self.endpoint.clone())
            .map_err(|e| Error::Transport(format!("controller endpoint: {e}")))?
            .connect_timeout(CONNECT_TIMEOUT);
        let channel = endpoint
            .connect()
            .await
            .map_err(|e| Error::Transport(format!("controller connect: {e}")))?;
        Ok(CognitiveControllerClient::new(channel))
    }

    /// One connected session: open both streams, pump until either fails
    /// or the parent cancels.
    async fn session(
        &self,
        mut client: CognitiveControllerClient<tonic::transport::Channel>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if self.active.swap(true, Ordering::SeqCst) {
            return Err(Error::Internal("controller stream already active".into()));
        }
        let result = self.session_inner(&mut client, cancel).await;
        self.active.store(false, Ordering::SeqCst);
        result
    }

    async fn session_inner(
        &self,
        client: &mut CognitiveControllerClient<tonic::transport::Channel>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        tracing::info!(endpoint = %self.endpoint, "controller stream established");

        // Session-scoped token: trips on parent cancellation or when a
        // pump hits its send deadline.
        let session_cancel = cancel.child_token();

        // Events up. Capacity 1 keeps at most one event outside the
        // queue; a failed hand-off requeues it at the head of its band.
        let (event_tx, event_rx) = mpsc::channel::<pb::InputEvent>(1);
        let event_pump = tokio::spawn(pump_events(
            self.queue.clone(),
            event_tx,
            session_cancel.clone(),
            self.send_deadline,
        ));

        // Execution reports up.
        let (report_tx, report_rx) = mpsc::channel::<pb::OutputCommand>(1);
        let report_pump = tokio::spawn(pump_reports(
            self.reports.clone(),
            report_tx,
            session_cancel.clone(),
            self.send_deadline,
        ));

        let outcome = async {
            let mut analysis = client
                .stream_input_events(Request::new(ReceiverStream::new(event_rx)))
                .await
                .map_err(|e| Error::Transport(format!("stream_input_events: {e}")))?
                .into_inner();
            let mut acks = client
                .stream_output_commands(Request::new(ReceiverStream::new(report_rx)))
                .await
                .map_err(|e| Error::Transport(format!("stream_output_commands: {e}")))?
                .into_inner();

            loop {
                tokio::select! {
                    _ = session_cancel.cancelled() => {
                        return if cancel.is_cancelled() {
                            Ok(())
                        } else {
                            Err(Error::Transport("send deadline exceeded".into()))
                        };
                    }
                    message = analysis.message() => {
                        let result = message
                            .map_err(|e| Error::Transport(format!("analysis stream: {e}")))?
                            .ok_or_else(|| Error::Transport("analysis stream closed".into()))?;
                        self.handle_analysis(result);
                    }
                    message = acks.message() => {
                        let ack = message
                            .map_err(|e| Error::Transport(format!("result stream: {e}")))?
                            .ok_or_else(|| Error::Transport("result stream closed".into()))?;
                        tracing::debug!(command_id = %ack.command_id, success = ack.success, "execution report acknowledged");
                    }
                }
            }
        }
        .await;

        event_pump.abort();
        report_pump.abort();
        outcome
    }

    /// Turn recommended actions into queued output commands. Per-event
    /// ordering holds because analysis results arrive in event order and
    /// enqueue preserves band FIFO.
    fn handle_analysis(&self, result: pb::AnalysisResult) {
        for action in result.recommended_actions {
            match OutputCommand::try_from(action) {
                Ok(command) => {
                    tracing::info!(
                        event_id = %result.event_id,
                        command_id = %command.id,
                        kind = %command.kind,
                        "controller recommended action"
                    );
                    if self.queue.outbound.enqueue(command).is_err() {
                        self.metrics.queue_drops.with_label_values(&["outbound"]).inc();
                        tracing::warn!(event_id = %result.event_id, "outbound queue saturated; command dropped");
                    }
                }
                Err(e) => {
                    tracing::warn!(event_id = %result.event_id, error = %e, "undecodable recommended action")
                }
            }
        }
    }
}

/// Feed the inbound queue into the event stream. The one in-flight item
/// is requeued at the head of its band if the stream dies or the send
/// deadline lapses; a lapsed deadline also tears the session down.
async fn pump_events(
    queue: Arc<IoQueue>,
    tx: mpsc::Sender<pb::InputEvent>,
    session_cancel: CancellationToken,
    deadline: std::time::Duration,
) {
    while let Some(event) = queue.inbound.dequeue(&session_cancel).await {
        let wire: pb::InputEvent = event.clone().into();
        match tokio::time::timeout(deadline, tx.send(wire)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                queue.inbound.requeue_front(event);
                return;
            }
            Err(_) => {
                queue.inbound.requeue_front(event);
                session_cancel.cancel();
                return;
            }
        }
    }
}

async fn pump_reports(
    reports: Arc<BoundedQueue<OutputCommand>>,
    tx: mpsc::Sender<pb::OutputCommand>,
    session_cancel: CancellationToken,
    deadline: std::time::Duration,
) {
    while let Some(report) = reports.dequeue(&session_cancel).await {
        let wire: pb::OutputCommand = report.clone().into();
        match tokio::time::timeout(deadline, tx.send(wire)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                reports.requeue_front(report);
                return;
            }
            Err(_) => {
                reports.requeue_front(report);
                session_cancel.cancel();
                return;
            }
        }
    }
}
