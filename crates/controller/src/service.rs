//! Tonic implementation of the controller RPC surface.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tonic::{Request, Response, Status, Streaming};

use aegis_domain::{InputEvent, OutputCommand};
use aegis_protocol::{pb, CognitiveController};

use crate::engine::CognitiveEngine;

pub struct ControllerService {
    engine: Arc<CognitiveEngine>,
}

impl ControllerService {
    pub fn new(engine: Arc<CognitiveEngine>) -> Self {
        Self { engine }
    }

    fn analyze(engine: &CognitiveEngine, event: InputEvent) -> pb::AnalysisResult {
        let commands = engine.ingest(&event);
        tracing::info!(
            event_id = %event.id,
            kind = %event.kind,
            threat_level = %event.classification.threat_level,
            actions = commands.len(),
            "event analyzed"
        );
        pb::AnalysisResult {
            event_id: event.id.clone(),
            threat_level: event.classification.threat_level.to_string(),
            confidence: event.classification.confidence,
            recommended_actions: commands.into_iter().map(Into::into).collect(),
            metadata: Default::default(),
            processed_at_ms: Utc::now().timestamp_millis(),
        }
    }

    fn acknowledge(engine: &CognitiveEngine, command: &OutputCommand) -> pb::OutputResult {
        let success = command
            .metadata
            .get("result")
            .map(|r| r == "success")
            .unwrap_or(true);
        engine.record_feedback(success);
        pb::OutputResult {
            command_id: command.id.clone(),
            success,
            completed_at_ms: Utc::now().timestamp_millis(),
            error: command.metadata.get("error").cloned().unwrap_or_default(),
        }
    }
}

#[tonic::async_trait]
impl CognitiveController for ControllerService {
    async fn health_check(
        &self,
        _request: Request<pb::HealthCheckRequest>,
    ) -> Result<Response<pb::HealthCheckResponse>, Status> {
        let stats = self.engine.stats();
        let details = stats
            .as_object()
            .map(|o| {
                o.iter()
                    .map(|(k, v)| (k.clone(), v.to_string()))
                    .collect()
            })
            .unwrap_or_default();
        Ok(Response::new(pb::HealthCheckResponse {
            status: "ok".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            details,
        }))
    }

    async fn process_input_event(
        &self,
        request: Request<pb::InputEvent>,
    ) -> Result<Response<pb::InputEventResponse>, Status> {
        let event = InputEvent::try_from(request.into_inner())
            .map_err(|e| Status::invalid_argument(e.to_string()))?;
        let event_id = event.id.clone();
        let commands = self.engine.ingest(&event);

        Ok(Response::new(pb::InputEventResponse {
            event_id,
            processed: true,
            actions: commands.into_iter().map(Into::into).collect(),
            metadata: Default::default(),
            processed_at_ms: Utc::now().timestamp_millis(),
        }))
    }

    async fn execute_output_command(
        &self,
        request: Request<pb::OutputCommand>,
    ) -> Result<Response<pb::OutputResult>, Status> {
        let command = OutputCommand::try_from(request.into_inner())
            .map_err(|e| Status::invalid_argument(e.to_string()))?;
        Ok(Response::new(Self::acknowledge(&self.engine, &command)))
    }

    type StreamInputEventsStream = ReceiverStream<Result<pb::AnalysisResult, Status>>;

    /// The primary data path. Per-event ordering is preserved: each
    /// inbound event is analyzed and answered before the next is read.
    async fn stream_input_events(
        &self,
        request: Request<Streaming<pb::InputEvent>>,
    ) -> Result<Response<Self::StreamInputEventsStream>, Status> {
        let mut inbound = request.into_inner();
        let engine = self.engine.clone();
        let (tx, rx) = mpsc::channel(16);

        tokio::spawn(async move {
            while let Some(message) = inbound.next().await {
                let outcome = match message {
                    Ok(wire) => match InputEvent::try_from(wire) {
                        Ok(event) => Ok(Self::analyze(&engine, event)),
                        Err(e) => {
                            tracing::warn!(error = %e, "undecodable event on stream");
                            Err(Status::invalid_argument(e.to_string()))
                        }
                    },
                    Err(status) => {
                        tracing::debug!(error = %status, "event stream ended with error");
                        break;
                    }
                };
                if tx.send(outcome).await.is_err() {
                    break; // peer went away
                }
            }
            tracing::debug!("event stream closed");
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    type StreamOutputCommandsStream = ReceiverStream<Result<pb::OutputResult, Status>>;

    /// Execution reports from the I/O plane; each is acknowledged and
    /// folded into the feedback signal.
    async fn stream_output_commands(
        &self,
        request: Request<Streaming<pb::OutputCommand>>,
    ) -> Result<Response<Self::StreamOutputCommandsStream>, Status> {
        let mut inbound = request.into_inner();
        let engine = self.engine.clone();
        let (tx, rx) = mpsc::channel(16);

        tokio::spawn(async move {
            while let Some(message) = inbound.next().await {
                let outcome = match message {
                    Ok(wire) => match OutputCommand::try_from(wire) {
                        Ok(command) => Ok(Self::acknowledge(&engine, &command)),
                        Err(e) => Err(Status::invalid_argument(e.to_string())),
                    },
                    Err(status) => {
                        tracing::debug!(error = %status, "report stream ended with error");
                        break;
                    }
                };
                if tx.send(outcome).await.is_err() {
                    break;
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}
