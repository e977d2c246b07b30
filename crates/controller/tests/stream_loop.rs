//! Integration test: boots the controller's gRPC surface on an
//! ephemeral port, connects a real tonic client, and exercises the
//! health probe, unary ingestion, and both bidirectional streams.

use std::sync::Arc;
use std::time::Duration;

use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};

use aegis_controller::engine::CognitiveEngine;
use aegis_controller::service::ControllerService;
use aegis_domain::config::ControllerConfig;
use aegis_domain::{ChannelKind, Classification, InputEvent, OutputCommand, ThreatLevel};
use aegis_protocol::{pb, CognitiveControllerClient, CognitiveControllerServer};

async fn boot() -> (CognitiveControllerClient<tonic::transport::Channel>, Arc<CognitiveEngine>) {
    let engine = Arc::new(CognitiveEngine::new(ControllerConfig::default()));
    let service = ControllerService::new(engine.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(CognitiveControllerServer::new(service))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });

    let client = CognitiveControllerClient::connect(format!("http://{addr}"))
        .await
        .unwrap();
    (client, engine)
}

fn high_threat_event() -> pb::InputEvent {
    let mut classification = Classification::benign(&["spam"]);
    classification.threat_level = ThreatLevel::High;
    classification.confidence = 0.7;
    classification.indicators.push("spam keyword: prize".into());
    InputEvent::new(ChannelKind::Sms, "+15550001111", "WIN BIG", classification).into()
}

fn benign_event() -> pb::InputEvent {
    InputEvent::new(ChannelKind::Sms, "+1555", "hi", Classification::benign(&["spam"]))
        .into()
}

#[tokio::test]
async fn health_check_reports_ok() {
    let (mut client, _engine) = boot().await;
    let response = client
        .health_check(pb::HealthCheckRequest { service: "test".into() })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(response.status, "ok");
    assert!(!response.version.is_empty());
    assert!(response.details.contains_key("patterns"));
}

#[tokio::test]
async fn unary_ingestion_returns_actions() {
    let (mut client, _engine) = boot().await;
    let response = client
        .process_input_event(high_threat_event())
        .await
        .unwrap()
        .into_inner();
    assert!(response.processed);
    assert_eq!(response.actions.len(), 1);
    assert_eq!(response.actions[0].target, "ops");

    let benign = client
        .process_input_event(benign_event())
        .await
        .unwrap()
        .into_inner();
    assert!(benign.actions.is_empty());
}

#[tokio::test]
async fn event_stream_answers_in_order_with_actions() {
    let (mut client, engine) = boot().await;

    let (tx, rx) = tokio::sync::mpsc::channel(8);
    let mut results = client
        .stream_input_events(ReceiverStream::new(rx))
        .await
        .unwrap()
        .into_inner();

    let first = high_threat_event();
    let second = benign_event();
    let first_id = first.id.clone();
    let second_id = second.id.clone();
    tx.send(first).await.unwrap();
    tx.send(second).await.unwrap();

    let analysis = results.message().await.unwrap().unwrap();
    assert_eq!(analysis.event_id, first_id);
    assert_eq!(analysis.threat_level, "high");
    assert_eq!(analysis.recommended_actions.len(), 1);

    let analysis = results.message().await.unwrap().unwrap();
    assert_eq!(analysis.event_id, second_id);
    assert!(analysis.recommended_actions.is_empty());

    drop(tx);
    // The engine saw both events.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(engine.stats()["experiences"], 2);
}

#[tokio::test]
async fn report_stream_acknowledges_and_feeds_back() {
    let (mut client, engine) = boot().await;

    let (tx, rx) = tokio::sync::mpsc::channel(8);
    let mut acks = client
        .stream_output_commands(ReceiverStream::new(rx))
        .await
        .unwrap()
        .into_inner();

    let mut failed = OutputCommand::new(ChannelKind::Sms, "+1555", "alert text");
    failed.metadata.insert("result".into(), "error".into());
    failed.metadata.insert("error".into(), "relay 503".into());
    let failed_id = failed.id.clone();
    tx.send(pb::OutputCommand::from(failed)).await.unwrap();

    let ack = acks.message().await.unwrap().unwrap();
    assert_eq!(ack.command_id, failed_id);
    assert!(!ack.success);
    assert_eq!(ack.error, "relay 503");

    // A failed execution leaves a reflection behind.
    assert_eq!(engine.stats()["reflections"], 1);
}
