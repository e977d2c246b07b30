//! Integration test: boots the webhook surface in-process with the full
//! processor set and drives the documented end-to-end scenarios — spam
//! SMS, IRC flood, phishing email — plus the error statuses (unknown
//! kind, wrong method, malformed JSON, queue backpressure).

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use aegis_domain::config::Config;
use aegis_domain::{ChannelKind, OutputCommand};
use aegis_gateway::api;
use aegis_gateway::metrics::GatewayMetrics;
use aegis_gateway::processors::{
    discord::DiscordProcessor, email::EmailProcessor, irc::IrcProcessor, sms::SmsProcessor,
    voice::VoiceProcessor, ChannelProcessor, ProcessorSet,
};
use aegis_gateway::queue::{BoundedQueue, IoQueue};
use aegis_gateway::senders::SenderSet;
use aegis_gateway::state::AppState;

struct TestServer {
    base_url: String,
    queue: Arc<IoQueue>,
    cancel: CancellationToken,
}

async fn boot(queue_capacity: usize) -> TestServer {
    let config = Arc::new(Config::default());
    let queue = Arc::new(IoQueue::new(queue_capacity));
    let sweep = Duration::from_secs(60);

    let processors: Vec<Arc<dyn ChannelProcessor>> = vec![
        Arc::new(SmsProcessor::new(config.channels.sms.clone(), sweep)),
        Arc::new(VoiceProcessor::new(config.channels.voice.clone(), sweep)),
        Arc::new(DiscordProcessor::new(config.channels.discord.clone(), sweep)),
        Arc::new(EmailProcessor::new(config.channels.email.clone(), sweep)),
        Arc::new(IrcProcessor::new(
            config.channels.irc.clone(),
            queue.clone(),
            sweep,
        )),
    ];
    let processors = Arc::new(ProcessorSet::new(processors));
    let cancel = CancellationToken::new();
    processors.start_all(&cancel).await;

    let state = AppState {
        config,
        queue: queue.clone(),
        reports: Arc::new(BoundedQueue::<OutputCommand>::new("reports", 64)),
        processors,
        senders: Arc::new(SenderSet::new(vec![])),
        metrics: Arc::new(GatewayMetrics::new()),
    };
    let app = api::router().with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base_url: format!("http://{addr}"),
        queue,
        cancel,
    }
}

fn envelope(body: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "id": "req-1",
        "source": "test-gateway",
        "tag": "it",
        "timestamp": "2026-08-01T00:00:00Z",
        "headers": {},
        "body": body,
    })
}

#[tokio::test]
async fn spam_sms_scenario() {
    let server = boot(64).await;
    let response = reqwest::Client::new()
        .post(format!("{}/webhook/sms", server.base_url))
        .json(&envelope(serde_json::json!({
            "from": "+15550001111",
            "to": "+15550002222",
            "body": "FREE MONEY!!! WIN BIG PRIZES!!! CLICK http://bit.ly/x",
        })))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["request_id"], "req-1");
    let level = body["data"]["threat_level"].as_str().unwrap();
    assert!(level == "medium" || level == "high", "got {level}");
    assert!(body["data"]["scores"]["spam"].as_f64().unwrap() > 0.4);
    assert!(body["data"]["scores"]["phishing"].as_f64().unwrap() > 0.0);
    assert!(!body["data"]["indicators"].as_array().unwrap().is_empty());

    // The classified event landed on the inbound queue.
    let event = server.queue.inbound.try_dequeue().unwrap();
    assert_eq!(event.kind, ChannelKind::Sms);
    assert_eq!(event.source, "+15550001111");
}

#[tokio::test]
async fn irc_flood_scenario() {
    let server = boot(64).await;
    let client = reqwest::Client::new();

    let payload = envelope(serde_json::json!({
        "source": "flooder!user@host",
        "target": "#test",
        "message": "aaaaaaaaaaaaaaaaaaaa",
    }));

    let mut last = serde_json::Value::Null;
    for _ in 0..10 {
        last = client
            .post(format!("{}/webhook/irc", server.base_url))
            .json(&payload)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
    }
    assert!(
        last["data"]["scores"]["flood"].as_f64().unwrap() > 0.5,
        "flood = {}",
        last["data"]["scores"]["flood"]
    );
}

#[tokio::test]
async fn phishing_email_scenario() {
    let server = boot(64).await;
    let response = reqwest::Client::new()
        .post(format!("{}/webhook/esmtp", server.base_url))
        .json(&envelope(serde_json::json!({
            "from": "security@paypa1-accounts.tk",
            "to": ["victim@example.com"],
            "subject": "URGENT: Verify your account",
            "body": "click here to verify",
            "headers": { "spf": "fail", "dkim": "fail", "dmarc": "fail" },
        })))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    let level = body["data"]["threat_level"].as_str().unwrap();
    assert!(level == "high" || level == "critical", "got {level}");
    assert!(body["data"]["scores"]["phishing"].as_f64().unwrap() >= 0.5);
}

#[tokio::test]
async fn unknown_kind_is_404() {
    let server = boot(64).await;
    let response = reqwest::Client::new()
        .post(format!("{}/webhook/sdcard", server.base_url))
        .json(&envelope(serde_json::json!({})))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn wrong_method_is_405() {
    let server = boot(64).await;
    let response = reqwest::Client::new()
        .get(format!("{}/webhook/sms", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 405);
}

#[tokio::test]
async fn malformed_json_is_400() {
    let server = boot(64).await;
    let response = reqwest::Client::new()
        .post(format!("{}/webhook/sms", server.base_url))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "validation");
}

#[tokio::test]
async fn invalid_payload_is_400_with_details_message() {
    let server = boot(64).await;
    let response = reqwest::Client::new()
        .post(format!("{}/webhook/sms", server.base_url))
        .json(&envelope(serde_json::json!({ "body": "missing from" })))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn saturated_queue_is_503_backpressure() {
    let server = boot(1).await;
    let client = reqwest::Client::new();
    let payload = envelope(serde_json::json!({ "from": "+1555", "body": "hello" }));

    // First event fills the single-slot queue.
    let ok = client
        .post(format!("{}/webhook/sms", server.base_url))
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(ok.status(), 200);

    let full = client
        .post(format!("{}/webhook/sms", server.base_url))
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(full.status(), 503);
    let body: serde_json::Value = full.json().await.unwrap();
    assert_eq!(body["error"], "backpressure");

    // Draining restores ingestion.
    server.queue.inbound.try_dequeue().unwrap();
    let again = client
        .post(format!("{}/webhook/sms", server.base_url))
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(again.status(), 200);
    server.cancel.cancel();
}

#[tokio::test]
async fn email_alias_and_canonical_both_route() {
    let server = boot(64).await;
    let client = reqwest::Client::new();
    let payload = envelope(serde_json::json!({ "from": "a@b.c", "body": "hi" }));

    for path in ["esmtp", "email"] {
        let response = client
            .post(format!("{}/webhook/{path}", server.base_url))
            .json(&payload)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200, "path {path}");
    }
}
