//! Command service integration tests
//!
//! Retry behavior runs against a queued transport under paused time; the
//! HTTP transport runs against a `wiremock` server.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;
use voice_command_engine::Error;
use voice_command_engine::assistant::PendingUpdate;
use voice_command_engine::config::ServiceConfig;
use voice_command_engine::service::{
    CommandRequest, CommandRoundTrip, CommandTransport, HttpCommandTransport, RetryPolicy,
};
use voice_command_engine::voice::{AudioClip, RecordingMode, SAMPLE_RATE, StopReason, samples_to_wav};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;
use common::{MockTransport, generate_sine_samples};

fn clip() -> AudioClip {
    let samples = generate_sine_samples(200.0, 0.5, 0.5);
    AudioClip {
        wav: samples_to_wav(&samples, SAMPLE_RATE).unwrap(),
        sample_rate: SAMPLE_RATE,
        duration: Duration::from_millis(500),
        mode: RecordingMode::FreshCommand,
        had_speech: true,
        stop_reason: StopReason::TimeBasedSilence,
    }
}

fn service_config(url: &str) -> ServiceConfig {
    ServiceConfig {
        url: url.to_string(),
        token: Some("secret-token".to_string()),
        timeout: Duration::from_secs(5),
        max_retries: 3,
    }
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_service_is_retried_a_bounded_number_of_times() {
    let transport = Arc::new(MockTransport::default());
    for _ in 0..10 {
        transport.fail(Error::Unreachable("connection refused".to_string()));
    }
    let policy = RetryPolicy::default();
    let round_trip = CommandRoundTrip::new(transport.clone(), policy.clone());

    let started = Instant::now();
    let err = round_trip.send(&clip(), None).await.unwrap_err();

    assert!(matches!(err, Error::Unreachable(_)));
    assert_eq!(transport.requests().len(), 4);
    // 500ms + 1s + 2s of backoff
    assert_eq!(started.elapsed(), Duration::from_millis(3500));
    assert!(started.elapsed() <= policy.max_total_delay());
}

#[tokio::test(start_paused = true)]
async fn test_recovers_after_transient_failures() {
    let transport = Arc::new(MockTransport::default());
    transport.fail(Error::Unreachable("timeout".to_string()));
    transport.fail(Error::Unreachable("timeout".to_string()));
    transport.respond(json!({ "transcript": "xin chào", "response": "Chào bạn" }));
    let round_trip = CommandRoundTrip::new(transport.clone(), RetryPolicy::default());

    let result = round_trip.send(&clip(), None).await.unwrap();

    assert_eq!(result.reply, "Chào bạn");
    assert_eq!(transport.requests().len(), 3);
    // The same upload is retried, not a new one
    let ids: Vec<_> = transport.requests().iter().map(|r| r.request_id).collect();
    assert!(ids.iter().all(|id| *id == ids[0]));
}

#[tokio::test(start_paused = true)]
async fn test_service_errors_are_not_retried() {
    let transport = Arc::new(MockTransport::default());
    transport.fail(Error::Service {
        status: 500,
        body: "boom".to_string(),
    });
    let round_trip = CommandRoundTrip::new(transport.clone(), RetryPolicy::default());

    let err = round_trip.send(&clip(), None).await.unwrap_err();

    assert!(matches!(err, Error::Service { status: 500, .. }));
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_zero_retries_makes_one_attempt() {
    let transport = Arc::new(MockTransport::default());
    transport.fail(Error::Unreachable("down".to_string()));
    let round_trip = CommandRoundTrip::new(transport.clone(), RetryPolicy::with_max_retries(0));

    assert!(round_trip.send(&clip(), None).await.is_err());
    assert_eq!(transport.requests().len(), 1);
}

// Real sockets below: paused time would fire the client's timeouts early

#[tokio::test]
async fn test_http_transport_posts_clip_and_parses_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/voice/command"))
        .and(header("authorization", "Bearer secret-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "transcript": "nhắn cho Alice là xin chào",
            "response": "Bạn muốn gửi tin nhắn cho Alice phải không?",
            "needsConfirmation": true,
            "pending": {
                "type": "send_message",
                "conversationId": "c-1",
                "targetName": "Alice",
                "content": "xin chào"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let transport = HttpCommandTransport::new(&service_config(&server.uri())).unwrap();
    let round_trip = CommandRoundTrip::new(Arc::new(transport), RetryPolicy::default());

    let result = round_trip.send(&clip(), None).await.unwrap();

    assert!(result.needs_confirmation);
    assert!(matches!(result.pending, PendingUpdate::Set(ref action) if action.kind() == "send_message"));

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let upload: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(upload["mimeType"], "audio/wav");
    assert_eq!(upload["mode"], "fresh_command");
    assert_eq!(upload["sampleRate"], SAMPLE_RATE);
    assert!(upload.get("pending").is_none());
}

#[tokio::test]
async fn test_gateway_errors_are_answered_and_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/voice/command"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream busy"))
        .expect(1)
        .mount(&server)
        .await;

    let transport = HttpCommandTransport::new(&service_config(&server.uri())).unwrap();
    let round_trip = CommandRoundTrip::new(Arc::new(transport), RetryPolicy {
        max_retries: 3,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(10),
    });

    let err = round_trip.send(&clip(), None).await.unwrap_err();

    assert!(matches!(err, Error::Service { status: 503, ref body } if body == "upstream busy"));
}

#[tokio::test]
async fn test_answered_errors_keep_their_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/voice/command"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({ "error": "bad audio" })))
        .mount(&server)
        .await;
    let transport = HttpCommandTransport::new(&service_config(&server.uri())).unwrap();

    let err = transport
        .post_command(&CommandRequest::from_clip(&clip(), None))
        .await
        .unwrap_err();

    match err {
        Error::Service { status, body } => {
            assert_eq!(status, 422);
            assert!(body.contains("bad audio"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_connection_refused_is_unreachable() {
    // Bind then drop to get a port nothing listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let transport = HttpCommandTransport::new(&service_config(&url)).unwrap();
    let err = transport
        .post_command(&CommandRequest::from_clip(&clip(), None))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Unreachable(_)));
}

#[tokio::test]
async fn test_slow_service_times_out_as_unreachable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/voice/command"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;
    let config = ServiceConfig {
        timeout: Duration::from_millis(200),
        ..service_config(&server.uri())
    };
    let transport = HttpCommandTransport::new(&config).unwrap();

    let err = transport
        .post_command(&CommandRequest::from_clip(&clip(), None))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Unreachable(_)));
}

#[tokio::test]
async fn test_clear_pending_hits_clear_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/voice/pending/clear"))
        .and(header("authorization", "Bearer secret-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    let transport = HttpCommandTransport::new(&service_config(&server.uri())).unwrap();

    transport.clear_pending().await.unwrap();
}

#[tokio::test]
async fn test_unparseable_body_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/voice/command"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;
    let transport = HttpCommandTransport::new(&service_config(&server.uri())).unwrap();

    let err = transport
        .post_command(&CommandRequest::from_clip(&clip(), None))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InvalidResponse(_)));
}
