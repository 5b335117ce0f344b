//! HTTP-level tests for the relay client against a fake relay.

use futures::StreamExt;
use relay::{
    CompactionMode, Error, GenerateRequest, Relay, RelayConfig, StreamEvent, SummaryRequest,
};
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SSE_BODY: &str = "data: {\"type\":\"title\",\"value\":\"第 1 章\"}\n\n\
                        data: {\"type\":\"content\",\"value\":\"夜色如墨。\"}\n\n\
                        : keep-alive\n\n\
                        data: {\"type\":\"branches\",\"value\":\"[\\\"a\\\",\\\"b\\\",\\\"c\\\"]\"}\n\n\
                        data: {\"type\":\"complete\",\"value\":\"done\"}\n\n";

fn relay_for(server: &MockServer) -> Relay {
    Relay::new(RelayConfig::new(server.uri()).with_api_key("sk-test")).unwrap()
}

#[tokio::test]
async fn test_stream_parses_events() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate/stream"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(SSE_BODY),
        )
        .mount(&server)
        .await;

    let relay = relay_for(&server);
    let events: Vec<StreamEvent> = relay
        .stream(&GenerateRequest::new(1))
        .await
        .unwrap()
        .map(|e| e.unwrap())
        .collect()
        .await;

    assert_eq!(events.len(), 4);
    assert_eq!(events[0], StreamEvent::Title("第 1 章".to_string()));
    assert_eq!(events[1], StreamEvent::Content("夜色如墨。".to_string()));
    assert_eq!(events[2].kind(), "branches");
    assert_eq!(events[3].kind(), "complete");
}

#[tokio::test]
async fn test_stream_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate/stream"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&server)
        .await;

    let result = relay_for(&server).stream(&GenerateRequest::new(1)).await;
    match result {
        Err(Error::Status { status, message }) => {
            assert_eq!(status, 401);
            assert_eq!(message, "Unauthorized");
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("expected an error"),
    }
}

#[tokio::test]
async fn test_slow_relay_is_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(SSE_BODY)
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let config = RelayConfig::new(server.uri()).with_timeout(Duration::from_millis(200));
    let relay = Relay::new(config).unwrap();

    let result = relay.stream(&GenerateRequest::new(1)).await;
    assert!(matches!(result, Err(Error::Timeout)));
}

#[tokio::test]
async fn test_unreachable_relay_is_connection_failure() {
    let relay = Relay::new(RelayConfig::new("http://127.0.0.1:1")).unwrap();
    let result = relay.stream(&GenerateRequest::new(1)).await;
    match result {
        Err(e) => {
            assert!(!e.is_timeout());
            assert!(matches!(e, Error::Connect(_)), "got {e}");
        }
        Ok(_) => panic!("expected a connection failure"),
    }
}

#[tokio::test]
async fn test_summarize_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/summarize"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"summary": " 林默得到了信 "})),
        )
        .mount(&server)
        .await;

    let summary = relay_for(&server)
        .summarize(&SummaryRequest::Compact {
            ledger: "a\nb".to_string(),
            mode: CompactionMode::Phase,
        })
        .await
        .unwrap();

    assert_eq!(summary, "林默得到了信");
}

#[tokio::test]
async fn test_summarize_bad_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/summarize"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"text": "x"})))
        .mount(&server)
        .await;

    let result = relay_for(&server)
        .summarize(&SummaryRequest::ExtractAnchor {
            title: "t".to_string(),
            content: "c".to_string(),
        })
        .await;

    assert!(matches!(result, Err(Error::Parse(_))));
}
