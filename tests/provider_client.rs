use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use replygate::error::FailureKind;
use replygate::generation::{
    ApiKey, GeminiClient, GenerationError, MalformedResponse, ProviderSettings, ReplyGenerator,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const KEY: &str = "test-secret-key-123";

#[derive(Clone, Default)]
struct Seen {
    keys: Arc<Mutex<Vec<String>>>,
    bodies: Arc<Mutex<Vec<Value>>>,
}

/// Start a stub provider answering every POST with `status` and `body`.
async fn stub_provider(status: StatusCode, body: String) -> (String, Seen) {
    let seen = Seen::default();
    let app = Router::new()
        .route(
            "/v1/models/test:generateContent",
            post(
                move |State(seen): State<Seen>,
                      Query(query): Query<HashMap<String, String>>,
                      Json(request): Json<Value>| {
                    let body = body.clone();
                    async move {
                        if let Some(key) = query.get("key") {
                            seen.keys.lock().unwrap().push(key.clone());
                        }
                        seen.bodies.lock().unwrap().push(request);
                        (status, body)
                    }
                },
            ),
        )
        .with_state(seen.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}/v1/models/test:generateContent"), seen)
}

fn client(url: String) -> GeminiClient {
    let settings = ProviderSettings::new(Some(url), Some(ApiKey::new(KEY)))
        .with_timeout(Duration::from_secs(5));
    GeminiClient::new(settings).unwrap()
}

fn reply_body(text: &str) -> String {
    json!({
        "candidates": [{ "content": { "parts": [{ "text": text }] } }]
    })
    .to_string()
}

#[tokio::test]
async fn test_success_returns_text() {
    let (url, seen) = stub_provider(StatusCode::OK, reply_body("Hi there")).await;

    let text = client(url).generate("Write a reply").await.unwrap();
    assert_eq!(text, "Hi there");

    assert_eq!(seen.keys.lock().unwrap().as_slice(), [KEY.to_string()]);
    let request = seen.bodies.lock().unwrap()[0].clone();
    assert_eq!(request["contents"][0]["parts"][0]["text"], "Write a reply");
    assert_eq!(request["generationConfig"]["maxOutputTokens"], 1000);
    assert_eq!(request["generationConfig"]["topK"], 40);
    assert_eq!(request["safetySettings"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_empty_candidates_is_malformed() {
    let (url, _) = stub_provider(StatusCode::OK, json!({ "candidates": [] }).to_string()).await;

    let err = client(url).generate("prompt").await.unwrap_err();
    assert_eq!(err.kind(), FailureKind::MalformedResponse);
    assert!(matches!(
        err,
        GenerationError::Malformed(MalformedResponse::EmptyCandidates { .. })
    ));
}

#[tokio::test]
async fn test_error_status_carries_body() {
    let (url, _) = stub_provider(
        StatusCode::INTERNAL_SERVER_ERROR,
        r#"{"error":{"message":"backend exploded"}}"#.to_string(),
    )
    .await;

    let err = client(url).generate("prompt").await.unwrap_err();
    match &err {
        GenerationError::Provider { status, body } => {
            assert_eq!(*status, 500);
            assert!(body.contains("backend exploded"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.kind(), FailureKind::Provider);
}

#[tokio::test]
async fn test_key_echoed_by_provider_is_redacted() {
    let (url, _) = stub_provider(
        StatusCode::BAD_REQUEST,
        format!(r#"{{"error":"API key {KEY} not valid"}}"#),
    )
    .await;

    let err = client(url).generate("prompt").await.unwrap_err();
    let rendered = format!("{err} {err:?}");
    assert!(!rendered.contains(KEY));
    assert!(rendered.contains("[REDACTED]"));
}

#[tokio::test]
async fn test_missing_text_is_malformed() {
    let body = json!({ "candidates": [{ "content": { "parts": [{}] } }] }).to_string();
    let (url, _) = stub_provider(StatusCode::OK, body).await;

    let err = client(url).generate("prompt").await.unwrap_err();
    assert!(matches!(
        err,
        GenerationError::Malformed(MalformedResponse::MissingText { .. })
    ));
}

#[tokio::test]
async fn test_slow_provider_times_out_as_connection_error() {
    let app = Router::new().route(
        "/v1/models/slow:generateContent",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            (StatusCode::OK, reply_body("too late"))
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let settings = ProviderSettings::new(
        Some(format!("http://{addr}/v1/models/slow:generateContent")),
        Some(ApiKey::new(KEY)),
    )
    .with_timeout(Duration::from_secs(1));
    let client = GeminiClient::new(settings).unwrap();

    let started = std::time::Instant::now();
    let err = client.generate("prompt").await.unwrap_err();

    assert!(started.elapsed() < Duration::from_millis(2500));
    assert_eq!(err.kind(), FailureKind::Connection);
    assert!(!err.to_string().contains(KEY));
}
