//! Integration tests for backend clients against stub servers

use recall_ai::{
    BackendClient, BackendKind, ClientOptions, ConversationHistory, TruncationPolicy,
    create_backend,
};
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn disable_system_proxy_for_tests() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        // Safety: set once for the process before any HTTP clients are built.
        unsafe {
            std::env::set_var("RECALL_DISABLE_SYSTEM_PROXY", "1");
        }
    });
}

#[tokio::test]
async fn test_truncated_payload_reaches_the_wire() {
    disable_system_proxy_for_tests();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "<skip_summary/>"}}],
            "usage": {"total_tokens": 12}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut history = ConversationHistory::new();
    history.push_user("o".repeat(4000));
    history.push_assistant("r".repeat(4000));
    history.push_user("latest prompt");

    let payload = history.truncated(&TruncationPolicy::new(500));
    assert_eq!(payload.messages.len(), 1);

    let client = create_backend(BackendKind::OpenRouter, &ClientOptions::default()).unwrap();
    let mut config = BackendKind::OpenRouter.with_defaults(Default::default());
    config.api_key = Some("key".to_string());
    config.endpoint = Some(server.uri());

    let response = client.send(&payload.messages, &config).await.unwrap();
    assert_eq!(response.tokens_used, Some(12));

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(
        body["messages"],
        json!([{"role": "user", "content": "latest prompt"}])
    );
    assert_eq!(history.len(), 3);
}

#[tokio::test]
async fn test_gemini_stub_roundtrip_through_factory() {
    disable_system_proxy_for_tests();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [{"text": "<observation><type>change</type></observation>"}]}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = create_backend(
        BackendKind::Gemini,
        &ClientOptions {
            timeout_secs: Some(5),
            requests_per_minute: Some(600),
        },
    )
    .unwrap();
    let mut config = BackendKind::Gemini.with_defaults(Default::default());
    config.api_key = Some("key".to_string());
    config.endpoint = Some(server.uri());

    let mut history = ConversationHistory::new();
    history.push_user("prompt");
    let response = client.send(history.messages(), &config).await.unwrap();

    assert!(response.content.unwrap().contains("<type>change</type>"));
    assert!(response.tokens_used.is_none());
}

#[tokio::test]
#[ignore] // Requires ANTHROPIC_API_KEY environment variable
async fn test_live_claude() {
    disable_system_proxy_for_tests();
    let api_key = std::env::var("ANTHROPIC_API_KEY").expect("ANTHROPIC_API_KEY required");

    let client = create_backend(BackendKind::Claude, &ClientOptions::default()).unwrap();
    let mut config = BackendKind::Claude.with_defaults(Default::default());
    config.api_key = Some(api_key);

    let mut history = ConversationHistory::new();
    history.push_user("Reply with the single word: ready");
    let response = client.send(history.messages(), &config).await.unwrap();

    assert!(!response.is_empty());
    println!("Reply: {:?}", response.content);
}
