mod harness;

use std::sync::{Arc, Mutex};

use harness::ConfigBuilder;
use harness::mock_llm::{MockLlm, MockReply};
use parley_llm::{LlmError, Message, Request, Usage};

#[tokio::test]
async fn chat_returns_text_usage_and_raw_payload() {
    let mock = MockLlm::start().await.unwrap();
    let client = ConfigBuilder::new().with_openai_provider("openai", &mock.base_url()).client();

    let request = Request::builder()
        .message(Message::system("be brief"))
        .message(Message::user("Hello"))
        .temperature(0.2)
        .build()
        .unwrap();

    let response = client.chat_once(&request).await.unwrap();

    assert_eq!(response.text, "Hello from mock LLM");
    assert_eq!(response.model, "mock-model-1");
    assert_eq!(response.usage, Usage::new(10, 5));
    assert_eq!(response.raw.as_ref().unwrap()["object"], "chat.completion");
    assert!(response.warnings.is_empty());

    let sent = &mock.requests()[0];
    assert_eq!(sent["model"], "mock-model-1");
    assert_eq!(sent["temperature"], 0.2);
    assert_eq!(sent["messages"][0], serde_json::json!({"role": "system", "content": "be brief"}));
}

#[tokio::test]
async fn default_provider_and_override_route_to_different_backends() {
    let primary = MockLlm::start_with(vec![MockReply::text("primary")]).await.unwrap();
    let secondary = MockLlm::start_with(vec![MockReply::text("secondary")]).await.unwrap();
    let client = ConfigBuilder::new()
        .with_openai_provider("primary", &primary.base_url())
        .with_openai_provider("secondary", &secondary.base_url())
        .with_default_provider("primary")
        .client();

    let plain = Request::builder().message(Message::user("hi")).build().unwrap();
    let routed = Request::builder()
        .provider("secondary")
        .message(Message::user("hi"))
        .build()
        .unwrap();

    assert_eq!(client.chat_once(&plain).await.unwrap().text, "primary");
    assert_eq!(client.chat_once(&routed).await.unwrap().text, "secondary");
}

#[tokio::test]
async fn vendor_error_surfaces_status_and_body() {
    let mock = MockLlm::start_with(vec![MockReply::Error {
        status: 503,
        message: "overloaded".to_owned(),
    }])
    .await
    .unwrap();
    let client = ConfigBuilder::new().with_openai_provider("openai", &mock.base_url()).client();

    let request = Request::builder().message(Message::user("hi")).build().unwrap();
    let err = client.chat_once(&request).await.unwrap_err();

    match err {
        LlmError::Provider { provider, status, message, body } => {
            assert_eq!(provider, "openai");
            assert_eq!(status, Some(503));
            assert!(message.contains("overloaded"));
            assert!(body.unwrap().contains("mock_error"));
        }
        other => panic!("expected provider error, got {other:?}"),
    }

    // No retries
    assert_eq!(mock.requests().len(), 1);
}

#[tokio::test]
async fn native_tool_call_keeps_vendor_id() {
    let mock = MockLlm::start_with(vec![MockReply::tool_call("get_weather", r#"{"city":"Tokyo"}"#)])
        .await
        .unwrap();
    let client = ConfigBuilder::new().with_openai_provider("openai", &mock.base_url()).client();

    let request = Request::builder()
        .message(Message::user("weather?"))
        .tool(parley_llm::Tool::function(
            "get_weather",
            "Current weather",
            serde_json::json!({"type": "object", "properties": {"days": {"type": ["array", "null"]}}}),
        ))
        .build()
        .unwrap();

    let response = client.chat_once(&request).await.unwrap();

    assert_eq!(response.tool_calls[0].id, "call_mock_1");
    assert_eq!(response.tool_calls[0].function.arguments, r#"{"city":"Tokyo"}"#);

    // Array-typed schema nodes always carry items on the wire
    let sent = &mock.requests()[0];
    assert_eq!(
        sent["tools"][0]["function"]["parameters"]["properties"]["days"]["items"],
        serde_json::json!({})
    );
}

#[tokio::test]
async fn debug_sink_sees_request_and_response() {
    let mock = MockLlm::start().await.unwrap();
    let client = ConfigBuilder::new().with_openai_provider("openai", &mock.base_url()).client();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let request = Request::builder()
        .message(Message::user("hi"))
        .on_debug(move |label, payload| sink.lock().unwrap().push((label.to_owned(), payload.to_owned())))
        .build()
        .unwrap();

    client.chat_once(&request).await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].0, "openai.chat.request");
    assert!(seen[0].1.contains("\"messages\""));
    assert_eq!(seen[1].0, "openai.chat.response");
    assert!(seen[1].1.contains("Hello from mock LLM"));
}
