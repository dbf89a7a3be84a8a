//! Anthropic Messages API provider implementation

use std::ops::ControlFlow;

use async_trait::async_trait;
use parley_config::ProviderConfig;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use secrecy::SecretString;
use url::Url;

use super::http::HttpTransport;
use super::{Provider, ProviderCapabilities};
use crate::context::CallContext;
use crate::convert::anthropic::{AnthropicStreamState, build_request, into_chat_response};
use crate::error::LlmError;
use crate::protocol::anthropic::{AnthropicResponse, AnthropicStreamEvent};
use crate::stream::StreamAccumulator;
use crate::types::options::merge_extras;
use crate::types::{ChatResponse, Request, StreamCallback};

/// Default Anthropic API base URL
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

/// Anthropic API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API provider
pub struct AnthropicProvider {
    name: String,
    transport: HttpTransport,
    base_url: Url,
    api_key: Option<SecretString>,
    default_model: Option<String>,
}

impl AnthropicProvider {
    /// Create from provider configuration
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Config` if the HTTP client cannot be built
    pub fn new(name: impl Into<String>, config: &ProviderConfig) -> Result<Self, LlmError> {
        let name = name.into();
        let transport = HttpTransport::new(&name, &config.http)?;
        Self::with_transport(name, config, transport)
    }

    /// Create around a caller-supplied HTTP client
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Config` if the default base URL cannot be parsed
    pub fn with_client(name: impl Into<String>, config: &ProviderConfig, client: reqwest::Client) -> Result<Self, LlmError> {
        let name = name.into();
        let transport = HttpTransport::with_client(&name, client, &config.http);
        Self::with_transport(name, config, transport)
    }

    fn with_transport(name: String, config: &ProviderConfig, transport: HttpTransport) -> Result<Self, LlmError> {
        let base_url = match &config.base_url {
            Some(url) => url.clone(),
            None => Url::parse(DEFAULT_BASE_URL).map_err(|e| LlmError::Config(e.to_string()))?,
        };

        Ok(Self {
            name,
            transport,
            base_url,
            api_key: config.api_key.clone(),
            default_model: config.default_model.clone(),
        })
    }

    /// Build the messages endpoint URL
    fn messages_url(&self) -> String {
        super::endpoint(&self.base_url, "messages")
    }

    fn headers(&self) -> Result<HeaderMap, LlmError> {
        let key = super::require_api_key(&self.name, self.api_key.as_ref())?;
        let mut key = HeaderValue::from_str(key)
            .map_err(|_| LlmError::Config(format!("provider '{}': api_key is not a valid header value", self.name)))?;
        key.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static("x-api-key"), key);
        headers.insert(
            HeaderName::from_static("anthropic-version"),
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        Ok(headers)
    }

    async fn chat_stream(
        &self,
        body: &serde_json::Value,
        headers: HeaderMap,
        request: &Request,
        callback: StreamCallback,
        context: &CallContext,
    ) -> Result<ChatResponse, LlmError> {
        let response = self
            .transport
            .post_stream(&self.messages_url(), headers, body, request.options(), context)
            .await?;

        let mut acc = StreamAccumulator::new(&self.name, callback);
        let mut state = AnthropicStreamState::new();

        self.transport
            .read_sse(response, context, |event| {
                let parsed = match serde_json::from_str::<AnthropicStreamEvent>(&event.data) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        tracing::debug!(provider = %self.name, error = %e, data = %event.data, "skipping unparseable SSE event");
                        return Ok(ControlFlow::Continue(()));
                    }
                };

                let stop = matches!(parsed, AnthropicStreamEvent::MessageStop);

                let events = state.convert_event(parsed).map_err(|error| {
                    tracing::warn!(provider = %self.name, error_type = %error.error_type, "vendor reported stream error");
                    LlmError::Provider {
                        provider: self.name.clone(),
                        status: None,
                        message: format!("{}: {}", error.error_type, error.message),
                        body: Some(event.data.clone()),
                    }
                })?;

                for event in events {
                    acc.push(event)?;
                }

                Ok(if stop { ControlFlow::Break(()) } else { ControlFlow::Continue(()) })
            })
            .await?;

        acc.set_model(state.model());
        if let Some(reason) = state.finish_reason() {
            acc.set_finish_reason(reason);
        }

        acc.finish()
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            streaming: true,
            tool_calling: true,
        }
    }

    async fn chat(&self, request: &Request, context: &CallContext) -> Result<ChatResponse, LlmError> {
        let model = super::resolve_model(&self.name, request, self.default_model.as_deref())?;
        let headers = self.headers()?;

        let wire = build_request(request, model)?;
        let mut body = serde_json::to_value(&wire)
            .map_err(|e| LlmError::transport(&self.name, format!("failed to encode request: {e}")))?;
        merge_extras(&mut body, &request.options().extras.anthropic);

        if let Some(callback) = request.options().stream.clone() {
            return self.chat_stream(&body, headers, request, callback, context).await;
        }

        let raw = self
            .transport
            .post_json(&self.messages_url(), headers, &body, request.options(), context)
            .await?;

        let wire_response: AnthropicResponse = serde_json::from_value(raw.clone())
            .map_err(|e| LlmError::transport(&self.name, format!("failed to parse response: {e}")))?;

        Ok(into_chat_response(wire_response, raw))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use parley_config::ProviderType;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::types::{Message, StreamEvent, Usage};

    fn provider(server: &MockServer) -> AnthropicProvider {
        let mut config = ProviderConfig::new(ProviderType::Anthropic);
        config.base_url = Some(Url::parse(&format!("{}/v1", server.uri())).unwrap());
        config.api_key = Some(SecretString::from("sk-ant"));
        AnthropicProvider::new("anthropic", &config).unwrap()
    }

    #[tokio::test]
    async fn chat_sends_version_and_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-ant"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .and(body_partial_json(json!({"model": "claude-test", "system": "be nice"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "msg_1",
                "type": "message",
                "role": "assistant",
                "model": "claude-test",
                "content": [{"type": "text", "text": "hello"}],
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 3, "output_tokens": 1}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let request = Request::builder()
            .model("claude-test")
            .message(Message::system("be nice"))
            .message(Message::user("hi"))
            .build()
            .unwrap();

        let response = provider(&server).chat(&request, &CallContext::new()).await.unwrap();
        assert_eq!(response.text, "hello");
        assert_eq!(response.usage, Usage::new(3, 1));
    }

    #[tokio::test]
    async fn missing_key_fails_before_network() {
        let provider = AnthropicProvider::new("anthropic", &ProviderConfig::new(ProviderType::Anthropic)).unwrap();
        let request = Request::builder().model("m").message(Message::user("hi")).build().unwrap();

        let err = provider.chat(&request, &CallContext::new()).await.unwrap_err();
        assert!(matches!(err, LlmError::Config(_)));
    }

    #[tokio::test]
    async fn streams_tool_call() {
        let server = MockServer::start().await;
        let sse = [
            ("message_start", json!({"type": "message_start", "message": {"id": "m", "type": "message", "role": "assistant", "model": "claude-test", "usage": {"input_tokens": 5, "output_tokens": 0}}})),
            ("content_block_start", json!({"type": "content_block_start", "index": 0, "content_block": {"type": "tool_use", "id": "toolu_1", "name": "get_weather", "input": {}}})),
            ("content_block_delta", json!({"type": "content_block_delta", "index": 0, "delta": {"type": "input_json_delta", "partial_json": "{\"city\":"}})),
            ("content_block_delta", json!({"type": "content_block_delta", "index": 0, "delta": {"type": "input_json_delta", "partial_json": "\"Paris\"}"}})),
            ("content_block_stop", json!({"type": "content_block_stop", "index": 0})),
            ("message_delta", json!({"type": "message_delta", "delta": {"stop_reason": "tool_use"}, "usage": {"output_tokens": 8}})),
            ("message_stop", json!({"type": "message_stop"})),
        ]
        .iter()
        .map(|(name, data)| format!("event: {name}\ndata: {data}\n\n"))
        .collect::<String>();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
            .mount(&server)
            .await;

        let done = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&done);
        let request = Request::builder()
            .model("claude-test")
            .message(Message::user("weather?"))
            .on_stream(move |event| {
                if let StreamEvent::Done(usage) = event {
                    *sink.lock().unwrap() = Some(*usage);
                }
                Ok(())
            })
            .build()
            .unwrap();

        let response = provider(&server).chat(&request, &CallContext::new()).await.unwrap();

        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].id, "toolu_1");
        assert_eq!(response.tool_calls[0].function.arguments, r#"{"city":"Paris"}"#);
        assert_eq!(response.model, "claude-test");
        assert_eq!(*done.lock().unwrap(), Some(Usage::new(5, 8)));
    }
}
