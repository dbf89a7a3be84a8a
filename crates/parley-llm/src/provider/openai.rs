//! OpenAI-compatible provider implementation

use std::ops::ControlFlow;

use async_trait::async_trait;
use parley_config::ProviderConfig;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use super::http::HttpTransport;
use super::{Provider, ProviderCapabilities};
use crate::context::CallContext;
use crate::convert::openai::{build_request, chunk_finish_reason, chunk_to_events, into_chat_response};
use crate::error::LlmError;
use crate::protocol::openai::{OpenAiResponse, OpenAiStreamChunk};
use crate::stream::StreamAccumulator;
use crate::types::options::merge_extras;
use crate::types::{ChatResponse, Request, StreamCallback};

/// Default `OpenAI` API base URL
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Whether the provider is the canonical OpenAI API (vs a compatible third-party)
fn is_canonical_openai(base_url: &Url) -> bool {
    base_url.host_str().is_some_and(|h| h == "api.openai.com")
}

/// OpenAI-compatible provider
///
/// Reference streaming adapter; also serves any server that speaks the
/// chat completions protocol.
pub struct OpenAiProvider {
    name: String,
    transport: HttpTransport,
    base_url: Url,
    api_key: Option<SecretString>,
    default_model: Option<String>,
}

impl OpenAiProvider {
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

    /// Build the chat completions URL
    fn completions_url(&self) -> String {
        super::endpoint(&self.base_url, "chat/completions")
    }

    /// Authorization headers; compatible servers may run without a key
    fn headers(&self) -> Result<HeaderMap, LlmError> {
        let mut headers = HeaderMap::new();

        let key = if is_canonical_openai(&self.base_url) {
            Some(super::require_api_key(&self.name, self.api_key.as_ref())?)
        } else {
            self.api_key
                .as_ref()
                .map(ExposeSecret::expose_secret)
                .filter(|k| !k.is_empty())
        };

        if let Some(key) = key {
            let value = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|_| LlmError::Config(format!("provider '{}': api_key is not a valid header value", self.name)))?;
            headers.insert(AUTHORIZATION, value);
        }

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
            .post_stream(&self.completions_url(), headers, body, request.options(), context)
            .await?;

        let mut acc = StreamAccumulator::new(&self.name, callback);

        self.transport
            .read_sse(response, context, |event| {
                let data = event.data.trim();
                if data == "[DONE]" {
                    return Ok(ControlFlow::Break(()));
                }

                match serde_json::from_str::<OpenAiStreamChunk>(data) {
                    Ok(chunk) => {
                        acc.set_model(chunk.model.clone());
                        if let Some(reason) = chunk_finish_reason(&chunk) {
                            acc.set_finish_reason(reason);
                        }
                        for event in chunk_to_events(&chunk) {
                            acc.push(event)?;
                        }
                    }
                    Err(e) => {
                        tracing::debug!(provider = %self.name, error = %e, data = %data, "skipping unparseable SSE chunk");
                    }
                }

                Ok(ControlFlow::Continue(()))
            })
            .await?;

        acc.finish()
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
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

        let wire = build_request(request, model, is_canonical_openai(&self.base_url));
        let mut body = serde_json::to_value(&wire)
            .map_err(|e| LlmError::transport(&self.name, format!("failed to encode request: {e}")))?;
        merge_extras(&mut body, &request.options().extras.openai);

        if let Some(callback) = request.options().stream.clone() {
            return self.chat_stream(&body, headers, request, callback, context).await;
        }

        let raw = self
            .transport
            .post_json(&self.completions_url(), headers, &body, request.options(), context)
            .await?;

        let wire_response: OpenAiResponse = serde_json::from_value(raw.clone())
            .map_err(|e| LlmError::transport(&self.name, format!("failed to parse response: {e}")))?;

        Ok(into_chat_response(wire_response, raw))
    }
}
