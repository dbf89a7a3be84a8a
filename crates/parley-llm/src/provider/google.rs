//! Google Gemini (Generative Language API) provider implementation

use std::ops::ControlFlow;

use async_trait::async_trait;
use parley_config::ProviderConfig;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use secrecy::SecretString;
use url::Url;

use super::http::HttpTransport;
use super::{Provider, ProviderCapabilities};
use crate::context::CallContext;
use crate::convert::google::{GoogleStreamState, build_request, into_chat_response};
use crate::error::LlmError;
use crate::protocol::google::GoogleResponse;
use crate::stream::StreamAccumulator;
use crate::types::options::merge_extras;
use crate::types::{ChatResponse, Request, StreamCallback};

/// Default Google Generative Language API base URL
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini provider
///
/// Tool-call ids it returns carry the vendor thought signature, see
/// [`tool_id`](crate::tool_id).
pub struct GoogleProvider {
    name: String,
    transport: HttpTransport,
    base_url: Url,
    api_key: Option<SecretString>,
    default_model: Option<String>,
    allow_missing_thought_signature: bool,
}

impl GoogleProvider {
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
            allow_missing_thought_signature: config.allow_missing_thought_signature,
        })
    }

    /// Build the URL for a model action
    fn model_url(&self, model: &str, streaming: bool) -> String {
        if streaming {
            super::endpoint(&self.base_url, &format!("models/{model}:streamGenerateContent?alt=sse"))
        } else {
            super::endpoint(&self.base_url, &format!("models/{model}:generateContent"))
        }
    }

    fn headers(&self) -> Result<HeaderMap, LlmError> {
        let key = super::require_api_key(&self.name, self.api_key.as_ref())?;
        let mut key = HeaderValue::from_str(key)
            .map_err(|_| LlmError::Config(format!("provider '{}': api_key is not a valid header value", self.name)))?;
        key.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static("x-goog-api-key"), key);

        Ok(headers)
    }

    async fn chat_stream(
        &self,
        body: &serde_json::Value,
        headers: HeaderMap,
        request: &Request,
        model: &str,
        callback: StreamCallback,
        context: &CallContext,
    ) -> Result<ChatResponse, LlmError> {
        let response = self
            .transport
            .post_stream(&self.model_url(model, true), headers, body, request.options(), context)
            .await?;

        let mut acc = StreamAccumulator::new(&self.name, callback);
        let mut state = GoogleStreamState::new(model);

        self.transport
            .read_sse(response, context, |event| {
                match serde_json::from_str::<GoogleResponse>(&event.data) {
                    Ok(chunk) => {
                        for event in state.convert_chunk(chunk) {
                            acc.push(event)?;
                        }
                    }
                    Err(e) => {
                        tracing::debug!(provider = %self.name, error = %e, data = %event.data, "skipping unparseable SSE chunk");
                    }
                }

                Ok(ControlFlow::Continue(()))
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
impl Provider for GoogleProvider {
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

        let wire = build_request(request, self.allow_missing_thought_signature)?;
        let mut body = serde_json::to_value(&wire)
            .map_err(|e| LlmError::transport(&self.name, format!("failed to encode request: {e}")))?;
        merge_extras(&mut body, &request.options().extras.google);

        if let Some(callback) = request.options().stream.clone() {
            return self.chat_stream(&body, headers, request, model, callback, context).await;
        }

        let raw = self
            .transport
            .post_json(&self.model_url(model, false), headers, &body, request.options(), context)
            .await?;

        let wire_response: GoogleResponse = serde_json::from_value(raw.clone())
            .map_err(|e| LlmError::transport(&self.name, format!("failed to parse response: {e}")))?;

        Ok(into_chat_response(wire_response, model, raw))
    }
}
