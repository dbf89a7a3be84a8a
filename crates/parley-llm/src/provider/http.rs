//! HTTP plumbing shared by the vendor adapters

use std::ops::ControlFlow;
use std::time::Duration;

use eventsource_stream::{Event, Eventsource};
use futures_util::StreamExt;
use parley_config::HttpSettings;
use reqwest::header::HeaderMap;
use reqwest::{Client, Response};

use crate::context::CallContext;
use crate::error::LlmError;
use crate::types::Options;

/// Longest vendor error body quoted in an error message
const MAX_ERROR_SNIPPET: usize = 512;

/// One adapter's HTTP client and limits
#[derive(Debug, Clone)]
pub(crate) struct HttpTransport {
    provider: String,
    client: Client,
    timeout: Duration,
    max_response_bytes: usize,
}

impl HttpTransport {
    /// Transport with a fresh client built from `settings`
    pub(crate) fn new(provider: &str, settings: &HttpSettings) -> Result<Self, LlmError> {
        let client = Client::builder()
            .build()
            .map_err(|e| LlmError::Config(format!("provider '{provider}': failed to build HTTP client: {e}")))?;

        Ok(Self::with_client(provider, client, settings))
    }

    /// Transport around a caller-supplied client
    pub(crate) fn with_client(provider: &str, client: Client, settings: &HttpSettings) -> Self {
        Self {
            provider: provider.to_owned(),
            client,
            timeout: settings.timeout,
            max_response_bytes: settings.max_response_bytes,
        }
    }

    /// POST a JSON body and return the parsed JSON response
    pub(crate) async fn post_json(
        &self,
        url: &str,
        headers: HeaderMap,
        body: &serde_json::Value,
        options: &Options,
        context: &CallContext,
    ) -> Result<serde_json::Value, LlmError> {
        self.trace_request(url, body, options);

        let request = self
            .client
            .post(url)
            .headers(headers)
            .timeout(self.timeout)
            .json(body);

        context
            .guard(async {
                let response = request.send().await.map_err(|e| self.send_failed(&e))?;
                let response = self.check_status(response).await?;
                let bytes = self.read_limited(response).await?;
                let text = String::from_utf8_lossy(&bytes);

                tracing::debug!(provider = %self.provider, body = %text, "vendor response");
                options.debug(&format!("{}.chat.response", self.provider), &text);

                serde_json::from_slice(&bytes).map_err(|e| {
                    LlmError::transport(&self.provider, format!("failed to parse response: {e}"))
                })
            })
            .await
    }

    /// POST a JSON body and return the open streaming response
    pub(crate) async fn post_stream(
        &self,
        url: &str,
        headers: HeaderMap,
        body: &serde_json::Value,
        options: &Options,
        context: &CallContext,
    ) -> Result<Response, LlmError> {
        self.trace_request(url, body, options);

        let request = self.client.post(url).headers(headers).json(body);

        context
            .guard(async {
                let response = tokio::time::timeout(self.timeout, request.send())
                    .await
                    .map_err(|_| {
                        tracing::error!(provider = %self.provider, "stream request timed out");
                        LlmError::transport(&self.provider, "timed out waiting for stream to open")
                    })?
                    .map_err(|e| self.send_failed(&e))?;

                self.check_status(response).await
            })
            .await
    }

    /// Read server-sent events until the stream ends or `on_event` breaks
    ///
    /// Every read races the call's cancellation token.
    pub(crate) async fn read_sse<F>(
        &self,
        response: Response,
        context: &CallContext,
        mut on_event: F,
    ) -> Result<(), LlmError>
    where
        F: FnMut(&Event) -> Result<ControlFlow<()>, LlmError>,
    {
        let mut events = response.bytes_stream().eventsource();

        loop {
            let next = tokio::select! {
                biased;
                () = context.token().cancelled() => return Err(LlmError::Cancelled),
                next = events.next() => next,
            };

            let Some(event) = next else {
                return Ok(());
            };

            let event = event.map_err(|e| {
                tracing::error!(provider = %self.provider, error = %e, "stream read failed");
                LlmError::transport(&self.provider, format!("stream read failed: {e}"))
            })?;

            if on_event(&event)?.is_break() {
                return Ok(());
            }
        }
    }

    fn trace_request(&self, url: &str, body: &serde_json::Value, options: &Options) {
        let payload = body.to_string();
        tracing::debug!(provider = %self.provider, url = %url, body = %payload, "vendor request");
        options.debug(&format!("{}.chat.request", self.provider), &payload);
    }

    fn send_failed(&self, error: &reqwest::Error) -> LlmError {
        tracing::error!(provider = %self.provider, error = %error, "vendor request failed");
        LlmError::transport(&self.provider, error.to_string())
    }

    /// Turn a non-success response into a provider error
    async fn check_status(&self, response: Response) -> Result<Response, LlmError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = self
            .read_limited(response)
            .await
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default();

        tracing::warn!(provider = %self.provider, status = %status, "vendor returned error");

        Err(LlmError::Provider {
            provider: self.provider.clone(),
            status: Some(status.as_u16()),
            message: error_message(status.as_u16(), &body),
            body: (!body.is_empty()).then_some(body),
        })
    }

    /// Buffer a response body, failing once it exceeds the configured cap
    async fn read_limited(&self, mut response: Response) -> Result<Vec<u8>, LlmError> {
        let too_large = || {
            LlmError::transport(
                &self.provider,
                format!("response body exceeds {} bytes", self.max_response_bytes),
            )
        };

        if response
            .content_length()
            .is_some_and(|len| len > self.max_response_bytes as u64)
        {
            return Err(too_large());
        }

        let mut buffer = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| LlmError::transport(&self.provider, format!("failed to read response: {e}")))?
        {
            if buffer.len() + chunk.len() > self.max_response_bytes {
                return Err(too_large());
            }
            buffer.extend_from_slice(&chunk);
        }

        Ok(buffer)
    }
}

/// Best human-readable message from a vendor error body
///
/// Understands `{"error": {"message": ...}}` (all three vendors) and
/// `{"error": "..."}`, falling back to a snippet of the raw body.
fn error_message(status: u16, body: &str) -> String {
    let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
    let message = parsed.as_ref().and_then(|value| {
        value
            .pointer("/error/message")
            .or_else(|| value.get("error"))
            .or_else(|| value.get("message"))
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned)
    });

    match message {
        Some(message) => format!("{status}: {message}"),
        None if body.is_empty() => format!("{status}"),
        None => {
            let snippet: String = body.chars().take(MAX_ERROR_SNIPPET).collect();
            format!("{status}: {snippet}")
        }
    }
}
