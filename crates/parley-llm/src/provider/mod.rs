//! Provider trait and vendor adapters

pub mod anthropic;
pub mod google;
pub(crate) mod http;
pub mod openai;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::context::CallContext;
use crate::error::LlmError;
use crate::types::{ChatResponse, Request};

/// Capabilities advertised by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderCapabilities {
    /// Whether the provider supports streaming responses
    pub streaming: bool,
    /// Whether the provider supports native tool/function calling
    pub tool_calling: bool,
}

/// Trait implemented by each vendor adapter
///
/// An adapter maps the IR onto its wire format, passes tool schemas
/// through [`schema::normalize`](crate::schema::normalize), returns tool
/// calls with their ids untouched and, when a stream callback is present
/// and it can stream, drives a [`StreamAccumulator`](crate::StreamAccumulator).
#[async_trait]
pub trait Provider: Send + Sync {
    /// Registered provider name
    fn name(&self) -> &str;

    /// Advertised capabilities
    fn capabilities(&self) -> ProviderCapabilities;

    /// Perform one chat call, streaming when the request carries a callback
    async fn chat(&self, request: &Request, context: &CallContext) -> Result<ChatResponse, LlmError>;
}

/// Model for a call: the request's, else the adapter default
pub(crate) fn resolve_model<'a>(
    provider: &str,
    request: &'a Request,
    default_model: Option<&'a str>,
) -> Result<&'a str, LlmError> {
    if !request.model().trim().is_empty() {
        return Ok(request.model());
    }

    default_model.filter(|m| !m.trim().is_empty()).ok_or_else(|| {
        LlmError::Config(format!(
            "provider '{provider}': request has no model and no default_model is configured"
        ))
    })
}

/// API key exposed for a header, or a configuration error
pub(crate) fn require_api_key<'a>(provider: &str, api_key: Option<&'a SecretString>) -> Result<&'a str, LlmError> {
    api_key
        .map(ExposeSecret::expose_secret)
        .filter(|key| !key.is_empty())
        .ok_or_else(|| LlmError::Config(format!("provider '{provider}': api_key is required")))
}

/// Join a path onto a base URL without doubling slashes
pub(crate) fn endpoint(base_url: &url::Url, path: &str) -> String {
    let base = base_url.as_str().trim_end_matches('/');
    format!("{base}/{}", path.trim_start_matches('/'))
}
