//! Dispatcher mapping provider names to adapters

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parley_config::{LlmConfig, ProviderType};

use crate::context::CallContext;
use crate::emulation;
use crate::error::LlmError;
use crate::provider::Provider;
use crate::provider::anthropic::AnthropicProvider;
use crate::provider::google::GoogleProvider;
use crate::provider::openai::OpenAiProvider;
use crate::types::{ChatResponse, Request};

/// Provider used when neither the request nor the client names one
pub const FALLBACK_PROVIDER: &str = "openai";

/// Entry point for chat calls
///
/// Immutable after construction and cheap to clone; share it freely across
/// tasks.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    providers: HashMap<String, Arc<dyn Provider>>,
    default_provider: Option<String>,
}

impl Client {
    /// Start building a client by hand
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Build one adapter per configured provider
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let mut builder = Self::builder();

        for (name, provider_config) in &config.providers {
            let provider: Arc<dyn Provider> = match provider_config.provider_type {
                ProviderType::Openai => Arc::new(OpenAiProvider::new(name.clone(), provider_config)?),
                ProviderType::Anthropic => Arc::new(AnthropicProvider::new(name.clone(), provider_config)?),
                ProviderType::Google => Arc::new(GoogleProvider::new(name.clone(), provider_config)?),
            };

            tracing::debug!(provider = %name, provider_type = provider_config.provider_type.as_str(), "registered provider");
            builder = builder.provider(name.clone(), provider);
        }

        if let Some(default) = &config.default_provider {
            builder = builder.default_provider(default.clone());
        }

        Ok(builder.build())
    }

    /// Load a TOML configuration file and build the client from it
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LlmError> {
        let config = LlmConfig::load(path.as_ref()).map_err(|e| LlmError::Config(format!("{e:#}")))?;
        Self::from_config(&config)
    }

    /// Names of the registered providers
    pub fn provider_names(&self) -> impl Iterator<Item = &str> {
        self.inner.providers.keys().map(String::as_str)
    }

    /// Adapter a request would be dispatched to
    ///
    /// Precedence: the request's override, then the client default, then
    /// [`FALLBACK_PROVIDER`].
    pub fn resolve_provider(&self, request: &Request) -> Result<Arc<dyn Provider>, LlmError> {
        let name = request
            .provider()
            .filter(|p| !p.is_empty())
            .or(self.inner.default_provider.as_deref())
            .unwrap_or(FALLBACK_PROVIDER);

        self.inner
            .providers
            .get(name)
            .cloned()
            .ok_or_else(|| LlmError::Config(format!("unknown provider '{name}'")))
    }

    /// Perform a chat call, emulating tool calls when the request asks for it
    ///
    /// A failure at any stage aborts the call; no partial response is
    /// returned.
    pub async fn chat(&self, request: &Request, context: &CallContext) -> Result<ChatResponse, LlmError> {
        let provider = self.resolve_provider(request)?;
        emulation::chat(provider.as_ref(), request, context).await
    }

    /// [`chat`](Self::chat) with a context that is never cancelled
    pub async fn chat_once(&self, request: &Request) -> Result<ChatResponse, LlmError> {
        self.chat(request, &CallContext::new()).await
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.provider_names().collect();
        names.sort_unstable();
        f.debug_struct("Client")
            .field("providers", &names)
            .field("default_provider", &self.inner.default_provider)
            .finish()
    }
}

/// Builder for [`Client`]
#[derive(Default)]
#[must_use]
pub struct ClientBuilder {
    providers: HashMap<String, Arc<dyn Provider>>,
    default_provider: Option<String>,
}

impl ClientBuilder {
    /// Register an adapter under `name`, replacing any previous one
    pub fn provider(mut self, name: impl Into<String>, provider: Arc<dyn Provider>) -> Self {
        self.providers.insert(name.into(), provider);
        self
    }

    /// Provider used when a request carries no override
    pub fn default_provider(mut self, name: impl Into<String>) -> Self {
        self.default_provider = Some(name.into());
        self
    }

    /// Finish the client
    pub fn build(self) -> Client {
        Client {
            inner: Arc::new(ClientInner {
                providers: self.providers,
                default_provider: self.default_provider,
            }),
        }
    }
}

/// One call straight to the adapter, checking capabilities first
pub(crate) async fn dispatch(
    provider: &dyn Provider,
    request: &Request,
    context: &CallContext,
) -> Result<ChatResponse, LlmError> {
    context.check()?;

    let capabilities = provider.capabilities();
    if request.options().is_streaming() && !capabilities.streaming {
        return Err(LlmError::unsupported(provider.name(), "streaming"));
    }
    if request.has_tools() && !capabilities.tool_calling {
        return Err(LlmError::unsupported(provider.name(), "tool calling"));
    }

    provider.chat(request, context).await
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use parley_config::ProviderConfig;

    use super::*;
    use crate::provider::ProviderCapabilities;
    use crate::stream::StreamAccumulator;
    use crate::types::{Message, StreamEvent, ToolCallDelta, Usage};

    /// Scripted provider recording every request it receives
    pub(crate) struct ScriptedProvider {
        name: String,
        capabilities: ProviderCapabilities,
        replies: Mutex<VecDeque<ChatResponse>>,
        pub(crate) seen: Mutex<Vec<Request>>,
    }

    impl ScriptedProvider {
        pub(crate) fn new(name: &str, replies: impl IntoIterator<Item = ChatResponse>) -> Self {
            Self {
                name: name.to_owned(),
                capabilities: ProviderCapabilities {
                    streaming: true,
                    tool_calling: true,
                },
                replies: Mutex::new(replies.into_iter().collect()),
                seen: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn with_capabilities(mut self, streaming: bool, tool_calling: bool) -> Self {
            self.capabilities = ProviderCapabilities { streaming, tool_calling };
            self
        }

        pub(crate) fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            &self.name
        }

        fn capabilities(&self) -> ProviderCapabilities {
            self.capabilities
        }

        async fn chat(&self, request: &Request, _context: &CallContext) -> Result<ChatResponse, LlmError> {
            self.seen.lock().unwrap().push(request.clone());
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| LlmError::transport(&self.name, "no scripted reply left"))?;

            // Stream the reply as one delta per text and tool call
            if let Some(callback) = request.options().stream.clone() {
                let mut acc = StreamAccumulator::new(self.name.clone(), callback);
                if !reply.text.is_empty() {
                    acc.push(StreamEvent::Delta(reply.text.clone()))?;
                }
                for (index, call) in (0_u32..).zip(&reply.tool_calls) {
                    acc.push(StreamEvent::ToolCallDelta(ToolCallDelta {
                        index,
                        id: Some(call.id.clone()),
                        name: Some(call.function.name.clone()),
                        args_chunk: call.function.arguments.clone(),
                    }))?;
                }
                acc.push(StreamEvent::Done(reply.usage))?;
                acc.finish()?;
            }
            Ok(reply)
        }
    }

    pub(crate) fn reply(text: &str) -> ChatResponse {
        ChatResponse {
            text: text.to_owned(),
            model: "scripted".to_owned(),
            usage: Usage::new(1, 1),
            ..ChatResponse::default()
        }
    }

    fn request() -> Request {
        Request::builder().message(Message::user("hi")).build().unwrap()
    }

    #[tokio::test]
    async fn falls_back_to_openai() {
        let openai = Arc::new(ScriptedProvider::new("openai", [reply("from openai")]));
        let client = Client::builder().provider("openai", openai.clone()).build();

        let response = client.chat_once(&request()).await.unwrap();
        assert_eq!(response.text, "from openai");
        assert_eq!(openai.calls(), 1);
    }

    #[tokio::test]
    async fn request_override_beats_client_default() {
        let a = Arc::new(ScriptedProvider::new("a", [reply("a")]));
        let b = Arc::new(ScriptedProvider::new("b", [reply("b"), reply("b again")]));
        let client = Client::builder()
            .provider("a", a.clone())
            .provider("b", b.clone())
            .default_provider("b")
            .build();

        let routed = Request::builder().provider("a").message(Message::user("hi")).build().unwrap();
        assert_eq!(client.chat_once(&routed).await.unwrap().text, "a");
        assert_eq!(client.chat_once(&request()).await.unwrap().text, "b");
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 1);
    }

    #[tokio::test]
    async fn unknown_provider_is_config_error() {
        let client = Client::builder().default_provider("missing").build();
        let err = client.chat_once(&request()).await.unwrap_err();
        assert!(matches!(err, LlmError::Config(ref msg) if msg.contains("missing")));
    }

    #[tokio::test]
    async fn streaming_on_non_streaming_provider_is_unsupported() {
        let provider = Arc::new(ScriptedProvider::new("openai", [reply("x")]).with_capabilities(false, true));
        let client = Client::builder().provider("openai", provider.clone()).build();

        let request = Request::builder()
            .message(Message::user("hi"))
            .on_stream(|_| Ok(()))
            .build()
            .unwrap();

        let err = client.chat_once(&request).await.unwrap_err();
        assert!(matches!(err, LlmError::Unsupported { ref capability, .. } if capability == "streaming"));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn cancelled_context_fails_before_dispatch() {
        let provider = Arc::new(ScriptedProvider::new("openai", [reply("x")]));
        let client = Client::builder().provider("openai", provider.clone()).build();

        let context = CallContext::new();
        context.cancel();
        let err = client.chat(&request(), &context).await.unwrap_err();

        assert!(matches!(err, LlmError::Cancelled));
        assert_eq!(provider.calls(), 0);
    }

    #[test]
    fn from_config_registers_every_provider() {
        let mut config = LlmConfig::default();
        config.providers.insert("fast".to_owned(), ProviderConfig::new(ProviderType::Openai));
        config.providers.insert("claude".to_owned(), ProviderConfig::new(ProviderType::Anthropic));
        config.providers.insert("gemini".to_owned(), ProviderConfig::new(ProviderType::Google));
        config.default_provider = Some("claude".to_owned());

        let client = Client::from_config(&config).unwrap();
        let mut names: Vec<&str> = client.provider_names().collect();
        names.sort_unstable();
        assert_eq!(names, ["claude", "fast", "gemini"]);

        let resolved = client.resolve_provider(&request()).unwrap();
        assert_eq!(resolved.name(), "claude");
    }
}
