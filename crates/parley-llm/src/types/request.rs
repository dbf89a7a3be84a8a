use std::collections::HashSet;
use std::sync::Arc;

use super::message::{Message, Role};
use super::options::{EmulationMode, Options};
use super::stream::StreamEvent;
use super::tool::{Tool, ToolChoice};
use crate::error::LlmError;

/// Validated, immutable chat request
///
/// Built with [`Request::builder`]; validation runs once in
/// [`RequestBuilder::build`] and fails on the first violation.
#[derive(Debug, Clone)]
pub struct Request {
    pub(crate) provider: Option<String>,
    pub(crate) model: String,
    pub(crate) messages: Vec<Message>,
    pub(crate) options: Options,
    pub(crate) tools: Vec<Tool>,
    pub(crate) tool_choice: Option<ToolChoice>,
}

impl Request {
    /// Start building a request
    pub fn builder() -> RequestBuilder {
        RequestBuilder::default()
    }

    /// Provider override, if any
    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    /// Requested model; empty means the adapter's default
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Conversation in order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Generation options
    pub const fn options(&self) -> &Options {
        &self.options
    }

    /// Tools offered to the model
    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    /// Tool choice, if set
    pub const fn tool_choice(&self) -> Option<&ToolChoice> {
        self.tool_choice.as_ref()
    }

    /// Whether any tools are offered
    pub fn has_tools(&self) -> bool {
        !self.tools.is_empty()
    }

    /// Look up an offered tool by name
    pub fn tool(&self, name: &str) -> Option<&Tool> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Copy of this request with tools and tool choice removed
    pub(crate) fn without_tools(&self) -> Self {
        Self {
            tools: Vec::new(),
            tool_choice: None,
            ..self.clone()
        }
    }

    /// Copy of this request with the stream callback removed
    pub(crate) fn without_stream(mut self) -> Self {
        self.options.stream = None;
        self
    }

    /// Check every invariant, returning the first violation
    pub(crate) fn validate(&self) -> Result<(), LlmError> {
        if self.messages.is_empty() {
            return Err(LlmError::Validation("messages required".to_owned()));
        }

        let mut known_call_ids: HashSet<&str> = HashSet::new();

        for (index, message) in self.messages.iter().enumerate() {
            if message.role != Role::User
                && let Some(part) = message.content_parts().iter().find(|p| !p.is_text())
            {
                return Err(LlmError::Validation(format!(
                    "message {index} ({}): {} parts are only allowed in user messages",
                    message.role,
                    part.kind()
                )));
            }

            if !message.tool_calls().is_empty() && message.role != Role::Assistant {
                return Err(LlmError::Validation(format!(
                    "message {index} ({}): only assistant messages may carry tool_calls",
                    message.role
                )));
            }

            match (message.role, message.tool_call_id.as_deref()) {
                (Role::Tool, None) => {
                    return Err(LlmError::Validation(format!(
                        "message {index} (tool): tool_call_id required"
                    )));
                }
                (Role::Tool, Some(id)) if !known_call_ids.contains(id) => {
                    return Err(LlmError::Validation(format!(
                        "message {index} (tool): tool_call_id '{id}' does not match any earlier assistant tool call"
                    )));
                }
                (role, Some(_)) if role != Role::Tool => {
                    return Err(LlmError::Validation(format!(
                        "message {index} ({role}): only tool messages may carry tool_call_id"
                    )));
                }
                _ => {}
            }

            known_call_ids.extend(message.tool_calls().iter().map(|c| c.id.as_str()));
        }

        let mut names = HashSet::new();
        for tool in &self.tools {
            if tool.name.trim().is_empty() {
                return Err(LlmError::Validation("tool names must not be empty".to_owned()));
            }
            if !names.insert(tool.name.as_str()) {
                return Err(LlmError::Validation(format!("duplicate tool name '{}'", tool.name)));
            }
        }

        if let Some(ToolChoice::Function(name)) = &self.tool_choice
            && !names.contains(name.as_str())
        {
            return Err(LlmError::Validation(format!(
                "tool_choice names '{name}', which is not one of the request's tools"
            )));
        }

        Ok(())
    }
}

/// Functional-options builder for [`Request`]
#[derive(Debug, Default)]
#[must_use]
pub struct RequestBuilder {
    request: RequestParts,
}

#[derive(Debug, Default)]
struct RequestParts {
    provider: Option<String>,
    model: String,
    messages: Vec<Message>,
    options: Options,
    tools: Vec<Tool>,
    tool_choice: Option<ToolChoice>,
}

impl RequestBuilder {
    /// Route to a named provider instead of the client default
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.request.provider = Some(provider.into());
        self
    }

    /// Model identifier
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.request.model = model.into();
        self
    }

    /// Append one message
    pub fn message(mut self, message: Message) -> Self {
        self.request.messages.push(message);
        self
    }

    /// Append messages in order
    pub fn messages(mut self, messages: impl IntoIterator<Item = Message>) -> Self {
        self.request.messages.extend(messages);
        self
    }

    /// Offer one tool
    pub fn tool(mut self, tool: Tool) -> Self {
        self.request.tools.push(tool);
        self
    }

    /// Offer tools
    pub fn tools(mut self, tools: impl IntoIterator<Item = Tool>) -> Self {
        self.request.tools.extend(tools);
        self
    }

    /// Constrain tool selection
    pub fn tool_choice(mut self, choice: ToolChoice) -> Self {
        self.request.tool_choice = Some(choice);
        self
    }

    /// Replace all options at once
    pub fn options(mut self, options: Options) -> Self {
        self.request.options = options;
        self
    }

    /// Sampling temperature
    pub fn temperature(mut self, temperature: f64) -> Self {
        self.request.options.temperature = Some(temperature);
        self
    }

    /// Nucleus sampling threshold
    pub fn top_p(mut self, top_p: f64) -> Self {
        self.request.options.top_p = Some(top_p);
        self
    }

    /// Maximum tokens to generate
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.request.options.max_tokens = Some(max_tokens);
        self
    }

    /// Add a stop sequence
    pub fn stop(mut self, stop: impl Into<String>) -> Self {
        self.request.options.stop.push(stop.into());
        self
    }

    /// Presence penalty
    pub fn presence_penalty(mut self, penalty: f64) -> Self {
        self.request.options.presence_penalty = Some(penalty);
        self
    }

    /// Frequency penalty
    pub fn frequency_penalty(mut self, penalty: f64) -> Self {
        self.request.options.frequency_penalty = Some(penalty);
        self
    }

    /// End-user identifier
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.request.options.user = Some(user.into());
        self
    }

    /// Tool-calling emulation mode
    pub fn emulation_mode(mut self, mode: EmulationMode) -> Self {
        self.request.options.emulation_mode = mode;
        self
    }

    /// Stream the response, calling `callback` for every event
    pub fn on_stream<F>(mut self, callback: F) -> Self
    where
        F: Fn(&StreamEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.request.options.stream = Some(Arc::new(callback));
        self
    }

    /// Receive wire payloads for debugging
    pub fn on_debug<F>(mut self, sink: F) -> Self
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.request.options.debug = Some(Arc::new(sink));
        self
    }

    /// Extra top-level field for the OpenAI wire body
    pub fn openai_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.request.options.extras.openai.insert(key.into(), value);
        self
    }

    /// Extra top-level field for the Anthropic wire body
    pub fn anthropic_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.request.options.extras.anthropic.insert(key.into(), value);
        self
    }

    /// Extra top-level field for the Google wire body
    pub fn google_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.request.options.extras.google.insert(key.into(), value);
        self
    }

    /// Validate and produce the request
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Validation`] describing the first violated rule
    pub fn build(self) -> Result<Request, LlmError> {
        let RequestParts {
            provider,
            model,
            messages,
            options,
            tools,
            tool_choice,
        } = self.request;

        let request = Request {
            provider,
            model,
            messages,
            options,
            tools,
            tool_choice,
        };
        request.validate()?;

        Ok(request)
    }
}
