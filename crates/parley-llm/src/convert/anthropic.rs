//! Conversion between the IR and the Anthropic wire format

use std::collections::HashMap;

use crate::error::LlmError;
use crate::protocol::anthropic::{
    AnthropicContentBlock, AnthropicImageSource, AnthropicMessage, AnthropicMetadata, AnthropicRequest,
    AnthropicResponse, AnthropicResponseBlock, AnthropicStreamContentBlock, AnthropicStreamDelta, AnthropicStreamError,
    AnthropicStreamEvent, AnthropicTool, AnthropicToolChoice, AnthropicUsage,
};
use crate::types::{
    ChatResponse, FinishReason, Message, Part, Request, Role, StreamEvent, ToolCall, ToolCallDelta, ToolChoice, Usage,
};

/// Default max tokens when not specified (Anthropic requires this field)
const DEFAULT_MAX_TOKENS: u32 = 4096;

// -- Outbound: IR -> Anthropic wire request --

/// Build the wire request for `model`
///
/// System messages are hoisted into the top-level `system` field and
/// consecutive messages that map to the same Anthropic role are merged,
/// so parallel tool results travel in a single user turn.
pub fn build_request(request: &Request, model: &str) -> Result<AnthropicRequest, LlmError> {
    let options = request.options();

    let system: Vec<String> = request
        .messages()
        .iter()
        .filter(|m| m.role == Role::System)
        .map(Message::text)
        .filter(|text| !text.is_empty())
        .collect();

    let mut messages: Vec<AnthropicMessage> = Vec::new();
    for msg in request.messages().iter().filter(|m| m.role != Role::System) {
        let role = if msg.role == Role::Assistant { "assistant" } else { "user" };
        let blocks = message_blocks(msg)?;
        if blocks.is_empty() {
            continue;
        }

        match messages.last_mut() {
            Some(last) if last.role == role => last.content.extend(blocks),
            _ => messages.push(AnthropicMessage { role, content: blocks }),
        }
    }

    let tools = request.has_tools().then(|| {
        request
            .tools()
            .iter()
            .map(|t| AnthropicTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.normalized_parameters(),
            })
            .collect()
    });

    Ok(AnthropicRequest {
        model: model.to_owned(),
        max_tokens: options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        system: (!system.is_empty()).then(|| system.join("\n\n")),
        messages,
        temperature: options.temperature,
        top_p: options.top_p,
        stop_sequences: (!options.stop.is_empty()).then(|| options.stop.clone()),
        stream: options.is_streaming().then_some(true),
        tools,
        tool_choice: request.tool_choice().map(tool_choice),
        metadata: options.user.clone().map(|user_id| AnthropicMetadata { user_id }),
    })
}

/// Content blocks for one non-system message
fn message_blocks(msg: &Message) -> Result<Vec<AnthropicContentBlock>, LlmError> {
    if msg.role == Role::Tool {
        let tool_use_id = msg.tool_call_id.clone().unwrap_or_default();
        return Ok(vec![AnthropicContentBlock::ToolResult {
            tool_use_id,
            content: msg.text(),
        }]);
    }

    let mut blocks: Vec<AnthropicContentBlock> = msg
        .content_parts()
        .iter()
        .filter_map(|part| match part {
            Part::Text { text } if text.is_empty() => None,
            Part::Text { text } => Some(AnthropicContentBlock::Text { text: text.clone() }),
            Part::ImageUrl { url } => Some(AnthropicContentBlock::Image {
                source: image_source_from_url(url),
            }),
            Part::ImageBase64 { data, mime_type } => Some(AnthropicContentBlock::Image {
                source: AnthropicImageSource::Base64 {
                    media_type: mime_type.clone(),
                    data: data.clone(),
                },
            }),
        })
        .collect();

    for tc in msg.tool_calls() {
        let input = if tc.function.arguments.trim().is_empty() {
            serde_json::json!({})
        } else {
            serde_json::from_str(&tc.function.arguments).map_err(|e| {
                LlmError::Validation(format!("tool call '{}' arguments are not valid JSON: {e}", tc.id))
            })?
        };

        blocks.push(AnthropicContentBlock::ToolUse {
            id: tc.id.clone(),
            name: tc.function.name.clone(),
            input,
        });
    }

    Ok(blocks)
}

/// Split `data:` URLs into base64 sources, pass anything else by reference
fn image_source_from_url(url: &str) -> AnthropicImageSource {
    if let Some(rest) = url.strip_prefix("data:")
        && let Some((meta, data)) = rest.split_once(',')
        && let Some(media_type) = meta.strip_suffix(";base64")
    {
        return AnthropicImageSource::Base64 {
            media_type: media_type.to_owned(),
            data: data.to_owned(),
        };
    }

    AnthropicImageSource::Url { url: url.to_owned() }
}

/// Convert the IR tool choice to Anthropic's shape
fn tool_choice(choice: &ToolChoice) -> AnthropicToolChoice {
    let (choice_type, name) = match choice {
        ToolChoice::Auto => ("auto", None),
        ToolChoice::None => ("none", None),
        ToolChoice::Required => ("any", None),
        ToolChoice::Function(name) => ("tool", Some(name.clone())),
    };

    AnthropicToolChoice { choice_type, name }
}

// -- Inbound: Anthropic wire response -> IR --

/// Convert a complete response, keeping `raw` as the untouched payload
pub fn into_chat_response(response: AnthropicResponse, raw: serde_json::Value) -> ChatResponse {
    let mut text = String::new();
    let mut parts = Vec::new();
    let mut tool_calls = Vec::new();

    for block in response.content {
        match block {
            AnthropicResponseBlock::Text { text: chunk } => {
                text.push_str(&chunk);
                parts.push(Part::text(chunk));
            }
            AnthropicResponseBlock::ToolUse { id, name, input } => {
                tool_calls.push(ToolCall::function(id, name, input.to_string()));
            }
            AnthropicResponseBlock::Other => {}
        }
    }

    ChatResponse {
        text,
        parts,
        model: response.model,
        tool_calls,
        usage: response.usage.into(),
        finish_reason: response.stop_reason.as_deref().and_then(parse_stop_reason),
        raw: Some(raw),
        warnings: Vec::new(),
    }
}

impl From<AnthropicUsage> for Usage {
    fn from(usage: AnthropicUsage) -> Self {
        Self::new(usage.input_tokens, usage.output_tokens)
    }
}

/// Map Anthropic stop reasons onto the IR
fn parse_stop_reason(reason: &str) -> Option<FinishReason> {
    match reason {
        "end_turn" | "stop_sequence" | "pause_turn" => Some(FinishReason::Stop),
        "max_tokens" => Some(FinishReason::Length),
        "tool_use" => Some(FinishReason::ToolCalls),
        "refusal" => Some(FinishReason::ContentFilter),
        _ => None,
    }
}

// -- Stream conversion --

/// State tracker for converting Anthropic stream events
///
/// Anthropic's content block index is shared by every block type, so tool
/// calls get their own sequential index here.
#[derive(Debug, Default)]
pub struct AnthropicStreamState {
    /// Content block index -> tool call index
    tool_blocks: HashMap<u32, u32>,
    next_tool_index: u32,
    input_tokens: u32,
    output_tokens: u32,
    model: String,
    finish_reason: Option<FinishReason>,
}

impl AnthropicStreamState {
    /// Create a new stream state tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Model announced in `message_start`
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Stop reason announced in `message_delta`
    pub const fn finish_reason(&self) -> Option<FinishReason> {
        self.finish_reason
    }

    /// Convert one vendor event into IR events
    ///
    /// # Errors
    ///
    /// Returns the vendor error carried by an `error` event
    pub fn convert_event(&mut self, event: AnthropicStreamEvent) -> Result<Vec<StreamEvent>, AnthropicStreamError> {
        let events = match event {
            AnthropicStreamEvent::MessageStart { message } => {
                self.model = message.model;
                match message.usage {
                    Some(usage) => self.record_usage(usage),
                    None => Vec::new(),
                }
            }

            AnthropicStreamEvent::ContentBlockStart { index, content_block } => match content_block {
                AnthropicStreamContentBlock::Text { text } if !text.is_empty() => vec![StreamEvent::Delta(text)],
                AnthropicStreamContentBlock::ToolUse { id, name } => {
                    let tool_index = self.next_tool_index;
                    self.next_tool_index += 1;
                    self.tool_blocks.insert(index, tool_index);

                    vec![StreamEvent::ToolCallDelta(ToolCallDelta {
                        index: tool_index,
                        id: Some(id),
                        name: Some(name),
                        args_chunk: String::new(),
                    })]
                }
                AnthropicStreamContentBlock::Text { .. } | AnthropicStreamContentBlock::Other => Vec::new(),
            },

            AnthropicStreamEvent::ContentBlockDelta { index, delta } => match delta {
                AnthropicStreamDelta::TextDelta { text } => vec![StreamEvent::Delta(text)],
                AnthropicStreamDelta::InputJsonDelta { partial_json } => match self.tool_blocks.get(&index) {
                    Some(&tool_index) => vec![StreamEvent::ToolCallDelta(ToolCallDelta {
                        index: tool_index,
                        id: None,
                        name: None,
                        args_chunk: partial_json,
                    })],
                    None => Vec::new(),
                },
                AnthropicStreamDelta::Other => Vec::new(),
            },

            AnthropicStreamEvent::MessageDelta { delta, usage } => {
                if let Some(reason) = delta.stop_reason.as_deref().and_then(parse_stop_reason) {
                    self.finish_reason = Some(reason);
                }
                match usage {
                    Some(usage) => self.record_usage(usage),
                    None => Vec::new(),
                }
            }

            AnthropicStreamEvent::ContentBlockStop { .. }
            | AnthropicStreamEvent::MessageStop
            | AnthropicStreamEvent::Ping => Vec::new(),

            AnthropicStreamEvent::Error { error } => return Err(error),
        };

        Ok(events)
    }

    /// Merge a usage report; later reports only ever raise the counts
    fn record_usage(&mut self, usage: AnthropicUsage) -> Vec<StreamEvent> {
        self.input_tokens = self.input_tokens.max(usage.input_tokens);
        self.output_tokens = self.output_tokens.max(usage.output_tokens);
        vec![StreamEvent::Usage(Usage::new(self.input_tokens, self.output_tokens))]
    }
}
