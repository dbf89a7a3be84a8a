//! Conversion between the IR and the Google Generative Language wire format

use std::collections::HashMap;

use crate::error::LlmError;
use crate::protocol::google::{
    GoogleCandidate, GoogleContent, GoogleFileData, GoogleFunctionCall, GoogleFunctionCallingConfig,
    GoogleFunctionDeclaration, GoogleFunctionResponse, GoogleGenerationConfig, GoogleInlineData, GooglePart,
    GoogleRequest, GoogleResponse, GoogleTool, GoogleToolConfig, GoogleUsageMetadata,
};
use crate::tool_id;
use crate::types::{
    ChatResponse, FinishReason, Message, Part, Request, Role, StreamEvent, ToolCall, ToolCallDelta, ToolChoice, Usage,
};

/// Signature Google documents for replaying function calls it never signed
pub const SKIP_THOUGHT_SIGNATURE: &str = "skip_thought_signature_validator";

// -- Outbound: IR -> Google wire request --

/// Build the wire request
///
/// Historical assistant tool calls must carry a thought signature. When
/// `allow_missing_signature` is set, calls without one are sent with
/// [`SKIP_THOUGHT_SIGNATURE`] instead of failing.
pub fn build_request(request: &Request, allow_missing_signature: bool) -> Result<GoogleRequest, LlmError> {
    let system_parts: Vec<GooglePart> = request
        .messages()
        .iter()
        .filter(|m| m.role == Role::System)
        .map(Message::text)
        .filter(|text| !text.is_empty())
        .map(GooglePart::text)
        .collect();

    // Tool results name the function, not the call id. Ids may repeat
    // across turns, so the latest assistant turn wins for what follows it.
    let mut call_names: HashMap<&str, &str> = HashMap::new();

    let mut contents: Vec<GoogleContent> = Vec::new();
    for msg in request.messages().iter().filter(|m| m.role != Role::System) {
        call_names.extend(msg.tool_calls().iter().map(|tc| (tc.id.as_str(), tc.function.name.as_str())));
        let role = if msg.role == Role::Assistant { "model" } else { "user" };
        let parts = message_parts(msg, &call_names, allow_missing_signature)?;
        if parts.is_empty() {
            continue;
        }

        match contents.last_mut() {
            Some(last) if last.role.as_deref() == Some(role) => last.parts.extend(parts),
            _ => contents.push(GoogleContent {
                role: Some(role.to_owned()),
                parts,
            }),
        }
    }

    let tools = request.has_tools().then(|| {
        vec![GoogleTool {
            function_declarations: request
                .tools()
                .iter()
                .map(|t| GoogleFunctionDeclaration {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.normalized_parameters(),
                })
                .collect(),
        }]
    });

    Ok(GoogleRequest {
        contents,
        system_instruction: (!system_parts.is_empty()).then_some(GoogleContent {
            role: None,
            parts: system_parts,
        }),
        generation_config: generation_config(request),
        tools,
        tool_config: request.tool_choice().map(tool_config),
    })
}

fn message_parts(
    msg: &Message,
    call_names: &HashMap<&str, &str>,
    allow_missing_signature: bool,
) -> Result<Vec<GooglePart>, LlmError> {
    if msg.role == Role::Tool {
        let id = msg.tool_call_id.as_deref().unwrap_or_default();
        let name = call_names.get(id).copied().unwrap_or(id);
        let text = msg.text();

        let response = match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(value @ serde_json::Value::Object(_)) => value,
            _ => serde_json::json!({ "result": text }),
        };

        return Ok(vec![GooglePart {
            function_response: Some(GoogleFunctionResponse {
                name: name.to_owned(),
                response,
            }),
            ..GooglePart::default()
        }]);
    }

    let mut parts: Vec<GooglePart> = msg
        .content_parts()
        .iter()
        .filter_map(|part| match part {
            Part::Text { text } if text.is_empty() => None,
            Part::Text { text } => Some(GooglePart::text(text.clone())),
            Part::ImageUrl { url } => Some(image_part_from_url(url)),
            Part::ImageBase64 { data, mime_type } => Some(GooglePart {
                inline_data: Some(GoogleInlineData {
                    mime_type: mime_type.clone(),
                    data: data.clone(),
                }),
                ..GooglePart::default()
            }),
        })
        .collect();

    for tc in msg.tool_calls() {
        let signature = match tool_id::resolve_thought_signature(tc) {
            Ok(signature) => signature,
            Err(_) if allow_missing_signature => SKIP_THOUGHT_SIGNATURE.to_owned(),
            Err(e) => return Err(e),
        };

        let args = if tc.function.arguments.trim().is_empty() {
            serde_json::json!({})
        } else {
            serde_json::from_str(&tc.function.arguments).map_err(|e| {
                LlmError::Validation(format!("tool call '{}' arguments are not valid JSON: {e}", tc.id))
            })?
        };

        parts.push(GooglePart {
            function_call: Some(GoogleFunctionCall {
                id: None,
                name: tc.function.name.clone(),
                args,
            }),
            thought_signature: Some(signature),
            ..GooglePart::default()
        });
    }

    Ok(parts)
}

/// `data:` URLs go inline, anything else by file URI
fn image_part_from_url(url: &str) -> GooglePart {
    if let Some(rest) = url.strip_prefix("data:")
        && let Some((meta, data)) = rest.split_once(',')
        && let Some(mime_type) = meta.strip_suffix(";base64")
    {
        return GooglePart {
            inline_data: Some(GoogleInlineData {
                mime_type: mime_type.to_owned(),
                data: data.to_owned(),
            }),
            ..GooglePart::default()
        };
    }

    GooglePart {
        file_data: Some(GoogleFileData {
            mime_type: mime_type_for(url).to_owned(),
            file_uri: url.to_owned(),
        }),
        ..GooglePart::default()
    }
}

/// Image MIME type guessed from a URL's extension
fn mime_type_for(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let extension = path.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("heic") => "image/heic",
        Some("heif") => "image/heif",
        _ => "image/jpeg",
    }
}

fn generation_config(request: &Request) -> Option<GoogleGenerationConfig> {
    let options = request.options();
    let config = GoogleGenerationConfig {
        temperature: options.temperature,
        top_p: options.top_p,
        max_output_tokens: options.max_tokens,
        stop_sequences: (!options.stop.is_empty()).then(|| options.stop.clone()),
        presence_penalty: options.presence_penalty,
        frequency_penalty: options.frequency_penalty,
    };

    let empty = config.temperature.is_none()
        && config.top_p.is_none()
        && config.max_output_tokens.is_none()
        && config.stop_sequences.is_none()
        && config.presence_penalty.is_none()
        && config.frequency_penalty.is_none();

    (!empty).then_some(config)
}

fn tool_config(choice: &ToolChoice) -> GoogleToolConfig {
    let (mode, allowed_function_names) = match choice {
        ToolChoice::Auto => ("AUTO", None),
        ToolChoice::None => ("NONE", None),
        ToolChoice::Required => ("ANY", None),
        ToolChoice::Function(name) => ("ANY", Some(vec![name.clone()])),
    };

    GoogleToolConfig {
        function_calling_config: GoogleFunctionCallingConfig {
            mode,
            allowed_function_names,
        },
    }
}

// -- Inbound: Google wire response -> IR --

/// Convert a complete response, keeping `raw` as the untouched payload
pub fn into_chat_response(response: GoogleResponse, model: &str, raw: serde_json::Value) -> ChatResponse {
    let mut state = GoogleStreamState::new(model);
    let mut text = String::new();
    let mut parts = Vec::new();
    let mut tool_calls = Vec::new();

    for event in state.convert_chunk(response) {
        match event {
            StreamEvent::Delta(chunk) => {
                text.push_str(&chunk);
                parts.push(Part::text(chunk));
            }
            StreamEvent::ToolCallDelta(delta) => {
                let id = delta.id.unwrap_or_default();
                let mut call = ToolCall::function(id, delta.name.unwrap_or_default(), delta.args_chunk);
                call.thought_signature = tool_id::decode(&call.id).1;
                tool_calls.push(call);
            }
            StreamEvent::Usage(_) | StreamEvent::Done(_) => {}
        }
    }

    ChatResponse {
        text,
        parts,
        model: state.model,
        tool_calls,
        usage: state.usage,
        finish_reason: state.finish_reason,
        raw: Some(raw),
        warnings: Vec::new(),
    }
}

impl From<GoogleUsageMetadata> for Usage {
    fn from(usage: GoogleUsageMetadata) -> Self {
        let total = if usage.total_token_count == 0 {
            usage.prompt_token_count.saturating_add(usage.candidates_token_count)
        } else {
            usage.total_token_count
        };

        Self {
            input: usage.prompt_token_count,
            output: usage.candidates_token_count,
            total,
        }
    }
}

/// Map Google finish reasons onto the IR
fn parse_finish_reason(reason: &str) -> Option<FinishReason> {
    match reason {
        "STOP" => Some(FinishReason::Stop),
        "MAX_TOKENS" => Some(FinishReason::Length),
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" | "IMAGE_SAFETY" => {
            Some(FinishReason::ContentFilter)
        }
        _ => None,
    }
}

// -- Stream conversion --

/// State tracker for converting Google response chunks
///
/// Google sends whole function calls in a single part, so each one
/// becomes a complete [`ToolCallDelta`] with its own sequential index and
/// an id carrying the part's thought signature.
#[derive(Debug)]
pub struct GoogleStreamState {
    next_tool_index: u32,
    model: String,
    usage: Usage,
    finish_reason: Option<FinishReason>,
}

impl GoogleStreamState {
    /// Tracker for a call to `model`
    pub fn new(model: &str) -> Self {
        Self {
            next_tool_index: 0,
            model: model.to_owned(),
            usage: Usage::default(),
            finish_reason: None,
        }
    }

    /// Model reported by the vendor, else the requested one
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Finish reason seen so far
    pub const fn finish_reason(&self) -> Option<FinishReason> {
        self.finish_reason
    }

    /// Convert one response chunk into IR events
    pub fn convert_chunk(&mut self, chunk: GoogleResponse) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        if let Some(version) = chunk.model_version.filter(|v| !v.is_empty()) {
            self.model = version;
        }

        // Only the first candidate is surfaced
        if let Some(GoogleCandidate { content, finish_reason }) = chunk.candidates.into_iter().next() {
            for part in content.parts {
                if let Some(call) = part.function_call {
                    events.push(self.tool_call_event(call, part.thought_signature.as_deref()));
                } else if let Some(text) = part.text
                    && part.thought != Some(true)
                    && !text.is_empty()
                {
                    events.push(StreamEvent::Delta(text));
                }
            }

            if let Some(reason) = finish_reason.as_deref().and_then(parse_finish_reason) {
                self.finish_reason = Some(if reason == FinishReason::Stop && self.next_tool_index > 0 {
                    FinishReason::ToolCalls
                } else {
                    reason
                });
            }
        }

        if let Some(usage) = chunk.usage_metadata {
            self.usage = usage.into();
            events.push(StreamEvent::Usage(self.usage));
        }

        events
    }

    fn tool_call_event(&mut self, call: GoogleFunctionCall, signature: Option<&str>) -> StreamEvent {
        let index = self.next_tool_index;
        self.next_tool_index += 1;

        let base = call
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("call_{index}"));
        let args = if call.args.is_null() {
            "{}".to_owned()
        } else {
            call.args.to_string()
        };

        StreamEvent::ToolCallDelta(ToolCallDelta {
            index,
            id: Some(tool_id::encode(&base, signature)),
            name: Some(call.name),
            args_chunk: args,
        })
    }
}
