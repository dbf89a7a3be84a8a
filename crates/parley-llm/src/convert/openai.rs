//! Conversion between the IR and the `OpenAI` wire format

use crate::protocol::openai::{
    OpenAiChoiceMessage, OpenAiContent, OpenAiContentPart, OpenAiFunction, OpenAiFunctionCall, OpenAiImageUrl,
    OpenAiMessage, OpenAiRequest, OpenAiResponse, OpenAiStreamChunk, OpenAiStreamOptions, OpenAiTool, OpenAiToolCall,
    OpenAiUsage,
};
use crate::tool_id;
use crate::types::{
    ChatResponse, FinishReason, Message, Part, Request, Role, StreamEvent, ToolCall, ToolCallDelta, ToolChoice, Usage,
};

// -- Outbound: IR -> OpenAI wire request --

/// Build the wire request for `model`
///
/// `include_usage` asks for a trailing usage chunk when streaming; only the
/// canonical API is known to accept it.
pub fn build_request(request: &Request, model: &str, include_usage: bool) -> OpenAiRequest {
    let options = request.options();
    let stream = options.is_streaming();

    OpenAiRequest {
        model: model.to_owned(),
        messages: request.messages().iter().map(Into::into).collect(),
        temperature: options.temperature,
        top_p: options.top_p,
        max_tokens: options.max_tokens,
        stop: (!options.stop.is_empty()).then(|| options.stop.clone()),
        frequency_penalty: options.frequency_penalty,
        presence_penalty: options.presence_penalty,
        user: options.user.clone(),
        stream: stream.then_some(true),
        tools: request.has_tools().then(|| {
            request
                .tools()
                .iter()
                .map(|t| OpenAiTool {
                    tool_type: t.tool_type.clone(),
                    function: OpenAiFunction {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.normalized_parameters(),
                        strict: t.strict,
                    },
                })
                .collect()
        }),
        tool_choice: request.tool_choice().map(tool_choice_value),
        stream_options: (stream && include_usage).then_some(OpenAiStreamOptions { include_usage: true }),
    }
}

impl From<&Message> for OpenAiMessage {
    fn from(msg: &Message) -> Self {
        let parts = msg.content_parts();
        let content = if parts.iter().all(Part::is_text) {
            let text = msg.text();
            // Assistant turns that only call tools carry no content
            if text.is_empty() && !msg.tool_calls().is_empty() {
                None
            } else {
                Some(OpenAiContent::Text(text))
            }
        } else {
            Some(OpenAiContent::Parts(parts.iter().map(Into::into).collect()))
        };

        let tool_calls = (!msg.tool_calls().is_empty()).then(|| {
            msg.tool_calls()
                .iter()
                .map(|tc| OpenAiToolCall {
                    id: tc.id.clone(),
                    tool_type: "function".to_owned(),
                    function: OpenAiFunctionCall {
                        name: tc.function.name.clone(),
                        arguments: tc.function.arguments.clone(),
                    },
                })
                .collect()
        });

        Self {
            role: msg.role.as_str(),
            content,
            name: msg.name.clone(),
            tool_calls,
            tool_call_id: msg.tool_call_id.clone(),
        }
    }
}

impl From<&Part> for OpenAiContentPart {
    fn from(part: &Part) -> Self {
        match part {
            Part::Text { text } => Self::Text { text: text.clone() },
            Part::ImageUrl { url } => Self::ImageUrl {
                image_url: OpenAiImageUrl { url: url.clone() },
            },
            Part::ImageBase64 { data, mime_type } => Self::ImageUrl {
                image_url: OpenAiImageUrl {
                    url: format!("data:{mime_type};base64,{data}"),
                },
            },
        }
    }
}

/// Convert the IR tool choice to `OpenAI`'s JSON value
fn tool_choice_value(choice: &ToolChoice) -> serde_json::Value {
    match choice {
        ToolChoice::Auto => "auto".into(),
        ToolChoice::None => "none".into(),
        ToolChoice::Required => "required".into(),
        ToolChoice::Function(name) => serde_json::json!({
            "type": "function",
            "function": { "name": name }
        }),
    }
}

// -- Inbound: OpenAI wire response -> IR --

/// Convert a complete response, keeping `raw` as the untouched payload
pub fn into_chat_response(response: OpenAiResponse, raw: serde_json::Value) -> ChatResponse {
    let (message, finish_reason) = response
        .choices
        .into_iter()
        .next()
        .map_or((None, None), |choice| (Some(choice.message), choice.finish_reason));

    let OpenAiChoiceMessage { content, tool_calls } = message.unwrap_or(OpenAiChoiceMessage {
        content: None,
        tool_calls: None,
    });

    let text = content.unwrap_or_default();
    let tool_calls = tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| {
            let mut call = ToolCall::function(tc.id, tc.function.name, tc.function.arguments);
            call.thought_signature = tool_id::decode(&call.id).1;
            call
        })
        .collect();

    ChatResponse {
        parts: if text.is_empty() { Vec::new() } else { vec![Part::text(text.clone())] },
        text,
        model: response.model,
        tool_calls,
        usage: response.usage.map(Into::into).unwrap_or_default(),
        finish_reason: finish_reason.as_deref().and_then(parse_finish_reason),
        raw: Some(raw),
        warnings: Vec::new(),
    }
}

impl From<OpenAiUsage> for Usage {
    fn from(usage: OpenAiUsage) -> Self {
        let total = if usage.total_tokens == 0 {
            usage.prompt_tokens.saturating_add(usage.completion_tokens)
        } else {
            usage.total_tokens
        };

        Self {
            input: usage.prompt_tokens,
            output: usage.completion_tokens,
            total,
        }
    }
}

/// Map `OpenAI` finish reasons onto the IR
pub fn parse_finish_reason(reason: &str) -> Option<FinishReason> {
    match reason {
        "stop" => Some(FinishReason::Stop),
        "length" => Some(FinishReason::Length),
        "tool_calls" | "function_call" => Some(FinishReason::ToolCalls),
        "content_filter" => Some(FinishReason::ContentFilter),
        _ => None,
    }
}

// -- Stream conversion --

/// Convert one stream chunk into IR events, in order
///
/// Every tool-call fragment in every choice becomes its own delta.
pub fn chunk_to_events(chunk: &OpenAiStreamChunk) -> Vec<StreamEvent> {
    let mut events = Vec::new();

    for choice in &chunk.choices {
        if let Some(content) = choice.delta.content.as_deref().filter(|c| !c.is_empty()) {
            events.push(StreamEvent::Delta(content.to_owned()));
        }

        for tc in choice.delta.tool_calls.iter().flatten() {
            let function = tc.function.as_ref();
            events.push(StreamEvent::ToolCallDelta(ToolCallDelta {
                index: tc.index,
                id: tc.id.clone(),
                name: function.and_then(|f| f.name.clone()),
                args_chunk: function.and_then(|f| f.arguments.clone()).unwrap_or_default(),
            }));
        }
    }

    if let Some(usage) = chunk.usage {
        events.push(StreamEvent::Usage(usage.into()));
    }

    events
}

/// Finish reason carried by a chunk, if any
pub fn chunk_finish_reason(chunk: &OpenAiStreamChunk) -> Option<FinishReason> {
    chunk
        .choices
        .iter()
        .find_map(|c| c.finish_reason.as_deref())
        .and_then(parse_finish_reason)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::types::Tool;

    #[test]
    fn request_maps_roles_parts_and_tools() {
        let request = Request::builder()
            .model("gpt-4o")
            .message(Message::system("be brief"))
            .message(Message::user_parts(vec![
                Part::text("what is this?"),
                Part::image_base64("AAAA", "image/png"),
            ]))
            .message(Message::assistant_tool_calls(vec![ToolCall::function(
                "call_1",
                "lookup",
                "{}",
            )]))
            .message(Message::tool("call_1", "found"))
            .tool(Tool::function("lookup", "Look things up", json!({"type": "object", "properties": {"ids": {"type": "array"}}})))
            .tool_choice(ToolChoice::Function("lookup".to_owned()))
            .stop("END")
            .build()
            .unwrap();

        let wire = serde_json::to_value(build_request(&request, "gpt-4o", false)).unwrap();

        assert_eq!(wire["messages"][0], json!({"role": "system", "content": "be brief"}));
        assert_eq!(
            wire["messages"][1]["content"][1],
            json!({"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA"}})
        );
        assert!(wire["messages"][2].get("content").is_none());
        assert_eq!(wire["messages"][2]["tool_calls"][0]["id"], "call_1");
        assert_eq!(wire["messages"][3]["tool_call_id"], "call_1");
        assert_eq!(wire["tools"][0]["function"]["parameters"]["properties"]["ids"]["items"], json!({}));
        assert_eq!(wire["tool_choice"], json!({"type": "function", "function": {"name": "lookup"}}));
        assert_eq!(wire["stop"], json!(["END"]));
        assert!(wire.get("stream").is_none());
        assert!(wire.get("stream_options").is_none());
    }

    #[test]
    fn streaming_request_sets_stream_options_when_asked() {
        let request = Request::builder()
            .model("m")
            .message(Message::user("hi"))
            .on_stream(|_| Ok(()))
            .build()
            .unwrap();

        let canonical = serde_json::to_value(build_request(&request, "m", true)).unwrap();
        assert_eq!(canonical["stream"], true);
        assert_eq!(canonical["stream_options"], json!({"include_usage": true}));

        let compatible = serde_json::to_value(build_request(&request, "m", false)).unwrap();
        assert!(compatible.get("stream_options").is_none());
    }

    #[test]
    fn response_keeps_tool_call_ids() {
        let id = tool_id::encode("call_x", Some("sig-abc"));
        let raw = json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o-2024",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{"id": id, "type": "function", "function": {"name": "f", "arguments": "{\"a\":1}"}}]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 5, "completion_tokens": 7, "total_tokens": 12}
        });

        let wire: OpenAiResponse = serde_json::from_value(raw.clone()).unwrap();
        let response = into_chat_response(wire, raw.clone());

        assert_eq!(response.tool_calls[0].id, id);
        assert_eq!(response.tool_calls[0].thought_signature.as_deref(), Some("sig-abc"));
        assert_eq!(response.tool_calls[0].function.arguments, "{\"a\":1}");
        assert_eq!(response.finish_reason, Some(FinishReason::ToolCalls));
        assert_eq!(response.usage, Usage { input: 5, output: 7, total: 12 });
        assert_eq!(response.model, "gpt-4o-2024");
        assert_eq!(response.raw, Some(raw));
        assert!(response.text.is_empty());
    }

    #[test]
    fn chunk_with_parallel_tool_calls_yields_all() {
        let chunk: OpenAiStreamChunk = serde_json::from_value(json!({
            "model": "m",
            "choices": [{
                "index": 0,
                "delta": {"tool_calls": [
                    {"index": 0, "id": "a", "function": {"name": "f", "arguments": ""}},
                    {"index": 1, "id": "b", "function": {"name": "g", "arguments": "{}"}}
                ]},
                "finish_reason": null
            }]
        }))
        .unwrap();

        let events = chunk_to_events(&chunk);
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[1], StreamEvent::ToolCallDelta(d) if d.index == 1 && d.name.as_deref() == Some("g")));
    }

    #[test]
    fn usage_chunk_becomes_usage_event() {
        let chunk: OpenAiStreamChunk = serde_json::from_value(json!({
            "model": "m",
            "choices": [],
            "usage": {"prompt_tokens": 1, "completion_tokens": 2, "total_tokens": 3}
        }))
        .unwrap();

        assert_eq!(chunk_to_events(&chunk), [StreamEvent::Usage(Usage::new(1, 2))]);
    }
}
