//! Mock vendor server for integration tests
//!
//! Speaks the OpenAI chat completions protocol and answers from a script
//! of canned replies, recording every request body it receives

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// Text returned once the script runs out
const DEFAULT_REPLY: &str = "Hello from mock LLM";

/// One scripted answer
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Plain text; streamed as one chunk per element
    Text(Vec<String>),
    /// A single tool call
    ToolCall {
        /// Function name
        name: String,
        /// JSON arguments
        arguments: String,
    },
    /// Non-success status with an `OpenAI`-style error body
    Error {
        /// HTTP status
        status: u16,
        /// Error message
        message: String,
    },
    /// Never answer until the server shuts down
    Hang,
}

impl MockReply {
    /// Text reply sent as a single chunk
    pub fn text(text: &str) -> Self {
        Self::Text(vec![text.to_owned()])
    }

    /// Text reply streamed in the given chunks
    pub fn chunks(chunks: &[&str]) -> Self {
        Self::Text(chunks.iter().map(|c| (*c).to_owned()).collect())
    }

    /// Tool call reply
    pub fn tool_call(name: &str, arguments: &str) -> Self {
        Self::ToolCall {
            name: name.to_owned(),
            arguments: arguments.to_owned(),
        }
    }
}

/// Mock vendor answering from a script
pub struct MockLlm {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockLlmState>,
}

struct MockLlmState {
    replies: Mutex<VecDeque<MockReply>>,
    requests: Mutex<Vec<serde_json::Value>>,
    shutdown: CancellationToken,
}

impl MockLlm {
    /// Start a mock that always answers with the default text
    pub async fn start() -> anyhow::Result<Self> {
        Self::start_with(Vec::new()).await
    }

    /// Start a mock answering with `replies` in order
    pub async fn start_with(replies: Vec<MockReply>) -> anyhow::Result<Self> {
        let shutdown = CancellationToken::new();
        let state = Arc::new(MockLlmState {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
            shutdown: shutdown.clone(),
        });

        let app = Router::new()
            .route("/v1/chat/completions", routing::post(handle_chat_completions))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    /// Base URL for configuring the mock as a provider
    ///
    /// Includes `/v1` since the OpenAI provider appends `/chat/completions`
    pub fn base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    /// Request bodies received so far
    pub fn requests(&self) -> Vec<serde_json::Value> {
        self.state.requests.lock().unwrap().clone()
    }
}

impl Drop for MockLlm {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// -- Wire types matching OpenAI format --

#[derive(Debug, Serialize)]
struct ChatCompletionResponse {
    id: &'static str,
    object: &'static str,
    created: u64,
    model: String,
    choices: Vec<Choice>,
    usage: Usage,
}

#[derive(Debug, Serialize)]
struct Choice {
    index: u32,
    message: ResponseMessage,
    finish_reason: &'static str,
}

#[derive(Debug, Serialize)]
struct ResponseMessage {
    role: &'static str,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ToolCallResponse>>,
}

#[derive(Debug, Serialize)]
struct ToolCallResponse {
    id: &'static str,
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: FunctionCallResponse,
}

#[derive(Debug, Serialize)]
struct FunctionCallResponse {
    name: String,
    arguments: String,
}

#[derive(Debug, Clone, Copy, Serialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

const USAGE: Usage = Usage {
    prompt_tokens: 10,
    completion_tokens: 5,
    total_tokens: 15,
};

// -- Stream chunk types --

#[derive(Debug, Serialize)]
struct StreamChunk {
    model: String,
    choices: Vec<StreamChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    usage: Option<Usage>,
}

#[derive(Debug, Serialize)]
struct StreamChoice {
    index: u32,
    delta: StreamDelta,
    #[serde(skip_serializing_if = "Option::is_none")]
    finish_reason: Option<&'static str>,
}

#[derive(Debug, Default, Serialize)]
struct StreamDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<StreamToolCall>>,
}

#[derive(Debug, Serialize)]
struct StreamToolCall {
    index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'static str>,
    function: StreamFunctionCall,
}

#[derive(Debug, Serialize)]
struct StreamFunctionCall {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    arguments: String,
}

// -- Handlers --

async fn handle_chat_completions(
    State(state): State<Arc<MockLlmState>>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    state.requests.lock().unwrap().push(body.clone());

    let model = body["model"].as_str().unwrap_or("mock-model").to_owned();
    let stream = body["stream"].as_bool().unwrap_or(false);
    let reply = state
        .replies
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| MockReply::text(DEFAULT_REPLY));

    match reply {
        MockReply::Error { status, message } => (
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Json(serde_json::json!({"error": {"message": message, "type": "mock_error"}})),
        )
            .into_response(),
        MockReply::Hang => {
            state.shutdown.cancelled().await;
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
        reply if stream => streaming_response(model, reply),
        reply => Json(completion(model, reply)).into_response(),
    }
}

fn completion(model: String, reply: MockReply) -> ChatCompletionResponse {
    let (message, finish_reason) = match reply {
        MockReply::ToolCall { name, arguments } => (
            ResponseMessage {
                role: "assistant",
                content: None,
                tool_calls: Some(vec![ToolCallResponse {
                    id: "call_mock_1",
                    tool_type: "function",
                    function: FunctionCallResponse { name, arguments },
                }]),
            },
            "tool_calls",
        ),
        MockReply::Text(chunks) => (
            ResponseMessage {
                role: "assistant",
                content: Some(chunks.concat()),
                tool_calls: None,
            },
            "stop",
        ),
        MockReply::Error { .. } | MockReply::Hang => unreachable!("handled before building a completion"),
    };

    ChatCompletionResponse {
        id: "chatcmpl-mock",
        object: "chat.completion",
        created: 1_700_000_000,
        model,
        choices: vec![Choice {
            index: 0,
            message,
            finish_reason,
        }],
        usage: USAGE,
    }
}

/// Build an SSE body: one chunk per delta, a finish chunk, usage, `[DONE]`
fn streaming_response(model: String, reply: MockReply) -> Response {
    let mut chunks = Vec::new();
    let chunk = |delta: StreamDelta, finish_reason: Option<&'static str>| StreamChunk {
        model: model.clone(),
        choices: vec![StreamChoice {
            index: 0,
            delta,
            finish_reason,
        }],
        usage: None,
    };

    let finish_reason = match reply {
        MockReply::Text(parts) => {
            for part in parts {
                chunks.push(chunk(
                    StreamDelta {
                        content: Some(part),
                        ..StreamDelta::default()
                    },
                    None,
                ));
            }
            "stop"
        }
        MockReply::ToolCall { name, arguments } => {
            // Name first, arguments split across two fragments
            let split = arguments
                .char_indices()
                .nth(arguments.chars().count() / 2)
                .map_or(arguments.len(), |(i, _)| i);
            let (head, tail) = arguments.split_at(split);
            let fragments = [(Some("call_mock_1"), Some(name), head), (None, None, tail)];
            for (id, name, args) in fragments {
                chunks.push(chunk(
                    StreamDelta {
                        tool_calls: Some(vec![StreamToolCall {
                            index: 0,
                            id,
                            function: StreamFunctionCall {
                                name,
                                arguments: args.to_owned(),
                            },
                        }]),
                        ..StreamDelta::default()
                    },
                    None,
                ));
            }
            "tool_calls"
        }
        MockReply::Error { .. } | MockReply::Hang => unreachable!("handled before streaming"),
    };

    chunks.push(chunk(StreamDelta::default(), Some(finish_reason)));
    chunks.push(StreamChunk {
        model: model.clone(),
        choices: Vec::new(),
        usage: Some(USAGE),
    });

    let mut body: String = chunks
        .iter()
        .map(|c| format!("data: {}\n\n", serde_json::to_string(c).unwrap()))
        .collect();
    body.push_str("data: [DONE]\n\n");

    ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
}
