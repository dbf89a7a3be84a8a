//! Vendor-neutral chat completions for Parley
//!
//! One request/response representation mapped onto the `OpenAI`,
//! Anthropic and Google wire protocols, with incremental streaming, native
//! tool calling, and tool-calling emulation for models that lack it.
//!
//! ```no_run
//! # async fn run() -> Result<(), parley_llm::LlmError> {
//! use parley_llm::{Client, Message, Request};
//!
//! let client = Client::load("parley.toml")?;
//! let request = Request::builder()
//!     .model("gpt-4o-mini")
//!     .message(Message::user("Say hello"))
//!     .build()?;
//!
//! let response = client.chat_once(&request).await?;
//! println!("{}", response.text);
//! # Ok(())
//! # }
//! ```

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod client;
pub mod context;
pub mod convert;
pub mod emulation;
pub mod error;
pub mod protocol;
pub mod provider;
pub mod schema;
pub mod stream;
pub mod tool_id;
pub mod types;

pub use client::{Client, ClientBuilder};
pub use context::CallContext;
pub use error::LlmError;
pub use provider::{Provider, ProviderCapabilities};
pub use stream::StreamAccumulator;
pub use types::{
    ChatResponse, EmulationMode, FinishReason, FunctionCall, Message, Options, Part, Request, RequestBuilder, Role,
    StreamCallback, StreamEvent, Tool, ToolCall, ToolCallDelta, ToolChoice, Usage, WARNING_TOOLS_EMULATED,
};
