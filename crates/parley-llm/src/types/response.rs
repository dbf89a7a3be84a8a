use serde::{Deserialize, Serialize};

use super::message::{Part, ToolCall};

/// Warning attached when tool calling was emulated
pub const WARNING_TOOLS_EMULATED: &str = "tool calls emulated";

/// Reason the model stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of generation
    Stop,
    /// Hit the `max_tokens` limit
    Length,
    /// Model decided to call a tool
    ToolCalls,
    /// Content was filtered by safety systems
    ContentFilter,
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens consumed by the prompt
    pub input: u32,
    /// Tokens generated in the completion
    pub output: u32,
    /// Total tokens
    pub total: u32,
}

impl Usage {
    /// Usage with `total` computed from the two halves
    pub const fn new(input: u32, output: u32) -> Self {
        Self {
            input,
            output,
            total: input.saturating_add(output),
        }
    }
}

/// Result of a successful chat call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Aggregated text output
    pub text: String,
    /// Output as ordered parts
    #[serde(default)]
    pub parts: Vec<Part>,
    /// Model that served the call
    pub model: String,
    /// Tool calls requested by the model
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    /// Token usage
    #[serde(default)]
    pub usage: Usage,
    /// Why generation stopped, when the vendor said
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    /// Untouched vendor payload (absent for streamed calls)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
    /// Best-effort degradations applied to this call
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl ChatResponse {
    /// Whether the model requested any tool calls
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Append a warning once
    pub fn push_warning(&mut self, warning: &str) {
        if !self.warnings.iter().any(|w| w == warning) {
            self.warnings.push(warning.to_owned());
        }
    }
}
