use serde::{Deserialize, Serialize};

use super::response::Usage;

/// Event delivered to the stream callback, in arrival order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamEvent {
    /// Incremental text
    Delta(String),
    /// Incremental tool call data
    ToolCallDelta(ToolCallDelta),
    /// Usage reported mid-stream
    Usage(Usage),
    /// Stream finished; carries the final usage
    Done(Usage),
}

/// Partial tool call within a stream
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    /// Position of the call in the final `tool_calls` list
    pub index: u32,
    /// Call identifier (usually on the first chunk only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Function name (usually on the first chunk only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Fragment of the JSON arguments
    #[serde(default)]
    pub args_chunk: String,
}
