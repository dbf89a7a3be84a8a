use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::stream::StreamEvent;

/// Callback invoked synchronously for every stream event
///
/// Returning an error stops the stream and fails the call with
/// [`LlmError::StreamCancelled`](crate::LlmError::StreamCancelled).
pub type StreamCallback = Arc<dyn Fn(&StreamEvent) -> anyhow::Result<()> + Send + Sync>;

/// Observational sink receiving `(label, payload)` pairs
pub type DebugSink = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Tool-calling emulation mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmulationMode {
    /// Native tool calling only
    #[default]
    Off,
    /// Native first; emulate when tools were supplied and none came back
    Fallback,
    /// Always emulate when tools are present
    Force,
}

/// Vendor escape hatches
///
/// Each map is merged last into that vendor's wire body, top-level keys
/// overwriting whatever the adapter produced. No compatibility guarantee.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VendorExtras {
    /// Extra fields for OpenAI chat completions
    pub openai: serde_json::Map<String, serde_json::Value>,
    /// Extra fields for the Anthropic Messages API
    pub anthropic: serde_json::Map<String, serde_json::Value>,
    /// Extra fields for Google `generateContent`
    pub google: serde_json::Map<String, serde_json::Value>,
}

/// Per-request generation options
#[derive(Clone, Default)]
pub struct Options {
    /// Sampling temperature
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    pub top_p: Option<f64>,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
    /// Stop sequences
    pub stop: Vec<String>,
    /// Presence penalty
    pub presence_penalty: Option<f64>,
    /// Frequency penalty
    pub frequency_penalty: Option<f64>,
    /// End-user identifier
    pub user: Option<String>,
    /// Tool-calling emulation mode
    pub emulation_mode: EmulationMode,
    /// Stream callback; its presence turns streaming on
    pub stream: Option<StreamCallback>,
    /// Debug sink for wire payloads
    pub debug: Option<DebugSink>,
    /// Vendor-specific fields
    pub extras: VendorExtras,
}

impl Options {
    /// Whether a stream callback is attached
    pub fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }

    /// Forward a payload to the debug sink, if any
    pub(crate) fn debug(&self, label: &str, payload: &str) {
        if let Some(sink) = &self.debug {
            sink(label, payload);
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("temperature", &self.temperature)
            .field("top_p", &self.top_p)
            .field("max_tokens", &self.max_tokens)
            .field("stop", &self.stop)
            .field("presence_penalty", &self.presence_penalty)
            .field("frequency_penalty", &self.frequency_penalty)
            .field("user", &self.user)
            .field("emulation_mode", &self.emulation_mode)
            .field("stream", &self.stream.is_some())
            .field("debug", &self.debug.is_some())
            .field("extras", &self.extras)
            .finish()
    }
}

/// Merge escape-hatch fields into a serialized wire body
pub(crate) fn merge_extras(body: &mut serde_json::Value, extras: &serde_json::Map<String, serde_json::Value>) {
    if let Some(object) = body.as_object_mut() {
        for (key, value) in extras {
            object.insert(key.clone(), value.clone());
        }
    }
}
