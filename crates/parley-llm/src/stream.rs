//! Streaming accumulation shared by every streaming adapter
//!
//! Adapters translate vendor chunks into [`StreamEvent`]s and push them
//! here. The accumulator forwards each event to the caller's callback
//! before returning, builds the final [`ChatResponse`], and emits the
//! single closing [`StreamEvent::Done`].

use std::collections::BTreeMap;

use crate::error::LlmError;
use crate::tool_id;
use crate::types::{ChatResponse, FinishReason, Part, StreamCallback, StreamEvent, ToolCall, ToolCallDelta, Usage};

/// Tool call being assembled from deltas
#[derive(Debug, Default)]
struct PartialToolCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Collects stream events into a response while forwarding them
pub struct StreamAccumulator {
    provider: String,
    callback: StreamCallback,
    text: String,
    tool_calls: BTreeMap<u32, PartialToolCall>,
    usage: Usage,
    model: String,
    finish_reason: Option<FinishReason>,
}

impl StreamAccumulator {
    /// Accumulator for one streamed call
    pub fn new(provider: impl Into<String>, callback: StreamCallback) -> Self {
        Self {
            provider: provider.into(),
            callback,
            text: String::new(),
            tool_calls: BTreeMap::new(),
            usage: Usage::default(),
            model: String::new(),
            finish_reason: None,
        }
    }

    /// Record an event, then hand it to the callback
    ///
    /// `Done` is reserved for [`finish`](Self::finish); a pushed `Done`
    /// only updates the usage.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::StreamCancelled`] when the callback fails
    pub fn push(&mut self, event: StreamEvent) -> Result<(), LlmError> {
        match &event {
            StreamEvent::Delta(text) => self.text.push_str(text),
            StreamEvent::ToolCallDelta(delta) => self.apply_tool_delta(delta),
            StreamEvent::Usage(usage) => self.usage = *usage,
            StreamEvent::Done(usage) => {
                self.usage = *usage;
                return Ok(());
            }
        }

        self.emit(&event)
    }

    /// Record the model reported by the vendor
    pub fn set_model(&mut self, model: impl Into<String>) {
        let model = model.into();
        if !model.is_empty() {
            self.model = model;
        }
    }

    /// Record the finish reason reported by the vendor
    pub const fn set_finish_reason(&mut self, reason: FinishReason) {
        self.finish_reason = Some(reason);
    }

    /// Usage seen so far
    pub const fn usage(&self) -> Usage {
        self.usage
    }

    /// Emit `Done` with the final usage and build the response
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::StreamCancelled`] when the callback rejects `Done`
    pub fn finish(self) -> Result<ChatResponse, LlmError> {
        self.emit(&StreamEvent::Done(self.usage))?;

        let tool_calls: Vec<ToolCall> = self
            .tool_calls
            .into_iter()
            .map(|(index, partial)| {
                let id = partial.id.unwrap_or_else(|| format!("call_{index}"));
                let mut call = ToolCall::function(id, partial.name, partial.arguments);
                call.thought_signature = tool_id::decode(&call.id).1;
                call
            })
            .collect();

        let parts = if self.text.is_empty() {
            Vec::new()
        } else {
            vec![Part::text(self.text.clone())]
        };

        Ok(ChatResponse {
            text: self.text,
            parts,
            model: self.model,
            tool_calls,
            usage: self.usage,
            finish_reason: self.finish_reason,
            raw: None,
            warnings: Vec::new(),
        })
    }

    fn apply_tool_delta(&mut self, delta: &ToolCallDelta) {
        let partial = self.tool_calls.entry(delta.index).or_default();
        if let Some(id) = delta.id.as_deref().filter(|id| !id.is_empty()) {
            partial.id = Some(id.to_owned());
        }
        if let Some(name) = delta.name.as_deref().filter(|name| !name.is_empty()) {
            name.clone_into(&mut partial.name);
        }
        partial.arguments.push_str(&delta.args_chunk);
    }

    fn emit(&self, event: &StreamEvent) -> Result<(), LlmError> {
        (self.callback)(event).map_err(|source| {
            tracing::debug!(provider = %self.provider, error = %source, "stream callback stopped the stream");
            LlmError::StreamCancelled {
                provider: self.provider.clone(),
                source,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn recording() -> (StreamCallback, Arc<Mutex<Vec<StreamEvent>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: StreamCallback = Arc::new(move |event: &StreamEvent| {
            sink.lock().unwrap().push(event.clone());
            Ok(())
        });
        (callback, seen)
    }

    #[test]
    fn text_deltas_then_done() {
        let (callback, seen) = recording();
        let mut acc = StreamAccumulator::new("mock", callback);

        acc.push(StreamEvent::Delta("Hel".to_owned())).unwrap();
        acc.push(StreamEvent::Delta("lo".to_owned())).unwrap();
        acc.push(StreamEvent::Usage(Usage::new(3, 2))).unwrap();
        let response = acc.finish().unwrap();

        assert_eq!(response.text, "Hello");
        assert_eq!(response.parts, [Part::text("Hello")]);
        assert_eq!(response.usage, Usage::new(3, 2));
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            [
                StreamEvent::Delta("Hel".to_owned()),
                StreamEvent::Delta("lo".to_owned()),
                StreamEvent::Usage(Usage::new(3, 2)),
                StreamEvent::Done(Usage::new(3, 2)),
            ]
        );
    }

    #[test]
    fn tool_call_chunks_assemble_by_index() {
        let (callback, _) = recording();
        let mut acc = StreamAccumulator::new("mock", callback);

        let deltas = [
            (1, Some("call_b"), Some("second"), "{}"),
            (0, Some("call_a"), Some("first"), "{\"ci"),
            (0, None, None, "ty\":\"Paris\"}"),
        ];
        for (index, id, name, args) in deltas {
            acc.push(StreamEvent::ToolCallDelta(ToolCallDelta {
                index,
                id: id.map(str::to_owned),
                name: name.map(str::to_owned),
                args_chunk: args.to_owned(),
            }))
            .unwrap();
        }

        let response = acc.finish().unwrap();
        assert_eq!(response.tool_calls.len(), 2);
        assert_eq!(response.tool_calls[0].id, "call_a");
        assert_eq!(response.tool_calls[0].function.name, "first");
        assert_eq!(response.tool_calls[0].function.arguments, "{\"city\":\"Paris\"}");
        assert_eq!(response.tool_calls[1].function.name, "second");
        assert!(response.text.is_empty());
    }

    #[test]
    fn signature_recovered_from_encoded_id() {
        let (callback, _) = recording();
        let mut acc = StreamAccumulator::new("mock", callback);
        acc.push(StreamEvent::ToolCallDelta(ToolCallDelta {
            index: 0,
            id: Some(tool_id::encode("fc_0", Some("sig"))),
            name: Some("f".to_owned()),
            args_chunk: "{}".to_owned(),
        }))
        .unwrap();

        let response = acc.finish().unwrap();
        assert_eq!(response.tool_calls[0].thought_signature.as_deref(), Some("sig"));
    }

    #[test]
    fn callback_error_cancels() {
        let callback: StreamCallback = Arc::new(|_: &StreamEvent| anyhow::bail!("enough"));
        let mut acc = StreamAccumulator::new("mock", callback);

        let err = acc.push(StreamEvent::Delta("x".to_owned())).unwrap_err();
        assert!(matches!(err, LlmError::StreamCancelled { ref provider, .. } if provider == "mock"));
    }
}
