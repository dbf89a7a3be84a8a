//! Tool-calling emulation
//!
//! Synthesizes function calling for providers or models without native
//! support. The engine asks the model for a JSON decision, checks it
//! against the request's tool choice, and either returns synthesized
//! [`ToolCall`]s or re-issues the request without tools for a plain
//! answer. Every response it produces carries the
//! [`WARNING_TOOLS_EMULATED`] warning.
//!
//! At most three sequential calls are made: the native attempt (fallback
//! mode only), the decision call, and the final re-issue. A streaming
//! caller sees exactly one stream: the native attempt's events are
//! buffered and replayed only when that attempt is kept.

mod decision;
mod prompt;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

pub use decision::{DecidedCall, check_policy, parse_decision};

use crate::client;
use crate::context::CallContext;
use crate::error::LlmError;
use crate::provider::Provider;
use crate::stream::StreamAccumulator;
use crate::types::{
    ChatResponse, EmulationMode, FinishReason, Request, StreamEvent, ToolCall, ToolCallDelta, WARNING_TOOLS_EMULATED,
};

/// Run one chat call under the request's emulation mode
pub(crate) async fn chat(
    provider: &dyn Provider,
    request: &Request,
    context: &CallContext,
) -> Result<ChatResponse, LlmError> {
    let mode = request.options().emulation_mode;
    if !request.has_tools() || mode == EmulationMode::Off {
        return client::dispatch(provider, request, context).await;
    }

    // The decision call never streams, so check before spending it
    if request.options().is_streaming() && !provider.capabilities().streaming {
        return Err(LlmError::unsupported(provider.name(), "streaming"));
    }

    if mode == EmulationMode::Fallback && provider.capabilities().tool_calling {
        match native_attempt(provider, request, context).await? {
            Some(native) => return Ok(native),
            None => tracing::debug!(provider = %provider.name(), "native attempt returned no tool calls"),
        }
    }

    tracing::info!(
        provider = %provider.name(),
        mode = ?mode,
        tools = request.tools().len(),
        "emulating tool calls"
    );

    emulate(provider, request, context).await
}

/// Native call whose stream is held back until it is known to be kept
///
/// Returns `None` when the model made no tool calls; the buffered events
/// are then dropped so the caller only sees the emulated answer.
async fn native_attempt(
    provider: &dyn Provider,
    request: &Request,
    context: &CallContext,
) -> Result<Option<ChatResponse>, LlmError> {
    let Some(callback) = request.options().stream.clone() else {
        let native = client::dispatch(provider, request, context).await?;
        return Ok(native.has_tool_calls().then_some(native));
    };

    let buffer: Arc<Mutex<Vec<StreamEvent>>> = Arc::default();
    let sink = Arc::clone(&buffer);
    let mut buffered = request.clone();
    buffered.options.stream = Some(Arc::new(move |event: &StreamEvent| -> anyhow::Result<()> {
        sink.lock().unwrap_or_else(PoisonError::into_inner).push(event.clone());
        Ok(())
    }));

    let native = client::dispatch(provider, &buffered, context).await?;
    if !native.has_tool_calls() {
        return Ok(None);
    }

    let events = std::mem::take(&mut *buffer.lock().unwrap_or_else(PoisonError::into_inner));
    for event in &events {
        callback(event).map_err(|source| LlmError::StreamCancelled {
            provider: provider.name().to_owned(),
            source,
        })?;
    }
    Ok(Some(native))
}

/// Decision, policy check, then one of the two branches
async fn emulate(provider: &dyn Provider, request: &Request, context: &CallContext) -> Result<ChatResponse, LlmError> {
    let decision_request = prompt::decision_request(request);
    let decision = client::dispatch(provider, &decision_request, context).await?;

    let calls = parse_decision(&decision.text)?;
    check_policy(request.tool_choice(), &calls)?;

    if calls.is_empty() {
        tracing::debug!(provider = %provider.name(), "decision chose no tool, re-issuing without tools");
        let mut response = client::dispatch(provider, &request.without_tools(), context).await?;
        response.push_warning(WARNING_TOOLS_EMULATED);
        return Ok(response);
    }

    if let Some(unknown) = calls.iter().find(|call| request.tool(&call.name).is_none()) {
        return Err(LlmError::UnknownTool {
            name: unknown.name.clone(),
        });
    }

    synthesize(provider.name(), request, decision, calls)
}

/// Response carrying only the decided tool calls
///
/// A streaming caller still sees the calls as deltas followed by `Done`.
fn synthesize(
    provider: &str,
    request: &Request,
    decision: ChatResponse,
    calls: Vec<DecidedCall>,
) -> Result<ChatResponse, LlmError> {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_nanos());

    let tool_calls: Vec<ToolCall> = calls
        .into_iter()
        .enumerate()
        .map(|(index, call)| ToolCall::function(format!("emulated_{stamp}_{index}"), call.name, call.arguments))
        .collect();

    if let Some(callback) = request.options().stream.clone() {
        let mut acc = StreamAccumulator::new(provider, callback);
        for (index, call) in (0_u32..).zip(&tool_calls) {
            acc.push(StreamEvent::ToolCallDelta(ToolCallDelta {
                index,
                id: Some(call.id.clone()),
                name: Some(call.function.name.clone()),
                args_chunk: call.function.arguments.clone(),
            }))?;
        }
        acc.push(StreamEvent::Done(decision.usage))?;
        acc.finish()?;
    }

    Ok(ChatResponse {
        model: decision.model,
        tool_calls,
        usage: decision.usage,
        finish_reason: Some(FinishReason::ToolCalls),
        raw: decision.raw,
        warnings: vec![WARNING_TOOLS_EMULATED.to_owned()],
        ..ChatResponse::default()
    })
}
