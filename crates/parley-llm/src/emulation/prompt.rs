//! Decision request construction

use crate::types::{Message, Request, Role};

const INSTRUCTION: &str = "\
You are a tool-selection step. Decide whether the conversation requires calling one or more of the tools below.
Respond with a single JSON object and nothing else: no prose, no markdown, no explanation.

Use exactly one of these shapes:
{\"tool\": \"<tool name>\" or null, \"arguments\": { ... }}
{\"tools\": [{\"tool\": \"<tool name>\", \"arguments\": { ... }}]}

Use {\"tool\": null, \"arguments\": {}} when no tool is needed.
Arguments must be a JSON object matching the tool's parameters schema.";

/// Derive the decision request from the caller's request
///
/// System and tool messages are dropped, only the latest assistant message
/// survives (without its tool calls), and a synthesized system message
/// describing the tools leads the conversation. The result carries no
/// tools, no tool choice and no stream callback.
pub(crate) fn decision_request(request: &Request) -> Request {
    let latest_assistant = request.messages().iter().rposition(|m| m.role == Role::Assistant);

    let mut messages = vec![Message::system(system_prompt(request))];
    messages.extend(
        request
            .messages()
            .iter()
            .enumerate()
            .filter(|(index, message)| match message.role {
                Role::System | Role::Tool => false,
                Role::Assistant => Some(*index) == latest_assistant,
                Role::User => true,
            })
            .map(|(_, message)| {
                let mut message = message.clone();
                message.tool_calls = None;
                message
            }),
    );

    let mut decision = request.without_tools().without_stream();
    decision.messages = messages;
    decision
}

/// Instruction, accepted shapes, tool catalogue and choice constraint
pub(crate) fn system_prompt(request: &Request) -> String {
    let catalogue = serde_json::Value::Array(
        request
            .tools()
            .iter()
            .map(|tool| {
                serde_json::json!({
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.normalized_parameters(),
                })
            })
            .collect(),
    );

    let mut prompt = format!("{INSTRUCTION}\n\nAvailable tools:\n{catalogue:#}");
    if let Some(choice) = request.tool_choice() {
        prompt.push_str("\n\n");
        prompt.push_str(&choice.describe());
    }
    prompt
}
