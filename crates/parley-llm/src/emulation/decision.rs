//! Decision parsing and tool-choice enforcement

use serde_json::{Map, Value};

use crate::error::LlmError;
use crate::types::ToolChoice;

/// One tool call chosen by the decision model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecidedCall {
    /// Tool name
    pub name: String,
    /// Arguments as a compact JSON object string
    pub arguments: String,
}

/// Parse the decision text into zero or more calls
///
/// Accepts `{"tool": name|null, "arguments": {...}}` or
/// `{"tools": [{"tool": name, "arguments": {...}}, ...]}`. The object may be
/// the whole text, a fenced code block, or embedded in prose.
///
/// # Errors
///
/// Returns [`LlmError::EmulationParse`] when no JSON object can be
/// recovered, `tool` is not a string, or `arguments` is not an object
pub fn parse_decision(text: &str) -> Result<Vec<DecidedCall>, LlmError> {
    let object = extract_object(text).ok_or_else(|| {
        LlmError::EmulationParse(format!("no JSON object found in decision: {}", snippet(text)))
    })?;

    match object.get("tools") {
        Some(Value::Array(entries)) => entries
            .iter()
            .filter_map(|entry| match entry {
                Value::Object(entry) => parse_entry(entry).transpose(),
                other => Some(Err(LlmError::EmulationParse(format!(
                    "\"tools\" entries must be objects, got {other}"
                )))),
            })
            .collect(),
        Some(Value::Null) | None => Ok(parse_entry(&object)?.into_iter().collect()),
        Some(other) => Err(LlmError::EmulationParse(format!("\"tools\" must be an array, got {other}"))),
    }
}

/// Single `{tool, arguments}` entry; `None` when no tool was chosen
fn parse_entry(entry: &Map<String, Value>) -> Result<Option<DecidedCall>, LlmError> {
    let name = match entry.get("tool") {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(name)) if name.trim().is_empty() => return Ok(None),
        Some(Value::String(name)) => name.trim().to_owned(),
        Some(other) => {
            return Err(LlmError::EmulationParse(format!("\"tool\" must be a string, got {other}")));
        }
    };

    let arguments = match entry.get("arguments") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(args)) => args.clone(),
        Some(Value::String(raw)) if raw.trim().is_empty() => Map::new(),
        Some(Value::String(raw)) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(args)) => args,
            _ => {
                return Err(LlmError::EmulationParse(format!(
                    "arguments for '{name}' are not a JSON object: {}",
                    snippet(raw)
                )));
            }
        },
        Some(other) => {
            return Err(LlmError::EmulationParse(format!(
                "arguments for '{name}' must be an object, got {other}"
            )));
        }
    };

    Ok(Some(DecidedCall {
        name,
        arguments: Value::Object(arguments).to_string(),
    }))
}

/// First JSON object recoverable from the text
///
/// Tries the trimmed text, then each fenced block, then the span from the
/// first `{` to the last `}`. Best effort: prose that merely looks like
/// JSON may be picked up, and anything unparseable ends in `None`.
fn extract_object(text: &str) -> Option<Map<String, Value>> {
    let trimmed = text.trim();

    std::iter::once(trimmed)
        .chain(fenced_blocks(trimmed))
        .chain(brace_span(trimmed))
        .find_map(|candidate| match serde_json::from_str::<Value>(candidate.trim()) {
            Ok(Value::Object(object)) => Some(object),
            _ => None,
        })
}

/// Bodies of triple-backtick fences, with an optional language tag dropped
fn fenced_blocks(text: &str) -> impl Iterator<Item = &str> {
    text.split("```").skip(1).step_by(2).map(|block| {
        let block = block.trim_start_matches(|c: char| c == ' ' || c == '\t');
        match block.split_once('\n') {
            Some((tag, body)) if !tag.trim_start().starts_with('{') => body,
            _ => block,
        }
    })
}

fn brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

fn snippet(text: &str) -> String {
    const MAX: usize = 200;
    let mut out: String = text.chars().take(MAX).collect();
    if text.chars().count() > MAX {
        out.push_str("...");
    }
    out
}

/// Enforce the request's tool choice against the decided calls
///
/// # Errors
///
/// Returns [`LlmError::EmulationPolicy`] when `none` meets a call,
/// `required` meets none, or `function(name)` is not exactly one call to
/// `name`
pub fn check_policy(choice: Option<&ToolChoice>, calls: &[DecidedCall]) -> Result<(), LlmError> {
    match choice {
        None | Some(ToolChoice::Auto) => Ok(()),
        Some(ToolChoice::None) if !calls.is_empty() => Err(LlmError::EmulationPolicy(format!(
            "tool choice is none but the decision called {} tool(s)",
            calls.len()
        ))),
        Some(ToolChoice::None) => Ok(()),
        Some(ToolChoice::Required) if calls.is_empty() => Err(LlmError::EmulationPolicy(
            "tool choice is required but the decision called no tool".to_owned(),
        )),
        Some(ToolChoice::Required) => Ok(()),
        Some(ToolChoice::Function(name)) => match calls {
            [call] if call.name == *name => Ok(()),
            _ => Err(LlmError::EmulationPolicy(format!(
                "tool choice requires exactly one call to '{name}', decision called [{}]",
                calls.iter().map(|c| c.name.as_str()).collect::<Vec<_>>().join(", ")
            ))),
        },
    }
}
