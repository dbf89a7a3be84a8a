//! Thought-signature transport through tool-call identifiers
//!
//! Some vendors attach an opaque continuation token (a "thought signature")
//! to each function call and reject the next turn if it is not replayed.
//! Callers only round-trip `ToolCall::id`, so the token rides inside it:
//! `<base>|ts:<base64url(signature)>`.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use crate::error::LlmError;
use crate::types::ToolCall;

/// Separator between the base id and the encoded signature
const MARKER: &str = "|ts:";

/// Append an encoded signature to `base`, or return `base` when there is none
pub fn encode(base: &str, signature: Option<&str>) -> String {
    match signature {
        Some(signature) if !signature.is_empty() => {
            format!("{base}{MARKER}{}", URL_SAFE_NO_PAD.encode(signature))
        }
        _ => base.to_owned(),
    }
}

/// Split an id into its base and signature
///
/// Ids without the marker, or whose suffix is not valid base64url UTF-8,
/// come back unchanged with no signature.
pub fn decode(id: &str) -> (String, Option<String>) {
    let Some((base, suffix)) = id.rsplit_once(MARKER) else {
        return (id.to_owned(), None);
    };

    match URL_SAFE_NO_PAD.decode(suffix).ok().and_then(|bytes| String::from_utf8(bytes).ok()) {
        Some(signature) if !signature.is_empty() => (base.to_owned(), Some(signature)),
        _ => (id.to_owned(), None),
    }
}

/// Signature to replay for a historical tool call
///
/// An explicit `thought_signature` wins; otherwise the id is decoded.
///
/// # Errors
///
/// Returns [`LlmError::MissingThoughtSignature`] when neither source has one
pub fn resolve_thought_signature(call: &ToolCall) -> Result<String, LlmError> {
    if let Some(signature) = call.thought_signature.as_deref().filter(|s| !s.is_empty()) {
        return Ok(signature.to_owned());
    }

    decode(&call.id).1.ok_or_else(|| LlmError::MissingThoughtSignature {
        tool: call.function.name.clone(),
        id: call.id.clone(),
    })
}
