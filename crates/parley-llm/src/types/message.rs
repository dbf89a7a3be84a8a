use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Role of a message participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instruction
    System,
    /// User message
    User,
    /// Assistant response
    Assistant,
    /// Tool/function result
    Tool,
}

impl Role {
    /// Lowercase wire name
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message in a conversation
///
/// Content is either legacy plain text (`content`) or ordered `parts`.
/// When both are set, `parts` wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message author
    pub role: Role,
    /// Plain text content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Structured multimodal content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parts: Option<Vec<Part>>,
    /// Optional participant name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Tool calls made by the assistant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// ID of the tool call this message is a response to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    /// Plain text message with the given role
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(text.into()),
            parts: None,
            name: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// System instruction
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }

    /// User text message
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    /// User message made of multimodal parts
    pub fn user_parts(parts: Vec<Part>) -> Self {
        Self {
            role: Role::User,
            content: None,
            parts: Some(parts),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Assistant text message
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    /// Assistant turn that requested tool calls
    pub fn assistant_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            parts: None,
            name: None,
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        }
    }

    /// Tool result answering the call with `tool_call_id`
    pub fn tool(tool_call_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::new(Role::Tool, text)
        }
    }

    /// Set the participant name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Effective content as parts, applying the "parts wins" rule
    pub fn content_parts(&self) -> Cow<'_, [Part]> {
        match (&self.parts, &self.content) {
            (Some(parts), _) => Cow::Borrowed(parts.as_slice()),
            (None, Some(text)) if !text.is_empty() => Cow::Owned(vec![Part::text(text.clone())]),
            (None, _) => Cow::Borrowed(&[]),
        }
    }

    /// Concatenated text of the effective content, ignoring non-text parts
    pub fn text(&self) -> String {
        match &self.parts {
            Some(parts) => parts.iter().filter_map(Part::as_text).collect(),
            None => self.content.clone().unwrap_or_default(),
        }
    }

    /// Tool calls on this message, empty when none
    pub fn tool_calls(&self) -> &[ToolCall] {
        self.tool_calls.as_deref().unwrap_or_default()
    }
}

/// One unit of multimodal message content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    /// Text block
    Text {
        /// The text string
        text: String,
    },
    /// Image by reference
    ImageUrl {
        /// HTTP(S) or `data:` URL
        url: String,
    },
    /// Inline image bytes
    ImageBase64 {
        /// Base64-encoded image data (no `data:` prefix)
        data: String,
        /// MIME type such as `image/png`
        mime_type: String,
    },
}

impl Part {
    /// Text part
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Image URL part
    pub fn image_url(url: impl Into<String>) -> Self {
        Self::ImageUrl { url: url.into() }
    }

    /// Inline base64 image part
    pub fn image_base64(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self::ImageBase64 {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Whether this is a text part
    pub const fn is_text(&self) -> bool {
        matches!(self, Self::Text { .. })
    }

    /// Text content, if this is a text part
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::ImageUrl { .. } | Self::ImageBase64 { .. } => None,
        }
    }

    /// Short kind name used in validation messages
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::ImageUrl { .. } => "image_url",
            Self::ImageBase64 { .. } => "image_base64",
        }
    }
}

/// A tool/function call requested by the assistant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Opaque identifier; may carry an encoded thought signature
    pub id: String,
    /// Call type, always "function"
    #[serde(rename = "type", default = "function_type")]
    pub call_type: String,
    /// Function name and arguments
    pub function: FunctionCall,
    /// Vendor continuation token to replay on the next turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought_signature: Option<String>,
}

impl ToolCall {
    /// Build a function tool call
    pub fn function(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            call_type: function_type(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
            thought_signature: None,
        }
    }
}

fn function_type() -> String {
    "function".to_owned()
}

/// Function name and arguments within a tool call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Function name
    pub name: String,
    /// JSON-encoded arguments
    pub arguments: String,
}
