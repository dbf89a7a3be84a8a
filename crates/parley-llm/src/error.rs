use thiserror::Error;

/// Errors that can occur during a chat call
///
/// Nothing in the crate retries: every variant reaches the caller of
/// [`Client::chat`](crate::Client::chat) as produced.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Missing key or model, or an unknown provider name
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed message, part, role or tool shape
    #[error("invalid request: {0}")]
    Validation(String),

    /// Transport failure or non-success vendor response
    #[error("provider '{provider}' failed: {message}")]
    Provider {
        /// Adapter that produced the error
        provider: String,
        /// HTTP status, when the vendor answered at all
        status: Option<u16>,
        /// Vendor message, or the transport error
        message: String,
        /// Raw vendor error body, when available
        body: Option<String>,
    },

    /// The selected provider cannot serve some part of the request
    #[error("provider '{provider}' does not support {capability}")]
    Unsupported {
        /// Adapter that rejected the request
        provider: String,
        /// Capability that is missing (e.g. "streaming")
        capability: String,
    },

    /// The stream callback asked to stop
    #[error("stream from '{provider}' stopped by callback: {source}")]
    StreamCancelled {
        /// Adapter whose stream was interrupted
        provider: String,
        /// Error returned by the callback
        source: anyhow::Error,
    },

    /// Emulated tool decision could not be read as JSON
    #[error("tool emulation: could not parse decision: {0}")]
    EmulationParse(String),

    /// Emulated tool decision violates the request's tool choice
    #[error("tool emulation: decision violates tool choice: {0}")]
    EmulationPolicy(String),

    /// Emulated tool decision names a tool the request does not define
    #[error("tool emulation: unknown tool '{name}'")]
    UnknownTool {
        /// Tool name chosen by the model
        name: String,
    },

    /// A replayed tool call lost the vendor continuation token
    #[error(
        "tool call '{tool}' (id '{id}') has no thought signature; pass the previous turn's tool calls back \
         verbatim, including their ids and thought_signature fields"
    )]
    MissingThoughtSignature {
        /// Function name of the offending call
        tool: String,
        /// Identifier as received
        id: String,
    },

    /// The call's cancellation token fired
    #[error("request cancelled")]
    Cancelled,
}

impl LlmError {
    /// Build a provider error without an HTTP response
    pub(crate) fn transport(provider: &str, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.to_owned(),
            status: None,
            message: message.into(),
            body: None,
        }
    }

    /// Build an unsupported-capability error
    pub(crate) fn unsupported(provider: &str, capability: impl Into<String>) -> Self {
        Self::Unsupported {
            provider: provider.to_owned(),
            capability: capability.into(),
        }
    }

    /// HTTP status of a vendor error, if any
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Provider { status, .. } => *status,
            _ => None,
        }
    }

    /// Whether the error was raised before any network traffic
    pub const fn is_local(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::Validation(_) | Self::Unsupported { .. } | Self::MissingThoughtSignature { .. }
        )
    }
}
