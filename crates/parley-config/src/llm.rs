use indexmap::IndexMap;
use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

use crate::http::HttpSettings;

/// Top-level provider configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    /// Provider used when a request carries no override
    #[serde(default)]
    pub default_provider: Option<String>,
    /// Provider configurations keyed by name, in declaration order
    #[serde(default)]
    pub providers: IndexMap<String, ProviderConfig>,
}

/// Configuration for a single provider adapter
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Wire protocol spoken by the vendor
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
    /// API key for authentication
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Base URL override
    #[serde(default)]
    pub base_url: Option<Url>,
    /// Model used when a request leaves `model` empty
    #[serde(default)]
    pub default_model: Option<String>,
    /// Timeout and body-size limits
    #[serde(default)]
    pub http: HttpSettings,
    /// Substitute the vendor's skip token when a replayed tool call has no
    /// thought signature instead of failing (Google only)
    #[serde(default)]
    pub allow_missing_thought_signature: bool,
}

impl ProviderConfig {
    /// Minimal configuration for a provider type with everything else defaulted
    pub fn new(provider_type: ProviderType) -> Self {
        Self {
            provider_type,
            api_key: None,
            base_url: None,
            default_model: None,
            http: HttpSettings::default(),
            allow_missing_thought_signature: false,
        }
    }
}

/// Supported vendor protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    /// OpenAI chat completions (and compatible servers)
    Openai,
    /// Anthropic Messages API
    Anthropic,
    /// Google Generative Language API
    Google,
}

impl ProviderType {
    /// Canonical lowercase name
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Openai => "openai",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
        }
    }
}
