//! Shared helpers for the integration tests

#![allow(dead_code)]

pub mod mock_llm;

use parley_config::{LlmConfig, ProviderConfig, ProviderType};
use parley_llm::Client;
use secrecy::SecretString;
use url::Url;

/// Install a test subscriber honoring `RUST_LOG`; repeated calls are no-ops
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Builder for constructing test configurations
pub struct ConfigBuilder {
    config: LlmConfig,
}

impl ConfigBuilder {
    /// Empty configuration
    pub fn new() -> Self {
        Self {
            config: LlmConfig::default(),
        }
    }

    /// Add an OpenAI-compatible provider pointed at a mock backend
    pub fn with_openai_provider(mut self, name: &str, base_url: &str) -> Self {
        let mut provider = ProviderConfig::new(ProviderType::Openai);
        provider.api_key = Some(SecretString::from("test-key"));
        provider.base_url = Some(Url::parse(base_url).unwrap());
        provider.default_model = Some("mock-model-1".to_owned());
        self.config.providers.insert(name.to_owned(), provider);
        self
    }

    /// Provider used when a request carries no override
    pub fn with_default_provider(mut self, name: &str) -> Self {
        self.config.default_provider = Some(name.to_owned());
        self
    }

    /// Build the final config
    pub fn build(self) -> LlmConfig {
        self.config
    }

    /// Build a client straight from the config
    pub fn client(self) -> Client {
        init_tracing();
        Client::from_config(&self.config).unwrap()
    }
}
