use std::path::Path;

use crate::LlmConfig;

impl LlmConfig {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or any later step fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        tracing::debug!(path = %path.display(), "loading provider configuration");

        Self::parse(&raw)
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if environment expansion, TOML parsing or validation fails
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error naming the first inconsistent provider entry
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(default) = &self.default_provider
            && !self.providers.contains_key(default)
        {
            anyhow::bail!("default_provider '{default}' is not a configured provider");
        }

        for (name, provider) in &self.providers {
            if name.trim().is_empty() {
                anyhow::bail!("provider names must not be empty");
            }

            if let Some(base_url) = &provider.base_url
                && !matches!(base_url.scheme(), "http" | "https")
            {
                anyhow::bail!("provider '{name}' base_url must use http or https, got '{}'", base_url.scheme());
            }

            if provider.http.timeout.is_zero() {
                anyhow::bail!("provider '{name}' http.timeout must be greater than 0");
            }

            if provider.http.max_response_bytes == 0 {
                anyhow::bail!("provider '{name}' http.max_response_bytes must be greater than 0");
            }

            if provider
                .default_model
                .as_deref()
                .is_some_and(|m| m.trim().is_empty())
            {
                anyhow::bail!("provider '{name}' default_model must not be blank");
            }
        }

        Ok(())
    }
}
