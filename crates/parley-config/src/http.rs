use std::time::Duration;

use serde::Deserialize;

/// Default whole-request timeout for vendor calls
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Default cap on a buffered (non-streaming) response body
const DEFAULT_MAX_RESPONSE_BYTES: usize = 16 * 1024 * 1024;

/// HTTP limits owned by each adapter's client
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpSettings {
    /// Whole-request timeout (e.g. "30s", "2m")
    #[serde(default = "default_timeout", deserialize_with = "duration_str::deserialize_duration")]
    pub timeout: Duration,
    /// Largest non-streaming response body accepted, in bytes
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
        }
    }
}

const fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

const fn default_max_response_bytes() -> usize {
    DEFAULT_MAX_RESPONSE_BYTES
}
