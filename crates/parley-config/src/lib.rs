//! Configuration for parley providers
//!
//! Supplies API keys, base URLs, default models and HTTP limits per vendor.
//! Only adapter construction reads these values; the request IR and the
//! emulation engine never see them.

#![allow(clippy::must_use_candidate)]

mod env;
pub mod http;
pub mod llm;
mod loader;

pub use http::HttpSettings;
pub use llm::{LlmConfig, ProviderConfig, ProviderType};
