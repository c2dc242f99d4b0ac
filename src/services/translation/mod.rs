pub mod cache;
pub mod deepinfra;
pub mod gemini;
pub mod http;
pub mod nllb;
pub mod phrases;
pub mod provider;

pub use cache::{CacheKey, CacheStats, TranslationCache};
pub use deepinfra::DeepInfraProvider;
pub use gemini::GeminiProvider;
pub use nllb::NllbProvider;
pub use provider::{ProviderRegistry, TranslationProvider};

use anyhow::Result;
use std::sync::Arc;

use crate::core::config::ProviderConfig;

/// Registry with the three HTTP adapters sharing one client
pub fn default_registry(config: &ProviderConfig) -> Result<ProviderRegistry> {
    let client = http::build_client()?;
    Ok(ProviderRegistry::new()
        .with(Arc::new(GeminiProvider::new(client.clone(), config)))
        .with(Arc::new(DeepInfraProvider::new(client.clone(), config)))
        .with(Arc::new(NllbProvider::new(client, config))))
}
