pub mod config;
pub mod errors;
pub mod types;

// Re-export commonly used items for convenience
pub use config::Config;
pub use errors::{CacheError, ConfigError, FailureKind, KeyPoolError, ProviderError};
pub use types::{
    FallbackChain, Formality, HealthKind, ProviderId, TranslationContext, TranslationMethod,
    TranslationRequest, TranslationResult, FALLBACK_CHAIN,
};
