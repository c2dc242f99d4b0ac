// Library exports for the manga bubble translation dispatcher

// Core modules
pub mod core;
pub mod middleware;
pub mod orchestration;
pub mod services;
pub mod utils;

// Re-export commonly used types and functions
pub use core::{
    config::Config,
    errors::{CacheError, ConfigError, FailureKind, KeyPoolError, ProviderError},
    types::{
        FallbackChain, Formality, HealthKind, ProviderId, TranslationContext, TranslationMethod,
        TranslationRequest, TranslationResult,
    },
};

pub use middleware::{CircuitBreaker, CircuitBreakerConfig, CircuitState, HealthChecker, KeyPool, KeyRecord};

pub use orchestration::{BatchOptimizer, DispatchState, Dispatcher, LoadHint};

pub use services::{ProviderRegistry, TranslationCache, TranslationProvider};

pub use utils::Metrics;
