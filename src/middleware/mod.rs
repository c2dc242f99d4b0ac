// Resilience layer around provider calls
//
// Key rotation and quota accounting, health probing, per-provider circuit breaking

pub mod circuit_breaker;
pub mod health_checker;
pub mod key_pool;
pub mod key_store;

// Re-export commonly used types
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState, ProviderBreakers};
pub use health_checker::{HealthChecker, ProbeReport};
pub use key_pool::{KeyPool, KeyRecord, KeyStatus};
pub use key_store::{KeyFile, KeyStore};
