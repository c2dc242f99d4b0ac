// Custom error types for the translation dispatch layer
//
// Using thiserror for typed errors that the dispatcher can match on,
// anyhow stays at the service boundaries (startup, file I/O).

use std::time::Duration;
use thiserror::Error;

use crate::core::types::ProviderId;

/// Classified failure of a single provider call or probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Unauthorized,
    Forbidden,
    QuotaExceeded,
    RateLimited,
    Unreachable,
    InvalidResponse,
}

impl FailureKind {
    /// Failures that are the credential's fault and take the key out of rotation
    pub fn deactivates_key(self) -> bool {
        matches!(
            self,
            FailureKind::Unauthorized | FailureKind::Forbidden | FailureKind::QuotaExceeded
        )
    }

    /// Credential rejections survive the daily reset
    pub fn revokes_key(self) -> bool {
        matches!(self, FailureKind::Unauthorized | FailureKind::Forbidden)
    }

    /// Failures that say something about the provider rather than the key
    pub fn is_transient(self) -> bool {
        matches!(self, FailureKind::RateLimited | FailureKind::Unreachable)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Unauthorized => "unauthorized",
            FailureKind::Forbidden => "forbidden",
            FailureKind::QuotaExceeded => "quota_exceeded",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::Unreachable => "unreachable",
            FailureKind::InvalidResponse => "invalid_response",
        }
    }
}

/// Provider call errors
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("credential rejected by {provider} (HTTP {status}): {message}")]
    Unauthorized {
        provider: ProviderId,
        status: u16,
        message: String,
    },

    #[error("credential forbidden by {provider}: {message}")]
    Forbidden { provider: ProviderId, message: String },

    #[error("daily quota exhausted on {provider}: {message}")]
    QuotaExceeded { provider: ProviderId, message: String },

    #[error("rate limited by {provider} (retry after {retry_after:?})")]
    RateLimited {
        provider: ProviderId,
        retry_after: Option<Duration>,
    },

    #[error("{provider} unreachable: {message}")]
    Unreachable { provider: ProviderId, message: String },

    #[error("invalid response from {provider}: {message}")]
    InvalidResponse { provider: ProviderId, message: String },
}

impl ProviderError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ProviderError::Unauthorized { .. } => FailureKind::Unauthorized,
            ProviderError::Forbidden { .. } => FailureKind::Forbidden,
            ProviderError::QuotaExceeded { .. } => FailureKind::QuotaExceeded,
            ProviderError::RateLimited { .. } => FailureKind::RateLimited,
            ProviderError::Unreachable { .. } => FailureKind::Unreachable,
            ProviderError::InvalidResponse { .. } => FailureKind::InvalidResponse,
        }
    }

    pub fn timeout(provider: ProviderId, after: Duration) -> Self {
        ProviderError::Unreachable {
            provider,
            message: format!("timed out after {:.1}s", after.as_secs_f64()),
        }
    }

    pub fn invalid(provider: ProviderId, message: impl Into<String>) -> Self {
        ProviderError::InvalidResponse {
            provider,
            message: message.into(),
        }
    }
}

/// Key pool errors
#[derive(Debug, Error)]
pub enum KeyPoolError {
    #[error("no available key for provider {provider}")]
    NoAvailableKey { provider: ProviderId },

    #[error("unknown key: {0}")]
    UnknownKey(String),

    #[error("a key named {0} already exists")]
    DuplicateKey(String),

    #[error("failed to read key file {path}: {source}")]
    LoadFailed {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to write key file {path}: {source}")]
    SaveFailed {
        path: String,
        source: std::io::Error,
    },

    #[error("key file is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Cache storage errors
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Failed to load cache from {path}: {source}")]
    LoadFailed {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to save cache to {path}: {source}")]
    SaveFailed {
        path: String,
        source: std::io::Error,
    },

    #[error("Cache serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cache capacity must be > 0")]
    ZeroCapacity,
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid batch config: {0}")]
    InvalidBatchConfig(String),

    #[error("Invalid dispatch config: {0}")]
    InvalidDispatchConfig(String),

    #[error("Invalid cache path: {0}")]
    InvalidCachePath(String),

    #[error("Cache capacity must be > 0, got {0}")]
    InvalidCacheCapacity(usize),

    #[error("Invalid health check config: {0}")]
    InvalidHealthConfig(String),

    #[error("Environment variable {name} has invalid value {value:?}")]
    EnvVarError { name: String, value: String },
}

pub type ProviderResult<T> = Result<T, ProviderError>;
pub type KeyPoolResult<T> = Result<T, KeyPoolError>;
pub type CacheResult<T> = Result<T, CacheError>;
pub type ConfigResult<T> = Result<T, ConfigError>;
