use crate::core::errors::ConfigError;
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub log_level: Level,
}

/// Key file location and the budget given to providers that need no credential
#[derive(Debug, Clone)]
pub struct KeyConfig {
    pub key_file: String,
    pub keyless_daily_limit: u32,
}

/// Provider endpoints and per-call batch ceilings
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub gemini_max_batch: usize,
    pub deepinfra_url: String,
    pub deepinfra_model: String,
    pub deepinfra_max_batch: usize,
    pub nllb_url: String,
    pub nllb_max_batch: usize,
}

/// Dispatcher behaviour
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub target_language: String,
    pub call_timeout: Duration,
    pub rate_limit_backoff: Duration,
    pub max_concurrent_calls: usize,
}

/// Sub-batch sizing bounds
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub min_batch: usize,
    pub max_batch: usize,
    /// Number of provider calls a workload is ideally spread across
    pub target_calls: usize,
}

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub capacity: usize,
    pub cache_dir: String,
    pub persist: bool,
    pub save_interval: Duration,
}

/// Health probing configuration
#[derive(Debug, Clone)]
pub struct HealthConfig {
    pub probe_timeout: Duration,
    pub probe_delay: Duration,
    /// Zero disables the periodic recovery task
    pub check_interval: Duration,
}

/// Per-provider circuit breaker thresholds
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    pub failure_threshold: usize,
    pub timeout: Duration,
    pub success_threshold: usize,
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub keys: KeyConfig,
    pub providers: ProviderConfig,
    pub dispatch: DispatchConfig,
    pub batch: BatchConfig,
    pub cache: CacheConfig,
    pub health: HealthConfig,
    pub breaker: BreakerConfig,
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_string(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_level(value: &str) -> Option<Level> {
    match value.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

impl Config {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let config = Self::load_from_env()?;
        config.validate()?;
        Ok(config)
    }

    fn load_from_env() -> Result<Self, ConfigError> {
        let log_level = match env::var("LOG_LEVEL") {
            Ok(raw) => parse_level(&raw).ok_or(ConfigError::EnvVarError {
                name: "LOG_LEVEL".to_string(),
                value: raw,
            })?,
            Err(_) => Level::INFO,
        };

        Ok(Self {
            server: ServerConfig {
                port: env_or("SERVER_PORT", 1420),
                host: env_string("SERVER_HOST", "0.0.0.0"),
                log_level,
            },
            keys: KeyConfig {
                key_file: env_string("API_KEYS_FILE", "api_keys.json"),
                keyless_daily_limit: env_or("KEYLESS_DAILY_LIMIT", 5000),
            },
            providers: ProviderConfig {
                gemini_model: env_string("GEMINI_MODEL", "gemini-2.5-flash-lite"),
                gemini_base_url: env_string(
                    "GEMINI_BASE_URL",
                    "https://generativelanguage.googleapis.com/v1beta",
                ),
                gemini_max_batch: env_or("GEMINI_MAX_BATCH", 25),
                deepinfra_url: env_string(
                    "DEEPINFRA_URL",
                    "https://eien-g4f.onrender.com/api/DeepInfra/chat/completions",
                ),
                deepinfra_model: env_string("DEEPINFRA_MODEL", "google/gemma-3-27b-it"),
                deepinfra_max_batch: env_or("DEEPINFRA_MAX_BATCH", 15),
                nllb_url: env_string(
                    "NLLB_URL",
                    "https://winstxnhdw-nllb-api.hf.space/api/v4/translator",
                ),
                nllb_max_batch: env_or("NLLB_MAX_BATCH", 8),
            },
            dispatch: DispatchConfig {
                target_language: env_string("TARGET_LANGUAGE", "vi"),
                call_timeout: Duration::from_secs(env_or("TRANSLATION_TIMEOUT_SECONDS", 30)),
                rate_limit_backoff: Duration::from_millis(env_or("RATE_LIMIT_BACKOFF_MS", 1000)),
                max_concurrent_calls: env::var("MAX_CONCURRENT_CALLS")
                    .ok()
                    .and_then(|s| s.trim().parse().ok())
                    .unwrap_or_else(|| std::cmp::max(num_cpus::get(), 4)),
            },
            batch: BatchConfig {
                min_batch: env_or("MIN_BATCH_SIZE", 3),
                max_batch: env_or("MAX_BATCH_SIZE", 25),
                target_calls: env_or("TARGET_CALLS_PER_BATCH", 4),
            },
            cache: CacheConfig {
                capacity: env_or("CACHE_CAPACITY", 10_000),
                cache_dir: env_string("CACHE_DIR", ".cache"),
                persist: env_or("CACHE_PERSIST", true),
                save_interval: Duration::from_secs(env_or("CACHE_SAVE_INTERVAL_SECONDS", 30)),
            },
            health: HealthConfig {
                probe_timeout: Duration::from_secs(env_or("HEALTH_PROBE_TIMEOUT_SECONDS", 10)),
                probe_delay: Duration::from_millis(env_or("HEALTH_PROBE_DELAY_MS", 1000)),
                check_interval: Duration::from_secs(env_or("HEALTH_CHECK_INTERVAL_SECONDS", 0)),
            },
            breaker: BreakerConfig {
                failure_threshold: env_or("CIRCUIT_FAILURE_THRESHOLD", 5),
                timeout: Duration::from_secs(env_or("CIRCUIT_TIMEOUT_SECONDS", 60)),
                success_threshold: env_or("CIRCUIT_SUCCESS_THRESHOLD", 2),
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch.min_batch == 0 || self.batch.max_batch == 0 {
            return Err(ConfigError::InvalidBatchConfig(format!(
                "batch bounds must be > 0, got min={} max={}",
                self.batch.min_batch, self.batch.max_batch
            )));
        }
        if self.batch.min_batch > self.batch.max_batch {
            return Err(ConfigError::InvalidBatchConfig(format!(
                "min_batch ({}) exceeds max_batch ({})",
                self.batch.min_batch, self.batch.max_batch
            )));
        }
        if self.batch.target_calls == 0 {
            return Err(ConfigError::InvalidBatchConfig(
                "target_calls must be > 0".to_string(),
            ));
        }

        for (name, ceiling) in [
            ("GEMINI_MAX_BATCH", self.providers.gemini_max_batch),
            ("DEEPINFRA_MAX_BATCH", self.providers.deepinfra_max_batch),
            ("NLLB_MAX_BATCH", self.providers.nllb_max_batch),
        ] {
            if ceiling == 0 {
                return Err(ConfigError::InvalidBatchConfig(format!("{} must be > 0", name)));
            }
        }

        if self.dispatch.max_concurrent_calls == 0 {
            return Err(ConfigError::InvalidDispatchConfig(
                "max_concurrent_calls must be > 0".to_string(),
            ));
        }
        if self.dispatch.call_timeout.is_zero() {
            return Err(ConfigError::InvalidDispatchConfig(
                "translation timeout must be > 0".to_string(),
            ));
        }

        if self.cache.capacity == 0 {
            return Err(ConfigError::InvalidCacheCapacity(self.cache.capacity));
        }

        // Validate cache directory parent exists
        let cache_path = Path::new(&self.cache.cache_dir);
        if let Some(parent) = cache_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                return Err(ConfigError::InvalidCachePath(format!(
                    "Parent directory does not exist: {}",
                    parent.display()
                )));
            }
        }

        if self.health.probe_timeout.is_zero() {
            return Err(ConfigError::InvalidHealthConfig(
                "probe timeout must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn server_port(&self) -> u16 {
        self.server.port
    }

    pub fn server_host(&self) -> &str {
        &self.server.host
    }

    pub fn log_level(&self) -> Level {
        self.server.log_level
    }

    pub fn key_file(&self) -> &str {
        &self.keys.key_file
    }

    pub fn target_language(&self) -> &str {
        &self.dispatch.target_language
    }

    pub fn cache_dir(&self) -> &str {
        &self.cache.cache_dir
    }
}

impl Default for Config {
    /// Built-in defaults without reading the environment
    fn default() -> Self {
        Self {
            server: ServerConfig {
                port: 1420,
                host: "0.0.0.0".to_string(),
                log_level: Level::INFO,
            },
            keys: KeyConfig {
                key_file: "api_keys.json".to_string(),
                keyless_daily_limit: 5000,
            },
            providers: ProviderConfig {
                gemini_model: "gemini-2.5-flash-lite".to_string(),
                gemini_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
                gemini_max_batch: 25,
                deepinfra_url: "https://eien-g4f.onrender.com/api/DeepInfra/chat/completions"
                    .to_string(),
                deepinfra_model: "google/gemma-3-27b-it".to_string(),
                deepinfra_max_batch: 15,
                nllb_url: "https://winstxnhdw-nllb-api.hf.space/api/v4/translator".to_string(),
                nllb_max_batch: 8,
            },
            dispatch: DispatchConfig {
                target_language: "vi".to_string(),
                call_timeout: Duration::from_secs(30),
                rate_limit_backoff: Duration::from_millis(1000),
                max_concurrent_calls: 8,
            },
            batch: BatchConfig {
                min_batch: 3,
                max_batch: 25,
                target_calls: 4,
            },
            cache: CacheConfig {
                capacity: 10_000,
                cache_dir: ".cache".to_string(),
                persist: false,
                save_interval: Duration::from_secs(30),
            },
            health: HealthConfig {
                probe_timeout: Duration::from_secs(10),
                probe_delay: Duration::from_millis(1000),
                check_interval: Duration::ZERO,
            },
            breaker: BreakerConfig {
                failure_threshold: 5,
                timeout: Duration::from_secs(60),
                success_threshold: 2,
            },
        }
    }
}
