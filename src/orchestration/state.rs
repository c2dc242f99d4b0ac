// Shared dispatch state: the key pool and the translation cache

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info};

use crate::core::config::Config;
use crate::core::types::ProviderId;
use crate::middleware::key_pool::{KeyPool, KeyRecord};
use crate::services::translation::{phrases, TranslationCache};
use crate::utils::Metrics;

/// Budget records for the providers reachable without a credential
const KEYLESS: [(ProviderId, &str); 2] = [
    (ProviderId::Secondary, "deepinfra-public"),
    (ProviderId::Neural, "nllb-public"),
];

/// Everything a dispatcher mutates across requests.
///
/// Built once by [`DispatchState::init`] and handed to the dispatcher;
/// [`DispatchState::flush`] persists it on shutdown.
pub struct DispatchState {
    pub keys: Arc<KeyPool>,
    pub cache: TranslationCache,
}

impl DispatchState {
    pub fn new(keys: Arc<KeyPool>, cache: TranslationCache) -> Self {
        Self { keys, cache }
    }

    /// Load the key file and the cache described by `config`
    pub async fn init(config: &Config, metrics: Option<Metrics>) -> Result<Self> {
        let keys = KeyPool::load(config.key_file(), metrics.clone())
            .await
            .with_context(|| format!("Failed to load key file {}", config.key_file()))?;

        // Keyless providers still get a record so their use is metered and
        // they can be switched off like any other key
        let records = keys.records();
        for (provider, name) in KEYLESS {
            if records.iter().any(|r| r.provider == provider) {
                continue;
            }
            keys.add_key(KeyRecord::new(
                provider,
                name,
                "",
                config.keys.keyless_daily_limit,
            ))
            .with_context(|| format!("Failed to register {}", name))?;
            info!("Registered keyless budget '{}' for {}", name, provider);
        }

        let cache = TranslationCache::open(&config.cache, metrics)
            .await
            .context("Failed to open translation cache")?;
        let seeded = cache.seed(phrases::seed_entries(config.target_language()));
        if seeded > 0 {
            debug!("Seeded {} built-in phrases for {}", seeded, config.target_language());
        }

        info!(
            "Dispatch state ready: {} keys, {} cached translations",
            keys.records().len(),
            cache.len()
        );
        Ok(Self { keys, cache })
    }

    /// Persist keys and cache now
    pub async fn flush(&self) -> Result<()> {
        self.keys.flush().await.context("Failed to write key file")?;
        self.cache.save().await.context("Failed to write translation cache")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config_in(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.keys.key_file = dir.join("api_keys.json").display().to_string();
        config.cache.cache_dir = dir.join("cache").display().to_string();
        config.cache.persist = true;
        config.cache.save_interval = Duration::ZERO;
        config
    }

    #[tokio::test]
    async fn test_init_registers_keyless_budgets_once() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());

        let state = DispatchState::init(&config, None).await.unwrap();
        assert!(state.keys.acquire(ProviderId::Neural).is_ok());
        assert!(state.keys.acquire(ProviderId::Secondary).is_ok());
        assert!(state.keys.acquire(ProviderId::Primary).is_err());
        state.flush().await.unwrap();

        let again = DispatchState::init(&config, None).await.unwrap();
        assert_eq!(again.keys.records().len(), 2);
    }

    #[tokio::test]
    async fn test_init_seeds_phrases_for_vietnamese_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.cache.persist = false;

        let state = DispatchState::init(&config, None).await.unwrap();
        let hello = TranslationCache::fingerprint("こんにちは", "auto", None);
        assert_eq!(state.cache.lookup(&hello).as_deref(), Some("Xin chào"));

        config.dispatch.target_language = "en".to_string();
        let english = DispatchState::init(&config, None).await.unwrap();
        assert!(english.cache.is_empty());
    }

    #[tokio::test]
    async fn test_flush_persists_cache() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());

        let state = DispatchState::init(&config, None).await.unwrap();
        let key = TranslationCache::fingerprint("はい", "ja", None);
        state.cache.insert(key.clone(), "Vâng".to_string());
        state.flush().await.unwrap();

        let reloaded = DispatchState::init(&config, None).await.unwrap();
        assert_eq!(reloaded.cache.lookup(&key).as_deref(), Some("Vâng"));
    }
}
