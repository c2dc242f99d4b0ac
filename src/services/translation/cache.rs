use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use xxhash_rust::xxh3::xxh3_128;

use crate::core::config::CacheConfig;
use crate::core::errors::{CacheError, CacheResult};
use crate::core::types::TranslationContext;
use crate::utils::{normalize_source, Metrics};

const CACHE_FILE: &str = "translations.json";

/// Fingerprint of (normalized text, source language, tone context)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub translated: String,
    pub created: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub hit_count: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedEntry {
    fingerprint: CacheKey,
    #[serde(flatten)]
    entry: CacheEntry,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub size: usize,
    pub evictions: usize,
    pub capacity: usize,
    pub hit_rate: f64,
}

/// Context-aware phrase cache with least-recently-accessed eviction.
///
/// Lookups refresh recency, so the entry evicted on overflow is always the
/// one whose last access is oldest. Persistence is optional and debounced:
/// inserts mark the cache dirty and a background task writes it out at most
/// once per save interval.
#[derive(Clone)]
pub struct TranslationCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    entries: RwLock<LruCache<CacheKey, CacheEntry>>,
    capacity: usize,
    cache_file: Option<PathBuf>,
    dirty: AtomicBool,

    hits: AtomicUsize,
    misses: AtomicUsize,
    evictions: AtomicUsize,

    /// Built-in entries restored after every clear
    seeds: RwLock<Vec<(CacheKey, String)>>,

    metrics: Option<Metrics>,
}

impl TranslationCache {
    /// In-memory cache
    pub fn new(capacity: usize, metrics: Option<Metrics>) -> CacheResult<Self> {
        Self::build(capacity, None, metrics)
    }

    /// Cache configured from `config`, loading `translations.json` from the
    /// cache directory and saving it in the background when persistence is on
    pub async fn open(config: &CacheConfig, metrics: Option<Metrics>) -> CacheResult<Self> {
        if !config.persist {
            return Self::new(config.capacity, metrics);
        }

        let dir = Path::new(&config.cache_dir);
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| CacheError::SaveFailed {
                path: dir.display().to_string(),
                source,
            })?;

        let cache_file = dir.join(CACHE_FILE);
        let cache = Self::build(config.capacity, Some(cache_file.clone()), metrics)?;
        cache.load_file(&cache_file).await?;

        if !config.save_interval.is_zero() {
            cache.start_persistence_task(config.save_interval);
        }
        Ok(cache)
    }

    fn build(capacity: usize, cache_file: Option<PathBuf>, metrics: Option<Metrics>) -> CacheResult<Self> {
        let cap = NonZeroUsize::new(capacity).ok_or(CacheError::ZeroCapacity)?;
        Ok(Self {
            inner: Arc::new(CacheInner {
                entries: RwLock::new(LruCache::new(cap)),
                capacity,
                cache_file,
                dirty: AtomicBool::new(false),
                hits: AtomicUsize::new(0),
                misses: AtomicUsize::new(0),
                evictions: AtomicUsize::new(0),
                seeds: RwLock::new(Vec::new()),
                metrics,
            }),
        })
    }

    async fn load_file(&self, path: &Path) -> CacheResult<()> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Ok(());
        }

        let data = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| CacheError::LoadFailed {
                path: path.display().to_string(),
                source,
            })?;

        // A damaged cache file is not worth failing startup over
        let persisted: Vec<PersistedEntry> = match serde_json::from_str(&data) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Ignoring unreadable cache file {}: {}", path.display(), e);
                return Ok(());
            }
        };

        let mut entries = self.inner.entries.write();
        // Stored oldest first, so pushing in order rebuilds recency
        for item in persisted {
            entries.push(item.fingerprint, item.entry);
        }
        let size = entries.len();
        drop(entries);

        if let Some(m) = &self.inner.metrics {
            m.update_cache_size(size);
        }
        info!("Loaded {} cached translations from {}", size, path.display());
        Ok(())
    }

    /// Cache key for a source text under a language and tone context.
    ///
    /// Workload fields of the context (mega-batch flag, image count) are not
    /// part of the key; tone fields are.
    pub fn fingerprint(text: &str, source_lang: &str, context: Option<&TranslationContext>) -> CacheKey {
        let tone = match context {
            Some(ctx) => ctx.tone_signature(),
            None => TranslationContext::default().tone_signature(),
        };
        let normalized = normalize_source(text).to_lowercase();

        let mut input = Vec::with_capacity(normalized.len() + source_lang.len() + tone.len() + 2);
        input.extend_from_slice(normalized.as_bytes());
        input.push(0);
        input.extend_from_slice(source_lang.trim().to_lowercase().as_bytes());
        input.push(0);
        input.extend_from_slice(tone.as_bytes());

        CacheKey(format!("{:032x}", xxh3_128(&input)))
    }

    pub fn lookup(&self, key: &CacheKey) -> Option<String> {
        let found = {
            let mut entries = self.inner.entries.write();
            entries.get_mut(key).map(|entry| {
                entry.last_accessed = Utc::now();
                entry.hit_count += 1;
                entry.translated.clone()
            })
        };

        match &found {
            Some(_) => {
                self.inner.hits.fetch_add(1, Ordering::Relaxed);
                if let Some(m) = &self.inner.metrics {
                    m.record_cache_hit();
                }
            }
            None => {
                self.inner.misses.fetch_add(1, Ordering::Relaxed);
                if let Some(m) = &self.inner.metrics {
                    m.record_cache_miss();
                }
            }
        }
        found
    }

    /// Store a translation; at capacity the least recently accessed entry goes first
    pub fn insert(&self, key: CacheKey, translated: String) {
        let now = Utc::now();
        let (evicted, size) = {
            let mut entries = self.inner.entries.write();
            let evicted = if let Some(existing) = entries.get_mut(&key) {
                existing.translated = translated;
                existing.last_accessed = now;
                None
            } else {
                let entry = CacheEntry {
                    translated,
                    created: now,
                    last_accessed: now,
                    hit_count: 0,
                };
                entries.push(key, entry).map(|(old, _)| old)
            };
            (evicted, entries.len())
        };

        if let Some(old) = evicted {
            debug!("Evicted cache entry {}", old);
            self.inner.evictions.fetch_add(1, Ordering::Relaxed);
            if let Some(m) = &self.inner.metrics {
                m.record_cache_eviction();
            }
        }
        if let Some(m) = &self.inner.metrics {
            m.update_cache_size(size);
        }
        self.inner.dirty.store(true, Ordering::Release);
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner.entries.read().contains(key)
    }

    /// Entry without touching recency or counters
    pub fn peek(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.inner.entries.read().peek(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.inner.hits.load(Ordering::Relaxed);
        let misses = self.inner.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            size: self.len(),
            evictions: self.inner.evictions.load(Ordering::Relaxed),
            capacity: self.inner.capacity,
            hit_rate: if total == 0 { 0.0 } else { hits as f64 / total as f64 },
        }
    }

    /// Install built-in entries. Keys already cached keep their stored
    /// translation. The entries come back after every [`clear`](Self::clear).
    pub fn seed(&self, entries: Vec<(CacheKey, String)>) -> usize {
        *self.inner.seeds.write() = entries;
        self.apply_seeds()
    }

    fn apply_seeds(&self) -> usize {
        let seeds = self.inner.seeds.read();
        if seeds.is_empty() {
            return 0;
        }

        let now = Utc::now();
        let mut added = 0;
        let size = {
            let mut entries = self.inner.entries.write();
            for (key, translated) in seeds.iter() {
                if entries.contains(key) {
                    continue;
                }
                let entry = CacheEntry {
                    translated: translated.clone(),
                    created: now,
                    last_accessed: now,
                    hit_count: 0,
                };
                if entries.push(key.clone(), entry).is_some() {
                    self.inner.evictions.fetch_add(1, Ordering::Relaxed);
                }
                added += 1;
            }
            entries.len()
        };

        if let Some(m) = &self.inner.metrics {
            m.update_cache_size(size);
        }
        debug!("Seeded {} built-in phrases", added);
        added
    }

    /// Drop every learned translation; built-in phrases are restored
    pub fn clear(&self) {
        self.inner.entries.write().clear();
        self.inner.dirty.store(true, Ordering::Release);
        let size = self.apply_seeds();
        if let Some(m) = &self.inner.metrics {
            m.update_cache_size(size);
        }
        info!("Translation cache cleared");
    }

    /// Write the cache file now; no-op for in-memory caches
    pub async fn save(&self) -> CacheResult<()> {
        match &self.inner.cache_file {
            Some(path) => CacheInner::write_file(&self.inner, path).await,
            None => Ok(()),
        }
    }

    fn start_persistence_task(&self, interval: Duration) {
        let weak: Weak<CacheInner> = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            let mut last_save = Instant::now();
            loop {
                tokio::time::sleep(Duration::from_secs(1)).await;

                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if !inner.dirty.load(Ordering::Acquire) || last_save.elapsed() < interval {
                    continue;
                }
                if let Some(path) = &inner.cache_file {
                    if let Err(e) = CacheInner::write_file(&inner, path).await {
                        warn!("Failed to persist translation cache: {}", e);
                    }
                }
                last_save = Instant::now();
            }
        });
    }
}

impl CacheInner {
    async fn write_file(inner: &CacheInner, path: &Path) -> CacheResult<()> {
        inner.dirty.store(false, Ordering::Release);

        let json = {
            let entries = inner.entries.read();
            // LruCache iterates most recent first; store oldest first
            let persisted: Vec<PersistedEntry> = entries
                .iter()
                .rev()
                .map(|(k, v)| PersistedEntry {
                    fingerprint: k.clone(),
                    entry: v.clone(),
                })
                .collect();
            serde_json::to_string(&persisted)?
        };

        let tmp = path.with_extension("json.tmp");
        let write = async {
            tokio::fs::write(&tmp, json).await?;
            tokio::fs::rename(&tmp, path).await
        };
        if let Err(source) = write.await {
            inner.dirty.store(true, Ordering::Release);
            return Err(CacheError::SaveFailed {
                path: path.display().to_string(),
                source,
            });
        }
        debug!("Translation cache written to {}", path.display());
        Ok(())
    }
}
