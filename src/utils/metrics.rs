use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::types::{ProviderId, TranslationMethod};

/// Keep the latency window bounded
const MAX_LATENCY_SAMPLES: usize = 10_000;

/// Global metrics collector for the dispatch service.
///
/// Tracks provider calls, cache performance, fallbacks and key health.
/// Thread-safe and cheap to clone.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Default)]
struct ProviderCounters {
    calls: AtomicUsize,
    success: AtomicUsize,
    failed: AtomicUsize,
}

struct MetricsInner {
    // Provider metrics
    providers: DashMap<ProviderId, ProviderCounters>,
    call_latency_ms: RwLock<VecDeque<u64>>,

    // Cache metrics
    cache_hits: AtomicUsize,
    cache_misses: AtomicUsize,
    cache_size: AtomicUsize,
    cache_evictions: AtomicUsize,

    // Results per method
    results_by_method: DashMap<TranslationMethod, AtomicUsize>,
    fallbacks: AtomicUsize,

    // Key health
    key_deactivations: AtomicUsize,
    probes_total: AtomicUsize,
    probes_healthy: AtomicUsize,
    keys_recovered: AtomicUsize,

    // Batch metrics
    batches_processed: AtomicUsize,
    items_processed: AtomicUsize,

    circuit_breaker_trips: AtomicUsize,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                providers: DashMap::new(),
                call_latency_ms: RwLock::new(VecDeque::with_capacity(MAX_LATENCY_SAMPLES)),
                cache_hits: AtomicUsize::new(0),
                cache_misses: AtomicUsize::new(0),
                cache_size: AtomicUsize::new(0),
                cache_evictions: AtomicUsize::new(0),
                results_by_method: DashMap::new(),
                fallbacks: AtomicUsize::new(0),
                key_deactivations: AtomicUsize::new(0),
                probes_total: AtomicUsize::new(0),
                probes_healthy: AtomicUsize::new(0),
                keys_recovered: AtomicUsize::new(0),
                batches_processed: AtomicUsize::new(0),
                items_processed: AtomicUsize::new(0),
                circuit_breaker_trips: AtomicUsize::new(0),
                start_time: Instant::now(),
            }),
        }
    }

    // Provider metrics
    pub fn record_provider_call(&self, provider: ProviderId, success: bool, duration: Duration) {
        let counters = self.inner.providers.entry(provider).or_default();
        counters.calls.fetch_add(1, Ordering::Relaxed);
        if success {
            counters.success.fetch_add(1, Ordering::Relaxed);
        } else {
            counters.failed.fetch_add(1, Ordering::Relaxed);
        }
        drop(counters);

        let mut latency = self.inner.call_latency_ms.write();
        if latency.len() >= MAX_LATENCY_SAMPLES {
            latency.pop_front();
        }
        latency.push_back(duration.as_millis() as u64);
    }

    pub fn record_fallback(&self) {
        self.inner.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    // Cache metrics
    pub fn record_cache_hit(&self) {
        self.inner.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.inner.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_eviction(&self) {
        self.inner.cache_evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn update_cache_size(&self, size: usize) {
        self.inner.cache_size.store(size, Ordering::Relaxed);
    }

    // Result metrics
    pub fn record_result(&self, method: TranslationMethod) {
        self.inner
            .results_by_method
            .entry(method)
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch_processed(&self, num_items: usize) {
        self.inner.batches_processed.fetch_add(1, Ordering::Relaxed);
        self.inner.items_processed.fetch_add(num_items, Ordering::Relaxed);
    }

    // Key health metrics
    pub fn record_key_deactivation(&self) {
        self.inner.key_deactivations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_probe(&self, healthy: bool) {
        self.inner.probes_total.fetch_add(1, Ordering::Relaxed);
        if healthy {
            self.inner.probes_healthy.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_key_recovered(&self) {
        self.inner.keys_recovered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_circuit_breaker_trip(&self) {
        self.inner.circuit_breaker_trips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let latency: Vec<u64> = self.inner.call_latency_ms.read().iter().copied().collect();
        let call_latency_avg_ms = avg(&latency);
        let call_latency_p50_ms = percentile(&latency, 0.5);
        let call_latency_p95_ms = percentile(&latency, 0.95);
        let call_latency_p99_ms = percentile(&latency, 0.99);

        let providers = self
            .inner
            .providers
            .iter()
            .map(|entry| {
                (
                    entry.key().as_str().to_string(),
                    ProviderCallStats {
                        calls: entry.calls.load(Ordering::Relaxed),
                        success: entry.success.load(Ordering::Relaxed),
                        failed: entry.failed.load(Ordering::Relaxed),
                    },
                )
            })
            .collect::<BTreeMap<_, _>>();

        let results_by_method = self
            .inner
            .results_by_method
            .iter()
            .map(|entry| (entry.key().as_str().to_string(), entry.load(Ordering::Relaxed)))
            .collect::<BTreeMap<_, _>>();

        let cache_hits = self.inner.cache_hits.load(Ordering::Relaxed);
        let cache_misses = self.inner.cache_misses.load(Ordering::Relaxed);
        let cache_total = cache_hits + cache_misses;
        let cache_hit_rate = if cache_total > 0 {
            cache_hits as f64 / cache_total as f64
        } else {
            0.0
        };

        MetricsSnapshot {
            providers,
            call_latency_avg_ms,
            call_latency_p50_ms,
            call_latency_p95_ms,
            call_latency_p99_ms,
            cache_hits,
            cache_misses,
            cache_hit_rate,
            cache_size: self.inner.cache_size.load(Ordering::Relaxed),
            cache_evictions: self.inner.cache_evictions.load(Ordering::Relaxed),
            results_by_method,
            fallbacks: self.inner.fallbacks.load(Ordering::Relaxed),
            key_deactivations: self.inner.key_deactivations.load(Ordering::Relaxed),
            probes_total: self.inner.probes_total.load(Ordering::Relaxed),
            probes_healthy: self.inner.probes_healthy.load(Ordering::Relaxed),
            keys_recovered: self.inner.keys_recovered.load(Ordering::Relaxed),
            batches_processed: self.inner.batches_processed.load(Ordering::Relaxed),
            items_processed: self.inner.items_processed.load(Ordering::Relaxed),
            circuit_breaker_trips: self.inner.circuit_breaker_trips.load(Ordering::Relaxed),
            uptime_seconds: self.inner.start_time.elapsed().as_secs(),
        }
    }

    /// Generate Prometheus-format metrics
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        let mut out = String::new();

        out.push_str("# HELP provider_calls_total Provider calls by outcome\n");
        out.push_str("# TYPE provider_calls_total counter\n");
        for (provider, stats) in &snapshot.providers {
            out.push_str(&format!(
                "provider_calls_total{{provider=\"{}\",outcome=\"success\"}} {}\n",
                provider, stats.success
            ));
            out.push_str(&format!(
                "provider_calls_total{{provider=\"{}\",outcome=\"failed\"}} {}\n",
                provider, stats.failed
            ));
        }

        out.push_str(&format!(
            r#"
# HELP provider_latency_avg_ms Average provider call latency in milliseconds
# TYPE provider_latency_avg_ms gauge
provider_latency_avg_ms {{}} {}

# HELP cache_hit_rate Cache hit rate (0.0 to 1.0)
# TYPE cache_hit_rate gauge
cache_hit_rate {{}} {}

# HELP cache_size Current cache size
# TYPE cache_size gauge
cache_size {{}} {}

# HELP cache_evictions_total Entries evicted by capacity
# TYPE cache_evictions_total counter
cache_evictions_total {{}} {}

# HELP fallbacks_total Sub-batches that moved past a provider
# TYPE fallbacks_total counter
fallbacks_total {{}} {}

# HELP key_deactivations_total Keys taken out of rotation
# TYPE key_deactivations_total counter
key_deactivations_total {{}} {}

# HELP keys_recovered_total Keys reactivated by recovery probes
# TYPE keys_recovered_total counter
keys_recovered_total {{}} {}

# HELP batches_processed_total Total number of batches processed
# TYPE batches_processed_total counter
batches_processed_total {{}} {}

# HELP items_processed_total Total number of texts processed
# TYPE items_processed_total counter
items_processed_total {{}} {}

# HELP circuit_breaker_trips_total Total circuit breaker trips
# TYPE circuit_breaker_trips_total counter
circuit_breaker_trips_total {{}} {}

# HELP uptime_seconds Application uptime in seconds
# TYPE uptime_seconds counter
uptime_seconds {{}} {}
"#,
            snapshot.call_latency_avg_ms,
            snapshot.cache_hit_rate,
            snapshot.cache_size,
            snapshot.cache_evictions,
            snapshot.fallbacks,
            snapshot.key_deactivations,
            snapshot.keys_recovered,
            snapshot.batches_processed,
            snapshot.items_processed,
            snapshot.circuit_breaker_trips,
            snapshot.uptime_seconds,
        ));

        out.push_str("\n# HELP results_total Results by method\n# TYPE results_total counter\n");
        for (method, count) in &snapshot.results_by_method {
            out.push_str(&format!("results_total{{method=\"{}\"}} {}\n", method, count));
        }

        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderCallStats {
    pub calls: usize,
    pub success: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub providers: BTreeMap<String, ProviderCallStats>,
    pub call_latency_avg_ms: u64,
    pub call_latency_p50_ms: u64,
    pub call_latency_p95_ms: u64,
    pub call_latency_p99_ms: u64,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub cache_hit_rate: f64,
    pub cache_size: usize,
    pub cache_evictions: usize,
    pub results_by_method: BTreeMap<String, usize>,
    pub fallbacks: usize,
    pub key_deactivations: usize,
    pub probes_total: usize,
    pub probes_healthy: usize,
    pub keys_recovered: usize,
    pub batches_processed: usize,
    pub items_processed: usize,
    pub circuit_breaker_trips: usize,
    pub uptime_seconds: u64,
}

fn percentile(values: &[u64], p: f64) -> u64 {
    if values.is_empty() {
        return 0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let idx = ((values.len() as f64 - 1.0) * p) as usize;
    sorted[idx]
}

fn avg(values: &[u64]) -> u64 {
    if values.is_empty() {
        return 0;
    }
    values.iter().sum::<u64>() / values.len() as u64
}
